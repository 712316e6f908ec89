// Subsistemas do emulador.
pub mod memory;
pub mod rom;
