// Este é o ponto de entrada principal da biblioteca.

// Módulos principais do projeto.
pub mod core;

// Re-exportações para facilitar o uso.
pub use crate::core::memory::{
    AddressSpace, CpuState, Fault, LibraryDescriptor, LibraryDispatch, MainMemory, MemoryBlock,
    MemoryConfig, MemoryError, MemoryRange, MemoryResult, StructLayout, StructOverlay, Width,
};
pub use crate::core::rom::{KickRomLoader, RomError, RomImage, RomSplitter};

/// Versão da biblioteca.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Função conveniente para criar a memória principal com a configuração padrão
/// e uma CPU sem estado (útil para ferramentas que não executam código).
pub fn create_main_memory() -> MemoryResult<MainMemory> {
    MainMemory::with_config(&MemoryConfig::default(), Box::new(CpuState::default))
}
