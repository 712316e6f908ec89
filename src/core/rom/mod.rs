// vamos-mem-rs/src/core/rom/mod.rs

//! ROM image support module
//!
//! Loads Kickstart images (optionally XOR-encoded), validates them through the
//! internal checksum and size policy, and matches them against a catalog of
//! known ROMs to extract named regions with their relocation lists.

pub mod database;
pub mod kickstart;
pub mod loader;
pub mod splitter;

// Re-export types
pub use database::{KnownRom, RomDatabase, RomEntry};
pub use kickstart::KickRom;
pub use loader::{KickRomLoader, DEFAULT_KEY_FILE, ROM_MAGIC};
pub use splitter::RomSplitter;

use std::path::PathBuf;
use thiserror::Error;

/// ROM loading errors
#[derive(Debug, Error)]
pub enum RomError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoded ROM needs a key file: {0}")]
    MissingKey(PathBuf),

    #[error("ROM key is empty")]
    EmptyKey,

    #[error("ROM image is empty")]
    EmptyImage,

    #[error("entry '{name}' [0x{offset:x}, +0x{size:x}) exceeds ROM of {rom_size} bytes")]
    EntryOutOfBounds {
        name: String,
        offset: u32,
        size: u32,
        rom_size: usize,
    },

    #[error("no ROM matched")]
    NotMatched,
}

pub type RomResult<T> = Result<T, RomError>;

/// A loaded ROM image, ready to be mapped into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomImage {
    pub name: String,
    pub data: Vec<u8>,
    /// Mapping address; only set for valid Kickstart images
    pub base_addr: Option<u32>,
    /// Initial PC read from the image header
    pub boot_pc: Option<u32>,
    /// Offset of the checksum long; only set for valid Kickstart images
    pub checksum_offset: Option<u32>,
    pub is_kick: bool,
}

impl RomImage {
    /// Wraps raw bytes and fills in the Kickstart metadata if the image validates
    pub fn new(name: &str, data: Vec<u8>) -> Self {
        let kick = KickRom::new(&data);
        let is_kick = kick.validate();
        let boot_pc = kick.boot_pc();
        let (base_addr, checksum_offset) = if is_kick {
            (Some(kick.base_addr()), Some(kick.checksum_offset() as u32))
        } else {
            (None, None)
        };
        Self {
            name: name.to_string(),
            data,
            base_addr,
            boot_pc,
            checksum_offset,
            is_kick,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Display for RomImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes", self.name, self.data.len())?;
        if let Some(addr) = self.base_addr {
            write!(f, ", kickstart @{:06x}", addr)?;
        }
        write!(f, ")")
    }
}
