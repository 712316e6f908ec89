//! Sistema de Memória do emulador de AmigaOS (68k, big-endian).
//! Compõe o espaço de endereçamento de 32-bit a partir de faixas independentes
//! (blocos, structs e bibliotecas) e trata as falhas de acesso da CPU.

pub mod block;
pub mod bus;
pub mod config;
pub mod fault;
pub mod library;
pub mod map;
pub mod overlay;
pub mod range;
pub mod trace;

// Re-exportações para facilitar o uso
pub use block::MemoryBlock;
pub use bus::{MainMemory, ReadFunc, SnapshotProvider, WriteFunc, OP_RESET};
pub use config::MemoryConfig;
pub use fault::{CpuState, Fault, FaultKind, RangeLocation};
pub use library::{LibraryDescriptor, LibraryDispatch, LibraryRange, LibraryTrap, JUMP_SLOT_SIZE, OP_RTS};
pub use map::AddressSpace;
pub use overlay::{FieldDescriptor, FieldLookup, StructLayout, StructOverlay};
pub use range::{AccessFlags, MemoryRange, RangeRead};
pub use trace::{LogTraceSink, RecordingTraceSink, TraceEntry, TraceSink};

use std::fmt;
use thiserror::Error;

/// Tamanho padrão do espaço de endereçamento (24-bit = 16 MB, como no Amiga)
pub const DEFAULT_SPACE_SIZE: u32 = 0x0100_0000;

/// Largura de um acesso à memória
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    Byte, // 8-bit
    Word, // 16-bit (largura de instrução do 68k)
    Long, // 32-bit
}

impl Width {
    pub const ALL: [Width; 3] = [Width::Byte, Width::Word, Width::Long];

    /// Número de bytes tocados pelo acesso
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Long => 4,
        }
    }

    /// Máscara de bits para truncar valores escritos
    pub const fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Long => 0xFFFF_FFFF,
        }
    }

    /// Índice nas tabelas de funções da CPU (0 = byte, 1 = word, 2 = long)
    pub const fn index(self) -> usize {
        match self {
            Width::Byte => 0,
            Width::Word => 1,
            Width::Long => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Width> {
        Width::ALL.get(index).copied()
    }

    /// Interpreta `bytes` como inteiro big-endian sem sinal desta largura
    pub fn decode(self, bytes: &[u8]) -> u32 {
        match self {
            Width::Byte => bytes[0] as u32,
            Width::Word => u16::from_be_bytes([bytes[0], bytes[1]]) as u32,
            Width::Long => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Grava `value` (truncado) em `bytes` como big-endian
    pub fn encode(self, value: u32, bytes: &mut [u8]) {
        match self {
            Width::Byte => bytes[0] = value as u8,
            Width::Word => bytes[..2].copy_from_slice(&(value as u16).to_be_bytes()),
            Width::Long => bytes[..4].copy_from_slice(&value.to_be_bytes()),
        }
    }

    /// Dígitos hexadecimais usados no trace
    pub(crate) const fn hex_digits(self) -> usize {
        (self.bytes() * 2) as usize
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Byte => write!(f, "byte"),
            Width::Word => write!(f, "word"),
            Width::Long => write!(f, "long"),
        }
    }
}

/// Tipo de acesso (leitura ou escrita)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// Erros do sistema de memória
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("out of range access of {len} byte(s) at 0x{addr:08x}")]
    OutOfRange { addr: u32, len: u32 },

    #[error("invalid {access} {width} access at 0x{addr:08x} in '{range}'")]
    InvalidAccess {
        access: AccessKind,
        width: Width,
        addr: u32,
        range: String,
    },

    #[error("unknown field '{field}' in struct '{name}'")]
    UnknownField { name: String, field: String },

    #[error("range '{name}' [0x{begin:08x}, 0x{end:08x}) overlaps range '{existing}'")]
    Overlap {
        name: String,
        begin: u32,
        end: u32,
        existing: String,
    },

    #[error("range '{name}' is empty or wraps: begin=0x{begin:08x} size=0x{size:x}")]
    EmptyRange { name: String, begin: u32, size: u64 },

    #[error("field '{second}' overlaps field '{first}' in struct '{name}'")]
    FieldOverlap {
        name: String,
        first: String,
        second: String,
    },

    #[error("field '{field}' ends past size {size} of struct '{name}'")]
    FieldOutOfBounds { name: String, field: String, size: u32 },

    #[error("duplicate field '{field}' in struct '{name}'")]
    DuplicateField { name: String, field: String },

    #[error("library '{library}' call of vector {vector} failed: {reason}")]
    Dispatch {
        library: String,
        vector: u32,
        reason: String,
    },

    #[error("range '{0}' has no struct overlay")]
    NoOverlay(String),

    #[error("ROM '{0}' has no base address (not a valid Kickstart image)")]
    UnmappableRom(String),

    #[error("internal memory error: {0}")]
    Internal(String),
}

/// Tipo de resultado para operações de memória
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_encode_decode() {
        let mut buf = [0u8; 4];
        Width::Long.encode(0x1234_5678, &mut buf);
        assert_eq!(buf, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(Width::Word.decode(&buf), 0x1234);
        assert_eq!(Width::Byte.decode(&buf[3..]), 0x78);

        // Escrita trunca para a largura
        Width::Word.encode(0xABCD_EF01, &mut buf);
        assert_eq!(buf[..2], [0xEF, 0x01]);
    }

    #[test]
    fn test_width_index_roundtrip() {
        for width in Width::ALL {
            assert_eq!(Width::from_index(width.index()), Some(width));
        }
        assert_eq!(Width::from_index(3), None);
    }
}
