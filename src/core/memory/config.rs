//! Configuração do espaço de endereçamento.

use crate::core::memory::{MemoryError, MemoryResult, DEFAULT_SPACE_SIZE};

/// Tamanho padrão da RAM (1 MB)
pub const DEFAULT_RAM_SIZE: u32 = 0x0010_0000;

/// Configuração do `MainMemory`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Limite do espaço de endereçamento: faixas precisam caber em `[0, space_size)`
    pub space_size: u32,
    /// Endereço da RAM criada junto com o `MainMemory`
    pub ram_begin: u32,
    /// Tamanho da RAM (0 = sem RAM automática)
    pub ram_size: u32,
    /// Trace de todas as faixas e das falhas ("OUT!")
    pub trace: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            space_size: DEFAULT_SPACE_SIZE,
            ram_begin: 0,
            ram_size: DEFAULT_RAM_SIZE,
            trace: false,
        }
    }
}

impl MemoryConfig {
    /// Configuração com RAM de `ram_size` bytes em 0
    pub fn with_ram(ram_size: u32) -> Self {
        Self {
            ram_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.space_size == 0 {
            return Err(MemoryError::EmptyRange {
                name: "main".to_string(),
                begin: 0,
                size: 0,
            });
        }
        let ram_end = self.ram_begin as u64 + self.ram_size as u64;
        if self.ram_size > 0 && ram_end > self.space_size as u64 {
            return Err(MemoryError::OutOfRange {
                addr: self.ram_begin,
                len: self.ram_size,
            });
        }
        Ok(())
    }
}
