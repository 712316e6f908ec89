//! Contrato comum das faixas de memória.

use crate::core::memory::library::LibraryTrap;
use crate::core::memory::overlay::StructOverlay;
use crate::core::memory::trace::TraceSink;
use crate::core::memory::{MemoryResult, Width};
use bitflags::bitflags;

bitflags! {
    /// Permissões de acesso de um bloco
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// Resultado de uma leitura delegada a uma faixa
#[derive(Debug, Clone)]
pub enum RangeRead {
    /// Valor lido (big-endian, já na largura pedida)
    Value(u32),
    /// Leitura caiu na jump table de uma biblioteca; quem despacha é o `MainMemory`
    Trap(LibraryTrap),
}

/// Uma faixa `[begin, end)` do espaço de endereçamento.
///
/// Leituras recebem `&mut self` porque faixas podem ter efeitos colaterais
/// na leitura (registradores de I/O, por exemplo).
pub trait MemoryRange {
    fn name(&self) -> &str;

    fn begin(&self) -> u32;

    /// Fim exclusivo da faixa
    fn end(&self) -> u32;

    fn size(&self) -> u32 {
        self.end() - self.begin()
    }

    fn contains(&self, addr: u32) -> bool {
        addr >= self.begin() && addr < self.end()
    }

    fn trace_enabled(&self) -> bool;

    fn set_trace(&mut self, on: bool);

    /// Leitura de `width` bytes em `addr` (endereço absoluto)
    fn read(&mut self, width: Width, addr: u32, sink: &mut dyn TraceSink) -> MemoryResult<RangeRead>;

    /// Escrita de `value` truncado para `width` em `addr` (endereço absoluto)
    fn write(&mut self, width: Width, addr: u32, value: u32, sink: &mut dyn TraceSink) -> MemoryResult<()>;

    /// Cópia de `len` bytes a partir de `offset` (relativo a `begin`)
    fn get_bytes(&self, offset: u32, len: u32) -> MemoryResult<Vec<u8>>;

    fn set_bytes(&mut self, offset: u32, data: &[u8]) -> MemoryResult<()>;

    /// String terminada em zero (ou no fim da faixa) a partir de `offset`
    fn read_cstring(&self, offset: u32) -> MemoryResult<String>;

    /// Struct nomeada sobreposta a esta faixa, se houver
    fn overlay(&self) -> Option<&StructOverlay> {
        None
    }

    fn overlay_mut(&mut self) -> Option<&mut StructOverlay> {
        None
    }

    fn describe(&self) -> String {
        format!("[@{:06x} +{:06x} {}]", self.begin(), self.size(), self.name())
    }
}
