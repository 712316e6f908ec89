//! Mapa do espaço de endereçamento.
//! Faixas ordenadas por `begin`, sem sobreposição; a busca por endereço é
//! binária porque roda em todo acesso da CPU.

use crate::core::memory::fault::RangeLocation;
use crate::core::memory::range::{MemoryRange, RangeRead};
use crate::core::memory::trace::{LogTraceSink, TraceEntry, TraceSink};
use crate::core::memory::{AccessKind, MemoryError, MemoryResult, Width};
use log::{debug, info};

/// Conjunto ordenado de faixas de memória
pub struct AddressSpace {
    size: u32,
    ranges: Vec<Box<dyn MemoryRange>>,
    sink: Box<dyn TraceSink>,
}

impl AddressSpace {
    /// Cria um espaço vazio `[0, size)` com trace via `log`
    pub fn new(size: u32) -> Self {
        Self {
            size,
            ranges: Vec::new(),
            sink: Box::new(LogTraceSink),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sink = sink;
    }

    pub fn sink_mut(&mut self) -> &mut dyn TraceSink {
        self.sink.as_mut()
    }

    /// Registra uma faixa; falha se ela sobrepõe outra ou sai do espaço
    pub fn register(&mut self, range: Box<dyn MemoryRange>) -> MemoryResult<()> {
        let (begin, end) = (range.begin(), range.end());
        if begin >= end {
            return Err(MemoryError::EmptyRange {
                name: range.name().to_string(),
                begin,
                size: 0,
            });
        }
        if end > self.size {
            return Err(MemoryError::OutOfRange {
                addr: begin,
                len: end - begin,
            });
        }

        let idx = self.ranges.partition_point(|r| r.begin() < begin);
        let overlap = |other: &dyn MemoryRange| MemoryError::Overlap {
            name: range.name().to_string(),
            begin,
            end,
            existing: other.name().to_string(),
        };
        if let Some(prev) = idx.checked_sub(1).map(|i| &self.ranges[i]) {
            if prev.end() > begin {
                return Err(overlap(prev.as_ref()));
            }
        }
        if let Some(next) = self.ranges.get(idx) {
            if next.begin() < end {
                return Err(overlap(next.as_ref()));
            }
        }

        info!("Faixa registrada: {}", range.describe());
        self.ranges.insert(idx, range);
        Ok(())
    }

    /// Remove a faixa `name` e a devolve
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn MemoryRange>> {
        let idx = self.ranges.iter().position(|r| r.name() == name)?;
        debug!("Faixa removida: {}", name);
        Some(self.ranges.remove(idx))
    }

    /// Índice da faixa que contém `addr`
    pub fn resolve_index(&self, addr: u32) -> Option<usize> {
        let idx = self.ranges.partition_point(|r| r.begin() <= addr);
        let candidate = idx.checked_sub(1)?;
        if addr < self.ranges[candidate].end() {
            Some(candidate)
        } else {
            None
        }
    }

    pub fn resolve(&self, addr: u32) -> Option<&dyn MemoryRange> {
        self.resolve_index(addr).map(|i| self.ranges[i].as_ref())
    }

    pub fn resolve_mut(&mut self, addr: u32) -> Option<&mut (dyn MemoryRange + 'static)> {
        let idx = self.resolve_index(addr)?;
        Some(self.ranges[idx].as_mut())
    }

    /// `addr - range.begin`, se `addr` está dentro da faixa
    pub fn offset_within(range: &dyn MemoryRange, addr: u32) -> Option<u32> {
        if range.contains(addr) {
            Some(addr - range.begin())
        } else {
            None
        }
    }

    /// Faixa e offset de `addr`
    pub fn range_location(&self, addr: u32) -> Option<RangeLocation> {
        let range = self.resolve(addr)?;
        Some(RangeLocation {
            name: range.name().to_string(),
            offset: addr - range.begin(),
        })
    }

    /// Faixa mais próxima que começa em ou abaixo de `addr` (diagnóstico de falhas)
    pub fn nearest_below(&self, addr: u32) -> Option<RangeLocation> {
        let idx = self.ranges.partition_point(|r| r.begin() <= addr);
        let range = &self.ranges[idx.checked_sub(1)?];
        Some(RangeLocation {
            name: range.name().to_string(),
            offset: addr - range.begin(),
        })
    }

    pub fn find(&self, name: &str) -> Option<&dyn MemoryRange> {
        self.ranges.iter().find(|r| r.name() == name).map(|r| r.as_ref())
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut (dyn MemoryRange + 'static)> {
        self.ranges.iter_mut().find(|r| r.name() == name).map(|r| r.as_mut())
    }

    /// Faixas em ordem de endereço
    pub fn iter(&self) -> impl Iterator<Item = &dyn MemoryRange> {
        self.ranges.iter().map(|r| r.as_ref())
    }

    pub fn set_trace_all(&mut self, on: bool) {
        for range in &mut self.ranges {
            range.set_trace(on);
        }
    }

    /// Leitura delegada à faixa dona de `addr`
    pub fn read(&mut self, width: Width, addr: u32) -> MemoryResult<RangeRead> {
        let idx = self.resolve_index(addr).ok_or(MemoryError::OutOfRange {
            addr,
            len: width.bytes(),
        })?;
        self.ranges[idx].read(width, addr, self.sink.as_mut())
    }

    /// Escrita delegada à faixa dona de `addr`
    pub fn write(&mut self, width: Width, addr: u32, value: u32) -> MemoryResult<()> {
        let idx = self.resolve_index(addr).ok_or(MemoryError::OutOfRange {
            addr,
            len: width.bytes(),
        })?;
        self.ranges[idx].write(width, addr, value, self.sink.as_mut())
    }

    /// Cópia de `len` bytes a partir do endereço absoluto `addr`
    pub fn get_bytes(&self, addr: u32, len: u32) -> MemoryResult<Vec<u8>> {
        let range = self.resolve(addr).ok_or(MemoryError::OutOfRange { addr, len })?;
        range.get_bytes(addr - range.begin(), len)
    }

    pub fn set_bytes(&mut self, addr: u32, data: &[u8]) -> MemoryResult<()> {
        let len = data.len() as u32;
        let range = self.resolve_mut(addr).ok_or(MemoryError::OutOfRange { addr, len })?;
        let offset = addr - range.begin();
        range.set_bytes(offset, data)
    }

    pub fn read_cstring(&self, addr: u32) -> MemoryResult<String> {
        let range = self.resolve(addr).ok_or(MemoryError::OutOfRange { addr, len: 1 })?;
        range.read_cstring(addr - range.begin())
    }

    /// Registra uma entrada de trace que não pertence a nenhuma faixa
    pub(crate) fn trace_unmapped(&mut self, access: AccessKind, width: Width, addr: u32, value: u32, text: &str) {
        self.sink
            .record(TraceEntry::new(access, width, addr, value, "main").with_text(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::block::MemoryBlock;
    use crate::core::memory::trace::RecordingTraceSink;

    fn block(name: &str, begin: u32, size: u32) -> Box<dyn MemoryRange> {
        Box::new(MemoryBlock::new(name, begin, size).unwrap())
    }

    fn space_with_ranges() -> AddressSpace {
        let mut space = AddressSpace::new(0x0100_0000);
        space.register(block("c", 0x3000, 0x100)).unwrap();
        space.register(block("a", 0x1000, 0x100)).unwrap();
        space.register(block("b", 0x1100, 0x100)).unwrap();
        space
    }

    #[test]
    fn test_ranges_kept_in_address_order() {
        let space = space_with_ranges();
        let names: Vec<&str> = space.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resolve_boundaries() {
        let space = space_with_ranges();
        assert!(space.resolve(0x0FFF).is_none());
        assert_eq!(space.resolve(0x1000).unwrap().name(), "a");
        assert_eq!(space.resolve(0x10FF).unwrap().name(), "a");
        assert_eq!(space.resolve(0x1100).unwrap().name(), "b");
        assert!(space.resolve(0x1200).is_none());
        assert!(space.resolve(0x2FFF).is_none());
        assert_eq!(space.resolve(0x30FF).unwrap().name(), "c");
        assert!(space.resolve(0x3100).is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let mut space = space_with_ranges();
        let err = space.register(block("x", 0x10F0, 0x20)).unwrap_err();
        assert!(matches!(err, MemoryError::Overlap { ref existing, .. } if existing == "a"));

        let err = space.register(block("y", 0x2F00, 0x101)).unwrap_err();
        assert!(matches!(err, MemoryError::Overlap { ref existing, .. } if existing == "c"));

        // Encaixa exatamente no buraco
        space.register(block("gap", 0x1200, 0x1E00)).unwrap();
        assert_eq!(space.len(), 4);
    }

    #[test]
    fn test_range_outside_space_rejected() {
        let mut space = AddressSpace::new(0x1_0000);
        let err = space.register(block("big", 0xFF00, 0x200)).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfRange { .. }));
    }

    #[test]
    fn test_locations() {
        let space = space_with_ranges();
        let r = space.resolve(0x1104).unwrap();
        assert_eq!(AddressSpace::offset_within(r, 0x1104), Some(4));
        assert_eq!(AddressSpace::offset_within(r, 0x1000), None);

        assert_eq!(
            space.range_location(0x3010),
            Some(RangeLocation { name: "c".to_string(), offset: 0x10 })
        );
        assert_eq!(space.range_location(0x2000), None);
        assert_eq!(
            space.nearest_below(0x2000),
            Some(RangeLocation { name: "b".to_string(), offset: 0xF00 })
        );
        assert_eq!(space.nearest_below(0x10), None);
    }

    #[test]
    fn test_read_write_dispatch_and_unmapped() {
        let mut space = space_with_ranges();
        space.write(Width::Long, 0x1100, 0xCAFE_BABE).unwrap();
        assert!(matches!(space.read(Width::Word, 0x1102).unwrap(), RangeRead::Value(0xBABE)));
        assert_eq!(
            space.read(Width::Byte, 0x2000).unwrap_err(),
            MemoryError::OutOfRange { addr: 0x2000, len: 1 }
        );
        // Acesso que atravessa o fim de uma faixa
        assert!(space.read(Width::Long, 0x10FE).is_err());
    }

    #[test]
    fn test_bytes_and_strings_by_address() {
        let mut space = space_with_ranges();
        space.set_bytes(0x3000, b"exec.library\0").unwrap();
        assert_eq!(space.read_cstring(0x3000).unwrap(), "exec.library");
        assert_eq!(space.get_bytes(0x3005, 3).unwrap(), b"lib".to_vec());
        assert!(space.get_bytes(0x5000, 1).is_err());
    }

    #[test]
    fn test_unregister_and_trace_all() {
        let sink = RecordingTraceSink::new();
        let mut space = space_with_ranges();
        space.set_trace_sink(Box::new(sink.clone()));
        space.set_trace_all(true);
        space.read(Width::Byte, 0x1000).unwrap();
        space.write(Width::Byte, 0x3000, 1).unwrap();
        assert_eq!(sink.len(), 2);

        assert!(space.unregister("b").is_some());
        assert!(space.unregister("b").is_none());
        assert!(space.resolve(0x1100).is_none());
        assert!(space.find("c").unwrap().trace_enabled());
    }
}
