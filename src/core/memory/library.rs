//! Faixa de memória de uma biblioteca do AmigaOS.
//!
//! `[begin, base_addr)` é a jump table: cada slot tem 6 bytes (tamanho de um
//! `JMP abs.l` do 68k) e uma leitura de word ali vira uma chamada para a
//! implementação nativa da biblioteca. `[base_addr, end)` é a struct base da
//! biblioteca, guardada num `StructOverlay`.

use crate::core::memory::bus::MainMemory;
use crate::core::memory::overlay::{StructLayout, StructOverlay};
use crate::core::memory::range::{MemoryRange, RangeRead};
use crate::core::memory::trace::{TraceEntry, TraceSink};
use crate::core::memory::{AccessKind, MemoryError, MemoryResult, Width};
use log::{debug, warn};
use std::fmt;
use std::rc::Rc;

/// Opcode `RTS` do 68k, devolvido por toda leitura de trap
pub const OP_RTS: u16 = 0x4E75;

/// Tamanho de um slot da jump table
pub const JUMP_SLOT_SIZE: u32 = 6;

/// Implementação nativa das funções de uma biblioteca.
///
/// A chamada pode acessar a memória de novo através de `mem` antes de retornar.
pub trait LibraryDispatch {
    fn call_vector(&self, vector: u32, trap: &LibraryTrap, mem: &mut MainMemory) -> MemoryResult<()>;
}

/// Descrição de uma biblioteca para montar sua `LibraryRange`
#[derive(Clone)]
pub struct LibraryDescriptor {
    pub name: String,
    pub neg_size: u32,
    pub layout: StructLayout,
    pub dispatch: Rc<dyn LibraryDispatch>,
}

impl LibraryDescriptor {
    pub fn new(name: &str, neg_size: u32, layout: StructLayout, dispatch: Rc<dyn LibraryDispatch>) -> Self {
        Self {
            name: name.to_string(),
            neg_size,
            layout,
            dispatch,
        }
    }

    /// Descritor com `num_vectors` slots na jump table
    pub fn with_vectors(
        name: &str,
        num_vectors: u32,
        layout: StructLayout,
        dispatch: Rc<dyn LibraryDispatch>,
    ) -> MemoryResult<Self> {
        let neg_size = num_vectors
            .checked_mul(JUMP_SLOT_SIZE)
            .ok_or_else(|| MemoryError::EmptyRange {
                name: name.to_string(),
                begin: 0,
                size: num_vectors as u64 * JUMP_SLOT_SIZE as u64 + layout.size() as u64,
            })?;
        Ok(Self::new(name, neg_size, layout, dispatch))
    }

    pub fn pos_size(&self) -> u32 {
        self.layout.size()
    }

    pub fn total_size(&self) -> u64 {
        self.neg_size as u64 + self.layout.size() as u64
    }
}

impl fmt::Debug for LibraryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryDescriptor")
            .field("name", &self.name)
            .field("neg_size", &self.neg_size)
            .field("pos_size", &self.layout.size())
            .finish()
    }
}

/// Chamada de biblioteca pendente, produzida por uma leitura na jump table
#[derive(Clone)]
pub struct LibraryTrap {
    pub library: String,
    pub vector: u32,
    pub addr: u32,
    pub base_addr: u32,
    target: Rc<dyn LibraryDispatch>,
}

impl LibraryTrap {
    /// Executa a chamada nativa. Nenhum borrow da faixa está ativo aqui.
    pub fn dispatch(&self, mem: &mut MainMemory) -> MemoryResult<()> {
        let target = Rc::clone(&self.target);
        target.call_vector(self.vector, self, mem)
    }
}

impl fmt::Debug for LibraryTrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryTrap")
            .field("library", &self.library)
            .field("vector", &self.vector)
            .field("addr", &format_args!("{:#08x}", self.addr))
            .finish()
    }
}

/// Jump table + struct base de uma biblioteca carregada
pub struct LibraryRange {
    name: String,
    begin: u32,
    base_addr: u32,
    trace: bool,
    pos_mem: StructOverlay,
    dispatch: Rc<dyn LibraryDispatch>,
}

impl LibraryRange {
    pub fn new(begin: u32, desc: &LibraryDescriptor) -> MemoryResult<Self> {
        let base_addr = begin
            .checked_add(desc.neg_size)
            .ok_or_else(|| MemoryError::EmptyRange {
                name: desc.name.clone(),
                begin,
                size: desc.total_size(),
            })?;
        if desc.neg_size % JUMP_SLOT_SIZE != 0 {
            warn!(
                "Jump table de '{}' não é múltipla de {} bytes: {}",
                desc.name, JUMP_SLOT_SIZE, desc.neg_size
            );
        }
        let pos_mem = StructOverlay::new(&desc.name, base_addr, desc.layout.clone())?;
        debug!(
            "Biblioteca '{}': @{:06x} base={:06x} fim={:06x}",
            desc.name,
            begin,
            base_addr,
            pos_mem.end()
        );
        Ok(Self {
            name: desc.name.clone(),
            begin,
            base_addr,
            trace: false,
            pos_mem,
            dispatch: Rc::clone(&desc.dispatch),
        })
    }

    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    pub fn neg_size(&self) -> u32 {
        self.base_addr - self.begin
    }

    pub fn pos_size(&self) -> u32 {
        self.pos_mem.size()
    }

    pub fn num_vectors(&self) -> u32 {
        self.neg_size() / JUMP_SLOT_SIZE
    }

    /// Endereço do slot `vector` (1 = primeiro slot abaixo da base), se existir
    pub fn vector_addr(&self, vector: u32) -> Option<u32> {
        vector
            .checked_mul(JUMP_SLOT_SIZE)
            .and_then(|off| self.base_addr.checked_sub(off))
            .filter(|&addr| addr >= self.begin)
    }

    pub fn pos_mem(&self) -> &StructOverlay {
        &self.pos_mem
    }

    pub fn pos_mem_mut(&mut self) -> &mut StructOverlay {
        &mut self.pos_mem
    }

    fn invalid(&self, access: AccessKind, width: Width, addr: u32) -> MemoryError {
        MemoryError::InvalidAccess {
            access,
            width,
            addr,
            range: self.name.clone(),
        }
    }

    /// Trap para uma leitura em `addr` na jump table
    pub fn trap_at(&self, width: Width, addr: u32) -> MemoryResult<LibraryTrap> {
        if width != Width::Word || addr < self.begin || addr >= self.base_addr {
            return Err(self.invalid(AccessKind::Read, width, addr));
        }
        Ok(LibraryTrap {
            library: self.name.clone(),
            vector: (self.base_addr - addr) / JUMP_SLOT_SIZE,
            addr,
            base_addr: self.base_addr,
            target: Rc::clone(&self.dispatch),
        })
    }

    /// Offset na struct base para um offset relativo a `begin`
    fn pos_offset(&self, offset: u32, access: AccessKind) -> MemoryResult<u32> {
        offset
            .checked_sub(self.neg_size())
            .ok_or_else(|| self.invalid(access, Width::Byte, self.begin.wrapping_add(offset)))
    }
}

impl MemoryRange for LibraryRange {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self) -> u32 {
        self.begin
    }

    fn end(&self) -> u32 {
        self.pos_mem.end()
    }

    fn trace_enabled(&self) -> bool {
        self.trace
    }

    fn set_trace(&mut self, on: bool) {
        self.trace = on;
        self.pos_mem.set_trace(on);
    }

    fn read(&mut self, width: Width, addr: u32, sink: &mut dyn TraceSink) -> MemoryResult<RangeRead> {
        if addr >= self.base_addr {
            return self.pos_mem.read(width, addr, sink);
        }
        let trap = self.trap_at(width, addr)?;
        if self.trace {
            sink.record(
                TraceEntry::new(AccessKind::Read, width, addr, OP_RTS as u32, &self.name).with_text("TRAP"),
            );
        }
        Ok(RangeRead::Trap(trap))
    }

    fn write(&mut self, width: Width, addr: u32, value: u32, sink: &mut dyn TraceSink) -> MemoryResult<()> {
        if addr >= self.base_addr {
            return self.pos_mem.write(width, addr, value, sink);
        }
        // A jump table nunca é gravável
        Err(self.invalid(AccessKind::Write, width, addr))
    }

    fn get_bytes(&self, offset: u32, len: u32) -> MemoryResult<Vec<u8>> {
        let pos = self.pos_offset(offset, AccessKind::Read)?;
        self.pos_mem.get_bytes(pos, len)
    }

    fn set_bytes(&mut self, offset: u32, data: &[u8]) -> MemoryResult<()> {
        let pos = self.pos_offset(offset, AccessKind::Write)?;
        self.pos_mem.set_bytes(pos, data)
    }

    fn read_cstring(&self, offset: u32) -> MemoryResult<String> {
        let pos = self.pos_offset(offset, AccessKind::Read)?;
        self.pos_mem.read_cstring(pos)
    }

    fn overlay(&self) -> Option<&StructOverlay> {
        Some(&self.pos_mem)
    }

    fn overlay_mut(&mut self) -> Option<&mut StructOverlay> {
        Some(&mut self.pos_mem)
    }

    fn describe(&self) -> String {
        format!(
            "[@{:06x} +{:06x} {}] base={:06x} vectors={}",
            self.begin,
            self.size(),
            self.name,
            self.base_addr,
            self.num_vectors()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::trace::{LogTraceSink, RecordingTraceSink};

    struct NoCalls;

    impl LibraryDispatch for NoCalls {
        fn call_vector(&self, _vector: u32, _trap: &LibraryTrap, _mem: &mut MainMemory) -> MemoryResult<()> {
            Ok(())
        }
    }

    fn lib_layout() -> StructLayout {
        StructLayout::packed(
            "Library",
            &[
                ("lib_Node", Width::Long),
                ("lib_Flags", Width::Byte),
                ("lib_pad", Width::Byte),
                ("lib_NegSize", Width::Word),
                ("lib_PosSize", Width::Word),
                ("lib_Version", Width::Word),
            ],
        )
        .unwrap()
    }

    fn make_lib(begin: u32, vectors: u32) -> LibraryRange {
        let desc = LibraryDescriptor::with_vectors("test.library", vectors, lib_layout(), Rc::new(NoCalls)).unwrap();
        LibraryRange::new(begin, &desc).unwrap()
    }

    #[test]
    fn test_geometry() {
        let lib = make_lib(0x1000, 4);
        assert_eq!(lib.neg_size(), 24);
        assert_eq!(lib.base_addr(), 0x1018);
        assert_eq!(lib.pos_size(), 12);
        assert_eq!(lib.end(), 0x1024);
        assert_eq!(lib.num_vectors(), 4);
        assert_eq!(lib.vector_addr(1), Some(0x1012));
        assert_eq!(lib.vector_addr(4), Some(0x1000));
        assert_eq!(lib.vector_addr(5), None);
        assert_eq!(lib.vector_addr(u32::MAX), None);
    }

    #[test]
    fn test_huge_jump_table_is_rejected() {
        let err = LibraryDescriptor::with_vectors("huge.library", u32::MAX, lib_layout(), Rc::new(NoCalls))
            .unwrap_err();
        assert!(matches!(err, MemoryError::EmptyRange { ref name, .. } if name == "huge.library"));

        // Cabe no descritor, mas não a partir de `begin`
        let desc = LibraryDescriptor::with_vectors("high.library", 0x1000, lib_layout(), Rc::new(NoCalls)).unwrap();
        assert_eq!(desc.total_size(), 0x6000 + 12);
        assert!(matches!(
            LibraryRange::new(0xFFFF_F000, &desc),
            Err(MemoryError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_word_read_in_jump_table_traps() {
        let mut sink = RecordingTraceSink::new();
        let mut lib = make_lib(0x1000, 4);
        lib.set_trace(true);

        for k in 1..=4 {
            let addr = lib.vector_addr(k).unwrap();
            match lib.read(Width::Word, addr, &mut sink).unwrap() {
                RangeRead::Trap(trap) => {
                    assert_eq!(trap.vector, k);
                    assert_eq!(trap.addr, addr);
                    assert_eq!(trap.library, "test.library");
                }
                RangeRead::Value(_) => panic!("expected trap at {:x}", addr),
            }
        }
        assert_eq!(sink.len(), 4);
        assert!(sink.entries().iter().all(|e| e.text.as_deref() == Some("TRAP")));
        assert!(sink.entries().iter().all(|e| e.value == OP_RTS as u32));
    }

    #[test]
    fn test_other_widths_in_jump_table_are_invalid() {
        let mut lib = make_lib(0, 2);
        for width in [Width::Byte, Width::Long] {
            let err = lib.read(width, 6, &mut LogTraceSink).unwrap_err();
            assert!(matches!(err, MemoryError::InvalidAccess { access: AccessKind::Read, .. }));
        }
    }

    #[test]
    fn test_jump_table_is_never_writable() {
        let mut lib = make_lib(0x100, 3);
        for addr in 0x100..lib.base_addr() {
            for width in Width::ALL {
                let err = lib.write(width, addr, 0, &mut LogTraceSink).unwrap_err();
                assert!(matches!(err, MemoryError::InvalidAccess { access: AccessKind::Write, .. }));
            }
        }
        assert!(lib.set_bytes(0, &[0]).is_err());
        assert!(lib.get_bytes(2, 1).is_err());
        assert!(lib.read_cstring(0).is_err());
    }

    #[test]
    fn test_positive_area_goes_to_struct() {
        let mut lib = make_lib(0x100, 2);
        let base = lib.base_addr();
        lib.write(Width::Word, base + 10, 40, &mut LogTraceSink).unwrap();
        assert_eq!(lib.pos_mem().read_field("lib_Version").unwrap(), 40);

        lib.pos_mem_mut().write_field("lib_NegSize", 12).unwrap();
        match lib.read(Width::Word, base + 6, &mut LogTraceSink).unwrap() {
            RangeRead::Value(v) => assert_eq!(v, 12),
            RangeRead::Trap(_) => panic!("unexpected trap"),
        }

        // Offsets da interface de bytes são relativos a `begin`
        assert_eq!(lib.get_bytes(12 + 6, 2).unwrap(), vec![0, 12]);
        assert!(lib.overlay().is_some());
    }
}
