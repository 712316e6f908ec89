//! Bloco de memória contíguo (RAM, ROM mapeada, base de structs).

use crate::core::memory::range::{AccessFlags, MemoryRange, RangeRead};
use crate::core::memory::trace::{TraceEntry, TraceSink};
use crate::core::memory::{AccessKind, MemoryError, MemoryResult, Width};
use log::debug;

/// Buffer de bytes endereçável em `[begin, begin + len)`
pub struct MemoryBlock {
    name: String,
    begin: u32,
    data: Vec<u8>,
    flags: AccessFlags,
    trace: bool,
}

impl MemoryBlock {
    /// Cria um bloco zerado de `size` bytes
    pub fn new(name: &str, begin: u32, size: u32) -> MemoryResult<Self> {
        Self::from_bytes(name, begin, vec![0; size as usize])
    }

    /// Cria um bloco com o conteúdo de `data` (ex.: imagem de ROM)
    pub fn from_bytes(name: &str, begin: u32, data: Vec<u8>) -> MemoryResult<Self> {
        let size = data.len() as u64;
        if size == 0 || begin as u64 + size > u32::MAX as u64 {
            return Err(MemoryError::EmptyRange {
                name: name.to_string(),
                begin,
                size,
            });
        }
        debug!("Bloco '{}' criado: @{:06x} +{:06x}", name, begin, size);
        Ok(Self {
            name: name.to_string(),
            begin,
            data,
            flags: AccessFlags::READ_WRITE,
            trace: false,
        })
    }

    /// Marca o bloco como somente leitura para a CPU
    pub fn read_only(mut self) -> Self {
        self.flags = AccessFlags::READ;
        self
    }

    pub fn with_flags(mut self, flags: AccessFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> AccessFlags {
        self.flags
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zera todo o conteúdo
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Offset dentro do buffer para `len` bytes em `addr`, com verificação de limites
    fn offset_for(&self, addr: u32, len: u32) -> MemoryResult<usize> {
        let out = MemoryError::OutOfRange { addr, len };
        let offset = addr.checked_sub(self.begin).ok_or(out.clone())? as usize;
        if offset + len as usize > self.data.len() {
            return Err(out);
        }
        Ok(offset)
    }

    /// Offset relativo ao início do bloco, com verificação de limites
    fn check_offset(&self, offset: u32, len: u32) -> MemoryResult<usize> {
        if offset as u64 + len as u64 > self.data.len() as u64 {
            return Err(MemoryError::OutOfRange {
                addr: self.begin.wrapping_add(offset),
                len,
            });
        }
        Ok(offset as usize)
    }

    /// Lê um inteiro big-endian sem trace
    pub fn read_int(&self, width: Width, addr: u32) -> MemoryResult<u32> {
        let offset = self.offset_for(addr, width.bytes())?;
        Ok(width.decode(&self.data[offset..]))
    }

    /// Escreve um inteiro big-endian sem trace (respeita as permissões)
    pub fn write_int(&mut self, width: Width, addr: u32, value: u32) -> MemoryResult<()> {
        let offset = self.offset_for(addr, width.bytes())?;
        if !self.flags.contains(AccessFlags::WRITE) {
            return Err(MemoryError::InvalidAccess {
                access: AccessKind::Write,
                width,
                addr,
                range: self.name.clone(),
            });
        }
        width.encode(value, &mut self.data[offset..]);
        Ok(())
    }

    /// Escreve uma string terminada em zero a partir de `offset`
    pub fn write_cstring(&mut self, offset: u32, text: &str) -> MemoryResult<()> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        // Strings do AmigaOS são Latin-1
        bytes.extend(text.chars().map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' }));
        bytes.push(0);
        self.set_bytes(offset, &bytes)
    }

    pub(crate) fn trace_access(
        &self,
        sink: &mut dyn TraceSink,
        access: AccessKind,
        width: Width,
        addr: u32,
        value: u32,
        text: Option<String>,
    ) {
        if self.trace {
            let text = text.unwrap_or_else(|| format!("{}+{:06x}", self.name, addr.wrapping_sub(self.begin)));
            sink.record(TraceEntry::new(access, width, addr, value, &self.name).with_text(text));
        }
    }
}

impl MemoryRange for MemoryBlock {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self) -> u32 {
        self.begin
    }

    fn end(&self) -> u32 {
        self.begin + self.data.len() as u32
    }

    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn contains(&self, addr: u32) -> bool {
        addr >= self.begin && ((addr - self.begin) as usize) < self.data.len()
    }

    fn trace_enabled(&self) -> bool {
        self.trace
    }

    fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    fn read(&mut self, width: Width, addr: u32, sink: &mut dyn TraceSink) -> MemoryResult<RangeRead> {
        let value = self.read_int(width, addr)?;
        self.trace_access(sink, AccessKind::Read, width, addr, value, None);
        Ok(RangeRead::Value(value))
    }

    fn write(&mut self, width: Width, addr: u32, value: u32, sink: &mut dyn TraceSink) -> MemoryResult<()> {
        self.write_int(width, addr, value)?;
        self.trace_access(sink, AccessKind::Write, width, addr, value & width.mask(), None);
        Ok(())
    }

    fn get_bytes(&self, offset: u32, len: u32) -> MemoryResult<Vec<u8>> {
        let start = self.check_offset(offset, len)?;
        Ok(self.data[start..start + len as usize].to_vec())
    }

    fn set_bytes(&mut self, offset: u32, data: &[u8]) -> MemoryResult<()> {
        let start = self.check_offset(offset, data.len() as u32)?;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_cstring(&self, offset: u32) -> MemoryResult<String> {
        let start = self.check_offset(offset, 1)?;
        Ok(self.data[start..]
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect())
    }
}
