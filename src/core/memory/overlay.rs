//! Structs nomeadas sobre um bloco de memória.
//! O layout traduz `(offset, largura)` para `(campo, offset no campo)` nos
//! traces e permite acesso tipado por nome de campo.

use crate::core::memory::block::MemoryBlock;
use crate::core::memory::range::{MemoryRange, RangeRead};
use crate::core::memory::trace::TraceSink;
use crate::core::memory::{AccessKind, MemoryError, MemoryResult, Width};
use log::warn;
use std::collections::HashMap;

/// Um campo de struct: nome, offset relativo à base e largura
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub offset: u32,
    pub width: Width,
}

impl FieldDescriptor {
    pub fn new(name: &str, offset: u32, width: Width) -> Self {
        Self {
            name: name.to_string(),
            offset,
            width,
        }
    }

    /// Fim exclusivo do campo
    pub fn end(&self) -> u32 {
        self.offset + self.width.bytes()
    }
}

/// Resultado da busca de um offset no layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLookup<'a> {
    pub field: &'a FieldDescriptor,
    /// Offset do acesso relativo ao início do campo (negativo antes do primeiro campo)
    pub delta: i64,
    /// Falso quando o acesso toca padding ou atravessa o fim do campo
    pub exact: bool,
}

/// Layout binário de uma struct (campos ordenados por offset, sem sobreposição)
#[derive(Debug, Clone)]
pub struct StructLayout {
    name: String,
    size: u32,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
}

impl StructLayout {
    pub fn new(name: &str, size: u32, mut fields: Vec<FieldDescriptor>) -> MemoryResult<Self> {
        fields.sort_by_key(|f| f.offset);

        for pair in fields.windows(2) {
            if pair[1].offset < pair[0].end() {
                return Err(MemoryError::FieldOverlap {
                    name: name.to_string(),
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }
        if let Some(last) = fields.last() {
            if last.end() > size {
                return Err(MemoryError::FieldOutOfBounds {
                    name: name.to_string(),
                    field: last.name.clone(),
                    size,
                });
            }
        }

        let mut by_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if by_name.insert(field.name.clone(), index).is_some() {
                return Err(MemoryError::DuplicateField {
                    name: name.to_string(),
                    field: field.name.clone(),
                });
            }
        }

        Ok(Self {
            name: name.to_string(),
            size,
            fields,
            by_name,
        })
    }

    /// Layout sem padding: campos em sequência, tamanho = soma das larguras
    pub fn packed(name: &str, fields: &[(&str, Width)]) -> MemoryResult<Self> {
        let mut offset = 0;
        let mut descriptors = Vec::with_capacity(fields.len());
        for &(field, width) in fields {
            descriptors.push(FieldDescriptor::new(field, offset, width));
            offset += width.bytes();
        }
        Self::new(name, offset, descriptors)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Campo que contém `offset`, ou o campo mais próximo abaixo dele.
    /// Offsets antes do primeiro campo usam o primeiro campo com delta negativo.
    pub fn field_for_offset(&self, offset: u32, width: Width) -> Option<FieldLookup<'_>> {
        let idx = self.fields.partition_point(|f| f.offset <= offset);
        if idx == 0 {
            let field = self.fields.first()?;
            return Some(FieldLookup {
                field,
                delta: offset as i64 - field.offset as i64,
                exact: false,
            });
        }
        let field = &self.fields[idx - 1];
        Some(FieldLookup {
            field,
            delta: (offset - field.offset) as i64,
            exact: offset as u64 + width.bytes() as u64 <= field.end() as u64,
        })
    }

    /// Descritor do campo `name`
    pub fn field(&self, name: &str) -> MemoryResult<&FieldDescriptor> {
        self.by_name
            .get(name)
            .map(|&index| &self.fields[index])
            .ok_or_else(|| MemoryError::UnknownField {
                name: self.name.clone(),
                field: name.to_string(),
            })
    }
}

/// Bloco de memória interpretado por um `StructLayout`
pub struct StructOverlay {
    block: MemoryBlock,
    layout: StructLayout,
}

impl StructOverlay {
    pub fn new(name: &str, begin: u32, layout: StructLayout) -> MemoryResult<Self> {
        let block = MemoryBlock::new(name, begin, layout.size())?;
        Ok(Self { block, layout })
    }

    pub fn layout(&self) -> &StructLayout {
        &self.layout
    }

    pub fn block(&self) -> &MemoryBlock {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut MemoryBlock {
        &mut self.block
    }

    /// Rótulo de diagnóstico `"<faixa>+<offset> = <campo>+<offset no campo>"`
    pub fn label(&self, addr: u32, width: Width) -> String {
        let delta = addr.wrapping_sub(self.block.begin());
        match self.layout.field_for_offset(delta, width) {
            Some(lookup) if lookup.delta < 0 => {
                format!("{}+{} = {}{}", self.block.name(), delta, lookup.field.name, lookup.delta)
            }
            Some(lookup) => format!(
                "{}+{} = {}+{}",
                self.block.name(),
                delta,
                lookup.field.name,
                lookup.delta
            ),
            None => format!("{}+{} = ?", self.block.name(), delta),
        }
    }

    /// Avisa quando o acesso toca padding ou atravessa campos (não bloqueia o acesso)
    fn check_access(&self, access: AccessKind, addr: u32, width: Width) {
        let delta = addr.wrapping_sub(self.block.begin());
        if let Some(lookup) = self.layout.field_for_offset(delta, width) {
            if !lookup.exact {
                warn!(
                    "Acesso {} {} em {}+{} não casa com um campo de '{}' (mais próximo: {})",
                    access,
                    width,
                    self.block.name(),
                    delta,
                    self.layout.name(),
                    lookup.field.name
                );
            }
        }
    }

    /// Endereço absoluto do campo `name`
    pub fn field_addr(&self, name: &str) -> MemoryResult<u32> {
        Ok(self.block.begin() + self.layout.field(name)?.offset)
    }

    pub fn read_field(&self, name: &str) -> MemoryResult<u32> {
        let field = self.layout.field(name)?;
        self.block.read_int(field.width, self.block.begin() + field.offset)
    }

    pub fn write_field(&mut self, name: &str, value: u32) -> MemoryResult<()> {
        let field = self.layout.field(name)?;
        let (width, addr) = (field.width, self.block.begin() + field.offset);
        self.block.write_int(width, addr, value)
    }
}

impl MemoryRange for StructOverlay {
    fn name(&self) -> &str {
        self.block.name()
    }

    fn begin(&self) -> u32 {
        self.block.begin()
    }

    fn end(&self) -> u32 {
        self.block.end()
    }

    fn trace_enabled(&self) -> bool {
        self.block.trace_enabled()
    }

    fn set_trace(&mut self, on: bool) {
        self.block.set_trace(on);
    }

    fn read(&mut self, width: Width, addr: u32, sink: &mut dyn TraceSink) -> MemoryResult<RangeRead> {
        let value = self.block.read_int(width, addr)?;
        self.check_access(AccessKind::Read, addr, width);
        if self.block.trace_enabled() {
            let text = format!("Struct {}", self.label(addr, width));
            self.block.trace_access(sink, AccessKind::Read, width, addr, value, Some(text));
        }
        Ok(RangeRead::Value(value))
    }

    fn write(&mut self, width: Width, addr: u32, value: u32, sink: &mut dyn TraceSink) -> MemoryResult<()> {
        self.block.write_int(width, addr, value)?;
        self.check_access(AccessKind::Write, addr, width);
        if self.block.trace_enabled() {
            let text = format!("Struct {}", self.label(addr, width));
            self.block
                .trace_access(sink, AccessKind::Write, width, addr, value & width.mask(), Some(text));
        }
        Ok(())
    }

    fn get_bytes(&self, offset: u32, len: u32) -> MemoryResult<Vec<u8>> {
        self.block.get_bytes(offset, len)
    }

    fn set_bytes(&mut self, offset: u32, data: &[u8]) -> MemoryResult<()> {
        self.block.set_bytes(offset, data)
    }

    fn read_cstring(&self, offset: u32) -> MemoryResult<String> {
        self.block.read_cstring(offset)
    }

    fn overlay(&self) -> Option<&StructOverlay> {
        Some(self)
    }

    fn overlay_mut(&mut self) -> Option<&mut StructOverlay> {
        Some(self)
    }
}
