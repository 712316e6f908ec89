//! Trace de acessos à memória.
//! Cada faixa com trace habilitado envia uma entrada por leitura/escrita ao
//! `TraceSink` do espaço de endereçamento.

use crate::core::memory::{AccessKind, Width};
use log::trace;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Uma entrada de trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub access: AccessKind,
    pub width: Width,
    pub addr: u32,
    pub value: u32,
    pub range: String,
    pub text: Option<String>,
}

impl TraceEntry {
    pub fn new(access: AccessKind, width: Width, addr: u32, value: u32, range: &str) -> Self {
        Self {
            access,
            width,
            addr,
            value,
            range: range.to_string(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.access {
            AccessKind::Read => 'R',
            AccessKind::Write => 'W',
        };
        write!(
            f,
            "{}({}): {:06x}: {:0digits$x}  {:<12}",
            dir,
            self.width.bytes(),
            self.addr,
            self.value,
            self.range,
            digits = self.width.hex_digits(),
        )?;
        if let Some(text) = &self.text {
            write!(f, " {}", text)?;
        }
        Ok(())
    }
}

/// Destino das entradas de trace
pub trait TraceSink {
    fn record(&mut self, entry: TraceEntry);
}

/// Envia o trace para o `log` no nível `trace`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn record(&mut self, entry: TraceEntry) {
        trace!("{}", entry);
    }
}

/// Guarda as entradas em memória; clones compartilham o mesmo buffer.
#[derive(Debug, Default, Clone)]
pub struct RecordingTraceSink {
    entries: Rc<RefCell<Vec<TraceEntry>>>,
}

impl RecordingTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Verdadeiro se alguma entrada contém `needle` no texto
    pub fn contains_text(&self, needle: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|e| e.text.as_deref().map_or(false, |t| t.contains(needle)))
    }
}

impl TraceSink for RecordingTraceSink {
    fn record(&mut self, entry: TraceEntry) {
        self.entries.borrow_mut().push(entry);
    }
}
