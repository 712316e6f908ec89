//! Falhas de acesso registradas pelo `MainMemory`.

use crate::core::memory::{AccessKind, MemoryError, Width};
use std::fmt;

/// Estado da CPU no momento da falha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuState {
    pub pc: u32,
    pub sr: u16,
    pub d: [u32; 8],
    pub a: [u32; 8],
}

impl fmt::Display for CpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PC={:08x} SR={:04x}", self.pc, self.sr)?;
        for (i, d) in self.d.iter().enumerate() {
            write!(f, " D{}={:08x}", i, d)?;
        }
        for (i, a) in self.a.iter().enumerate() {
            write!(f, " A{}={:08x}", i, a)?;
        }
        Ok(())
    }
}

/// Posição de um endereço dentro de uma faixa nomeada
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeLocation {
    pub name: String,
    pub offset: u32,
}

impl fmt::Display for RangeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{:06x}", self.name, self.offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Endereço sem faixa registrada, ou acesso além do fim de uma faixa
    OutOfRange,
    /// Acesso proibido (escrita na jump table, largura errada, ROM)
    InvalidAccess,
    /// Qualquer outra falha vinda de uma faixa ou de uma chamada de biblioteca
    Internal,
}

impl FaultKind {
    pub fn of(error: &MemoryError) -> Self {
        match error {
            MemoryError::OutOfRange { .. } => FaultKind::OutOfRange,
            MemoryError::InvalidAccess { .. } => FaultKind::InvalidAccess,
            _ => FaultKind::Internal,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::OutOfRange => write!(f, "out of range"),
            FaultKind::InvalidAccess => write!(f, "invalid access"),
            FaultKind::Internal => write!(f, "internal error"),
        }
    }
}

/// Uma falha absorvida durante um acesso da CPU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub access: AccessKind,
    pub width: Width,
    pub addr: u32,
    /// Valor da escrita (leituras não têm)
    pub value: Option<u32>,
    pub state: CpuState,
    /// Faixa dona do endereço; `None` quando nenhuma faixa o cobre
    pub location: Option<RangeLocation>,
    /// Faixa onde está o PC no momento da falha
    pub pc_location: Option<RangeLocation>,
    pub error: MemoryError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} @{:08x}",
            self.kind, self.access, self.width, self.addr
        )?;
        if let Some(value) = self.value {
            write!(f, " value={:0digits$x}", value, digits = self.width.hex_digits())?;
        }
        if let Some(location) = &self.location {
            write!(f, " ({})", location)?;
        }
        write!(f, " pc={:08x}", self.state.pc)?;
        if let Some(pc) = &self.pc_location {
            write!(f, " ({})", pc)?;
        }
        write!(f, ": {}", self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kind_mapping() {
        let oor = MemoryError::OutOfRange { addr: 0, len: 2 };
        assert_eq!(FaultKind::of(&oor), FaultKind::OutOfRange);

        let invalid = MemoryError::InvalidAccess {
            access: AccessKind::Write,
            width: Width::Word,
            addr: 0x10,
            range: "exec.library".to_string(),
        };
        assert_eq!(FaultKind::of(&invalid), FaultKind::InvalidAccess);

        let other = MemoryError::Internal("boom".to_string());
        assert_eq!(FaultKind::of(&other), FaultKind::Internal);
    }

    #[test]
    fn test_fault_display() {
        let fault = Fault {
            kind: FaultKind::OutOfRange,
            access: AccessKind::Write,
            width: Width::Word,
            addr: 0x00DF_F000,
            value: Some(0x1234),
            state: CpuState {
                pc: 0xFC0010,
                ..CpuState::default()
            },
            location: None,
            pc_location: Some(RangeLocation {
                name: "kickstart".to_string(),
                offset: 0x10,
            }),
            error: MemoryError::OutOfRange {
                addr: 0x00DF_F000,
                len: 2,
            },
        };
        assert_eq!(
            fault.to_string(),
            "out of range: write word @00dff000 value=1234 pc=00fc0010 (kickstart+000010): \
             out of range access of 2 byte(s) at 0x00dff000"
        );
    }
}
