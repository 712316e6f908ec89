//! Barramento de memória principal - funções READ/WRITE.
//! Este é o núcleo do sistema de memória, chamado pela CPU em todo fetch,
//! load e store. Falhas nunca sobem para a CPU: viram um estado de parada
//! (`force_quit`) com o diagnóstico guardado para o fim da execução.

use crate::core::memory::config::MemoryConfig;
use crate::core::memory::fault::{CpuState, Fault, FaultKind};
use crate::core::memory::library::{LibraryDescriptor, LibraryRange, LibraryTrap, OP_RTS};
use crate::core::memory::map::AddressSpace;
use crate::core::memory::range::{MemoryRange, RangeRead};
use crate::core::memory::block::MemoryBlock;
use crate::core::memory::overlay::StructOverlay;
use crate::core::memory::{AccessKind, MemoryError, MemoryResult, Width};
use crate::core::rom::RomImage;
use log::{debug, error, info, warn};

/// Opcode `RESET` do 68k, devolvido em todo fetch depois de uma falha
pub const OP_RESET: u16 = 0x4E70;

/// Entrada de leitura da CPU (uma por largura)
pub type ReadFunc = fn(&mut MainMemory, u32) -> u32;

/// Entrada de escrita da CPU (uma por largura)
pub type WriteFunc = fn(&mut MainMemory, u32, u32);

/// Fornece o estado atual da CPU para os registros de falha
pub type SnapshotProvider = Box<dyn Fn() -> CpuState>;

/// Memória vista pela CPU
pub struct MainMemory {
    space: AddressSpace,
    snapshot: SnapshotProvider,
    trace: bool,
    force_quit: bool,
    invalid_access: Vec<Fault>,
    exit_error: Option<Fault>,
}

impl MainMemory {
    /// Cria uma memória vazia `[0, size)`
    pub fn new(size: u32, snapshot: SnapshotProvider) -> Self {
        Self {
            space: AddressSpace::new(size),
            snapshot,
            trace: false,
            force_quit: false,
            invalid_access: Vec::new(),
            exit_error: None,
        }
    }

    /// Cria a memória a partir da configuração, já com a RAM registrada
    pub fn with_config(config: &MemoryConfig, snapshot: SnapshotProvider) -> MemoryResult<Self> {
        config.validate()?;
        let mut mem = Self::new(config.space_size, snapshot);
        mem.trace = config.trace;
        if config.ram_size > 0 {
            let mut ram = MemoryBlock::new("ram", config.ram_begin, config.ram_size)?;
            ram.set_trace(config.trace);
            mem.space.register(Box::new(ram))?;
        }
        info!(
            "Memória principal: espaço={:08x} ram=@{:06x} +{:06x}",
            config.space_size, config.ram_begin, config.ram_size
        );
        Ok(mem)
    }

    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn space_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    pub fn add_range(&mut self, mut range: Box<dyn MemoryRange>) -> MemoryResult<()> {
        if self.trace {
            range.set_trace(true);
        }
        self.space.register(range)
    }

    /// Registra uma biblioteca em `begin` e devolve seu endereço base
    pub fn add_library(&mut self, begin: u32, desc: &LibraryDescriptor) -> MemoryResult<u32> {
        let lib = LibraryRange::new(begin, desc)?;
        let base_addr = lib.base_addr();
        self.add_range(Box::new(lib))?;
        Ok(base_addr)
    }

    /// Mapeia uma Kickstart validada, somente leitura, no seu endereço base
    pub fn map_rom(&mut self, rom: &RomImage) -> MemoryResult<()> {
        let base_addr = rom
            .base_addr
            .ok_or_else(|| MemoryError::UnmappableRom(rom.name.clone()))?;
        let block = MemoryBlock::from_bytes(&rom.name, base_addr, rom.data.clone())?.read_only();
        self.add_range(Box::new(block))
    }

    /// Struct nomeada da faixa `range` (struct ou base de biblioteca)
    pub fn overlay_mut(&mut self, range: &str) -> MemoryResult<&mut StructOverlay> {
        self.space
            .find_mut(range)
            .and_then(|r| r.overlay_mut())
            .ok_or_else(|| MemoryError::NoOverlay(range.to_string()))
    }

    // --- Tabelas de acesso indexadas por largura (0 = byte, 1 = word, 2 = long) ---

    pub fn read_funcs(&self) -> [ReadFunc; 3] {
        [Self::read_byte, Self::read_word, Self::read_long]
    }

    pub fn write_funcs(&self) -> [WriteFunc; 3] {
        [Self::write_byte, Self::write_word, Self::write_long]
    }

    // --- Funções principais de acesso à memória (chamadas pela CPU) ---

    pub fn read_byte(&mut self, addr: u32) -> u32 {
        self.read_mem(Width::Byte, addr)
    }

    pub fn read_word(&mut self, addr: u32) -> u32 {
        self.read_mem(Width::Word, addr)
    }

    pub fn read_long(&mut self, addr: u32) -> u32 {
        self.read_mem(Width::Long, addr)
    }

    pub fn write_byte(&mut self, addr: u32, value: u32) {
        self.write_mem(Width::Byte, addr, value)
    }

    pub fn write_word(&mut self, addr: u32, value: u32) {
        self.write_mem(Width::Word, addr, value)
    }

    pub fn write_long(&mut self, addr: u32, value: u32) {
        self.write_mem(Width::Long, addr, value)
    }

    /// Leitura com a política de falhas aplicada
    pub fn read_mem(&mut self, width: Width, addr: u32) -> u32 {
        if self.force_quit && width == Width::Word {
            return OP_RESET as u32;
        }
        match self.space.read(width, addr) {
            Ok(RangeRead::Value(value)) => value,
            Ok(RangeRead::Trap(trap)) => {
                // O borrow da faixa já terminou: a chamada pode reentrar na memória
                match self.dispatch_trap(&trap) {
                    Ok(()) => OP_RTS as u32,
                    Err(err) => {
                        self.absorb(AccessKind::Read, width, addr, None, err);
                        0
                    }
                }
            }
            Err(err) => {
                self.absorb(AccessKind::Read, width, addr, None, err);
                0
            }
        }
    }

    /// Escrita com a política de falhas aplicada
    pub fn write_mem(&mut self, width: Width, addr: u32, value: u32) {
        if let Err(err) = self.space.write(width, addr, value) {
            self.absorb(AccessKind::Write, width, addr, Some(value & width.mask()), err);
        }
    }

    fn dispatch_trap(&mut self, trap: &LibraryTrap) -> MemoryResult<()> {
        debug!("Chamada {}: vetor {} (@{:06x})", trap.library, trap.vector, trap.addr);
        trap.dispatch(self).map_err(|err| MemoryError::Dispatch {
            library: trap.library.clone(),
            vector: trap.vector,
            reason: err.to_string(),
        })
    }

    /// Converte um erro de acesso em falha registrada e entra em `force_quit`
    fn absorb(&mut self, access: AccessKind, width: Width, addr: u32, value: Option<u32>, err: MemoryError) {
        let state = (self.snapshot)();
        let kind = FaultKind::of(&err);
        let fault = Fault {
            kind,
            access,
            width,
            addr,
            value,
            state,
            location: self.space.range_location(addr),
            pc_location: self.space.range_location(state.pc),
            error: err,
        };

        match kind {
            FaultKind::OutOfRange | FaultKind::InvalidAccess => {
                if self.trace {
                    self.space
                        .trace_unmapped(access, width, addr, value.unwrap_or(0), "OUT!");
                }
                warn!("Acesso inválido: {}", fault);
                self.invalid_access.push(fault);
            }
            FaultKind::Internal => {
                error!("Erro interno durante acesso: {}", fault);
                self.exit_error = Some(fault);
            }
        }
        self.force_quit = true;
    }

    // --- Estado de parada e diagnóstico ---

    pub fn force_quit(&self) -> bool {
        self.force_quit
    }

    /// Pede a parada da CPU sem registrar falha
    pub fn request_quit(&mut self) {
        self.force_quit = true;
    }

    pub fn collected_faults(&self) -> &[Fault] {
        &self.invalid_access
    }

    pub fn last_internal_error(&self) -> Option<&Fault> {
        self.exit_error.as_ref()
    }

    /// Limpa falhas e o estado de parada (nova execução sobre a mesma memória)
    pub fn reset_faults(&mut self) {
        self.force_quit = false;
        self.invalid_access.clear();
        self.exit_error = None;
    }

    /// Descrição de uma falha para o operador
    pub fn describe_fault(&self, fault: &Fault) -> String {
        let mut text = format!(
            "{} {} of {} at {:08x} (pc={:08x})",
            fault.kind, fault.access, fault.width, fault.addr, fault.state.pc
        );
        match (&fault.location, self.space.nearest_below(fault.addr)) {
            (Some(location), _) => text.push_str(&format!(" in {}", location)),
            (None, Some(nearest)) => text.push_str(&format!(" near {}", nearest)),
            (None, None) => {}
        }
        if let Some(pc) = &fault.pc_location {
            text.push_str(&format!(" code {}", pc));
        }
        text.push_str(&format!(": {}", fault.error));
        text
    }

    /// Relatório de fim de execução: uma linha por falha
    pub fn report(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .invalid_access
            .iter()
            .map(|f| self.describe_fault(f))
            .collect();
        if let Some(fault) = &self.exit_error {
            lines.push(self.describe_fault(fault));
            lines.push(format!("  {}", fault.state));
        }
        lines
    }
}
