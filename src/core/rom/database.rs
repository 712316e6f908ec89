// vamos-mem-rs/src/core/rom/database.rs

use log::debug;

/// Named region of a known ROM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomEntry {
    pub name: String,
    /// Offset from the start of the ROM image
    pub offset: u32,
    pub size: u32,
    /// Relocation offsets inside the region
    pub relocs: Vec<u32>,
}

impl RomEntry {
    pub fn new(name: &str, offset: u32, size: u32, relocs: Vec<u32>) -> Self {
        Self {
            name: name.to_string(),
            offset,
            size,
            relocs,
        }
    }

    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }
}

/// Catalog record for one ROM release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownRom {
    pub name: String,
    pub base_addr: u32,
    pub size: u32,
    pub chk_sum: u32,
    pub sum_off: u32,
    pub entries: Vec<RomEntry>,
}

impl KnownRom {
    pub fn new(name: &str, base_addr: u32, size: u32, chk_sum: u32, sum_off: u32) -> Self {
        Self {
            name: name.to_string(),
            base_addr,
            size,
            chk_sum,
            sum_off,
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, entry: RomEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn matches(&self, data: &[u8], chk_sum: u32) -> bool {
        self.chk_sum == chk_sum && self.size as usize == data.len()
    }
}

/// Database of known ROMs, filled in by the host
#[derive(Debug, Clone, Default)]
pub struct RomDatabase {
    roms: Vec<KnownRom>,
}

impl RomDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rom: KnownRom) {
        debug!(
            "ROM catalogada: {} ({} entradas, sum={:08x})",
            rom.name,
            rom.entries.len(),
            rom.chk_sum
        );
        self.roms.push(rom);
    }

    pub fn len(&self) -> usize {
        self.roms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KnownRom> {
        self.roms.iter()
    }

    /// First known ROM with the same checksum and size
    pub fn find_rom(&self, data: &[u8], chk_sum: u32) -> Option<&KnownRom> {
        self.roms.iter().find(|rom| rom.matches(data, chk_sum))
    }
}
