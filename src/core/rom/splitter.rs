// vamos-mem-rs/src/core/rom/splitter.rs

use super::database::{KnownRom, RomDatabase, RomEntry};
use super::kickstart::KickRom;
use super::loader::KickRomLoader;
use super::{RomError, RomImage, RomResult};
use log::{debug, info};
use std::path::Path;

/// Matches a ROM image against the catalog and cuts out its named regions
pub struct RomSplitter {
    database: RomDatabase,
    rom_data: Vec<u8>,
    chk_sum: Option<u32>,
    matched: Option<usize>,
}

impl RomSplitter {
    pub fn new(database: RomDatabase) -> Self {
        Self {
            database,
            rom_data: Vec::new(),
            chk_sum: None,
            matched: None,
        }
    }

    pub fn database(&self) -> &RomDatabase {
        &self.database
    }

    /// Loads `path` and looks it up in the catalog
    pub fn find_rom_file<P: AsRef<Path>>(&mut self, path: P, key_file: Option<&Path>) -> RomResult<&KnownRom> {
        let rom = KickRomLoader::load_from_file(path, key_file)?;
        self.find_rom(rom)
    }

    /// Uses the stored checksum of a valid Kickstart, the computed one otherwise
    pub fn find_rom(&mut self, rom: RomImage) -> RomResult<&KnownRom> {
        let kick = KickRom::new(&rom.data);
        let chk_sum = if rom.is_kick {
            kick.read_check_sum()
        } else {
            Some(kick.calc_check_sum(None))
        };
        self.chk_sum = chk_sum;
        self.matched = chk_sum.and_then(|sum| {
            self.database.iter().position(|known| known.matches(&rom.data, sum))
        });
        self.rom_data = rom.data;

        match self.matched_rom() {
            Some(known) => {
                info!("ROM reconhecida: {}", known.name);
                Ok(known)
            }
            None => {
                debug!("ROM desconhecida (sum={:08x?})", self.chk_sum);
                Err(RomError::NotMatched)
            }
        }
    }

    pub fn matched_rom(&self) -> Option<&KnownRom> {
        self.database.iter().nth(self.matched?)
    }

    /// Checksum used for the last lookup
    pub fn check_sum(&self) -> Option<u32> {
        self.chk_sum
    }

    pub fn format_rom(rom: &KnownRom, show_entries: bool) -> Vec<String> {
        let mut lines = vec![format!(
            "@{:08x}  +{:08x}  sum={:08x}  sum_off={:08x}  {}",
            rom.base_addr, rom.size, rom.chk_sum, rom.sum_off, rom.name
        )];
        if show_entries {
            lines.extend(rom.entries.iter().map(Self::format_entry));
        }
        lines
    }

    pub fn format_entry(entry: &RomEntry) -> String {
        format!(
            "  @{:06x}  +{:06x}  ={:06x}  relocs=#{:5}  {}",
            entry.offset,
            entry.size,
            entry.end(),
            entry.relocs.len(),
            entry.name
        )
    }

    /// Entries of the matched ROM (none before a successful match)
    pub fn all_entries(&self) -> &[RomEntry] {
        match self.matched_rom() {
            Some(rom) => &rom.entries,
            None => &[],
        }
    }

    /// Entries whose name matches a `*`/`?` pattern
    pub fn query_entries(&self, pattern: &str) -> Vec<&RomEntry> {
        self.all_entries()
            .iter()
            .filter(|e| wildcard_match(pattern, &e.name))
            .collect()
    }

    /// Bytes and relocations of `entry` in the loaded image
    pub fn extract_entry<'a>(&'a self, entry: &'a RomEntry) -> RomResult<(&'a [u8], &'a [u32])> {
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        let data = self.rom_data.get(start..end).ok_or_else(|| RomError::EntryOutOfBounds {
            name: entry.name.clone(),
            offset: entry.offset,
            size: entry.size,
            rom_size: self.rom_data.len(),
        })?;
        Ok((data, &entry.relocs))
    }
}

/// Shell-style match: `*` any run, `?` any single character
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        if p < pat.len() && (pat[p] == '?' || pat[p] == txt[t]) {
            p += 1;
            t += 1;
        } else if p < pat.len() && pat[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            // Estrela absorve mais um caractere
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pat[p..].iter().all(|&c| c == '*')
}
