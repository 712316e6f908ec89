// vamos-mem-rs/src/core/rom/loader.rs

use super::{RomError, RomImage, RomResult};
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Header of XOR-encoded ROM files
pub const ROM_MAGIC: &[u8; 11] = b"AMIROMTYPE1";

/// Key file looked up next to an encoded image when none is given
pub const DEFAULT_KEY_FILE: &str = "rom.key";

/// Loads Kickstart images from plain or encoded files
pub struct KickRomLoader;

impl KickRomLoader {
    /// Reads `path`, decodes it if needed and wraps it into a `RomImage`
    pub fn load_from_file<P: AsRef<Path>>(path: P, key_file: Option<&Path>) -> RomResult<RomImage> {
        let path = path.as_ref();
        let raw = Self::read_file(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let key = if Self::is_encoded(&raw) {
            let key_path = match key_file {
                Some(p) => p.to_path_buf(),
                None => Self::default_key_path(path),
            };
            if !key_path.exists() {
                warn!("ROM codificada sem arquivo de chave: {}", key_path.display());
                return Err(RomError::MissingKey(key_path));
            }
            debug!("Chave da ROM: {}", key_path.display());
            Some(Self::read_file(&key_path)?)
        } else {
            None
        };

        Self::load_from_buffer(&name, &raw, key.as_deref())
    }

    /// Same as `load_from_file` for an image already in memory
    pub fn load_from_buffer(name: &str, raw: &[u8], key: Option<&[u8]>) -> RomResult<RomImage> {
        if raw.is_empty() {
            return Err(RomError::EmptyImage);
        }
        let data = if Self::is_encoded(raw) {
            let key = key.ok_or_else(|| RomError::MissingKey(PathBuf::from(DEFAULT_KEY_FILE)))?;
            Self::decode(&raw[ROM_MAGIC.len()..], key)?
        } else {
            raw.to_vec()
        };

        let rom = RomImage::new(name, data);
        if rom.is_kick {
            info!("Kickstart carregada: {}", rom);
        } else {
            info!("ROM carregada: {} ({} bytes, sem Kickstart válida)", rom.name, rom.size());
        }
        Ok(rom)
    }

    pub fn is_encoded(raw: &[u8]) -> bool {
        raw.starts_with(ROM_MAGIC)
    }

    /// XOR with the repeating key; applying it twice gives back the input
    pub fn decode(data: &[u8], key: &[u8]) -> RomResult<Vec<u8>> {
        if key.is_empty() {
            return Err(RomError::EmptyKey);
        }
        Ok(data
            .iter()
            .zip(key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect())
    }

    fn default_key_path(rom_path: &Path) -> PathBuf {
        match rom_path.parent() {
            Some(dir) => dir.join(DEFAULT_KEY_FILE),
            None => PathBuf::from(DEFAULT_KEY_FILE),
        }
    }

    fn read_file(path: &Path) -> RomResult<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}
