// vamos-mem-rs/src/core/rom/kickstart.rs

//! Kickstart image checks: size policy, internal checksum and header fields.

/// Supported Kickstart sizes in KiB
pub const KICK_SIZES_KIB: [usize; 2] = [256, 512];

/// Mapping address of 256 KiB images
pub const KICK_BASE_256K: u32 = 0x00FC_0000;

/// Mapping address of 512 KiB images
pub const KICK_BASE_512K: u32 = 0x00F8_0000;

/// Distance of the checksum long from the end of the image
const CHECKSUM_FROM_END: usize = 0x18;

/// Distance of the size field from the end of the image
const SIZE_FIELD_FROM_END: usize = 0x14;

/// Read-only view of a Kickstart image
#[derive(Debug, Clone, Copy)]
pub struct KickRom<'a> {
    data: &'a [u8],
}

impl<'a> KickRom<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Size policy plus checksum
    pub fn validate(&self) -> bool {
        self.check_size() && self.verify_check_sum()
    }

    /// Whole KiB and either 256 or 512 KiB
    pub fn check_size(&self) -> bool {
        let size = self.data.len();
        size % 1024 == 0 && KICK_SIZES_KIB.contains(&(size / 1024))
    }

    /// Rolling 32-bit sum of all big-endian longs with the carry folded back in,
    /// skipping the long at `skip_off`. Returns `0xFFFFFFFF - sum`.
    pub fn calc_check_sum_skipping(&self, skip_off: Option<usize>) -> u32 {
        let whole = self.data.len() & !3;
        let longs: &[[u8; 4]] = bytemuck::cast_slice(&self.data[..whole]);
        let mut sum: u32 = 0;
        for (i, long) in longs.iter().enumerate() {
            if Some(i * 4) == skip_off {
                continue;
            }
            let (folded, carry) = sum.overflowing_add(u32::from_be_bytes(*long));
            sum = folded + carry as u32;
        }
        0xFFFF_FFFF - sum
    }

    /// Checksum to store at `sum_off` (default: the Kickstart checksum slot)
    pub fn calc_check_sum(&self, sum_off: Option<usize>) -> u32 {
        let sum_off = sum_off.unwrap_or_else(|| self.checksum_offset());
        self.calc_check_sum_skipping(Some(sum_off))
    }

    /// The sum over the whole image, stored checksum included, must be all ones
    pub fn verify_check_sum(&self) -> bool {
        self.calc_check_sum_skipping(None) == 0
    }

    pub fn checksum_offset(&self) -> usize {
        self.data.len().saturating_sub(CHECKSUM_FROM_END)
    }

    pub fn read_check_sum(&self) -> Option<u32> {
        self.read_long(self.data.len().checked_sub(CHECKSUM_FROM_END)?)
    }

    /// PC for booting the ROM
    pub fn boot_pc(&self) -> Option<u32> {
        self.read_long(4)
    }

    /// `(version, revision)` words
    pub fn rom_ver_rev(&self) -> Option<(u16, u16)> {
        Some((self.read_word(12)?, self.read_word(14)?))
    }

    /// Size of the ROM as stored in the ROM itself
    pub fn rom_size_field(&self) -> Option<u32> {
        self.read_long(self.data.len().checked_sub(SIZE_FIELD_FROM_END)?)
    }

    pub fn base_addr(&self) -> u32 {
        if self.data.len() / 1024 == 256 {
            KICK_BASE_256K
        } else {
            KICK_BASE_512K
        }
    }

    fn read_long(&self, off: usize) -> Option<u32> {
        let bytes = self.data.get(off..off + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_word(&self, off: usize) -> Option<u16> {
        let bytes = self.data.get(off..off + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }
}

/// Stores the correct checksum into `data` so that it validates
pub fn fix_check_sum(data: &mut [u8]) -> u32 {
    let kick = KickRom::new(data);
    let off = kick.checksum_offset();
    let sum = kick.calc_check_sum(Some(off));
    if let Some(slot) = data.get_mut(off..off + 4) {
        slot.copy_from_slice(&sum.to_be_bytes());
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthetic 256 KiB image with a boot PC, version and valid checksum
    fn make_kick(kib: usize) -> Vec<u8> {
        let mut data = vec![0u8; kib * 1024];
        data[0..4].copy_from_slice(&0x1114_4EF9u32.to_be_bytes());
        data[4..8].copy_from_slice(&0x00FC_00D2u32.to_be_bytes());
        data[12..14].copy_from_slice(&34u16.to_be_bytes());
        data[14..16].copy_from_slice(&5u16.to_be_bytes());
        for (i, b) in data.iter_mut().enumerate().skip(0x100).take(0x1000) {
            *b = (i * 7 + 3) as u8;
        }
        let size_off = data.len() - 0x14;
        let size = data.len() as u32;
        data[size_off..size_off + 4].copy_from_slice(&size.to_be_bytes());
        fix_check_sum(&mut data);
        data
    }

    #[test]
    fn test_valid_image() {
        let data = make_kick(256);
        let kick = KickRom::new(&data);
        assert!(kick.check_size());
        assert!(kick.verify_check_sum());
        assert!(kick.validate());
        assert_eq!(kick.boot_pc(), Some(0x00FC_00D2));
        assert_eq!(kick.rom_ver_rev(), Some((34, 5)));
        assert_eq!(kick.rom_size_field(), Some(256 * 1024));
        assert_eq!(kick.base_addr(), 0xFC0000);
        assert_eq!(kick.read_check_sum(), Some(kick.calc_check_sum(None)));
    }

    #[test]
    fn test_512k_base_address() {
        let data = make_kick(512);
        let kick = KickRom::new(&data);
        assert!(kick.validate());
        assert_eq!(kick.base_addr(), 0xF80000);
    }

    #[test]
    fn test_check_size_policy() {
        // 384 KiB falha independentemente do checksum
        let data = vec![0u8; 384 * 1024];
        assert!(!KickRom::new(&data).check_size());
        assert!(!KickRom::new(&data).validate());

        let data = vec![0u8; 256 * 1024 + 4];
        assert!(!KickRom::new(&data).check_size());
        assert!(!KickRom::new(&[]).check_size());
    }

    #[test]
    fn test_corruption_breaks_checksum() {
        let mut data = make_kick(256);
        data[0x2000] ^= 0x01;
        assert!(!KickRom::new(&data).verify_check_sum());
    }

    #[test]
    fn test_carry_is_folded_back() {
        // 0xFFFFFFFF + 0x00000002 = 0x1_00000001 -> 0x00000001 + 1
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x02];
        let kick = KickRom::new(&data);
        assert_eq!(kick.calc_check_sum_skipping(None), 0xFFFF_FFFF - 2);
        assert_eq!(kick.calc_check_sum_skipping(Some(0)), 0xFFFF_FFFF - 2);
        assert_eq!(kick.calc_check_sum_skipping(Some(4)), 0);
    }

    #[test]
    fn test_short_images_have_no_header() {
        let kick = KickRom::new(&[0u8; 6]);
        assert_eq!(kick.boot_pc(), None);
        assert_eq!(kick.rom_ver_rev(), None);
        assert_eq!(kick.read_check_sum(), None);
    }
}
