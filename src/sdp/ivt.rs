//! Image vector table lookup.
//!
//! Bootable i.MX images carry an IVT telling the boot ROM where the image
//! expects to live (`self_address`) and where to start it. The table sits at
//! the start of the image or at a 1 KiB boundary shortly after it, depending on
//! the boot medium the image was built for.

/// First byte of an IVT header.
pub const TAG: u8 = 0xd1;

const LEN: usize = 32;
const ALIGN: usize = 0x400;
const SEARCH_LIMIT: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ivt {
    pub entry: u32,
    pub dcd: u32,
    pub boot_data: u32,
    /// Address of the IVT itself once the image is loaded.
    pub self_address: u32,
    pub csf: u32,
}
impl Ivt {
    /// Decode the table at the start of `bytes`, if there is one.
    pub fn parse(bytes: &[u8]) -> Option<Ivt> {
        if bytes.len() < LEN || bytes[0] != TAG {
            return None;
        }
        let length = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        if length < LEN || !(0x40..=0x43).contains(&bytes[3]) {
            return None;
        }

        let word = |index: usize| {
            let at = index * 4;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Some(Ivt {
            entry: word(1),
            dcd: word(3),
            boot_data: word(4),
            self_address: word(5),
            csf: word(6),
        })
    }
}

/// The boot data block an IVT points at: where the whole image starts once
/// loaded and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootData {
    pub start: u32,
    pub length: u32,
    pub plugin: u32,
}

impl Ivt {
    /// Locate and decode the boot data of the table found at `ivt_offset` in
    /// `image`.
    pub fn boot_data_in(&self, image: &[u8], ivt_offset: usize) -> Option<BootData> {
        let distance = self.boot_data.checked_sub(self.self_address)? as usize;
        let at = distance.checked_add(ivt_offset)?;
        let bytes = image.get(at..at.checked_add(12)?)?;
        let word = |index: usize| {
            let at = index * 4;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Some(BootData {
            start: word(0),
            length: word(1),
            plugin: word(2),
        })
    }
}

/// Find the first IVT in `image` and return its file offset with it.
pub fn find_ivt(image: &[u8]) -> Option<(usize, Ivt)> {
    (0..image.len().min(SEARCH_LIMIT))
        .step_by(ALIGN)
        .find_map(|offset| Ivt::parse(&image[offset..]).map(|ivt| (offset, ivt)))
}

#[cfg(test)]
pub(crate) fn build(self_address: u32, entry: u32) -> [u8; LEN] {
    let mut table = [0u8; LEN];
    table[..4].copy_from_slice(&[TAG, 0x00, 0x20, 0x41]);
    table[4..8].copy_from_slice(&entry.to_le_bytes());
    table[20..24].copy_from_slice(&self_address.to_le_bytes());
    table
}

/// An IVT whose boot data block sits right behind it, followed by that block.
#[cfg(test)]
pub(crate) fn build_with_boot_data(
    self_address: u32,
    start: u32,
    length: u32,
) -> [u8; LEN + 12] {
    let mut bytes = [0u8; LEN + 12];
    bytes[..LEN].copy_from_slice(&build(self_address, self_address + 0x1000));
    let boot_data = self_address + LEN as u32;
    bytes[16..20].copy_from_slice(&boot_data.to_le_bytes());
    bytes[LEN..LEN + 4].copy_from_slice(&start.to_le_bytes());
    bytes[LEN + 4..LEN + 8].copy_from_slice(&length.to_le_bytes());
    bytes
}
