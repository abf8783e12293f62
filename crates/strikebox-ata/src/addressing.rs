//! Cylinder/head/sector geometry and CHS <-> LBA translation.

/// A CHS address as found in the command block registers. Sectors are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chs {
    pub cylinder: u16,
    pub head: u8,
    pub sector: u8,
}

/// Logical translation geometry of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
}

/// Cylinder count reported once capacity exceeds what CHS can express.
pub const MAX_CHS_CYLINDERS: u16 = 16383;
/// Heads reachable through the 4-bit head field.
pub const MAX_HEADS: u8 = 16;

impl Geometry {
    /// Builds a geometry with as many cylinders as `capacity_sectors` fills, capped at
    /// [`MAX_CHS_CYLINDERS`]. Returns `None` for zero heads/sectors or more than 16 heads.
    pub fn from_capacity(capacity_sectors: u32, heads: u8, sectors_per_track: u8) -> Option<Self> {
        if heads == 0 || heads > MAX_HEADS || sectors_per_track == 0 {
            return None;
        }
        let per_cylinder = u32::from(heads) * u32::from(sectors_per_track);
        let cylinders = (capacity_sectors / per_cylinder).min(u32::from(MAX_CHS_CYLINDERS));
        Some(Self {
            cylinders: cylinders as u16,
            heads,
            sectors_per_track,
        })
    }

    pub fn total_sectors(&self) -> u32 {
        u32::from(self.cylinders) * u32::from(self.heads) * u32::from(self.sectors_per_track)
    }

    pub fn contains(&self, chs: Chs) -> bool {
        chs.cylinder < self.cylinders
            && chs.head < self.heads
            && chs.sector >= 1
            && chs.sector <= self.sectors_per_track
    }

    /// `LBA = (C * heads + H) * sectors_per_track + (S - 1)`.
    pub fn chs_to_lba(&self, chs: Chs) -> Option<u32> {
        if !self.contains(chs) {
            return None;
        }
        let track = u32::from(chs.cylinder) * u32::from(self.heads) + u32::from(chs.head);
        Some(track * u32::from(self.sectors_per_track) + u32::from(chs.sector) - 1)
    }

    pub fn lba_to_chs(&self, lba: u32) -> Option<Chs> {
        if lba >= self.total_sectors() {
            return None;
        }
        let spt = u32::from(self.sectors_per_track);
        let heads = u32::from(self.heads);
        let track = lba / spt;
        Some(Chs {
            cylinder: (track / heads) as u16,
            head: (track % heads) as u8,
            sector: (lba % spt) as u8 + 1,
        })
    }
}
