// Boot sector of an S3 Turbo disk
// Fixed geometry: 1024-byte sectors, one sector per cluster, a single FAT

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use s3turbo_core::{BootField, Diagnostics, ReadPolicy, S3Error, S3Result, WarningKind};
use std::fmt;
use std::io::{Cursor, Read};

// Boot sector offsets
pub const BS_JMP_BOOT: usize = 0x00;
pub const BS_OEM_NAME: usize = 0x03;
pub const BPB_BYTES_PER_SEC: usize = 0x0B;
pub const BS_VOL_LAB: usize = 0x29;
pub const BS_FIL_SYS_TYPE: usize = 0x34;
/// End of the field area
pub const BS_FIELDS_END: usize = 0x3C;
pub const BS_AUTHOR: usize = 0x40;

pub const DIR_ENTRY_SIZE: usize = 32;

/// Signature the sampler writes into every boot sector
pub const AUTHOR_SIGNATURE: &[u8; 80] = b"**GENERALMUSIC**\
    **Disk__Driver**\
    ** Ver.  1.00 **\
    *** 16/10/90 ***\
    by F. Bracalenti";

/// Canonical values
pub mod canonical {
    pub const JUMP_CODE: [u8; 3] = [0xEB, 0x34, 0x90];
    pub const OEM_NAME: [u8; 8] = [0x20, 0x20, 0x20, 0x20, 0x20, 0x00, 0x00, 0xDA];
    pub const BYTES_PER_SECTOR: u16 = 1024;
    pub const SECTORS_PER_CLUSTER: u8 = 1;
    pub const RESERVED_SECTORS: u16 = 1;
    pub const NUM_FATS: u8 = 1;
    pub const ROOT_ENTRIES: u16 = 160;
    pub const TOTAL_SECTORS: u16 = 1600;
    pub const MEDIA_DESCRIPTOR: u8 = 0xF9;
    pub const SECTORS_PER_FAT: u16 = 3;
    pub const SECTORS_PER_TRACK: u16 = 10;
    pub const NUM_HEADS: u16 = 2;
    pub const HIDDEN_SECTORS: u32 = 0;
    pub const TOTAL_SECTORS_EXT: u32 = 50524719;
    pub const RESERVED: u8 = 0;
    pub const VOLUME_SERIAL: [u8; 4] = [0; 4];
    pub const VOLUME_LABEL: [u8; 11] = [0; 11];
    pub const FILESYSTEM_ID: [u8; 8] = [0; 8];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3BootSector {
    pub jump_code: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entries: u16,
    pub total_sectors: u16,
    pub media_descriptor: u8,
    pub sectors_per_fat: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_ext: u32,
    pub reserved: u8,
    pub volume_serial: [u8; 4],
    pub volume_label: [u8; 11],
    pub filesystem_id: [u8; 8],
    /// Sector bytes outside the fields (bootstrap area), kept verbatim
    boot_code: Vec<u8>,
}

impl Default for S3BootSector {
    fn default() -> Self {
        use canonical::*;
        Self {
            jump_code: JUMP_CODE,
            oem_name: OEM_NAME,
            bytes_per_sector: BYTES_PER_SECTOR,
            sectors_per_cluster: SECTORS_PER_CLUSTER,
            reserved_sectors: RESERVED_SECTORS,
            num_fats: NUM_FATS,
            root_entries: ROOT_ENTRIES,
            total_sectors: TOTAL_SECTORS,
            media_descriptor: MEDIA_DESCRIPTOR,
            sectors_per_fat: SECTORS_PER_FAT,
            sectors_per_track: SECTORS_PER_TRACK,
            num_heads: NUM_HEADS,
            hidden_sectors: HIDDEN_SECTORS,
            total_sectors_ext: TOTAL_SECTORS_EXT,
            reserved: RESERVED,
            volume_serial: VOLUME_SERIAL,
            volume_label: VOLUME_LABEL,
            filesystem_id: FILESYSTEM_ID,
            boot_code: vec![0; BYTES_PER_SECTOR as usize],
        }
    }
}

/// Compare each listed field against the canonical boot sector, either
/// failing, warning and adopting the canonical value, or ignoring it
macro_rules! check_fields {
    ($bs:ident, $canon:ident, $policy:ident, $diag:ident; $($field:ident => $kind:expr),+ $(,)?) => {
        $(
            if $bs.$field != $canon.$field && !$policy.ignores($kind) {
                let expected = format!("{:?}", $canon.$field);
                let actual = format!("{:?}", $bs.$field);
                if $policy.tolerates($kind) {
                    $diag.warn(
                        WarningKind::Geometry,
                        format!("{} should be {}, is {}, reverting to default", $kind, expected, actual),
                    );
                    $bs.$field = $canon.$field;
                } else {
                    return Err(S3Error::GeometryMismatch {
                        field: $kind.name().to_string(),
                        expected,
                        actual,
                    });
                }
            }
        )+
    };
}

impl S3BootSector {
    /// Canonical boot sector as written on a freshly created disk
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the field area without validation
    pub fn parse(raw: &[u8]) -> S3Result<Self> {
        if raw.len() < BS_FIELDS_END {
            return Err(S3Error::InvalidInput(format!(
                "boot sector needs {} bytes, got {}",
                BS_FIELDS_END,
                raw.len()
            )));
        }

        let mut cur = Cursor::new(raw);
        let mut bs = Self::default();
        cur.read_exact(&mut bs.jump_code)?;
        cur.read_exact(&mut bs.oem_name)?;
        bs.bytes_per_sector = cur.read_u16::<LittleEndian>()?;
        bs.sectors_per_cluster = cur.read_u8()?;
        bs.reserved_sectors = cur.read_u16::<LittleEndian>()?;
        bs.num_fats = cur.read_u8()?;
        bs.root_entries = cur.read_u16::<LittleEndian>()?;
        bs.total_sectors = cur.read_u16::<LittleEndian>()?;
        bs.media_descriptor = cur.read_u8()?;
        bs.sectors_per_fat = cur.read_u16::<LittleEndian>()?;
        bs.sectors_per_track = cur.read_u16::<LittleEndian>()?;
        bs.num_heads = cur.read_u16::<LittleEndian>()?;
        bs.hidden_sectors = cur.read_u32::<LittleEndian>()?;
        bs.total_sectors_ext = cur.read_u32::<LittleEndian>()?;
        bs.reserved = cur.read_u8()?;
        cur.read_exact(&mut bs.volume_serial)?;
        cur.read_exact(&mut bs.volume_label)?;
        cur.read_exact(&mut bs.filesystem_id)?;
        debug_assert_eq!(cur.position() as usize, BS_FIELDS_END);

        bs.boot_code = raw.to_vec();
        Ok(bs)
    }

    /// Parse and validate against the canonical geometry.
    ///
    /// Mismatches fail with `GeometryMismatch` unless the policy tolerates the
    /// field, in which case the canonical value replaces the on-disk one.
    pub fn decode(raw: &[u8], policy: &ReadPolicy, diag: &mut Diagnostics) -> S3Result<Self> {
        let mut bs = Self::parse(raw)?;
        let canon = Self::default();

        check_fields!(bs, canon, policy, diag;
            jump_code => BootField::JumpCode,
            oem_name => BootField::OemName,
            bytes_per_sector => BootField::BytesPerSector,
            sectors_per_cluster => BootField::SectorsPerCluster,
            reserved_sectors => BootField::ReservedSectors,
            num_fats => BootField::NumFats,
            root_entries => BootField::RootEntries,
            total_sectors => BootField::TotalSectors,
            media_descriptor => BootField::MediaDescriptor,
            sectors_per_fat => BootField::SectorsPerFat,
            sectors_per_track => BootField::SectorsPerTrack,
            num_heads => BootField::NumHeads,
            hidden_sectors => BootField::HiddenSectors,
            total_sectors_ext => BootField::TotalSectorsExt,
            reserved => BootField::Reserved,
            volume_serial => BootField::VolumeSerial,
            volume_label => BootField::VolumeLabel,
            filesystem_id => BootField::FilesystemId,
        );

        debug!(
            "Boot sector: {} bytes/sector, {} root entries, {} sectors",
            bs.bytes_per_sector, bs.root_entries, bs.total_sectors
        );
        Ok(bs)
    }

    /// Serialize to exactly one sector: fields in order, then the author signature
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = self.boot_code.clone();
        raw.resize(self.sector_size().max(BS_AUTHOR + AUTHOR_SIGNATURE.len()), 0);

        raw[BS_JMP_BOOT..BS_OEM_NAME].copy_from_slice(&self.jump_code);
        raw[BS_OEM_NAME..BPB_BYTES_PER_SEC].copy_from_slice(&self.oem_name);
        raw[0x0B..0x0D].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        raw[0x0D] = self.sectors_per_cluster;
        raw[0x0E..0x10].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        raw[0x10] = self.num_fats;
        raw[0x11..0x13].copy_from_slice(&self.root_entries.to_le_bytes());
        raw[0x13..0x15].copy_from_slice(&self.total_sectors.to_le_bytes());
        raw[0x15] = self.media_descriptor;
        raw[0x16..0x18].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        raw[0x18..0x1A].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        raw[0x1A..0x1C].copy_from_slice(&self.num_heads.to_le_bytes());
        raw[0x1C..0x20].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        raw[0x20..0x24].copy_from_slice(&self.total_sectors_ext.to_le_bytes());
        raw[0x24] = self.reserved;
        raw[0x25..BS_VOL_LAB].copy_from_slice(&self.volume_serial);
        raw[BS_VOL_LAB..BS_FIL_SYS_TYPE].copy_from_slice(&self.volume_label);
        raw[BS_FIL_SYS_TYPE..BS_FIELDS_END].copy_from_slice(&self.filesystem_id);

        raw[BS_AUTHOR..BS_AUTHOR + AUTHOR_SIGNATURE.len()].copy_from_slice(AUTHOR_SIGNATURE);
        raw
    }

    pub fn sector_size(&self) -> usize {
        self.bytes_per_sector as usize
    }

    pub fn fat_offset(&self) -> usize {
        self.reserved_sectors as usize * self.sector_size()
    }

    pub fn fat_size(&self) -> usize {
        self.sectors_per_fat as usize * self.sector_size()
    }

    pub fn root_offset(&self) -> usize {
        self.fat_offset() + self.num_fats as usize * self.fat_size()
    }

    pub fn root_size(&self) -> usize {
        self.root_entries as usize * DIR_ENTRY_SIZE
    }

    pub fn cluster_size(&self) -> usize {
        self.sectors_per_cluster as usize * self.sector_size()
    }

    pub fn disk_size(&self) -> usize {
        self.sector_size() * self.total_sectors as usize
    }

    pub fn first_data_cluster_offset(&self) -> usize {
        self.root_offset() + self.root_size()
    }

    /// Number of clusters that fit in the data area
    pub fn data_cluster_count(&self) -> usize {
        match self.cluster_size() {
            0 => 0,
            cs => self.disk_size().saturating_sub(self.first_data_cluster_offset()) / cs,
        }
    }

    /// Highest cluster index backed by disk space
    pub fn last_data_cluster(&self) -> u16 {
        (self.data_cluster_count() + 1) as u16
    }

    /// Byte offset of a data cluster (clusters are numbered from 2)
    pub fn cluster_offset(&self, cluster: u16) -> usize {
        self.first_data_cluster_offset() + self.cluster_size() * (cluster as usize).saturating_sub(2)
    }
}

impl fmt::Display for S3BootSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20}: {:02x?}", BootField::JumpCode, self.jump_code)?;
        writeln!(f, "{:<20}: {:02x?}", BootField::OemName, self.oem_name)?;
        writeln!(f, "{:<20}: {}", BootField::BytesPerSector, self.bytes_per_sector)?;
        writeln!(f, "{:<20}: {}", BootField::SectorsPerCluster, self.sectors_per_cluster)?;
        writeln!(f, "{:<20}: {}", BootField::ReservedSectors, self.reserved_sectors)?;
        writeln!(f, "{:<20}: {}", BootField::NumFats, self.num_fats)?;
        writeln!(f, "{:<20}: {}", BootField::RootEntries, self.root_entries)?;
        writeln!(f, "{:<20}: {}", BootField::TotalSectors, self.total_sectors)?;
        writeln!(f, "{:<20}: {:#04x}", BootField::MediaDescriptor, self.media_descriptor)?;
        writeln!(f, "{:<20}: {}", BootField::SectorsPerFat, self.sectors_per_fat)?;
        writeln!(f, "{:<20}: {}", BootField::SectorsPerTrack, self.sectors_per_track)?;
        writeln!(f, "{:<20}: {}", BootField::NumHeads, self.num_heads)?;
        writeln!(f, "{:<20}: {}", BootField::HiddenSectors, self.hidden_sectors)?;
        writeln!(f, "{:<20}: {}", BootField::TotalSectorsExt, self.total_sectors_ext)?;
        writeln!(f, "{:<20}: {}", BootField::Reserved, self.reserved)?;
        writeln!(f, "{:<20}: {:02x?}", BootField::VolumeSerial, self.volume_serial)?;
        writeln!(f, "{:<20}: {:02x?}", BootField::VolumeLabel, self.volume_label)?;
        writeln!(f, "{:<20}: {:02x?}", BootField::FilesystemId, self.filesystem_id)?;
        writeln!(f)?;
        writeln!(f, "fat_offset   : {:>10}", format!("{:#x}", self.fat_offset()))?;
        writeln!(f, "fat_size     : {:>10}", self.fat_size())?;
        writeln!(f, "root_offset  : {:>10}", format!("{:#x}", self.root_offset()))?;
        writeln!(f, "root_size    : {:>10}", self.root_size())?;
        writeln!(f, "cluster_size : {:>10}", self.cluster_size())?;
        write!(f, "disk_size    : {:>10}", self.disk_size())
    }
}
