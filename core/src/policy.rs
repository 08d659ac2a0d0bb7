use crate::S3Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Every field of the boot sector, in on-disk order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootField {
    JumpCode,
    OemName,
    BytesPerSector,
    SectorsPerCluster,
    ReservedSectors,
    NumFats,
    RootEntries,
    TotalSectors,
    MediaDescriptor,
    SectorsPerFat,
    SectorsPerTrack,
    NumHeads,
    HiddenSectors,
    TotalSectorsExt,
    Reserved,
    VolumeSerial,
    VolumeLabel,
    FilesystemId,
}

impl BootField {
    pub const ALL: [BootField; 18] = [
        BootField::JumpCode,
        BootField::OemName,
        BootField::BytesPerSector,
        BootField::SectorsPerCluster,
        BootField::ReservedSectors,
        BootField::NumFats,
        BootField::RootEntries,
        BootField::TotalSectors,
        BootField::MediaDescriptor,
        BootField::SectorsPerFat,
        BootField::SectorsPerTrack,
        BootField::NumHeads,
        BootField::HiddenSectors,
        BootField::TotalSectorsExt,
        BootField::Reserved,
        BootField::VolumeSerial,
        BootField::VolumeLabel,
        BootField::FilesystemId,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BootField::JumpCode => "jump_code",
            BootField::OemName => "oem_name",
            BootField::BytesPerSector => "bytes_per_sector",
            BootField::SectorsPerCluster => "sectors_per_cluster",
            BootField::ReservedSectors => "reserved_sectors",
            BootField::NumFats => "num_fats",
            BootField::RootEntries => "root_entries",
            BootField::TotalSectors => "total_sectors",
            BootField::MediaDescriptor => "media_descriptor",
            BootField::SectorsPerFat => "sectors_per_fat",
            BootField::SectorsPerTrack => "sectors_per_track",
            BootField::NumHeads => "num_heads",
            BootField::HiddenSectors => "hidden_sectors",
            BootField::TotalSectorsExt => "total_sectors_ext",
            BootField::Reserved => "reserved",
            BootField::VolumeSerial => "volume_serial",
            BootField::VolumeLabel => "volume_label",
            BootField::FilesystemId => "filesystem_id",
        }
    }
}

impl fmt::Display for BootField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How strictly an image is validated while it is read.
///
/// In compatibility mode, mismatching boot-sector fields listed in
/// `tolerated_fields`, a wrong image size, chains linking to cluster 0 and
/// truncated files are reported as warnings instead of errors. Everything
/// else stays fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadPolicy {
    pub compatibility_mode: bool,
    /// Fields never compared against their canonical value
    pub ignored_fields: Vec<BootField>,
    /// Fields that may mismatch in compatibility mode; the canonical value is adopted
    pub tolerated_fields: Vec<BootField>,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            compatibility_mode: false,
            ignored_fields: vec![BootField::OemName],
            tolerated_fields: BootField::ALL
                .iter()
                .copied()
                .filter(|f| *f != BootField::OemName)
                .collect(),
        }
    }
}

impl ReadPolicy {
    pub fn strict() -> Self {
        Self::default()
    }

    pub fn compatible() -> Self {
        Self {
            compatibility_mode: true,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, S3Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, S3Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn ignores(&self, field: BootField) -> bool {
        self.ignored_fields.contains(&field)
    }

    pub fn tolerates(&self, field: BootField) -> bool {
        self.compatibility_mode && self.tolerated_fields.contains(&field)
    }
}

/// Options shared by the mutating operations (`mkdir`, `copy`, host import)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Create missing ancestor directories instead of failing
    pub create_parents: bool,
    /// Replace an existing destination instead of failing with a name collision
    pub overwrite: bool,
}

impl WriteOptions {
    pub fn with_parents() -> Self {
        Self {
            create_parents: true,
            overwrite: false,
        }
    }
}
