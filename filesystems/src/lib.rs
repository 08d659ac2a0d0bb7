// Disk image engine for the S3 Turbo sampler filesystem

pub mod fat_common;
pub mod s3turbo;

pub use s3turbo::{
    DirListing, EntryAttributes, Fat12Table, S3BootSector, S3DirEntry, S3Image, S3Path,
    SlotLocation,
};
pub use s3turbo_core::{ReadPolicy, S3Error, S3Result, WarningKind, WriteOptions};
