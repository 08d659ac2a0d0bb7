// S3 Turbo sampler disk images
// FAT12-style layout with 1024-byte clusters, a single FAT copy and a
// 160-entry root directory whose first slot is the volume label

pub mod boot_sector;
pub mod dir_entry;
pub mod directory;
pub mod fat12;
pub mod file_ops;
pub mod host;
pub mod image;
pub mod path_resolver;

#[cfg(test)]
mod tests;

pub use boot_sector::S3BootSector;
pub use dir_entry::{attributes, EntryAttributes, S3DirEntry};
pub use directory::{DirListing, SlotLocation};
pub use fat12::{cluster_values, Fat12Table};
pub use image::{S3Image, FILLER};
pub use path_resolver::S3Path;
