// 32-byte directory entry

use crate::fat_common::names::{decode_name, encode_name};
use crate::fat_common::timestamps::FatDateTime;
use byteorder::{LittleEndian, ReadBytesExt};
use s3turbo_core::{S3Error, S3Result};
use static_assertions::const_assert_eq;
use std::io::{Cursor, Read};

use super::boot_sector::DIR_ENTRY_SIZE;

/// Directory entry attributes
pub mod attributes {
    pub const ATTR_READ_ONLY: u8 = 0x01;
    pub const ATTR_HIDDEN: u8 = 0x02;
    pub const ATTR_SYSTEM: u8 = 0x04;
    pub const ATTR_VOLUME_ID: u8 = 0x08;
    pub const ATTR_DIRECTORY: u8 = 0x10;
    pub const ATTR_ARCHIVE: u8 = 0x20;
}

/// First-byte markers
pub const TYPE_EMPTY: u8 = 0x00;
pub const TYPE_DOTDIR: u8 = 0x2E;
pub const TYPE_ERASED: u8 = 0xE5;

use attributes::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct S3DirEntry {
    pub short_name: [u8; 8],
    pub short_ext: [u8; 3],
    pub attr: u8,
    pub user_attr: u8,
    /// Original first name byte of an erased entry
    pub undel_char: u8,
    pub ctime: u16,
    pub cdate: u16,
    pub adate: u16,
    pub access: u16,
    pub mtime: u16,
    pub mdate: u16,
    pub start: u16,
    pub size: u32,
}

const_assert_eq!(8 + 3 + 3 + 2 * 7 + 4, DIR_ENTRY_SIZE);

/// Attributes and timestamps for entries created by `mkdir`/`copy`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryAttributes {
    pub attr: u8,
    pub user_attr: u8,
    /// Modification time; the current time when `None`
    pub modified: Option<FatDateTime>,
}

impl EntryAttributes {
    pub fn new(attr: u8) -> Self {
        Self {
            attr,
            ..Self::default()
        }
    }

    pub fn modified_at(mut self, modified: FatDateTime) -> Self {
        self.modified = Some(modified);
        self
    }
}

impl S3DirEntry {
    pub fn decode(raw: &[u8]) -> S3Result<Self> {
        if raw.len() < DIR_ENTRY_SIZE {
            return Err(S3Error::InvalidInput(format!(
                "directory entry needs {} bytes, got {}",
                DIR_ENTRY_SIZE,
                raw.len()
            )));
        }

        let mut cur = Cursor::new(raw);
        let mut e = Self::default();
        cur.read_exact(&mut e.short_name)?;
        cur.read_exact(&mut e.short_ext)?;
        e.attr = cur.read_u8()?;
        e.user_attr = cur.read_u8()?;
        e.undel_char = cur.read_u8()?;
        e.ctime = cur.read_u16::<LittleEndian>()?;
        e.cdate = cur.read_u16::<LittleEndian>()?;
        e.adate = cur.read_u16::<LittleEndian>()?;
        e.access = cur.read_u16::<LittleEndian>()?;
        e.mtime = cur.read_u16::<LittleEndian>()?;
        e.mdate = cur.read_u16::<LittleEndian>()?;
        e.start = cur.read_u16::<LittleEndian>()?;
        e.size = cur.read_u32::<LittleEndian>()?;
        Ok(e)
    }

    pub fn encode(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        raw[0..8].copy_from_slice(&self.short_name);
        raw[8..11].copy_from_slice(&self.short_ext);
        raw[11] = self.attr;
        raw[12] = self.user_attr;
        raw[13] = self.undel_char;
        raw[14..16].copy_from_slice(&self.ctime.to_le_bytes());
        raw[16..18].copy_from_slice(&self.cdate.to_le_bytes());
        raw[18..20].copy_from_slice(&self.adate.to_le_bytes());
        raw[20..22].copy_from_slice(&self.access.to_le_bytes());
        raw[22..24].copy_from_slice(&self.mtime.to_le_bytes());
        raw[24..26].copy_from_slice(&self.mdate.to_le_bytes());
        raw[26..28].copy_from_slice(&self.start.to_le_bytes());
        raw[28..32].copy_from_slice(&self.size.to_le_bytes());
        raw
    }

    /// New entry with the host name encoded into the 8.3 field
    pub fn with_name(host_name: &str, attrs: &EntryAttributes) -> Self {
        let is_dir = attrs.attr & ATTR_DIRECTORY != 0;
        let stamp = attrs.modified.unwrap_or_else(FatDateTime::now);
        let mut e = Self {
            attr: attrs.attr,
            user_attr: attrs.user_attr,
            ctime: stamp.time,
            cdate: stamp.date,
            adate: stamp.date,
            mtime: stamp.time,
            mdate: stamp.date,
            ..Self::default()
        };
        e.set_name(encode_name(host_name, is_dir));
        e
    }

    /// Volume label entry for root slot 0
    pub fn volume_label(label: &[u8; 11], stamp: FatDateTime) -> Self {
        let mut e = Self {
            attr: ATTR_VOLUME_ID,
            mtime: stamp.time,
            mdate: stamp.date,
            ..Self::default()
        };
        e.set_name(*label);
        e
    }

    pub fn is_empty(&self) -> bool {
        self.short_name[0] == TYPE_EMPTY
    }

    pub fn is_dotdir(&self) -> bool {
        self.short_name[0] == TYPE_DOTDIR
    }

    pub fn is_erased(&self) -> bool {
        self.short_name[0] == TYPE_ERASED
    }

    pub fn has_attr(&self, mask: u8) -> bool {
        self.attr & mask != 0
    }

    pub fn is_dir(&self) -> bool {
        self.has_attr(ATTR_DIRECTORY)
    }

    pub fn is_volume_label(&self) -> bool {
        self.has_attr(ATTR_VOLUME_ID)
    }

    /// Raw 11-byte name (name + extension)
    pub fn name(&self) -> [u8; 11] {
        let mut raw = [0u8; 11];
        raw[..8].copy_from_slice(&self.short_name);
        raw[8..].copy_from_slice(&self.short_ext);
        raw
    }

    pub fn set_name(&mut self, raw: [u8; 11]) {
        self.short_name.copy_from_slice(&raw[..8]);
        self.short_ext.copy_from_slice(&raw[8..]);
    }

    pub fn decoded_name(&self) -> String {
        decode_name(&self.name(), self.is_dir())
    }

    /// Mark the slot reusable, keeping the first name byte for undelete
    pub fn erase(&mut self) {
        self.undel_char = self.short_name[0];
        self.short_name[0] = TYPE_ERASED;
    }

    pub fn modified(&self) -> FatDateTime {
        FatDateTime::new(self.mdate, self.mtime)
    }
}
