// Path-level operations on an image: lookup, extraction, mkdir, copy, remove

use super::boot_sector::DIR_ENTRY_SIZE;
use super::dir_entry::{attributes::*, EntryAttributes, S3DirEntry};
use super::directory::SlotLocation;
use super::fat12::cluster_values::*;
use super::image::{S3Image, FILLER};
use super::path_resolver::S3Path;
use crate::fat_common::names::encode_name;
use crate::fat_common::timestamps::FatDateTime;
use log::{debug, info};
use s3turbo_core::{S3Error, S3Result, WarningKind, WriteOptions};

/// A resolved entry and the slot holding it
#[derive(Debug, Clone, Copy)]
pub(crate) struct Located {
    pub slot: SlotLocation,
    pub entry: S3DirEntry,
}

fn matches_name(entry: &S3DirEntry, host_name: &str) -> bool {
    entry.name() == encode_name(host_name, entry.is_dir())
}

impl S3Image {
    fn lookup(&self, dir: Option<u16>, host_name: &str) -> S3Result<Option<(SlotLocation, S3DirEntry)>> {
        Ok(self.scan_dir(dir)?.into_iter().find(|(_, e)| {
            !e.is_erased() && !e.is_volume_label() && !e.is_dotdir() && matches_name(e, host_name)
        }))
    }

    /// Live entry that `name` clashes with, whether it would be stored as a
    /// file or as a directory
    fn find_collision(
        &self,
        dir: Option<u16>,
        name: &str,
    ) -> S3Result<Option<(SlotLocation, S3DirEntry)>> {
        let as_dir = encode_name(name, true);
        let as_file = encode_name(name, false);
        Ok(self.scan_dir(dir)?.into_iter().find(|(_, e)| {
            !e.is_erased()
                && !e.is_volume_label()
                && !e.is_dotdir()
                && (e.name() == as_dir || e.name() == as_file)
        }))
    }

    pub(crate) fn locate(&self, path: &S3Path) -> S3Result<Option<Located>> {
        let mut parent = None;
        for segment in path.ancestors() {
            match self.lookup(parent, segment)? {
                Some((_, entry)) if entry.is_dir() => parent = Some(entry.start),
                _ => return Ok(None),
            }
        }
        Ok(self
            .lookup(parent, path.file_name())?
            .map(|(slot, entry)| Located { slot, entry }))
    }

    /// Resolve a path such as `A:\SOUNDS\X.TXL`; `None` when any segment is
    /// missing
    pub fn find_file(&self, path: &str) -> S3Result<Option<S3DirEntry>> {
        let path = S3Path::parse(path)?;
        Ok(self.locate(&path)?.map(|found| found.entry))
    }

    /// Contents of a file entry, truncated to its declared size
    pub fn extract_file(&self, entry: &S3DirEntry) -> S3Result<Vec<u8>> {
        if entry.start < FIRST_DATA_CLUSTER && entry.size == 0 {
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(entry.size as usize);
        for cluster in self.walk_chain(entry.start)? {
            data.extend_from_slice(&self.cluster_data(cluster)?);
        }

        let size = entry.size as usize;
        if data.len() < size {
            let err = S3Error::TruncatedFile {
                name: entry.decoded_name(),
                expected: entry.size,
                actual: data.len(),
            };
            if !self.policy.compatibility_mode {
                return Err(err);
            }
            self.warn(WarningKind::TruncatedFile, err.to_string());
        }
        data.truncate(size);
        Ok(data)
    }

    /// Walk the ancestors of `path`, creating missing directories when
    /// `options.create_parents` is set
    fn resolve_parent(&mut self, path: &S3Path, options: &WriteOptions) -> S3Result<Option<u16>> {
        let mut parent = None;
        let mut walked = Vec::new();
        for segment in path.ancestors() {
            walked.push(segment.as_str());
            let here = || format!("A:\\{}", walked.join("\\"));
            parent = match self.lookup(parent, segment)? {
                Some((_, entry)) if entry.is_dir() => Some(entry.start),
                Some(_) => return Err(S3Error::NotADirectory(here())),
                None if options.create_parents => {
                    let attrs = EntryAttributes::new(ATTR_DIRECTORY);
                    Some(self.create_dir_in(parent, segment, &attrs)?.start)
                }
                None => return Err(S3Error::NotFound(here())),
            };
        }
        Ok(parent)
    }

    fn create_dir_in(
        &mut self,
        parent: Option<u16>,
        name: &str,
        attrs: &EntryAttributes,
    ) -> S3Result<S3DirEntry> {
        let mut attrs = *attrs;
        attrs.attr = (attrs.attr | ATTR_DIRECTORY) & !ATTR_VOLUME_ID;
        attrs.modified = Some(attrs.modified.unwrap_or_else(FatDateTime::now));

        let chain = self.fat.create_chain(1)?;
        let cluster = chain[0];

        let mut dot = S3DirEntry::with_name(".", &attrs);
        dot.start = cluster;
        let mut dotdot = S3DirEntry::with_name("..", &attrs);
        dotdot.start = parent.unwrap_or(FREE_CLUSTER);

        let mut data = vec![0u8; self.boot.cluster_size()];
        data[..DIR_ENTRY_SIZE].copy_from_slice(&dot.encode());
        data[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE].copy_from_slice(&dotdot.encode());
        self.clusters.insert(cluster, data);

        let mut entry = S3DirEntry::with_name(name, &attrs);
        entry.start = cluster;
        if let Err(e) = self.add_directory_entry(parent, &entry) {
            self.release_chain(&chain)?;
            return Err(e);
        }

        debug!("Created directory '{}' at cluster {}", name, cluster);
        Ok(entry)
    }

    /// Create a directory. An existing directory of the same name is
    /// returned unchanged when `options.overwrite` is set.
    pub fn mkdir(
        &mut self,
        path: &str,
        attrs: &EntryAttributes,
        options: &WriteOptions,
    ) -> S3Result<S3DirEntry> {
        let parsed = S3Path::parse(path)?;
        let parent = self.resolve_parent(&parsed, options)?;
        let name = parsed.file_name();

        if let Some((_, existing)) = self.find_collision(parent, name)? {
            let same_dir = existing.is_dir() && existing.name() == encode_name(name, true);
            if same_dir && options.overwrite {
                return Ok(existing);
            }
            return Err(S3Error::NameCollision(parsed.to_string()));
        }

        info!("mkdir {}", parsed);
        self.create_dir_in(parent, name, attrs)
    }

    /// Store `data` as a file. Empty files still occupy one cluster.
    pub fn copy(
        &mut self,
        path: &str,
        data: &[u8],
        attrs: &EntryAttributes,
        options: &WriteOptions,
    ) -> S3Result<S3DirEntry> {
        let parsed = S3Path::parse(path)?;
        let size = u32::try_from(data.len()).map_err(|_| {
            S3Error::InvalidInput(format!("{} bytes do not fit a file entry", data.len()))
        })?;
        let parent = self.resolve_parent(&parsed, options)?;
        let name = parsed.file_name();

        let mut attrs = *attrs;
        attrs.attr &= !(ATTR_DIRECTORY | ATTR_VOLUME_ID);

        let existing = self.find_collision(parent, name)?;
        if let Some((_, old)) = &existing {
            let same_file = !old.is_dir() && old.name() == encode_name(name, false);
            if !same_file || !options.overwrite {
                return Err(S3Error::NameCollision(parsed.to_string()));
            }
        }
        // The replaced chain is walked before anything changes so a corrupt
        // chain aborts the copy with the image untouched
        let old_chain = match &existing {
            Some((_, old)) if old.start >= FIRST_DATA_CLUSTER => self.walk_chain(old.start)?,
            _ => Vec::new(),
        };

        let cluster_size = self.boot.cluster_size();
        let count = data.len().div_ceil(cluster_size).max(1);
        let chain = self.fat.create_chain(count)?;
        let mut chunks = data.chunks(cluster_size);
        for &cluster in &chain {
            let mut block = vec![FILLER; cluster_size];
            if let Some(chunk) = chunks.next() {
                block[..chunk.len()].copy_from_slice(chunk);
            }
            self.clusters.insert(cluster, block);
        }

        let mut entry = S3DirEntry::with_name(name, &attrs);
        entry.start = chain[0];
        entry.size = size;

        match existing {
            Some((slot, _)) => {
                if let Err(e) = self.release_chain(&old_chain) {
                    self.release_chain(&chain)?;
                    return Err(e);
                }
                self.store_entry(slot, &entry);
            }
            None => {
                if let Err(e) = self.add_directory_entry(parent, &entry) {
                    self.release_chain(&chain)?;
                    return Err(e);
                }
            }
        }

        info!("copy {} ({} bytes, {} clusters)", parsed, size, chain.len());
        Ok(entry)
    }

    /// Erase a file or an empty directory and free its clusters
    pub fn remove(&mut self, path: &str) -> S3Result<()> {
        let parsed = S3Path::parse(path)?;
        let Located { slot, mut entry } = self
            .locate(&parsed)?
            .ok_or_else(|| S3Error::NotFound(parsed.to_string()))?;

        if entry.is_dir() {
            let listing = self.read_dir(Some(entry.start))?;
            let children = listing.dirs.iter().filter(|d| !d.is_dotdir()).count()
                + listing.files.len();
            if children > 0 {
                return Err(S3Error::InvalidInput(format!(
                    "directory {} is not empty",
                    parsed
                )));
            }
        }

        let chain = if entry.start >= FIRST_DATA_CLUSTER {
            self.walk_chain(entry.start)?
        } else {
            Vec::new()
        };
        entry.erase();
        self.store_entry(slot, &entry);
        self.release_chain(&chain)?;

        info!("remove {}", parsed);
        Ok(())
    }
}
