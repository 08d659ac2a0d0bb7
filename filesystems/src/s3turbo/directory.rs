// Directory traversal and slot allocation
// The root is a fixed array of entries; subdirectories are cluster chains of
// 32-byte records terminated by the first empty slot.

use super::boot_sector::DIR_ENTRY_SIZE;
use super::dir_entry::{S3DirEntry, TYPE_EMPTY, TYPE_ERASED};
use super::fat12::cluster_values::*;
use super::image::{S3Image, FILLER};
use log::{debug, trace};
use s3turbo_core::{S3Error, S3Result, WarningKind};
use std::collections::HashSet;

/// Where a directory entry lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLocation {
    Root(usize),
    Cluster { cluster: u16, index: usize },
}

/// Live entries of one directory, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    /// Subdirectories, including the `.` and `..` entries
    pub dirs: Vec<S3DirEntry>,
    pub files: Vec<S3DirEntry>,
}

impl S3Image {
    /// Follow a chain through the allocation table.
    ///
    /// In compatibility mode a link to cluster 0 ends the chain with a
    /// warning instead of failing.
    pub fn walk_chain(&self, start: u16) -> S3Result<Vec<u16>> {
        if !self.policy.compatibility_mode {
            return self.fat.get_chain(start);
        }

        if start < FIRST_DATA_CLUSTER {
            return Err(S3Error::ChainReferencesReserved { cluster: start });
        }
        let mut chain = vec![start];
        let mut visited = HashSet::from([start]);
        let mut current = start;
        loop {
            let next = self.fat.next_cluster(current)?;
            match next {
                TERM => break,
                FREE_CLUSTER => {
                    self.warn(
                        WarningKind::BrokenChain,
                        format!("cluster {} links to cluster 0, chain cut short", current),
                    );
                    break;
                }
                1 => return Err(S3Error::ChainReferencesReserved { cluster: next }),
                _ => {
                    if !visited.insert(next) {
                        return Err(S3Error::MalformedTable(format!(
                            "circular chain starting at cluster {}",
                            start
                        )));
                    }
                    chain.push(next);
                    current = next;
                }
            }
        }
        Ok(chain)
    }

    fn entries_per_cluster(&self) -> usize {
        self.boot.cluster_size() / DIR_ENTRY_SIZE
    }

    /// Every slot of a directory in on-disk order, `None` meaning the root
    pub(crate) fn slot_locations(&self, dir: Option<u16>) -> S3Result<Vec<SlotLocation>> {
        match dir {
            None => Ok((0..self.boot.root_entries as usize)
                .map(SlotLocation::Root)
                .collect()),
            Some(start) => {
                let per_cluster = self.entries_per_cluster();
                Ok(self
                    .walk_chain(start)?
                    .into_iter()
                    .flat_map(|cluster| {
                        (0..per_cluster).map(move |index| SlotLocation::Cluster { cluster, index })
                    })
                    .collect())
            }
        }
    }

    fn slot_bytes(&self, loc: SlotLocation) -> &[u8] {
        const UNWRITTEN: [u8; DIR_ENTRY_SIZE] = [FILLER; DIR_ENTRY_SIZE];
        match loc {
            SlotLocation::Root(i) => &self.root[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE],
            SlotLocation::Cluster { cluster, index } => match self.clusters.get(&cluster) {
                Some(data) => &data[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE],
                None => &UNWRITTEN,
            },
        }
    }

    pub(crate) fn load_entry(&self, loc: SlotLocation) -> S3Result<S3DirEntry> {
        S3DirEntry::decode(self.slot_bytes(loc))
    }

    pub(crate) fn store_entry(&mut self, loc: SlotLocation, entry: &S3DirEntry) {
        self.store_raw(loc, &entry.encode());
    }

    fn store_raw(&mut self, loc: SlotLocation, raw: &[u8; DIR_ENTRY_SIZE]) {
        let slot = match loc {
            SlotLocation::Root(i) => &mut self.root[i * DIR_ENTRY_SIZE..(i + 1) * DIR_ENTRY_SIZE],
            SlotLocation::Cluster { cluster, index } => {
                &mut self.cluster_mut(cluster)[index * DIR_ENTRY_SIZE..(index + 1) * DIR_ENTRY_SIZE]
            }
        };
        slot.copy_from_slice(raw);
    }

    /// Entries up to the end-of-directory marker, erased ones included
    pub(crate) fn scan_dir(&self, dir: Option<u16>) -> S3Result<Vec<(SlotLocation, S3DirEntry)>> {
        let mut found = Vec::new();
        for loc in self.slot_locations(dir)? {
            let entry = self.load_entry(loc)?;
            if entry.is_empty() {
                break;
            }
            found.push((loc, entry));
        }
        trace!("Scanned {:?}: {} slots in use", dir, found.len());
        Ok(found)
    }

    /// List a directory, `None` meaning the root
    pub fn read_dir(&self, dir: Option<u16>) -> S3Result<DirListing> {
        let mut listing = DirListing::default();
        for (_, entry) in self.scan_dir(dir)? {
            if entry.is_erased() || entry.is_volume_label() {
                continue;
            }
            if entry.is_dir() {
                listing.dirs.push(entry);
            } else {
                listing.files.push(entry);
            }
        }
        Ok(listing)
    }

    /// Store `entry` in the first empty or erased slot of `parent`.
    ///
    /// The root fails with `RootDirectoryFull` once its slots are used up;
    /// a subdirectory grows by one zeroed cluster.
    pub fn add_directory_entry(
        &mut self,
        parent: Option<u16>,
        entry: &S3DirEntry,
    ) -> S3Result<SlotLocation> {
        let slots = self.slot_locations(parent)?;
        let free = slots.iter().position(|&loc| {
            let first = self.slot_bytes(loc)[0];
            first == TYPE_EMPTY || first == TYPE_ERASED
        });

        let loc = match (free, parent) {
            (Some(pos), _) => {
                let loc = slots[pos];
                let was_empty = self.slot_bytes(loc)[0] == TYPE_EMPTY;
                self.store_entry(loc, entry);
                // Keep the end-of-directory marker right after the new entry
                if was_empty {
                    if let Some(&next) = slots.get(pos + 1) {
                        if self.slot_bytes(next)[0] != TYPE_EMPTY {
                            self.store_raw(next, &[0u8; DIR_ENTRY_SIZE]);
                        }
                    }
                }
                loc
            }
            (None, None) => {
                return Err(S3Error::RootDirectoryFull {
                    capacity: self.boot.root_entries as usize,
                })
            }
            (None, Some(start)) => {
                let added = self.fat.extend_chain(start, 1)?;
                let cluster = added[0];
                debug!("Directory at {} extended with cluster {}", start, cluster);
                self.clusters
                    .insert(cluster, vec![0u8; self.boot.cluster_size()]);
                let loc = SlotLocation::Cluster { cluster, index: 0 };
                self.store_entry(loc, entry);
                loc
            }
        };

        trace!("Stored '{}' at {:?}", entry.decoded_name(), loc);
        Ok(loc)
    }
}
