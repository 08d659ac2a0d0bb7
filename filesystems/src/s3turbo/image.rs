// S3 Turbo disk image
// Holds the boot sector, the allocation table, the raw root directory region
// and every allocated cluster; produces a byte-identical image on write

use super::boot_sector::{canonical, S3BootSector, BS_FIELDS_END, DIR_ENTRY_SIZE};
use super::dir_entry::S3DirEntry;
use super::fat12::{cluster_values::*, Fat12Table};
use crate::fat_common::timestamps::{date_to_string, time_to_string, FatDateTime};
use log::{debug, info};
use s3turbo_core::{
    Diagnostics, ImageRegion, ReadPolicy, S3Error, S3Result, Warning, WarningKind,
};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Byte written to clusters that hold no data
pub const FILLER: u8 = 0xCB;

pub struct S3Image {
    pub(crate) boot: S3BootSector,
    pub(crate) fat: Fat12Table,
    /// Root directory region, `root_size` bytes
    pub(crate) root: Vec<u8>,
    pub(crate) clusters: BTreeMap<u16, Vec<u8>>,
    pub(crate) policy: ReadPolicy,
    diagnostics: RefCell<Diagnostics>,
}

impl S3Image {
    /// Empty disk: canonical boot sector, minimal FAT, a blank volume label
    pub fn create_empty() -> Self {
        let boot = S3BootSector::new();
        let fat = Fat12Table::new(Some(boot.fat_size()))
            .with_cluster_limit(boot.last_data_cluster() as usize + 1);

        let mut root = vec![0u8; boot.root_size()];
        let label = S3DirEntry::volume_label(&[0x20; 11], FatDateTime::default());
        root[..DIR_ENTRY_SIZE].copy_from_slice(&label.encode());

        info!("Created empty image of {} bytes", boot.disk_size());
        Self {
            boot,
            fat,
            root,
            clusters: BTreeMap::new(),
            policy: ReadPolicy::default(),
            diagnostics: RefCell::new(Diagnostics::new()),
        }
    }

    /// Decode a raw image whose declared size is the buffer length
    pub fn read(data: &[u8], policy: ReadPolicy) -> S3Result<Self> {
        Self::read_with_size(data, data.len(), policy)
    }

    pub fn read_from<R: Read>(mut reader: R, policy: ReadPolicy) -> S3Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::read(&data, policy)
    }

    pub fn open(path: &Path, policy: ReadPolicy) -> S3Result<Self> {
        info!("Reading image '{}'", path.display());
        let file = File::open(path)?;
        Self::read_from(file, policy)
    }

    pub fn read_with_size(data: &[u8], declared_size: usize, policy: ReadPolicy) -> S3Result<Self> {
        let mut diagnostics = Diagnostics::new();

        // A buffer shorter than the boot fields is a size mismatch, not a parse error
        if data.len() < BS_FIELDS_END && !policy.compatibility_mode {
            let expected = S3BootSector::new().disk_size();
            let actual = if declared_size != expected { declared_size } else { data.len() };
            return Err(S3Error::SizeMismatch { expected, actual });
        }

        let sector_end = data.len().min(canonical::BYTES_PER_SECTOR as usize);
        let boot = S3BootSector::decode(&data[..sector_end], &policy, &mut diagnostics)?;
        let disk_size = boot.disk_size();

        if declared_size != disk_size || data.len() != disk_size {
            let actual = if declared_size != disk_size { declared_size } else { data.len() };
            if !policy.compatibility_mode {
                return Err(S3Error::SizeMismatch {
                    expected: disk_size,
                    actual,
                });
            }
            diagnostics.warn(
                WarningKind::ImageSize,
                format!("File size mismatch, is {}, should be {}", actual, disk_size),
            );
        }

        // Missing bytes read as unwritten clusters, excess bytes are ignored
        let mut buf = data.to_vec();
        buf.resize(disk_size, FILLER);

        let fat_offset = boot.fat_offset();
        let fat = Fat12Table::from_raw(&buf[fat_offset..fat_offset + boot.fat_size()], None)?
            .with_cluster_limit(boot.last_data_cluster() as usize + 1);

        let root_offset = boot.root_offset();
        let root = buf[root_offset..root_offset + boot.root_size()].to_vec();

        let first = S3DirEntry::decode(&root[..DIR_ENTRY_SIZE])?;
        if !first.is_volume_label() {
            return Err(S3Error::MissingVolumeLabel);
        }

        let mut clusters = BTreeMap::new();
        let cluster_size = boot.cluster_size();
        for cluster in FIRST_DATA_CLUSTER..=boot.last_data_cluster() {
            if fat.get(cluster)? == FREE_CLUSTER {
                continue;
            }
            let offset = boot.cluster_offset(cluster);
            clusters.insert(cluster, buf[offset..offset + cluster_size].to_vec());
        }
        debug!(
            "Read {} allocated clusters, {} free",
            clusters.len(),
            fat.free_count()
        );

        Ok(Self {
            boot,
            fat,
            root,
            clusters,
            policy,
            diagnostics: RefCell::new(diagnostics),
        })
    }

    /// Serialize to exactly `disk_size` bytes
    pub fn write(&self) -> Vec<u8> {
        let disk_size = self.boot.disk_size();
        let mut out = Vec::with_capacity(disk_size);

        out.extend_from_slice(&self.boot.encode());
        out.resize(self.boot.fat_offset(), 0);

        let mut fat_raw = self.fat.to_raw();
        fat_raw.resize(self.boot.fat_size(), 0);
        for _ in 0..self.boot.num_fats {
            out.extend_from_slice(&fat_raw);
        }

        out.resize(self.boot.root_offset(), 0);
        out.extend_from_slice(&self.root);
        out.resize(self.boot.first_data_cluster_offset(), 0);

        let filler = vec![FILLER; self.boot.cluster_size()];
        for cluster in FIRST_DATA_CLUSTER..=self.boot.last_data_cluster() {
            match self.clusters.get(&cluster) {
                Some(data) => out.extend_from_slice(data),
                None => out.extend_from_slice(&filler),
            }
        }

        out.resize(disk_size, FILLER);
        out
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> S3Result<()> {
        writer.write_all(&self.write())?;
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> S3Result<()> {
        info!("Writing image '{}'", path.display());
        let file = File::create(path)?;
        self.write_to(file)
    }

    /// Hex SHA-256 of the serialized image
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.write()))
    }

    /// Compare the serialized image with `reference`.
    ///
    /// On mismatch the images are compared region by region, then cluster by
    /// cluster, and the first differing region is reported with its offset.
    pub fn verify_roundtrip(&self, reference: &[u8]) -> S3Result<()> {
        let written = self.write();
        if Sha256::digest(&written) == Sha256::digest(reference) {
            debug!("Roundtrip verified, digest {}", hex::encode(Sha256::digest(&written)));
            return Ok(());
        }

        let regions = [
            (ImageRegion::BootSector, 0, self.boot.fat_offset()),
            (ImageRegion::AllocationTable, self.boot.fat_offset(), self.boot.root_offset()),
            (
                ImageRegion::RootDirectory,
                self.boot.root_offset(),
                self.boot.first_data_cluster_offset(),
            ),
        ];
        for (region, start, end) in regions {
            if written.get(start..end) != reference.get(start..end) {
                return Err(S3Error::RoundtripMismatch {
                    region,
                    offset: start,
                });
            }
        }

        let cluster_size = self.boot.cluster_size();
        for cluster in FIRST_DATA_CLUSTER..=self.boot.last_data_cluster() {
            let offset = self.boot.cluster_offset(cluster);
            let range = offset..offset + cluster_size;
            if written.get(range.clone()) != reference.get(range) {
                return Err(S3Error::RoundtripMismatch {
                    region: ImageRegion::Cluster(cluster),
                    offset,
                });
            }
        }

        let tail = self.boot.cluster_offset(self.boot.last_data_cluster() + 1);
        Err(S3Error::RoundtripMismatch {
            region: ImageRegion::Trailer,
            offset: tail,
        })
    }

    pub fn boot_sector(&self) -> &S3BootSector {
        &self.boot
    }

    pub fn fat(&self) -> &Fat12Table {
        &self.fat
    }

    pub fn policy(&self) -> &ReadPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: ReadPolicy) {
        self.policy = policy;
    }

    /// Validation failures downgraded to warnings so far
    pub fn warnings(&self) -> Vec<Warning> {
        self.diagnostics.borrow().warnings().to_vec()
    }

    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.diagnostics.borrow().has(kind)
    }

    pub(crate) fn warn(&self, kind: WarningKind, message: impl Into<String>) {
        self.diagnostics.borrow_mut().warn(kind, message);
    }

    pub fn free_clusters(&self) -> usize {
        self.fat.free_count()
    }

    pub fn free_bytes(&self) -> usize {
        self.free_clusters() * self.boot.cluster_size()
    }

    /// Contents of a cluster, filler bytes if it was never written
    pub fn cluster_data(&self, cluster: u16) -> S3Result<Vec<u8>> {
        if cluster < FIRST_DATA_CLUSTER || cluster > self.boot.last_data_cluster() {
            return Err(S3Error::ClusterOutOfBounds {
                cluster,
                len: self.boot.last_data_cluster() as usize + 1,
            });
        }
        Ok(self
            .clusters
            .get(&cluster)
            .cloned()
            .unwrap_or_else(|| vec![FILLER; self.boot.cluster_size()]))
    }

    pub(crate) fn cluster_mut(&mut self, cluster: u16) -> &mut Vec<u8> {
        let size = self.boot.cluster_size();
        self.clusters
            .entry(cluster)
            .or_insert_with(|| vec![FILLER; size])
    }

    /// Free a chain's table entries and drop its stored data
    pub(crate) fn release_chain(&mut self, chain: &[u16]) -> S3Result<()> {
        self.fat.release(chain)?;
        for cluster in chain {
            self.clusters.remove(cluster);
        }
        Ok(())
    }

    pub(crate) fn label_entry(&self) -> S3Result<S3DirEntry> {
        S3DirEntry::decode(&self.root[..DIR_ENTRY_SIZE])
    }

    fn store_label_entry(&mut self, entry: &S3DirEntry) {
        self.root[..DIR_ENTRY_SIZE].copy_from_slice(&entry.encode());
    }

    /// Volume label with padding removed
    pub fn volume_label(&self) -> S3Result<String> {
        let label = self.label_entry()?;
        Ok(crate::fat_common::names::decode_bytes(&label.name())
            .trim()
            .to_string())
    }

    /// Set the volume label, trimming it to 11 characters
    pub fn set_volume_label(&mut self, name: &str) -> S3Result<()> {
        let mut label = self.label_entry()?;
        if name.chars().count() > 11 {
            self.warn(WarningKind::Trimmed, "trimming volume name to 11 characters");
        }
        let mut raw = [0x20u8; 11];
        for (slot, c) in raw.iter_mut().zip(name.chars()) {
            *slot = crate::fat_common::names::encode_char(c);
        }
        label.set_name(raw);
        self.store_label_entry(&label);
        Ok(())
    }

    pub fn volume_timestamp(&self) -> S3Result<FatDateTime> {
        Ok(self.label_entry()?.modified())
    }

    pub fn set_volume_timestamp(&mut self, stamp: FatDateTime) -> S3Result<()> {
        let mut label = self.label_entry()?;
        label.mtime = stamp.time;
        label.mdate = stamp.date;
        self.store_label_entry(&label);
        Ok(())
    }

    /// Recursive listing of every directory, one line per entry
    pub fn list_contents(&self) -> S3Result<String> {
        let label = self.volume_label()?;
        let stamp = self.volume_timestamp()?;
        let rule = "-".repeat(80);

        let mut out = String::new();
        out.push_str(&format!("{}\n", rule));
        out.push_str(&format!(
            "Volume: {:<17} {} {}\n",
            if label.is_empty() { "<empty>" } else { label.as_str() },
            time_to_string(stamp.time),
            date_to_string(stamp.date)
        ));
        out.push_str(&format!("{}\n", rule));
        out.push_str(&format!(
            "{:^16} {:^8} {:^8} {:^10} Att Cluster (hex)\n",
            "Name", "Size", "Time", "Date"
        ));
        out.push_str(&format!("{}\n", rule));
        self.list_dir(None, "A:", &mut out)?;
        Ok(out)
    }

    fn list_dir(&self, cluster: Option<u16>, path: &str, out: &mut String) -> S3Result<()> {
        let listing = self.read_dir(cluster)?;
        out.push_str(path);
        out.push('\n');

        let subdirs: Vec<&S3DirEntry> = listing.dirs.iter().filter(|d| !d.is_dotdir()).collect();
        for entry in subdirs.iter().copied().chain(listing.files.iter()) {
            out.push_str(&format!(
                "  {:<14} {:>8} {} {}  {:2x} {:>7} ({:#x})\n",
                entry.decoded_name(),
                entry.size,
                time_to_string(entry.mtime),
                date_to_string(entry.mdate),
                entry.attr,
                entry.start,
                self.boot.cluster_offset(entry.start)
            ));
        }
        out.push('\n');

        for dir in subdirs {
            let sub_path = format!("{}\\{}", path, dir.decoded_name());
            self.list_dir(Some(dir.start), &sub_path, out)?;
        }
        Ok(())
    }
}
