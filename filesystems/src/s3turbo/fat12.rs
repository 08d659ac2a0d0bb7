// FAT12 allocation table
// Two 12-bit entries are packed into three bytes:
//   entry A = byte0 | (byte1 & 0x0F) << 8
//   entry B = byte1 >> 4 | byte2 << 4

use log::trace;
use s3turbo_core::{S3Error, S3Result};
use std::collections::HashSet;
use std::fmt;

/// FAT12 cluster values with special meanings
pub mod cluster_values {
    pub const FREE_CLUSTER: u16 = 0x000;
    /// Identifier stored in entry 0
    pub const FAT_ID: u16 = 0xFF9;
    /// End-of-chain marker, also stored in entry 1
    pub const TERM: u16 = 0xFFF;
    pub const FIRST_DATA_CLUSTER: u16 = 2;
}

use cluster_values::*;

fn pack(a: u16, b: u16) -> [u8; 3] {
    [
        (a & 0xFF) as u8,
        ((a >> 8) & 0x0F) as u8 | ((b & 0x0F) << 4) as u8,
        ((b >> 4) & 0xFF) as u8,
    ]
}

fn unpack(raw: &[u8]) -> (u16, u16) {
    let a = raw[0] as u16 | ((raw[1] as u16 & 0x0F) << 8);
    let b = (raw[1] as u16 >> 4) | ((raw[2] as u16) << 4);
    (a, b)
}

fn check_cluster(cluster: u16) -> S3Result<u16> {
    if cluster < FIRST_DATA_CLUSTER {
        return Err(S3Error::ChainReferencesReserved { cluster });
    }
    Ok(cluster)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat12Table {
    entries: Vec<u16>,
    /// One past the highest cluster the allocator may hand out
    limit: usize,
}

impl Fat12Table {
    /// Minimal table: identifier and terminator, padded with free entries
    /// up to `size_hint` bytes
    pub fn new(size_hint: Option<usize>) -> Self {
        let mut entries = vec![FAT_ID, TERM];
        if let Some(size) = size_hint {
            entries.resize((size / 3) * 2, FREE_CLUSTER);
        }
        let limit = entries.len();
        Self { entries, limit }
    }

    pub fn from_raw(raw: &[u8], size_hint: Option<usize>) -> S3Result<Self> {
        let mut raw = raw.to_vec();
        if let Some(size) = size_hint {
            if size > raw.len() {
                raw.resize(size, 0);
            }
        }

        if raw.len() % 3 != 0 {
            return Err(S3Error::MalformedTable(format!(
                "raw data size must be multiple of 3, is {}",
                raw.len()
            )));
        }
        if raw.len() < 3 {
            return Err(S3Error::MalformedTable(
                "raw data size must be at least 3 bytes".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(raw.len() / 3 * 2);
        for triplet in raw.chunks_exact(3) {
            let (a, b) = unpack(triplet);
            entries.push(a);
            entries.push(b);
        }

        if entries[0] != FAT_ID {
            return Err(S3Error::MalformedTable(format!(
                "expected FAT id {:#x}, got {:#x}",
                FAT_ID, entries[0]
            )));
        }
        if entries[1] != TERM {
            return Err(S3Error::MalformedTable(format!(
                "expected terminator {:#x}, got {:#x}",
                TERM, entries[1]
            )));
        }

        let limit = entries.len();
        Ok(Self { entries, limit })
    }

    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(self.entries.len() / 2 * 3 + 3);
        for pair in self.entries.chunks(2) {
            let b = pair.get(1).copied().unwrap_or(FREE_CLUSTER);
            raw.extend_from_slice(&pack(pair[0], b));
        }
        raw
    }

    /// Restrict allocation to clusters below `limit` (the data area may be
    /// smaller than the table)
    pub fn with_cluster_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(self.entries.len());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, cluster: u16) -> S3Result<u16> {
        self.entries
            .get(cluster as usize)
            .copied()
            .ok_or(S3Error::ClusterOutOfBounds {
                cluster,
                len: self.entries.len(),
            })
    }

    pub fn next_cluster(&self, cluster: u16) -> S3Result<u16> {
        check_cluster(cluster)?;
        if cluster == TERM {
            return Err(S3Error::EndOfChain { cluster });
        }
        self.get(cluster)
    }

    fn set(&mut self, cluster: u16, value: u16) {
        self.entries[cluster as usize] = value & 0xFFF;
    }

    /// First free cluster at or after `start`
    pub fn find_empty(&self, start: u16) -> Option<u16> {
        let start = start.max(FIRST_DATA_CLUSTER) as usize;
        (start..self.limit)
            .find(|&i| self.entries[i] == FREE_CLUSTER)
            .map(|i| i as u16)
    }

    pub fn free_count(&self) -> usize {
        self.entries[..self.limit]
            .iter()
            .skip(FIRST_DATA_CLUSTER as usize)
            .filter(|&&v| v == FREE_CLUSTER)
            .count()
    }

    pub fn get_chain(&self, start: u16) -> S3Result<Vec<u16>> {
        let mut chain = vec![check_cluster(start)?];
        let mut visited = HashSet::from([start]);

        let mut next = check_cluster(self.next_cluster(start)?)?;
        while next != TERM {
            if !visited.insert(next) {
                return Err(S3Error::MalformedTable(format!(
                    "circular chain starting at cluster {}",
                    start
                )));
            }
            chain.push(next);
            next = check_cluster(self.next_cluster(next)?)?;
        }
        trace!("Chain from {}: {} clusters", start, chain.len());
        Ok(chain)
    }

    /// Zero every entry of the chain, returning the number of freed clusters
    pub fn free_chain(&mut self, start: u16) -> S3Result<usize> {
        let chain = self.get_chain(start)?;
        for &cluster in &chain {
            self.set(cluster, FREE_CLUSTER);
        }
        Ok(chain.len())
    }

    /// Mark the given clusters free without walking links, for chains that
    /// were cut short or only partially linked
    pub fn release(&mut self, clusters: &[u16]) -> S3Result<()> {
        for &cluster in clusters {
            check_cluster(cluster)?;
            self.get(cluster)?;
        }
        for &cluster in clusters {
            self.set(cluster, FREE_CLUSTER);
        }
        Ok(())
    }

    /// Allocate `count` free clusters first-fit and link them into a chain.
    /// Nothing is modified when fewer than `count` clusters are free.
    pub fn create_chain(&mut self, count: usize) -> S3Result<Vec<u16>> {
        if count == 0 {
            return Err(S3Error::InvalidInput(
                "cannot create an empty chain".to_string(),
            ));
        }

        let mut chain = Vec::with_capacity(count);
        let mut hint = FIRST_DATA_CLUSTER;
        while chain.len() < count {
            match self.find_empty(hint) {
                Some(cluster) => {
                    chain.push(cluster);
                    hint = cluster + 1;
                }
                None => {
                    return Err(S3Error::AllocationExhausted {
                        requested: count,
                        available: chain.len(),
                    })
                }
            }
        }

        for pair in chain.windows(2) {
            self.set(pair[0], pair[1]);
        }
        if let Some(&last) = chain.last() {
            self.set(last, TERM);
        }
        Ok(chain)
    }

    /// Allocate `count` more clusters and link them after the chain's tail
    pub fn extend_chain(&mut self, start: u16, count: usize) -> S3Result<Vec<u16>> {
        let old_chain = self.get_chain(start)?;
        let new_chain = self.create_chain(count)?;
        if let Some(&tail) = old_chain.last() {
            self.set(tail, new_chain[0]);
        }
        Ok(new_chain)
    }
}

impl fmt::Display for Fat12Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.entries.chunks(16).enumerate() {
            write!(f, "{:#05x}:", i * 16)?;
            for v in row {
                write!(f, " {:#05x}", v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
