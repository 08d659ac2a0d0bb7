use std::fmt;
use thiserror::Error;

/// Region of a raw image, used to locate roundtrip differences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRegion {
    BootSector,
    AllocationTable,
    RootDirectory,
    Cluster(u16),
    /// Bytes past the last addressable cluster, or a length difference
    Trailer,
}

impl fmt::Display for ImageRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRegion::BootSector => write!(f, "boot sector"),
            ImageRegion::AllocationTable => write!(f, "allocation table"),
            ImageRegion::RootDirectory => write!(f, "root directory"),
            ImageRegion::Cluster(c) => write!(f, "cluster {}", c),
            ImageRegion::Trailer => write!(f, "trailer"),
        }
    }
}

#[derive(Debug, Error)]
pub enum S3Error {
    #[error("Boot sector: {field} should be {expected}, is {actual}")]
    GeometryMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Image size mismatch: is {actual} bytes, should be {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Malformed allocation table: {0}")]
    MalformedTable(String),

    #[error("Invalid cluster {cluster}: reserved cluster referenced in chain")]
    ChainReferencesReserved { cluster: u16 },

    #[error("End of chain reached at cluster {cluster:#05x}")]
    EndOfChain { cluster: u16 },

    #[error("Invalid cluster {cluster}: out of bounds ({len} entries)")]
    ClusterOutOfBounds { cluster: u16, len: usize },

    #[error("Cannot allocate {requested} clusters, {available} free")]
    AllocationExhausted { requested: usize, available: usize },

    #[error("Volume information is not the first entry in the root directory")]
    MissingVolumeLabel,

    #[error("Malformed file path '{0}'")]
    MalformedPath(String),

    #[error("'{0}' already exists")]
    NameCollision(String),

    #[error("Root directory is full ({capacity} entries)")]
    RootDirectoryFull { capacity: usize },

    #[error("Unexpected end of file '{name}': {actual}/{expected} bytes")]
    TruncatedFile {
        name: String,
        expected: u32,
        actual: usize,
    },

    #[error("Roundtrip mismatch in {region} at offset {offset:#x}")]
    RoundtripMismatch { region: ImageRegion, offset: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl S3Error {
    /// Cluster named by a roundtrip mismatch, if the difference is inside the data area
    pub fn mismatched_cluster(&self) -> Option<u16> {
        match self {
            S3Error::RoundtripMismatch {
                region: ImageRegion::Cluster(c),
                ..
            } => Some(*c),
            _ => None,
        }
    }
}

pub type S3Result<T> = Result<T, S3Error>;
