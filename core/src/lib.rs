pub mod diagnostics;
pub mod error;
pub mod policy;

pub use diagnostics::{Diagnostics, Warning, WarningKind};
pub use error::{ImageRegion, S3Error, S3Result};
pub use policy::{BootField, ReadPolicy, WriteOptions};
