// Path parsing for image paths such as `A:\SOUNDS\PIANO.TXL`

use s3turbo_core::{S3Error, S3Result};

/// A parsed, drive-relative image path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Path {
    segments: Vec<String>,
}

fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl S3Path {
    /// Split on `\` (or `/`), dropping an optional leading drive prefix.
    /// Fails when no segment remains.
    pub fn parse(path: &str) -> S3Result<Self> {
        let mut parts: Vec<&str> = path.split(['\\', '/']).collect();
        if parts.first().map(|p| is_drive_prefix(p)).unwrap_or(false) {
            parts.remove(0);
        }

        let segments: Vec<String> = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            return Err(S3Error::MalformedPath(path.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn file_name(&self) -> &str {
        // parse() guarantees at least one segment
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn ancestors(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Self { segments }
    }
}

impl std::fmt::Display for S3Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A:\\{}", self.segments.join("\\"))
    }
}
