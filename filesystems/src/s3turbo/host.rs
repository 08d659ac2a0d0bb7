// Mirror directory trees between an image and the host filesystem

use super::dir_entry::{attributes::*, EntryAttributes, S3DirEntry};
use super::image::S3Image;
use crate::fat_common::timestamps::FatDateTime;
use log::{debug, info};
use s3turbo_core::{S3Error, S3Result, WarningKind, WriteOptions};
use std::fs::{self, File};
use std::path::Path;

/// True for `A:`, `A:\` and the empty path
fn is_root_path(path: &str) -> bool {
    let rest = match path.as_bytes() {
        [drive, b':', ..] if drive.is_ascii_alphabetic() => &path[2..],
        _ => path,
    };
    rest.chars().all(|c| c == '\\' || c == '/')
}

fn child_path(parent: &str, name: &str) -> String {
    format!("{}\\{}", parent.trim_end_matches(['\\', '/']), name)
}

/// Host file name for a decoded entry name; never leaves the target directory
fn host_name(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    if mapped.is_empty() || mapped.chars().all(|c| c == '.') {
        "_".repeat(mapped.len().max(1))
    } else {
        mapped
    }
}

impl S3Image {
    fn stamp_host_path(&self, path: &Path, entry: &S3DirEntry) {
        let Some(modified) = entry.modified().to_system_time() else {
            return;
        };
        let result = File::options()
            .write(!path.is_dir())
            .read(path.is_dir())
            .open(path)
            .and_then(|f| f.set_modified(modified));
        if let Err(e) = result {
            self.warn(
                WarningKind::HostIo,
                format!("cannot set time of '{}': {}", path.display(), e),
            );
        }
    }

    /// Write the subtree at `dir` (`None` for the root) below `target`
    pub fn extract_all(&self, target: &Path, dir: Option<u16>) -> S3Result<()> {
        fs::create_dir_all(target)?;
        let listing = self.read_dir(dir)?;

        for file in &listing.files {
            let dest = target.join(host_name(&file.decoded_name()));
            debug!("Extracting '{}'", dest.display());
            if let Err(e) = fs::write(&dest, self.extract_file(file)?) {
                if !self.policy().compatibility_mode {
                    return Err(e.into());
                }
                self.warn(
                    WarningKind::HostIo,
                    format!("cannot write '{}': {}", dest.display(), e),
                );
                continue;
            }
            self.stamp_host_path(&dest, file);
        }

        // The root has no `.` entry, it takes the volume label's time
        let mut own_stamp = match dir {
            None => Some(self.label_entry()?),
            Some(_) => None,
        };
        for sub in &listing.dirs {
            if sub.is_dotdir() {
                if sub.short_name[1] == b' ' {
                    own_stamp = Some(*sub);
                }
                continue;
            }
            self.extract_all(&target.join(host_name(&sub.decoded_name())), Some(sub.start))?;
        }

        // Stamped last, writing children changes the directory time
        if let Some(dot) = own_stamp {
            self.stamp_host_path(target, &dot);
        }
        Ok(())
    }

    /// Import the host tree at `source` into the image directory `target`
    pub fn add_directory(
        &mut self,
        source: &Path,
        target: &str,
        options: &WriteOptions,
    ) -> S3Result<()> {
        if !is_root_path(target) {
            match self.find_file(target)? {
                Some(entry) if entry.is_dir() => {}
                Some(_) => return Err(S3Error::NotADirectory(target.to_string())),
                None if options.create_parents => {
                    self.mkdir(target, &EntryAttributes::new(ATTR_DIRECTORY), options)?;
                }
                None => return Err(S3Error::NotFound(target.to_string())),
            }
        }

        let mut children: Vec<_> = fs::read_dir(source)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|e| e.file_name());

        for child in children {
            let name = child.file_name().to_string_lossy().into_owned();
            let meta = child.metadata()?;
            let stamp = meta
                .modified()
                .map(FatDateTime::from_system_time)
                .unwrap_or_else(|_| FatDateTime::now());
            let dest = child_path(target, &name);

            if meta.is_dir() {
                let attrs = EntryAttributes::new(ATTR_DIRECTORY).modified_at(stamp);
                self.mkdir(&dest, &attrs, options)?;
                self.add_directory(&child.path(), &dest, options)?;
            } else {
                let data = fs::read(child.path())?;
                let attrs = EntryAttributes::new(ATTR_ARCHIVE).modified_at(stamp);
                self.copy(&dest, &data, &attrs, options)?;
            }
        }

        info!("Imported '{}' into {}", source.display(), target);
        Ok(())
    }
}
