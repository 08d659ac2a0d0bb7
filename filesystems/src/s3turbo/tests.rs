// Image-level scenarios: creation, mutation, read/write roundtrips and the
// compatibility-mode recovery paths

use super::attributes::*;
use super::boot_sector::canonical;
use super::*;
use crate::fat_common::timestamps::{encode_date, encode_time, FatDateTime};
use s3turbo_core::{ImageRegion, ReadPolicy, S3Error, WarningKind, WriteOptions};

const DISK_SIZE: usize = 0x190000;
const FAT_OFFSET: usize = 0x400;
const ROOT_OFFSET: usize = 0x1000;
const DATA_OFFSET: usize = 0x2400;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn stamp() -> FatDateTime {
    FatDateTime::new(encode_date(1990, 10, 16), encode_time(12, 30, 10))
}

fn file_attrs() -> EntryAttributes {
    EntryAttributes::new(ATTR_ARCHIVE).modified_at(stamp())
}

fn dir_attrs() -> EntryAttributes {
    EntryAttributes::new(ATTR_DIRECTORY).modified_at(stamp())
}

fn sample_image() -> S3Image {
    let mut image = S3Image::create_empty();
    image
        .mkdir("A:\\SOUNDS", &dir_attrs(), &WriteOptions::default())
        .unwrap();
    image
        .copy("A:\\SOUNDS\\X.TXL", &[0x01; 50], &file_attrs(), &WriteOptions::default())
        .unwrap();
    image
        .copy("A:\\BIG.TXT", &vec![0x42; 3000], &file_attrs(), &WriteOptions::default())
        .unwrap();
    image
}

#[test]
fn test_empty_image_layout() {
    init_logging();
    let raw = S3Image::create_empty().write();

    assert_eq!(raw.len(), DISK_SIZE);
    assert_eq!(&raw[0..3], &canonical::JUMP_CODE);
    assert_eq!(&raw[0x40..0x50], b"**GENERALMUSIC**");
    assert_eq!(&raw[FAT_OFFSET..FAT_OFFSET + 3], &[0xF9, 0xFF, 0xFF]);
    assert!(raw[FAT_OFFSET + 3..ROOT_OFFSET].iter().all(|&b| b == 0));

    assert_eq!(&raw[ROOT_OFFSET..ROOT_OFFSET + 11], b"           ");
    assert_eq!(raw[ROOT_OFFSET + 11], ATTR_VOLUME_ID);
    assert!(raw[ROOT_OFFSET + 12..DATA_OFFSET].iter().all(|&b| b == 0));
    assert!(raw[DATA_OFFSET..].iter().all(|&b| b == FILLER));
}

#[test]
fn test_empty_image_geometry() {
    let image = S3Image::create_empty();
    let boot = image.boot_sector();
    assert_eq!(boot.fat_offset(), FAT_OFFSET);
    assert_eq!(boot.root_offset(), ROOT_OFFSET);
    assert_eq!(boot.first_data_cluster_offset(), DATA_OFFSET);
    assert_eq!(boot.last_data_cluster(), 1592);
    assert_eq!(image.free_clusters(), 1591);
    assert_eq!(image.free_bytes(), 1591 * 1024);
    assert_eq!(image.volume_label().unwrap(), "");

    let listing = image.read_dir(None).unwrap();
    assert!(listing.dirs.is_empty());
    assert!(listing.files.is_empty());
}

#[test]
fn test_mkdir_copy_extract() {
    init_logging();
    let image = sample_image();

    let entry = image.find_file("A:\\SOUNDS\\X.TXL").unwrap().unwrap();
    assert_eq!(entry.size, 50);
    assert_eq!(entry.decoded_name(), "X.TXL");
    assert_eq!(image.fat().get_chain(entry.start).unwrap(), vec![entry.start]);
    assert_eq!(image.extract_file(&entry).unwrap(), vec![0x01; 50]);

    // Unused tail of the last cluster is filler
    let cluster = image.cluster_data(entry.start).unwrap();
    assert!(cluster[50..].iter().all(|&b| b == FILLER));

    let big = image.find_file("BIG.TXT").unwrap().unwrap();
    assert_eq!(image.fat().get_chain(big.start).unwrap().len(), 3);
    assert_eq!(image.extract_file(&big).unwrap(), vec![0x42; 3000]);
}

#[test]
fn test_find_file_misses() {
    let image = sample_image();
    assert!(image.find_file("A:\\SOUNDS\\NOPE.TXL").unwrap().is_none());
    assert!(image.find_file("A:\\NOPE\\X.TXL").unwrap().is_none());
    // A file in an ancestor position never resolves
    assert!(image.find_file("A:\\BIG.TXT\\X.TXL").unwrap().is_none());
    assert!(matches!(image.find_file(""), Err(S3Error::MalformedPath(_))));
    assert!(matches!(image.find_file("A:\\"), Err(S3Error::MalformedPath(_))));

    let sounds = image.find_file("A:\\SOUNDS").unwrap().unwrap();
    assert!(sounds.is_dir());
}

#[test]
fn test_dot_entries() {
    let mut image = sample_image();
    let piano = image
        .mkdir("A:\\SOUNDS\\PIANO", &dir_attrs(), &WriteOptions::default())
        .unwrap();
    let sounds = image.find_file("A:\\SOUNDS").unwrap().unwrap();

    let listing = image.read_dir(Some(sounds.start)).unwrap();
    assert_eq!(listing.dirs.len(), 3);
    assert_eq!(&listing.dirs[0].name(), b".          ");
    assert_eq!(listing.dirs[0].start, sounds.start);
    assert_eq!(&listing.dirs[1].name(), b"..         ");
    assert_eq!(listing.dirs[1].start, 0);
    assert_eq!(listing.dirs[2], piano);
    assert_eq!(listing.files.len(), 1);

    let inner = image.read_dir(Some(piano.start)).unwrap();
    assert_eq!(inner.dirs[0].start, piano.start);
    assert_eq!(inner.dirs[1].start, sounds.start);
    assert!(inner.files.is_empty());
}

#[test]
fn test_root_directory_full() {
    init_logging();
    let mut image = S3Image::create_empty();
    // Slot 0 holds the volume label
    for i in 0..159 {
        image
            .copy(&format!("F{:03}.TXT", i), b"x", &file_attrs(), &WriteOptions::default())
            .unwrap();
    }
    let free = image.free_clusters();

    let err = image
        .copy("F159.TXT", b"x", &file_attrs(), &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, S3Error::RootDirectoryFull { capacity: 160 }));
    // The allocation for the rejected file was rolled back
    assert_eq!(image.free_clusters(), free);
    assert_eq!(image.read_dir(None).unwrap().files.len(), 159);
}

#[test]
fn test_subdirectory_grows_by_one_cluster() {
    let mut image = S3Image::create_empty();
    let dir = image
        .mkdir("A:\\SOUNDS", &dir_attrs(), &WriteOptions::default())
        .unwrap();

    // 32 slots per cluster, two taken by `.` and `..`
    for i in 0..31 {
        image
            .copy(&format!("A:\\SOUNDS\\S{:02}.TXL", i), &[i as u8], &file_attrs(), &WriteOptions::default())
            .unwrap();
    }

    assert_eq!(image.fat().get_chain(dir.start).unwrap().len(), 2);
    let listing = image.read_dir(Some(dir.start)).unwrap();
    assert_eq!(listing.files.len(), 31);
    let last = image.find_file("A:\\SOUNDS\\S30.TXL").unwrap().unwrap();
    assert_eq!(image.extract_file(&last).unwrap(), vec![30]);
}

#[test]
fn test_name_collision() {
    let mut image = sample_image();

    let err = image
        .copy("A:\\SOUNDS\\X.TXL", b"again", &file_attrs(), &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, S3Error::NameCollision(_)));

    let err = image
        .mkdir("A:\\SOUNDS", &dir_attrs(), &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, S3Error::NameCollision(_)));

    // A directory never gets replaced by a file
    let overwrite = WriteOptions {
        overwrite: true,
        ..WriteOptions::default()
    };
    let err = image
        .copy("A:\\SOUNDS", b"file", &file_attrs(), &overwrite)
        .unwrap_err();
    assert!(matches!(err, S3Error::NameCollision(_)));

    // mkdir over an existing directory is a no-op with overwrite
    let sounds = image.find_file("A:\\SOUNDS").unwrap().unwrap();
    assert_eq!(image.mkdir("A:\\SOUNDS", &dir_attrs(), &overwrite).unwrap(), sounds);
}

#[test]
fn test_overwrite_replaces_file() {
    let mut image = sample_image();
    let old = image.find_file("BIG.TXT").unwrap().unwrap();
    let free_before = image.free_clusters();

    let overwrite = WriteOptions {
        overwrite: true,
        ..WriteOptions::default()
    };
    image
        .copy("A:\\BIG.TXT", b"small", &file_attrs(), &overwrite)
        .unwrap();

    let new = image.find_file("BIG.TXT").unwrap().unwrap();
    assert_eq!(image.extract_file(&new).unwrap(), b"small");
    assert_eq!(image.free_clusters(), free_before + 2);
    assert_eq!(image.read_dir(None).unwrap().files.len(), 1);
    assert_ne!(new.start, old.start);
}

#[test]
fn test_file_and_directory_names_collide() {
    let mut image = S3Image::create_empty();
    let overwrite = WriteOptions {
        overwrite: true,
        ..WriteOptions::default()
    };

    // Directories and files pad names differently on disk
    image
        .mkdir("A:\\X.TXL", &dir_attrs(), &WriteOptions::default())
        .unwrap();
    for options in [WriteOptions::default(), overwrite] {
        let err = image
            .copy("A:\\X.TXL", b"data", &file_attrs(), &options)
            .unwrap_err();
        assert!(matches!(err, S3Error::NameCollision(_)));
    }

    image
        .copy("A:\\Y.TXL", b"data", &file_attrs(), &WriteOptions::default())
        .unwrap();
    for options in [WriteOptions::default(), overwrite] {
        let err = image
            .mkdir("A:\\Y.TXL", &dir_attrs(), &options)
            .unwrap_err();
        assert!(matches!(err, S3Error::NameCollision(_)));
    }

    let listing = image.read_dir(None).unwrap();
    assert_eq!(listing.dirs.len(), 1);
    assert_eq!(listing.files.len(), 1);
    assert!(image.find_file("A:\\X.TXL").unwrap().unwrap().is_dir());
    assert!(!image.find_file("A:\\Y.TXL").unwrap().unwrap().is_dir());
}

#[test]
fn test_overwrite_with_corrupt_chain_leaves_image_unchanged() {
    init_logging();
    let mut raw = sample_image().write();
    // BIG.TXT is 4,5,6; point 5 at reserved cluster 1
    let triplet = FAT_OFFSET + 3 * 2;
    raw[triplet + 1] = (raw[triplet + 1] & 0x0F) | 0x10;
    raw[triplet + 2] = 0;
    let mut image = S3Image::read(&raw, ReadPolicy::strict()).unwrap();
    let digest = image.digest();
    let free = image.free_clusters();
    let old = image.find_file("BIG.TXT").unwrap().unwrap();

    let overwrite = WriteOptions {
        overwrite: true,
        ..WriteOptions::default()
    };
    let err = image
        .copy("A:\\BIG.TXT", b"new", &file_attrs(), &overwrite)
        .unwrap_err();
    assert!(matches!(err, S3Error::ChainReferencesReserved { cluster: 1 }));

    assert_eq!(image.digest(), digest);
    assert_eq!(image.free_clusters(), free);
    assert_eq!(image.find_file("BIG.TXT").unwrap().unwrap(), old);
}

#[test]
fn test_copy_drops_volume_attribute() {
    let mut image = S3Image::create_empty();
    image.set_volume_label("DISK").unwrap();
    let attrs = EntryAttributes::new(ATTR_VOLUME_ID | ATTR_ARCHIVE).modified_at(stamp());

    let stored = image
        .copy("A:\\NOTES.TXT", b"hello", &attrs, &WriteOptions::default())
        .unwrap();
    assert!(!stored.is_volume_label());
    assert!(stored.has_attr(ATTR_ARCHIVE));

    let found = image.find_file("A:\\NOTES.TXT").unwrap().unwrap();
    assert_eq!(found, stored);
    assert_eq!(image.extract_file(&found).unwrap(), b"hello");
    assert_eq!(image.read_dir(None).unwrap().files, vec![stored]);
    assert_eq!(image.volume_label().unwrap(), "DISK");

    let dir = image
        .mkdir("A:\\SUB", &EntryAttributes::new(ATTR_VOLUME_ID), &WriteOptions::default())
        .unwrap();
    assert!(dir.is_dir());
    assert!(!dir.is_volume_label());
    assert!(image.find_file("A:\\SUB").unwrap().is_some());
}

#[test]
fn test_missing_parent() {
    let mut image = S3Image::create_empty();
    let err = image
        .copy("A:\\SOUNDS\\PIANO\\X.TXL", b"x", &file_attrs(), &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, S3Error::NotFound(ref p) if p == "A:\\SOUNDS"));

    image
        .copy("A:\\SOUNDS\\PIANO\\X.TXL", b"x", &file_attrs(), &WriteOptions::with_parents())
        .unwrap();
    assert!(image.find_file("A:\\SOUNDS\\PIANO").unwrap().unwrap().is_dir());
    assert!(image.find_file("A:\\SOUNDS\\PIANO\\X.TXL").unwrap().is_some());

    let err = image
        .mkdir("A:\\SOUNDS\\PIANO\\X.TXL\\SUB", &dir_attrs(), &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, S3Error::NotADirectory(_)));
}

#[test]
fn test_empty_file_takes_one_cluster() {
    let mut image = S3Image::create_empty();
    let entry = image
        .copy("EMPTY.TXT", &[], &file_attrs(), &WriteOptions::default())
        .unwrap();

    assert_eq!(entry.size, 0);
    assert!(entry.start >= 2);
    assert_eq!(image.free_clusters(), 1590);
    assert!(image.extract_file(&entry).unwrap().is_empty());
}

#[test]
fn test_allocation_exhausted_leaves_image_unchanged() {
    let mut image = S3Image::create_empty();
    let before = image.digest();

    let err = image
        .copy("HUGE.BIN", &vec![0u8; 1592 * 1024], &file_attrs(), &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        S3Error::AllocationExhausted {
            requested: 1592,
            available: 1591
        }
    ));
    assert_eq!(image.digest(), before);
}

#[test]
fn test_remove() {
    let mut image = sample_image();
    let free = image.free_clusters();

    let err = image.remove("A:\\SOUNDS").unwrap_err();
    assert!(matches!(err, S3Error::InvalidInput(_)));

    image.remove("A:\\SOUNDS\\X.TXL").unwrap();
    assert!(image.find_file("A:\\SOUNDS\\X.TXL").unwrap().is_none());
    assert_eq!(image.free_clusters(), free + 1);

    image.remove("A:\\SOUNDS").unwrap();
    assert_eq!(image.free_clusters(), free + 2);
    assert!(matches!(image.remove("A:\\SOUNDS"), Err(S3Error::NotFound(_))));

    // Erased slots keep the original first byte and are reused
    let root = &image.write()[ROOT_OFFSET..DATA_OFFSET];
    assert_eq!(root[32], 0xE5);
    assert_eq!(root[32 + 13], b'S');
    image
        .copy("NEW.TXT", b"n", &file_attrs(), &WriteOptions::default())
        .unwrap();
    assert_eq!(&image.write()[ROOT_OFFSET + 32..ROOT_OFFSET + 43], b"NEW     TXT");
}

#[test]
fn test_roundtrip_after_mutation() {
    init_logging();
    let raw = sample_image().write();

    let image = S3Image::read(&raw, ReadPolicy::strict()).unwrap();
    assert!(image.warnings().is_empty());
    image.verify_roundtrip(&raw).unwrap();

    let entry = image.find_file("A:\\SOUNDS\\X.TXL").unwrap().unwrap();
    assert_eq!(image.extract_file(&entry).unwrap(), vec![0x01; 50]);
}

#[test]
fn test_roundtrip_preserves_unused_bytes() {
    let mut raw = S3Image::create_empty().write();
    // Boot code and root slots past the end marker are not interpreted
    raw[0x100] = 0x55;
    raw[ROOT_OFFSET + 5 * 32 + 3] = 0x77;

    let image = S3Image::read(&raw, ReadPolicy::strict()).unwrap();
}

#[test]
fn test_verify_roundtrip_reports_cluster() {
    let image = sample_image();
    let mut reference = image.write();
    let big = image.find_file("BIG.TXT").unwrap().unwrap();
    let chain = image.fat().get_chain(big.start).unwrap();
    let offset = image.boot_sector().cluster_offset(chain[1]);
    reference[offset + 7] ^= 0xFF;

    let err = image.verify_roundtrip(&reference).unwrap_err();
    match err {
        S3Error::RoundtripMismatch { region, offset: at } => {
            assert_eq!(region, ImageRegion::Cluster(chain[1]));
            assert_eq!(at, offset);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let mut reference = image.write();
    reference[FAT_OFFSET + 10] ^= 1;
    assert!(matches!(
        image.verify_roundtrip(&reference),
        Err(S3Error::RoundtripMismatch {
            region: ImageRegion::AllocationTable,
            offset: FAT_OFFSET
        })
    ));
}

#[test]
fn test_short_buffer() {
    init_logging();
    let raw = sample_image().write();
    let short = &raw[..DISK_SIZE - 4096];

    assert!(matches!(
        S3Image::read(short, ReadPolicy::strict()),
        Err(S3Error::SizeMismatch {
            expected: DISK_SIZE,
            actual
        }) if actual == DISK_SIZE - 4096
    ));

    let image = S3Image::read(short, ReadPolicy::compatible()).unwrap();
    assert!(image.has_warning(WarningKind::ImageSize));
    let entry = image.find_file("A:\\SOUNDS\\X.TXL").unwrap().unwrap();
    assert_eq!(image.extract_file(&entry).unwrap(), vec![0x01; 50]);
    assert_eq!(image.write().len(), DISK_SIZE);
}

#[test]
fn test_buffer_shorter_than_boot_fields() {
    let raw = sample_image().write();
    assert!(matches!(
        S3Image::read(&raw[..10], ReadPolicy::strict()),
        Err(S3Error::SizeMismatch {
            expected: DISK_SIZE,
            actual: 10
        })
    ));
    assert!(matches!(
        S3Image::read(&[], ReadPolicy::strict()),
        Err(S3Error::SizeMismatch {
            expected: DISK_SIZE,
            actual: 0
        })
    ));
    assert!(matches!(
        S3Image::read_with_size(&raw[..10], DISK_SIZE, ReadPolicy::strict()),
        Err(S3Error::SizeMismatch { actual: 10, .. })
    ));
}

#[test]
fn test_missing_volume_label() {
    let mut raw = S3Image::create_empty().write();
    raw[ROOT_OFFSET + 11] = ATTR_ARCHIVE;
    assert!(matches!(
        S3Image::read(&raw, ReadPolicy::compatible()),
        Err(S3Error::MissingVolumeLabel)
    ));
}

#[test]
fn test_geometry_mismatch() {
    let mut raw = S3Image::create_empty().write();
    raw[0x11..0x13].copy_from_slice(&128u16.to_le_bytes());

    assert!(matches!(
        S3Image::read(&raw, ReadPolicy::strict()),
        Err(S3Error::GeometryMismatch { ref field, .. }) if field == "root_entries"
    ));

    let image = S3Image::read(&raw, ReadPolicy::compatible()).unwrap();
    assert!(image.has_warning(WarningKind::Geometry));
    assert_eq!(image.boot_sector().root_entries, 160);
    // The canonical value is written back
    assert_eq!(image.write(), S3Image::create_empty().write());
}

#[test]
fn test_broken_chain() {
    init_logging();
    let mut raw = sample_image().write();
    let image = S3Image::read(&raw, ReadPolicy::strict()).unwrap();
    let big = image.find_file("BIG.TXT").unwrap().unwrap();
    let chain = image.fat().get_chain(big.start).unwrap();

    // Clusters: SOUNDS=2, X.TXL=3, BIG.TXT=4,5,6. Cut the link 5 -> 6.
    assert_eq!(chain, vec![4, 5, 6]);
    let triplet = FAT_OFFSET + 3 * 2;
    raw[triplet + 1] &= 0x0F;
    raw[triplet + 2] = 0;

    let strict = S3Image::read(&raw, ReadPolicy::strict()).unwrap();
    assert!(matches!(
        strict.extract_file(&big),
        Err(S3Error::ChainReferencesReserved { cluster: 0 })
    ));

    let compat = S3Image::read(&raw, ReadPolicy::compatible()).unwrap();
    let data = compat.extract_file(&big).unwrap();
    // Cluster 5 is free in the table now, so it was never loaded
    assert_eq!(data.len(), 2048);
    assert_eq!(&data[..1024], &[0x42; 1024][..]);
    assert!(data[1024..].iter().all(|&b| b == FILLER));
    assert!(compat.has_warning(WarningKind::BrokenChain));
    assert!(compat.has_warning(WarningKind::TruncatedFile));
}

#[test]
fn test_volume_information() {
    let mut image = S3Image::create_empty();
    image.set_volume_label("MY SAMPLES").unwrap();
    assert_eq!(image.volume_label().unwrap(), "MY SAMPLES");

    image.set_volume_label("A VERY LONG LABEL").unwrap();
    assert_eq!(image.volume_label().unwrap(), "A VERY LONG");
    assert!(image.has_warning(WarningKind::Trimmed));

    image.set_volume_timestamp(stamp()).unwrap();
    assert_eq!(image.volume_timestamp().unwrap(), stamp());

    let raw = image.write();
    assert_eq!(&raw[ROOT_OFFSET..ROOT_OFFSET + 11], b"A VERY LONG");
    let reread = S3Image::read(&raw, ReadPolicy::strict()).unwrap();
    assert_eq!(reread.volume_label().unwrap(), "A VERY LONG");
}

#[test]
fn test_list_contents() {
    let mut image = sample_image();
    image.set_volume_label("DISK1").unwrap();
    let listing = image.list_contents().unwrap();

    assert!(listing.contains("Volume: DISK1"));
    assert!(listing.contains("A:\\SOUNDS\n"));
    assert!(listing.contains("X.TXL"));
    assert!(listing.contains("BIG.TXT"));
    assert!(listing.contains("12:30:10 16/10/1990"));
    assert!(!listing.contains("A:\\SOUNDS\\."));
}

#[test]
fn test_digest_tracks_content() {
    let empty = S3Image::create_empty();
    assert_eq!(empty.digest().len(), 64);
    assert_eq!(empty.digest(), S3Image::create_empty().digest());
    assert_ne!(empty.digest(), sample_image().digest());
}
