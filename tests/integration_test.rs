//! Integration tests for Rescue Drill

use std::fs;
use std::path::{Path, PathBuf};

use rescue_drill::catalog::format_catalog_line;
use rescue_drill::cli::{catalog_path, ImagePair};
use rescue_drill::{
    compare, load_catalog, load_rescue_log, Buffers, ExtractOptions, Extractor, ImageSource,
    JpegScanner, RescueError, ScanOptions, BLOCK_SIZE,
};
use tempfile::tempdir;

const BLOCK: u64 = BLOCK_SIZE as u64;

/// SOI + APP0(JFIF) + DQT + entropy data + EOI, 37 bytes
fn tiny_jpeg() -> Vec<u8> {
    let mut v = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    v.extend_from_slice(b"JFIF\0");
    v.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);
    v.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x05, 0xAA, 0xBB, 0xCC]);
    v.extend_from_slice(&[0x12, 0x34, 0xFF, 0x00, 0x56, 0xFF, 0xD0, 0x78]);
    v.extend_from_slice(&[0xFF, 0xD9]);
    v
}

/// A 16-block disc image with text in blocks 1-2 and a JPEG at block 8
fn disc_image() -> Vec<u8> {
    let mut img: Vec<u8> = (0..16 * BLOCK_SIZE).map(|i| (i % 200) as u8 + 1).collect();
    let text = b"Hello from a rescued disc!\n".repeat(100);
    img[BLOCK_SIZE..BLOCK_SIZE + text.len()].copy_from_slice(&text);
    let jpeg = tiny_jpeg();
    img[8 * BLOCK_SIZE..8 * BLOCK_SIZE + jpeg.len()].copy_from_slice(&jpeg);
    img
}

/// Write BASE.iso and BASE.log, returning BASE
fn write_rescue(dir: &Path, name: &str, image: &[u8], log: &str) -> PathBuf {
    let base = dir.join(name);
    let pair = ImagePair::from_base(&base);
    fs::write(&pair.image, image).unwrap();
    fs::write(&pair.log, log).unwrap();
    base
}

const FULL_LOG: &str = "\
# Rescue Logfile. Created by GNU ddrescue version 1.23
# current_pos  current_status  current_pass
0x00008000     +               1
#      pos        size  status
0x00000000  0x00008000  +
0x00008000  0x00008000  ?
";

#[test]
fn test_scan_then_extract_round_trip() {
    let dir = tempdir().unwrap();
    let img = disc_image();
    let base = write_rescue(dir.path(), "disc", &img, FULL_LOG);
    let pair = ImagePair::from_base(&base);

    let mut map = load_rescue_log(&pair.log).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.total_bytes(), 16 * BLOCK);
    assert_eq!(map.compact(), 0);

    // Scan writes a catalog for a later extraction run
    let out_dir = dir.path().join("found");
    let catalog_file = catalog_path(&out_dir);
    let mut image = ImageSource::open(&pair.image).unwrap();
    let mut buffers = Buffers::new(4);
    let mut out = fs::File::create(&catalog_file).unwrap();
    let scan = JpegScanner::new(ScanOptions::default())
        .scan(&map, &mut image, &mut buffers, &mut out)
        .unwrap();
    drop(out);
    assert_eq!(scan.hits.len(), 1);
    assert_eq!(scan.hits[0].start_block, 8);

    let catalog = load_catalog(&catalog_file).unwrap();
    let result = Extractor::new(ExtractOptions {
        output_dir: out_dir.clone(),
        write_manifest: true,
    })
    .extract(&catalog, &map, &mut image, &mut buffers)
    .unwrap();

    assert_eq!(result.extracted.len(), 1);
    assert_eq!(fs::read(out_dir.join("File1.jpg")).unwrap(), tiny_jpeg());
    assert!(result.manifest_path.unwrap().exists());
    assert_eq!(
        result.extracted[0].blake3_hash,
        blake3::hash(&tiny_jpeg()).to_hex().to_string()
    );
}

#[test]
fn test_extract_skips_entries_straddling_a_gap() {
    let dir = tempdir().unwrap();
    let img = disc_image();
    // Block 3 was never read
    let log = "\
0x00000000     ?               1
0x00000000  0x00001800  +
0x00001800  0x00000800  -
0x00002000  0x00006000  +
";
    let base = write_rescue(dir.path(), "disc", &img, log);
    let pair = ImagePair::from_base(&base);
    let mut map = load_rescue_log(&pair.log).unwrap();
    map.compact();

    let out_dir = dir.path().join("DIR");
    let catalog_text = [
        format_catalog_line(1, 2 * BLOCK, "TEXT.TXT"),
        format_catalog_line(2, 2 * BLOCK, "SPAN.BIN"),
        format_catalog_line(4, 100, "LATE.BIN"),
    ]
    .join("\n");
    fs::write(catalog_path(&out_dir), catalog_text).unwrap();
    let catalog = load_catalog(&catalog_path(&out_dir)).unwrap();

    let mut image = ImageSource::open(&pair.image).unwrap();
    let result = Extractor::new(ExtractOptions {
        output_dir: out_dir.clone(),
        write_manifest: false,
    })
    .extract(&catalog, &map, &mut image, &mut Buffers::new(1))
    .unwrap();

    assert_eq!(result.missing, vec!["SPAN.BIN"]);
    assert!(!out_dir.join("SPAN.BIN").exists());

    let text = fs::read(out_dir.join("TEXT.TXT")).unwrap();
    assert_eq!(text, &img[BLOCK_SIZE..3 * BLOCK_SIZE]);
    let late = fs::read(out_dir.join("LATE.BIN")).unwrap();
    assert_eq!(late, &img[4 * BLOCK_SIZE..4 * BLOCK_SIZE + 100]);
}

#[test]
fn test_two_rescues_agree() {
    let dir = tempdir().unwrap();
    let img = disc_image();

    // Each pass has different holes, with garbage where it failed
    let mut first_img = img.clone();
    first_img[0x3000..0x3800].fill(0);
    let first_log = "\
0x00000000     ?               1
0x00000000  0x00003000  +
0x00003000  0x00000800  -
0x00003800  0x00004800  +
";
    let first = write_rescue(dir.path(), "pass1", &first_img, first_log);

    let mut second_img = img.clone();
    second_img[0x100..0x200].fill(0);
    let second_log = "\
0x00000000     ?               1
0x00000000  0x00001000  -
0x00001000  0x00007000  +
";
    let second = write_rescue(dir.path(), "pass2", &second_img, second_log);

    let a = ImagePair::from_base(&first);
    let b = ImagePair::from_base(&second);
    let result = compare(
        &load_rescue_log(&a.log).unwrap(),
        &load_rescue_log(&b.log).unwrap(),
        &mut ImageSource::open(&a.image).unwrap(),
        &mut ImageSource::open(&b.image).unwrap(),
        &mut Buffers::new(2),
    )
    .unwrap();

    assert_eq!(result.overlaps, 2);
    assert_eq!(result.bytes_compared, 0x2000 + 0x4800);
}

#[test]
fn test_two_rescues_disagree() {
    let dir = tempdir().unwrap();
    let img = disc_image();
    let mut bad = img.clone();
    bad[0x5123] ^= 0x80;

    let a = ImagePair::from_base(&write_rescue(dir.path(), "a", &img, FULL_LOG));
    let b = ImagePair::from_base(&write_rescue(dir.path(), "b", &bad, FULL_LOG));

    let err = compare(
        &load_rescue_log(&a.log).unwrap(),
        &load_rescue_log(&b.log).unwrap(),
        &mut ImageSource::open(&a.image).unwrap(),
        &mut ImageSource::open(&b.image).unwrap(),
        &mut Buffers::default(),
    )
    .unwrap_err();

    assert!(matches!(err, RescueError::Mismatch { address: 0x5123 }));
    assert_eq!(err.to_string(), "Images do not match at 0x5123");
}

#[test]
fn test_overlapping_log_rejected() {
    let dir = tempdir().unwrap();
    let log = "\
0x00000000     ?               1
0x00000000  0x00001000  +
0x00000800  0x00001000  +
";
    let base = write_rescue(dir.path(), "bad", &[], log);
    let err = load_rescue_log(&ImagePair::from_base(&base).log).unwrap_err();
    assert!(matches!(err, RescueError::Overlap { .. }));
}

#[test]
fn test_missing_files_are_open_errors() {
    let dir = tempdir().unwrap();
    let pair = ImagePair::from_base(&dir.path().join("nothing"));

    assert!(matches!(
        load_rescue_log(&pair.log),
        Err(RescueError::Open { .. })
    ));
    assert!(matches!(
        ImageSource::open(&pair.image),
        Err(RescueError::Open { .. })
    ));
}
