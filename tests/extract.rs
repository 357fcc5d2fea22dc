mod common;

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};

use ripf::ops::create::CreateOptions;
use ripf::ops::extract::extract;
use ripf::{EntryError, ExtractOptions, ExtractionOutcome, IpfError, Password};

use common::{build_archive, build_archive_with, entries_of, sample_data, write_file};

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn thousand_files_with_four_workers() {
    let files: Vec<(String, Vec<u8>)> = (0..1000)
        .map(|i| (format!("data/{}/file_{i:04}.bin", i % 10), sample_data(i)))
        .collect();
    let expected: HashMap<String, [u8; 32]> = files.iter().map(|(n, d)| (n.clone(), sha256(d))).collect();

    let dir = tempfile::tempdir().unwrap();
    let archive = write_file(dir.path(), "big.ipf", &build_archive(&files));
    let out = dir.path().join("out");

    let options = ExtractOptions {
        workers: 4,
        ..ExtractOptions::default()
    };
    let report = extract(&archive, &out, &Password::default(), options).await.unwrap();

    assert_eq!(report.total(), 1000);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.success_rate(), 100.0);
    assert_eq!(report.outcome(), ExtractionOutcome::Complete);

    for (name, hash) in &expected {
        let written = std::fs::read(out.join(name)).unwrap();
        assert_eq!(&sha256(&written), hash, "{name}");
    }
}

#[tokio::test]
async fn corrupted_local_header_fails_one_entry() {
    let files: Vec<(String, Vec<u8>)> = (0..20).map(|i| (format!("f{i:02}.dat"), sample_data(i))).collect();
    let dir = tempfile::tempdir().unwrap();
    let archive = write_file(dir.path(), "d.ipf", &build_archive(&files));

    let victim = entries_of(&archive).await[7].local_header_offset as usize;
    let mut bytes = std::fs::read(&archive).unwrap();
    bytes[victim..victim + 4].copy_from_slice(b"XXXX");
    std::fs::write(&archive, &bytes).unwrap();

    let out = dir.path().join("out");
    let report = extract(&archive, &out, &Password::default(), ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(report.total(), 20);
    assert_eq!(report.failed(), 1);
    let failure = report.errors().next().unwrap();
    assert_eq!(failure.index, 7);
    assert!(matches!(
        failure.error,
        Some(EntryError::Structure(IpfError::BadSignature { .. }))
    ));
    assert!(!out.join("f07.dat").exists());
    assert_eq!(std::fs::read(out.join("f08.dat")).unwrap(), sample_data(8));
}

#[tokio::test]
async fn superseded_copy_is_not_extracted() {
    let files = vec![
        ("a.xml".to_string(), b"old".to_vec()),
        ("b.xml".to_string(), b"b".to_vec()),
        ("a.xml".to_string(), b"new".to_vec()),
    ];
    let dir = tempfile::tempdir().unwrap();
    let archive = write_file(dir.path(), "dup.ipf", &build_archive(&files));
    let out = dir.path().join("out");

    let report = extract(&archive, &out, &Password::default(), ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(report.total(), 2);
    assert_eq!(std::fs::read(out.join("a.xml")).unwrap(), b"new");
}

#[tokio::test]
async fn wrong_password_fails_every_entry() {
    let files: Vec<(String, Vec<u8>)> = (0..5).map(|i| (format!("f{i}"), sample_data(i))).collect();
    let dir = tempfile::tempdir().unwrap();
    let archive = write_file(dir.path(), "p.ipf", &build_archive(&files));

    let report = extract(
        &archive,
        &dir.path().join("out"),
        &Password::new([0x42; 48]),
        ExtractOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(report.succeeded(), 0);
    assert_eq!(report.outcome(), ExtractionOutcome::ManyFailures);
}

#[tokio::test]
async fn not_an_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "junk.ipf", &[0u8; 512]);
    let err = extract(&path, &dir.path().join("out"), &Password::default(), ExtractOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<IpfError>(), Some(IpfError::EocdNotFound)));
}

#[tokio::test]
async fn crc_damage_fails_only_that_entry() {
    let files: Vec<(String, Vec<u8>)> = (0..8).map(|i| (format!("g{i}.bin"), sample_data(i))).collect();
    let stored = CreateOptions {
        encrypt: false,
        compression_level: 0,
        ..CreateOptions::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let archive = write_file(dir.path(), "crc.ipf", &build_archive_with(&files, &stored));

    let victim = entries_of(&archive).await[3].data_offset().unwrap() as usize;
    let mut bytes = std::fs::read(&archive).unwrap();
    bytes[victim + 10] ^= 0xFF;
    std::fs::write(&archive, &bytes).unwrap();

    let out = dir.path().join("out");
    let report = extract(&archive, &out, &Password::default(), ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(report.failed(), 1);
    let failure = report.errors().next().unwrap();
    assert_eq!(failure.index, 3);
    assert!(matches!(failure.error, Some(EntryError::CrcMismatch { .. })));
    for i in [0, 1, 2, 4, 5, 6, 7] {
        assert_eq!(std::fs::read(out.join(format!("g{i}.bin"))).unwrap(), sample_data(i));
    }
}
