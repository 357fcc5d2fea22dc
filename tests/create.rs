mod common;

use std::path::Path;

use pretty_assertions::assert_eq;

use ripf::ops::create::{CreateOptions, create};
use ripf::ops::extract::extract;
use ripf::ops::list::list;
use ripf::{ExtractOptions, Password};

use common::sample_data;

fn populate(root: &Path) -> Vec<(String, Vec<u8>)> {
    let files = vec![
        ("ui/icons/sword.png".to_string(), sample_data(1)),
        ("ui/layout.xml".to_string(), b"<layout/>".repeat(50)),
        ("readme.txt".to_string(), b"hello".to_vec()),
        ("empty.bin".to_string(), Vec::new()),
    ];
    for (name, data) in &files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }
    files
}

async fn round_trip(options: CreateOptions) {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("src");
    let files = populate(&source);
    let archive = dir.path().join("new.ipf");

    let report = create(&source, &archive, &options).await.unwrap();
    assert_eq!(report.files, files.len());
    assert_eq!(report.archive_size, std::fs::metadata(&archive).unwrap().len());

    let names: Vec<String> = list(&archive, &options.password)
        .await
        .unwrap()
        .iter()
        .map(|e| e.display_name().to_string())
        .collect();
    assert_eq!(names, vec!["empty.bin", "readme.txt", "ui/icons/sword.png", "ui/layout.xml"]);

    let out = dir.path().join("out");
    let extracted = extract(&archive, &out, &options.password, ExtractOptions::default())
        .await
        .unwrap();
    assert_eq!(extracted.failed(), 0);
    for (name, data) in &files {
        assert_eq!(&std::fs::read(out.join(name)).unwrap(), data, "{name}");
    }
}

#[tokio::test]
async fn encrypted_round_trip() {
    round_trip(CreateOptions::default()).await;
}

#[tokio::test]
async fn plain_stored_round_trip() {
    round_trip(CreateOptions {
        encrypt: false,
        compression_level: 0,
        ..CreateOptions::default()
    })
    .await;
}

#[tokio::test]
async fn custom_password_round_trip() {
    round_trip(CreateOptions {
        password: Password::new([0x17; 48]),
        ..CreateOptions::default()
    })
    .await;
}

#[tokio::test]
async fn empty_folder_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("nothing");
    std::fs::create_dir(&source).unwrap();
    assert!(create(&source, &dir.path().join("x.ipf"), &CreateOptions::default()).await.is_err());
}
