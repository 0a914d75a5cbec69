//! Create-and-bundle round trips against real files.

use std::fs;
use std::path::Path;
use tadsc_res::{add_resources, create_image, list_resources, parse_operations, ResList};

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn create_then_bundle_then_list() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("game.t3");

    let sound = write_file(dir.path(), "door.ogg", b"oggdata-here");
    let cover = write_file(dir.path(), "cover.jpg", b"jpegdata");

    let mut list = ResList::new();
    list.add_file(&sound, None, true).unwrap();
    list.add_file(&cover, Some(".system/CoverArt.jpg"), true).unwrap();

    add_resources(&image, &list, true).unwrap();

    let entries = list_resources(&image).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].0.ends_with("door.ogg"));
    assert_eq!(entries[0].1, 12);
    assert_eq!(entries[1].0, ".system/CoverArt.jpg");
    assert_eq!(entries[1].1, 8);
}

#[test]
fn second_bundle_appends_a_block() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("game.t3");
    create_image(&image).unwrap();

    let first = write_file(dir.path(), "a.bin", b"aaaa");
    let mut list = ResList::new();
    list.add_file(&first, Some("a.bin"), true).unwrap();
    add_resources(&image, &list, false).unwrap();

    let second = write_file(dir.path(), "b.bin", b"bb");
    let mut list2 = ResList::new();
    list2.add_file(&second, Some("b.bin"), true).unwrap();
    add_resources(&image, &list2, false).unwrap();

    let entries = list_resources(&image).unwrap();
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a.bin", "b.bin"]);
}

#[test]
fn directory_operand_bundles_contents() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("game.t3");
    let res_dir = dir.path().join("sounds");
    fs::create_dir(&res_dir).unwrap();
    write_file(&res_dir, "one.ogg", b"1");
    write_file(&res_dir, "two.ogg", b"22");
    let sub = res_dir.join("music");
    fs::create_dir(&sub).unwrap();
    write_file(&sub, "three.ogg", b"333");

    let ops = vec![res_dir.to_string_lossy().to_string()];
    let list = parse_operations(&ops).unwrap();
    assert_eq!(list.len(), 3);

    add_resources(&image, &list, true).unwrap();
    assert_eq!(list_resources(&image).unwrap().len(), 3);
}

#[test]
fn norecurse_skips_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let res_dir = dir.path().join("sounds");
    fs::create_dir(&res_dir).unwrap();
    write_file(&res_dir, "one.ogg", b"1");
    let sub = res_dir.join("music");
    fs::create_dir(&sub).unwrap();
    write_file(&sub, "three.ogg", b"333");

    let ops = vec![
        "-norecurse".to_string(),
        res_dir.to_string_lossy().to_string(),
    ];
    let list = parse_operations(&ops).unwrap();
    assert_eq!(list.len(), 1);
}

#[test]
fn non_image_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = write_file(dir.path(), "not-an-image.t3", b"hello world, not an image");
    let list = ResList::new();
    assert!(add_resources(&bogus, &list, false).is_err());
}
