#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use xrc_compile::{discover, DiscoveryError};

fn unit_dir(root: &Path, rel: &str) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Cargo.toml"), "[package]\n").unwrap();
}

#[test]
fn finds_marked_directories_sorted_and_pruned() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("compositions");
    unit_dir(&root, "pipelineexample");
    unit_dir(&root, "example");
    unit_dir(&root, "team/db");
    unit_dir(&root, ".cache/hidden");
    unit_dir(&root, "target/debug/build");
    fs::create_dir_all(root.join("notes")).unwrap();
    fs::write(root.join("notes").join("README.md"), "not a unit").unwrap();

    let units = discover(&root, "Cargo.toml", &[PathBuf::from("target")]).unwrap();
    let names: Vec<_> = units.iter().map(|u| u.artifact_name.as_str()).collect();
    assert_eq!(names, ["example", "pipelineexample", "team_db"]);
    assert_eq!(units[2].source_path, root.join("team").join("db"));
}

#[test]
fn root_itself_can_be_a_unit() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("single");
    unit_dir(&root, "");
    let units = discover(&root, "Cargo.toml", &[]).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].artifact_name, "single");
}

#[test]
fn nested_exclusions_match_path_prefixes() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    unit_dir(root, "team/db");
    unit_dir(root, "team/cache");
    let units = discover(root, "Cargo.toml", &[PathBuf::from("team/db")]).unwrap();
    let names: Vec<_> = units.iter().map(|u| u.artifact_name.as_str()).collect();
    assert_eq!(names, ["team_cache"]);
}

#[test]
fn missing_root_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let err = discover(&tmp.path().join("nope"), "Cargo.toml", &[]).unwrap_err();
    assert!(matches!(err, DiscoveryError::Walk { .. }));
}
