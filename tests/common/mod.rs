//! Shared helpers for integration tests

#![allow(dead_code)]

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const FIXTURE_SITE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/site");

/// Copy the fixture site into `<dir>/dist` and return that path
pub fn copy_fixture(dir: &Path) -> PathBuf {
    let dist = dir.join("dist");
    copy_tree(Path::new(FIXTURE_SITE), &dist);
    dist
}

fn copy_tree(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// SHA-256 of every file below `root` except `skip`, keyed by relative path
pub fn digest_tree(root: &Path, skip: &str) -> BTreeMap<PathBuf, String> {
    let mut out = BTreeMap::new();
    collect(root, root, skip, &mut out);
    out
}

fn collect(root: &Path, dir: &Path, skip: &str, out: &mut BTreeMap<PathBuf, String>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, skip, out);
            continue;
        }
        let relative = path.strip_prefix(root).unwrap().to_path_buf();
        if relative == Path::new(skip) {
            continue;
        }
        let bytes = fs::read(&path).unwrap();
        out.insert(relative, hex::encode(Sha256::digest(&bytes)));
    }
}
