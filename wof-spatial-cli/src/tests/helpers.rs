//! Test helpers for building feature files and temporary workspaces.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

/// A temporary directory addressed with UTF-8 paths.
pub(super) struct Workspace {
    _dir: TempDir,
    pub(super) root: Utf8PathBuf,
}

impl Workspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("wof.db")
    }
}

/// A locality covering the unit square at `(x, y)`.
pub(super) fn locality(id: i64, x: i64, y: i64) -> String {
    format!(
        r#"{{"type":"Feature","properties":{{"wof:id":{id},"wof:placetype":"locality",
            "wof:repo":"whosonfirst-data-admin-xx","wof:name":"Locality {id}"}},
            "geometry":{{"type":"Polygon","coordinates":[[[{x},{y}],[{x}.9,{y}],[{x}.9,{y}.9],[{x},{y}.9],[{x},{y}]]]}}}}"#
    )
}

/// A venue at `(x, y)`.
pub(super) fn venue(id: i64, x: f64, y: f64) -> String {
    format!(
        r#"{{"type":"Feature","properties":{{"wof:id":{id},"wof:placetype":"venue",
            "wof:repo":"whosonfirst-data-venue-xx","wof:name":"Venue {id}"}},
            "geometry":{{"type":"Point","coordinates":[{x},{y}]}}}}"#
    )
}

pub(super) fn write_utf8(path: &Utf8Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(path, contents).expect("write file");
}
