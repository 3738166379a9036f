//! Shared helpers for the indexing integration tests.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::Connection;
use wof_spatial_data::SqliteSpatialStore;

/// Placetype id of `locality`.
#[allow(dead_code, reason = "not every test binary inspects placetypes")]
pub const LOCALITY: i64 = 102_312_317;

/// GeoJSON body for a locality polygon one unit wide at `(id, id)`.
pub fn locality_body(id: i64, name: &str) -> String {
    format!(
        r#"{{"type":"Feature","properties":{{"wof:id":{id},"wof:placetype":"locality",
            "wof:parent_id":85633793,"wof:repo":"whosonfirst-data-admin-xx",
            "wof:name":"{name}","wof:country":"XX"}},
            "geometry":{{"type":"Polygon","coordinates":[[[{id},{id}],[{id}.5,{id}],[{id}.5,{id}.5],[{id},{id}.5],[{id},{id}]]]}}}}"#
    )
}

/// Write one feature file per id below `root`; ids listed in `malformed`
/// receive a truncated document.
pub fn write_features(root: &Utf8Path, ids: &[i64], malformed: &[i64]) -> Vec<Utf8PathBuf> {
    ids.iter()
        .map(|id| {
            let path = root.join(format!("{id}.geojson"));
            let body = if malformed.contains(id) {
                String::from(r#"{"type":"Feature","properties":{"#)
            } else {
                locality_body(*id, &format!("Place {id}"))
            };
            fs::write(&path, body).unwrap_or_else(|err| panic!("failed to write {path}: {err}"));
            path
        })
        .collect()
}

/// Open and initialise a store at `root/index.db`.
pub fn open_store(root: &Utf8Path) -> SqliteSpatialStore {
    let store = SqliteSpatialStore::open(root.join("index.db")).expect("open store");
    store.initialise_schema().expect("initialise schema");
    store
}

/// Identifiers stored in the database, ascending.
pub fn stored_ids(store: &SqliteSpatialStore) -> Vec<i64> {
    let connection = Connection::open(store.path().as_std_path()).expect("open database");
    let mut statement = connection
        .prepare("SELECT id FROM whosonfirst ORDER BY id")
        .expect("prepare");
    statement
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<Vec<i64>, _>>()
        .expect("read ids")
}
