//! Work-item sources for the bulk indexer.
//!
//! Inputs are enumerated on the blocking pool and handed to the pipeline as
//! a stream. A failing input (an unreadable list, a malformed CSV row) is
//! reported as a single failed item and enumeration carries on with the rest.

use std::fmt;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use futures_util::Stream;
use futures_util::stream::poll_fn;
use log::debug;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use wof_spatial_core::{IndexFailure, WorkItem};

/// How command-line inputs are turned into work items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Every input is a feature file.
    #[default]
    Files,
    /// Every input is a directory walked recursively for feature files.
    Directory,
    /// Every input is a text file listing one path per line.
    Filelist,
    /// Every input is a CSV manifest with a path column.
    Csv,
    /// Every input is a SQLite database with a `geojson (id, body)` table.
    Sqlite,
}

impl SourceMode {
    /// Configuration name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Directory => "directory",
            Self::Filelist => "filelist",
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "files" => Ok(Self::Files),
            "directory" => Ok(Self::Directory),
            "filelist" => Ok(Self::Filelist),
            "csv" => Ok(Self::Csv),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!(
                "unknown source mode '{other}' (expected files, directory, filelist, csv or sqlite)"
            )),
        }
    }
}

/// Default CSV column holding feature paths.
pub const DEFAULT_CSV_COLUMN: &str = "path";

/// Options controlling enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// How inputs are interpreted.
    pub mode: SourceMode,
    /// CSV column holding paths.
    pub csv_column: String,
    /// Whether alternate-geometry files are kept in directory walks.
    pub allow_alt: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            mode: SourceMode::default(),
            csv_column: DEFAULT_CSV_COLUMN.to_owned(),
            allow_alt: false,
        }
    }
}

/// Errors raised while enumerating an input.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the input failed.
    #[error("failed to read {location}: {source}")]
    Io {
        /// Input being read.
        location: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A CSV manifest could not be parsed.
    #[error("failed to parse CSV manifest {location}: {source}")]
    Csv {
        /// Manifest (and record, when known) being read.
        location: String,
        /// Source error returned by `csv`.
        #[source]
        source: csv::Error,
    },
    /// The CSV manifest lacks the configured path column.
    #[error("CSV manifest {location} has no '{column}' column")]
    MissingColumn {
        /// Manifest being read.
        location: String,
        /// Configured column name.
        column: String,
    },
    /// Reading the feature table failed.
    #[error("failed to read feature table in {location}: {source}")]
    Sqlite {
        /// Database being read.
        location: String,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
}

impl SourceError {
    /// Location of the failing input.
    #[must_use]
    pub fn location(&self) -> &str {
        match self {
            Self::Io { location, .. }
            | Self::Csv { location, .. }
            | Self::MissingColumn { location, .. }
            | Self::Sqlite { location, .. } => location,
        }
    }
}

impl From<SourceError> for IndexFailure {
    fn from(err: SourceError) -> Self {
        Self::new(err.location(), err.to_string())
    }
}

/// Returned by a visitor to stop enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

type Visit<'a> = dyn FnMut(Result<WorkItem, SourceError>) -> Result<(), Stopped> + 'a;

/// Whether `name` is a feature file (`<id>.geojson`), optionally accepting
/// alternate geometries (`<id>-alt-<label>.geojson`).
#[must_use]
pub fn is_feature_file(name: &str, allow_alt: bool) -> bool {
    let Some(stem) = name.strip_suffix(".geojson") else {
        return false;
    };
    let is_id = |text: &str| !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit());
    if is_id(stem) {
        return true;
    }
    allow_alt
        && stem
            .split_once("-alt-")
            .is_some_and(|(id, label)| is_id(id) && !label.is_empty())
}

/// Enumerate every work item described by `inputs`, calling `visit` for
/// each. Runs synchronously; call it from a blocking context.
pub fn enumerate(inputs: &[Utf8PathBuf], options: &SourceOptions, visit: &mut Visit<'_>) {
    for input in inputs {
        let outcome = match options.mode {
            SourceMode::Files => visit(Ok(WorkItem::Path(input.clone()))),
            SourceMode::Directory => walk_directory(input, options.allow_alt, visit),
            SourceMode::Filelist => read_filelist(input, visit),
            SourceMode::Csv => read_manifest(input, &options.csv_column, visit),
            SourceMode::Sqlite => read_feature_table(input, visit),
        };
        if outcome.is_err() {
            debug!("work-item consumer went away; stopping enumeration");
            return;
        }
    }
}

fn walk_directory(root: &Utf8Path, allow_alt: bool, visit: &mut Visit<'_>) -> Result<(), Stopped> {
    let mut stopped = false;
    let walked = wof_spatial_fs::walk_files(root, |entry| {
        let item = match entry {
            Ok(path)
                if path
                    .file_name()
                    .is_some_and(|name| is_feature_file(name, allow_alt)) =>
            {
                Ok(WorkItem::Path(path))
            }
            Ok(_) => return Ok(()),
            Err(err) => Err(SourceError::Io {
                location: err.path.to_string(),
                source: err.source,
            }),
        };
        if visit(item).is_err() {
            stopped = true;
            return Err(io::Error::other("enumeration stopped"));
        }
        Ok(())
    });
    if stopped {
        return Err(Stopped);
    }
    match walked {
        Ok(()) => Ok(()),
        Err(source) => visit(Err(SourceError::Io {
            location: root.to_string(),
            source,
        })),
    }
}

fn read_filelist(list: &Utf8Path, visit: &mut Visit<'_>) -> Result<(), Stopped> {
    let text = match wof_spatial_fs::read_to_string(list) {
        Ok(text) => text,
        Err(source) => {
            return visit(Err(SourceError::Io {
                location: list.to_string(),
                source,
            }));
        }
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .try_for_each(|line| visit(Ok(WorkItem::Path(Utf8PathBuf::from(line)))))
}

fn resolve_against(manifest: &Utf8Path, path: &str) -> Utf8PathBuf {
    let candidate = Utf8Path::new(path);
    match manifest.parent() {
        Some(base) if candidate.is_relative() => base.join(candidate),
        _ => candidate.to_path_buf(),
    }
}

fn read_manifest(manifest: &Utf8Path, column: &str, visit: &mut Visit<'_>) -> Result<(), Stopped> {
    let location = manifest.to_string();
    let file = match wof_spatial_fs::open_utf8_file(manifest) {
        Ok(file) => file,
        Err(source) => return visit(Err(SourceError::Io { location, source })),
    };
    let mut reader = csv::Reader::from_reader(file);
    let index = match reader.headers() {
        Ok(headers) => headers.iter().position(|header| header == column),
        Err(source) => return visit(Err(SourceError::Csv { location, source })),
    };
    let Some(index) = index else {
        return visit(Err(SourceError::MissingColumn {
            location,
            column: column.to_owned(),
        }));
    };
    for (row, record) in reader.records().enumerate() {
        let item = match record {
            Ok(record) => match record.get(index).map(str::trim) {
                Some(path) if !path.is_empty() => Ok(WorkItem::Path(resolve_against(manifest, path))),
                _ => continue,
            },
            Err(source) => Err(SourceError::Csv {
                location: format!("{location}:{}", row + 2),
                source,
            }),
        };
        visit(item)?;
    }
    Ok(())
}

fn read_feature_table(database: &Utf8Path, visit: &mut Visit<'_>) -> Result<(), Stopped> {
    let location = database.to_string();
    match scan_feature_table(database, visit) {
        Ok(outcome) => outcome,
        Err(source) => visit(Err(SourceError::Sqlite { location, source })),
    }
}

fn scan_feature_table(
    database: &Utf8Path,
    visit: &mut Visit<'_>,
) -> Result<Result<(), Stopped>, rusqlite::Error> {
    let connection = Connection::open_with_flags(
        database.as_std_path(),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut statement = connection.prepare("SELECT id, body FROM geojson ORDER BY id")?;
    let mut rows = statement.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let body = match row.get_ref(1)? {
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
            _ => Vec::new(),
        };
        let item = WorkItem::Document {
            source: format!("{database}#{id}"),
            body,
        };
        if visit(Ok(item)).is_err() {
            return Ok(Err(Stopped));
        }
    }
    Ok(Ok(()))
}

/// Enumerate `inputs` on the blocking pool and expose the items as a stream.
///
/// At most `capacity` items are buffered ahead of the consumer.
pub fn spawn_source(
    inputs: Vec<Utf8PathBuf>,
    options: SourceOptions,
    capacity: usize,
) -> impl Stream<Item = Result<WorkItem, IndexFailure>> + Unpin {
    let (tx, mut rx) = mpsc::channel(capacity.max(1));
    tokio::task::spawn_blocking(move || {
        enumerate(&inputs, &options, &mut |item| {
            tx.blocking_send(item.map_err(IndexFailure::from))
                .map_err(|_| Stopped)
        });
    });
    poll_fn(move |cx| rx.poll_recv(cx))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Tree {
        _guard: TempDir,
        root: Utf8PathBuf,
    }

    #[fixture]
    fn tree() -> Tree {
        let guard = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(guard.path().to_path_buf()).expect("utf-8 path");
        fs::create_dir_all(root.join("data/101/750/367")).expect("dirs");
        for name in [
            "data/101/750/367/101750367.geojson",
            "data/101/750/367/101750367-alt-quattroshapes.geojson",
            "data/101/750/367/notes.txt",
        ] {
            fs::write(root.join(name), b"{}").expect("write");
        }
        Tree {
            _guard: guard,
            root,
        }
    }

    fn collect(inputs: &[Utf8PathBuf], options: &SourceOptions) -> Vec<Result<WorkItem, String>> {
        let mut seen = Vec::new();
        enumerate(inputs, options, &mut |item| {
            seen.push(item.map_err(|err| err.to_string()));
            Ok(())
        });
        seen
    }

    fn paths(items: Vec<Result<WorkItem, String>>) -> Vec<String> {
        let mut names: Vec<String> = items
            .into_iter()
            .filter_map(Result::ok)
            .map(|item| item.source())
            .collect();
        names.sort();
        names
    }

    #[rstest]
    #[case("101750367.geojson", false, true)]
    #[case("101750367-alt-quattroshapes.geojson", false, false)]
    #[case("101750367-alt-quattroshapes.geojson", true, true)]
    #[case("101750367-alt-.geojson", true, false)]
    #[case("README.geojson", true, false)]
    #[case("101750367.json", true, false)]
    fn feature_file_names(#[case] name: &str, #[case] allow_alt: bool, #[case] expected: bool) {
        assert_eq!(is_feature_file(name, allow_alt), expected);
    }

    #[rstest]
    #[case(false, 1)]
    #[case(true, 2)]
    fn directory_walk_keeps_feature_files(tree: Tree, #[case] allow_alt: bool, #[case] expected: usize) {
        let options = SourceOptions {
            mode: SourceMode::Directory,
            allow_alt,
            ..SourceOptions::default()
        };
        let found = paths(collect(&[tree.root.join("data")], &options));
        assert_eq!(found.len(), expected);
        assert!(found.iter().all(|path| path.ends_with(".geojson")));
    }

    #[rstest]
    fn filelist_skips_blanks_and_comments(tree: Tree) {
        let list = tree.root.join("files.txt");
        fs::write(&list, "# seeded\n/a/1.geojson\n\n  /b/2.geojson  \n").expect("write list");
        let options = SourceOptions {
            mode: SourceMode::Filelist,
            ..SourceOptions::default()
        };
        assert_eq!(
            paths(collect(&[list], &options)),
            vec!["/a/1.geojson".to_owned(), "/b/2.geojson".to_owned()]
        );
    }

    #[rstest]
    fn csv_paths_resolve_against_the_manifest(tree: Tree) {
        let manifest = tree.root.join("meta.csv");
        fs::write(&manifest, "id,path\n1,data/1.geojson\n2,/abs/2.geojson\n3,\n").expect("write csv");
        let options = SourceOptions {
            mode: SourceMode::Csv,
            ..SourceOptions::default()
        };
        assert_eq!(
            paths(collect(&[manifest], &options)),
            vec!["/abs/2.geojson".to_owned(), tree.root.join("data/1.geojson").to_string()]
        );
    }

    #[rstest]
    fn csv_without_the_column_is_one_failure(tree: Tree) {
        let manifest = tree.root.join("meta.csv");
        fs::write(&manifest, "id,repo\n1,x\n").expect("write csv");
        let options = SourceOptions {
            mode: SourceMode::Csv,
            csv_column: "path".into(),
            ..SourceOptions::default()
        };
        let items = collect(&[manifest], &options);
        assert_eq!(items.len(), 1);
        assert!(matches!(items.first(), Some(Err(message)) if message.contains("no 'path' column")));
    }

    #[rstest]
    fn sqlite_rows_become_documents(tree: Tree) {
        let database = tree.root.join("features.db");
        let connection = Connection::open(database.as_std_path()).expect("open");
        connection
            .execute_batch(
                "CREATE TABLE geojson (id INTEGER PRIMARY KEY, body TEXT);
                 INSERT INTO geojson VALUES (2, '{\"b\":1}'), (1, '{\"a\":1}');",
            )
            .expect("seed");
        drop(connection);
        let options = SourceOptions {
            mode: SourceMode::Sqlite,
            ..SourceOptions::default()
        };
        let items: Vec<WorkItem> = collect(&[database.clone()], &options)
            .into_iter()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(
            items,
            vec![
                WorkItem::Document {
                    source: format!("{database}#1"),
                    body: br#"{"a":1}"#.to_vec(),
                },
                WorkItem::Document {
                    source: format!("{database}#2"),
                    body: br#"{"b":1}"#.to_vec(),
                },
            ]
        );
    }

    #[cfg(unix)]
    #[rstest]
    fn unreadable_subdirectories_are_reported_and_skipped(tree: Tree) {
        use std::os::unix::fs::PermissionsExt;

        let locked = tree.root.join("data/locked");
        fs::create_dir_all(&locked).expect("locked dir");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("lock dir");
        if fs::read_dir(&locked).is_ok() {
            // Permission bits do not apply to this user (for example root).
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock");
            return;
        }
        let options = SourceOptions {
            mode: SourceMode::Directory,
            ..SourceOptions::default()
        };
        let items = collect(&[tree.root.join("data")], &options);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock");

        let failures: Vec<&String> = items.iter().filter_map(|item| item.as_ref().err()).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures.iter().all(|message| message.contains("locked")), "{failures:?}");
        assert_eq!(paths(items).len(), 1);
    }

    #[rstest]
    fn missing_inputs_do_not_stop_later_inputs(tree: Tree) {
        let list = tree.root.join("files.txt");
        fs::write(&list, "/a/1.geojson\n").expect("write list");
        let options = SourceOptions {
            mode: SourceMode::Filelist,
            ..SourceOptions::default()
        };
        let items = collect(&[tree.root.join("missing.txt"), list], &options);
        assert_eq!(items.len(), 2);
        assert!(items.first().is_some_and(Result::is_err));
        assert!(items.get(1).is_some_and(Result::is_ok));
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawned_source_streams_every_item() {
        use futures_util::StreamExt;

        let inputs: Vec<Utf8PathBuf> = (1..=5).map(|id| Utf8PathBuf::from(format!("/{id}.geojson"))).collect();
        let items: Vec<_> = spawn_source(inputs, SourceOptions::default(), 2).collect().await;
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(Result::is_ok));
    }

    #[rstest]
    #[case("files", SourceMode::Files)]
    #[case("Directory", SourceMode::Directory)]
    #[case("sqlite", SourceMode::Sqlite)]
    fn source_modes_parse(#[case] name: &str, #[case] mode: SourceMode) {
        assert_eq!(name.parse::<SourceMode>(), Ok(mode));
    }
}
