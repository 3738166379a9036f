//! Filesystem helpers for feature sources, built on `cap-std` and `camino`.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Read};
use std::path::Component;

/// Open a UTF-8 file path using ambient authority.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Read the whole file at `path`.
pub fn read_file(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let mut file = open_utf8_file(path)?;
    let mut body = Vec::new();
    file.read_to_end(&mut body)?;
    Ok(body)
}

/// Read the whole file at `path` as UTF-8 text.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let mut file = open_utf8_file(path)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

fn open_parent_dir(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Return whether `path` exists and is a regular file.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_parent_dir(path)?;
    match dir.metadata(name.as_str()) {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }
    let (base_dir, relative) = base_dir_and_relative(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

/// Split `path` into an ambient base directory and the suffix below it.
///
/// Absolute paths resolve from the filesystem root (or drive prefix on
/// Windows); relative paths resolve from the current directory.
pub fn base_dir_and_relative(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();
    let (base, relative) = match std_path.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_path.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_path.to_path_buf()),
    };
    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative =
        Utf8PathBuf::from_path_buf(relative).map_err(|_| io::Error::other("non-UTF-8 path"))?;
    Ok((dir, relative))
}

/// A directory entry that could not be read during [`walk_files`].
#[derive(Debug)]
pub struct WalkError {
    /// Path of the unreadable entry.
    pub path: Utf8PathBuf,
    /// Underlying I/O error.
    pub source: io::Error,
}

enum Entry {
    Dir(fs_utf8::Dir, Utf8PathBuf),
    File(Utf8PathBuf),
    Other,
}

fn classify(
    dir: &fs_utf8::Dir,
    prefix: &Utf8Path,
    entry: io::Result<fs_utf8::DirEntry>,
) -> Result<Entry, WalkError> {
    let failed = |path: Utf8PathBuf| move |source| WalkError { path, source };
    let entry = entry.map_err(failed(prefix.to_path_buf()))?;
    let name = entry.file_name().map_err(failed(prefix.to_path_buf()))?;
    let path = prefix.join(&name);
    let file_type = entry.file_type().map_err(failed(path.clone()))?;
    if file_type.is_dir() {
        let sub = dir.open_dir(&name).map_err(failed(path.clone()))?;
        Ok(Entry::Dir(sub, path))
    } else if file_type.is_file() {
        Ok(Entry::File(path))
    } else {
        Ok(Entry::Other)
    }
}

/// Recursively visit every regular file below `root`.
///
/// Entries are visited in directory-listing order. Symbolic links are not
/// followed. An unreadable entry below `root` is handed to the visitor as a
/// [`WalkError`] and the walk carries on with the remaining directories.
/// The visitor may stop the walk by returning an error.
pub fn walk_files<F>(root: &Utf8Path, mut visit: F) -> io::Result<()>
where
    F: FnMut(Result<Utf8PathBuf, WalkError>) -> io::Result<()>,
{
    let top = fs_utf8::Dir::open_ambient_dir(root, ambient_authority())?;
    let mut pending = vec![(top, root.to_path_buf())];
    while let Some((dir, prefix)) = pending.pop() {
        let entries = match dir.entries() {
            Ok(entries) => entries,
            Err(source) => {
                visit(Err(WalkError {
                    path: prefix,
                    source,
                }))?;
                continue;
            }
        };
        for entry in entries {
            match classify(&dir, &prefix, entry) {
                Ok(Entry::Dir(sub, path)) => pending.push((sub, path)),
                Ok(Entry::File(path)) => visit(Ok(path))?,
                Ok(Entry::Other) => {}
                Err(err) => visit(Err(err))?,
            }
        }
    }
    Ok(())
}
