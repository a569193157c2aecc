//! Lookup of other smart playlists by title, for `in playlist "name"`.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// File extension of smart playlist definitions.
pub const PLAYLIST_EXTENSION: &str = "smartpl";

/// Source of the playlists an `in playlist` reference may name.
pub trait PlaylistResolver {
    /// Source text of the smart playlist titled `name`.
    fn playlist_source(&self, name: &str) -> Option<&str>;
}

/// Resolves nothing; every reference is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPlaylists;

impl PlaylistResolver for NoPlaylists {
    fn playlist_source(&self, _name: &str) -> Option<&str> {
        None
    }
}

impl PlaylistResolver for HashMap<String, String> {
    fn playlist_source(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl PlaylistResolver for BTreeMap<String, String> {
    fn playlist_source(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl<R: PlaylistResolver + ?Sized> PlaylistResolver for &R {
    fn playlist_source(&self, name: &str) -> Option<&str> {
        (**self).playlist_source(name)
    }
}

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("cannot read playlist directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read playlist file {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Smart playlist sources keyed by their declared title.
#[derive(Debug, Clone, Default)]
pub struct PlaylistLibrary {
    sources: BTreeMap<String, String>,
    paths: BTreeMap<String, PathBuf>,
}

impl PlaylistLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a playlist under the title it declares and returns that title.
    /// A later playlist with the same title replaces the earlier one.
    pub fn insert(&mut self, source: impl Into<String>) -> Result<String, crate::CompileError> {
        let source = source.into();
        let title = crate::parse_str(&source)?.title;
        self.sources.insert(title.clone(), source);
        Ok(title)
    }

    /// Loads every `*.smartpl` file in `dir`, in file name order.
    ///
    /// Files that do not parse are skipped with a warning, as are files whose
    /// title is already taken by an earlier file.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, LibraryError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| LibraryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| LibraryError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == PLAYLIST_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();

        let mut library = Self::new();
        for path in files {
            let source = fs::read_to_string(&path).map_err(|source| LibraryError::ReadFile {
                path: path.clone(),
                source,
            })?;
            let title = match crate::parse_str(&source) {
                Ok(playlist) => playlist.title,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping smart playlist that does not parse");
                    continue;
                }
            };
            if let Some(existing) = library.paths.get(&title) {
                warn!(
                    path = %path.display(),
                    existing = %existing.display(),
                    %title,
                    "skipping smart playlist with duplicate title"
                );
                continue;
            }
            debug!(path = %path.display(), %title, "loaded smart playlist");
            library.paths.insert(title.clone(), path);
            library.sources.insert(title, source);
        }
        Ok(library)
    }

    pub fn get(&self, title: &str) -> Option<&str> {
        self.sources.get(title).map(String::as_str)
    }

    /// File a playlist was loaded from, if it came from [`load_dir`](Self::load_dir).
    pub fn path(&self, title: &str) -> Option<&Path> {
        self.paths.get(title).map(PathBuf::as_path)
    }

    /// Titles in sorted order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl PlaylistResolver for PlaylistLibrary {
    fn playlist_source(&self, name: &str) -> Option<&str> {
        self.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_resolvers() {
        let mut map = HashMap::new();
        map.insert("Rock".to_string(), "source".to_string());
        assert_eq!(map.playlist_source("Rock"), Some("source"));
        assert_eq!(map.playlist_source("rock"), None);
        assert_eq!(NoPlaylists.playlist_source("Rock"), None);

        let by_ref: &dyn PlaylistResolver = &&map;
        assert_eq!(by_ref.playlist_source("Rock"), Some("source"));
    }

    #[test]
    fn test_insert_keys_by_declared_title() {
        let mut library = PlaylistLibrary::new();
        let title = library
            .insert(r#"smart playlist "Jazz" { genre is "Jazz" }"#)
            .unwrap();
        assert_eq!(title, "Jazz");
        assert!(library.get("Jazz").unwrap().contains("genre"));
        assert_eq!(library.path("Jazz"), None);

        assert!(library.insert("smart playlist {").is_err());
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.smartpl"),
            r#"smart playlist "Rock" { genre is "Rock" }"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.smartpl"),
            r#"smart playlist "Recent" { time_added is in the last 2 weeks }"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.smartpl"), "smart playlist").unwrap();
        fs::write(
            dir.path().join("c.smartpl"),
            r#"smart playlist "Rock" { genre is "Metal" }"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a playlist").unwrap();

        let library = PlaylistLibrary::load_dir(dir.path()).unwrap();
        assert_eq!(library.titles().collect::<Vec<_>>(), vec!["Recent", "Rock"]);
        assert!(library.get("Rock").unwrap().contains("\"Rock\" }"));
        assert_eq!(library.path("Rock"), Some(dir.path().join("a.smartpl").as_path()));
    }

    #[test]
    fn test_load_missing_dir() {
        let result = PlaylistLibrary::load_dir("does/not/exist");
        assert!(matches!(result, Err(LibraryError::ReadDir { .. })));
    }
}
