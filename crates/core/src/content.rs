//! Content directory location helpers and scoped cleanup guards.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Gazelle HTML-escapes names and paths in its JSON payloads.
pub fn unescape(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

/// First file name from the tracker's `{{{size}}}`-annotated file list.
/// Single-file uploads carry exactly one entry.
pub fn single_file_name(file_list: &str) -> Option<String> {
    let first = file_list.split("|||").next()?;
    let name = first.split("{{{").next()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(unescape(name))
    }
}

/// All FLAC files under `dir`, sorted for deterministic processing order.
pub fn locate_flacs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("flac"))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Removes a directory tree when dropped. Used for staging and per-format
/// work directories so cleanup happens on every exit path.
pub struct ScopedDir {
    path: PathBuf,
}

impl ScopedDir {
    /// Creates the directory (and parents) and owns its removal.
    pub fn create(path: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if self.path.exists() {
                warn!("Failed to clean up {}: {e}", self.path.display());
            }
        }
    }
}

/// Removes a single file when dropped.
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if self.path.exists() {
                warn!("Failed to clean up {}: {e}", self.path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unescape_gazelle_entities() {
        assert_eq!(unescape("A &amp; B &#39;99&#39;"), "A & B '99'");
        assert_eq!(unescape("plain"), "plain");
    }

    #[test]
    fn test_single_file_name() {
        assert_eq!(
            single_file_name("01 - Song.flac{{{1234}}}"),
            Some("01 - Song.flac".to_string())
        );
        assert_eq!(
            single_file_name("a.flac{{{1}}}|||b.flac{{{2}}}"),
            Some("a.flac".to_string())
        );
        assert_eq!(single_file_name(""), None);
    }

    #[test]
    fn test_locate_flacs_recursive_sorted_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("CD2");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(dir.path().join("02.flac"), b"x").unwrap();
        std::fs::write(dir.path().join("01.FLAC"), b"x").unwrap();
        std::fs::write(dir.path().join("cover.jpg"), b"x").unwrap();
        std::fs::write(sub.join("03.flac"), b"x").unwrap();

        let flacs = locate_flacs(dir.path());
        assert_eq!(flacs.len(), 3);
        assert!(flacs[0].ends_with("01.FLAC"));
        assert!(flacs[2].ends_with("CD2/03.flac"));
    }

    #[test]
    fn test_scoped_dir_removes_contents_on_drop() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("work");
        {
            let scoped = ScopedDir::create(target.clone()).unwrap();
            std::fs::write(scoped.path().join("file"), b"x").unwrap();
            assert!(target.exists());
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_scoped_file_removes_on_drop() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("scratch.torrent");
        std::fs::write(&target, b"x").unwrap();
        {
            let _scoped = ScopedFile::new(target.clone());
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_scoped_file_tolerates_missing_target() {
        let dir = TempDir::new().unwrap();
        let _scoped = ScopedFile::new(dir.path().join("never-created"));
    }
}
