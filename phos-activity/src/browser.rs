//! Headless state of a file chooser: the directory being browsed, what it
//! contains and which entry gets picked.
//!
//! [`FileDialog`](crate::FileDialog) implementations render a
//! `DirectoryBrowser` and hand the path returned by
//! [`DirectoryBrowser::select`] to their completion.

use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::trace;

use crate::config::{has_extension, ChooserConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub is_dir: bool,
}

impl Entry {
    pub fn file_name(&self) -> Cow<'_, str> {
        match self.path.file_name() {
            Some(name) => name.to_string_lossy(),
            None => self.path.to_string_lossy(),
        }
    }

    /// A one-line description for list views, e.g. `[D] roms` or `[F] tetris.gb`
    pub fn label(&self) -> String {
        let kind = if self.is_dir { 'D' } else { 'F' };
        format!("[{kind}] {}", self.file_name())
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryBrowser {
    current_dir: PathBuf,
    entries: Vec<Entry>,
    extensions: Option<Vec<String>>,
}

impl DirectoryBrowser {
    /// Opens `start_dir`, only listing files with one of `extensions` (and
    /// all directories) when a filter is given
    pub fn open(start_dir: impl Into<PathBuf>, extensions: Option<Vec<String>>) -> io::Result<Self> {
        let mut browser = Self {
            current_dir: start_dir.into(),
            entries: Vec::new(),
            extensions,
        };
        browser.refresh()?;
        Ok(browser)
    }

    pub fn from_config(config: &ChooserConfig) -> io::Result<Self> {
        Self::open(
            config.start_dir.clone(),
            config.extension_filter().map(<[String]>::to_vec),
        )
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Re-reads the current directory: directories first, then files, each sorted by name
    pub fn refresh(&mut self) -> io::Result<()> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.current_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            let is_dir = path.is_dir();
            if !is_dir {
                if let Some(extensions) = &self.extensions {
                    if !has_extension(&path, extensions) {
                        continue;
                    }
                }
            }
            entries.push(Entry { path, is_dir });
        }
        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.path.file_name().cmp(&b.path.file_name()))
        });
        trace!(
            "Listed {} entries in {:?}",
            entries.len(),
            self.current_dir
        );
        self.entries = entries;
        Ok(())
    }

    /// Moves to the parent directory; returns `false` at the root
    pub fn up(&mut self) -> io::Result<bool> {
        let parent = match self.current_dir.parent() {
            Some(parent) => parent.to_path_buf(),
            None => return Ok(false),
        };
        self.change_dir(parent)?;
        Ok(true)
    }

    /// Moves into the directory at `index`; returns `false` if it isn't a directory
    pub fn enter(&mut self, index: usize) -> io::Result<bool> {
        let path = match self.entries.get(index) {
            Some(entry) if entry.is_dir => entry.path.clone(),
            _ => return Ok(false),
        };
        self.change_dir(path)?;
        Ok(true)
    }

    /// The path of the file at `index`, or `None` for a directory or a bad index
    pub fn select(&self, index: usize) -> Option<PathBuf> {
        self.entries
            .get(index)
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.path.clone())
    }

    fn change_dir(&mut self, dir: PathBuf) -> io::Result<()> {
        let previous = std::mem::replace(&mut self.current_dir, dir);
        if let Err(err) = self.refresh() {
            self.current_dir = previous;
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn rom_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("saves")).unwrap();
        fs::create_dir(dir.path().join("Zelda")).unwrap();
        for file in ["tetris.gb", "Mario.GBC", "notes.txt", "zelda.gbc"] {
            fs::write(dir.path().join(file), b"").unwrap();
        }
        fs::write(dir.path().join("Zelda").join("links.gb"), b"").unwrap();
        dir
    }

    fn names(browser: &DirectoryBrowser) -> Vec<String> {
        browser.entries().iter().map(Entry::label).collect()
    }

    #[test]
    fn lists_directories_then_matching_roms() {
        let dir = rom_dir();
        let browser = DirectoryBrowser::from_config(
            &ChooserConfig::default().with_start_dir(dir.path()),
        )
        .unwrap();
        assert_eq!(
            names(&browser),
            vec![
                "[D] Zelda",
                "[D] saves",
                "[F] Mario.GBC",
                "[F] tetris.gb",
                "[F] zelda.gbc",
            ]
        );
    }

    #[test]
    fn unfiltered_listing_shows_everything() {
        let dir = rom_dir();
        let browser = DirectoryBrowser::open(dir.path(), None).unwrap();
        assert!(names(&browser).contains(&"[F] notes.txt".to_string()));
    }

    #[test]
    fn navigation_and_selection() {
        let dir = rom_dir();
        let root = dir.path();
        let mut browser =
            DirectoryBrowser::from_config(&ChooserConfig::default().with_start_dir(root)).unwrap();

        assert_eq!(browser.select(0), None);
        assert_eq!(browser.select(3), Some(root.join("tetris.gb")));
        assert_eq!(browser.select(42), None);
        assert!(!browser.enter(3).unwrap());

        assert!(browser.enter(0).unwrap());
        assert_eq!(browser.current_dir(), root.join("Zelda"));
        assert_eq!(browser.select(0), Some(root.join("Zelda").join("links.gb")));

        assert!(browser.up().unwrap());
        assert_eq!(browser.current_dir(), root);
    }

    #[test]
    fn failed_navigation_keeps_current_dir() {
        let dir = rom_dir();
        let mut browser = DirectoryBrowser::open(dir.path(), None).unwrap();
        fs::remove_dir(dir.path().join("saves")).unwrap();
        let saves = browser
            .entries()
            .iter()
            .position(|entry| entry.file_name() == "saves")
            .unwrap();
        assert!(browser.enter(saves).is_err());
        assert_eq!(browser.current_dir(), dir.path());
    }

    #[test]
    fn missing_start_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(DirectoryBrowser::open(missing, None).is_err());
    }
}
