use core::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// File extensions of the ROM images the emulator core can load
pub const ROM_EXTENSIONS: [&str; 2] = ["gb", "gbc"];

#[cfg(target_os = "android")]
fn default_start_dir() -> PathBuf {
    PathBuf::from("/storage/emulated/0")
}

#[cfg(not(target_os = "android"))]
fn default_start_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

/// Settings for the file chooser shown by a [`SelectionRendezvous`]
///
/// [`SelectionRendezvous`]: crate::SelectionRendezvous
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChooserConfig {
    /// The directory the chooser starts browsing from
    pub start_dir: PathBuf,

    /// How long a caller waits for the chooser before giving up.
    ///
    /// `None` waits until the chooser completes, is dismissed or the wait
    /// is aborted.
    pub timeout: Option<Duration>,

    /// Extensions (without the leading `.`) of the files offered for selection
    pub extensions: Vec<String>,

    /// Hide files that don't match [`ChooserConfig::extensions`]
    pub only_allow_valid_extensions: bool,
}

impl Default for ChooserConfig {
    fn default() -> Self {
        Self {
            start_dir: default_start_dir(),
            timeout: None,
            extensions: ROM_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            only_allow_valid_extensions: true,
        }
    }
}

impl ChooserConfig {
    pub fn with_start_dir(mut self, start_dir: impl Into<PathBuf>) -> Self {
        self.start_dir = start_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn allow_any_extension(mut self) -> Self {
        self.only_allow_valid_extensions = false;
        self
    }

    /// Returns the extension filter to apply when listing files, if any
    pub fn extension_filter(&self) -> Option<&[String]> {
        if self.only_allow_valid_extensions {
            Some(&self.extensions)
        } else {
            None
        }
    }

    /// Whether `path` has one of the accepted extensions (ignoring case)
    pub fn accepts(&self, path: &Path) -> bool {
        match self.extension_filter() {
            None => true,
            Some(extensions) => has_extension(path, extensions),
        }
    }
}

pub(crate) fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// A (cheaply clonable) reference to the application's [`ChooserConfig`]
///
/// This provides a thread-safe way to access the latest chooser settings
/// from both the UI thread and the threads requesting selections.
///
/// Changes made through [`ConfigurationRef::replace`] or
/// [`ConfigurationRef::update`] become visible via pre-existing references.
#[derive(Clone, Default)]
pub struct ConfigurationRef {
    config: Arc<RwLock<ChooserConfig>>,
}
impl PartialEq for ConfigurationRef {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.config, &other.config) {
            true
        } else {
            let other_guard = other.config.read().unwrap();
            self.config.read().unwrap().eq(&*other_guard)
        }
    }
}
impl Eq for ConfigurationRef {}

impl fmt::Debug for ConfigurationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.read().unwrap().fmt(f)
    }
}

impl From<ChooserConfig> for ConfigurationRef {
    fn from(config: ChooserConfig) -> Self {
        Self::new(config)
    }
}

impl ConfigurationRef {
    pub fn new(config: ChooserConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    pub fn replace(&self, src: ChooserConfig) {
        *self.config.write().unwrap() = src;
    }

    pub fn update(&self, f: impl FnOnce(&mut ChooserConfig)) {
        f(&mut *self.config.write().unwrap());
    }

    // Returns a deep copy of the full chooser configuration
    pub fn copy(&self) -> ChooserConfig {
        self.config.read().unwrap().clone()
    }

    pub fn start_dir(&self) -> PathBuf {
        self.config.read().unwrap().start_dir.clone()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.read().unwrap().timeout
    }
}
