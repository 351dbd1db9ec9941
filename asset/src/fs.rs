//! Minimal virtual file system on top of the asset cache.

use crate::{Cache, Error, Handle};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Arc;

static DEFAULT: Lazy<FileSystem> = Lazy::new(|| dir_fs("./"));

/// Opens assets by slash-separated names relative to a root directory.
///
/// All files opened through a `FileSystem` are shared through its `Cache`,
/// so opening the same name twice maps the file only once.
#[derive(Clone)]
pub struct FileSystem {
    root: PathBuf,
    cache: Arc<Cache>,
}

impl FileSystem {
    /// Creates a file system rooted at `root` that loads through `cache`.
    pub fn with_cache<P: Into<PathBuf>>(root: P, cache: Arc<Cache>) -> Self {
        Self {
            root: root.into(),
            cache,
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens the asset `name`.
    ///
    /// Names must be valid according to [`valid_path`]. The handle's
    /// filename is the root joined with `name`.
    pub fn open(&self, name: &str) -> Result<Handle, Error> {
        if !valid_path(name) {
            return Err(Error::InvalidPath(name.to_string()));
        }
        self.cache.load(self.root.join(name))
    }
}

impl std::fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystem")
            .field("root", &self.root)
            .finish()
    }
}

/// Returns a file system rooted at `root` backed by the process-wide cache.
pub fn dir_fs<P: Into<PathBuf>>(root: P) -> FileSystem {
    FileSystem::with_cache(root, Cache::global().clone())
}

/// Returns the default file system rooted at the working directory.
pub fn default_fs() -> &'static FileSystem {
    &DEFAULT
}

/// Reports whether `name` is a valid asset name.
///
/// Valid names are unrooted, slash-separated sequences of elements, like
/// `textures/grass.png`. Elements must not be empty, `.` or `..`. The only
/// exception is the name `.` alone, which refers to the root.
pub fn valid_path(name: &str) -> bool {
    if name == "." {
        return true;
    }

    name.split('/')
        .all(|element| !element.is_empty() && element != "." && element != "..")
}
