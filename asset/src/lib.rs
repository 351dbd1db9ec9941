//! File-backed assets shared through a process-wide cache of memory mappings.
//!
//! Files are mapped read-only on first [`load`] and stay mapped until the last
//! [`Handle`] to them is dropped. Media crates (audio, voxel) sit on top of the
//! cache and pick a decoder for a handle through a [`format::Registry`].
//!
//! # Example
//! ```no_run
//! let handle = asset::load("assets/music.wav")?;
//! println!("{} is {} bytes", handle.filename(), handle.size());
//! # Ok::<(), asset::Error>(())
//! ```

use std::path::{Path, PathBuf};

mod cache;
pub mod format;
mod fs;
pub mod mapper;
mod settings;

pub use cache::{Cache, Handle};
pub use fs::{default_fs, dir_fs, valid_path, FileSystem};
pub use settings::{bootstrap, chdir_to_executable, Settings};

/// Errors of the asset cache and the virtual file system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load asset {path:?}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid asset name {0:?}")]
    InvalidPath(String),
    #[error("cannot read settings file {path:?}")]
    Settings {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings file {path:?}")]
    MalformedSettings {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot change working directory to the executable directory")]
    Chdir(#[source] std::io::Error),
}

/// Loads the file at `path` through the process-wide cache.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Handle, Error> {
    Cache::global().load(path)
}
