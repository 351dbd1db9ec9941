//! Asset settings and start-up of the asset layer.

use crate::{dir_fs, Error, FileSystem};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Environment variable with path to the settings file.
const SETTINGS_VAR: &str = "ASSET_SETTINGS";
const SETTINGS_DEFAULT_PATH: &str = "./asset_settings.json";

/// Environment variable that disables changing the working directory.
/// Test runners and launchers that manage the working directory set it.
const NO_CHDIR_VAR: &str = "ASSET_NO_CHDIR";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory the default file system opens asset names from.
    pub root: PathBuf,

    /// Whether `bootstrap` changes the working directory to the directory
    /// containing the executable, so relative asset paths resolve next to it.
    pub chdir_to_executable: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./"),
            chdir_to_executable: true,
        }
    }
}

impl Settings {
    /// Loads settings from the file specified by `ASSET_SETTINGS` environment
    /// variable (`./asset_settings.json` by default) and applies environment
    /// overrides.
    pub fn load() -> Result<Self, Error> {
        let path = std::env::var_os(SETTINGS_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| SETTINGS_DEFAULT_PATH.into());

        let mut settings = Self::from_file(&path)?;

        if std::env::var_os(NO_CHDIR_VAR).map_or(false, |v| v != "0") {
            settings.chdir_to_executable = false;
        }

        Ok(settings)
    }

    /// Reads settings from a JSON file. Missing file results in default
    /// settings, missing fields are filled with defaults.
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No settings file at {:?}, using defaults.", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(Error::Settings {
                    path: path.into(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| Error::MalformedSettings {
            path: path.into(),
            source,
        })
    }
}

/// Changes the working directory of the process to the directory that
/// contains the running executable.
pub fn chdir_to_executable() -> Result<(), Error> {
    let exe = std::env::current_exe().map_err(Error::Chdir)?;
    let dir = exe.parent().ok_or_else(|| {
        Error::Chdir(std::io::Error::new(
            ErrorKind::NotFound,
            "executable has no parent directory",
        ))
    })?;

    std::env::set_current_dir(dir).map_err(Error::Chdir)?;
    info!("Changed working directory to {:?}", dir);
    Ok(())
}

/// Prepares the asset layer according to `settings` and returns a file
/// system rooted at the configured root.
///
/// This is the only place the asset layer changes the working directory
/// and it only does so when `chdir_to_executable` is set.
pub fn bootstrap(settings: &Settings) -> Result<FileSystem, Error> {
    if settings.chdir_to_executable {
        chdir_to_executable()?;
    } else {
        warn!("Not changing working directory, relative asset paths resolve against the current one.");
    }

    Ok(dir_fs(settings.root.clone()))
}
