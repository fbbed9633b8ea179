// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Small JSON state files with atomic replacement.
//!
//! Every write goes to a temporary file in the target directory, is synced,
//! and is then renamed over the target, so a reader never sees a partial
//! document. A file that is missing or fails to parse is replaced with the
//! type's default on load.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PersistError, PersistResult};

/// pH calibration file.
pub const PH_CALIBRATION_FILE: &str = "ph_calibration.json";
/// Flow calibration file.
pub const FLOW_CALIBRATION_FILE: &str = "calibration_data.json";
/// Total-flow accumulator file.
pub const TOTAL_FLOW_FILE: &str = "total_flow.json";
/// Runtime accumulator file.
pub const RUN_TIME_FILE: &str = "run_time.json";
/// Control state snapshot file.
pub const CONTROL_STATE_FILE: &str = "state.json";

/// A directory of JSON state files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the full path of `name`.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Reads and decodes `name`.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> PersistResult<T> {
        let path = self.path(name);
        let content = fs::read(&path).map_err(|e| PersistError::io(&path, e))?;
        serde_json::from_slice(&content).map_err(|source| PersistError::Deserialize { path, source })
    }

    /// Loads `name`, writing the default back when it is missing or corrupt.
    pub fn load_or_init<T>(&self, name: &str) -> T
    where
        T: DeserializeOwned + Serialize + Default,
    {
        match self.load(name) {
            Ok(value) => value,
            Err(e) => {
                if e.is_not_found() {
                    tracing::info!(file = %name, "State file missing, writing defaults");
                } else {
                    tracing::warn!(file = %name, error = %e, "State file unreadable, resetting to defaults");
                }
                let value = T::default();
                if let Err(e) = self.save(name, &value) {
                    tracing::error!(file = %name, error = %e, "Failed to write default state");
                }
                value
            }
        }
    }

    /// Atomically writes `value` to `name`.
    pub fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> PersistResult<()> {
        let path = self.path(name);
        let body = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Serialize {
            path: path.clone(),
            source,
        })?;

        fs::create_dir_all(&self.dir).map_err(|e| PersistError::io(&self.dir, e))?;
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        write().map_err(|e| {
            let _ = fs::remove_file(&tmp);
            PersistError::io(&path, e)
        })
    }
}
