//! Learned-data persistence.
//!
//! One snapshot file per counterpart identity lives in a caller-chosen storage
//! directory, named `<opponent_id>_data.blob`. Snapshots are loaded once at session
//! start and written once at session end.
//!
//! Missing configuration (no storage directory or no counterpart identity) turns
//! both operations into no-ops. A missing file means "no prior knowledge". A corrupt
//! or foreign file is reported as a typed error by [`LearnedDataStore::try_load`]
//! and degrades to empty learned data in [`LearnedDataStore::load_data`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use negotiation_learning::persistence::{LearnedDataStore, PersistenceOptions};
//! use std::path::Path;
//!
//! let mut store = LearnedDataStore::new(PersistenceOptions::default());
//! let dir = Path::new("learned");
//!
//! store.load_data(Some(dir), Some("boulware_bot"));
//! store.data_mut().insert("opponent_accepted", true);
//! store.save_data(Some(dir), Some("boulware_bot")).unwrap();
//! ```

use crate::learned_data::{LearnedData, Snapshot};
use crate::learning::QEntry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Upper bound on a decoded snapshot, so a corrupt length prefix cannot trigger a
/// huge allocation.
const MAX_SNAPSHOT_BYTES: usize = 16 * 1024 * 1024;

/// File-name suffix appended to the counterpart identity.
pub const SNAPSHOT_SUFFIX: &str = "_data.blob";

/// Defines errors that can occur during snapshot persistence operations.
#[derive(Debug)]
pub enum PersistenceError {
    /// An error occurred during file I/O.
    Io(std::io::Error),
    /// An error occurred while serializing the snapshot.
    Serialization(String),
    /// The snapshot bytes could not be decoded.
    Deserialization(String),
    /// The snapshot decoded but failed validation (version, identity, values).
    InvalidFormat(String),
    /// The counterpart identity cannot be used as a file name.
    InvalidIdentity(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Io(e) => write!(f, "IO error: {}", e),
            PersistenceError::Serialization(e) => write!(f, "Serialization error: {}", e),
            PersistenceError::Deserialization(e) => write!(f, "Deserialization error: {}", e),
            PersistenceError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
            PersistenceError::InvalidIdentity(id) => {
                write!(f, "Invalid opponent identity: {:?}", id)
            }
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for PersistenceError {
    fn from(e: bincode::error::EncodeError) -> Self {
        PersistenceError::Serialization(e.to_string())
    }
}

/// The serialization format for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PersistenceFormat {
    /// Compact binary encoding (`bincode`).
    #[default]
    Binary,
    /// JSON, which is human-readable.
    Json,
}

/// Options for configuring persistence operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceOptions {
    /// The `PersistenceFormat` to use for serialization.
    pub format: PersistenceFormat,
    /// If `true`, pretty-prints JSON output. Ignored for binary snapshots.
    pub pretty: bool,
}

impl Default for PersistenceOptions {
    fn default() -> Self {
        Self::compact()
    }
}

impl PersistenceOptions {
    /// Returns options optimized for compact storage (binary).
    pub fn compact() -> Self {
        Self {
            format: PersistenceFormat::Binary,
            pretty: false,
        }
    }

    /// Returns options optimized for human-readability (pretty-printed JSON).
    pub fn readable() -> Self {
        Self {
            format: PersistenceFormat::Json,
            pretty: true,
        }
    }
}

fn binary_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_SNAPSHOT_BYTES>()
}

/// Encodes `value` with the format selected in `options`.
pub fn serialize_with_options<T: Serialize>(
    value: &T,
    options: &PersistenceOptions,
) -> Result<Vec<u8>, PersistenceError> {
    let bytes = match options.format {
        PersistenceFormat::Json => {
            if options.pretty {
                serde_json::to_vec_pretty(value)?
            } else {
                serde_json::to_vec(value)?
            }
        }
        PersistenceFormat::Binary => bincode::serde::encode_to_vec(value, binary_config())?,
    };
    Ok(bytes)
}

/// Decodes bytes written by [`serialize_with_options`] with the same options.
pub fn deserialize_with_options<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
    options: &PersistenceOptions,
) -> Result<T, PersistenceError> {
    match options.format {
        PersistenceFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| PersistenceError::Deserialization(e.to_string())),
        PersistenceFormat::Binary => {
            let (value, read) = bincode::serde::decode_from_slice(bytes, binary_config())
                .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;
            if read != bytes.len() {
                return Err(PersistenceError::Deserialization(format!(
                    "{} trailing byte(s) after snapshot",
                    bytes.len() - read
                )));
            }
            Ok(value)
        }
    }
}

/// Returns `<storage_dir>/<opponent_id>_data.blob`.
///
/// Identities that are empty, contain a path separator or a NUL byte, or are `.`
/// or `..` are rejected so a snapshot can never land outside `storage_dir`.
pub fn snapshot_path(storage_dir: &Path, opponent_id: &str) -> Result<PathBuf, PersistenceError> {
    let unsafe_id = opponent_id.is_empty()
        || opponent_id == "."
        || opponent_id == ".."
        || opponent_id.contains(&['/', '\\', '\0'][..]);

    if unsafe_id {
        return Err(PersistenceError::InvalidIdentity(opponent_id.to_string()));
    }

    Ok(storage_dir.join(format!("{}{}", opponent_id, SNAPSHOT_SUFFIX)))
}

/// Holds one counterpart's learned data for the duration of a session and moves it
/// to and from disk at the session boundaries.
#[derive(Debug, Clone, Default)]
pub struct LearnedDataStore {
    data: LearnedData,
    q_values: Vec<QEntry>,
    options: PersistenceOptions,
}

impl LearnedDataStore {
    /// Creates an empty store.
    pub fn new(options: PersistenceOptions) -> Self {
        Self {
            data: LearnedData::new(),
            q_values: Vec::new(),
            options,
        }
    }

    pub fn data(&self) -> &LearnedData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut LearnedData {
        &mut self.data
    }

    /// Q-table rows restored by the last load, or staged for the next save.
    pub fn q_values(&self) -> &[QEntry] {
        &self.q_values
    }

    /// Stages Q-table rows to be written with the next save.
    pub fn set_q_values(&mut self, q_values: Vec<QEntry>) {
        self.q_values = q_values;
    }

    pub fn options(&self) -> &PersistenceOptions {
        &self.options
    }

    /// Writes the learned data for `opponent_id` into `storage_dir`.
    ///
    /// Returns `Ok(false)` without touching the disk when either key is absent, and
    /// [`PersistenceError::InvalidFormat`] for data a later load would reject.
    /// The directory is created if needed; the file is written through a temporary
    /// sibling and renamed into place.
    pub fn save_data(
        &self,
        storage_dir: Option<&Path>,
        opponent_id: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        let (Some(storage_dir), Some(opponent_id)) = (storage_dir, opponent_id) else {
            log::debug!("No storage directory or opponent identity; skipping save");
            return Ok(false);
        };

        let path = snapshot_path(storage_dir, opponent_id)?;
        let snapshot = Snapshot::new(opponent_id, self.data.clone(), self.q_values.clone());
        snapshot.validate(opponent_id)?;
        let bytes = serialize_with_options(&snapshot, &self.options)?;

        fs::create_dir_all(storage_dir)?;
        let tmp_path = path.with_extension("blob.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        log::info!(
            "Saved learned data for '{}' to {:?} ({} entries, {} Q-values)",
            opponent_id,
            path,
            self.data.len(),
            self.q_values.len()
        );
        Ok(true)
    }

    /// Reads and validates the snapshot for `opponent_id`, without touching the
    /// store.
    ///
    /// `Ok(None)` when either key is absent or no snapshot exists.
    pub fn try_load(
        &self,
        storage_dir: Option<&Path>,
        opponent_id: Option<&str>,
    ) -> Result<Option<Snapshot>, PersistenceError> {
        let (Some(storage_dir), Some(opponent_id)) = (storage_dir, opponent_id) else {
            return Ok(None);
        };

        let path = snapshot_path(storage_dir, opponent_id)?;
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = fs::read(&path)?;
        let snapshot: Snapshot = deserialize_with_options(&bytes, &self.options)?;
        snapshot.validate(opponent_id)?;

        Ok(Some(snapshot))
    }

    /// Resets the store, then fills it from the snapshot for `opponent_id` if one
    /// exists. Never fails: an unreadable snapshot is logged and ignored.
    pub fn load_data(
        &mut self,
        storage_dir: Option<&Path>,
        opponent_id: Option<&str>,
    ) -> &LearnedData {
        self.data.clear();
        self.q_values.clear();

        match self.try_load(storage_dir, opponent_id) {
            Ok(Some(snapshot)) => {
                log::info!(
                    "Loaded learned data for '{}' ({} entries, {} Q-values)",
                    snapshot.opponent_id,
                    snapshot.data.len(),
                    snapshot.q_values.len()
                );
                self.data = snapshot.data;
                self.q_values = snapshot.q_values;
            }
            Ok(None) => {
                log::debug!("No prior learned data for {:?}", opponent_id);
            }
            Err(e) => {
                log::warn!(
                    "Discarding learned data for {:?}: {}",
                    opponent_id.unwrap_or_default(),
                    e
                );
            }
        }

        &self.data
    }
}
