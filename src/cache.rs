//! Session cache collaborators.
//!
//! The cache persists the resume token and the last room snapshot between
//! runs. It is consulted when a client is built and cleared on logout.
//! Cache failures never fail a protocol operation; they are logged.
//!
//! | Type | Storage |
//! |------|---------|
//! | [`MemoryCache`] | Process memory |
//! | [`JsonFileCache`] | One JSON document, replaced atomically |

// ============================================================================
// Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::chat::Room;
use crate::error::{Error, Result};

// ============================================================================
// SessionCache
// ============================================================================

/// Key-value persistence for session data.
pub trait SessionCache: Send + Sync {
    /// Returns the cached resume token.
    fn load_token(&self) -> Option<String>;

    /// Stores the resume token.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn store_token(&self, token: &str) -> Result<()>;

    /// Forgets the resume token, keeping everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn clear_token(&self) -> Result<()>;

    /// Returns the cached room snapshot.
    fn load_rooms(&self) -> Option<Vec<Room>>;

    /// Stores the room snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn store_rooms(&self, rooms: &[Room]) -> Result<()>;

    /// Removes everything (logout).
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be written.
    fn clear(&self) -> Result<()>;
}

/// Cached data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CacheSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rooms: Option<Vec<Room>>,
}

// ============================================================================
// MemoryCache
// ============================================================================

/// In-memory cache, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCache {
    snapshot: Mutex<CacheSnapshot>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache holding a token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            snapshot: Mutex::new(CacheSnapshot {
                token: Some(token.into()),
                rooms: None,
            }),
        }
    }
}

impl SessionCache for MemoryCache {
    fn load_token(&self) -> Option<String> {
        self.snapshot.lock().token.clone()
    }

    fn store_token(&self, token: &str) -> Result<()> {
        self.snapshot.lock().token = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        self.snapshot.lock().token = None;
        Ok(())
    }

    fn load_rooms(&self) -> Option<Vec<Room>> {
        self.snapshot.lock().rooms.clone()
    }

    fn store_rooms(&self, rooms: &[Room]) -> Result<()> {
        self.snapshot.lock().rooms = Some(rooms.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.snapshot.lock() = CacheSnapshot::default();
        Ok(())
    }
}

// ============================================================================
// JsonFileCache
// ============================================================================

/// Cache stored as a JSON file.
///
/// Every write replaces the whole file through a temporary file in the
/// same directory, so readers never see a partial document.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    snapshot: Mutex<CacheSnapshot>,
}

impl JsonFileCache {
    /// Opens the cache at `path`, loading it if the file exists.
    ///
    /// An unreadable or corrupt file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `path` has no parent directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.parent().is_none() || path.file_name().is_none() {
            return Err(Error::config(format!(
                "Invalid cache path: {}",
                path.display()
            )));
        }

        let snapshot = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt session cache");
                CacheSnapshot::default()
            }),
            Err(_) => CacheSnapshot::default(),
        };

        debug!(path = %path.display(), "Session cache opened");
        Ok(Self {
            path,
            snapshot: Mutex::new(snapshot),
        })
    }

    /// Returns the backing file path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(serde_json::to_string_pretty(snapshot)?.as_bytes())?;
        file.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut CacheSnapshot)) -> Result<()> {
        let mut snapshot = self.snapshot.lock();
        apply(&mut snapshot);
        self.persist(&snapshot)
    }
}

impl SessionCache for JsonFileCache {
    fn load_token(&self) -> Option<String> {
        self.snapshot.lock().token.clone()
    }

    fn store_token(&self, token: &str) -> Result<()> {
        self.update(|snapshot| snapshot.token = Some(token.to_string()))
    }

    fn clear_token(&self) -> Result<()> {
        self.update(|snapshot| snapshot.token = None)
    }

    fn load_rooms(&self) -> Option<Vec<Room>> {
        self.snapshot.lock().rooms.clone()
    }

    fn store_rooms(&self, rooms: &[Room]) -> Result<()> {
        self.update(|snapshot| snapshot.rooms = Some(rooms.to_vec()))
    }

    fn clear(&self) -> Result<()> {
        self.update(|snapshot| *snapshot = CacheSnapshot::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
