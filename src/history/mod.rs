//! Durable per-thread conversation history.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::error::ParleyError;
use crate::types::{ModelMessage, Role};

/// Default location of the history table.
pub const DEFAULT_HISTORY_FILE: &str = "chat_history/history.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl From<TurnRole> for Role {
    fn from(role: TurnRole) -> Self {
        match role {
            TurnRole::User => Role::User,
            TurnRole::Assistant => Role::Assistant,
            TurnRole::System => Role::System,
        }
    }
}

/// One role-tagged message in a conversation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content, Utc::now())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content, Utc::now())
    }

    /// Replay this turn as a model message, keeping its timestamp.
    pub fn to_model_message(&self) -> ModelMessage {
        let mut message = ModelMessage::text(self.role.into(), self.content.clone());
        message.timestamp = Some(self.timestamp);
        message
    }
}

/// Storage abstraction for conversation records keyed by thread id.
pub trait ConversationStore: Send + Sync {
    /// Most recent `limit` turns (all when `None`), oldest first. Unknown
    /// threads yield an empty list.
    fn load(&self, thread_id: &str, limit: Option<usize>)
        -> Result<Vec<ConversationTurn>, ParleyError>;

    /// Append turns to the end of the thread's record, creating it if absent.
    fn append(&self, thread_id: &str, turns: &[ConversationTurn]) -> Result<(), ParleyError>;

    /// Reset the thread's record to empty. Idempotent.
    fn clear(&self, thread_id: &str) -> Result<(), ParleyError>;
}

type HistoryTable = BTreeMap<String, Vec<ConversationTurn>>;

/// Writer lock for `path`, shared by every store handle in this process.
fn writer_lock_for(path: &Path) -> Result<Arc<Mutex<()>>, ParleyError> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

    let key = lock_key(path);
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .map_err(|_| ParleyError::InvalidState("history lock registry poisoned".into()))?;
    Ok(locks.entry(key).or_default().clone())
}

/// Absolute, `.`-free spelling so `a.json` and `./a.json` share one lock.
fn lock_key(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    absolute
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// JSON file holding every thread's turns in one table.
///
/// Every write re-reads and rewrites the whole table through a temp file and
/// rename. Writers to the same path are serialized process-wide, however many
/// handles point at it. Reads that hit a missing, empty, or malformed file
/// degrade to an empty table.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn new_default() -> Self {
        Self::new(DEFAULT_HISTORY_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_table(&self) -> HistoryTable {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HistoryTable::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "history unreadable, starting fresh");
                return HistoryTable::new();
            }
        };
        if raw.trim().is_empty() {
            return HistoryTable::new();
        }
        match serde_json::from_str(&raw) {
            Ok(table) => table,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "history corrupted, starting fresh");
                HistoryTable::new()
            }
        }
    }

    fn write_table(&self, table: &HistoryTable) -> Result<(), ParleyError> {
        let serialized = serde_json::to_vec_pretty(table)?;
        atomic_write(&self.path, &serialized)
    }

    fn modify(&self, thread_id: &str, f: impl FnOnce(&mut HistoryTable)) -> Result<(), ParleyError> {
        let lock = writer_lock_for(&self.path)?;
        let _guard = lock
            .lock()
            .map_err(|_| ParleyError::InvalidState("history writer lock poisoned".into()))?;
        let mut table = self.read_table();
        f(&mut table);
        self.write_table(&table)?;
        debug!(thread_id, path = %self.path.display(), "history written");
        Ok(())
    }
}

impl ConversationStore for JsonFileStore {
    fn load(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, ParleyError> {
        let mut turns = self.read_table().remove(thread_id).unwrap_or_default();
        if let Some(limit) = limit {
            let skip = turns.len().saturating_sub(limit);
            turns.drain(..skip);
        }
        Ok(turns)
    }

    fn append(&self, thread_id: &str, turns: &[ConversationTurn]) -> Result<(), ParleyError> {
        self.modify(thread_id, |table| {
            table
                .entry(thread_id.to_string())
                .or_default()
                .extend(turns.iter().cloned());
        })
    }

    fn clear(&self, thread_id: &str) -> Result<(), ParleyError> {
        self.modify(thread_id, |table| {
            table.insert(thread_id.to_string(), Vec::new());
        })
    }
}

/// Replace `path` with `data` in one rename; a failed write leaves the old
/// file untouched and no temp file behind.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ParleyError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let temp_path = temp_sibling(path)?;
    let written = write_synced(&temp_path, data).and_then(|()| fs::rename(&temp_path, path));
    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    Ok(written?)
}

fn temp_sibling(path: &Path) -> Result<PathBuf, ParleyError> {
    static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);
    let file_name = path.file_name().ok_or_else(|| {
        ParleyError::Configuration(format!("history path {} has no file name", path.display()))
    })?;
    Ok(path.with_file_name(format!(
        ".{}.{}-{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    )))
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(data)?;
    file.sync_all()
}
