use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::model::{JournalEntry, MapDocument, MapGraph, MapSummary, NodeId};

/// A validated user id. Only `[A-Za-z0-9_-]`, since it names a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn parse(raw: &str) -> StoreResult<Self> {
        validate_id("user id", raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= 64
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_id(what: &'static str, raw: &str) -> StoreResult<()> {
    if is_valid_id(raw) {
        Ok(())
    } else {
        Err(StoreError::InvalidId {
            what,
            value: raw.to_string(),
        })
    }
}

/// Filter for `Store::list_journal`.
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub map_id: Option<String>,
    pub part_id: Option<NodeId>,
}

/// File-backed persistence for maps and journal entries.
///
/// ```text
/// <root>/settings.json
/// <root>/users/<user>/maps/<map-id>.json
/// <root>/users/<user>/journal/<entry-id>.json
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open the store at `$PARTMAP_HOME`, falling back to `~/.partmap`.
    pub fn from_env() -> Self {
        Self::open(data_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user: &UserId) -> PathBuf {
        self.root.join("users").join(user.as_str())
    }

    fn maps_dir(&self, user: &UserId) -> PathBuf {
        self.user_dir(user).join("maps")
    }

    fn journal_dir(&self, user: &UserId) -> PathBuf {
        self.user_dir(user).join("journal")
    }

    fn map_path(&self, user: &UserId, id: &str) -> StoreResult<PathBuf> {
        validate_id("map id", id)?;
        Ok(self.maps_dir(user).join(format!("{}.json", id)))
    }

    fn entry_path(&self, user: &UserId, id: &str) -> StoreResult<PathBuf> {
        validate_id("journal entry id", id)?;
        Ok(self.journal_dir(user).join(format!("{}.json", id)))
    }

    // --- Maps ---

    /// List a user's maps, sorted by name then id.
    pub fn list_maps(&self, user: &UserId) -> StoreResult<Vec<MapSummary>> {
        let mut maps: Vec<MapSummary> = read_all::<MapDocument>(&self.maps_dir(user))?
            .iter()
            .filter(|doc| doc.owner == user.as_str())
            .map(MapSummary::from)
            .collect();
        maps.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(maps)
    }

    pub fn create_map(&self, user: &UserId, name: &str) -> StoreResult<MapDocument> {
        let now = Utc::now();
        let doc = MapDocument {
            id: uuid::Uuid::new_v4().to_string(),
            owner: user.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            graph: MapGraph::default(),
        };
        let path = self.map_path(user, &doc.id)?;
        write_json(&path, &doc)?;
        tracing::info!(user = %user, map = %doc.id, "created map");
        Ok(doc)
    }

    pub fn read_map(&self, user: &UserId, id: &str) -> StoreResult<MapDocument> {
        let path = self.map_path(user, id)?;
        let not_found = || StoreError::NotFound {
            what: "map",
            id: id.to_string(),
        };
        let doc: MapDocument = read_json(&path)?.ok_or_else(not_found)?;
        if doc.owner != user.as_str() {
            return Err(not_found());
        }
        let violations = doc.graph.violations();
        if !violations.is_empty() {
            tracing::warn!(map = %id, ?violations, "map loaded with broken invariants");
        }
        Ok(doc)
    }

    /// Persist the whole document. Last write wins.
    pub fn save_map(&self, user: &UserId, doc: &mut MapDocument) -> StoreResult<()> {
        let path = self.map_path(user, &doc.id)?;
        doc.owner = user.to_string();
        doc.updated_at = Utc::now();
        write_json(&path, doc)?;
        tracing::debug!(map = %doc.id, nodes = doc.graph.nodes.len(), "saved map");
        Ok(())
    }

    /// Replace only the graph of an existing map.
    pub fn save_map_graph(
        &self,
        user: &UserId,
        id: &str,
        graph: MapGraph,
    ) -> StoreResult<MapDocument> {
        let mut doc = self.read_map(user, id)?;
        doc.graph = graph;
        self.save_map(user, &mut doc)?;
        Ok(doc)
    }

    pub fn rename_map(&self, user: &UserId, id: &str, name: &str) -> StoreResult<MapDocument> {
        let mut doc = self.read_map(user, id)?;
        doc.name = name.to_string();
        self.save_map(user, &mut doc)?;
        Ok(doc)
    }

    /// Delete a map. Missing maps are not an error.
    pub fn delete_map(&self, user: &UserId, id: &str) -> StoreResult<()> {
        remove_if_exists(&self.map_path(user, id)?)
    }

    // --- Journal ---

    /// List a user's journal entries, newest first.
    pub fn list_journal(
        &self,
        user: &UserId,
        filter: &JournalFilter,
    ) -> StoreResult<Vec<JournalEntry>> {
        let mut entries: Vec<JournalEntry> = read_all::<JournalEntry>(&self.journal_dir(user))?
            .into_iter()
            .filter(|e| e.owner == user.as_str())
            .filter(|e| filter.map_id.is_none() || e.map_id == filter.map_id)
            .filter(|e| filter.part_id.is_none() || e.part_id == filter.part_id)
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    pub fn read_journal_entry(&self, user: &UserId, id: &str) -> StoreResult<JournalEntry> {
        let path = self.entry_path(user, id)?;
        let not_found = || StoreError::NotFound {
            what: "journal entry",
            id: id.to_string(),
        };
        let entry: JournalEntry = read_json(&path)?.ok_or_else(not_found)?;
        if entry.owner != user.as_str() {
            return Err(not_found());
        }
        Ok(entry)
    }

    /// Create or update an entry. A missing or empty id creates a new entry;
    /// an existing id keeps its creation time.
    pub fn write_journal_entry(
        &self,
        user: &UserId,
        mut entry: JournalEntry,
    ) -> StoreResult<JournalEntry> {
        if entry.id.is_empty() {
            entry.id = uuid::Uuid::new_v4().to_string();
        }
        let path = self.entry_path(user, &entry.id)?;
        let now = Utc::now();
        match read_json::<JournalEntry>(&path)? {
            Some(existing) if existing.owner == user.as_str() => {
                entry.created_at = existing.created_at;
            }
            Some(_) => {
                return Err(StoreError::NotFound {
                    what: "journal entry",
                    id: entry.id,
                })
            }
            None => entry.created_at = now,
        }
        entry.owner = user.to_string();
        entry.updated_at = now;
        write_json(&path, &entry)?;
        tracing::debug!(entry = %entry.id, "saved journal entry");
        Ok(entry)
    }

    pub fn delete_journal_entry(&self, user: &UserId, id: &str) -> StoreResult<()> {
        remove_if_exists(&self.entry_path(user, id)?)
    }
}

/// Resolve the data directory: `$PARTMAP_HOME`, else `~/.partmap`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("PARTMAP_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".partmap")
}

// --- File helpers ---

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                action: "read",
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Json {
            path: path.to_path_buf(),
            source,
        })
}

/// Write JSON atomically (temp file + rename) so readers never observe a
/// half-written document. Each write gets its own temp file, so concurrent
/// writers of one path race only on the rename.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        what: "document",
        source,
    })?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err("create", dir))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));
    fs::write(&tmp, json).map_err(io_err("write", &tmp))?;
    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        StoreError::Io {
            action: "rename",
            path: path.to_path_buf(),
            source,
        }
    })
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io {
        action,
        path,
        source,
    }
}

fn remove_if_exists(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::Io {
            action: "delete",
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Read every `*.json` document in `dir`. Unreadable files are skipped with a
/// warning so one bad file doesn't hide the rest.
fn read_all<T: DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(source) => {
            return Err(StoreError::Io {
                action: "list",
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || path.extension().map_or(true, |e| e != "json") {
            continue;
        }
        match read_json::<T>(&path) {
            Ok(Some(doc)) => out.push(doc),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "skipping unreadable document"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_reject_path_components() {
        assert!(UserId::parse("alice_01").is_ok());
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("../etc").is_err());
        assert!(UserId::parse("a/b").is_err());
        assert!(UserId::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn map_path_validates_id() {
        let store = Store::open("/tmp/unused");
        let user = UserId::parse("u").unwrap();
        assert!(matches!(
            store.map_path(&user, "../../secret"),
            Err(StoreError::InvalidId { what: "map id", .. })
        ));
    }
}
