use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use carapace_core::Message;

/// Channel tag applied to sessions rebuilt from disk, so callers can tell
/// them apart from live-created ones.
pub const RECOVERED_CHANNEL: &str = "recovered";

/// A conversation session. Owned by the [`SessionStore`] while in memory;
/// the JSONL log on disk outlives eviction.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    /// Originating surface, e.g. "api", "slack", "recovered".
    pub channel: String,
    pub user_id: String,
    /// Append-only; insertion order is conversation order.
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    fn new(channel: &str, user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }
}

/// Durable session store. The map is safe for concurrent access across
/// sessions; serializing appends *within* one session is the caller's
/// responsibility (one in-flight agent turn per session id).
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    dir: PathBuf,
    ttl: Duration,
    eviction_interval: Duration,
    eviction_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionStore {
    /// Open the store: create the log directory if needed and recover every
    /// session log found in it.
    pub fn open(dir: PathBuf, ttl: Duration, eviction_interval: Duration) -> carapace_core::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let store = Self {
            sessions: DashMap::new(),
            dir,
            ttl,
            eviction_interval,
            eviction_task: Mutex::new(None),
        };
        store.recover_from_disk();
        Ok(store)
    }

    /// Allocate a new session and register it in the in-memory map.
    pub fn create_session(&self, channel: &str, user_id: &str) -> Session {
        let session = Session::new(channel, user_id);
        self.sessions.insert(session.id, session.clone());
        debug!(session = %session.id, channel, "session created");
        session
    }

    /// Snapshot of a session, or `None` if it is not in memory.
    pub fn get_session(&self, id: Uuid) -> Option<Session> {
        self.sessions.get(&id).map(|s| s.clone())
    }

    /// Snapshot of a session's message list.
    pub fn messages(&self, id: Uuid) -> Option<Vec<Message>> {
        self.sessions.get(&id).map(|s| s.messages.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Append a message to a session: in-memory list first, then one JSONL
    /// line flushed to the session's log. Unknown session ids are logged and
    /// ignored. A disk-write failure is logged but does not roll back the
    /// in-memory append; memory and disk can diverge for that turn.
    pub fn append_message(&self, id: Uuid, message: Message) {
        let Some(mut session) = self.sessions.get_mut(&id) else {
            warn!(session = %id, "append to unknown session, dropping message");
            return;
        };
        session.messages.push(message.clone());
        session.last_active_at = Utc::now();
        drop(session);

        if let Err(e) = self.persist_line(id, &message) {
            error!(session = %id, error = %e, "failed to persist message, in-memory copy only");
        }
    }

    fn persist_line(&self, id: Uuid, message: &Message) -> carapace_core::Result<()> {
        let path = self.log_path(id);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(message)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    }

    fn log_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.jsonl"))
    }

    // ── Recovery ───────────────────────────────────────────────

    fn recover_from_disk(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "failed to scan sessions directory");
                return;
            }
        };

        let mut loaded = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<Uuid>().ok())
            else {
                warn!(file = %path.display(), "session log has no uuid stem, skipping");
                continue;
            };
            match self.recover_session(id, &path) {
                Some(session) => {
                    self.sessions.insert(id, session);
                    loaded += 1;
                }
                None => debug!(file = %path.display(), "no parseable messages, not loading"),
            }
        }
        if loaded > 0 {
            info!(count = loaded, "recovered sessions from disk");
        }
    }

    /// Replay a log file line by line. Corrupt lines (a torn trailing write,
    /// typically) are skipped without aborting the rest of the file. A log
    /// with zero parseable lines yields no session.
    fn recover_session(&self, id: Uuid, path: &std::path::Path) -> Option<Session> {
        let file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to open session log");
                return None;
            }
        };

        let mut messages = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(session = %id, error = %e, "read error mid-log, keeping recovered prefix");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(&line) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(session = %id, error = %e, "skipping unparseable log line"),
            }
        }

        if messages.is_empty() {
            return None;
        }

        let created_at = messages.first().map(|m| m.timestamp()).unwrap_or_else(Utc::now);
        let last_active_at = messages.last().map(|m| m.timestamp()).unwrap_or_else(Utc::now);
        Some(Session {
            id,
            channel: RECOVERED_CHANNEL.to_string(),
            user_id: "unknown".to_string(),
            messages,
            created_at,
            last_active_at,
        })
    }

    /// Re-load a single evicted session from its log, registering it back in
    /// the map. Returns the recovered session if the log had content.
    pub fn recover_one(&self, id: Uuid) -> Option<Session> {
        let session = self.recover_session(id, &self.log_path(id))?;
        self.sessions.insert(id, session.clone());
        Some(session)
    }

    // ── Eviction ───────────────────────────────────────────────

    /// Start the background eviction sweep. Idempotent; the task is owned by
    /// the store and stopped via [`SessionStore::stop_eviction`] or drop.
    pub fn start_eviction(self: &std::sync::Arc<Self>) {
        let mut guard = self.eviction_task.lock();
        if guard.is_some() {
            return;
        }
        let store = std::sync::Arc::clone(self);
        let interval = self.eviction_interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately, skip it
            loop {
                ticker.tick().await;
                let cutoff = Utc::now()
                    - chrono::Duration::from_std(store.ttl).unwrap_or(chrono::Duration::hours(24));
                store.evict_older_than(cutoff);
            }
        }));
    }

    pub fn stop_eviction(&self) {
        if let Some(handle) = self.eviction_task.lock().take() {
            handle.abort();
        }
    }

    /// Drop sessions idle since before `cutoff` from memory. Their JSONL
    /// logs stay on disk and can be recovered later.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_active_at >= cutoff);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            info!(count = evicted, "evicted idle sessions from memory (logs retained on disk)");
        }
        evicted
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        if let Some(handle) = self.eviction_task.lock().take() {
            handle.abort();
        }
    }
}
