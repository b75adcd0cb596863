//! Session module — per-conversation append-only transcripts
//!
//! A `Session` is an ordered, append-only message list plus metadata,
//! identified by a routing key (`"channel:chat_id"` or an explicit
//! override). The in-memory cache is authoritative for the process
//! lifetime; the JSONL file under `<data_dir>/` is the durable projection.
//!
//! On-disk format: line 1 is the `SessionMeta` record, each further line is
//! one `Message`, all JSON. A partially written file simply stops loading at
//! the first malformed line.

pub mod types;

pub use types::{Message, Role, SessionMeta, ToolCallRecord};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;

/// Interior state behind the per-session lock.
#[derive(Debug)]
struct SessionState {
    meta: SessionMeta,
    messages: Vec<Message>,
}

/// A handle to one conversation transcript.
///
/// Cloning is cheap and shares state; every mutation goes through the
/// per-session lock, so concurrent appends from the agent loop, sub-agents,
/// and cron are serialised. Reads return defensive copies.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<RwLock<SessionState>>,
}

impl Session {
    /// Create a fresh empty session for a key.
    pub fn new(key: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState {
                meta: SessionMeta::new(key),
                messages: Vec::new(),
            })),
        }
    }

    fn from_parts(meta: SessionMeta, messages: Vec<Message>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionState { meta, messages })),
        }
    }

    /// The session routing key.
    pub async fn key(&self) -> String {
        self.inner.read().await.meta.key.clone()
    }

    /// Append a message. Assigns an RFC-3339 timestamp when absent and
    /// bumps `updated_at`. Entries are never rewritten or deleted.
    pub async fn append(&self, mut msg: Message) {
        let mut state = self.inner.write().await;
        if msg.timestamp.is_none() {
            msg.timestamp = Some(Utc::now().to_rfc3339());
        }
        state.messages.push(msg);
        state.meta.updated_at = Utc::now().to_rfc3339();
    }

    /// Snapshot copy of messages from the consolidation cursor onwards:
    /// the slice an agent turn feeds to the provider.
    pub async fn history(&self) -> Vec<Message> {
        let state = self.inner.read().await;
        let start = state.meta.last_consolidated.min(state.messages.len());
        state.messages[start..].to_vec()
    }

    /// Snapshot copy of the full transcript.
    pub async fn all_messages(&self) -> Vec<Message> {
        self.inner.read().await.messages.clone()
    }

    /// Number of messages in the transcript.
    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    /// Whether the transcript is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.messages.is_empty()
    }

    /// Advance the consolidation cursor. Clamped to the message count so
    /// `last_consolidated <= len(messages)` always holds.
    pub async fn set_consolidated(&self, index: usize) {
        let mut state = self.inner.write().await;
        state.meta.last_consolidated = index.min(state.messages.len());
    }

    /// Current consolidation cursor.
    pub async fn last_consolidated(&self) -> usize {
        self.inner.read().await.meta.last_consolidated
    }

    /// Snapshot of the metadata record.
    pub async fn meta(&self) -> SessionMeta {
        self.inner.read().await.meta.clone()
    }

    /// Consistent (meta, messages) snapshot for persistence.
    async fn snapshot(&self) -> (SessionMeta, Vec<Message>) {
        let state = self.inner.read().await;
        (state.meta.clone(), state.messages.clone())
    }
}

/// Derive the on-disk filename from a session key: `:` and `/` become `_`,
/// then `.jsonl` is appended.
///
/// The mapping is not injective: `a:b` and `a_b` collide. Pinned as-is;
/// see DESIGN.md.
pub fn key_to_filename(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c == ':' || c == '/' { '_' } else { c })
        .collect();
    name.push_str(".jsonl");
    name
}

/// Session store: in-memory cache plus JSONL persistence.
pub struct SessionManager {
    data_dir: PathBuf,
    cache: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create a manager rooted at `data_dir`. The directory is created
    /// lazily on first save.
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Return the cached session, load it from disk, or create a fresh one.
    ///
    /// Disk I/O happens outside the cache lock; two racing loaders resolve
    /// through the re-check, with the first insert winning.
    pub async fn get_or_create(&self, key: &str) -> Session {
        {
            let cache = self.cache.read().await;
            if let Some(session) = cache.get(key) {
                return session.clone();
            }
        }

        let loaded = self.load(key).await;

        let mut cache = self.cache.write().await;
        if let Some(session) = cache.get(key) {
            return session.clone();
        }
        let session = loaded.unwrap_or_else(|| Session::new(key));
        cache.insert(key.to_string(), session.clone());
        session
    }

    /// Persist a session: rewrite the whole file (meta line + one line per
    /// message). The in-memory state stays authoritative if the write fails.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let (meta, messages) = session.snapshot().await;

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.data_dir.join(key_to_filename(&meta.key));

        let mut out = serde_json::to_string(&meta)?;
        out.push('\n');
        for msg in &messages {
            out.push_str(&serde_json::to_string(msg)?);
            out.push('\n');
        }

        tokio::fs::write(&path, out).await?;
        Ok(())
    }

    /// Load a session from disk. Returns `None` when the file is absent or
    /// the meta line is unreadable; malformed message lines are skipped.
    async fn load(&self, key: &str) -> Option<Session> {
        let path = self.data_dir.join(key_to_filename(key));
        let content = tokio::fs::read_to_string(&path).await.ok()?;

        let mut lines = content.lines();
        let meta: SessionMeta = match lines.next().and_then(|l| serde_json::from_str(l).ok()) {
            Some(meta) => meta,
            None => {
                warn!(key, "Session file has no readable meta line, starting fresh");
                return None;
            }
        };

        let mut messages = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => messages.push(msg),
                // Truncated or corrupt tail; keep what loaded so far.
                Err(_) => continue,
            }
        }

        Some(Session::from_parts(meta, messages))
    }

    /// Number of sessions currently cached in memory.
    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Persist every cached session; failures are logged and skipped.
    pub async fn flush_all(&self) {
        let sessions: Vec<Session> = {
            let cache = self.cache.read().await;
            cache.values().cloned().collect()
        };
        for session in sessions {
            if let Err(e) = self.save(&session).await {
                warn!(error = %e, "Failed to flush session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_get_or_create_fresh() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().to_path_buf());
        let session = manager.get_or_create("test-session").await;
        assert!(session.is_empty().await);
        assert_eq!(session.key().await, "test-session");
    }

    #[tokio::test]
    async fn test_cache_is_shared() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().to_path_buf());

        let a = manager.get_or_create("shared").await;
        a.append(Message::user("one")).await;

        let b = manager.get_or_create("shared").await;
        assert_eq!(b.len().await, 1);
    }

    #[tokio::test]
    async fn test_append_assigns_timestamp() {
        let session = Session::new("t");
        session.append(Message::user("hi")).await;
        let msgs = session.all_messages().await;
        assert!(msgs[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_append_preserves_existing_timestamp() {
        let session = Session::new("t");
        let mut msg = Message::user("hi");
        msg.timestamp = Some("2020-01-01T00:00:00Z".to_string());
        session.append(msg).await;
        let msgs = session.all_messages().await;
        assert_eq!(msgs[0].timestamp.as_deref(), Some("2020-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn test_history_respects_cursor() {
        let session = Session::new("t");
        session.append(Message::user("a")).await;
        session.append(Message::assistant("b")).await;
        session.append(Message::user("c")).await;

        assert_eq!(session.history().await.len(), 3);

        session.set_consolidated(2).await;
        let history = session.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "c");
    }

    #[tokio::test]
    async fn test_cursor_clamped_to_len() {
        let session = Session::new("t");
        session.append(Message::user("a")).await;
        session.set_consolidated(99).await;
        assert_eq!(session.last_consolidated().await, 1);
        assert!(session.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_snapshot() {
        let session = Session::new("t");
        session.append(Message::user("a")).await;
        let history = session.history().await;
        session.append(Message::assistant("b")).await;
        // The earlier snapshot must not observe the later append.
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().to_path_buf());

        let session = manager.get_or_create("telegram:99999").await;
        session.append(Message::user("save me")).await;
        session.append(Message::assistant("saved")).await;
        session.set_consolidated(1).await;
        manager.save(&session).await.unwrap();

        // A fresh manager must load the same state from disk.
        let manager2 = SessionManager::new(dir.path().to_path_buf());
        let loaded = manager2.get_or_create("telegram:99999").await;
        assert_eq!(loaded.key().await, "telegram:99999");
        assert_eq!(loaded.last_consolidated().await, 1);
        let msgs = loaded.all_messages().await;
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "save me");
        assert_eq!(msgs[0].role, Role::User);
        assert_eq!(msgs[1].content, "saved");
        assert_eq!(msgs[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_load_invariant_cursor_bounded() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().to_path_buf());
        let session = manager.get_or_create("inv").await;
        for i in 0..5 {
            session.append(Message::user(&format!("m{}", i))).await;
        }
        session.set_consolidated(3).await;
        manager.save(&session).await.unwrap();

        let manager2 = SessionManager::new(dir.path().to_path_buf());
        let loaded = manager2.get_or_create("inv").await;
        assert!(loaded.last_consolidated().await <= loaded.len().await);
    }

    #[tokio::test]
    async fn test_load_tolerates_truncated_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.jsonl");
        let meta = serde_json::to_string(&SessionMeta::new("trunc")).unwrap();
        let msg = serde_json::to_string(&Message::user("ok")).unwrap();
        tokio::fs::write(&path, format!("{}\n{}\n{{\"role\":\"user\",\"cont", meta, msg))
            .await
            .unwrap();

        let manager = SessionManager::new(dir.path().to_path_buf());
        let loaded = manager.get_or_create("trunc").await;
        assert_eq!(loaded.len().await, 1);
        assert_eq!(loaded.all_messages().await[0].content, "ok");
    }

    #[tokio::test]
    async fn test_load_unreadable_meta_starts_fresh() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("bad.jsonl"), "not json at all\n")
            .await
            .unwrap();

        let manager = SessionManager::new(dir.path().to_path_buf());
        let loaded = manager.get_or_create("bad").await;
        assert!(loaded.is_empty().await);
    }

    #[test]
    fn test_key_to_filename() {
        assert_eq!(key_to_filename("telegram:chat123"), "telegram_chat123.jsonl");
        assert_eq!(key_to_filename("path/to/key"), "path_to_key.jsonl");
        assert_eq!(key_to_filename("plain"), "plain.jsonl");
    }

    #[test]
    fn test_key_to_filename_collisions_pinned() {
        // Known sharp edge: keys differing only in ':' vs '/' vs '_' collide.
        assert_eq!(key_to_filename("a:b"), key_to_filename("a_b"));
        assert_eq!(key_to_filename("a:b"), key_to_filename("a/b"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialised() {
        let session = Session::new("concurrent");
        let mut handles = Vec::new();
        for i in 0..10 {
            let s = session.clone();
            handles.push(tokio::spawn(async move {
                s.append(Message::user(&format!("m{}", i))).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(session.len().await, 10);
    }

    #[tokio::test]
    async fn test_flush_all() {
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().to_path_buf());
        let a = manager.get_or_create("flush:a").await;
        a.append(Message::user("x")).await;
        manager.get_or_create("flush:b").await;
        manager.flush_all().await;

        assert!(dir.path().join("flush_a.jsonl").exists());
        assert!(dir.path().join("flush_b.jsonl").exists());
    }

    #[tokio::test]
    async fn test_tool_call_invariant_roundtrip() {
        // A tool message's id must match a prior assistant tool-call id.
        let dir = tempdir().unwrap();
        let manager = SessionManager::new(dir.path().to_path_buf());
        let session = manager.get_or_create("tools").await;

        session.append(Message::user("run it")).await;
        session
            .append(Message::assistant_with_tools(
                "",
                vec![ToolCallRecord::new("tc1", "echo", "{}")],
            ))
            .await;
        session.append(Message::tool_result("tc1", "done")).await;
        manager.save(&session).await.unwrap();

        let manager2 = SessionManager::new(dir.path().to_path_buf());
        let loaded = manager2.get_or_create("tools").await;
        let msgs = loaded.all_messages().await;
        for (i, msg) in msgs.iter().enumerate() {
            if msg.role == Role::Tool {
                let id = msg.tool_call_id.as_deref().unwrap();
                let has_source = msgs[..i].iter().any(|m| {
                    m.role == Role::Assistant
                        && m.tool_calls
                            .as_ref()
                            .map(|tcs| tcs.iter().any(|tc| tc.id == id))
                            .unwrap_or(false)
                });
                assert!(has_source, "tool message {} has no matching tool call", id);
            }
        }
    }
}
