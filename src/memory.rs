//! Per-user conversation memory, persisted as one JSON file per user.
//!
//! Each user's history is a bounded deque of question/answer turns; when it
//! exceeds `max_history` the oldest turns are evicted. Writes go to a
//! temporary file which is then renamed over the real one, so a crash
//! mid-write never leaves a truncated record. Concurrent appends for the
//! same user are serialized through a per-user mutex.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::MemoryConfig;
use crate::error::{Error, Result};
use crate::models::{ConversationRecord, Interaction};

pub struct ConversationStore {
    root: PathBuf,
    max_history: usize,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationStore {
    pub async fn open(config: &MemoryConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.path).await?;
        Ok(Self {
            root: config.path.clone(),
            max_history: config.max_history,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Reject user ids that cannot safely name a file in the store root.
    fn validate_user_id(user_id: &str) -> Result<()> {
        if user_id.is_empty()
            || user_id.contains('/')
            || user_id.contains('\\')
            || user_id.contains("..")
        {
            return Err(Error::InvalidUserId(user_id.to_string()));
        }
        Ok(())
    }

    fn record_path(&self, user_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", user_id))
    }

    async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, user_id: &str) -> Result<ConversationRecord> {
        match tokio::fs::read(self.record_path(user_id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(ConversationRecord::empty(user_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, record: &ConversationRecord) -> Result<()> {
        let path = self.record_path(&record.user_id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Append one question/answer turn, evicting the oldest turns beyond
    /// `max_history`. The read-modify-write is serialized per user.
    pub async fn append(
        &self,
        user_id: &str,
        user_msg: &str,
        assistant_msg: &str,
        retrieved_docs: usize,
    ) -> Result<()> {
        Self::validate_user_id(user_id)?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        let mut record = self.load(user_id).await?;
        record.messages.push_back(Interaction {
            timestamp: chrono::Utc::now(),
            user: user_msg.to_string(),
            assistant: assistant_msg.to_string(),
            retrieved_docs,
        });
        while record.messages.len() > self.max_history {
            record.messages.pop_front();
        }
        record.updated_at = chrono::Utc::now();

        self.persist(&record).await
    }

    /// Full stored history; an empty record if the user has none.
    pub async fn get(&self, user_id: &str) -> Result<ConversationRecord> {
        Self::validate_user_id(user_id)?;
        self.load(user_id).await
    }

    /// The last `turns` interactions rendered for prompt injection, oldest
    /// first. Empty string when the user has no history.
    pub async fn recent_context(&self, user_id: &str, turns: usize) -> Result<String> {
        let record = self.get(user_id).await?;
        if record.messages.is_empty() || turns == 0 {
            return Ok(String::new());
        }

        let skip = record.messages.len().saturating_sub(turns);
        let mut out = String::from("Previous conversation:\n");
        for interaction in record.messages.iter().skip(skip) {
            out.push_str(&format!(
                "User: {}\nAssistant: {}\n\n",
                interaction.user, interaction.assistant
            ));
        }
        Ok(out)
    }

    /// Delete a user's history. Clearing a user with no history is a no-op.
    pub async fn clear(&self, user_id: &str) -> Result<()> {
        Self::validate_user_id(user_id)?;
        let lock = self.user_lock(user_id).await;
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.record_path(user_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every user id with stored history, sorted.
    pub async fn list_users(&self) -> Result<Vec<String>> {
        let mut users = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    users.push(stem.to_string());
                }
            }
        }
        users.sort();
        Ok(users)
    }
}
