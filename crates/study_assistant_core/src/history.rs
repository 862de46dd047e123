//! crates/study_assistant_core/src/history.rs
//!
//! The result & history store for the active user: the current result, and every
//! past result newest first. The whole sequence is rewritten after each mutation.

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ChatMessage, GenerationResult, Mode, Subject};
use crate::error::{CoreError, CoreResult};
use crate::store::{keys, JsonStore};

/// What a brand-new chat conversation is created with.
#[derive(Debug, Clone, Copy)]
pub struct ChatSeed {
    pub user_id: Uuid,
    pub subject: Subject,
    pub image_count: usize,
}

pub struct HistoryStore {
    store: JsonStore,
    user_id: Option<Uuid>,
    entries: Vec<GenerationResult>,
    current: Option<GenerationResult>,
}

impl HistoryStore {
    pub fn new(store: JsonStore) -> Self {
        Self {
            store,
            user_id: None,
            entries: Vec::new(),
            current: None,
        }
    }

    /// Reads the user's whole history. An unreadable record starts an empty one.
    pub async fn load(&mut self, user_id: Uuid) -> CoreResult<()> {
        self.entries = match self.store.load(&keys::history(user_id)).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!(%user_id, "History could not be read, starting empty: {}", e);
                Vec::new()
            }
        };
        self.user_id = Some(user_id);
        self.current = None;
        debug!(%user_id, entries = self.entries.len(), "History loaded.");
        Ok(())
    }

    /// Drops all in-memory state (logout).
    pub fn unload(&mut self) {
        self.user_id = None;
        self.entries.clear();
        self.current = None;
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn entries(&self) -> &[GenerationResult] {
        &self.entries
    }

    pub fn current(&self) -> Option<&GenerationResult> {
        self.current.as_ref()
    }

    /// The active chat transcript, empty unless a CHAT result is current.
    pub fn transcript(&self) -> &[ChatMessage] {
        self.current
            .as_ref()
            .and_then(|r| r.transcript.as_deref())
            .unwrap_or(&[])
    }

    pub fn find(&self, id: Uuid) -> Option<&GenerationResult> {
        self.entries.iter().find(|r| r.id == id)
    }

    async fn persist(&self) -> CoreResult<()> {
        let user_id = self.user_id.ok_or(CoreError::NotAuthenticated)?;
        self.store.save(&keys::history(user_id), &self.entries).await?;
        Ok(())
    }

    /// Prepends and makes it the current result.
    pub async fn record_result(&mut self, result: GenerationResult) -> CoreResult<()> {
        self.entries.insert(0, result.clone());
        self.current = Some(result);
        self.persist().await
    }

    /// Prepends without touching the current result.
    pub async fn archive(&mut self, result: GenerationResult) -> CoreResult<()> {
        self.entries.insert(0, result);
        self.persist().await
    }

    /// Records a refinement of `old_id` as a new record that supersedes it.
    pub async fn supersede(
        &mut self,
        old_id: Uuid,
        mut result: GenerationResult,
        make_current: bool,
    ) -> CoreResult<GenerationResult> {
        if self.find(old_id).is_none() {
            return Err(CoreError::NotFound(format!("result {}", old_id)));
        }
        result.supersedes = Some(old_id);
        if make_current {
            self.record_result(result.clone()).await?;
        } else {
            self.archive(result.clone()).await?;
        }
        Ok(result)
    }

    /// Appends one complete turn. Continues the current CHAT result in place when there
    /// is one; otherwise starts a new CHAT result seeded with both messages, which
    /// becomes current only when `make_current` is set.
    pub async fn append_chat_turn(
        &mut self,
        user_msg: ChatMessage,
        ai_msg: ChatMessage,
        seed: ChatSeed,
        make_current: bool,
    ) -> CoreResult<GenerationResult> {
        if let Some(current) = self.current.as_mut().filter(|r| r.mode == Mode::Chat) {
            current.content = ai_msg.text.clone();
            current.created_at = Utc::now();
            current.image_count += seed.image_count;
            current
                .transcript
                .get_or_insert_with(Vec::new)
                .extend([user_msg, ai_msg]);
            let updated = current.clone();
            let position = self.entries.iter().position(|r| r.id == updated.id);
            match position {
                Some(i) => self.entries[i] = updated.clone(),
                None => self.entries.insert(0, updated.clone()),
            }
            self.persist().await?;
            return Ok(updated);
        }

        let mut result = GenerationResult::new(
            seed.user_id,
            Mode::Chat,
            seed.subject,
            ai_msg.text.clone(),
            seed.image_count,
        );
        if !user_msg.text.trim().is_empty() {
            result.query = Some(user_msg.text.clone());
        }
        result.transcript = Some(vec![user_msg, ai_msg]);
        if make_current {
            self.record_result(result.clone()).await?;
        } else {
            self.archive(result.clone()).await?;
        }
        Ok(result)
    }

    /// Resets the current view; history is untouched.
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn select_from_history(&mut self, id: Uuid) -> CoreResult<&GenerationResult> {
        let selected = self
            .find(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("result {}", id)))?;
        Ok(self.current.insert(selected))
    }

    /// Deletes the user's entire history.
    pub async fn clear_all(&mut self) -> CoreResult<()> {
        let user_id = self.user_id.ok_or(CoreError::NotAuthenticated)?;
        self.entries.clear();
        self.current = None;
        self.store.delete(&keys::history(user_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn store() -> JsonStore {
        JsonStore::new(Arc::new(MemoryStore::new()))
    }

    fn result(user_id: Uuid, i: usize) -> GenerationResult {
        let mut r = GenerationResult::new(
            user_id,
            if i % 2 == 0 { Mode::Generate } else { Mode::Search },
            Subject::Science,
            format!("content {}", i),
            i % 4,
        );
        if i % 2 == 1 {
            r.query = Some(format!("question {}", i));
        }
        r
    }

    fn seed(user_id: Uuid) -> ChatSeed {
        ChatSeed {
            user_id,
            subject: Subject::Math,
            image_count: 0,
        }
    }

    #[tokio::test]
    async fn persisted_history_reloads_identically() {
        for size in [1usize, 2, 50] {
            let store = store();
            let user_id = Uuid::new_v4();
            let mut history = HistoryStore::new(store.clone());
            history.load(user_id).await.unwrap();
            for i in 0..size {
                history.record_result(result(user_id, i)).await.unwrap();
            }
            let mut reloaded = HistoryStore::new(store);
            reloaded.load(user_id).await.unwrap();
            assert_eq!(reloaded.entries(), history.entries(), "size {}", size);
            assert_eq!(reloaded.entries().len(), size);
        }
    }

    #[tokio::test]
    async fn newest_result_comes_first() {
        let user_id = Uuid::new_v4();
        let mut history = HistoryStore::new(store());
        history.load(user_id).await.unwrap();
        let a = result(user_id, 0);
        let b = result(user_id, 1);
        history.record_result(a.clone()).await.unwrap();
        history.record_result(b.clone()).await.unwrap();
        assert_eq!(history.entries()[0].id, b.id);
        assert_eq!(history.current().unwrap().id, b.id);

        history.archive(result(user_id, 2)).await.unwrap();
        assert_eq!(history.entries().len(), 3);
        assert_eq!(history.current().unwrap().id, b.id);
    }

    #[tokio::test]
    async fn chat_turns_extend_the_same_result() {
        let user_id = Uuid::new_v4();
        let mut history = HistoryStore::new(store());
        history.load(user_id).await.unwrap();

        let first = history
            .append_chat_turn(ChatMessage::user("২+২=?"), ChatMessage::ai("উত্তরঃ ৪"), seed(user_id), true)
            .await
            .unwrap();
        assert_eq!(first.transcript.as_ref().unwrap().len(), 2);

        let second = history
            .append_chat_turn(ChatMessage::user("৩+৩=?"), ChatMessage::ai("উত্তরঃ ৬"), seed(user_id), true)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(history.transcript().len(), 4);
        assert_eq!(history.entries().len(), 1);
        assert_eq!(history.entries()[0].transcript.as_ref().unwrap().len(), 4);
        assert!(second.created_at >= first.created_at);
    }

    #[tokio::test]
    async fn chat_after_generate_starts_new_conversation() {
        let user_id = Uuid::new_v4();
        let mut history = HistoryStore::new(store());
        history.load(user_id).await.unwrap();
        history.record_result(result(user_id, 0)).await.unwrap();

        let chat = history
            .append_chat_turn(ChatMessage::user("hi"), ChatMessage::ai("hello"), seed(user_id), true)
            .await
            .unwrap();
        assert_eq!(chat.mode, Mode::Chat);
        assert_eq!(chat.query.as_deref(), Some("hi"));
        assert_eq!(history.entries().len(), 2);
        assert_eq!(history.current().unwrap().id, chat.id);
    }

    #[tokio::test]
    async fn selecting_chat_restores_transcript() {
        let user_id = Uuid::new_v4();
        let mut history = HistoryStore::new(store());
        history.load(user_id).await.unwrap();
        let chat = history
            .append_chat_turn(ChatMessage::user("q"), ChatMessage::ai("a"), seed(user_id), true)
            .await
            .unwrap();
        history.clear();
        assert!(history.transcript().is_empty());

        history.select_from_history(chat.id).unwrap();
        assert_eq!(history.transcript().len(), 2);
        assert!(matches!(
            history.select_from_history(Uuid::new_v4()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn supersede_links_to_previous() {
        let user_id = Uuid::new_v4();
        let mut history = HistoryStore::new(store());
        history.load(user_id).await.unwrap();
        let original = result(user_id, 0);
        history.record_result(original.clone()).await.unwrap();

        let refined = history
            .supersede(original.id, result(user_id, 2), true)
            .await
            .unwrap();
        assert_eq!(refined.supersedes, Some(original.id));
        assert_eq!(history.find(original.id).unwrap().content, original.content);
        assert_eq!(history.current().unwrap().id, refined.id);
    }

    #[tokio::test]
    async fn clear_all_empties_storage() {
        let store = store();
        let user_id = Uuid::new_v4();
        let mut history = HistoryStore::new(store.clone());
        history.load(user_id).await.unwrap();
        history.record_result(result(user_id, 0)).await.unwrap();
        history.clear_all().await.unwrap();

        let mut reloaded = HistoryStore::new(store);
        reloaded.load(user_id).await.unwrap();
        assert!(reloaded.entries().is_empty());
    }

    #[tokio::test]
    async fn mutations_require_a_loaded_user() {
        let mut history = HistoryStore::new(store());
        let err = history.record_result(result(Uuid::new_v4(), 0)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotAuthenticated));
    }
}
