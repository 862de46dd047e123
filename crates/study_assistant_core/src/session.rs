//! crates/study_assistant_core/src/session.rs
//!
//! The currently authenticated user of one browser instance, held in memory and
//! mirrored to the store so a reload can pick it up again.

use tracing::{debug, warn};

use crate::domain::PublicUser;
use crate::error::{CoreError, CoreResult};
use crate::store::{keys, JsonStore};

pub struct SessionState {
    store: JsonStore,
    key: String,
    current: Option<PublicUser>,
}

impl SessionState {
    pub fn new(store: JsonStore, instance: &str) -> Self {
        Self {
            store,
            key: keys::session(instance),
            current: None,
        }
    }

    /// Reloads the mirrored session, if any. A corrupt mirror is discarded.
    pub async fn restore(&mut self) -> CoreResult<Option<PublicUser>> {
        self.current = match self.store.load::<PublicUser>(&self.key).await {
            Ok(user) => user,
            Err(e) => {
                warn!("Discarding unreadable session mirror: {}", e);
                self.store.delete(&self.key).await?;
                None
            }
        };
        Ok(self.current.clone())
    }

    /// Replaces whatever session was active.
    pub async fn establish(&mut self, user: PublicUser) -> CoreResult<()> {
        self.store.save(&self.key, &user).await?;
        debug!(user_id = %user.id, "Session established.");
        self.current = Some(user);
        Ok(())
    }

    pub fn current(&self) -> Option<&PublicUser> {
        self.current.as_ref()
    }

    pub fn require(&self) -> CoreResult<&PublicUser> {
        self.current.as_ref().ok_or(CoreError::NotAuthenticated)
    }

    pub async fn clear(&mut self) -> CoreResult<()> {
        self.store.delete(&self.key).await?;
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn user() -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            name: "Karim".to_string(),
            email: "karim@example.com".to_string(),
            role: Role::User,
            joined_at: Utc::now(),
            usage_count: 0,
        }
    }

    #[tokio::test]
    async fn session_survives_reload() {
        let store = JsonStore::new(Arc::new(MemoryStore::new()));
        let u = user();

        let mut first = SessionState::new(store.clone(), "tab-1");
        first.establish(u.clone()).await.unwrap();

        let mut reloaded = SessionState::new(store.clone(), "tab-1");
        assert_eq!(reloaded.restore().await.unwrap(), Some(u));

        let mut other_tab = SessionState::new(store, "tab-2");
        assert_eq!(other_tab.restore().await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_removes_mirror() {
        let store = JsonStore::new(Arc::new(MemoryStore::new()));
        let mut session = SessionState::new(store.clone(), "tab");
        session.establish(user()).await.unwrap();
        session.clear().await.unwrap();
        assert!(matches!(session.require(), Err(CoreError::NotAuthenticated)));

        let mut reloaded = SessionState::new(store, "tab");
        assert!(reloaded.restore().await.unwrap().is_none());
    }
}
