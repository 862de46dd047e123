//! crates/study_assistant_core/src/registry.rs
//!
//! The user registry: a flat list of user records persisted as one value.
//! Every mutation reads the whole list and writes the whole list back.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{PublicUser, Role, User};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ports::PortError;
use crate::store::{keys, JsonStore};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@studyassistant.local";
/// Used when the deployment does not configure one. Change it after first login.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Clone)]
pub struct UserRegistry {
    store: JsonStore,
    // Serializes read-modify-write cycles within this process.
    write_lock: Arc<Mutex<()>>,
}

impl UserRegistry {
    pub fn new(store: JsonStore) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_all(&self) -> CoreResult<Vec<User>> {
        Ok(self.store.load(keys::USERS).await?.unwrap_or_default())
    }

    async fn save_all(&self, users: &[User]) -> CoreResult<()> {
        self.store.save(keys::USERS, users).await?;
        Ok(())
    }

    /// Seeds the administrator account when no record carries `admin_email`.
    pub async fn bootstrap(&self, admin_email: &str, admin_password: &str) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_all().await?;
        if users.iter().any(|u| u.email == admin_email) {
            debug!("Administrator account already present.");
            return Ok(());
        }
        users.push(User {
            id: Uuid::new_v4(),
            name: "Administrator".to_string(),
            email: admin_email.to_string(),
            password_hash: hash_password(admin_password)?,
            role: Role::Admin,
            joined_at: Utc::now(),
            usage_count: 0,
        });
        self.save_all(&users).await?;
        info!(email = admin_email, "Seeded administrator account.");
        Ok(())
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> CoreResult<PublicUser> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name").into());
        }
        if email.trim().is_empty() {
            return Err(ValidationError::MissingField("email").into());
        }
        if password.is_empty() {
            return Err(ValidationError::MissingField("password").into());
        }

        let _guard = self.write_lock.lock().await;
        let mut users = self.load_all().await?;
        // Emails compare case-sensitively.
        if users.iter().any(|u| u.email == email) {
            return Err(CoreError::DuplicateEmail);
        }

        let user = User {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            role: Role::User,
            joined_at: Utc::now(),
            usage_count: 0,
        };
        let public = PublicUser::from(&user);
        users.push(user);
        self.save_all(&users).await?;
        info!(user_id = %public.id, "Registered new user.");
        Ok(public)
    }

    pub async fn login(&self, email: &str, password: &str) -> CoreResult<PublicUser> {
        let users = self.load_all().await?;
        let user = users
            .iter()
            .find(|u| u.email == email)
            .ok_or(CoreError::InvalidCredentials)?;
        if !verify_password(password, &user.password_hash) {
            return Err(CoreError::InvalidCredentials);
        }
        Ok(PublicUser::from(user))
    }

    /// Bumps the usage counter once. Unknown ids (e.g. guests) are ignored.
    pub async fn increment_usage(&self, user_id: Uuid) -> CoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.load_all().await?;
        let Some(user) = users.iter_mut().find(|u| u.id == user_id) else {
            debug!(%user_id, "Usage increment for unknown user skipped.");
            return Ok(());
        };
        user.usage_count += 1;
        self.save_all(&users).await
    }

    pub async fn find(&self, user_id: Uuid) -> CoreResult<PublicUser> {
        self.load_all()
            .await?
            .iter()
            .find(|u| u.id == user_id)
            .map(PublicUser::from)
            .ok_or_else(|| CoreError::NotFound(format!("user {}", user_id)))
    }

    /// Every registered user, for the admin view.
    pub async fn list_users(&self) -> CoreResult<Vec<PublicUser>> {
        Ok(self.load_all().await?.iter().map(PublicUser::from).collect())
    }
}

fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CoreError::Store(PortError::Unexpected(e.to_string())))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> UserRegistry {
        UserRegistry::new(JsonStore::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn register_then_login() {
        let reg = registry();
        let user = reg.register("Rahim", "rahim@example.com", "secret").await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(user.usage_count, 0);

        let logged_in = reg.login("rahim@example.com", "secret").await.unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_leaves_registry_unchanged() {
        let reg = registry();
        reg.register("A", "a@example.com", "pw").await.unwrap();
        reg.register("B", "b@example.com", "pw").await.unwrap();

        for name in ["C", "D", "E"] {
            let err = reg.register(name, "a@example.com", "other").await.unwrap_err();
            assert!(matches!(err, CoreError::DuplicateEmail));
        }
        assert_eq!(reg.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn emails_are_case_sensitive() {
        let reg = registry();
        reg.register("A", "a@example.com", "pw").await.unwrap();
        assert!(reg.register("A2", "A@example.com", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let reg = registry();
        reg.register("A", "a@example.com", "pw").await.unwrap();
        let err = reg.login("a@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
        let err = reg.login("missing@example.com", "pw").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidCredentials));
    }

    #[tokio::test]
    async fn bootstrap_seeds_admin_once() {
        let reg = registry();
        reg.bootstrap(DEFAULT_ADMIN_EMAIL, "admin123").await.unwrap();
        reg.bootstrap(DEFAULT_ADMIN_EMAIL, "admin123").await.unwrap();

        let users = reg.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin());
        assert!(reg.login(DEFAULT_ADMIN_EMAIL, "admin123").await.is_ok());
    }

    #[tokio::test]
    async fn usage_counter_increments() {
        let reg = registry();
        let user = reg.register("A", "a@example.com", "pw").await.unwrap();
        reg.increment_usage(user.id).await.unwrap();
        reg.increment_usage(user.id).await.unwrap();
        reg.increment_usage(Uuid::new_v4()).await.unwrap();
        assert_eq!(reg.find(user.id).await.unwrap().usage_count, 2);
    }
}
