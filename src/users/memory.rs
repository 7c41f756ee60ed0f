use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    model::{NewUser, ProfileUpdate, User},
    repo::UserStore,
};
use crate::error::AppError;

/// In-process store with the same uniqueness rule as the `users` table.
/// Backs `AppState::fake` and the router tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
    disconnected: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::Relaxed);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(AppError::duplicate("email", user.email));
        }
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            full_name: user.full_name,
            email: user.email,
            password_hash: user.password.as_str().to_string(),
            role: user.role,
            company_name: user.company_name,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>, AppError> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(full_name) = update.full_name {
            user.full_name = full_name;
        }
        if let Some(company_name) = update.company_name {
            user.company_name = Some(company_name);
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.read().await.clone())
    }

    async fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::password::HashedPassword,
        error::ErrorKind,
        users::model::Role,
    };

    fn new_user(email: &str) -> NewUser {
        NewUser {
            full_name: "Jane Doe".into(),
            email: email.into(),
            password: HashedPassword::hash("password123").unwrap(),
            role: Role::User,
            company_name: None,
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let store = MemoryUserStore::new();
        let created = store.create(new_user("jane@example.com")).await.unwrap();
        let by_email = store.find_by_email("jane@example.com").await.unwrap().unwrap();
        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_id.email, "jane@example.com");
        assert_ne!(by_id.password_hash, "password123");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        store.create(new_user("jane@example.com")).await.unwrap();
        let err = store.create(new_user("jane@example.com")).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Duplicate { field, .. } if field == "email"));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_profile_touches_only_given_fields() {
        let store = MemoryUserStore::new();
        let created = store.create(new_user("jane@example.com")).await.unwrap();
        let updated = store
            .update_profile(
                created.id,
                ProfileUpdate {
                    full_name: None,
                    company_name: Some("Acme".into()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name, "Jane Doe");
        assert_eq!(updated.company_name.as_deref(), Some("Acme"));
        assert_eq!(updated.password_hash, created.password_hash);
        assert!(store
            .update_profile(Uuid::new_v4(), ProfileUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn connection_state_is_reported() {
        let store = MemoryUserStore::new();
        assert!(store.is_connected().await);
        store.set_connected(false);
        assert!(!store.is_connected().await);
    }
}
