use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::shared::AppError;

/// Display info attached to query responses: entries and room ownership
/// carry user ids internally, the frontend wants names and badges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserModel {
    pub id: String,
    pub username: String,
    /// Opaque badge blob, rendered by the frontend
    pub badge: Option<serde_json::Value>,
    pub gcl: i64,
}

/// Service resolving user ids to display info.
///
/// Only id → user lookup is guaranteed cheap; the username reverse lookup
/// exists for the leaderboard find query.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>, AppError>;

    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<UserModel>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserModel>, AppError>;

    async fn register_user(&self, user: UserModel) -> Result<(), AppError>;
}

/// In-memory implementation of the user directory
/// Uses RwLock for concurrent access with read optimization
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserModel>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Generate a new id for a user
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }

    async fn get_users(&self, user_ids: &[String]) -> Result<Vec<UserModel>, AppError> {
        let users = self.users.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).cloned())
            .collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserModel>, AppError> {
        let users = self.users.read().await;
        let user = users.values().find(|u| u.username == username).cloned();
        match &user {
            Some(u) => debug!(user_id = %u.id, username = %username, "Resolved username"),
            None => debug!(username = %username, "Unknown username"),
        }
        Ok(user)
    }

    async fn register_user(&self, user: UserModel) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        info!(user_id = %user.id, username = %user.username, "Registered user");
        users.insert(user.id.clone(), user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, username: &str) -> UserModel {
        UserModel {
            id: id.to_string(),
            username: username.to_string(),
            badge: None,
            gcl: 1,
        }
    }

    #[tokio::test]
    async fn lookup_by_id_and_username() {
        let directory = InMemoryUserDirectory::new();
        directory.register_user(user("u1", "alice")).await.unwrap();

        let by_id = directory.get_user("u1").await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");

        let by_name = directory.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, "u1");

        assert!(directory.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_users_skips_unknown_ids() {
        let directory = InMemoryUserDirectory::new();
        directory.register_user(user("u1", "alice")).await.unwrap();
        directory.register_user(user("u2", "bob")).await.unwrap();

        let users = directory
            .get_users(&["u1".to_string(), "u3".to_string()])
            .await
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "u1");
    }

    #[tokio::test]
    async fn generated_ids_are_unique() {
        assert_ne!(
            InMemoryUserDirectory::generate_id(),
            InMemoryUserDirectory::generate_id()
        );
    }
}
