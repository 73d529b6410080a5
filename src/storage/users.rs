//! User repository for JSON storage
//!
//! Manages loading and saving application users to users.json

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::StockpileError;
use crate::models::{User, UserId};

use super::file_io::{read_json, write_json_atomic};

/// Serializable user data structure
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct UserData {
    users: Vec<User>,
}

/// Repository for user persistence
pub struct UserRepository {
    path: PathBuf,
    data: RwLock<HashMap<UserId, User>>,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Load users from disk
    pub fn load(&self) -> Result<(), StockpileError> {
        let file_data: UserData = read_json(&self.path)?;

        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.clear();
        for user in file_data.users {
            data.insert(user.id, user);
        }

        Ok(())
    }

    /// Save users to disk
    pub fn save(&self) -> Result<(), StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let file_data = UserData {
            users: data.values().cloned().collect(),
        };

        write_json_atomic(&self.path, &file_data)
    }

    /// Get a user by ID
    pub fn get(&self, id: UserId) -> Result<Option<User>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.get(&id).cloned())
    }

    /// Get all users, sorted by username
    pub fn get_all(&self) -> Result<Vec<User>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let mut users: Vec<_> = data.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    /// Get a user by username (case-insensitive)
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        let username_lower = username.to_lowercase();
        Ok(data
            .values()
            .find(|u| u.username.to_lowercase() == username_lower)
            .cloned())
    }

    /// Insert or update a user
    pub fn upsert(&self, user: User) -> Result<(), StockpileError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.insert(user.id, user);
        Ok(())
    }

    /// Replace all users with the provided set
    ///
    /// Used by full restores; the caller owns the transaction boundary.
    pub fn replace_all(&self, users: Vec<User>) -> Result<(), StockpileError> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire write lock: {}", e)))?;

        data.clear();
        for user in users {
            data.insert(user.id, user);
        }
        Ok(())
    }

    /// Count users
    pub fn count(&self) -> Result<usize, StockpileError> {
        let data = self
            .data
            .read()
            .map_err(|e| StockpileError::Storage(format!("Failed to acquire read lock: {}", e)))?;

        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use tempfile::TempDir;

    fn create_test_repo() -> (TempDir, UserRepository) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("users.json");
        let repo = UserRepository::new(path);
        (temp_dir, repo)
    }

    #[test]
    fn test_upsert_and_get_by_username() {
        let (_temp_dir, repo) = create_test_repo();
        repo.load().unwrap();

        let user = User::new("kaylee", UserRole::Admin);
        repo.upsert(user).unwrap();

        let found = repo.get_by_username("KAYLEE").unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().role, UserRole::Admin);
    }

    #[test]
    fn test_save_and_reload() {
        let (temp_dir, repo) = create_test_repo();
        repo.load().unwrap();

        let user = User::new("op", UserRole::Operator);
        let id = user.id;
        repo.upsert(user).unwrap();
        repo.save().unwrap();

        let repo2 = UserRepository::new(temp_dir.path().join("users.json"));
        repo2.load().unwrap();
        assert_eq!(repo2.get(id).unwrap().unwrap().username, "op");
    }

    #[test]
    fn test_replace_all() {
        let (_temp_dir, repo) = create_test_repo();
        repo.load().unwrap();

        repo.upsert(User::new("old", UserRole::Viewer)).unwrap();
        repo.replace_all(vec![User::new("new", UserRole::Viewer)])
            .unwrap();

        let all = repo.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].username, "new");
    }
}
