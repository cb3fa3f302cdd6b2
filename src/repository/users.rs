// User repository
//
// Keyed by username, compared case-insensitively. The follower and
// following sets hold canonical usernames as given at registration.

use crate::error::{FlockError, Result};
use crate::repository::store::SnapshotStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

const USERS_FILE: &str = "users.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    pub created_at: i64,
    pub followers: BTreeSet<String>,
    pub following: BTreeSet<String>,
}

impl User {
    pub fn new(username: impl Into<String>, password: impl Into<String>, created_at: i64) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            created_at,
            followers: BTreeSet::new(),
            following: BTreeSet::new(),
        }
    }
}

pub struct UserRepository {
    // key: lowercased username
    users: Mutex<HashMap<String, User>>,
    store: SnapshotStore<HashMap<String, User>>,
}

impl UserRepository {
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(directory.as_ref())?;
        let store = SnapshotStore::new(directory.as_ref().join(USERS_FILE));
        let users = store.load()?;
        Ok(Self {
            users: Mutex::new(users),
            store,
        })
    }

    pub fn add(&self, user: User) -> Result<()> {
        let key = user.username.to_lowercase();
        let mut users = self.users.lock();
        if users.contains_key(&key) {
            return Err(FlockError::AlreadyExists(format!(
                "user '{}' already exists",
                user.username
            )));
        }
        users.insert(key, user);
        self.store.save(&users)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, username: &str) -> Option<User> {
        self.users.lock().get(&username.to_lowercase()).cloned()
    }

    pub fn update(&self, user: User) -> Result<()> {
        let key = user.username.to_lowercase();
        let mut users = self.users.lock();
        if !users.contains_key(&key) {
            return Err(FlockError::NotFound(format!(
                "user '{}' not found",
                user.username
            )));
        }
        users.insert(key, user);
        self.store.save(&users)
    }

    /// Update both sides of a follow edge in one persisted step.
    pub fn update_pair(&self, a: User, b: User) -> Result<()> {
        let key_a = a.username.to_lowercase();
        let key_b = b.username.to_lowercase();
        let mut users = self.users.lock();
        if !users.contains_key(&key_a) || !users.contains_key(&key_b) {
            return Err(FlockError::NotFound("user not found".to_string()));
        }
        users.insert(key_a, a);
        users.insert(key_b, b);
        self.store.save(&users)
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (UserRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = UserRepository::open(dir.path()).unwrap();
        (repo, dir)
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let (repo, _dir) = repo();
        repo.add(User::new("Alice", "pw", 1)).unwrap();
        let upper = repo.get("ALICE").unwrap();
        let lower = repo.get("alice").unwrap();
        assert_eq!(upper.username, "Alice");
        assert_eq!(lower.username, "Alice");
    }

    #[test]
    fn test_duplicate_rejected_case_insensitively() {
        let (repo, _dir) = repo();
        repo.add(User::new("Alice", "pw", 1)).unwrap();
        let result = repo.add(User::new("alice", "other", 2));
        assert!(matches!(result, Err(FlockError::AlreadyExists(_))));
    }

    #[test]
    fn test_update_unknown_user() {
        let (repo, _dir) = repo();
        let result = repo.update(User::new("ghost", "pw", 1));
        assert!(matches!(result, Err(FlockError::NotFound(_))));
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = UserRepository::open(dir.path()).unwrap();
            let mut user = User::new("bob", "pw", 7);
            user.following.insert("alice".to_string());
            repo.add(user).unwrap();
        }
        let repo = UserRepository::open(dir.path()).unwrap();
        let bob = repo.get("bob").unwrap();
        assert_eq!(bob.created_at, 7);
        assert!(bob.following.contains("alice"));
    }
}
