// Post repository

use crate::error::{FlockError, Result};
use crate::repository::store::SnapshotStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

const POSTS_FILE: &str = "posts.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub post_id: Uuid,
    pub username: String,
    pub content: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    pub fn new(username: impl Into<String>, content: impl Into<String>, created_at: i64) -> Self {
        Self {
            post_id: Uuid::new_v4(),
            username: username.into(),
            content: content.into(),
            created_at,
            updated_at: created_at,
        }
    }
}

pub struct PostRepository {
    posts: Mutex<HashMap<Uuid, Post>>,
    store: SnapshotStore<HashMap<Uuid, Post>>,
}

impl PostRepository {
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(directory.as_ref())?;
        let store = SnapshotStore::new(directory.as_ref().join(POSTS_FILE));
        let posts = store.load()?;
        Ok(Self {
            posts: Mutex::new(posts),
            store,
        })
    }

    pub fn add(&self, post: Post) -> Result<()> {
        let mut posts = self.posts.lock();
        if posts.contains_key(&post.post_id) {
            return Err(FlockError::AlreadyExists(format!(
                "post {} already exists",
                post.post_id
            )));
        }
        posts.insert(post.post_id, post);
        self.store.save(&posts)
    }

    pub fn update(&self, post: Post) -> Result<()> {
        let mut posts = self.posts.lock();
        if !posts.contains_key(&post.post_id) {
            return Err(FlockError::NotFound(format!("post {} not found", post.post_id)));
        }
        posts.insert(post.post_id, post);
        self.store.save(&posts)
    }

    /// Delete if present. Returns whether a post was removed.
    pub fn remove(&self, post_id: Uuid) -> Result<bool> {
        let mut posts = self.posts.lock();
        let removed = posts.remove(&post_id).is_some();
        if removed {
            self.store.save(&posts)?;
        }
        Ok(removed)
    }

    pub fn get_by_id(&self, post_id: Uuid) -> Option<Post> {
        self.posts.lock().get(&post_id).cloned()
    }

    /// A user's posts, newest first.
    pub fn get_by_username(&self, username: &str) -> Vec<Post> {
        let needle = username.to_lowercase();
        let mut result: Vec<Post> = self
            .posts
            .lock()
            .values()
            .filter(|p| p.username.to_lowercase() == needle)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    /// Recent posts across a set of authors, newest first, capped at limit.
    pub fn get_recent_by_users(&self, usernames: &[String], limit: usize) -> Vec<Post> {
        let needles: Vec<String> = usernames.iter().map(|u| u.to_lowercase()).collect();
        let mut result: Vec<Post> = self
            .posts
            .lock()
            .values()
            .filter(|p| needles.contains(&p.username.to_lowercase()))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result.truncate(limit);
        result
    }

    pub fn len(&self) -> usize {
        self.posts.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (PostRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = PostRepository::open(dir.path()).unwrap();
        (repo, dir)
    }

    #[test]
    fn test_crud_round_trip() {
        let (repo, _dir) = repo();
        let mut post = Post::new("alice", "first", 100);
        let id = post.post_id;
        repo.add(post.clone()).unwrap();

        post.content = "edited".to_string();
        post.updated_at = 200;
        repo.update(post).unwrap();

        let loaded = repo.get_by_id(id).unwrap();
        assert_eq!(loaded.content, "edited");
        assert!(loaded.updated_at >= loaded.created_at);

        assert!(repo.remove(id).unwrap());
        assert!(repo.get_by_id(id).is_none());
        assert!(!repo.remove(id).unwrap());
    }

    #[test]
    fn test_by_username_newest_first() {
        let (repo, _dir) = repo();
        repo.add(Post::new("alice", "one", 100)).unwrap();
        repo.add(Post::new("Alice", "two", 300)).unwrap();
        repo.add(Post::new("bob", "other", 200)).unwrap();

        let posts = repo.get_by_username("ALICE");
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].content, "two");
        assert_eq!(posts[1].content, "one");
    }

    #[test]
    fn test_recent_by_users_limit() {
        let (repo, _dir) = repo();
        for i in 0..5 {
            repo.add(Post::new("alice", format!("a{}", i), 100 + i)).unwrap();
            repo.add(Post::new("bob", format!("b{}", i), 200 + i)).unwrap();
        }
        let feed = repo.get_recent_by_users(&["alice".to_string(), "bob".to_string()], 3);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].content, "b4");
        assert!(feed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}
