use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::Comment;

/// Key of the comment collection inside the persisted blob.
pub const COLLECTION_KEY: &str = "blogComments";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("could not access comment store at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("comment store holds malformed data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("comment store is full ({limit} comments)")]
    QuotaExceeded { limit: usize },
}

/// Persisted collection of every comment on every post.
///
/// Mutations read the whole collection, change it and write it back. The
/// collection is unordered; callers sort for display.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn read_all(&self) -> Result<Vec<Comment>, StorageError>;

    async fn read(&self, post_id: i32) -> Result<Vec<Comment>, StorageError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|c| c.post_id == post_id)
            .collect())
    }

    async fn append(&self, comment: Comment) -> Result<(), StorageError>;

    /// Returns the removed record, or `None` when no comment has this id.
    async fn remove(&self, id: i64) -> Result<Option<Comment>, StorageError>;

    /// Writes `samples` only if the collection has never been created.
    /// Returns whether anything was written.
    async fn seed(&self, samples: Vec<Comment>) -> Result<bool, StorageError>;
}

/// Comments held in a single JSON object on disk, the collection living under
/// [`COLLECTION_KEY`]. Other keys in the file are preserved.
pub struct JsonFileStore {
    path: PathBuf,
    // serialises read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn load_blob(&self) -> Result<Map<String, Value>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn load_collection(&self) -> Result<Option<Vec<Comment>>, StorageError> {
        let mut blob = self.load_blob().await?;
        Ok(blob
            .remove(COLLECTION_KEY)
            .map(serde_json::from_value)
            .transpose()?)
    }

    async fn save_collection(&self, comments: &[Comment]) -> Result<(), StorageError> {
        let mut blob = self.load_blob().await?;
        blob.insert(COLLECTION_KEY.to_string(), serde_json::to_value(comments)?);
        let bytes = serde_json::to_vec_pretty(&blob)?;

        // write next to the target and swap so readers never see half a file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), count = comments.len(), "Saved comments");
        Ok(())
    }
}

#[async_trait]
impl CommentStore for JsonFileStore {
    async fn read_all(&self) -> Result<Vec<Comment>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load_collection().await?.unwrap_or_default())
    }

    #[tracing::instrument(skip_all, fields(comment_id = comment.id, post_id = comment.post_id))]
    async fn append(&self, comment: Comment) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut comments = self.load_collection().await?.unwrap_or_default();
        comments.push(comment);
        self.save_collection(&comments).await
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, id: i64) -> Result<Option<Comment>, StorageError> {
        let _guard = self.lock.lock().await;
        let mut comments = self.load_collection().await?.unwrap_or_default();
        let Some(index) = comments.iter().position(|c| c.id == id) else {
            return Ok(None);
        };
        let removed = comments.remove(index);
        self.save_collection(&comments).await?;
        Ok(Some(removed))
    }

    async fn seed(&self, samples: Vec<Comment>) -> Result<bool, StorageError> {
        let _guard = self.lock.lock().await;
        if self.load_collection().await?.is_some() {
            return Ok(false);
        }
        self.save_collection(&samples).await?;
        Ok(true)
    }
}

/// Process-local store, optionally capped to emulate a storage quota.
#[derive(Default)]
pub struct MemoryStore {
    comments: Mutex<Option<Vec<Comment>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(limit: usize) -> Self {
        Self {
            comments: Mutex::new(None),
            quota: Some(limit),
        }
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn read_all(&self) -> Result<Vec<Comment>, StorageError> {
        Ok(self.comments.lock().await.clone().unwrap_or_default())
    }

    async fn append(&self, comment: Comment) -> Result<(), StorageError> {
        let mut guard = self.comments.lock().await;
        let comments = guard.get_or_insert_with(Vec::new);
        if let Some(limit) = self.quota
            && comments.len() >= limit
        {
            return Err(StorageError::QuotaExceeded { limit });
        }
        comments.push(comment);
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<Option<Comment>, StorageError> {
        let mut guard = self.comments.lock().await;
        let Some(comments) = guard.as_mut() else {
            return Ok(None);
        };
        Ok(comments
            .iter()
            .position(|c| c.id == id)
            .map(|index| comments.remove(index)))
    }

    async fn seed(&self, samples: Vec<Comment>) -> Result<bool, StorageError> {
        let mut guard = self.comments.lock().await;
        if guard.is_some() {
            return Ok(false);
        }
        *guard = Some(samples);
        Ok(true)
    }
}

const SAMPLE_COMMENTS: [(i64, &str, &str, i32, &str); 5] = [
    (
        1,
        "Sarah Wildlife",
        "Fascinating article! I had no idea dire wolves were so different from modern wolves. The bone-crushing adaptation is incredible.",
        1,
        "2024-01-15T10:30:00Z",
    ),
    (
        2,
        "Mike Canine Lover",
        "This really helps explain why my German Shepherd still has some wolf-like behaviors. Evolution is amazing!",
        2,
        "2024-01-16T14:20:00Z",
    ),
    (
        3,
        "Dr. Emma Zoologist",
        "Great explanation of pack dynamics. I've observed similar behaviors in my field research with wild wolf populations.",
        3,
        "2024-01-17T09:45:00Z",
    ),
    (
        4,
        "Alex Nature Photographer",
        "The images really complement the content well. I've been photographing wolves for years and this captures their essence perfectly.",
        1,
        "2024-01-18T16:15:00Z",
    ),
    (
        5,
        "Luna Dog Trainer",
        "As a professional dog trainer, I can confirm that understanding wolf behavior has greatly improved my training methods.",
        2,
        "2024-01-19T11:30:00Z",
    ),
];

/// Comments written into a brand new store so the first visitors do not land
/// on empty threads.
pub fn sample_comments() -> Vec<Comment> {
    SAMPLE_COMMENTS
        .iter()
        .filter_map(|&(id, name, comment, post_id, created_at)| {
            let created_at = created_at.parse::<DateTime<Utc>>().ok()?;
            Some(Comment {
                id,
                name: name.to_string(),
                comment: comment.to_string(),
                post_id,
                date: created_at.date_naive(),
                created_at,
            })
        })
        .collect()
}
