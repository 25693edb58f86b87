pub mod create;
pub mod delete;
pub mod form;
pub mod get;
pub mod id;
pub mod list;
pub mod store;
pub mod stream;
pub mod validate;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use self::validate::{ValidationError, parse_post_id};

// The record kept in the comment store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub name: String,
    pub comment: String,
    pub post_id: i32,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CommentEvent {
    Added(Comment),
    Removed {
        #[serde(rename = "postId")]
        post_id: i32,
        id: i64,
    },
}

impl CommentEvent {
    pub fn post_id(&self) -> i32 {
        match self {
            CommentEvent::Added(comment) => comment.post_id,
            CommentEvent::Removed { post_id, .. } => *post_id,
        }
    }
}

/// Fan-out of comment changes to every open view of a post. Views that
/// subscribe after an event was published do not see it.
#[derive(Clone, Debug)]
pub struct CommentEvents {
    sender: broadcast::Sender<CommentEvent>,
}

impl CommentEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: CommentEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommentEvent> {
        self.sender.subscribe()
    }
}

impl Default for CommentEvents {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostIdQuery {
    post_id: Option<String>,
}

impl PostIdQuery {
    pub fn require(&self) -> Result<i32, ValidationError> {
        match self.post_id.as_deref() {
            None | Some("") => Err(ValidationError::MissingPostId),
            Some(raw) => parse_post_id(raw),
        }
    }
}
