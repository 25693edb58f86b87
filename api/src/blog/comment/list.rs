use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    Comment, CommentEvent,
    store::{CommentStore, StorageError},
};

pub const EMPTY_MESSAGE: &str = "No comments yet";

/// A visitor's answer to "delete this comment?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(Comment),
    Declined,
    NotFound,
}

/// The comments shown under one post, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentList {
    post_id: i32,
    comments: Vec<Comment>,
}

impl CommentList {
    pub async fn load(post_id: i32, store: &dyn CommentStore) -> Result<Self, StorageError> {
        let comments = store.read(post_id).await?;
        Ok(Self::from_comments(post_id, comments))
    }

    /// Keeps the comments that belong to `post_id`, newest first.
    pub fn from_comments(post_id: i32, comments: Vec<Comment>) -> Self {
        let mut comments: Vec<_> = comments
            .into_iter()
            .filter(|c| c.post_id == post_id)
            .collect();
        sort_newest_first(&mut comments);
        Self { post_id, comments }
    }

    #[cfg(test)]
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn count(&self) -> usize {
        self.comments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Merges a change announced by another component. Returns whether the
    /// list changed.
    pub fn apply(&mut self, event: &CommentEvent) -> bool {
        if event.post_id() != self.post_id {
            return false;
        }

        match event {
            CommentEvent::Added(comment) => {
                if self.comments.iter().any(|c| c.id == comment.id) {
                    return false;
                }
                self.comments.push(comment.clone());
                sort_newest_first(&mut self.comments);
                true
            }
            CommentEvent::Removed { id, .. } => {
                let before = self.comments.len();
                self.comments.retain(|c| c.id != *id);
                self.comments.len() != before
            }
        }
    }

    /// Deletes a comment of this post from `store`, but only once the visitor
    /// confirmed it.
    pub async fn remove(
        &mut self,
        id: i64,
        confirmation: Confirmation,
        store: &dyn CommentStore,
    ) -> Result<RemoveOutcome, StorageError> {
        if confirmation == Confirmation::Declined {
            return Ok(RemoveOutcome::Declined);
        }

        if !self.comments.iter().any(|c| c.id == id) {
            return Ok(RemoveOutcome::NotFound);
        }

        match store.remove(id).await? {
            Some(removed) => {
                self.apply(&CommentEvent::Removed {
                    post_id: self.post_id,
                    id,
                });
                tracing::info!(post_id = self.post_id, comment_id = id, "Comment deleted");
                Ok(RemoveOutcome::Removed(removed))
            }
            None => {
                // gone from storage already, e.g. deleted from another view
                self.comments.retain(|c| c.id != id);
                Ok(RemoveOutcome::NotFound)
            }
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> CommentListView {
        CommentListView {
            count: self.count(),
            items: self
                .comments
                .iter()
                .map(|c| CommentView::new(c, now))
                .collect(),
            empty_message: self.is_empty().then_some(EMPTY_MESSAGE),
        }
    }
}

/// Newest first; equal timestamps fall back to the larger id first.
pub fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub initial: String,
    pub display_date: String,
    pub display_time: String,
    pub time_ago: String,
}

impl CommentView {
    fn new(comment: &Comment, now: DateTime<Utc>) -> Self {
        CommentView {
            initial: comment
                .name
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect())
                .unwrap_or_default(),
            display_date: comment.created_at.format("%B %-d, %Y").to_string(),
            display_time: comment.created_at.format("%I:%M %p").to_string(),
            time_ago: time_ago(now, comment.created_at),
            comment: comment.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentListView {
    pub count: usize,
    pub items: Vec<CommentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<&'static str>,
}

pub fn time_ago(now: DateTime<Utc>, then: DateTime<Utc>) -> String {
    let hours = now.signed_duration_since(then).num_hours();
    let days = hours / 24;

    if days > 0 {
        format!("{days} day{} ago", if days > 1 { "s" } else { "" })
    } else if hours > 0 {
        format!("{hours} hour{} ago", if hours > 1 { "s" } else { "" })
    } else {
        "Just now".to_string()
    }
}
