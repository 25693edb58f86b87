use std::time::Duration;

use chrono::Utc;

use super::{
    Comment,
    id::IdGenerator,
    store::{CommentStore, StorageError},
    validate::{COMMENT_MAX_CHARS, FieldErrors, validate},
};

pub const SUCCESS_MESSAGE: &str = "Comment added successfully!";
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save comment";

/// Counter shown under the comment box turns red past this many characters.
const NEAR_LIMIT_CHARS: usize = 450;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("comment rejected by validation")]
    Invalid(FieldErrors),

    #[error("Failed to save comment")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharCounter {
    pub count: usize,
    pub max: usize,
    pub near_limit: bool,
}

type OnAdded = Box<dyn Fn(&Comment) + Send + Sync>;

/// The comment form mounted under a post. It keeps what the visitor typed,
/// and on a successful submit persists the comment, hands it to `on_added`
/// and clears itself.
pub struct CommentForm {
    post_id: i32,
    pub name: String,
    pub comment: String,
    errors: FieldErrors,
    success: Option<&'static str>,
    on_added: OnAdded,
}

impl CommentForm {
    pub fn new(post_id: i32, on_added: impl Fn(&Comment) + Send + Sync + 'static) -> Self {
        Self {
            post_id,
            name: String::new(),
            comment: String::new(),
            errors: FieldErrors::default(),
            success: None,
            on_added: Box::new(on_added),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, comment: impl Into<String>) -> Self {
        self.name = name.into();
        self.comment = comment.into();
        self
    }

    pub fn post_id(&self) -> i32 {
        self.post_id
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn success(&self) -> Option<&'static str> {
        self.success
    }

    /// Refuses the submission without looking at it, keeping what was typed.
    pub fn reject(&mut self, message: impl Into<String>) {
        self.success = None;
        self.errors = FieldErrors {
            general: Some(message.into()),
            ..Default::default()
        };
    }

    pub fn char_counter(&self) -> CharCounter {
        let count = self.comment.chars().count();
        CharCounter {
            count,
            max: COMMENT_MAX_CHARS,
            near_limit: count > NEAR_LIMIT_CHARS,
        }
    }

    /// Validates the input and, if it passes, appends the comment to `store`.
    ///
    /// `delay` is waited out between validation and the write, like a slow
    /// network round trip would be.
    pub async fn submit(
        &mut self,
        store: &dyn CommentStore,
        ids: &IdGenerator,
        delay: Duration,
    ) -> Result<Comment, SubmitError> {
        self.errors = FieldErrors::default();
        self.success = None;

        let valid = match validate(&self.name, &self.comment) {
            Ok(valid) => valid,
            Err(errors) => {
                tracing::debug!(post_id = self.post_id, ?errors, "Comment failed validation");
                self.errors = errors.clone();
                return Err(SubmitError::Invalid(errors));
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let now = Utc::now();
        let comment = Comment {
            id: ids.next_id(now),
            name: valid.name,
            comment: valid.comment,
            post_id: self.post_id,
            date: now.date_naive(),
            created_at: now,
        };

        if let Err(e) = store.append(comment.clone()).await {
            tracing::error!(post_id = self.post_id, error = %e, "Failed to save comment");
            self.errors.general = Some(SAVE_FAILED_MESSAGE.into());
            return Err(e.into());
        }

        (self.on_added)(&comment);

        self.name.clear();
        self.comment.clear();
        self.success = Some(SUCCESS_MESSAGE);

        Ok(comment)
    }
}
