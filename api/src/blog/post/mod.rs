pub mod feed;
pub mod get;
pub mod mock;
pub mod remote;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::{error::ApiRequestError, utils::excerpt};

/// Post cards show at most this many characters of the body.
pub const EXCERPT_CHARS: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub user_id: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: String,
}

impl Post {
    pub fn excerpt(&self) -> String {
        excerpt(&self.body, EXCERPT_CHARS)
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.body.split('\n').map(str::trim).filter(|p| !p.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("Error loading posts: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Invalid posts endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Post not found")]
    NotFound(i32),

    #[error("Posts are unavailable right now")]
    Unavailable,
}

impl ApiRequestError for PostError {
    fn status_code(&self) -> StatusCode {
        match self {
            PostError::NotFound(_) => StatusCode::NOT_FOUND,
            PostError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            PostError::NotFound(_) => "NOT_FOUND",
            PostError::Unavailable => "UNAVAILABLE",
            _ => "TRANSPORT_ERR",
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, PostError::NotFound(_))
    }
}

/// Where posts come from. A source either returns every post or fails; it
/// never hands back a partial list.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self) -> Result<Vec<Post>, PostError>;
}

/// What a post card shows: the post minus its full body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCard {
    pub id: i32,
    pub title: String,
    pub excerpt: String,
    pub user_id: i32,
    pub category: String,
    pub image: String,
}

impl From<&Post> for PostCard {
    fn from(post: &Post) -> Self {
        PostCard {
            id: post.id,
            title: post.title.clone(),
            excerpt: post.excerpt(),
            user_id: post.user_id,
            category: post.category.clone(),
            image: post.image.clone(),
        }
    }
}
