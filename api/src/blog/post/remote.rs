use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::RemotePostsConfig;

use super::{Post, PostError, PostSource};

/// Posts fetched from a JSONPlaceholder-style API: `GET {base}/posts?_limit=n`.
pub struct RemotePostSource {
    http: reqwest::Client,
    base_url: Url,
    page_size: usize,
    timeout: Duration,
}

impl RemotePostSource {
    pub fn new(http: reqwest::Client, config: &RemotePostsConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            page_size: config.page_size,
            timeout: config.timeout,
        }
    }

    fn endpoint(&self) -> Result<Url, PostError> {
        let mut base = self.base_url.clone();
        // without the trailing slash `join` would replace the last segment
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let mut url = base.join("posts")?;
        url.query_pairs_mut()
            .append_pair("_limit", &self.page_size.to_string());
        Ok(url)
    }
}

#[async_trait]
impl PostSource for RemotePostSource {
    #[tracing::instrument(skip(self))]
    async fn fetch_posts(&self) -> Result<Vec<Post>, PostError> {
        let url = self.endpoint()?;

        let resp = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, %url, "Failed to fetch blog posts");
                PostError::Transport(e)
            })?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), %url, "Posts API returned an error");
            return Err(PostError::Status(resp.status().as_u16()));
        }

        let posts: Vec<Post> = resp.json().await.map_err(|e| {
            tracing::warn!(error = %e, %url, "Failed to parse blog posts");
            PostError::Transport(e)
        })?;

        tracing::debug!("Successfully loaded {} blog posts", posts.len());
        Ok(posts)
    }
}
