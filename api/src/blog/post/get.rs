use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    App,
    blog::comment::list::{CommentList, CommentListView},
    error::AppError,
};

use super::{Post, PostCard, feed::FetchState};

/// `?retry=true` asks a failed feed to load again.
#[derive(Deserialize, Debug, Default)]
pub struct RetryQuery {
    #[serde(default)]
    pub retry: bool,
}

#[derive(Serialize, Debug)]
pub struct PostList {
    posts: Vec<PostCard>,
}

#[derive(Serialize, Debug)]
pub struct PostDetail {
    post: Post,
    comments: CommentListView,
}

/// The shared feed's posts, retrying first if the caller asked to.
pub async fn load_posts(ctx: &App, query: &RetryQuery) -> FetchState {
    if query.retry {
        ctx.posts.retry().await
    } else {
        ctx.posts.current().await
    }
}

pub async fn list_posts(
    State(ctx): State<App>,
    Query(query): Query<RetryQuery>,
) -> Result<Json<PostList>, AppError> {
    let posts = load_posts(&ctx, &query).await.into_result()?;

    Ok(Json(PostList {
        posts: posts.iter().map(PostCard::from).collect(),
    }))
}

pub async fn get_post(
    State(ctx): State<App>,
    Path(id): Path<i32>,
) -> Result<Json<PostDetail>, AppError> {
    let post = ctx.posts.find(id).await?;
    let comments = CommentList::load(post.id, ctx.comments.as_ref()).await?;

    Ok(Json(PostDetail {
        post,
        comments: comments.view(Utc::now()),
    }))
}
