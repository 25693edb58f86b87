use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;

use crate::{App, error::AppError};

use super::{
    PostIdQuery,
    list::{CommentList, CommentListView},
};

pub async fn get_comments(
    State(ctx): State<App>,
    Query(q): Query<PostIdQuery>,
) -> Result<Json<CommentListView>, AppError> {
    let post_id = q.require()?;

    let list = CommentList::load(post_id, ctx.comments.as_ref()).await?;

    Ok(Json(list.view(Utc::now())))
}
