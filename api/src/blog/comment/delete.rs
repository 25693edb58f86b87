use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::{App, error::AppError};

use super::{
    Comment, CommentEvent,
    list::{CommentList, Confirmation, RemoveOutcome},
};

/// `postId` is optional; without it the comment's own post is looked up.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    post_id: Option<i32>,
    #[serde(default)]
    confirm: bool,
}

#[derive(Serialize, Debug)]
pub struct CommentDeleted {
    success: bool,
    comment: Comment,
}

#[debug_handler]
pub async fn delete_comment(
    State(ctx): State<App>,
    Path(id): Path<i64>,
    Query(q): Query<DeleteQuery>,
) -> Result<Json<CommentDeleted>, AppError> {
    let post_id = match q.post_id {
        Some(post_id) => post_id,
        None => ctx
            .comments
            .read_all()
            .await?
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.post_id)
            .ok_or(("Comment not found", StatusCode::NOT_FOUND))?,
    };

    let confirmation = if q.confirm {
        Confirmation::Confirmed
    } else {
        Confirmation::Declined
    };

    let mut list = CommentList::load(post_id, ctx.comments.as_ref()).await?;

    match list
        .remove(id, confirmation, ctx.comments.as_ref())
        .await?
    {
        RemoveOutcome::Removed(comment) => {
            ctx.comment_events
                .publish(CommentEvent::Removed { post_id, id });
            Ok(Json(CommentDeleted {
                success: true,
                comment,
            }))
        }
        RemoveOutcome::Declined => Err((
            "Deleting a comment must be confirmed with `confirm=true`",
            StatusCode::CONFLICT,
        ))?,
        RemoveOutcome::NotFound => Err(("Comment not found", StatusCode::NOT_FOUND))?,
    }
}
