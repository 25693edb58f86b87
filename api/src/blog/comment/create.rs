use axum::{Json, debug_handler, extract::State};
use serde::{Deserialize, Serialize};

use crate::{App, error::AppError, real_ip::ClientIp};

use super::{
    Comment, CommentEvent,
    form::{CommentForm, SUCCESS_MESSAGE},
    validate::{ValidationError, parse_post_id},
};

#[debug_handler]
pub async fn create_comment(
    State(ctx): State<App>,
    ClientIp(ip): ClientIp,
    crate::json::Json(submission): crate::json::Json<CommentSubmission>,
) -> Result<Json<CommentCreated>, AppError> {
    ctx.check_comment_rate(ip)?;

    let (name, comment, post_id) = submission.into_parts()?;

    // comments can only be attached to posts that exist
    let post = ctx.posts.find(post_id).await?;

    let events = ctx.comment_events.clone();
    let mut form = CommentForm::new(post.id, move |c| {
        events.publish(CommentEvent::Added(c.clone()))
    })
    .with_input(name, comment);

    let comment = form
        .submit(ctx.comments.as_ref(), &ctx.ids, ctx.config.submit_delay)
        .await?;

    tracing::info!(comment_id = comment.id, post_id, %ip, "Comment added");

    Ok(Json(CommentCreated {
        success: true,
        message: SUCCESS_MESSAGE,
        comment,
    }))
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CommentSubmission {
    name: Option<String>,
    comment: Option<String>,
    post_id: Option<PostIdField>,
}

/// Browsers post the id as typed into the page, so accept `1` and `"1"`.
#[derive(Deserialize, Serialize, Debug)]
#[serde(untagged)]
enum PostIdField {
    Number(i32),
    Text(String),
}

impl PostIdField {
    fn is_blank(&self) -> bool {
        match self {
            PostIdField::Number(id) => *id == 0,
            PostIdField::Text(raw) => raw.is_empty(),
        }
    }
}

impl CommentSubmission {
    /// Empty strings and a zero post id count as missing. Whitespace-only
    /// input is present and left to the length rules.
    fn into_parts(self) -> Result<(String, String, i32), ValidationError> {
        let (Some(name), Some(comment), Some(post_id)) = (
            self.name.filter(|name| !name.is_empty()),
            self.comment.filter(|comment| !comment.is_empty()),
            self.post_id.filter(|id| !id.is_blank()),
        ) else {
            return Err(ValidationError::MissingFields);
        };

        let post_id = match post_id {
            PostIdField::Number(id) => id,
            PostIdField::Text(raw) => parse_post_id(&raw)?,
        };

        Ok((name, comment, post_id))
    }
}

#[derive(Serialize, Debug)]
pub struct CommentCreated {
    success: bool,
    message: &'static str,
    comment: Comment,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(json: serde_json::Value) -> CommentSubmission {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn post_id_may_be_a_number_or_numeric_text() {
        let parts = submission(serde_json::json!({"name": "Al", "comment": "1234567890", "postId": 1}))
            .into_parts()
            .unwrap();
        assert_eq!(parts.2, 1);

        let parts = submission(serde_json::json!({"name": "Al", "comment": "1234567890", "postId": "2"}))
            .into_parts()
            .unwrap();
        assert_eq!(parts.2, 2);

        let err = submission(serde_json::json!({"name": "Al", "comment": "1234567890", "postId": "two"}))
            .into_parts()
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPostId));
    }

    #[test]
    fn any_missing_field_is_rejected() {
        for json in [
            serde_json::json!({"comment": "1234567890", "postId": 1}),
            serde_json::json!({"name": "Al", "postId": 1}),
            serde_json::json!({"name": "Al", "comment": "1234567890"}),
            serde_json::json!({"name": "", "comment": "1234567890", "postId": 1}),
            serde_json::json!({"name": "Al", "comment": "", "postId": 1}),
            serde_json::json!({"name": "Al", "comment": "1234567890", "postId": ""}),
            serde_json::json!({"name": "Al", "comment": "1234567890", "postId": 0}),
        ] {
            assert!(matches!(
                submission(json).into_parts(),
                Err(ValidationError::MissingFields)
            ));
        }
    }

    #[test]
    fn blank_but_present_text_goes_on_to_the_length_rules() {
        let parts = submission(serde_json::json!({"name": "   ", "comment": "1234567890", "postId": 1}))
            .into_parts()
            .unwrap();
        assert_eq!(parts.0, "   ");
    }
}
