use axum::{
    Router,
    routing::{delete, get},
};

use crate::App;

use super::{
    comment::{
        create::create_comment, delete::delete_comment, get::get_comments,
        stream::stream_comments,
    },
    post::get::{get_post, list_posts},
};

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/posts", get(list_posts))
        .route("/posts/{id}", get(get_post))
        .route("/comments", get(get_comments).post(create_comment))
        .route("/comments/stream", get(stream_comments))
        .route("/comments/{id}", delete(delete_comment))
}
