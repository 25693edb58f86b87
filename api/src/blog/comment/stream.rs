use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::{App, error::AppError};

use super::PostIdQuery;

/// Pushes every comment added to or removed from one post to the open page,
/// so it can merge the change without reloading.
pub async fn stream_comments(
    State(ctx): State<App>,
    Query(q): Query<PostIdQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let post_id = q.require()?;

    let stream = BroadcastStream::new(ctx.comment_events.subscribe())
        .filter_map(move |event| async move {
            match event {
                Ok(event) if event.post_id() == post_id => Some(event),
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(%err, post_id, "Comment stream fell behind");
                    None
                }
            }
        })
        .map(|event| {
            let json = serde_json::to_string(&event).unwrap_or_default();
            Ok(Event::default().data(json))
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
