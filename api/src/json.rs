use axum::{
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
};

use crate::error::AppError;

// We define our own `Json` extractor that customizes the error from `axum::Json`
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(value) => Ok(Self(value.0)),
            // a body the comment API can't read is a bad request, whatever axum thinks
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), "Rejected JSON body");
                Err((rejection.body_text(), StatusCode::BAD_REQUEST).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Payload {
        #[allow(dead_code)]
        name: String,
    }

    fn request(content_type: &str, body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn accepts_well_formed_bodies() {
        let req = request("application/json", r#"{"name":"Al"}"#);
        assert!(Json::<Payload>::from_request(req, &()).await.is_ok());
    }

    #[tokio::test]
    async fn rejections_become_bad_requests() {
        for req in [
            request("application/json", "{not json"),
            request("application/json", r#"{"other":1}"#),
            request("text/plain", r#"{"name":"Al"}"#),
        ] {
            match Json::<Payload>::from_request(req, &()).await {
                Err(AppError::Unhandled(_, status)) => assert_eq!(status, StatusCode::BAD_REQUEST),
                _ => panic!("expected a bad request"),
            }
        }
    }
}
