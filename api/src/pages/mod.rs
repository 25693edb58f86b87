use axum::{
    Form, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::broadcast::error::TryRecvError;

use crate::{
    App,
    blog::{
        comment::{
            CommentEvent,
            form::{CommentForm, SubmitError},
            list::{CommentList, CommentListView, CommentView},
            validate::FieldErrors,
        },
        post::{
            Post, PostCard, PostError,
            get::{RetryQuery, load_posts},
        },
    },
    error::ApiRequestError,
    real_ip::ClientIp,
    utils::{escape_html, readable_uint, render_template},
};

const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
const POST_CARD_TEMPLATE: &str = include_str!("templates/post_card.html");
const POST_TEMPLATE: &str = include_str!("templates/post.html");
const COMMENT_FORM_TEMPLATE: &str = include_str!("templates/comment_form.html");
const COMMENT_LIST_TEMPLATE: &str = include_str!("templates/comment_list.html");
const COMMENT_TEMPLATE: &str = include_str!("templates/comment.html");
const ERROR_TEMPLATE: &str = include_str!("templates/error.html");

const RATE_LIMITED_MESSAGE: &str = "You're commenting too fast, please wait a moment";

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/", get(index))
        .route("/blog/{id}", get(post_page))
        .route("/blog/{id}/comments", axum::routing::post(submit_comment))
}

// Visitor text is escaped, and braces too so it can never be taken for a
// template placeholder by a later substitution.
fn text(input: &str) -> String {
    escape_html(input).replace('{', "&#123;").replace('}', "&#125;")
}

fn badge_class(category: &str) -> String {
    let slug: String = category
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    format!("badge-{slug}")
}

fn page(status: StatusCode, title: &str, content: &str) -> Response {
    let html = render_template(
        LAYOUT_TEMPLATE,
        &[("{{title}}", &text(title)), ("{{content}}", content)],
    );
    (status, Html(html)).into_response()
}

fn error_block(title: &str, message: &str, action_href: &str, action_label: &str) -> String {
    render_template(
        ERROR_TEMPLATE,
        &[
            ("{{title}}", &text(title)),
            ("{{action-href}}", action_href),
            ("{{action-label}}", action_label),
            ("{{message}}", &text(message)),
        ],
    )
}

/// The page shown when posts can't be loaded: no cards, a way to try again.
fn post_error_page(err: &PostError, retry_href: &str) -> Response {
    match err {
        PostError::NotFound(_) => page(
            StatusCode::NOT_FOUND,
            "Post not found",
            &error_block(
                "Post not found",
                "The post you're looking for doesn't exist.",
                "/",
                "Back to all posts",
            ),
        ),
        err => page(
            err.status_code(),
            "Error",
            &error_block("Error loading posts", &err.to_string(), retry_href, "Try again"),
        ),
    }
}

fn render_card(card: &PostCard) -> String {
    render_template(
        POST_CARD_TEMPLATE,
        &[
            ("{{id}}", &card.id.to_string()),
            ("{{badge-class}}", &badge_class(&card.category)),
            ("{{image}}", &text(&card.image)),
            ("{{category}}", &text(&card.category)),
            ("{{title}}", &text(&card.title)),
            ("{{excerpt}}", &text(&card.excerpt)),
            ("{{user-id}}", &card.user_id.to_string()),
        ],
    )
}

pub async fn index(State(ctx): State<App>, Query(query): Query<RetryQuery>) -> Response {
    let posts = match load_posts(&ctx, &query).await.into_result() {
        Ok(posts) => posts,
        Err(err) => return post_error_page(&err, "/?retry=true"),
    };

    let cards: String = posts
        .iter()
        .map(|post| render_card(&PostCard::from(post)))
        .collect();

    let content = if cards.is_empty() {
        "<p class=\"empty\">No posts yet</p>".to_string()
    } else {
        format!("<div class=\"grid\">\n{cards}</div>")
    };

    page(StatusCode::OK, "Home", &content)
}

fn render_comment(view: &CommentView) -> String {
    render_template(
        COMMENT_TEMPLATE,
        &[
            ("{{id}}", &view.comment.id.to_string()),
            ("{{initial}}", &text(&view.initial)),
            ("{{display-date}}", &view.display_date),
            ("{{display-time}}", &view.display_time),
            ("{{time-ago}}", &view.time_ago),
            ("{{name}}", &text(&view.comment.name)),
            ("{{comment}}", &text(&view.comment.comment)),
        ],
    )
}

fn render_comment_list(post_id: i32, view: &CommentListView) -> String {
    let items = match view.empty_message {
        Some(message) => format!("<p class=\"empty\">{message}</p>"),
        None => view.items.iter().map(render_comment).collect(),
    };

    render_template(
        COMMENT_LIST_TEMPLATE,
        &[
            ("{{post-id}}", &post_id.to_string()),
            ("{{count}}", &readable_uint(view.count)),
            ("{{items}}", &items),
        ],
    )
}

fn field_error(message: Option<&String>) -> String {
    message
        .map(|m| format!("<p class=\"field-error\">{}</p>", text(m)))
        .unwrap_or_default()
}

fn render_form(form: &CommentForm) -> String {
    let errors: &FieldErrors = form.errors();
    let counter = form.char_counter();

    let success = form
        .success()
        .map(|m| format!("<p class=\"success\">{m}</p>\n"))
        .unwrap_or_default();
    let general = errors
        .general
        .as_ref()
        .map(|m| format!("<p class=\"general-error\">{}</p>\n", text(m)))
        .unwrap_or_default();

    render_template(
        COMMENT_FORM_TEMPLATE,
        &[
            ("{{post-id}}", &form.post_id().to_string()),
            ("{{count}}", &counter.count.to_string()),
            ("{{max}}", &counter.max.to_string()),
            ("{{counter-class}}", if counter.near_limit { " near-limit" } else { "" }),
            ("{{success}}", &success),
            ("{{general-error}}", &general),
            ("{{name-error}}", &field_error(errors.name.as_ref())),
            ("{{comment-error}}", &field_error(errors.comment.as_ref())),
            ("{{name}}", &text(&form.name)),
            ("{{comment}}", &text(&form.comment)),
        ],
    )
}

fn post_page_response(status: StatusCode, post: &Post, form: &CommentForm, list: &CommentList) -> Response {
    let paragraphs: String = post
        .paragraphs()
        .map(|p| format!("  <p>{}</p>\n", text(p)))
        .collect();

    let content = render_template(
        POST_TEMPLATE,
        &[
            ("{{badge-class}}", &badge_class(&post.category)),
            ("{{category}}", &text(&post.category)),
            ("{{image}}", &text(&post.image)),
            ("{{title}}", &text(&post.title)),
            ("{{user-id}}", &post.user_id.to_string()),
            ("{{paragraphs}}", &paragraphs),
            ("{{comment-form}}", &render_form(form)),
            ("{{comment-list}}", &render_comment_list(post.id, &list.view(Utc::now()))),
        ],
    );

    page(status, &post.title, &content)
}

async fn find_post(ctx: &App, id: i32, query: &RetryQuery) -> Result<Post, Response> {
    let retry_href = format!("/blog/{id}?retry=true");
    let posts = load_posts(ctx, query)
        .await
        .into_result()
        .map_err(|err| post_error_page(&err, &retry_href))?;

    posts
        .into_iter()
        .find(|post| post.id == id)
        .ok_or_else(|| post_error_page(&PostError::NotFound(id), &retry_href))
}

fn storage_failure_page(err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "Failed to load comments for page");
    page(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Error",
        &error_block("Something went wrong", "Internal server error", "/", "Back to all posts"),
    )
}

pub async fn post_page(
    State(ctx): State<App>,
    Path(id): Path<i32>,
    Query(query): Query<RetryQuery>,
) -> Response {
    let post = match find_post(&ctx, id, &query).await {
        Ok(post) => post,
        Err(response) => return response,
    };

    let list = match CommentList::load(post.id, ctx.comments.as_ref()).await {
        Ok(list) => list,
        Err(e) => return storage_failure_page(e),
    };

    let form = CommentForm::new(post.id, |_| {});
    post_page_response(StatusCode::OK, &post, &form, &list)
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct CommentFormInput {
    name: String,
    comment: String,
}

/// Plain HTML form submission: re-renders the post with the form's errors, or
/// with the new comment merged into the list and a success message.
pub async fn submit_comment(
    State(ctx): State<App>,
    Path(id): Path<i32>,
    ClientIp(ip): ClientIp,
    Form(input): Form<CommentFormInput>,
) -> Response {
    let post = match find_post(&ctx, id, &RetryQuery::default()).await {
        Ok(post) => post,
        Err(response) => return response,
    };

    // subscribe before loading, so nothing published in between is missed
    let mut events = ctx.comment_events.subscribe();
    let mut list = match CommentList::load(post.id, ctx.comments.as_ref()).await {
        Ok(list) => list,
        Err(e) => return storage_failure_page(e),
    };

    let publisher = ctx.comment_events.clone();
    let mut form = CommentForm::new(post.id, move |c| {
        publisher.publish(CommentEvent::Added(c.clone()))
    })
    .with_input(input.name, input.comment);

    if let Err(e) = ctx.check_comment_rate(ip) {
        tracing::debug!(?e, "Rejected comment form submission");
        form.reject(RATE_LIMITED_MESSAGE);
        return post_page_response(StatusCode::TOO_MANY_REQUESTS, &post, &form, &list);
    }

    let status = match form
        .submit(ctx.comments.as_ref(), &ctx.ids, ctx.config.submit_delay)
        .await
    {
        Ok(comment) => {
            tracing::info!(comment_id = comment.id, post_id = post.id, %ip, "Comment added");
            // the broadcast copy is lost if the channel overflows; `apply` skips known ids
            list.apply(&CommentEvent::Added(comment));
            StatusCode::OK
        }
        Err(SubmitError::Invalid(_)) => StatusCode::BAD_REQUEST,
        Err(SubmitError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // whatever else happened to this post while the submission was in flight
    loop {
        match events.try_recv() {
            Ok(event) => {
                list.apply(&event);
            }
            Err(TryRecvError::Lagged(missed)) => {
                tracing::warn!(missed, post_id = post.id, "Comment events lagged during submission");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    post_page_response(status, &post, &form, &list)
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    use axum::{
        body::{Body, to_bytes},
        extract::ConnectInfo,
        http::Request,
    };
    use tower::ServiceExt;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        build_router,
        blog::{
            comment::store::{CommentStore, MemoryStore, sample_comments},
            post::{PostSource, mock::MockPostSource, remote::RemotePostSource},
        },
        config::ServerConfig,
    };

    fn config_with_delay(delay_ms: &'static str) -> ServerConfig {
        ServerConfig::from_lookup(|key| (key == "COMMENT_SUBMIT_DELAY_MS").then(|| delay_ms.into()))
            .unwrap()
    }

    fn config() -> ServerConfig {
        config_with_delay("0")
    }

    async fn app_with(
        config: ServerConfig,
        posts: Arc<dyn PostSource>,
        store: Arc<MemoryStore>,
    ) -> App {
        store.seed(sample_comments()).await.unwrap();
        App::new(config, posts, store).await.unwrap()
    }

    async fn router_with(posts: Arc<dyn PostSource>, store: Arc<MemoryStore>) -> Router {
        build_router(app_with(config(), posts, store).await)
    }

    async fn router() -> Router {
        router_with(Arc::new(MockPostSource::pet_posts()), Arc::new(MemoryStore::new())).await
    }

    async fn fetch(router: &Router, req: Request<Body>) -> (StatusCode, String) {
        let response = router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_page(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn submit_form(post_id: i32, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/blog/{post_id}/comments"))
            .header("content-type", "application/x-www-form-urlencoded")
            .extension(ConnectInfo(SocketAddr::from(([198, 51, 100, 4], 50000))))
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn badge_classes_are_slugs() {
        assert_eq!(badge_class("Dire Wolves"), "badge-dire-wolves");
        assert_eq!(badge_class("Dog Evolution"), "badge-dog-evolution");
    }

    #[test]
    fn visitor_text_cannot_inject_markup_or_placeholders() {
        assert_eq!(text("<b>{{name}}</b>"), "&lt;b&gt;&#123;&#123;name&#125;&#125;&lt;/b&gt;");
    }

    #[tokio::test]
    async fn home_lists_every_post_card() {
        let (status, html) = fetch(&router().await, get_page("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(html.matches("class=\"card\"").count(), 6);
        assert!(html.contains("The Mighty Dire Wolf: Giants of the Ice Age"));
        assert!(html.contains("badge-modern-wolves"));
        assert!(html.contains("By Wildlife Expert 1"));
        assert!(html.contains("By Wildlife Expert 5"));
    }

    #[tokio::test]
    async fn home_shows_a_retryable_error_when_posts_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let mut posts_api = config().posts_api;
        posts_api.base_url = server.uri().parse().unwrap();
        let source = RemotePostSource::new(reqwest::Client::new(), &posts_api);

        let router = router_with(Arc::new(source), Arc::new(MemoryStore::new())).await;
        let (status, html) = fetch(&router, get_page("/")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(html.contains("HTTP error! status: 500"));
        assert!(html.contains("Try again"));
        assert!(html.contains("href=\"/?retry=true\""));
        assert_eq!(html.matches("class=\"card\"").count(), 0);
    }

    #[tokio::test]
    async fn try_again_reloads_posts_that_failed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "title": "Wolf packs", "body": "Packs hunt together.", "userId": 7}
            ])))
            .mount(&server)
            .await;
        let mut posts_api = config().posts_api;
        posts_api.base_url = server.uri().parse().unwrap();
        let source = RemotePostSource::new(reqwest::Client::new(), &posts_api);
        let router = router_with(Arc::new(source), Arc::new(MemoryStore::new())).await;

        let (status, _) = fetch(&router, get_page("/")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        // the failure sticks until someone asks to try again
        let (status, _) = fetch(&router, get_page("/blog/1")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, html) = fetch(&router, get_page("/blog/1?retry=true")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<h1>Wolf packs</h1>"));
        assert!(html.contains("By Wildlife Expert 7"));

        let (status, html) = fetch(&router, get_page("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(html.matches("class=\"card\"").count(), 1);
    }

    #[tokio::test]
    async fn post_page_has_the_post_form_and_comments() {
        let (status, html) = fetch(&router().await, get_page("/blog/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<h1>The Mighty Dire Wolf: Giants of the Ice Age</h1>"));
        assert!(html.contains("By Wildlife Expert 1"));
        assert!(html.contains("id=\"comment-form\""));
        assert!(html.contains("Comments (2)"));
        assert!(html.contains("0/500"));
    }

    #[tokio::test]
    async fn unknown_posts_have_no_comment_form() {
        let (status, html) = fetch(&router().await, get_page("/blog/42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(html.contains("Post not found"));
        assert!(!html.contains("id=\"comment-form\""));
    }

    #[tokio::test]
    async fn posts_without_comments_say_so() {
        let (_, html) = fetch(&router().await, get_page("/blog/6")).await;
        assert!(html.contains("Comments (0)"));
        assert!(html.contains("No comments yet"));
    }

    #[tokio::test]
    async fn submitted_comments_appear_first_and_the_form_clears() {
        let router = router().await;
        let (status, html) =
            fetch(&router, submit_form(1, "name=Al&comment=1234567890")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Comment added successfully!"));
        assert!(html.contains("Comments (3)"));
        assert!(html.contains("value=\"\""));

        let al = html.find("<strong>Al</strong>").unwrap();
        let alex = html.find("<strong>Alex Nature Photographer</strong>").unwrap();
        let sarah = html.find("<strong>Sarah Wildlife</strong>").unwrap();
        assert!(al < alex && alex < sarah);
    }

    #[tokio::test]
    async fn own_comment_is_shown_even_after_a_burst_of_other_events() {
        let app = app_with(
            config_with_delay("200"),
            Arc::new(MockPostSource::pet_posts()),
            Arc::new(MemoryStore::new()),
        )
        .await;
        let events = app.comment_events.clone();
        let router = build_router(app);

        let submission = tokio::spawn({
            let router = router.clone();
            async move { fetch(&router, submit_form(1, "name=Al&comment=1234567890")).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // more than the channel holds, all while the submission waits
        for id in 0..300 {
            events.publish(CommentEvent::Removed { post_id: 2, id });
        }

        let (status, html) = submission.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<strong>Al</strong>"));
        assert!(html.contains("Comments (3)"));
    }

    #[tokio::test]
    async fn invalid_submissions_keep_the_input_and_show_both_errors() {
        let store = Arc::new(MemoryStore::new());
        let router = router_with(Arc::new(MockPostSource::pet_posts()), store.clone()).await;

        let (status, html) = fetch(&router, submit_form(1, "name=A&comment=short")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(html.contains("Name must be at least 2 characters"));
        assert!(html.contains("Comment must be at least 10 characters"));
        assert!(html.contains("value=\"A\""));
        assert!(html.contains("Comments (2)"));
        assert_eq!(store.read_all().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn storage_failures_show_a_general_error() {
        // the five samples already fill the quota
        let store = Arc::new(MemoryStore::with_quota(5));
        let router = router_with(Arc::new(MockPostSource::pet_posts()), store).await;

        let (status, html) =
            fetch(&router, submit_form(2, "name=Al&comment=1234567890")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(html.contains("Failed to save comment"));
        assert!(html.contains("Comments (2)"));
        assert!(!html.contains("Comment added successfully!"));
    }
}
