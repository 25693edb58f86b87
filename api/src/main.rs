use axum::{Router, http::HeaderValue};
use dotenv::dotenv;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use mimalloc::MiMalloc;
use std::{net::IpAddr, net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use blog::{
    comment::{
        CommentEvents,
        id::IdGenerator,
        store::{CommentStore, JsonFileStore, MemoryStore, StorageError, sample_comments},
    },
    post::{PostSource, feed::PostFeed, mock::MockPostSource, remote::RemotePostSource},
};
use config::{Env, PostSourceKind, ServerConfig, StoreLocation};
use error::AppError;

mod blog;
mod config;
mod error;
mod json;
mod pages;
mod real_ip;
mod utils;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Clone)]
pub struct App {
    pub config: Arc<ServerConfig>,
    pub posts: Arc<PostFeed>,
    pub comments: Arc<dyn CommentStore>,
    pub comment_events: CommentEvents,
    pub ids: Arc<IdGenerator>,
    rate_limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl App {
    /// Ids continue after the largest one already stored, so a restart within
    /// the same millisecond can't hand out a duplicate.
    pub async fn new(
        config: ServerConfig,
        posts: Arc<dyn PostSource>,
        comments: Arc<dyn CommentStore>,
    ) -> Result<Self, StorageError> {
        let last_id = comments
            .read_all()
            .await?
            .iter()
            .map(|c| c.id)
            .max()
            .unwrap_or(0);

        let quota = Quota::per_minute(config.comment_rate_limit_per_minute);

        Ok(App {
            config: Arc::new(config),
            posts: PostFeed::new(posts),
            comments,
            comment_events: CommentEvents::default(),
            ids: Arc::new(IdGenerator::starting_after(last_id)),
            rate_limiter: Arc::new(RateLimiter::keyed(quota)),
        })
    }

    pub fn check_comment_rate(&self, ip: IpAddr) -> Result<(), AppError> {
        if self.rate_limiter.check_key(&ip).is_err() {
            tracing::warn!(%ip, "Comment rate limit exceeded");
            return Err((
                "Too many comments, please wait a moment before posting again",
                axum::http::StatusCode::TOO_MANY_REQUESTS,
            )
                .into());
        }
        Ok(())
    }
}

fn init_tracing(env: Env) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,petblog=debug,tower_http=debug"));

    match env {
        Env::Production => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        Env::Dev | Env::Staging => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

fn post_source(config: &ServerConfig) -> Arc<dyn PostSource> {
    match config.post_source {
        PostSourceKind::Mock => Arc::new(MockPostSource::pet_posts()),
        PostSourceKind::Remote => Arc::new(RemotePostSource::new(
            reqwest::Client::new(),
            &config.posts_api,
        )),
    }
}

fn comment_store(config: &ServerConfig) -> Arc<dyn CommentStore> {
    match &config.comments_store {
        StoreLocation::Memory => match config.comments_memory_limit {
            Some(limit) => Arc::new(MemoryStore::with_quota(limit)),
            None => Arc::new(MemoryStore::new()),
        },
        StoreLocation::File(path) => {
            let store = JsonFileStore::new(path.clone());
            tracing::info!(path = %store.path().display(), "Storing comments in a JSON file");
            Arc::new(store)
        }
    }
}

fn cors(allowed_origin: Option<HeaderValue>) -> CorsLayer {
    match allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

pub fn build_router(app: App) -> Router {
    let cors = cors(app.config.allowed_origin.clone());

    Router::new()
        .merge(pages::route())
        .nest("/api", blog::routes::route())
        .with_state(app)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();

    init_tracing(Env::from_env());

    let config = ServerConfig::new_from_env();

    let posts = post_source(&config);
    let comments = comment_store(&config);

    if comments.seed(sample_comments()).await? {
        tracing::info!("Seeded the comment store with sample comments");
    }

    let bind_addr = config.bind_addr;
    let app = App::new(config, posts, comments).await?;

    // forget idle clients now and then so the limiter doesn't grow forever
    let limiter = app.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });

    let feed = app.posts.clone();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        build_router(app).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    feed.detach();
    tracing::info!("Server stopped");

    Ok(())
}
