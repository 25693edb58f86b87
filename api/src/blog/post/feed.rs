use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use tokio::sync::watch;

use super::{Post, PostError, PostSource};

#[derive(Debug, Clone)]
pub enum FetchState {
    Idle,
    Loading,
    Loaded(Vec<Post>),
    Failed(Arc<PostError>),
}

impl FetchState {
    pub fn is_settled(&self) -> bool {
        matches!(self, FetchState::Loaded(_) | FetchState::Failed(_))
    }

    /// Unsettled states only come out of a detached feed.
    pub fn into_result(self) -> Result<Vec<Post>, Arc<PostError>> {
        match self {
            FetchState::Loaded(posts) => Ok(posts),
            FetchState::Failed(err) => Err(err),
            FetchState::Idle | FetchState::Loading => Err(Arc::new(PostError::Unavailable)),
        }
    }
}

/// The posts every page shows, loaded once and shared between requests.
///
/// `Idle -> Loading -> Loaded | Failed`. A failed feed stays failed until
/// [`PostFeed::retry`] starts another load. Results of loads that finish after
/// the feed detached, or after a newer load started, are dropped.
pub struct PostFeed {
    source: Arc<dyn PostSource>,
    state: watch::Sender<FetchState>,
    // bumped by every load; a load only applies its result if it is still the latest
    generation: AtomicU64,
    detached: AtomicBool,
}

impl PostFeed {
    pub fn new(source: Arc<dyn PostSource>) -> Arc<Self> {
        let (state, _) = watch::channel(FetchState::Idle);
        Arc::new(Self {
            source,
            state,
            generation: AtomicU64::new(0),
            detached: AtomicBool::new(false),
        })
    }

    pub fn state(&self) -> FetchState {
        self.state.borrow().clone()
    }

    /// Moves to `Loading` and fetches in the background if `should_start`
    /// agrees with the current state.
    fn start(self: &Arc<Self>, should_start: impl FnOnce(&FetchState) -> bool) {
        if self.detached.load(Ordering::SeqCst) {
            return;
        }

        let mut ticket = None;
        self.state.send_if_modified(|state| {
            if !should_start(state) {
                return false;
            }
            ticket = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            *state = FetchState::Loading;
            true
        });
        let Some(ticket) = ticket else {
            return;
        };

        // the fetch outlives the request that asked for it
        let feed = Arc::clone(self);
        tokio::spawn(async move {
            let result = feed.source.fetch_posts().await;
            feed.finish(ticket, result);
        });
    }

    fn finish(&self, ticket: u64, result: Result<Vec<Post>, PostError>) {
        let applied = self.state.send_if_modified(|state| {
            if self.detached.load(Ordering::SeqCst)
                || self.generation.load(Ordering::SeqCst) != ticket
            {
                return false;
            }
            *state = match result {
                Ok(posts) => FetchState::Loaded(posts),
                Err(err) => {
                    tracing::warn!(error = %err, "Failed to load blog posts");
                    FetchState::Failed(Arc::new(err))
                }
            };
            true
        });

        if !applied {
            tracing::debug!(ticket, "Discarding stale post load");
        }
    }

    async fn settled(&self) -> FetchState {
        let mut rx = self.state.subscribe();
        let detached = &self.detached;
        match rx
            .wait_for(|state| state.is_settled() || detached.load(Ordering::SeqCst))
            .await
        {
            Ok(state) => state.clone(),
            // the sender lives in `self`
            Err(_) => self.state(),
        }
    }

    /// Starts the first load if nothing asked for posts yet, then waits for
    /// whatever load is current to settle.
    pub async fn current(self: &Arc<Self>) -> FetchState {
        self.start(|state| matches!(state, FetchState::Idle));
        self.settled().await
    }

    /// Loads again unless posts are already loaded. A load still in flight is
    /// superseded by the new one.
    pub async fn retry(self: &Arc<Self>) -> FetchState {
        self.start(|state| !matches!(state, FetchState::Loaded(_)));
        self.settled().await
    }

    pub async fn find(self: &Arc<Self>, id: i32) -> Result<Post, Arc<PostError>> {
        self.current()
            .await
            .into_result()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Arc::new(PostError::NotFound(id)))
    }

    /// Nobody is listening any more; loads in flight must not be applied.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        // wake anyone still waiting on a load
        self.state.send_modify(|_| {});
        tracing::debug!("Post feed detached");
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::blog::post::mock::MockPostSource;

    /// Fails the first `failures` calls, then serves the pet posts.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Flaky {
                failures,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PostSource for Flaky {
        async fn fetch_posts(&self) -> Result<Vec<Post>, PostError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PostError::Status(500));
            }
            MockPostSource::pet_posts().fetch_posts().await
        }
    }

    /// The first fetch hangs until released and then fails; later ones succeed.
    struct StuckThenFine {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PostSource for StuckThenFine {
        async fn fetch_posts(&self) -> Result<Vec<Post>, PostError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.gate.notified().await;
                return Err(PostError::Status(504));
            }
            MockPostSource::pet_posts().fetch_posts().await
        }
    }

    async fn until_loading(feed: &PostFeed) {
        while !matches!(feed.state(), FetchState::Loading) {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn starts_idle_and_loads_once() {
        let source = Flaky::failing(0);
        let feed = PostFeed::new(source.clone());
        assert!(matches!(feed.state(), FetchState::Idle));

        let state = feed.current().await;
        assert!(matches!(state, FetchState::Loaded(ref posts) if posts.len() == 6));
        assert!(state.is_settled());

        feed.current().await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_stick_until_retried() {
        let source = Flaky::failing(1);
        let feed = PostFeed::new(source.clone());

        let state = feed.current().await;
        assert!(matches!(state, FetchState::Failed(ref e) if matches!(**e, PostError::Status(500))));
        assert!(matches!(feed.current().await, FetchState::Failed(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert!(matches!(feed.retry().await, FetchState::Loaded(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_leaves_loaded_posts_alone() {
        let source = Flaky::failing(0);
        let feed = PostFeed::new(source.clone());

        feed.current().await;
        assert!(matches!(feed.retry().await, FetchState::Loaded(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_load() {
        let source = Flaky::failing(0);
        let feed = PostFeed::new(source.clone());

        let (a, b) = tokio::join!(feed.current(), feed.current());
        assert!(matches!(a, FetchState::Loaded(_)));
        assert!(matches!(b, FetchState::Loaded(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn find_looks_posts_up_by_id() {
        let feed = PostFeed::new(Arc::new(MockPostSource::pet_posts()));
        assert_eq!(feed.find(3).await.unwrap().category, "Dog Evolution");
        let err = feed.find(404).await.unwrap_err();
        assert!(matches!(*err, PostError::NotFound(404)));
    }

    #[tokio::test]
    async fn results_arriving_after_detach_are_discarded() {
        let gate = Arc::new(Notify::new());
        let feed = PostFeed::new(Arc::new(StuckThenFine {
            gate: gate.clone(),
            calls: AtomicUsize::new(0),
        }));

        let waiting = tokio::spawn({
            let feed = feed.clone();
            async move { feed.current().await }
        });
        until_loading(&feed).await;

        feed.detach();
        // the waiter is released without a result
        let state = waiting.await.unwrap();
        assert!(matches!(state, FetchState::Loading));
        assert!(matches!(state.into_result(), Err(ref e) if matches!(**e, PostError::Unavailable)));

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(feed.state(), FetchState::Loading));

        // a detached feed does not start new loads either
        assert!(matches!(feed.retry().await, FetchState::Loading));
    }

    #[tokio::test]
    async fn superseded_loads_do_not_overwrite_newer_results() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(StuckThenFine {
            gate: gate.clone(),
            calls: AtomicUsize::new(0),
        });
        let feed = PostFeed::new(source.clone());

        let first = tokio::spawn({
            let feed = feed.clone();
            async move { feed.current().await }
        });
        // wait until the first fetch is the one hanging on the gate
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // a retry while the first load hangs replaces it
        assert!(matches!(feed.retry().await, FetchState::Loaded(_)));
        assert!(matches!(first.await.unwrap(), FetchState::Loaded(_)));

        // the hung load now fails, too late to matter
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(feed.state(), FetchState::Loaded(_)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
