use chrono::NaiveDate;
use lendhub::notifications::{InMemoryPresenceRegistry, NotificationDispatcher};
use lendhub::store::{InMemoryEntityStore, PostRepository};
use lendhub::workflows::transactions::{
    Post, PostId, PostType, RentalScheduler, StaticUserDirectory, UserId,
    VerificationWorkflowService, WorkflowError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) dispatcher: Arc<NotificationDispatcher>,
}

/// Process-local wiring of the store, dispatcher, workflow service, and scheduler.
pub(crate) struct Engine {
    pub(crate) store: Arc<InMemoryEntityStore>,
    pub(crate) dispatcher: Arc<NotificationDispatcher>,
    pub(crate) service: Arc<VerificationWorkflowService<InMemoryEntityStore>>,
    pub(crate) scheduler: Arc<RentalScheduler<InMemoryEntityStore>>,
}

impl Engine {
    pub(crate) fn new(directory: StaticUserDirectory) -> Self {
        let store = Arc::new(InMemoryEntityStore::new());
        let presence = Arc::new(InMemoryPresenceRegistry::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), presence));
        let service = Arc::new(VerificationWorkflowService::new(
            store.clone(),
            dispatcher.clone(),
            Arc::new(directory),
        ));
        let scheduler = Arc::new(RentalScheduler::new(store.clone(), dispatcher.clone()));
        Self {
            store,
            dispatcher,
            service,
            scheduler,
        }
    }
}

pub(crate) fn demo_posts() -> Vec<Post> {
    vec![
        Post::new(
            PostId::new("post-drill"),
            PostType::Exchange,
            "Cordless Drill",
            UserId::new("lender"),
        ),
        Post::new(
            PostId::new("post-tent"),
            PostType::Exchange,
            "Four-Person Tent",
            UserId::new("lender"),
        ),
        Post::new(
            PostId::new("post-wallet"),
            PostType::LostFound,
            "Brown Leather Wallet",
            UserId::new("finder"),
        ),
        Post::new(
            PostId::new("post-bike"),
            PostType::Marketplace,
            "Commuter Bike",
            UserId::new("seller"),
        ),
    ]
}

pub(crate) fn seed_demo_posts(store: &InMemoryEntityStore) -> Result<usize, WorkflowError> {
    let posts = demo_posts();
    let count = posts.len();
    for post in posts {
        store.insert_post(post)?;
    }
    Ok(count)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
