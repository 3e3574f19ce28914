use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::notifications::{InMemoryPresenceRegistry, Notification, NotificationDispatcher};
use crate::store::{
    EntityStore, InMemoryEntityStore, NotificationRepository, PostRepository, ReminderClaim,
    RentalRepository, RepositoryError, VerificationRepository,
};
use crate::workflows::transactions::domain::{
    Availability, NotificationId, Post, PostId, PostType, RentalDuration, RentalId,
    RentalTracking, ReportId, RequestId, RequestKind, ReturnStatus, ReviewDecision, ReviewRecord,
    UserId, VerificationRequest,
};
use crate::workflows::transactions::{
    RequestSubmission, StaticUserDirectory, VerificationWorkflowService,
};

pub(super) fn owner() -> UserId {
    UserId::new("owner-1")
}

pub(super) fn renter() -> UserId {
    UserId::new("renter-1")
}

pub(super) fn admin() -> UserId {
    UserId::new("admin-1")
}

pub(super) fn watcher() -> UserId {
    UserId::new("watcher-1")
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn rent_kind(start: NaiveDate, days: u32) -> RequestKind {
    RequestKind::Rent(RentalDuration {
        start,
        end: start + chrono::Duration::days(i64::from(days)),
        days,
    })
}

pub(super) fn submission(post: &PostId, requester: &UserId, kind: RequestKind) -> RequestSubmission {
    RequestSubmission {
        post_id: post.clone(),
        requester_id: requester.clone(),
        kind,
        proof_images: vec!["https://img.example/proof-1.jpg".to_string()],
        details: Some("Pick up on Saturday".to_string()),
    }
}

pub(super) fn seed_post<S: PostRepository>(store: &S, id: &str, post_type: PostType) -> PostId {
    let post = Post::new(PostId::new(id), post_type, "Camping Tent", owner());
    store.insert_post(post).expect("post inserted").id
}

pub(super) fn seed_rental<S: RentalRepository>(
    store: &S,
    post: &PostId,
    end_date: NaiveDate,
) -> RentalId {
    let id = RentalId::new(format!("rent-{}", post.as_str()));
    let rental = RentalTracking {
        id: id.clone(),
        verification_request_id: RequestId::new(format!("req-{}", post.as_str())),
        post_id: post.clone(),
        renter_id: renter(),
        owner_id: owner(),
        start_date: end_date - chrono::Duration::days(5),
        end_date,
        duration_in_days: 5,
        return_status: ReturnStatus::Active,
        last_notification_sent: None,
        is_completed: false,
    };
    store.insert_rental(rental).expect("rental inserted");
    id
}

pub(super) struct Harness<S> {
    pub(super) service: Arc<VerificationWorkflowService<S>>,
    pub(super) store: Arc<S>,
    pub(super) presence: Arc<InMemoryPresenceRegistry>,
}

pub(super) fn harness() -> Harness<InMemoryEntityStore> {
    harness_with(Arc::new(InMemoryEntityStore::new()))
}

pub(super) fn harness_with<S>(store: Arc<S>) -> Harness<S>
where
    S: EntityStore + 'static,
{
    let presence = Arc::new(InMemoryPresenceRegistry::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), presence.clone()));
    let directory = StaticUserDirectory::new([admin()])
        .with_conversation(PostId::new("post-1"), [owner(), renter(), watcher()]);
    let service = Arc::new(VerificationWorkflowService::new(
        store.clone(),
        dispatcher,
        Arc::new(directory),
    ));
    Harness {
        service,
        store,
        presence,
    }
}

pub(super) fn approve<S>(harness: &Harness<S>, request: &RequestId)
where
    S: EntityStore + 'static,
{
    harness
        .service
        .review(request, ReviewDecision::Approved, &admin(), None)
        .expect("approval succeeds");
}

pub(super) fn inbox<S: NotificationRepository>(store: &S, user: &UserId) -> Vec<Notification> {
    store
        .notifications_for(user, false)
        .expect("notifications listed")
}

pub(super) fn availability_of<S: PostRepository>(store: &S, post: &PostId) -> Availability {
    store
        .fetch_post(post)
        .expect("fetch succeeds")
        .expect("post present")
        .availability
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Entity store whose individual writes can be made to fail on demand.
#[derive(Default)]
pub(super) struct FlakyStore {
    pub(super) inner: InMemoryEntityStore,
    pub(super) fail_post_updates: AtomicBool,
    pub(super) fail_request_inserts: AtomicBool,
    pub(super) fail_reviews: AtomicBool,
    pub(super) fail_notifications: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), RepositoryError> {
        if flag.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl PostRepository for FlakyStore {
    fn next_report_id(&self) -> Result<ReportId, RepositoryError> {
        self.inner.next_report_id()
    }

    fn insert_post(&self, post: Post) -> Result<Post, RepositoryError> {
        self.inner.insert_post(post)
    }

    fn fetch_post(&self, id: &PostId) -> Result<Option<Post>, RepositoryError> {
        self.inner.fetch_post(id)
    }

    fn update_post(&self, post: Post) -> Result<(), RepositoryError> {
        Self::check(&self.fail_post_updates)?;
        self.inner.update_post(post)
    }

    fn reported_posts(&self) -> Result<Vec<Post>, RepositoryError> {
        self.inner.reported_posts()
    }

    fn post_for_report(&self, report: &ReportId) -> Result<Option<Post>, RepositoryError> {
        self.inner.post_for_report(report)
    }
}

impl VerificationRepository for FlakyStore {
    fn next_request_id(&self) -> Result<RequestId, RepositoryError> {
        self.inner.next_request_id()
    }

    fn insert_request(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationRequest, RepositoryError> {
        Self::check(&self.fail_request_inserts)?;
        self.inner.insert_request(request)
    }

    fn fetch_request(&self, id: &RequestId) -> Result<Option<VerificationRequest>, RepositoryError> {
        self.inner.fetch_request(id)
    }

    fn pending_requests(&self, limit: usize) -> Result<Vec<VerificationRequest>, RepositoryError> {
        self.inner.pending_requests(limit)
    }

    fn pending_return_for_rental(
        &self,
        rental: &RentalId,
    ) -> Result<Option<VerificationRequest>, RepositoryError> {
        self.inner.pending_return_for_rental(rental)
    }

    fn record_review(
        &self,
        id: &RequestId,
        review: ReviewRecord,
    ) -> Result<VerificationRequest, RepositoryError> {
        Self::check(&self.fail_reviews)?;
        self.inner.record_review(id, review)
    }
}

impl RentalRepository for FlakyStore {
    fn next_rental_id(&self) -> Result<RentalId, RepositoryError> {
        self.inner.next_rental_id()
    }

    fn insert_rental(&self, rental: RentalTracking) -> Result<RentalTracking, RepositoryError> {
        self.inner.insert_rental(rental)
    }

    fn fetch_rental(&self, id: &RentalId) -> Result<Option<RentalTracking>, RepositoryError> {
        self.inner.fetch_rental(id)
    }

    fn update_rental(&self, rental: RentalTracking) -> Result<(), RepositoryError> {
        self.inner.update_rental(rental)
    }

    fn delete_rental(&self, id: &RentalId) -> Result<(), RepositoryError> {
        self.inner.delete_rental(id)
    }

    fn active_rental_for_post(
        &self,
        post: &PostId,
    ) -> Result<Option<RentalTracking>, RepositoryError> {
        self.inner.active_rental_for_post(post)
    }

    fn active_rentals(&self) -> Result<Vec<RentalTracking>, RepositoryError> {
        self.inner.active_rentals()
    }

    fn rentals_for_user(&self, user: &UserId) -> Result<Vec<RentalTracking>, RepositoryError> {
        self.inner.rentals_for_user(user)
    }

    fn transition_return_status(
        &self,
        id: &RentalId,
        from: ReturnStatus,
        to: ReturnStatus,
    ) -> Result<bool, RepositoryError> {
        self.inner.transition_return_status(id, from, to)
    }

    fn claim_reminder_slot(
        &self,
        id: &RentalId,
        today: NaiveDate,
    ) -> Result<Option<ReminderClaim>, RepositoryError> {
        self.inner.claim_reminder_slot(id, today)
    }

    fn release_reminder_slot(
        &self,
        id: &RentalId,
        claim: ReminderClaim,
    ) -> Result<(), RepositoryError> {
        self.inner.release_reminder_slot(id, claim)
    }
}

impl NotificationRepository for FlakyStore {
    fn next_notification_id(&self) -> Result<NotificationId, RepositoryError> {
        self.inner.next_notification_id()
    }

    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError> {
        Self::check(&self.fail_notifications)?;
        self.inner.insert_notification(notification)
    }

    fn notifications_for(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.inner.notifications_for(recipient, unread_only)
    }

    fn unread_count(&self, recipient: &UserId) -> Result<usize, RepositoryError> {
        self.inner.unread_count(recipient)
    }

    fn mark_read(
        &self,
        recipient: &UserId,
        id: &NotificationId,
    ) -> Result<Notification, RepositoryError> {
        self.inner.mark_read(recipient, id)
    }

    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, RepositoryError> {
        self.inner.mark_all_read(recipient)
    }
}
