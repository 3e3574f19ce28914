//! Entity Store contracts consumed by the transaction workflows.
//!
//! Every method is atomic on its own. Multi-record transitions are sequenced by the workflow
//! service, which holds the per-post lock and compensates earlier writes when a later one fails.
//!
//! Identifiers are allocated by the store so a durable backend can hand out ids from its own
//! sequences and never reissue one that survived a restart.

mod memory;

pub use memory::InMemoryEntityStore;

use chrono::NaiveDate;

use crate::notifications::Notification;
use crate::workflows::transactions::domain::{
    NotificationId, Post, PostId, RentalId, RentalTracking, ReportId, RequestId,
    ReturnStatus, ReviewRecord, UserId, VerificationRequest,
};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or violates a uniqueness constraint")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub trait PostRepository: Send + Sync {
    fn next_report_id(&self) -> Result<ReportId, RepositoryError>;
    fn insert_post(&self, post: Post) -> Result<Post, RepositoryError>;
    fn fetch_post(&self, id: &PostId) -> Result<Option<Post>, RepositoryError>;
    fn update_post(&self, post: Post) -> Result<(), RepositoryError>;
    /// Posts carrying at least one report, in id order.
    fn reported_posts(&self) -> Result<Vec<Post>, RepositoryError>;
    fn post_for_report(&self, report: &ReportId) -> Result<Option<Post>, RepositoryError>;
}

pub trait VerificationRepository: Send + Sync {
    fn next_request_id(&self) -> Result<RequestId, RepositoryError>;
    fn insert_request(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationRequest, RepositoryError>;
    fn fetch_request(&self, id: &RequestId) -> Result<Option<VerificationRequest>, RepositoryError>;
    /// Oldest pending requests first.
    fn pending_requests(&self, limit: usize) -> Result<Vec<VerificationRequest>, RepositoryError>;
    /// Pending `return` request that references `rental`, if any.
    fn pending_return_for_rental(
        &self,
        rental: &RentalId,
    ) -> Result<Option<VerificationRequest>, RepositoryError>;
    /// Apply the review fields while the request is still pending; `Conflict` otherwise.
    fn record_review(
        &self,
        id: &RequestId,
        review: ReviewRecord,
    ) -> Result<VerificationRequest, RepositoryError>;
}

/// Outcome of a successful reminder-slot claim, kept so the slot can be handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderClaim {
    pub previous: Option<NaiveDate>,
    pub claimed: NaiveDate,
}

pub trait RentalRepository: Send + Sync {
    fn next_rental_id(&self) -> Result<RentalId, RepositoryError>;
    /// Insert a rental; `Conflict` when the post already has a non-completed rental.
    fn insert_rental(&self, rental: RentalTracking) -> Result<RentalTracking, RepositoryError>;
    fn fetch_rental(&self, id: &RentalId) -> Result<Option<RentalTracking>, RepositoryError>;
    fn update_rental(&self, rental: RentalTracking) -> Result<(), RepositoryError>;
    fn delete_rental(&self, id: &RentalId) -> Result<(), RepositoryError>;
    fn active_rental_for_post(
        &self,
        post: &PostId,
    ) -> Result<Option<RentalTracking>, RepositoryError>;
    /// Rentals with `is_completed == false`.
    fn active_rentals(&self) -> Result<Vec<RentalTracking>, RepositoryError>;
    fn rentals_for_user(&self, user: &UserId) -> Result<Vec<RentalTracking>, RepositoryError>;
    /// Compare-and-set of `return_status` on a non-completed rental; `false` when it no longer
    /// matches `from`.
    fn transition_return_status(
        &self,
        id: &RentalId,
        from: ReturnStatus,
        to: ReturnStatus,
    ) -> Result<bool, RepositoryError>;
    /// Set `last_notification_sent = today` on an `active`, non-completed rental unless it
    /// already equals `today`.
    fn claim_reminder_slot(
        &self,
        id: &RentalId,
        today: NaiveDate,
    ) -> Result<Option<ReminderClaim>, RepositoryError>;
    /// Undo a claim whose notification could not be persisted.
    fn release_reminder_slot(
        &self,
        id: &RentalId,
        claim: ReminderClaim,
    ) -> Result<(), RepositoryError>;
}

pub trait NotificationRepository: Send + Sync {
    fn next_notification_id(&self) -> Result<NotificationId, RepositoryError>;
    fn insert_notification(
        &self,
        notification: Notification,
    ) -> Result<Notification, RepositoryError>;
    /// Newest first.
    fn notifications_for(
        &self,
        recipient: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;
    /// Counted from persisted rows on every call.
    fn unread_count(&self, recipient: &UserId) -> Result<usize, RepositoryError>;
    /// `NotFound` unless the notification exists and belongs to `recipient`.
    fn mark_read(
        &self,
        recipient: &UserId,
        id: &NotificationId,
    ) -> Result<Notification, RepositoryError>;
    fn mark_all_read(&self, recipient: &UserId) -> Result<usize, RepositoryError>;
}

/// Storage abstraction so the services can be exercised in isolation.
pub trait EntityStore:
    PostRepository + VerificationRepository + RentalRepository + NotificationRepository
{
}

impl<T> EntityStore for T where
    T: PostRepository + VerificationRepository + RentalRepository + NotificationRepository
{
}
