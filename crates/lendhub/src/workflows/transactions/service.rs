use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError};

use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, warn};

use super::availability::{accepts_requests, transition, AvailabilityTrigger, IllegalTransition};
use super::directory::UserDirectory;
use super::domain::{
    Availability, Post, PostId, RentalDuration, RentalId,
    RentalTracking, RequestId, RequestKind, RequestType, ReturnPayload, ReturnStatus,
    ReviewDecision, ReviewRecord, UserId, VerificationRequest, VerificationStatus,
};
use super::locks::PostLocks;
use crate::notifications::{NotificationDispatcher, NotificationPayload, NotificationType};
use crate::store::{EntityStore, RepositoryError};

/// Proposed transaction as submitted by an end user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSubmission {
    pub post_id: PostId,
    pub requester_id: UserId,
    pub kind: RequestKind,
    pub proof_images: Vec<String>,
    pub details: Option<String>,
}

/// Result of a successful review, including the side effects that were applied.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ReviewOutcome {
    pub request: VerificationRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rental: Option<RentalTracking>,
}

/// Error raised by the transaction workflows.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("internal error: {0}")]
    Internal(#[source] RepositoryError),
}

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Conflicts are the expected outcome of races; callers refresh and retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StateConflict(_))
    }
}

impl From<RepositoryError> for WorkflowError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound("record".to_string()),
            RepositoryError::Conflict => {
                Self::StateConflict("record was modified concurrently".to_string())
            }
            other @ RepositoryError::Unavailable(_) => Self::Internal(other),
        }
    }
}

impl From<IllegalTransition> for WorkflowError {
    fn from(value: IllegalTransition) -> Self {
        Self::StateConflict(value.to_string())
    }
}

/// Writes to revert when a later step of the same transition fails.
#[derive(Debug)]
enum Compensation {
    RestorePost(Post),
    DeleteRental(RentalId),
    RestoreRental(RentalTracking),
    RevertReturnStatus {
        rental: RentalId,
        from: ReturnStatus,
        to: ReturnStatus,
    },
}

/// Verification Workflow Engine: request intake, administrator review, and return proofs.
pub struct VerificationWorkflowService<S> {
    pub(super) store: Arc<S>,
    pub(super) dispatcher: Arc<NotificationDispatcher>,
    pub(super) directory: Arc<dyn UserDirectory>,
    pub(super) locks: PostLocks,
}

impl<S> VerificationWorkflowService<S>
where
    S: EntityStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        dispatcher: Arc<NotificationDispatcher>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            directory,
            locks: PostLocks::default(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Validate and persist a pending request, then alert the counterpart.
    pub fn create_request(
        &self,
        submission: RequestSubmission,
    ) -> Result<VerificationRequest, WorkflowError> {
        let request_type = submission.kind.request_type();

        let (post, stored) = {
            let slot = self.locks.slot(&submission.post_id);
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

            let post = self.live_post(&submission.post_id)?;
            if !accepts_requests(post.availability, request_type) {
                return Err(WorkflowError::StateConflict(format!(
                    "post is {} and only accepts return requests",
                    post.availability.label()
                )));
            }
            if request_type != RequestType::Return && post.author_id == submission.requester_id {
                return Err(WorkflowError::Validation(
                    "authors cannot request their own post".to_string(),
                ));
            }
            self.validate_kind(&post, &submission)?;

            let request = VerificationRequest {
                id: self.store.next_request_id()?,
                post_id: submission.post_id,
                requester_id: submission.requester_id,
                kind: submission.kind,
                proof_images: submission.proof_images,
                details: submission.details,
                status: VerificationStatus::Pending,
                admin_notes: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: Utc::now(),
            };
            let stored = self.store.insert_request(request)?;
            (post, stored)
        };

        info!(
            request_id = %stored.id,
            post_id = %stored.post_id,
            kind = request_type.label(),
            "verification request created"
        );

        let payload = NotificationPayload::new(
            NotificationType::VerificationPending,
            "New verification request",
            format!(
                "A {} request was submitted for \"{}\".",
                request_type.label(),
                post.title
            ),
        )
        .with_post(&post.id)
        .with_user(&stored.requester_id)
        .with_request(&stored.id);

        match request_type {
            RequestType::Claim => {}
            RequestType::Return => self.notify_administrators(&payload),
            _ => self.notify(&post.author_id, payload),
        }

        Ok(stored)
    }

    /// Apply an administrator decision exactly once, with the side effects of its request type.
    pub fn review(
        &self,
        request_id: &RequestId,
        decision: ReviewDecision,
        admin_id: &UserId,
        notes: Option<String>,
    ) -> Result<ReviewOutcome, WorkflowError> {
        self.ensure_administrator(admin_id)?;

        let post_id = self
            .store
            .fetch_request(request_id)?
            .map(|request| request.post_id)
            .ok_or_else(|| WorkflowError::NotFound(format!("request {request_id}")))?;

        let (outcome, post) = {
            let slot = self.locks.slot(&post_id);
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

            let request = self
                .store
                .fetch_request(request_id)?
                .ok_or_else(|| WorkflowError::NotFound(format!("request {request_id}")))?;
            if !request.is_pending() {
                return Err(WorkflowError::StateConflict(format!(
                    "request {request_id} was already {}",
                    request.status.label()
                )));
            }

            let post = self
                .store
                .fetch_post(&request.post_id)?
                .ok_or_else(|| WorkflowError::NotFound(format!("post {}", request.post_id)))?;

            let review = ReviewRecord {
                status: decision.status(),
                admin_notes: notes.filter(|value| !value.trim().is_empty()),
                reviewed_by: admin_id.clone(),
                reviewed_at: Utc::now(),
            };

            let outcome = match decision {
                ReviewDecision::Rejected => ReviewOutcome {
                    request: self.store.record_review(request_id, review)?,
                    availability: None,
                    rental: None,
                },
                ReviewDecision::Approved => self.apply_approval(&request, &post, review)?,
            };
            (outcome, post)
        };

        let request = &outcome.request;
        info!(
            request_id = %request.id,
            post_id = %request.post_id,
            kind = request.request_type().label(),
            decision = request.status.label(),
            reviewer = %admin_id,
            "verification request reviewed"
        );

        self.notify_requester(request, &post);
        if decision == ReviewDecision::Approved && request.request_type().transfers_item() {
            self.notify_item_unavailable(request, &post);
        }

        Ok(outcome)
    }

    /// Record the renter's return proof and open a `return` request for administrators.
    pub fn submit_return_proof(
        &self,
        rental_id: &RentalId,
        renter_id: &UserId,
        proof_images: Vec<String>,
        details: Option<String>,
    ) -> Result<(VerificationRequest, RentalTracking), WorkflowError> {
        let rental = self
            .store
            .fetch_rental(rental_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("rental {rental_id}")))?;
        if &rental.renter_id != renter_id {
            return Err(WorkflowError::Unauthorized(format!(
                "rental {rental_id} does not belong to {renter_id}"
            )));
        }
        let proof_images: Vec<String> = proof_images
            .into_iter()
            .filter(|image| !image.trim().is_empty())
            .collect();
        if proof_images.is_empty() {
            return Err(WorkflowError::Validation(
                "return proof requires at least one image".to_string(),
            ));
        }

        let (request, rental, post) = {
            let slot = self.locks.slot(&rental.post_id);
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);

            let before = self
                .store
                .fetch_rental(rental_id)?
                .ok_or_else(|| WorkflowError::NotFound(format!("rental {rental_id}")))?;
            self.ensure_return_open(&before)?;
            let post = self.live_post(&before.post_id)?;

            let moved = self.store.transition_return_status(
                rental_id,
                before.return_status,
                ReturnStatus::ReturnedPending,
            )?;
            if !moved {
                return Err(WorkflowError::StateConflict(format!(
                    "rental {rental_id} changed while its return was being submitted"
                )));
            }
            let undo = vec![Compensation::RevertReturnStatus {
                rental: rental_id.clone(),
                from: ReturnStatus::ReturnedPending,
                to: before.return_status,
            }];

            let request = self.store.next_request_id().and_then(|id| {
                self.store.insert_request(VerificationRequest {
                    id,
                    post_id: before.post_id.clone(),
                    requester_id: renter_id.clone(),
                    kind: RequestKind::Return(ReturnPayload {
                        rental_tracking_id: Some(rental_id.clone()),
                    }),
                    proof_images,
                    details,
                    status: VerificationStatus::Pending,
                    admin_notes: None,
                    reviewed_by: None,
                    reviewed_at: None,
                    created_at: Utc::now(),
                })
            });
            let request = match request {
                Ok(request) => request,
                Err(error) => {
                    self.rollback(undo);
                    return Err(error.into());
                }
            };
            let updated = self
                .store
                .fetch_rental(rental_id)?
                .ok_or_else(|| WorkflowError::NotFound(format!("rental {rental_id}")))?;
            (request, updated, post)
        };

        info!(
            request_id = %request.id,
            rental_id = %rental.id,
            "return proof submitted"
        );

        let payload = NotificationPayload::new(
            NotificationType::VerificationPending,
            "Return awaiting verification",
            format!("A return was submitted for \"{}\".", post.title),
        )
        .with_post(&post.id)
        .with_user(renter_id)
        .with_request(&request.id);
        self.notify_administrators(&payload);

        Ok((request, rental))
    }

    fn apply_approval(
        &self,
        request: &VerificationRequest,
        post: &Post,
        review: ReviewRecord,
    ) -> Result<ReviewOutcome, WorkflowError> {
        let mut undo = Vec::new();
        let mut rental = None;

        let next = match &request.kind {
            RequestKind::Rent(duration) => {
                let next = transition(post.availability, AvailabilityTrigger::ApproveRent)?;
                let tracking = self.new_rental(request, post, duration)?;
                let stored = self.store.insert_rental(tracking).map_err(|error| match error {
                    RepositoryError::Conflict => WorkflowError::StateConflict(format!(
                        "post {} already has an active rental",
                        post.id
                    )),
                    other => other.into(),
                })?;
                undo.push(Compensation::DeleteRental(stored.id.clone()));
                rental = Some(stored);
                next
            }
            RequestKind::Return(_) => {
                let active = self.store.active_rental_for_post(&post.id)?;
                let trigger =
                    AvailabilityTrigger::for_approval(RequestType::Return, active.is_some());
                let next = transition(post.availability, trigger)?;
                if let Some(before) = active {
                    let mut completed = before.clone();
                    completed.return_status = ReturnStatus::ReturnedVerified;
                    completed.is_completed = true;
                    self.store.update_rental(completed.clone())?;
                    undo.push(Compensation::RestoreRental(before));
                    rental = Some(completed);
                }
                next
            }
            other => {
                if let Some(active) = self.store.active_rental_for_post(&post.id)? {
                    return Err(WorkflowError::StateConflict(format!(
                        "post {} has active rental {}; approve its return first",
                        post.id, active.id
                    )));
                }
                transition(
                    post.availability,
                    AvailabilityTrigger::for_approval(other.request_type(), false),
                )?
            }
        };

        let mut updated = post.clone();
        updated.availability = next;
        if let Err(error) = self.store.update_post(updated) {
            self.rollback(undo);
            return Err(error.into());
        }
        undo.push(Compensation::RestorePost(post.clone()));

        match self.store.record_review(&request.id, review) {
            Ok(request) => Ok(ReviewOutcome {
                request,
                availability: Some(next),
                rental,
            }),
            Err(error) => {
                self.rollback(undo);
                Err(error.into())
            }
        }
    }

    fn new_rental(
        &self,
        request: &VerificationRequest,
        post: &Post,
        duration: &RentalDuration,
    ) -> Result<RentalTracking, WorkflowError> {
        Ok(RentalTracking {
            id: self.store.next_rental_id()?,
            verification_request_id: request.id.clone(),
            post_id: post.id.clone(),
            renter_id: request.requester_id.clone(),
            owner_id: post.author_id.clone(),
            start_date: duration.start,
            end_date: duration.end,
            duration_in_days: duration.days,
            return_status: ReturnStatus::Active,
            last_notification_sent: None,
            is_completed: false,
        })
    }

    fn rollback(&self, undo: Vec<Compensation>) {
        for step in undo.into_iter().rev() {
            let result = match &step {
                Compensation::RestorePost(post) => self.store.update_post(post.clone()),
                Compensation::DeleteRental(id) => self.store.delete_rental(id),
                Compensation::RestoreRental(rental) => self.store.update_rental(rental.clone()),
                Compensation::RevertReturnStatus { rental, from, to } => self
                    .store
                    .transition_return_status(rental, *from, *to)
                    .map(|_| ()),
            };
            if let Err(error) = result {
                warn!(?step, %error, "compensating write failed");
            }
        }
    }

    fn validate_kind(
        &self,
        post: &Post,
        submission: &RequestSubmission,
    ) -> Result<(), WorkflowError> {
        match &submission.kind {
            RequestKind::Rent(duration) => {
                let span = duration.span_days();
                if span <= 0 {
                    return Err(WorkflowError::Validation(
                        "rental end date must be after its start date".to_string(),
                    ));
                }
                if i64::from(duration.days) != span {
                    return Err(WorkflowError::Validation(format!(
                        "rental duration of {} days does not match the {span} day range",
                        duration.days
                    )));
                }
            }
            RequestKind::Claim(claim) => {
                if claim.ownership_proof.trim().is_empty() {
                    return Err(WorkflowError::Validation(
                        "claims require ownership proof".to_string(),
                    ));
                }
            }
            RequestKind::Return(ReturnPayload {
                rental_tracking_id: Some(rental_id),
            }) => {
                let rental = self.store.fetch_rental(rental_id)?;
                if !rental.is_some_and(|rental| rental.post_id == post.id) {
                    return Err(WorkflowError::Validation(format!(
                        "rental {rental_id} does not belong to post {}",
                        post.id
                    )));
                }
            }
            RequestKind::Return(_)
            | RequestKind::Borrow
            | RequestKind::Swap
            | RequestKind::Purchase => {}
        }
        Ok(())
    }

    pub(super) fn live_post(&self, post_id: &PostId) -> Result<Post, WorkflowError> {
        self.store
            .fetch_post(post_id)?
            .filter(|post| !post.deleted)
            .ok_or_else(|| WorkflowError::NotFound(format!("post {post_id}")))
    }

    /// A rental accepts return proof while active or overdue, or again after its last return
    /// was rejected.
    fn ensure_return_open(&self, rental: &RentalTracking) -> Result<(), WorkflowError> {
        let open = match rental.return_status {
            _ if rental.is_completed => false,
            ReturnStatus::Active | ReturnStatus::Overdue => true,
            ReturnStatus::ReturnedPending => self
                .store
                .pending_return_for_rental(&rental.id)?
                .is_none(),
            ReturnStatus::ReturnedVerified => false,
        };
        if open {
            Ok(())
        } else {
            Err(WorkflowError::StateConflict(format!(
                "rental {} is {}",
                rental.id,
                rental.return_status.label()
            )))
        }
    }

    pub(super) fn ensure_administrator(&self, user: &UserId) -> Result<(), WorkflowError> {
        if self.directory.is_administrator(user) {
            Ok(())
        } else {
            Err(WorkflowError::Unauthorized(format!(
                "{user} is not an administrator"
            )))
        }
    }

    fn notify(&self, recipient: &UserId, payload: NotificationPayload) {
        let kind = payload.notification_type.label();
        if let Err(error) = self.dispatcher.notify(recipient, payload) {
            warn!(recipient = %recipient, kind, %error, "notification dropped");
        }
    }

    fn notify_administrators(&self, payload: &NotificationPayload) {
        let administrators = self.directory.administrators();
        self.dispatcher.notify_many(&administrators, payload);
    }

    fn notify_requester(&self, request: &VerificationRequest, post: &Post) {
        let (notification_type, title, verdict) = match request.status {
            VerificationStatus::Approved => (
                NotificationType::VerificationApproved,
                "Request approved",
                "approved",
            ),
            _ => (
                NotificationType::VerificationRejected,
                "Request rejected",
                "rejected",
            ),
        };
        let mut message = format!(
            "Your {} request for \"{}\" was {verdict}.",
            request.request_type().label(),
            post.title
        );
        if let Some(notes) = &request.admin_notes {
            message.push_str(&format!(" Notes: {notes}"));
        }

        let payload = NotificationPayload::new(notification_type, title, message)
            .with_post(&post.id)
            .with_request(&request.id);
        self.notify(&request.requester_id, payload);
    }

    fn notify_item_unavailable(&self, request: &VerificationRequest, post: &Post) {
        let recipients: BTreeSet<UserId> = self
            .directory
            .conversation_participants(&post.id)
            .into_iter()
            .filter(|user| user != &request.requester_id && user != &post.author_id)
            .collect();
        if recipients.is_empty() {
            return;
        }

        let payload = NotificationPayload::new(
            NotificationType::ItemUnavailable,
            "Item no longer available",
            format!("\"{}\" is no longer available.", post.title),
        )
        .with_post(&post.id);
        let delivered = self.dispatcher.notify_many(&recipients, &payload);
        info!(post_id = %post.id, delivered, "item unavailable fan-out sent");
    }
}
