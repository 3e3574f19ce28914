use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{
    Availability, NotificationId, PostId, RentalId, ReportId, ReportStatus, RequestId,
    RequestKind, ReviewDecision, UserId,
};
use super::service::{RequestSubmission, VerificationWorkflowService, WorkflowError};
use crate::store::{EntityStore, RepositoryError};

/// Header carrying the identity resolved by the upstream authentication layer.
pub const CALLER_HEADER: &str = "x-user-id";

const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Authenticated caller of a transaction endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match caller {
            Some(id) => Ok(Self(UserId::new(id))),
            None => {
                let payload = json!({
                    "error": format!("missing {CALLER_HEADER} header"),
                });
                Err((StatusCode::UNAUTHORIZED, Json(payload)).into_response())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub kind: RequestKind,
    #[serde(default)]
    pub proof_images: Vec<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnProofBody {
    pub proof_images: Vec<String>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityBody {
    pub availability: Availability,
}

#[derive(Debug, Deserialize)]
pub struct ReportBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportStatusBody {
    pub status: ReportStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct InboxQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
}

/// Router builder exposing the transaction, inbox, and moderation endpoints.
pub fn transaction_router<S>(service: Arc<VerificationWorkflowService<S>>) -> Router
where
    S: EntityStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/posts/:post_id/requests",
            post(create_request_handler::<S>),
        )
        .route(
            "/api/v1/posts/:post_id/availability",
            put(set_availability_handler::<S>),
        )
        .route(
            "/api/v1/posts/:post_id/reports",
            post(file_report_handler::<S>),
        )
        .route(
            "/api/v1/rentals/:rental_id/return",
            post(return_proof_handler::<S>),
        )
        .route("/api/v1/rentals", get(rentals_handler::<S>))
        .route("/api/v1/notifications", get(notifications_handler::<S>))
        .route(
            "/api/v1/notifications/unread-count",
            get(unread_count_handler::<S>),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(mark_all_read_handler::<S>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(mark_read_handler::<S>),
        )
        .route("/api/v1/admin/requests", get(pending_requests_handler::<S>))
        .route(
            "/api/v1/admin/requests/:request_id/review",
            post(review_handler::<S>),
        )
        .route("/api/v1/admin/reports", get(reports_handler::<S>))
        .route(
            "/api/v1/admin/reports/:report_id",
            put(update_report_handler::<S>),
        )
        .with_state(service)
}

fn error_response(error: WorkflowError) -> Response {
    if let WorkflowError::Internal(source) = &error {
        error!(%source, "transaction workflow failed");
    }
    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (error.status_code(), Json(payload)).into_response()
}

pub(crate) async fn create_request_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(post_id): Path<String>,
    Json(body): Json<CreateRequestBody>,
) -> Response
where
    S: EntityStore + 'static,
{
    let submission = RequestSubmission {
        post_id: PostId::new(post_id),
        requester_id: caller,
        kind: body.kind,
        proof_images: body.proof_images,
        details: body.details,
    };

    match service.create_request(submission) {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn review_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(request_id): Path<String>,
    Json(body): Json<ReviewBody>,
) -> Response
where
    S: EntityStore + 'static,
{
    let request_id = RequestId::new(request_id);
    match service.review(&request_id, body.decision, &caller, body.notes) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn return_proof_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(rental_id): Path<String>,
    Json(body): Json<ReturnProofBody>,
) -> Response
where
    S: EntityStore + 'static,
{
    let rental_id = RentalId::new(rental_id);
    match service.submit_return_proof(&rental_id, &caller, body.proof_images, body.details) {
        Ok((request, rental)) => {
            let payload = json!({
                "request": request,
                "rental": rental,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn set_availability_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(post_id): Path<String>,
    Json(body): Json<AvailabilityBody>,
) -> Response
where
    S: EntityStore + 'static,
{
    let post_id = PostId::new(post_id);
    match service.set_availability(&post_id, &caller, body.availability) {
        Ok(post) => (StatusCode::OK, Json(post)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn file_report_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(post_id): Path<String>,
    Json(body): Json<ReportBody>,
) -> Response
where
    S: EntityStore + 'static,
{
    let post_id = PostId::new(post_id);
    match service.file_report(&post_id, &caller, &body.reason) {
        Ok(report) => (StatusCode::CREATED, Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn rentals_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.rentals_for_user(&caller) {
        Ok(rentals) => (StatusCode::OK, Json(rentals)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn notifications_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Query(query): Query<InboxQuery>,
) -> Response
where
    S: EntityStore + 'static,
{
    let dispatcher = service.dispatcher();
    let listing = dispatcher
        .list(&caller, query.unread_only)
        .and_then(|items| Ok((items, dispatcher.unread_count(&caller)?)));
    match listing {
        Ok((notifications, unread_count)) => {
            let payload = json!({
                "notifications": notifications,
                "unread_count": unread_count,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn unread_count_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.dispatcher().unread_count(&caller) {
        Ok(unread_count) => {
            (StatusCode::OK, Json(json!({ "unread_count": unread_count }))).into_response()
        }
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn mark_read_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(notification_id): Path<String>,
) -> Response
where
    S: EntityStore + 'static,
{
    let notification_id = NotificationId::new(notification_id);
    match service.dispatcher().mark_read(&caller, &notification_id) {
        Ok(notification) => (StatusCode::OK, Json(notification)).into_response(),
        Err(RepositoryError::NotFound) => error_response(WorkflowError::NotFound(format!(
            "notification {notification_id}"
        ))),
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn mark_all_read_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.dispatcher().mark_all_read(&caller) {
        Ok(updated) => (StatusCode::OK, Json(json!({ "updated": updated }))).into_response(),
        Err(error) => error_response(error.into()),
    }
}

pub(crate) async fn pending_requests_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Query(query): Query<QueueQuery>,
) -> Response
where
    S: EntityStore + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_QUEUE_LIMIT);
    match service.list_pending_requests(&caller, limit) {
        Ok(requests) => (StatusCode::OK, Json(requests)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reports_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Query(query): Query<ReportQuery>,
) -> Response
where
    S: EntityStore + 'static,
{
    match service.list_reports(&caller, query.status) {
        Ok(reports) => (StatusCode::OK, Json(reports)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_report_handler<S>(
    State(service): State<Arc<VerificationWorkflowService<S>>>,
    Caller(caller): Caller,
    Path(report_id): Path<String>,
    Json(body): Json<ReportStatusBody>,
) -> Response
where
    S: EntityStore + 'static,
{
    let report_id = ReportId::new(report_id);
    match service.update_report_status(&caller, &report_id, body.status) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}
