use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use futures::stream::{self, Stream, StreamExt};
use lendhub::notifications::{ChannelId, DeliveryChannel, LiveEvent, PresenceRegistry};
use lendhub::store::EntityStore;
use lendhub::workflows::transactions::router::Caller;
use lendhub::workflows::transactions::{transaction_router, UserId, VerificationWorkflowService};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error};

pub(crate) fn with_transaction_routes<S>(
    service: Arc<VerificationWorkflowService<S>>,
) -> axum::Router
where
    S: EntityStore + 'static,
{
    transaction_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/notifications/stream",
            axum::routing::get(notification_stream).delete(disconnect_live_stream),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let online = state.dispatcher.presence().online_count();
    let payload = if ready {
        json!({ "status": "ready", "live_connections": online })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Registration of one live connection; dropping it releases the presence entry.
struct LiveSubscription {
    presence: Arc<dyn PresenceRegistry>,
    user: UserId,
    channel: ChannelId,
    receiver: UnboundedReceiver<LiveEvent>,
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        if self.presence.release(&self.user, self.channel) {
            debug!(user = %self.user, "live connection closed");
        }
    }
}

fn sse_event(event: &LiveEvent) -> Result<Event, axum::Error> {
    let name = match event {
        LiveEvent::Notification { .. } => "notification",
        LiveEvent::UnreadCount { .. } => "unread_count",
    };
    Event::default().event(name).json_data(event)
}

fn live_events(
    subscription: LiveSubscription,
    unread_count: usize,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    let greeting = stream::once(async move { sse_event(&LiveEvent::UnreadCount { unread_count }) });
    let updates = stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.receiver.recv().await?;
        Some((sse_event(&event), subscription))
    });
    greeting.chain(updates)
}

/// Server-sent event stream of notifications and unread counts for the caller.
pub(crate) async fn notification_stream(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
) -> Response {
    let unread_count = match state.dispatcher.unread_count(&user) {
        Ok(count) => count,
        Err(err) => {
            error!(user = %user, error = %err, "unable to open live stream");
            let payload = json!({ "error": err.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response();
        }
    };

    let presence = state.dispatcher.presence().clone();
    let (channel, receiver) = DeliveryChannel::open();
    let channel_id = channel.id();
    presence.register(user.clone(), channel);
    debug!(user = %user, "live connection opened");

    let subscription = LiveSubscription {
        presence,
        user,
        channel: channel_id,
        receiver,
    };
    Sse::new(live_events(subscription, unread_count))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Drop the caller's live channel; its open stream ends and later notifications are only
/// persisted.
pub(crate) async fn disconnect_live_stream(
    Extension(state): Extension<AppState>,
    Caller(user): Caller,
) -> StatusCode {
    state.dispatcher.presence().unregister(&user);
    debug!(user = %user, "live connection unregistered");
    StatusCode::NO_CONTENT
}
