use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::domain::{OfferDraft, OfferId, OfferPatch};
use super::repository::OfferRepository;
use super::service::{OfferError, OfferService, TransitionReceipt};
use crate::workflows::approval::domain::{EmployeeId, TrackingId};
use crate::workflows::approval::repository::{TemplateRepository, TrackingRepository};
use crate::workflows::approval::router::{error_payload, repository_status};

type SharedService<T, R, O> = Arc<OfferService<T, R, O>>;

/// Router exposing offer drafting and the offer approval lifecycle.
pub fn offer_router<T, R, O>(service: SharedService<T, R, O>) -> Router
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    Router::new()
        .route("/api/v1/offers", post(create_handler::<T, R, O>))
        .route(
            "/api/v1/offers/:offer_id",
            get(get_handler::<T, R, O>).patch(update_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/history",
            get(history_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/submit",
            post(submit_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/approve",
            post(approve_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/reject",
            post(reject_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/return",
            post(return_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/cancel",
            post(cancel_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/withdraw",
            post(withdraw_handler::<T, R, O>),
        )
        .route(
            "/api/v1/offers/:offer_id/reconcile",
            post(reconcile_handler::<T, R, O>),
        )
        .route(
            "/api/v1/event-outbox/redeliver",
            post(redeliver_handler::<T, R, O>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActorRequest {
    pub(crate) actor_id: EmployeeId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StepRequest {
    pub(crate) tracking_id: TrackingId,
    pub(crate) actor_id: EmployeeId,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CloseRequest {
    pub(crate) actor_id: EmployeeId,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

impl OfferError {
    pub fn status(&self) -> StatusCode {
        match self {
            OfferError::NotFound(_) => StatusCode::NOT_FOUND,
            OfferError::InvalidOffer(_) => StatusCode::BAD_REQUEST,
            OfferError::InvalidStateTransition(_)
            | OfferError::NotEditable { .. }
            | OfferError::TrackingMismatch { .. }
            | OfferError::ConcurrentModification(_) => StatusCode::CONFLICT,
            OfferError::Forbidden { .. } => StatusCode::FORBIDDEN,
            OfferError::Approval(inner) => inner.status(),
            OfferError::Repository(inner) => repository_status(inner),
        }
    }
}

impl IntoResponse for OfferError {
    fn into_response(self) -> Response {
        error_payload(self.status(), self.code(), self.to_string())
    }
}

/// Run a lifecycle transition on the blocking pool. Event delivery retries
/// sleep between attempts and must not hold a runtime worker.
async fn transition<T, R, O, F>(service: SharedService<T, R, O>, op: F) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
    F: FnOnce(&OfferService<T, R, O>) -> Result<TransitionReceipt, OfferError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&service)).await {
        Ok(Ok(receipt)) => (StatusCode::OK, Json(receipt)).into_response(),
        Ok(Err(error)) => error.into_response(),
        Err(join_error) => {
            error!(error = %join_error, "offer transition task failed");
            error_payload(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                "offer transition did not complete".to_string(),
            )
        }
    }
}

pub(crate) async fn create_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Json(draft): Json<OfferDraft>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.create(draft) {
        Ok(offer) => (StatusCode::CREATED, Json(offer)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn get_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.get(OfferId(offer_id)) {
        Ok(offer) => (StatusCode::OK, Json(offer)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn update_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(patch): Json<OfferPatch>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.update_draft(OfferId(offer_id), patch) {
        Ok(offer) => (StatusCode::OK, Json(offer)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn history_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    match service.history(OfferId(offer_id)) {
        Ok(rounds) => {
            let payload = json!({
                "offer_id": offer_id,
                "rounds": rounds,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn submit_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(request): Json<ActorRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| {
        offers.submit(OfferId(offer_id), &request.actor_id)
    })
    .await
}

pub(crate) async fn approve_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(request): Json<StepRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| {
        offers.approve_step(
            OfferId(offer_id),
            request.tracking_id,
            &request.actor_id,
            request.notes,
        )
    })
    .await
}

pub(crate) async fn reject_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(request): Json<StepRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| {
        offers.reject_step(
            OfferId(offer_id),
            request.tracking_id,
            &request.actor_id,
            request.notes,
        )
    })
    .await
}

pub(crate) async fn return_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(request): Json<StepRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| {
        offers.return_for_edit(
            OfferId(offer_id),
            request.tracking_id,
            &request.actor_id,
            request.notes,
        )
    })
    .await
}

pub(crate) async fn cancel_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(request): Json<CloseRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| {
        offers.cancel(OfferId(offer_id), &request.actor_id, request.reason)
    })
    .await
}

pub(crate) async fn withdraw_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
    Json(request): Json<CloseRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| {
        offers.withdraw(OfferId(offer_id), &request.actor_id, request.reason)
    })
    .await
}

pub(crate) async fn reconcile_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
    Path(offer_id): Path<u64>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    transition(service, move |offers| offers.reconcile(OfferId(offer_id))).await
}

pub(crate) async fn redeliver_handler<T, R, O>(
    State(service): State<SharedService<T, R, O>>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    let report = service.redeliver_outbox();
    (StatusCode::OK, Json(report)).into_response()
}
