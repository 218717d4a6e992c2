use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::definitions::DefinitionError;
use super::domain::{
    EmployeeId, MatchScope, NewWorkflowTemplate, RequestId, TemplatePatch, TrackingId,
    WorkflowProgress, WorkflowTemplateId,
};
use super::engine::{ApprovalError, ApprovalTrackingEngine};
use super::repository::{RepositoryError, TemplateRepository, TrackingRepository};

type SharedEngine<T, R> = Arc<ApprovalTrackingEngine<T, R>>;

/// Router exposing the approval inbox, audit trail, decisions, and template administration.
pub fn approval_router<T, R>(engine: SharedEngine<T, R>) -> Router
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/approvals/requests/:request_id/history",
            get(history_handler::<T, R>),
        )
        .route(
            "/api/v1/approvals/inbox/:approver_id",
            get(inbox_handler::<T, R>),
        )
        .route(
            "/api/v1/approvals/tracking/:tracking_id/decision",
            post(decision_handler::<T, R>),
        )
        .route(
            "/api/v1/workflow-templates",
            post(create_template_handler::<T, R>).get(list_templates_handler::<T, R>),
        )
        .route(
            "/api/v1/workflow-templates/match",
            post(match_template_handler::<T, R>),
        )
        .route(
            "/api/v1/workflow-templates/:template_id",
            get(get_template_handler::<T, R>)
                .patch(update_template_handler::<T, R>)
                .delete(deactivate_template_handler::<T, R>),
        )
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub(crate) actor_id: EmployeeId,
    pub(crate) approved: bool,
    #[serde(default)]
    pub(crate) notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListTemplatesQuery {
    #[serde(default)]
    pub(crate) include_inactive: bool,
}

pub(crate) fn error_payload(status: StatusCode, code: &str, message: String) -> Response {
    let payload = json!({
        "code": code,
        "error": message,
    });
    (status, Json(payload)).into_response()
}

pub(crate) fn repository_status(error: &RepositoryError) -> StatusCode {
    match error {
        RepositoryError::Conflict | RepositoryError::VersionConflict => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl DefinitionError {
    pub fn status(&self) -> StatusCode {
        match self {
            DefinitionError::DuplicateName { .. } => StatusCode::CONFLICT,
            DefinitionError::NotFound(_) => StatusCode::NOT_FOUND,
            DefinitionError::InvalidTemplate(_) => StatusCode::BAD_REQUEST,
            DefinitionError::NoMatchingWorkflow { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DefinitionError::Repository(inner) => repository_status(inner),
        }
    }
}

impl ApprovalError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApprovalError::Definition(inner) => inner.status(),
            ApprovalError::EmptyWorkflow { .. } | ApprovalError::NoApproverFound { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApprovalError::AlreadyInitialized { .. } | ApprovalError::AlreadyDecided { .. } => {
                StatusCode::CONFLICT
            }
            ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
            ApprovalError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApprovalError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApprovalError::Repository(inner) => repository_status(inner),
        }
    }
}

impl IntoResponse for DefinitionError {
    fn into_response(self) -> Response {
        error_payload(self.status(), self.code(), self.to_string())
    }
}

impl IntoResponse for ApprovalError {
    fn into_response(self) -> Response {
        error_payload(self.status(), self.code(), self.to_string())
    }
}

pub(crate) async fn history_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Path(request_id): Path<String>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    let request_id = RequestId(request_id);
    let history = match engine.get_history(&request_id) {
        Ok(history) => history,
        Err(error) => return error.into_response(),
    };
    let progress = WorkflowProgress::derive(&history);

    let payload = json!({
        "request_id": request_id,
        "progress": progress,
        "history": history,
    });
    (StatusCode::OK, Json(payload)).into_response()
}

pub(crate) async fn inbox_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Path(approver_id): Path<String>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    let approver_id = EmployeeId(approver_id);
    match engine.list_pending_for(&approver_id) {
        Ok(pending) => {
            let payload = json!({
                "approver_id": approver_id,
                "pending": pending,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn decision_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Path(tracking_id): Path<u64>,
    Json(request): Json<DecisionRequest>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    let DecisionRequest {
        actor_id,
        approved,
        notes,
    } = request;

    match engine.decide(TrackingId(tracking_id), &actor_id, approved, notes) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn create_template_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Json(template): Json<NewWorkflowTemplate>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    match engine.definitions().create_template(template) {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn list_templates_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Query(query): Query<ListTemplatesQuery>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    match engine.definitions().list_templates(query.include_inactive) {
        Ok(templates) => (StatusCode::OK, Json(templates)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn get_template_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Path(template_id): Path<u64>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    match engine
        .definitions()
        .get_template(WorkflowTemplateId(template_id))
    {
        Ok(template) => (StatusCode::OK, Json(template)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn update_template_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Path(template_id): Path<u64>,
    Json(patch): Json<TemplatePatch>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    match engine
        .definitions()
        .update_template(WorkflowTemplateId(template_id), patch)
    {
        Ok(template) => (StatusCode::OK, Json(template)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn deactivate_template_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Path(template_id): Path<u64>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    match engine
        .definitions()
        .deactivate(WorkflowTemplateId(template_id))
    {
        Ok(template) => (StatusCode::OK, Json(template)).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn match_template_handler<T, R>(
    State(engine): State<SharedEngine<T, R>>,
    Json(scope): Json<MatchScope>,
) -> Response
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
{
    match engine.definitions().find_matching(&scope) {
        Ok(template) => (StatusCode::OK, Json(template)).into_response(),
        Err(error) => error.into_response(),
    }
}
