use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;
use serde_json::Value;

use crate::config::EventDeliveryConfig;
use crate::workflows::approval::domain::{
    ApplyConditions, DepartmentId, EmployeeId, LevelId, NewWorkflowTemplate, PositionId,
    RequestType, StepDefinition,
};
use crate::workflows::approval::{
    ApprovalTrackingEngine, InMemoryTemplateRepository, InMemoryTrackingRepository,
    StaticDirectory, WorkflowDefinitionStore,
};
use crate::workflows::offer::{
    CandidateId, InMemoryEventChannel, InMemoryOfferRepository, OfferDraft, OfferService,
    RetryingPublisher,
};

pub(super) type TestOfferService =
    OfferService<InMemoryTemplateRepository, InMemoryTrackingRepository, InMemoryOfferRepository>;

pub(super) const REQUESTER: &str = "recruiter-1";
pub(super) const OWNER: &str = "hiring-manager-1";
pub(super) const HEAD: &str = "emp-p1-dept5";
pub(super) const HR_DIRECTOR: &str = "emp-p2-dept5";

pub(super) fn employee(value: &str) -> EmployeeId {
    EmployeeId(value.to_string())
}

pub(super) fn draft(level: &str) -> OfferDraft {
    OfferDraft {
        candidate_id: CandidateId("cand-42".to_string()),
        position_id: PositionId("backend-engineer".to_string()),
        department_id: DepartmentId("5".to_string()),
        level_id: LevelId(level.to_string()),
        salary: 9_500_000,
        currency: "EUR".to_string(),
        start_date: None,
        requester_id: employee(REQUESTER),
        owner_id: Some(employee(OWNER)),
        workflow_template_id: None,
    }
}

fn step(order: u32, name: &str, position: &str) -> StepDefinition {
    StepDefinition {
        step_order: order,
        step_name: name.to_string(),
        required_approver_position: PositionId(position.to_string()),
    }
}

fn offer_template() -> NewWorkflowTemplate {
    NewWorkflowTemplate {
        name: "Engineering offers / level 2".to_string(),
        description: None,
        request_type: RequestType::Offer,
        apply_conditions: ApplyConditions {
            department_id: Some(DepartmentId("5".to_string())),
            level_id: Some(LevelId("2".to_string())),
        },
        steps: vec![
            step(1, "Department head review", "P1"),
            step(2, "HR director sign-off", "P2"),
        ],
    }
}

pub(super) struct OfferHarness {
    pub(super) service: Arc<TestOfferService>,
    pub(super) channel: Arc<InMemoryEventChannel>,
}

pub(super) fn offer_harness() -> OfferHarness {
    offer_harness_with(EventDeliveryConfig {
        max_attempts: 2,
        initial_backoff: Duration::ZERO,
    })
}

pub(super) fn offer_harness_with(delivery: EventDeliveryConfig) -> OfferHarness {
    let definitions = Arc::new(WorkflowDefinitionStore::new(Arc::new(
        InMemoryTemplateRepository::default(),
    )));
    definitions
        .create_template(offer_template())
        .expect("template created");

    let directory = StaticDirectory::new()
        .with_assignment("P1", Some("5"), HEAD)
        .with_assignment("P2", Some("5"), HR_DIRECTOR);
    let engine = Arc::new(ApprovalTrackingEngine::new(
        definitions,
        Arc::new(InMemoryTrackingRepository::default()),
        Arc::new(directory),
    ));

    let channel = Arc::new(InMemoryEventChannel::default());
    let publisher = Arc::new(RetryingPublisher::new(channel.clone(), delivery));
    let service = Arc::new(OfferService::new(
        Arc::new(InMemoryOfferRepository::default()),
        engine,
        publisher,
    ));

    OfferHarness { service, channel }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
