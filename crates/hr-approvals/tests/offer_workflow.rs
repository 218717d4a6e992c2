use std::sync::Arc;
use std::time::Duration;

use hr_approvals::config::EventDeliveryConfig;
use hr_approvals::workflows::approval::{
    ApplyConditions, ApprovalTrackingEngine, DepartmentId, EmployeeId, InMemoryTemplateRepository,
    InMemoryTrackingRepository, LevelId, NewWorkflowTemplate, PositionId, RequestType,
    StaticDirectory, StepDefinition, TrackingStatus, WorkflowDefinitionStore, WorkflowProgress,
};
use hr_approvals::workflows::offer::{
    CandidateId, EventType, InMemoryEventChannel, InMemoryOfferRepository, OfferDraft, OfferError,
    OfferPatch, OfferService, RequestStatus, RetryingPublisher,
};

type Offers =
    OfferService<InMemoryTemplateRepository, InMemoryTrackingRepository, InMemoryOfferRepository>;

fn employee(value: &str) -> EmployeeId {
    EmployeeId(value.to_string())
}

fn step(order: u32, name: &str, position: &str) -> StepDefinition {
    StepDefinition {
        step_order: order,
        step_name: name.to_string(),
        required_approver_position: PositionId(position.to_string()),
    }
}

fn offers() -> (Offers, Arc<InMemoryEventChannel>) {
    let definitions = Arc::new(WorkflowDefinitionStore::new(Arc::new(
        InMemoryTemplateRepository::default(),
    )));
    definitions
        .create_template(NewWorkflowTemplate {
            name: "Engineering offers".to_string(),
            description: None,
            request_type: RequestType::Offer,
            apply_conditions: ApplyConditions {
                department_id: Some(DepartmentId("eng".to_string())),
                level_id: None,
            },
            steps: vec![step(1, "Head", "HEAD"), step(2, "HR", "HR")],
        })
        .expect("template created");

    let directory = StaticDirectory::new()
        .with_assignment("HEAD", Some("eng"), "head-eng")
        .with_assignment("HR", None, "hr-director");
    let engine = Arc::new(ApprovalTrackingEngine::new(
        definitions,
        Arc::new(InMemoryTrackingRepository::default()),
        Arc::new(directory),
    ));

    let channel = Arc::new(InMemoryEventChannel::default());
    let publisher = Arc::new(RetryingPublisher::new(
        channel.clone(),
        EventDeliveryConfig {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        },
    ));
    let service = OfferService::new(
        Arc::new(InMemoryOfferRepository::default()),
        engine,
        publisher,
    );
    (service, channel)
}

fn draft() -> OfferDraft {
    OfferDraft {
        candidate_id: CandidateId("cand-7".to_string()),
        position_id: PositionId("platform-engineer".to_string()),
        department_id: DepartmentId("eng".to_string()),
        level_id: LevelId("mid".to_string()),
        salary: 8_000_000,
        currency: "eur".to_string(),
        start_date: None,
        requester_id: employee("recruiter"),
        owner_id: Some(employee("manager")),
        workflow_template_id: None,
    }
}

#[test]
fn offer_is_approved_after_every_step() {
    let (offers, channel) = offers();
    let offer = offers.create(draft()).expect("offer created");
    assert_eq!(offer.currency, "EUR");

    let submitted = offers
        .submit(offer.id, &employee("recruiter"))
        .expect("submitted");
    let first = submitted.current_step.expect("first step");
    assert_eq!(first.assigned_approver_id, employee("head-eng"));

    let advanced = offers
        .approve_step(offer.id, first.id, &employee("head-eng"), None)
        .expect("step 1 approved");
    assert_eq!(advanced.offer.status, RequestStatus::Pending);
    let second = advanced.current_step.expect("second step");
    assert_eq!(advanced.offer.current_step_id, Some(second.step_id));

    let done = offers
        .approve_step(offer.id, second.id, &employee("hr-director"), Some("ok".to_string()))
        .expect("step 2 approved");
    assert_eq!(done.offer.status, RequestStatus::Approved);
    assert!(done.current_step.is_none());

    let events: Vec<(EventType, RequestStatus)> = channel
        .events()
        .iter()
        .map(|event| (event.event_type, event.resulting_status))
        .collect();
    assert_eq!(
        events,
        vec![
            (EventType::Submitted, RequestStatus::Pending),
            (EventType::Approved, RequestStatus::Pending),
            (EventType::Approved, RequestStatus::Approved),
        ]
    );
}

#[test]
fn withdrawn_offer_leaves_no_pending_step() {
    let (offers, _) = offers();
    let offer = offers.create(draft()).expect("offer created");
    let submitted = offers
        .submit(offer.id, &employee("recruiter"))
        .expect("submitted");
    let first = submitted.current_step.expect("first step");

    let err = offers
        .withdraw(offer.id, &employee("head-eng"), None)
        .expect_err("approver is not a stakeholder");
    assert!(matches!(err, OfferError::Forbidden { .. }));

    let withdrawn = offers
        .withdraw(offer.id, &employee("manager"), Some("candidate declined".to_string()))
        .expect("withdrawn");
    assert_eq!(withdrawn.offer.status, RequestStatus::Withdrawn);

    let inbox = offers
        .engine()
        .list_pending_for(&employee("head-eng"))
        .expect("inbox");
    assert!(inbox.is_empty());

    let history = offers.history(offer.id).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].steps[0].id, first.id);
    assert_eq!(history[0].steps[0].status, TrackingStatus::Cancelled);

    let err = offers
        .approve_step(offer.id, first.id, &employee("head-eng"), None)
        .expect_err("withdrawn offers take no decisions");
    assert!(matches!(err, OfferError::InvalidStateTransition(_)));
}

#[test]
fn returned_offer_is_resubmitted_as_a_new_round() {
    let (offers, _) = offers();
    let offer = offers.create(draft()).expect("offer created");
    let first = offers
        .submit(offer.id, &employee("recruiter"))
        .expect("submitted")
        .current_step
        .expect("first step");

    let returned = offers
        .return_for_edit(
            offer.id,
            first.id,
            &employee("head-eng"),
            Some("lower the salary".to_string()),
        )
        .expect("returned");
    assert_eq!(returned.offer.status, RequestStatus::Returned);
    assert_eq!(returned.offer.current_step_id, None);

    offers
        .update_draft(
            offer.id,
            OfferPatch {
                salary: Some(7_600_000),
                ..Default::default()
            },
        )
        .expect("edited");
    let resubmitted = offers
        .submit(offer.id, &employee("recruiter"))
        .expect("resubmitted");
    assert_eq!(resubmitted.offer.submission_round, 2);
    assert_eq!(resubmitted.offer.salary, 7_600_000);
    assert_eq!(
        resubmitted.current_step.map(|row| row.step_order),
        Some(1)
    );

    let history = offers.history(offer.id).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[0].progress,
        WorkflowProgress::ReturnedAt { step_order: 1 }
    );
    assert_eq!(history[0].steps[0].notes.as_deref(), Some("lower the salary"));
    assert_ne!(history[0].request_id, history[1].request_id);
}
