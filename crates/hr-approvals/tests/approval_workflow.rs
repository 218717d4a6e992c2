use std::sync::{Arc, Barrier};
use std::thread;

use hr_approvals::workflows::approval::{
    ApplyConditions, ApprovalError, ApprovalTrackingEngine, DefinitionError, DepartmentId,
    EmployeeId, InMemoryTemplateRepository, InMemoryTrackingRepository, LevelId, MatchScope,
    NewWorkflowTemplate, PositionId, RequestId, RequestType, StaticDirectory, StepDefinition,
    TrackingStatus, WorkflowDefinitionStore, WorkflowProgress,
};

type Engine = ApprovalTrackingEngine<InMemoryTemplateRepository, InMemoryTrackingRepository>;

fn step(order: u32, name: &str, position: &str) -> StepDefinition {
    StepDefinition {
        step_order: order,
        step_name: name.to_string(),
        required_approver_position: PositionId(position.to_string()),
    }
}

fn employee(value: &str) -> EmployeeId {
    EmployeeId(value.to_string())
}

fn scope() -> MatchScope {
    MatchScope::new(DepartmentId("5".to_string()), LevelId("2".to_string()))
}

fn engine_with(directory: Arc<StaticDirectory>, with_template: bool) -> Engine {
    let definitions = Arc::new(WorkflowDefinitionStore::new(Arc::new(
        InMemoryTemplateRepository::default(),
    )));
    if with_template {
        definitions
            .create_template(NewWorkflowTemplate {
                name: "Offer approval".to_string(),
                description: None,
                request_type: RequestType::Offer,
                apply_conditions: ApplyConditions {
                    department_id: Some(DepartmentId("5".to_string())),
                    level_id: Some(LevelId("2".to_string())),
                },
                steps: vec![step(1, "Head", "P1"), step(2, "HR", "P2")],
            })
            .expect("template created");
    }
    ApprovalTrackingEngine::new(
        definitions,
        Arc::new(InMemoryTrackingRepository::default()),
        directory,
    )
}

fn directory() -> Arc<StaticDirectory> {
    Arc::new(
        StaticDirectory::new()
            .with_assignment("P1", Some("5"), "head-5")
            .with_assignment("P2", Some("5"), "hr-5"),
    )
}

#[test]
fn approval_advances_to_the_next_position_holder() {
    let engine = engine_with(directory(), true);
    let request = RequestId("req-1".to_string());

    let first = engine.initialize(&request, &scope()).expect("initialized");
    assert_eq!(first.status, TrackingStatus::Pending);
    assert_eq!(first.assigned_approver_id, employee("head-5"));

    let outcome = engine
        .decide(first.id, &employee("head-5"), true, None)
        .expect("approved");
    assert_eq!(outcome.decided.status, TrackingStatus::Approved);
    let second = outcome.next.expect("second row");
    assert_eq!(second.step_order, 2);
    assert_eq!(second.assigned_approver_id, employee("hr-5"));

    let done = engine
        .decide(second.id, &employee("hr-5"), true, None)
        .expect("approved");
    assert_eq!(done.progress, WorkflowProgress::Completed);
    let orders: Vec<u32> = engine
        .get_history(&request)
        .expect("history")
        .iter()
        .map(|row| row.step_order)
        .collect();
    assert_eq!(orders, vec![1, 2]);
}

#[test]
fn rejection_stops_the_workflow() {
    let engine = engine_with(directory(), true);
    let request = RequestId("req-2".to_string());
    let first = engine.initialize(&request, &scope()).expect("initialized");

    let outcome = engine
        .decide(first.id, &employee("head-5"), false, Some("budget".to_string()))
        .expect("rejected");
    assert!(outcome.next.is_none());

    let history = engine.get_history(&request).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TrackingStatus::Rejected);
    assert_eq!(history[0].notes.as_deref(), Some("budget"));
}

#[test]
fn missing_workflow_creates_no_rows() {
    let engine = engine_with(directory(), false);
    let request = RequestId("req-3".to_string());

    let err = engine
        .initialize(&request, &scope())
        .expect_err("no template");
    assert!(matches!(
        err,
        ApprovalError::Definition(DefinitionError::NoMatchingWorkflow { .. })
    ));
    assert!(engine.get_history(&request).expect("history").is_empty());
}

#[test]
fn concurrent_decisions_have_a_single_winner() {
    let engine = Arc::new(engine_with(directory(), true));
    let request = RequestId("req-4".to_string());
    let first = engine.initialize(&request, &scope()).expect("initialized");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.decide(first.id, &employee("head-5"), true, None)
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread joins"))
        .collect();

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(ApprovalError::AlreadyDecided {
            status: TrackingStatus::Approved,
            ..
        })
    )));
    assert_eq!(engine.get_history(&request).expect("history").len(), 2);
}

#[test]
fn vacant_position_blocks_the_advance_until_filled() {
    let directory = directory();
    let engine = engine_with(directory.clone(), true);
    let request = RequestId("req-5".to_string());
    let first = engine.initialize(&request, &scope()).expect("initialized");

    let p2 = PositionId("P2".to_string());
    let dept = DepartmentId("5".to_string());
    directory.vacate(&p2, Some(&dept)).expect("vacated");

    let err = engine
        .decide(first.id, &employee("head-5"), true, None)
        .expect_err("nobody holds P2");
    assert!(err.is_configuration());
    assert_eq!(
        engine
            .current_step(&request)
            .expect("current")
            .map(|row| row.id),
        Some(first.id)
    );

    directory
        .assign(p2, Some(dept), employee("hr-5-interim"))
        .expect("assigned");
    let outcome = engine
        .decide(first.id, &employee("head-5"), true, None)
        .expect("approved after assignment");
    assert_eq!(
        outcome.next.map(|row| row.assigned_approver_id),
        Some(employee("hr-5-interim"))
    );
}
