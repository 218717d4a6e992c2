use chrono::NaiveDate;
use hr_approvals::config::AppConfig;
use hr_approvals::workflows::approval::{
    ApplyConditions, ApprovalTrackingEngine, DefinitionError, DepartmentId,
    InMemoryTemplateRepository, InMemoryTrackingRepository, LevelId, NewWorkflowTemplate,
    PositionId, RequestType, StaticDirectory, StepDefinition, WorkflowDefinitionStore,
};
use hr_approvals::workflows::offer::{
    DeliveryError, EventChannel, InMemoryOfferRepository, LifecycleEvent, OfferService,
    RetryingPublisher,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ApiEngine = ApprovalTrackingEngine<InMemoryTemplateRepository, InMemoryTrackingRepository>;
pub(crate) type ApiOfferService =
    OfferService<InMemoryTemplateRepository, InMemoryTrackingRepository, InMemoryOfferRepository>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Engine and offer service sharing one set of in-memory stores.
pub(crate) struct Services {
    pub(crate) engine: Arc<ApiEngine>,
    pub(crate) offers: Arc<ApiOfferService>,
}

pub(crate) fn build_services(
    config: &AppConfig,
    channel: Arc<dyn EventChannel>,
) -> Result<Services, DefinitionError> {
    let definitions = Arc::new(WorkflowDefinitionStore::new(Arc::new(
        InMemoryTemplateRepository::default(),
    )));
    for template in seed_templates() {
        definitions.create_template(template)?;
    }

    let engine = Arc::new(ApprovalTrackingEngine::new(
        definitions,
        Arc::new(InMemoryTrackingRepository::default()),
        Arc::new(seed_directory()),
    ));
    let publisher = Arc::new(RetryingPublisher::new(channel, config.events));
    let offers = Arc::new(OfferService::new(
        Arc::new(InMemoryOfferRepository::default()),
        engine.clone(),
        publisher,
    ));

    Ok(Services { engine, offers })
}

/// Event channel that writes lifecycle events to the service log.
#[derive(Debug, Default)]
pub(crate) struct TracingEventChannel;

impl EventChannel for TracingEventChannel {
    fn publish(&self, event: &LifecycleEvent) -> Result<(), DeliveryError> {
        info!(
            event_type = event.event_type.label(),
            request_type = event.request_type.label(),
            request_id = %event.request_id,
            status = event.resulting_status.label(),
            actor_id = %event.actor_id,
            timestamp = %event.timestamp,
            "lifecycle event"
        );
        Ok(())
    }
}

pub(crate) const ENGINEERING: &str = "engineering";
pub(crate) const SALES: &str = "sales";

pub(crate) fn seed_directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_assignment("DEPT_HEAD", Some(ENGINEERING), "emp-1001")
        .with_assignment("DEPT_HEAD", Some(SALES), "emp-1002")
        .with_assignment("HR_DIRECTOR", None, "emp-2001")
        .with_assignment("CFO", None, "emp-3001")
}

fn step(order: u32, name: &str, position: &str) -> StepDefinition {
    StepDefinition {
        step_order: order,
        step_name: name.to_string(),
        required_approver_position: PositionId(position.to_string()),
    }
}

pub(crate) fn seed_templates() -> Vec<NewWorkflowTemplate> {
    vec![
        NewWorkflowTemplate {
            name: "Standard offer approval".to_string(),
            description: Some("Department head, then HR director".to_string()),
            request_type: RequestType::Offer,
            apply_conditions: ApplyConditions::default(),
            steps: vec![
                step(1, "Department head review", "DEPT_HEAD"),
                step(2, "HR director sign-off", "HR_DIRECTOR"),
            ],
        },
        NewWorkflowTemplate {
            name: "Senior offer approval".to_string(),
            description: Some("Senior offers also need the CFO".to_string()),
            request_type: RequestType::Offer,
            apply_conditions: ApplyConditions {
                department_id: None,
                level_id: Some(LevelId("senior".to_string())),
            },
            steps: vec![
                step(1, "Department head review", "DEPT_HEAD"),
                step(2, "HR director sign-off", "HR_DIRECTOR"),
                step(3, "CFO budget approval", "CFO"),
            ],
        },
        NewWorkflowTemplate {
            name: "Sales recruitment request".to_string(),
            description: None,
            request_type: RequestType::RecruitmentRequest,
            apply_conditions: ApplyConditions {
                department_id: Some(DepartmentId(SALES.to_string())),
                level_id: None,
            },
            steps: vec![
                step(1, "Department head review", "DEPT_HEAD"),
                step(2, "HR director sign-off", "HR_DIRECTOR"),
            ],
        },
    ]
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    use hr_approvals::config::{AppEnvironment, EventDeliveryConfig, ServerConfig, TelemetryConfig};
    use std::time::Duration;

    AppConfig {
        environment: AppEnvironment::Test,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        telemetry: TelemetryConfig {
            log_level: "info".to_string(),
        },
        events: EventDeliveryConfig {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
        },
    }
}
