//! Workflow templates and the sequential approval tracking engine.
//!
//! Templates name the organizational positions that must sign off, in order.
//! The engine turns a template into tracking rows for one request, resolving
//! the concrete approver of each step through a [`DirectoryResolver`] at the
//! moment the step opens.

pub mod definitions;
pub mod directory;
pub mod domain;
pub mod engine;
pub mod memory;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use definitions::{DefinitionError, WorkflowDefinitionStore};
pub use directory::{DirectoryError, DirectoryResolver, StaticDirectory};
pub use domain::{
    ApplyConditions, ApprovalTracking, DepartmentId, EmployeeId, LevelId, MatchScope,
    NewWorkflowTemplate, PositionId, RequestId, RequestType, StepDefinition, TemplatePatch,
    TrackingId, TrackingStatus, WorkflowProgress, WorkflowStep, WorkflowStepId, WorkflowTemplate,
    WorkflowTemplateId,
};
pub use engine::{ApprovalError, ApprovalTrackingEngine, DecisionOutcome};
pub use memory::{InMemoryTemplateRepository, InMemoryTrackingRepository};
pub use repository::{RepositoryError, TemplateRepository, TrackingRepository};
pub use router::approval_router;
