use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::domain::{
    DepartmentId, LevelId, MatchScope, NewWorkflowTemplate, TemplatePatch, WorkflowStep,
    WorkflowStepId, WorkflowTemplate, WorkflowTemplateId,
};
use super::repository::{validate_steps, RepositoryError, TemplateRepository};

/// Errors raised by the workflow definition store.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("a workflow template named '{name}' already exists")]
    DuplicateName { name: String },
    #[error("workflow template {0} not found")]
    NotFound(WorkflowTemplateId),
    #[error("invalid workflow template: {0}")]
    InvalidTemplate(String),
    #[error("no active workflow template matches department '{department_id}' and level '{level_id}'")]
    NoMatchingWorkflow {
        department_id: DepartmentId,
        level_id: LevelId,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl DefinitionError {
    pub const fn code(&self) -> &'static str {
        match self {
            DefinitionError::DuplicateName { .. } => "DUPLICATE_NAME",
            DefinitionError::NotFound(_) => "TEMPLATE_NOT_FOUND",
            DefinitionError::InvalidTemplate(_) => "INVALID_TEMPLATE",
            DefinitionError::NoMatchingWorkflow { .. } => "NO_MATCHING_WORKFLOW",
            DefinitionError::Repository(_) => "REPOSITORY_UNAVAILABLE",
        }
    }
}

#[derive(Debug, Default)]
struct CacheSlot {
    generation: u64,
    active: Option<Arc<Vec<WorkflowTemplate>>>,
}

/// Administrative store of workflow templates with a read-through cache of
/// active templates used by matching.
///
/// Every mutation bumps the cache generation before it returns, so a snapshot
/// loaded concurrently with a write is discarded instead of being installed.
pub struct WorkflowDefinitionStore<T> {
    repository: Arc<T>,
    cache: RwLock<CacheSlot>,
}

impl<T> WorkflowDefinitionStore<T>
where
    T: TemplateRepository + 'static,
{
    pub fn new(repository: Arc<T>) -> Self {
        Self {
            repository,
            cache: RwLock::new(CacheSlot::default()),
        }
    }

    pub fn create_template(
        &self,
        template: NewWorkflowTemplate,
    ) -> Result<WorkflowTemplate, DefinitionError> {
        validate_name(&template.name)?;
        validate_steps(&template.steps).map_err(DefinitionError::InvalidTemplate)?;

        let name = template.name.clone();
        let stored = self.repository.insert(template).map_err(|err| match err {
            RepositoryError::Conflict => DefinitionError::DuplicateName { name },
            other => DefinitionError::Repository(other),
        })?;
        self.invalidate()?;

        info!(
            template_id = stored.id.0,
            name = %stored.name,
            request_type = stored.request_type.label(),
            steps = stored.steps.len(),
            "workflow template created"
        );
        Ok(stored)
    }

    /// Partially update a template. A supplied step list replaces the entire set.
    pub fn update_template(
        &self,
        id: WorkflowTemplateId,
        patch: TemplatePatch,
    ) -> Result<WorkflowTemplate, DefinitionError> {
        if let Some(name) = patch.name.as_deref() {
            validate_name(name)?;
        }
        if let Some(steps) = patch.steps.as_deref() {
            validate_steps(steps).map_err(DefinitionError::InvalidTemplate)?;
        }

        let replaced_steps = patch.steps.is_some();
        let name = patch.name.clone().unwrap_or_default();
        let updated = self.repository.update(id, patch).map_err(|err| match err {
            RepositoryError::Conflict => DefinitionError::DuplicateName { name },
            RepositoryError::NotFound => DefinitionError::NotFound(id),
            other => DefinitionError::Repository(other),
        })?;
        self.invalidate()?;

        info!(
            template_id = id.0,
            replaced_steps,
            steps = updated.steps.len(),
            "workflow template updated"
        );
        Ok(updated)
    }

    /// Soft delete. Historical tracking rows keep resolving their steps.
    pub fn deactivate(&self, id: WorkflowTemplateId) -> Result<WorkflowTemplate, DefinitionError> {
        let template = self
            .repository
            .set_active(id, false)
            .map_err(|err| match err {
                RepositoryError::NotFound => DefinitionError::NotFound(id),
                other => DefinitionError::Repository(other),
            })?;
        self.invalidate()?;

        info!(template_id = id.0, "workflow template deactivated");
        Ok(template)
    }

    pub fn get_template(&self, id: WorkflowTemplateId) -> Result<WorkflowTemplate, DefinitionError> {
        self.repository
            .fetch(id)?
            .ok_or(DefinitionError::NotFound(id))
    }

    pub fn list_templates(
        &self,
        include_inactive: bool,
    ) -> Result<Vec<WorkflowTemplate>, DefinitionError> {
        let templates = self.repository.list()?;
        Ok(templates
            .into_iter()
            .filter(|template| include_inactive || template.is_active)
            .collect())
    }

    pub fn step(&self, id: WorkflowStepId) -> Result<Option<WorkflowStep>, DefinitionError> {
        Ok(self.repository.step(id)?)
    }

    pub fn find_matching_template(
        &self,
        department_id: DepartmentId,
        level_id: LevelId,
    ) -> Result<WorkflowTemplate, DefinitionError> {
        self.find_matching(&MatchScope::new(department_id, level_id))
    }

    /// Pick the single active template for a scope: the most specific
    /// conditions win, then the lowest id.
    pub fn find_matching(&self, scope: &MatchScope) -> Result<WorkflowTemplate, DefinitionError> {
        let active = self.active_templates()?;
        let chosen = active
            .iter()
            .filter(|template| {
                scope
                    .request_type
                    .map_or(true, |request_type| template.request_type == request_type)
            })
            .filter(|template| {
                template
                    .apply_conditions
                    .matches(&scope.department_id, &scope.level_id)
            })
            .min_by_key(|template| {
                (
                    std::cmp::Reverse(template.apply_conditions.specificity()),
                    template.id,
                )
            });

        match chosen {
            Some(template) => {
                debug!(
                    template_id = template.id.0,
                    department_id = %scope.department_id,
                    level_id = %scope.level_id,
                    "matched workflow template"
                );
                Ok(template.clone())
            }
            None => Err(DefinitionError::NoMatchingWorkflow {
                department_id: scope.department_id.clone(),
                level_id: scope.level_id.clone(),
            }),
        }
    }

    fn active_templates(&self) -> Result<Arc<Vec<WorkflowTemplate>>, DefinitionError> {
        let generation = {
            let slot = self.cache.read().map_err(|_| cache_poisoned())?;
            if let Some(active) = &slot.active {
                return Ok(Arc::clone(active));
            }
            slot.generation
        };

        let loaded: Vec<WorkflowTemplate> = self
            .repository
            .list()?
            .into_iter()
            .filter(|template| template.is_active)
            .collect();
        let loaded = Arc::new(loaded);

        let mut slot = self.cache.write().map_err(|_| cache_poisoned())?;
        if slot.generation == generation {
            slot.active = Some(Arc::clone(&loaded));
        }
        Ok(loaded)
    }

    fn invalidate(&self) -> Result<(), DefinitionError> {
        let mut slot = self.cache.write().map_err(|_| cache_poisoned())?;
        slot.generation += 1;
        slot.active = None;
        Ok(())
    }
}

fn cache_poisoned() -> DefinitionError {
    DefinitionError::Repository(RepositoryError::Unavailable(
        "template cache lock poisoned".to_string(),
    ))
}

fn validate_name(name: &str) -> Result<(), DefinitionError> {
    if name.trim().is_empty() {
        return Err(DefinitionError::InvalidTemplate(
            "template name must not be blank".to_string(),
        ));
    }
    Ok(())
}
