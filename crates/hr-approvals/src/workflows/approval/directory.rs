use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use super::domain::{DepartmentId, EmployeeId, PositionId};

/// Capability that maps an organizational position to the people holding it.
///
/// An empty list is a valid answer meaning nobody holds the position; the
/// engine, not the resolver, decides that this is a configuration error.
pub trait DirectoryResolver: Send + Sync {
    fn resolve_approvers_for_position(
        &self,
        position_id: &PositionId,
        department_id: Option<&DepartmentId>,
    ) -> Result<Vec<EmployeeId>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

type AssignmentKey = (PositionId, Option<DepartmentId>);

/// In-process directory keyed by position and optional department.
///
/// Department-scoped holders take precedence; organization-wide holders
/// (registered without a department) are the fallback.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    assignments: RwLock<BTreeMap<AssignmentKey, Vec<EmployeeId>>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assignment(
        mut self,
        position_id: &str,
        department_id: Option<&str>,
        employee_id: &str,
    ) -> Self {
        let assignments = self
            .assignments
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        insert_holder(
            assignments,
            PositionId(position_id.to_string()),
            department_id.map(|value| DepartmentId(value.to_string())),
            EmployeeId(employee_id.to_string()),
        );
        self
    }

    pub fn assign(
        &self,
        position_id: PositionId,
        department_id: Option<DepartmentId>,
        employee_id: EmployeeId,
    ) -> Result<(), DirectoryError> {
        let mut guard = self
            .assignments
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;
        insert_holder(&mut guard, position_id, department_id, employee_id);
        Ok(())
    }

    /// Remove every holder of a position in the given scope.
    pub fn vacate(
        &self,
        position_id: &PositionId,
        department_id: Option<&DepartmentId>,
    ) -> Result<(), DirectoryError> {
        let mut guard = self
            .assignments
            .write()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;
        guard.remove(&(position_id.clone(), department_id.cloned()));
        Ok(())
    }
}

fn insert_holder(
    assignments: &mut BTreeMap<AssignmentKey, Vec<EmployeeId>>,
    position_id: PositionId,
    department_id: Option<DepartmentId>,
    employee_id: EmployeeId,
) {
    let holders = assignments.entry((position_id, department_id)).or_default();
    if !holders.contains(&employee_id) {
        holders.push(employee_id);
    }
}

impl DirectoryResolver for StaticDirectory {
    fn resolve_approvers_for_position(
        &self,
        position_id: &PositionId,
        department_id: Option<&DepartmentId>,
    ) -> Result<Vec<EmployeeId>, DirectoryError> {
        let guard = self
            .assignments
            .read()
            .map_err(|_| DirectoryError::Unavailable("directory lock poisoned".to_string()))?;

        if let Some(department_id) = department_id {
            let scoped = guard
                .get(&(position_id.clone(), Some(department_id.clone())))
                .filter(|holders| !holders.is_empty());
            if let Some(holders) = scoped {
                return Ok(holders.clone());
            }
        }

        Ok(guard
            .get(&(position_id.clone(), None))
            .cloned()
            .unwrap_or_default())
    }
}
