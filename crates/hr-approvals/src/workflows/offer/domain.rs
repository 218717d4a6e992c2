use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::lifecycle::RequestStatus;
use crate::workflows::approval::domain::{
    DepartmentId, EmployeeId, LevelId, PositionId, RequestId, WorkflowStepId, WorkflowTemplateId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferId(pub u64);

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(pub String);

/// Salary offer gated by the approval engine.
///
/// `current_step_id` mirrors the engine's pending step for the current
/// submission round and is only ever written by the offer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub candidate_id: CandidateId,
    pub position_id: PositionId,
    pub department_id: DepartmentId,
    pub level_id: LevelId,
    /// Annual amount in the currency's minor unit.
    pub salary: u64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    pub status: RequestStatus,
    pub workflow_template_id: Option<WorkflowTemplateId>,
    pub current_step_id: Option<WorkflowStepId>,
    pub requester_id: EmployeeId,
    pub owner_id: EmployeeId,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Number of times the offer entered the engine; 0 while never submitted.
    pub submission_round: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Offer {
    pub fn from_draft(id: OfferId, draft: OfferDraft, now: DateTime<Utc>) -> Self {
        let owner_id = draft
            .owner_id
            .unwrap_or_else(|| draft.requester_id.clone());
        Self {
            id,
            candidate_id: draft.candidate_id,
            position_id: draft.position_id,
            department_id: draft.department_id,
            level_id: draft.level_id,
            salary: draft.salary,
            currency: draft.currency.trim().to_ascii_uppercase(),
            start_date: draft.start_date,
            status: RequestStatus::Draft,
            workflow_template_id: draft.workflow_template_id,
            current_step_id: None,
            requester_id: draft.requester_id,
            owner_id,
            submitted_at: None,
            submission_round: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Business reference used on lifecycle events.
    pub fn reference(&self) -> RequestId {
        RequestId(format!("offer-{}", self.id))
    }

    /// Engine correlation key of the current submission round.
    pub fn correlation_key(&self) -> Option<RequestId> {
        (self.submission_round > 0).then(|| round_key(self.id, self.submission_round))
    }

    pub fn is_stakeholder(&self, actor_id: &EmployeeId) -> bool {
        &self.requester_id == actor_id || &self.owner_id == actor_id
    }
}

pub(crate) fn round_key(id: OfferId, round: u32) -> RequestId {
    RequestId(format!("offer-{id}/r{round}"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDraft {
    pub candidate_id: CandidateId,
    pub position_id: PositionId,
    pub department_id: DepartmentId,
    pub level_id: LevelId,
    pub salary: u64,
    pub currency: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    pub requester_id: EmployeeId,
    /// Defaults to the requester.
    #[serde(default)]
    pub owner_id: Option<EmployeeId>,
    /// Pin a template instead of matching one at submission.
    #[serde(default)]
    pub workflow_template_id: Option<WorkflowTemplateId>,
}

/// Edits allowed while an offer is a draft or returned for edit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPatch {
    #[serde(default)]
    pub salary: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub level_id: Option<LevelId>,
    #[serde(default)]
    pub owner_id: Option<EmployeeId>,
}

impl OfferPatch {
    pub(crate) fn apply(self, offer: &mut Offer) {
        if let Some(salary) = self.salary {
            offer.salary = salary;
        }
        if let Some(currency) = self.currency {
            offer.currency = currency.trim().to_ascii_uppercase();
        }
        if let Some(start_date) = self.start_date {
            offer.start_date = Some(start_date);
        }
        if let Some(level_id) = self.level_id {
            // The template is re-matched on the next submit.
            if level_id != offer.level_id {
                offer.workflow_template_id = None;
            }
            offer.level_id = level_id;
        }
        if let Some(owner_id) = self.owner_id {
            offer.owner_id = owner_id;
        }
    }
}

/// Reject drafts that could never be approved as entered.
pub(crate) fn validate_terms(salary: u64, currency: &str) -> Result<(), String> {
    if salary == 0 {
        return Err("salary must be greater than zero".to_string());
    }
    let currency = currency.trim();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("currency '{currency}' is not a three-letter code"));
    }
    Ok(())
}
