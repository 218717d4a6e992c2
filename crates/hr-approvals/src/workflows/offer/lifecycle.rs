use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a request gated by the approval engine. Offers and recruitment
/// requests share this lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Returned,
    Cancelled,
    Withdrawn,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Draft => "DRAFT",
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Returned => "RETURNED",
            RequestStatus::Cancelled => "CANCELLED",
            RequestStatus::Withdrawn => "WITHDRAWN",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Approved
                | RequestStatus::Rejected
                | RequestStatus::Cancelled
                | RequestStatus::Withdrawn
        )
    }

    pub const fn is_editable(self) -> bool {
        matches!(self, RequestStatus::Draft | RequestStatus::Returned)
    }

    /// Apply `action` to this status, returning the resulting status.
    pub fn transition(self, action: RequestAction) -> Result<RequestStatus, TransitionError> {
        use RequestAction as A;
        use RequestStatus as S;

        let next = match (self, action) {
            (S::Draft | S::Returned, A::Submit) => S::Pending,
            (S::Pending, A::ApproveStep) => S::Pending,
            (S::Pending, A::Complete) => S::Approved,
            (S::Pending, A::RejectStep) => S::Rejected,
            (S::Pending, A::ReturnForEdit) => S::Returned,
            (S::Draft | S::Pending | S::Returned, A::Cancel) => S::Cancelled,
            (S::Pending, A::Withdraw) => S::Withdrawn,
            (from, attempted) => return Err(TransitionError { from, attempted }),
        };
        Ok(next)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Actions a request can undergo.
///
/// `ApproveStep` keeps the request pending while later steps remain;
/// `Complete` is the approval of the final step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestAction {
    Submit,
    ApproveStep,
    Complete,
    RejectStep,
    ReturnForEdit,
    Cancel,
    Withdraw,
}

impl RequestAction {
    pub const fn label(self) -> &'static str {
        match self {
            RequestAction::Submit => "submit",
            RequestAction::ApproveStep => "approve_step",
            RequestAction::Complete => "complete",
            RequestAction::RejectStep => "reject_step",
            RequestAction::ReturnForEdit => "return_for_edit",
            RequestAction::Cancel => "cancel",
            RequestAction::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot {attempted} a request in status {from}")]
pub struct TransitionError {
    pub from: RequestStatus,
    pub attempted: RequestAction,
}
