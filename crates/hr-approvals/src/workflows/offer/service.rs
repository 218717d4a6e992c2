use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{round_key, validate_terms, Offer, OfferDraft, OfferId, OfferPatch};
use super::events::{Delivery, EventType, LifecycleEvent, RedeliveryReport, RetryingPublisher};
use super::lifecycle::{RequestAction, RequestStatus, TransitionError};
use super::repository::{OfferRepository, RepositoryError};
use crate::workflows::approval::domain::{
    ApprovalTracking, EmployeeId, MatchScope, RequestId, RequestType, TrackingId,
    TrackingStatus, WorkflowProgress,
};
use crate::workflows::approval::engine::{ApprovalError, ApprovalTrackingEngine};
use crate::workflows::approval::repository::{TemplateRepository, TrackingRepository};

/// Error raised by the offer service.
#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("offer {0} not found")]
    NotFound(OfferId),
    #[error("invalid offer: {0}")]
    InvalidOffer(String),
    #[error(transparent)]
    InvalidStateTransition(#[from] TransitionError),
    #[error("offer {offer_id} cannot be edited in status {status}")]
    NotEditable {
        offer_id: OfferId,
        status: RequestStatus,
    },
    #[error("employee '{actor_id}' is neither requester nor owner of offer {offer_id}")]
    Forbidden {
        offer_id: OfferId,
        actor_id: EmployeeId,
    },
    #[error("approval tracking {tracking_id} is not the current step of offer {offer_id}")]
    TrackingMismatch {
        offer_id: OfferId,
        tracking_id: TrackingId,
    },
    #[error("offer {0} was modified concurrently; re-fetch and retry")]
    ConcurrentModification(OfferId),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl OfferError {
    pub const fn code(&self) -> &'static str {
        match self {
            OfferError::NotFound(_) => "OFFER_NOT_FOUND",
            OfferError::InvalidOffer(_) => "INVALID_OFFER",
            OfferError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            OfferError::NotEditable { .. } => "OFFER_NOT_EDITABLE",
            OfferError::Forbidden { .. } => "FORBIDDEN",
            OfferError::TrackingMismatch { .. } => "TRACKING_STEP_MISMATCH",
            OfferError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            OfferError::Approval(inner) => inner.code(),
            OfferError::Repository(_) => "REPOSITORY_UNAVAILABLE",
        }
    }
}

/// Offer after a transition, with the engine step it now waits on and the
/// fate of the emitted event (`None` when nothing changed).
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReceipt {
    pub offer: Offer,
    pub current_step: Option<ApprovalTracking>,
    pub delivery: Option<Delivery>,
}

/// Engine audit trail of one submission round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundHistory {
    pub round: u32,
    pub request_id: RequestId,
    pub progress: WorkflowProgress,
    pub steps: Vec<ApprovalTracking>,
}

/// Owner of the offer lifecycle.
///
/// The offer status is written here only; step progression belongs to the
/// engine. Each transition writes the offer first and then emits an event.
/// Delivery problems park the event in the outbox and never roll back.
pub struct OfferService<T, R, O> {
    offers: Arc<O>,
    engine: Arc<ApprovalTrackingEngine<T, R>>,
    events: Arc<RetryingPublisher>,
}

impl<T, R, O> OfferService<T, R, O>
where
    T: TemplateRepository + 'static,
    R: TrackingRepository + 'static,
    O: OfferRepository + 'static,
{
    pub fn new(
        offers: Arc<O>,
        engine: Arc<ApprovalTrackingEngine<T, R>>,
        events: Arc<RetryingPublisher>,
    ) -> Self {
        Self {
            offers,
            engine,
            events,
        }
    }

    pub fn engine(&self) -> &Arc<ApprovalTrackingEngine<T, R>> {
        &self.engine
    }

    pub fn create(&self, draft: OfferDraft) -> Result<Offer, OfferError> {
        validate_terms(draft.salary, &draft.currency).map_err(OfferError::InvalidOffer)?;

        let id = self.offers.next_id()?;
        let offer = self.offers.insert(Offer::from_draft(id, draft, Utc::now()))?;
        info!(
            offer_id = id.0,
            candidate_id = %offer.candidate_id.0,
            requester_id = %offer.requester_id,
            "offer drafted"
        );
        Ok(offer)
    }

    pub fn get(&self, id: OfferId) -> Result<Offer, OfferError> {
        self.offers.fetch(id)?.ok_or(OfferError::NotFound(id))
    }

    pub fn update_draft(&self, id: OfferId, patch: OfferPatch) -> Result<Offer, OfferError> {
        let mut offer = self.get(id)?;
        if !offer.status.is_editable() {
            return Err(OfferError::NotEditable {
                offer_id: id,
                status: offer.status,
            });
        }

        patch.apply(&mut offer);
        validate_terms(offer.salary, &offer.currency).map_err(OfferError::InvalidOffer)?;
        self.write(offer)
    }

    /// Enter the approval engine with a fresh submission round.
    ///
    /// Template resolution and engine initialization happen before the offer
    /// is written, so a configuration error leaves the offer untouched.
    pub fn submit(
        &self,
        id: OfferId,
        actor_id: &EmployeeId,
    ) -> Result<TransitionReceipt, OfferError> {
        let mut offer = self.get(id)?;
        let status = offer.status.transition(RequestAction::Submit)?;

        let template_id = match offer.workflow_template_id {
            Some(template_id) => template_id,
            None => {
                let scope = MatchScope::new(offer.department_id.clone(), offer.level_id.clone())
                    .of_type(RequestType::Offer);
                self.engine
                    .definitions()
                    .find_matching(&scope)
                    .map_err(ApprovalError::from)?
                    .id
            }
        };

        let round = offer.submission_round + 1;
        let key = round_key(id, round);
        let first = self
            .engine
            .initialize_with_template(&key, template_id, &offer.department_id)?;

        offer.status = status;
        offer.workflow_template_id = Some(template_id);
        offer.current_step_id = Some(first.step_id);
        offer.submission_round = round;
        offer.submitted_at = Some(Utc::now());

        let offer = match self.write(offer) {
            Ok(offer) => offer,
            Err(err) => {
                self.abandon_round(&key, actor_id);
                return Err(err);
            }
        };

        let delivery = self.emit(&offer, RequestAction::Submit, actor_id, None);
        Ok(TransitionReceipt {
            offer,
            current_step: Some(first),
            delivery: Some(delivery),
        })
    }

    /// Approve the current step. The offer stays pending until the engine
    /// reports the final step approved.
    pub fn approve_step(
        &self,
        id: OfferId,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        notes: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        self.decide_step(id, tracking_id, actor_id, RequestAction::ApproveStep, notes)
    }

    pub fn reject_step(
        &self,
        id: OfferId,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        notes: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        self.decide_step(id, tracking_id, actor_id, RequestAction::RejectStep, notes)
    }

    /// Send the offer back to the requester. The engine records the current
    /// step as a rejection flagged as returned, with the return reason; the
    /// next submit starts a new round at step 1.
    pub fn return_for_edit(
        &self,
        id: OfferId,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        notes: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        self.decide_step(id, tracking_id, actor_id, RequestAction::ReturnForEdit, notes)
    }

    pub fn cancel(
        &self,
        id: OfferId,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        let offer = self.get(id)?;
        self.leave_engine(offer, RequestAction::Cancel, actor_id, reason)
    }

    /// Pull a pending offer out of approval. Only the requester or the owner
    /// may withdraw.
    pub fn withdraw(
        &self,
        id: OfferId,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        let offer = self.get(id)?;
        if !offer.is_stakeholder(actor_id) {
            return Err(OfferError::Forbidden {
                offer_id: id,
                actor_id: actor_id.clone(),
            });
        }
        self.leave_engine(offer, RequestAction::Withdraw, actor_id, reason)
    }

    /// Apply the engine's view of the current round to a pending offer.
    ///
    /// Decisions taken directly on the engine are picked up here. Offers that
    /// are not pending, or already in sync, are returned unchanged.
    pub fn reconcile(&self, id: OfferId) -> Result<TransitionReceipt, OfferError> {
        let mut offer = self.get(id)?;
        let key = match offer.correlation_key() {
            Some(key) if offer.status == RequestStatus::Pending => key,
            _ => return Ok(unchanged(offer, None)),
        };

        let history = self.engine.get_history(&key)?;
        let Some(last) = history.last().cloned() else {
            return Ok(unchanged(offer, None));
        };

        let action = match WorkflowProgress::derive(&history) {
            WorkflowProgress::NotStarted => return Ok(unchanged(offer, None)),
            WorkflowProgress::InProgress { .. } if offer.current_step_id == Some(last.step_id) => {
                return Ok(unchanged(offer, Some(last)));
            }
            WorkflowProgress::InProgress { .. } => RequestAction::ApproveStep,
            WorkflowProgress::Completed => RequestAction::Complete,
            WorkflowProgress::RejectedAt { .. } => RequestAction::RejectStep,
            WorkflowProgress::ReturnedAt { .. } => RequestAction::ReturnForEdit,
            WorkflowProgress::CancelledAt { .. } => RequestAction::Cancel,
        };

        offer.status = offer.status.transition(action)?;
        let current_step = (last.status == TrackingStatus::Pending).then(|| last.clone());
        offer.current_step_id = current_step.as_ref().map(|row| row.step_id);

        // Attributed to the latest acting approver.
        let decided = history
            .iter()
            .rev()
            .find(|row| row.acting_approver_id.is_some());
        let actor_id = decided
            .and_then(|row| row.acting_approver_id.clone())
            .unwrap_or_else(|| offer.owner_id.clone());
        let notes = decided.and_then(|row| row.notes.clone());

        let offer = self.write(offer)?;
        info!(
            offer_id = id.0,
            request_id = %key,
            action = action.label(),
            "offer reconciled with engine progress"
        );
        let delivery = self.emit(&offer, action, &actor_id, notes);
        Ok(TransitionReceipt {
            offer,
            current_step,
            delivery: Some(delivery),
        })
    }

    /// Engine audit trail across every submission round, oldest first.
    pub fn history(&self, id: OfferId) -> Result<Vec<RoundHistory>, OfferError> {
        let offer = self.get(id)?;
        (1..=offer.submission_round)
            .map(|round| -> Result<RoundHistory, OfferError> {
                let request_id = round_key(id, round);
                let steps = self.engine.get_history(&request_id)?;
                Ok(RoundHistory {
                    round,
                    progress: WorkflowProgress::derive(&steps),
                    request_id,
                    steps,
                })
            })
            .collect()
    }

    pub fn redeliver_outbox(&self) -> RedeliveryReport {
        self.events.redeliver()
    }

    pub fn outbox(&self) -> Vec<LifecycleEvent> {
        self.events.outbox()
    }

    fn decide_step(
        &self,
        id: OfferId,
        tracking_id: TrackingId,
        actor_id: &EmployeeId,
        action: RequestAction,
        notes: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        let mut offer = self.get(id)?;
        offer.status.transition(action)?;
        self.ensure_current_step(&offer, tracking_id)?;

        let outcome = match action {
            RequestAction::ReturnForEdit => {
                self.engine
                    .return_for_edit(tracking_id, actor_id, notes.clone())?
            }
            _ => self.engine.decide(
                tracking_id,
                actor_id,
                action == RequestAction::ApproveStep,
                notes.clone(),
            )?,
        };

        let applied = match (action, outcome.progress) {
            (RequestAction::ApproveStep, WorkflowProgress::Completed) => RequestAction::Complete,
            (other, _) => other,
        };
        offer.status = offer.status.transition(applied)?;
        offer.current_step_id = outcome.next.as_ref().map(|row| row.step_id);

        let offer = self.write(offer).map_err(|err| {
            warn!(
                offer_id = id.0,
                tracking_id = tracking_id.0,
                error = %err,
                "engine decision recorded but offer write failed; reconcile will catch up"
            );
            err
        })?;

        let delivery = self.emit(&offer, applied, actor_id, notes);
        Ok(TransitionReceipt {
            offer,
            current_step: outcome.next,
            delivery: Some(delivery),
        })
    }

    fn leave_engine(
        &self,
        mut offer: Offer,
        action: RequestAction,
        actor_id: &EmployeeId,
        reason: Option<String>,
    ) -> Result<TransitionReceipt, OfferError> {
        let status = offer.status.transition(action)?;

        if offer.status == RequestStatus::Pending {
            if let Some(key) = offer.correlation_key() {
                self.engine.close(&key, actor_id, reason.clone())?;
            }
        }

        offer.status = status;
        offer.current_step_id = None;
        let offer = self.write(offer)?;

        let delivery = self.emit(&offer, action, actor_id, reason);
        Ok(TransitionReceipt {
            offer,
            current_step: None,
            delivery: Some(delivery),
        })
    }

    fn ensure_current_step(
        &self,
        offer: &Offer,
        tracking_id: TrackingId,
    ) -> Result<(), OfferError> {
        let mismatch = || OfferError::TrackingMismatch {
            offer_id: offer.id,
            tracking_id,
        };
        let key = offer.correlation_key().ok_or_else(mismatch)?;
        match self.engine.current_step(&key)? {
            Some(row) if row.id == tracking_id => Ok(()),
            _ => Err(mismatch()),
        }
    }

    fn abandon_round(&self, key: &RequestId, actor_id: &EmployeeId) {
        let reason = Some("submission was not recorded on the offer".to_string());
        if let Err(err) = self.engine.close(key, actor_id, reason) {
            warn!(request_id = %key, error = %err, "failed to close abandoned submission round");
        }
    }

    fn write(&self, offer: Offer) -> Result<Offer, OfferError> {
        let id = offer.id;
        self.offers.update(offer).map_err(|err| match err {
            RepositoryError::VersionConflict => OfferError::ConcurrentModification(id),
            RepositoryError::NotFound => OfferError::NotFound(id),
            other => OfferError::Repository(other),
        })
    }

    fn emit(
        &self,
        offer: &Offer,
        action: RequestAction,
        actor_id: &EmployeeId,
        notes: Option<String>,
    ) -> Delivery {
        let event = LifecycleEvent {
            event_type: EventType::for_action(action),
            request_type: RequestType::Offer,
            request_id: offer.reference(),
            correlation_key: offer.correlation_key(),
            workflow_template_id: offer.workflow_template_id,
            current_step_id: offer.current_step_id,
            actor_id: actor_id.clone(),
            notes,
            resulting_status: offer.status,
            timestamp: Utc::now(),
        };

        info!(
            offer_id = offer.id.0,
            action = action.label(),
            status = offer.status.label(),
            event_type = event.event_type.label(),
            actor_id = %actor_id,
            "offer transitioned"
        );
        self.events.publish(event)
    }
}

fn unchanged(offer: Offer, current_step: Option<ApprovalTracking>) -> TransitionReceipt {
    TransitionReceipt {
        offer,
        current_step,
        delivery: None,
    }
}
