//! Salary offer lifecycle driven through the approval engine.
//!
//! The offer owns its status; the engine owns step progression. The two are
//! correlated by a per-round key and kept in sync by the offer service, with
//! lifecycle events published after every transition.

pub mod domain;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{CandidateId, Offer, OfferDraft, OfferId, OfferPatch};
pub use events::{
    Delivery, DeliveryError, EventChannel, EventType, InMemoryEventChannel, LifecycleEvent,
    RedeliveryReport, RetryingPublisher,
};
pub use lifecycle::{RequestAction, RequestStatus, TransitionError};
pub use memory::InMemoryOfferRepository;
pub use repository::OfferRepository;
pub use router::offer_router;
pub use service::{OfferError, OfferService, RoundHistory, TransitionReceipt};
