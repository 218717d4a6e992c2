use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use super::domain::{Offer, OfferId};
use super::repository::{OfferRepository, RepositoryError};

#[derive(Debug, Default)]
struct OfferState {
    offers: BTreeMap<OfferId, Offer>,
    last_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryOfferRepository {
    state: Mutex<OfferState>,
}

impl InMemoryOfferRepository {
    fn state(&self) -> Result<std::sync::MutexGuard<'_, OfferState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("offer repository lock poisoned".to_string()))
    }
}

impl OfferRepository for InMemoryOfferRepository {
    fn next_id(&self) -> Result<OfferId, RepositoryError> {
        let mut state = self.state()?;
        state.last_id += 1;
        Ok(OfferId(state.last_id))
    }

    fn insert(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let mut state = self.state()?;
        if state.offers.contains_key(&offer.id) {
            return Err(RepositoryError::Conflict);
        }
        state.last_id = state.last_id.max(offer.id.0);
        state.offers.insert(offer.id, offer.clone());
        Ok(offer)
    }

    fn fetch(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError> {
        Ok(self.state()?.offers.get(&id).cloned())
    }

    fn update(&self, mut offer: Offer) -> Result<Offer, RepositoryError> {
        let mut state = self.state()?;
        let stored = state
            .offers
            .get_mut(&offer.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != offer.version {
            return Err(RepositoryError::VersionConflict);
        }

        offer.version += 1;
        offer.updated_at = Utc::now();
        *stored = offer.clone();
        Ok(offer)
    }
}
