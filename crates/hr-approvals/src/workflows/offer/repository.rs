use super::domain::{Offer, OfferId};
pub use crate::workflows::approval::repository::RepositoryError;

/// Storage for offers. Writes are optimistic on `Offer::version`.
pub trait OfferRepository: Send + Sync {
    fn next_id(&self) -> Result<OfferId, RepositoryError>;

    /// Fails with `Conflict` if the id is already stored.
    fn insert(&self, offer: Offer) -> Result<Offer, RepositoryError>;

    fn fetch(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError>;

    /// Replace the stored offer if its version still equals `offer.version`;
    /// the stored copy gets the next version. Fails with `VersionConflict`
    /// otherwise.
    fn update(&self, offer: Offer) -> Result<Offer, RepositoryError>;
}
