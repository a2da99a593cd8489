use ulid::Ulid;

use crate::catalog::CatalogError;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Referenced service id not found or inactive. A selection error —
    /// never retried.
    UnknownService(Ulid),
    /// Empty selection or zero aggregate duration.
    InvalidServiceSelection,
    /// The requested interval can no longer be committed: lost race, block,
    /// or outside the shift. Recoverable — re-query availability and retry
    /// with a different slot.
    SlotNoLongerAvailable,
    /// Confirm/complete ordering violated (e.g. completing a pending entry).
    NotConfirmed(Ulid),
    /// Customer already holds too many future appointments.
    ReservationLimit { active: usize, max: usize },
    LimitExceeded(&'static str),
    /// Storage-layer outage. Fatal at this layer; retry policy belongs to
    /// the embedding service.
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::UnknownService(id) => write!(f, "unknown or inactive service: {id}"),
            EngineError::InvalidServiceSelection => {
                write!(f, "service selection is empty or has zero duration")
            }
            EngineError::SlotNoLongerAvailable => {
                write!(f, "slot is no longer available; re-query availability")
            }
            EngineError::NotConfirmed(id) => write!(f, "appointment not confirmed: {id}"),
            EngineError::ReservationLimit { active, max } => {
                write!(f, "customer already has {active} active appointments (limit {max})")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<CatalogError> for EngineError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::UnknownService(id) => EngineError::UnknownService(id),
            CatalogError::EmptySelection => EngineError::InvalidServiceSelection,
        }
    }
}
