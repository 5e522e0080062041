use thiserror::Error;

/// Hard failures inside the engine.
///
/// Everything a user can trigger (bad input, missing permissions,
/// exhausted quotas, unknown subjects) resolves to an outbound reply, not
/// an error; only storage faults surface here.  Transport failures are
/// handled at the send site so one actor's dead chat never aborts
/// processing for the rest.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] dossier_store::StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
