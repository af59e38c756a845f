use thiserror::Error;

/// Failures the relay can run into. Everything except the config variants is
/// caught at the operation that produced it and reported, never propagated
/// out of an update handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("required setting {0} is not set")]
    ConfigMissing(&'static str),

    #[error("setting {var} is invalid: {reason}")]
    ConfigInvalid { var: &'static str, reason: String },

    #[error("admin store is unavailable: {0}")]
    RemoteStoreUnavailable(String),

    #[error("failed to save admin list: {0}")]
    RemoteStoreWriteFailed(String),

    #[error("admin persistence is not configured (BIN_ID / BIN_API_KEY)")]
    PersistenceDisabled,

    #[error("only the owner can manage admins")]
    NotOwner,

    #[error("the owner cannot be removed")]
    OwnerImmutable,

    #[error("delivery to {recipient} failed: {reason}")]
    DeliveryFailed { recipient: u64, reason: String },

    #[error("could not determine who this reply is addressed to")]
    UnresolvedTarget,
}
