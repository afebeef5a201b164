use thiserror::Error;

/// Failures a remote write can resolve to. Authorization is enforced
/// server-side, so any write may come back `PermissionDenied` regardless of
/// local state. Transient network failures are not distinguished from
/// rejections at this layer; neither escapes the coordinator.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("write rejected: {0}")]
    Rejected(String),

    #[error("network failure: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum SubscribeError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}
