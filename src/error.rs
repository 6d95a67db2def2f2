/// Error type for this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowGateError {
    /// Limit or window rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),
}
