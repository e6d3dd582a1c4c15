//! Flow construction errors.

/// Errors raised while wiring up pipeline stages.
///
/// Protocol violations on a live channel are not errors; they panic.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// The stage's header would push the output MTU past what its length
    /// field can express.
    #[error("MTU {mtu} plus {overhead} header bytes exceeds {limit}")]
    MtuOverflow {
        mtu: usize,
        overhead: usize,
        limit: usize,
    },

    /// A stage was configured with a zero-sized buffer.
    #[error("{what} must be greater than zero")]
    ZeroSize { what: &'static str },
}
