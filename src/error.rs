use super::*;

/// Fatal, propagated failure modes. Everything else (negative curvature,
/// a degenerate `y` update, a surprise convergence, exhausting the line
/// search budget) is handled internally as a control-flow signal and
/// never reaches the caller as an `Err`.
#[derive(thiserror::Error, Debug)]
pub enum LbfgsError {
    #[error("dimension mismatch: expected vector of length {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("curvature history has no memory left to shrink")]
    OutOfMemory,

    #[error("objective returned a NaN or infinite value at the current iterate")]
    OutOfDomain,

    /// Raised internally when a line search or the outer loop exhausts its
    /// evaluation budget. `Minimizer::minimize` catches this variant and
    /// reports `TerminationState::MaxEvaluationsExceeded` with
    /// `success = false` rather than letting it escape as an `Err`; it is
    /// public only so a custom `LineSearch` implementation can raise it too.
    #[error("maximum number of function evaluations exceeded")]
    MaxEvaluationsExceeded,
}
