//! Limited-memory BFGS for unconstrained minimization of a differentiable
//! `f: R^n -> R`, given as a callback returning `(value, gradient)`.
//!
//! The search direction comes from the two-loop recursion over a bounded
//! history of curvature pairs ([`lbfgs::CurvatureHistory`]); the step length
//! comes from a MINPACK-style safeguarded cubic/quadratic interpolation
//! satisfying the strong Wolfe conditions ([`line_search::StrongWolfe`]).
//! [`lbfgs::Minimizer`] drives the two together.

use nalgebra::DVector;

use tracing::{debug, error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub mod number;
pub use number::*;

pub mod error;
pub use error::*;

pub mod func_eval;
pub use func_eval::*;

pub mod vector_ops;

pub mod tracer;
pub use tracer::*;

pub mod line_search;
pub use line_search::*;

pub mod lbfgs;
pub use lbfgs::*;
