use super::*;

pub mod strong_wolfe;
pub use strong_wolfe::*;

/// Outcome of a completed line search: the accepted step length together
/// with the full objective evaluation at the accepted point, so the caller
/// never has to re-query the oracle to recover the gradient the search
/// already computed there. `evaluations` is the number of oracle calls the
/// search actually made reaching this step, so the driver's evaluation
/// counter stays exact instead of assuming one call per outer iteration.
#[derive(derive_getters::Getters, Debug, Clone)]
pub struct LineSearchStep {
    alpha: Floating,
    eval: FuncEvalMultivariate,
    directional_g: Floating,
    evaluations: usize,
}

impl LineSearchStep {
    pub fn new(
        alpha: Floating,
        eval: FuncEvalMultivariate,
        directional_g: Floating,
        evaluations: usize,
    ) -> Self {
        LineSearchStep {
            alpha,
            eval,
            directional_g,
            evaluations,
        }
    }
}

pub trait LineSearch {
    /// Finds a step length `alpha` along `direction_k` from `x_k` satisfying
    /// the strong Wolfe conditions (or the best point found once the search
    /// budget or bracket is exhausted). `direction_k` may be flipped in place
    /// to `-grad` if its initial directional derivative is non-negative.
    fn compute_step_len(
        &mut self,
        x_k: &DVector<Floating>,
        eval_x_k: &FuncEvalMultivariate,
        direction_k: &mut DVector<Floating>,
        oracle: &impl Fn(&DVector<Floating>) -> FuncEvalMultivariate,
        max_iter: usize,
        is_first_iteration: bool,
        tol: Floating,
    ) -> Result<LineSearchStep, LbfgsError>;
}
