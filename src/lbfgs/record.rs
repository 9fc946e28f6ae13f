use super::*;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW_CAPACITY: usize = 100;

/// Five-way classification of why `Minimizer::minimize` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    MaxIterations,
    AverageImprovement,
    RelativeNorm,
    GradientNorm,
    Continue,
}

/// Final outcome of a call to `Minimizer::minimize`.
#[derive(derive_getters::Getters, Debug, Clone)]
pub struct MinimizationReport {
    x: DVector<Floating>,
    success: bool,
    state: TerminationState,
    iterations: usize,
    evaluations: usize,
    elapsed: Duration,
}

impl MinimizationReport {
    pub(crate) fn new(
        x: DVector<Floating>,
        success: bool,
        state: TerminationState,
        iterations: usize,
        evaluations: usize,
        elapsed: Duration,
    ) -> Self {
        MinimizationReport {
            x,
            success,
            state,
            iterations,
            evaluations,
            elapsed,
        }
    }
}

/// Sliding window of recent function values plus the gradient-norm state
/// used to classify termination. Owns the tolerances explicitly rather than
/// reading them off a shared outer struct.
#[derive(Debug)]
pub(crate) struct ConvergenceRecord {
    values: VecDeque<Floating>,
    g_norm_init: Floating,
    x_last: DVector<Floating>,
    g_norm_last: Floating,
    started_at: Instant,
    tol: Floating,
    eps: Floating,
    relative_tol: Floating,
    max_iterations: Option<usize>,
}

impl ConvergenceRecord {
    pub(crate) fn new(
        x0: &DVector<Floating>,
        g0: &DVector<Floating>,
        tol: Floating,
        eps: Floating,
        relative_tol: Floating,
        max_iterations: Option<usize>,
    ) -> Self {
        ConvergenceRecord {
            values: VecDeque::with_capacity(WINDOW_CAPACITY),
            g_norm_init: vector_ops::norm2(g0).max(Floating::MIN_POSITIVE),
            x_last: x0.clone(),
            g_norm_last: vector_ops::norm2(g0),
            started_at: Instant::now(),
            tol,
            eps,
            relative_tol,
            max_iterations,
        }
    }

    pub(crate) fn push(&mut self, f: Floating, x: &DVector<Floating>, g: &DVector<Floating>) {
        if self.values.len() == WINDOW_CAPACITY {
            self.values.pop_front();
        }
        self.values.push_back(f);
        self.x_last.copy_from(x);
        self.g_norm_last = vector_ops::norm2(g);
    }

    pub(crate) fn to_continue(&self, iterations: usize) -> TerminationState {
        if let Some(max_iterations) = self.max_iterations {
            if iterations >= max_iterations {
                return TerminationState::MaxIterations;
            }
        }

        let size = self.values.len();
        if size > 5 {
            let newest = self.values[size - 1];
            let previous = self.values[size.saturating_sub(10)];
            let window = size.min(10) as Floating;
            let avg_improvement = (previous - newest) / window;
            if newest != 0.0 && (avg_improvement / newest).abs() < self.tol {
                return TerminationState::AverageImprovement;
            }
        }

        if self.g_norm_last / self.g_norm_init <= self.relative_tol {
            return TerminationState::RelativeNorm;
        }

        let x_scale2 = vector_ops::norm2(&self.x_last).max(1.0);
        let x_scale1 = vector_ops::norm1(&self.x_last).max(1.0);
        if self.g_norm_last < self.eps * x_scale2 && self.g_norm_last < self.eps * x_scale1 {
            return TerminationState::GradientNorm;
        }

        TerminationState::Continue
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod record_test {
    use super::*;

    #[test]
    fn window_is_bounded_at_capacity() {
        let x0 = DVector::from_vec(vec![0.0]);
        let g0 = DVector::from_vec(vec![1.0]);
        let mut record = ConvergenceRecord::new(&x0, &g0, 1e-5, 1e-5, 1e-8, None);
        for i in 0..150 {
            record.push(100.0 - i as Floating, &x0, &g0);
        }
        assert_eq!(record.values.len(), WINDOW_CAPACITY);
    }

    #[test]
    fn max_iterations_takes_priority() {
        let x0 = DVector::from_vec(vec![0.0]);
        let g0 = DVector::from_vec(vec![1.0]);
        let record = ConvergenceRecord::new(&x0, &g0, 1e-5, 1e-5, 1e-8, Some(3));
        assert_eq!(record.to_continue(3), TerminationState::MaxIterations);
    }

    #[test]
    fn relative_tolerance_is_configurable() {
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let g0 = DVector::from_vec(vec![1.0, 1.0]);
        // g_norm_last / g_norm_init = 1e-4, tight enough to trip a loose
        // relative_tol but not the crate default of 1e-8.
        let g_small = DVector::from_vec(vec![1e-4, 1e-4]);
        let mut loose = ConvergenceRecord::new(&x0, &g0, 1e-5, 1e-5, 1e-3, None);
        loose.push(1.0, &x0, &g_small);
        assert_eq!(loose.to_continue(0), TerminationState::RelativeNorm);

        let mut tight = ConvergenceRecord::new(&x0, &g0, 1e-5, 1e-5, 1e-8, None);
        tight.push(1.0, &x0, &g_small);
        assert_ne!(tight.to_continue(0), TerminationState::RelativeNorm);
    }

    #[test]
    fn gradient_norm_triggers_when_relative_norm_does_not() {
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let g0 = DVector::from_vec(vec![1.0, 1.0]);
        let mut record = ConvergenceRecord::new(&x0, &g0, 1e-5, 1e-3, 1e-8, None);
        let x_small = DVector::from_vec(vec![0.1, 0.1]);
        let g_small = DVector::from_vec(vec![1e-4, 1e-4]);
        record.push(1.0, &x_small, &g_small);
        assert_eq!(record.to_continue(0), TerminationState::GradientNorm);
    }
}
