use super::*;

/// Consecutive degenerate-update skips (`NegativeCurvature` or
/// `ZeroGradientDifference`, each coupled with a near-zero step) after
/// which the driver declares `SurpriseConvergence` rather than spinning on
/// a history that can no longer make progress.
const SURPRISE_CONVERGENCE_SKIPS: usize = 3;
const SURPRISE_CONVERGENCE_STEP_TOL: Floating = 1e-12;

/// Top-level L-BFGS driver: owns the curvature history, the convergence
/// record, and a pluggable [`LineSearch`] (the [`StrongWolfe`] search by
/// default). Configuration is a fluent `with_*` builder rather than a parsed
/// config file, matching the rest of this crate family.
#[derive(Debug)]
pub struct Minimizer<LS: LineSearch = StrongWolfe> {
    m: usize,
    scaling: ScalingStrategy,
    max_iterations: Option<usize>,
    max_evaluations: Option<usize>,
    value_tolerance: Floating,
    gradient_tolerance: Floating,
    relative_tolerance: Floating,
    line_search_tol: Floating,
    line_search_max_iter: usize,
    show_tracing: bool,
    line_search: LS,
}

impl Default for Minimizer<StrongWolfe> {
    fn default() -> Self {
        Minimizer {
            m: 10,
            scaling: ScalingStrategy::Diagonal,
            max_iterations: None,
            max_evaluations: None,
            value_tolerance: 1e-5,
            gradient_tolerance: 1e-5,
            relative_tolerance: 1e-8,
            line_search_tol: 1e-10,
            line_search_max_iter: 20,
            show_tracing: false,
            line_search: StrongWolfe::default(),
        }
    }
}

impl<LS: LineSearch> Minimizer<LS> {
    pub fn with_value_tolerance(mut self, tol: Floating) -> Self {
        self.value_tolerance = tol;
        self
    }

    pub fn with_gradient_tolerance(mut self, eps: Floating) -> Self {
        self.gradient_tolerance = eps;
        self
    }

    /// Sets the relative-gradient-norm threshold (`gNormLast / gNormInit`)
    /// below which the driver reports `TerminationState::RelativeNorm`.
    pub fn with_relative_tolerance(mut self, relative_tolerance: Floating) -> Self {
        self.relative_tolerance = relative_tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = Some(max_evaluations);
        self
    }

    pub fn with_memory(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_scaling(mut self, scaling: ScalingStrategy) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_tracing(mut self, show_tracing: bool) -> Self {
        self.show_tracing = show_tracing;
        self
    }

    /// Swaps in a different line search implementation, consuming `self`.
    pub fn with_line_search<LS2: LineSearch>(self, line_search: LS2) -> Minimizer<LS2> {
        Minimizer {
            m: self.m,
            scaling: self.scaling,
            max_iterations: self.max_iterations,
            max_evaluations: self.max_evaluations,
            value_tolerance: self.value_tolerance,
            gradient_tolerance: self.gradient_tolerance,
            relative_tolerance: self.relative_tolerance,
            line_search_tol: self.line_search_tol,
            line_search_max_iter: self.line_search_max_iter,
            show_tracing: self.show_tracing,
            line_search,
        }
    }

    /// Two-loop recursion computing `dir = -H^-1 * grad` from the stored
    /// curvature pairs and the configured initial-Hessian scaling.
    fn compute_direction(
        history: &CurvatureHistory,
        g: &DVector<Floating>,
    ) -> Result<DVector<Floating>, LbfgsError> {
        let mut dir = g.clone();
        let n = history.len();
        let mut alpha = vec![0.0; n];

        for (i, (s, y, rho)) in history.pairs().enumerate().rev() {
            let a = rho * vector_ops::inner(s, &dir);
            alpha[i] = a;
            dir.axpy(-a, y, 1.0);
        }

        history.apply_initial_hessian(&mut dir)?;

        for (i, (s, y, rho)) in history.pairs().enumerate() {
            let b = rho * vector_ops::inner(y, &dir);
            dir.axpy(alpha[i] - b, s, 1.0);
        }

        vector_ops::scale_in_place(&mut dir, -1.0);
        Ok(dir)
    }

    /// Runs the optimizer from `x0` until one of the five termination states
    /// fires, or the history update repeatedly skips with no progress
    /// (`SurpriseConvergence`, declared successful after
    /// [`SURPRISE_CONVERGENCE_SKIPS`] consecutive near-zero-step skips).
    /// `callback`, if given, is invoked after every accepted step; a panic
    /// inside it is caught and logged rather than aborting the run.
    pub fn minimize(
        &mut self,
        x0: &DVector<Floating>,
        oracle: &impl Fn(&DVector<Floating>) -> FuncEvalMultivariate,
        mut callback: Option<&mut dyn FnMut(usize, &DVector<Floating>)>,
    ) -> Result<MinimizationReport, LbfgsError> {
        let mut x = x0.clone();
        let mut eval = oracle(&x);
        let mut evaluations = 1usize;

        if !eval.f().is_finite() || eval.g().iter().any(|v| !v.is_finite()) {
            return Err(LbfgsError::OutOfDomain);
        }

        let mut history = CurvatureHistory::new(self.m, self.scaling);
        let mut record = ConvergenceRecord::new(
            &x,
            eval.g(),
            self.value_tolerance,
            self.gradient_tolerance,
            self.relative_tolerance,
            self.max_iterations,
        );

        let g_norm0 = vector_ops::norm2(eval.g());
        let x_scale2 = vector_ops::norm2(&x).max(1.0);
        let x_scale1 = vector_ops::norm1(&x).max(1.0);
        if g_norm0 < self.gradient_tolerance * x_scale2 && g_norm0 < self.gradient_tolerance * x_scale1
        {
            info!(target: "lbfgs::minimizer", "gradient already below tolerance at x0; nothing to do");
            return Ok(MinimizationReport::new(
                x,
                true,
                TerminationState::GradientNorm,
                0,
                evaluations,
                record.elapsed(),
            ));
        }

        let mut iterations = 0usize;
        let mut state;
        let mut consecutive_degenerate_updates = 0usize;

        loop {
            iterations += 1;

            if let Some(max_evaluations) = self.max_evaluations {
                if evaluations >= max_evaluations {
                    return Ok(MinimizationReport::new(
                        x,
                        false,
                        TerminationState::Continue,
                        iterations - 1,
                        evaluations,
                        record.elapsed(),
                    ));
                }
            }

            let mut dir = Self::compute_direction(&history, eval.g())?;
            if dir.iter().any(|v| v.is_nan()) && !eval.g().iter().any(|v| v.is_nan()) {
                warn!(target: "lbfgs::minimizer", "direction is NaN with a finite gradient; clearing history and retrying once");
                history.clear();
                dir = Self::compute_direction(&history, eval.g())?;
            }

            if self.show_tracing {
                debug!(
                    target: "lbfgs::minimizer",
                    iteration = iterations,
                    f = *eval.f(),
                    g_norm = vector_ops::norm2(eval.g()),
                    "iterating"
                );
            }

            let step = match self.line_search.compute_step_len(
                &x,
                &eval,
                &mut dir,
                oracle,
                self.line_search_max_iter,
                iterations == 1,
                self.line_search_tol,
            ) {
                Ok(step) => step,
                Err(LbfgsError::MaxEvaluationsExceeded) => {
                    return Ok(MinimizationReport::new(
                        x,
                        false,
                        TerminationState::Continue,
                        iterations,
                        evaluations + self.line_search_max_iter,
                        record.elapsed(),
                    ));
                }
                Err(e) => return Err(e),
            };
            evaluations += *step.evaluations();

            let x_new = &x + &dir * *step.alpha();
            let outcome = history.update(&x_new, &x, step.eval().g(), eval.g());
            let step_len = vector_ops::norm2(&(&x_new - &x));
            match outcome {
                UpdateOutcome::Accepted => consecutive_degenerate_updates = 0,
                UpdateOutcome::NegativeCurvature | UpdateOutcome::ZeroGradientDifference => {
                    if step_len < SURPRISE_CONVERGENCE_STEP_TOL {
                        consecutive_degenerate_updates += 1;
                    } else {
                        consecutive_degenerate_updates = 0;
                    }
                }
            }
            record.push(*step.eval().f(), &x_new, step.eval().g());

            x = x_new;
            eval = step.eval().clone();

            if let Some(cb) = callback.as_deref_mut() {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(iterations, &x)))
                    .is_err()
                {
                    error!(target: "lbfgs::minimizer", "iteration callback panicked; ignoring");
                }
            }

            state = record.to_continue(iterations);
            if consecutive_degenerate_updates >= SURPRISE_CONVERGENCE_SKIPS {
                warn!(target: "lbfgs::minimizer", "repeated skipped update with no progress; declaring surprise convergence");
                return Ok(MinimizationReport::new(
                    x,
                    true,
                    state,
                    iterations,
                    evaluations,
                    record.elapsed(),
                ));
            }
            if state != TerminationState::Continue {
                break;
            }
        }

        Ok(MinimizationReport::new(
            x,
            true,
            state,
            iterations,
            evaluations,
            record.elapsed(),
        ))
    }
}

#[cfg(test)]
mod minimizer_test {
    use super::*;

    fn quadratic_bowl(_n: usize) -> impl Fn(&DVector<Floating>) -> FuncEvalMultivariate {
        move |x: &DVector<Floating>| {
            let f = 0.5 * x.norm_squared();
            (f, x.clone()).into()
        }
    }

    fn rosenbrock() -> impl Fn(&DVector<Floating>) -> FuncEvalMultivariate {
        |x: &DVector<Floating>| {
            let a = 1.0 - x[0];
            let b = x[1] - x[0] * x[0];
            let f = a * a + 100.0 * b * b;
            let g0 = -2.0 * a - 400.0 * x[0] * b;
            let g1 = 200.0 * b;
            (f, DVector::from_vec(vec![g0, g1])).into()
        }
    }

    #[test]
    fn converges_on_a_quadratic_bowl() {
        let f_and_g = quadratic_bowl(10);
        let x0 = DVector::from_element(10, 1.0);
        let mut m = Minimizer::default().with_memory(5).with_value_tolerance(1e-8);
        let report = m.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*report.success());
        assert!(vector_ops::norm2(report.x()) < 1e-6);
        assert!(*report.iterations() <= 10);
    }

    #[test]
    fn converges_on_rosenbrock_n2() {
        std::env::set_var("RUST_LOG", "info");
        let _tracer = Tracer::default().with_stdout_layer(Some(LogFormat::Normal)).build();

        let f_and_g = rosenbrock();
        let x0 = DVector::from_vec(vec![-1.2, 1.0]);
        let mut m = Minimizer::default().with_tracing(true);
        let report = m.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*report.success());
        let target = DVector::from_vec(vec![1.0, 1.0]);
        assert!((report.x() - &target).norm() < 1e-4);
        assert!(*report.iterations() <= 50);
    }

    #[test]
    fn zero_gradient_start_terminates_immediately() {
        let f_and_g = quadratic_bowl(3);
        let x0 = DVector::from_element(3, 0.0);
        let mut m = Minimizer::default();
        let report = m.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*report.success());
        assert_eq!(*report.state(), TerminationState::GradientNorm);
        assert_eq!(*report.iterations(), 0);
    }

    #[test]
    fn max_iterations_cap_is_honored() {
        let f_and_g = rosenbrock();
        let x0 = DVector::from_vec(vec![-1.2, 1.0]);
        let mut m = Minimizer::default().with_max_iterations(3);
        let report = m.minimize(&x0, &f_and_g, None).unwrap();
        assert_eq!(*report.state(), TerminationState::MaxIterations);
        assert!(*report.success());
        assert!(*report.evaluations() < 3 * 20);
    }

    #[test]
    fn zero_memory_falls_back_to_steepest_descent() {
        let f_and_g = quadratic_bowl(4);
        let x0 = DVector::from_element(4, 1.0);
        let mut m = Minimizer::default().with_memory(0).with_max_iterations(500);
        let report = m.minimize(&x0, &f_and_g, None).unwrap();
        assert!(vector_ops::norm2(report.x()) < 1e-4);
    }

    #[test]
    fn relative_tolerance_builder_is_honored() {
        let f_and_g = quadratic_bowl(4);
        let x0 = DVector::from_element(4, 1.0);

        let mut loose = Minimizer::default().with_relative_tolerance(0.5);
        let loose_report = loose.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*loose_report.success());
        assert!(*loose_report.iterations() <= 3);

        let mut tight = Minimizer::default().with_relative_tolerance(1e-12);
        let tight_report = tight.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*tight_report.iterations() >= *loose_report.iterations());
    }

    #[test]
    fn ill_scaled_quadratic_converges_under_both_scalings() {
        let n = 20;
        let f_and_g = move |x: &DVector<Floating>| {
            let mut f = 0.0;
            let mut g = DVector::from_element(n, 0.0);
            for i in 0..n {
                let c = 10f64.powf(2.0 * i as Floating / n as Floating);
                f += c * x[i] * x[i];
                g[i] = 2.0 * c * x[i];
            }
            FuncEvalMultivariate::new(f, g)
        };
        let x0 = DVector::from_element(n, 1.0);

        let mut diag = Minimizer::default()
            .with_scaling(ScalingStrategy::Diagonal)
            .with_max_iterations(40);
        let diag_report = diag.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*diag_report.success());

        let mut scalar = Minimizer::default()
            .with_scaling(ScalingStrategy::Scalar)
            .with_max_iterations(500);
        let scalar_report = scalar.minimize(&x0, &f_and_g, None).unwrap();
        assert!(*scalar_report.success());
    }
}
