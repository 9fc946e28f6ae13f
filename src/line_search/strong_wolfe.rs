use super::*;

// MINPACK-style safeguarded cubic/quadratic interpolating line search
// (the classic `mcsrch`/`cstep` pair used by Fortran `lbfgs.f` and its many
// ports) satisfying the strong Wolfe conditions:
//   sufficient decrease: f(x + a*d) <= f(x) + a*ftol*<g(x),d>
//   curvature:           |<g(x + a*d),d>| <= gtol*|<g(x),d>|

#[derive(Debug, Clone, Copy)]
struct StepPoint {
    alpha: Floating,
    f: Floating,
    g: Floating,
}

#[derive(Debug, Clone, derive_getters::Getters)]
pub struct StrongWolfe {
    ftol: Floating,
    gtol: Floating,
    alpha_min: Floating,
    alpha_max: Floating,
    p66: Floating,
    p5: Floating,
    xtrapf: Floating,
}

impl Default for StrongWolfe {
    fn default() -> Self {
        StrongWolfe {
            ftol: 1e-4,
            gtol: 0.9,
            alpha_min: 1e-12,
            alpha_max: 1e12,
            p66: 0.66,
            p5: 0.5,
            xtrapf: 4.0,
        }
    }
}

impl StrongWolfe {
    pub fn with_ftol(mut self, ftol: Floating) -> Self {
        assert!(ftol > 0.0, "ftol must be positive");
        assert!(ftol < self.gtol, "ftol must be less than gtol");
        self.ftol = ftol;
        self
    }
    pub fn with_gtol(mut self, gtol: Floating) -> Self {
        assert!(gtol > 0.0 && gtol < 1.0, "gtol must lie in (0, 1)");
        assert!(gtol > self.ftol, "gtol must be greater than ftol");
        self.gtol = gtol;
        self
    }
    pub fn with_alpha_bounds(mut self, alpha_min: Floating, alpha_max: Floating) -> Self {
        assert!(alpha_min > 0.0, "alpha_min must be positive");
        assert!(alpha_max > alpha_min, "alpha_max must exceed alpha_min");
        self.alpha_min = alpha_min;
        self.alpha_max = alpha_max;
        self
    }

    /// Safeguarded cubic/quadratic step selection (MINPACK `cstep`). Mutates
    /// `best`/`end` to the updated bracketing interval and returns the new
    /// trial step together with the step-case code: 0 if the triple is
    /// inconsistent (nothing mutated, caller should bail out), 1-4 otherwise.
    fn step_case(
        best: &mut StepPoint,
        end: &mut StepPoint,
        new_pt: StepPoint,
        bracketed: &mut bool,
        alpha_min: Floating,
        alpha_max: Floating,
    ) -> (Floating, i32) {
        let (stx, fx, dx) = (best.alpha, best.f, best.g);
        let (sty, fy, dy) = (end.alpha, end.f, end.g);
        let (stp, fp, dp) = (new_pt.alpha, new_pt.f, new_pt.g);

        let inconsistent = (*bracketed && (stp <= stx.min(sty) || stp >= stx.max(sty)))
            || dx * (stp - stx) >= 0.0
            || alpha_max < alpha_min;
        if inconsistent {
            return (stp, 0);
        }

        let sgnd = dp * (dx / dx.abs());
        let mut stpf;
        let infoc;
        let bound;

        if fp > fx {
            // case 1: the trial increased the value; the interval now brackets a minimizer.
            let theta = 3.0 * (fx - fp) / (stp - stx) + dx + dp;
            let s = theta.abs().max(dx.abs()).max(dp.abs());
            let mut gamma = s * ((theta / s).powi(2) - (dx / s) * (dp / s)).sqrt();
            if stp < stx {
                gamma = -gamma;
            }
            let p = (gamma - dx) + theta;
            let q = ((gamma - dx) + gamma) + dp;
            let r = p / q;
            let stpc = stx + r * (stp - stx);
            let stpq = stx + ((dx / ((fx - fp) / (stp - stx) + dx)) / 2.0) * (stp - stx);
            stpf = if (stpc - stx).abs() < (stpq - stx).abs() {
                stpc
            } else {
                stpc + (stpq - stpc) / 2.0
            };
            if stpf < 0.1 {
                stpf *= 0.01;
            }
            *bracketed = true;
            infoc = 1;
            bound = true;
        } else if sgnd < 0.0 {
            // case 2: lower value, opposite-signed derivatives; a minimizer lies between.
            let theta = 3.0 * (fx - fp) / (stp - stx) + dx + dp;
            let s = theta.abs().max(dx.abs()).max(dp.abs());
            let mut gamma = s * ((theta / s).powi(2) - (dx / s) * (dp / s)).sqrt();
            if stp > stx {
                gamma = -gamma;
            }
            let p = (gamma - dp) + theta;
            let q = ((gamma - dp) + gamma) + dx;
            let r = p / q;
            let stpc = stp + r * (stx - stp);
            let stpq = stp + (dp / (dp - dx)) * (stx - stp);
            stpf = if (stpc - stp).abs() > (stpq - stp).abs() {
                stpc
            } else {
                stpq
            };
            *bracketed = true;
            infoc = 2;
            bound = false;
        } else if dp.abs() < dx.abs() {
            // case 3: lower value, same-signed derivatives, decreasing in magnitude.
            let theta = 3.0 * (fx - fp) / (stp - stx) + dx + dp;
            let s = theta.abs().max(dx.abs()).max(dp.abs());
            let gamma_sq = (theta / s).powi(2) - (dx / s) * (dp / s);
            let mut gamma = s * gamma_sq.max(0.0).sqrt();
            if stp > stx {
                gamma = -gamma;
            }
            let p = (gamma - dp) + theta;
            let q = (gamma + (dx - dp)) + gamma;
            let r = p / q;
            let stpc = if r < 0.0 && gamma != 0.0 {
                stp + r * (stx - stp)
            } else if stp > stx {
                alpha_max
            } else {
                alpha_min
            };
            let stpq = stp + (dp / (dp - dx)) * (stx - stp);
            if *bracketed {
                stpf = if (stpc - stp).abs() < (stpq - stp).abs() {
                    stpc
                } else {
                    stpq
                };
                stpf = if stp > stx {
                    stpf.min(stp + 0.66 * (sty - stp))
                } else {
                    stpf.max(stp + 0.66 * (sty - stp))
                };
            } else {
                stpf = if (stpc - stp).abs() > (stpq - stp).abs() {
                    stpc
                } else {
                    stpq
                };
                stpf = stpf.max(alpha_min).min(alpha_max);
            }
            infoc = 3;
            bound = true;
        } else {
            // case 4: lower value, same-signed derivatives, non-decreasing in magnitude.
            if *bracketed {
                let theta = 3.0 * (fp - fy) / (sty - stp) + dy + dp;
                let s = theta.abs().max(dy.abs()).max(dp.abs());
                let mut gamma = s * ((theta / s).powi(2) - (dy / s) * (dp / s)).sqrt();
                if stp > sty {
                    gamma = -gamma;
                }
                let p = (gamma - dp) + theta;
                let q = ((gamma - dp) + gamma) + dy;
                let r = p / q;
                stpf = stp + r * (sty - stp);
            } else if stp > stx {
                stpf = alpha_max;
            } else {
                stpf = alpha_min;
            }
            infoc = 4;
            bound = false;
        }

        if fp > fx {
            *end = new_pt;
        } else {
            if sgnd < 0.0 {
                *end = *best;
            }
            *best = new_pt;
        }

        stpf = stpf.max(alpha_min).min(alpha_max);
        if *bracketed && bound {
            stpf = if end.alpha > best.alpha {
                stpf.min(best.alpha + 0.66 * (end.alpha - best.alpha))
            } else {
                stpf.max(best.alpha + 0.66 * (end.alpha - best.alpha))
            };
        }

        (stpf, infoc)
    }
}

impl LineSearch for StrongWolfe {
    fn compute_step_len(
        &mut self,
        x_k: &DVector<Floating>,
        eval_x_k: &FuncEvalMultivariate,
        direction_k: &mut DVector<Floating>,
        oracle: &impl Fn(&DVector<Floating>) -> FuncEvalMultivariate,
        max_iter: usize,
        is_first_iteration: bool,
        tol: Floating,
    ) -> Result<LineSearchStep, LbfgsError> {
        let f0 = *eval_x_k.f();
        let mut g0 = *FuncEvalUnivariate::directional(eval_x_k, direction_k).g();
        if g0 >= 0.0 {
            debug!(target: "strong_wolfe", "non-descent direction (g0 = {:.3e}); falling back to steepest descent", g0);
            *direction_k = -eval_x_k.g().clone();
            g0 = *FuncEvalUnivariate::directional(eval_x_k, direction_k).g();
        }
        let direction: &DVector<Floating> = direction_k;

        let mut best = StepPoint {
            alpha: 0.0,
            f: f0,
            g: g0,
        };
        let mut end = best;
        let mut new_pt = StepPoint {
            alpha: if is_first_iteration { 0.1 } else { 1.0 },
            f: f0,
            g: g0,
        };

        let mut bracketed = false;
        let mut stage1 = true;
        let mut infoc = 1i32;
        let mut width = self.alpha_max - self.alpha_min;
        let mut width1 = 2.0 * width;
        let mut latest_eval = eval_x_k.clone();
        let mut evaluations = 0usize;

        for iter in 0..max_iter {
            let (lo, hi) = if bracketed {
                (best.alpha.min(end.alpha), best.alpha.max(end.alpha))
            } else {
                (
                    best.alpha,
                    new_pt.alpha + self.xtrapf * (new_pt.alpha - best.alpha),
                )
            };

            new_pt.alpha = new_pt.alpha.max(self.alpha_min).min(self.alpha_max);

            if (bracketed && (new_pt.alpha <= lo || new_pt.alpha >= hi))
                || iter + 1 >= max_iter
                || infoc == 0
                || (bracketed && hi - lo <= tol * hi)
            {
                new_pt.alpha = best.alpha;
            }

            let trial_x = x_k + direction * new_pt.alpha;
            let eval_t = oracle(&trial_x);
            evaluations += 1;
            let projected = FuncEvalUnivariate::directional(&eval_t, direction);
            new_pt.f = *projected.f();
            new_pt.g = *projected.g();
            latest_eval = eval_t;

            let ftest1 = f0 + new_pt.alpha * self.ftol * g0;
            let mut info = 0;
            if (bracketed && (new_pt.alpha <= lo || new_pt.alpha >= hi)) || infoc == 0 {
                info = 6;
            }
            if new_pt.alpha == self.alpha_max && new_pt.f <= ftest1 && new_pt.g <= self.ftol * g0 {
                info = 5;
            }
            if new_pt.alpha == self.alpha_min
                && (new_pt.f > ftest1 || new_pt.g >= self.ftol * g0)
            {
                info = 4;
            }
            if iter + 1 >= max_iter {
                info = 3;
            }
            if bracketed && hi - lo <= tol * hi {
                info = 2;
            }
            if new_pt.f <= ftest1 && new_pt.g.abs() <= self.gtol * (-g0) {
                info = 1;
            }

            if info != 0 {
                trace!(target: "strong_wolfe", "terminating at iteration {} with info code {}", iter, info);
                return if info == 3 {
                    Err(LbfgsError::MaxEvaluationsExceeded)
                } else {
                    Ok(LineSearchStep::new(
                        new_pt.alpha,
                        latest_eval,
                        new_pt.g,
                        evaluations,
                    ))
                };
            }

            if stage1 && new_pt.f <= ftest1 && new_pt.g >= self.ftol.min(self.gtol) * g0 {
                stage1 = false;
            }

            let (next_alpha, step_infoc) = if stage1 && new_pt.f <= best.f && new_pt.f > ftest1 {
                // Stage 1 preserves a linear pseudo-function: the trial is an
                // improvement over `best` but not yet a sufficient decrease.
                let shift = |p: &StepPoint| StepPoint {
                    alpha: p.alpha,
                    f: p.f - p.alpha * self.ftol * g0,
                    g: p.g - self.ftol * g0,
                };
                let mut mbest = shift(&best);
                let mut mend = shift(&end);
                let mnew = shift(&new_pt);
                let (a, c) = StrongWolfe::step_case(
                    &mut mbest,
                    &mut mend,
                    mnew,
                    &mut bracketed,
                    self.alpha_min,
                    self.alpha_max,
                );
                best = StepPoint {
                    alpha: mbest.alpha,
                    f: mbest.f + mbest.alpha * self.ftol * g0,
                    g: mbest.g + self.ftol * g0,
                };
                end = StepPoint {
                    alpha: mend.alpha,
                    f: mend.f + mend.alpha * self.ftol * g0,
                    g: mend.g + self.ftol * g0,
                };
                (a, c)
            } else {
                StrongWolfe::step_case(
                    &mut best,
                    &mut end,
                    new_pt,
                    &mut bracketed,
                    self.alpha_min,
                    self.alpha_max,
                )
            };

            new_pt.alpha = next_alpha;
            infoc = step_infoc;

            if bracketed {
                if (end.alpha - best.alpha).abs() >= self.p66 * width1 {
                    new_pt.alpha = best.alpha + self.p5 * (end.alpha - best.alpha);
                }
                width1 = width;
                width = (end.alpha - best.alpha).abs();
            }
        }

        Err(LbfgsError::MaxEvaluationsExceeded)
    }
}

#[cfg(test)]
mod strong_wolfe_test {
    use super::*;

    fn quadratic(gamma: Floating) -> impl Fn(&DVector<Floating>) -> FuncEvalMultivariate {
        move |x: &DVector<Floating>| -> FuncEvalMultivariate {
            let f = 0.5 * (x[0].powi(2) + gamma * x[1].powi(2));
            let g = DVector::from(vec![x[0], gamma * x[1]]);
            (f, g).into()
        }
    }

    #[test]
    fn satisfies_strong_wolfe_on_a_quadratic() {
        let f_and_g = quadratic(90.0);
        let x = DVector::from(vec![180.0, 152.0]);
        let eval = f_and_g(&x);
        let mut direction = -eval.g().clone();
        let mut ls = StrongWolfe::default();

        let step = ls
            .compute_step_len(&x, &eval, &mut direction, &f_and_g, 50, true, 1e-10)
            .unwrap();

        let f0 = *eval.f();
        let g0 = eval.g().dot(&direction);
        assert!(*step.eval().f() <= f0 + step.alpha() * 1e-4 * g0);
        assert!(step.directional_g().abs() <= 0.9 * g0.abs());
    }

    #[test]
    fn flips_a_non_descent_direction() {
        let f_and_g = quadratic(1.0);
        let x = DVector::from(vec![2.0, 2.0]);
        let eval = f_and_g(&x);
        let mut direction = eval.g().clone(); // ascent direction on purpose
        let mut ls = StrongWolfe::default();

        let step = ls
            .compute_step_len(&x, &eval, &mut direction, &f_and_g, 50, true, 1e-10)
            .unwrap();

        assert_eq!(direction, -eval.g());
        assert!(*step.eval().f() <= *eval.f());
    }
}
