use super::*;
use std::collections::VecDeque;

/// Initial inverse-Hessian approximation applied inside the two-loop
/// recursion before the second loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingStrategy {
    /// `v <- gamma * v` with a single scalar `gamma = s.y / y.y`.
    Scalar,
    /// `v_i <- v_i / d_i` with a per-coordinate diagonal `d`.
    #[default]
    Diagonal,
}

/// Result of a single `CurvatureHistory::update` call. The driver dispatches
/// on this instead of treating a skipped update as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    Accepted,
    NegativeCurvature,
    ZeroGradientDifference,
}

/// Bounded FIFO of curvature pairs `(s_i, y_i, rho_i)` plus the running
/// scaling state (`gamma` or the diagonal `d`), capped at `m` entries.
/// Evicted `s`/`y` buffers are recycled in place for the next accepted pair
/// rather than dropped and reallocated.
#[derive(Debug)]
pub struct CurvatureHistory {
    m: usize,
    scaling: ScalingStrategy,
    s: VecDeque<DVector<Floating>>,
    y: VecDeque<DVector<Floating>>,
    rho: VecDeque<Floating>,
    gamma: Floating,
    d: Option<DVector<Floating>>,
}

impl CurvatureHistory {
    pub fn new(m: usize, scaling: ScalingStrategy) -> Self {
        CurvatureHistory {
            m,
            scaling,
            s: VecDeque::with_capacity(m),
            y: VecDeque::with_capacity(m),
            rho: VecDeque::with_capacity(m),
            gamma: 1.0,
            d: None,
        }
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    pub fn memory(&self) -> usize {
        self.m
    }

    pub fn clear(&mut self) {
        self.s.clear();
        self.y.clear();
        self.rho.clear();
        self.gamma = 1.0;
        self.d = None;
    }

    /// Oldest-to-newest view of the stored triples.
    pub fn pairs(
        &self,
    ) -> impl DoubleEndedIterator<Item = (&DVector<Floating>, &DVector<Floating>, Floating)> + ExactSizeIterator
    {
        self.s
            .iter()
            .zip(self.y.iter())
            .zip(self.rho.iter())
            .map(|((s, y), rho)| (s, y, *rho))
    }

    pub fn apply_initial_hessian(&self, v: &mut DVector<Floating>) -> Result<(), LbfgsError> {
        match self.scaling {
            ScalingStrategy::Scalar => {
                vector_ops::scale_in_place(v, self.gamma);
                Ok(())
            }
            ScalingStrategy::Diagonal => match &self.d {
                None => Ok(()),
                Some(d) => {
                    if d.len() != v.len() {
                        return Err(LbfgsError::DimensionMismatch {
                            expected: d.len(),
                            found: v.len(),
                        });
                    }
                    for i in 0..v.len() {
                        v[i] /= d[i];
                    }
                    Ok(())
                }
            },
        }
    }

    pub(crate) fn update(
        &mut self,
        x_new: &DVector<Floating>,
        x_old: &DVector<Floating>,
        g_new: &DVector<Floating>,
        g_old: &DVector<Floating>,
    ) -> UpdateOutcome {
        if self.m == 0 {
            return UpdateOutcome::Accepted;
        }

        let s = x_new - x_old;
        let y = g_new - g_old;
        let sy = vector_ops::inner(&s, &y);
        let yy = vector_ops::inner(&y, &y);

        if sy < 0.0 {
            return UpdateOutcome::NegativeCurvature;
        }
        if yy == 0.0 {
            return UpdateOutcome::ZeroGradientDifference;
        }

        match self.scaling {
            ScalingStrategy::Scalar => {
                self.gamma = sy / yy;
            }
            ScalingStrategy::Diagonal => {
                let n = s.len();
                let d = self.d.get_or_insert_with(|| DVector::from_element(n, 1.0));
                let mut s_ds = 0.0;
                for i in 0..n {
                    s_ds += s[i] * (self.gamma * d[i]) * s[i];
                }
                for i in 0..n {
                    let di = self.gamma * d[i];
                    d[i] = (1.0 - (di * s[i] * s[i]) / s_ds) * di + y[i] * y[i] / sy;
                }
                let min_d = vector_ops::min_component(d);
                let max_d = vector_ops::max_component(d);
                if min_d <= 0.0 || max_d.is_infinite() || max_d / min_d > 1e12 {
                    for i in 0..n {
                        d[i] = yy / sy;
                    }
                }
            }
        }

        if self.s.len() == self.m {
            let mut old_s = self.s.pop_front().expect("len == m > 0");
            let mut old_y = self.y.pop_front().expect("len == m > 0");
            self.rho.pop_front();
            old_s.copy_from(&s);
            old_y.copy_from(&y);
            self.s.push_back(old_s);
            self.y.push_back(old_y);
        } else {
            self.s.push_back(s);
            self.y.push_back(y);
        }
        self.rho.push_back(1.0 / sy);

        UpdateOutcome::Accepted
    }

    /// Evicts the oldest triple and permanently shrinks the capacity by one.
    /// Exposed for completeness (`spec.md`'s `OutOfMemory` recovery path);
    /// the recycling scheme above never actually runs out of storage, so the
    /// hot loop never calls this.
    pub fn shrink_capacity(&mut self) -> Result<(), LbfgsError> {
        if self.m == 0 {
            return Err(LbfgsError::OutOfMemory);
        }
        self.m -= 1;
        if self.s.len() > self.m {
            self.s.pop_front();
            self.y.pop_front();
            self.rho.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod history_test {
    use super::*;

    fn pair(s: Floating, y: Floating) -> (DVector<Floating>, DVector<Floating>) {
        (DVector::from_vec(vec![s, s]), DVector::from_vec(vec![y, y]))
    }

    #[test]
    fn positive_curvature_is_stored() {
        let mut h = CurvatureHistory::new(3, ScalingStrategy::Scalar);
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let x1 = DVector::from_vec(vec![1.0, 1.0]);
        let g0 = DVector::from_vec(vec![2.0, 2.0]);
        let g1 = DVector::from_vec(vec![1.0, 1.0]);
        let outcome = h.update(&x1, &x0, &g1, &g0);
        assert_eq!(outcome, UpdateOutcome::Accepted);
        assert_eq!(h.len(), 1);
        for (s, y, rho) in h.pairs() {
            let sy = vector_ops::inner(s, y);
            assert!(sy > 0.0);
            assert_eq!(rho, 1.0 / sy);
        }
    }

    #[test]
    fn negative_curvature_is_skipped() {
        // s = 1, y = -1 => s.y < 0
        let x_old = DVector::from_vec(vec![0.0]);
        let x_new = DVector::from_vec(vec![1.0]);
        let g_old = DVector::from_vec(vec![1.0]);
        let g_new = DVector::from_vec(vec![0.0]);
        let mut h = CurvatureHistory::new(3, ScalingStrategy::Scalar);
        let outcome = h.update(&x_new, &x_old, &g_new, &g_old);
        assert_eq!(outcome, UpdateOutcome::NegativeCurvature);
        assert!(h.is_empty());
    }

    #[test]
    fn capacity_is_enforced_with_recycling() {
        let mut h = CurvatureHistory::new(2, ScalingStrategy::Scalar);
        let mut x = DVector::from_vec(vec![10.0, 10.0]);
        let mut g = DVector::from_vec(vec![10.0, 10.0]);
        for _ in 0..5 {
            let (s, y) = pair(1.0, 0.5);
            let x_new = &x + &s;
            let g_new = &g + &y;
            h.update(&x_new, &x, &g_new, &g);
            x = x_new;
            g = g_new;
        }
        assert_eq!(h.len(), 2);
        assert!(h.len() <= h.memory());
    }

    #[test]
    fn diagonal_conditioning_stays_bounded() {
        let mut h = CurvatureHistory::new(5, ScalingStrategy::Diagonal);
        let mut x = DVector::from_vec(vec![1.0, 1.0]);
        let mut g = DVector::from_vec(vec![1.0, 1.0]);
        for i in 0..4 {
            let s = DVector::from_vec(vec![0.1 * (i as Floating + 1.0), 0.01]);
            let y = DVector::from_vec(vec![0.2 * (i as Floating + 1.0), 0.02]);
            let x_new = &x + &s;
            let g_new = &g + &y;
            h.update(&x_new, &x, &g_new, &g);
            x = x_new;
            g = g_new;
        }
        let d = h.d.as_ref().unwrap();
        let min_d = vector_ops::min_component(d);
        let max_d = vector_ops::max_component(d);
        assert!(min_d > 0.0);
        assert!(max_d / min_d <= 1e12);
    }

    #[test]
    fn shrink_capacity_evicts_oldest_and_lowers_memory() {
        let mut h = CurvatureHistory::new(3, ScalingStrategy::Scalar);
        let mut x = DVector::from_vec(vec![0.0, 0.0]);
        let mut g = DVector::from_vec(vec![10.0, 10.0]);
        for _ in 0..3 {
            let (s, y) = pair(1.0, 0.5);
            let x_new = &x + &s;
            let g_new = &g + &y;
            h.update(&x_new, &x, &g_new, &g);
            x = x_new;
            g = g_new;
        }
        assert_eq!(h.len(), 3);

        h.shrink_capacity().unwrap();
        assert_eq!(h.memory(), 2);
        assert_eq!(h.len(), 2);

        h.shrink_capacity().unwrap();
        h.shrink_capacity().unwrap();
        assert_eq!(h.memory(), 0);
        assert!(h.is_empty());

        assert!(matches!(h.shrink_capacity(), Err(LbfgsError::OutOfMemory)));
    }
}
