use super::*;

/// Result of evaluating the objective at a point `x`: value and gradient.
/// Builder pattern, matching the calling convention every solver in this
/// crate family expects from its oracle closure.
#[derive(derive_getters::Getters, Debug, Clone)]
pub struct FuncEvalMultivariate {
    f: Floating,
    g: DVector<Floating>,
}

impl FuncEvalMultivariate {
    pub fn new(f: Floating, g: DVector<Floating>) -> Self {
        FuncEvalMultivariate { f, g }
    }
}

impl From<(Floating, DVector<Floating>)> for FuncEvalMultivariate {
    fn from(value: (Floating, DVector<Floating>)) -> Self {
        let (f, g) = value;
        FuncEvalMultivariate::new(f, g)
    }
}

/// Restriction of a multivariate evaluation to a ray `x + t*direction`:
/// `phi(t) = f(x + t*direction)`, `phi'(t) = <grad f(x + t*direction), direction>`.
#[derive(derive_getters::Getters, Debug, Clone, Copy)]
pub struct FuncEvalUnivariate {
    f: Floating,
    g: Floating,
}

impl FuncEvalUnivariate {
    pub fn new(f: Floating, g: Floating) -> Self {
        FuncEvalUnivariate { f, g }
    }

    /// Projects a multivariate evaluation onto the ray spanned by `direction`.
    pub fn directional(eval: &FuncEvalMultivariate, direction: &DVector<Floating>) -> Self {
        let g = eval.g().dot(direction);
        FuncEvalUnivariate::new(*eval.f(), g)
    }
}
