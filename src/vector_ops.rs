use super::*;

// Pure elementwise primitives over `DVector<Floating>`. Thin wrappers so call
// sites read the same whether the underlying storage is a nalgebra vector or
// a raw slice; no failure modes, NaN/Inf propagate like any other float op.

pub fn norm2(v: &DVector<Floating>) -> Floating {
    v.norm()
}

pub fn norm1(v: &DVector<Floating>) -> Floating {
    v.iter().map(|x| x.abs()).sum()
}

pub fn inner(a: &DVector<Floating>, b: &DVector<Floating>) -> Floating {
    a.dot(b)
}

pub fn scale_in_place(v: &mut DVector<Floating>, c: Floating) {
    v.scale_mut(c);
}

/// `out <- a + c*b`. Safe to call with `out` holding a stale or garbage
/// buffer the caller wants to recycle in place of `a`'s allocation.
pub fn plus_and_const_mult(
    a: &DVector<Floating>,
    b: &DVector<Floating>,
    c: Floating,
    out: &mut DVector<Floating>,
) {
    out.copy_from(a);
    out.axpy(c, b, 1.0);
}

pub fn min_component(v: &DVector<Floating>) -> Floating {
    v.iter().cloned().fold(Floating::INFINITY, Floating::min)
}

pub fn max_component(v: &DVector<Floating>) -> Floating {
    v.iter()
        .cloned()
        .fold(Floating::NEG_INFINITY, Floating::max)
}
