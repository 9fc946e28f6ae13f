use super::*;

pub type Floating = f64;
