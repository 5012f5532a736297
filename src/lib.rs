#![allow(clippy::needless_range_loop)]

//! Planned, batched non-uniform fast Fourier transforms in 1-3
//! dimensions, to a user-prescribed tolerance.
//!
//! All three kinds are unnormalised sums of complex exponentials:
//! type 1 computes `f[k] = sum_j c[j] e^{i sign k.x_j}`, type 2 its
//! transpose `c[j] = sum_k f[k] e^{i sign k.x_j}`, and type 3
//! `f[k] = sum_j c[j] e^{i sign s_k.x_j}` at non-uniform target
//! frequencies; no `1/n` factor is ever applied.

use num_traits::{Float, FromPrimitive, Signed};
use rustfft::num_complex::Complex;
use std::fmt::Debug;

pub mod deconvolve;
pub mod fft;
pub mod grid;
pub mod kernel;
pub mod opts;
pub mod plan;
pub mod prelude;
pub mod quadrature;
pub mod spread;

use crate::opts::{NufftOpts, NufftResult};
use crate::plan::{NufftPlan, TransformKind};

////////////
// Traits //
////////////

/// Trait for floating-point types driven through the whole pipeline
pub trait NufftFloat: Float + FromPrimitive + Signed + Send + Sync + Debug + 'static {}
impl<T: Float + FromPrimitive + Signed + Send + Sync + Debug + 'static> NufftFloat for T {}

//////////////////////
// One-shot drivers //
//////////////////////

/// 1-d type 1: non-uniform points to `ms` uniform modes
///
/// Plans, binds, executes and drops a single-transform plan; use
/// [`NufftPlan`] directly to amortise planning over repeated executes
/// or batched transforms.
///
/// ### Params
///
/// * `x` - Point coordinates in `[-3 pi, 3 pi]`
/// * `c` - One strength per point
/// * `sign` - Sign of `i` in the exponential
/// * `tol` - Requested relative tolerance
/// * `ms` - Number of output modes
/// * `opts` - Options record
///
/// ### Returns
///
/// The `ms` mode coefficients, ordered per `opts.modeord`.
pub fn nufft_1d1<T: NufftFloat>(
    x: &[T],
    c: &[Complex<T>],
    sign: i32,
    tol: f64,
    ms: usize,
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type1, 1, &[ms], sign, 1, tol, opts)?;
    plan.set_points(x, None, None)?;
    let mut strengths = c.to_vec();
    let mut f = vec![Complex::new(T::zero(), T::zero()); ms];
    plan.execute(&mut strengths, &mut f)?;
    Ok(f)
}

/// 1-d type 2: uniform modes to values at non-uniform points
pub fn nufft_1d2<T: NufftFloat>(
    x: &[T],
    f: &[Complex<T>],
    sign: i32,
    tol: f64,
    ms: usize,
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type2, 1, &[ms], sign, 1, tol, opts)?;
    plan.set_points(x, None, None)?;
    let mut modes = f.to_vec();
    let mut c = vec![Complex::new(T::zero(), T::zero()); x.len()];
    plan.execute(&mut c, &mut modes)?;
    Ok(c)
}

/// 1-d type 3: non-uniform points to non-uniform target frequencies
pub fn nufft_1d3<T: NufftFloat>(
    x: &[T],
    c: &[Complex<T>],
    sign: i32,
    tol: f64,
    s: &[T],
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type3, 1, &[], sign, 1, tol, opts)?;
    plan.set_points_type3(x, None, None, s, None, None)?;
    let mut strengths = c.to_vec();
    let mut f = vec![Complex::new(T::zero(), T::zero()); s.len()];
    plan.execute(&mut strengths, &mut f)?;
    Ok(f)
}

/// 2-d type 1; output is `[mt, ms]` with the `ms` axis fastest
#[allow(clippy::too_many_arguments)]
pub fn nufft_2d1<T: NufftFloat>(
    x: &[T],
    y: &[T],
    c: &[Complex<T>],
    sign: i32,
    tol: f64,
    ms: usize,
    mt: usize,
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type1, 2, &[ms, mt], sign, 1, tol, opts)?;
    plan.set_points(x, Some(y), None)?;
    let mut strengths = c.to_vec();
    let mut f = vec![Complex::new(T::zero(), T::zero()); ms * mt];
    plan.execute(&mut strengths, &mut f)?;
    Ok(f)
}

/// 2-d type 2
#[allow(clippy::too_many_arguments)]
pub fn nufft_2d2<T: NufftFloat>(
    x: &[T],
    y: &[T],
    f: &[Complex<T>],
    sign: i32,
    tol: f64,
    ms: usize,
    mt: usize,
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type2, 2, &[ms, mt], sign, 1, tol, opts)?;
    plan.set_points(x, Some(y), None)?;
    let mut modes = f.to_vec();
    let mut c = vec![Complex::new(T::zero(), T::zero()); x.len()];
    plan.execute(&mut c, &mut modes)?;
    Ok(c)
}

/// 2-d type 3
#[allow(clippy::too_many_arguments)]
pub fn nufft_2d3<T: NufftFloat>(
    x: &[T],
    y: &[T],
    c: &[Complex<T>],
    sign: i32,
    tol: f64,
    s: &[T],
    t: &[T],
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type3, 2, &[], sign, 1, tol, opts)?;
    plan.set_points_type3(x, Some(y), None, s, Some(t), None)?;
    let mut strengths = c.to_vec();
    let mut f = vec![Complex::new(T::zero(), T::zero()); s.len()];
    plan.execute(&mut strengths, &mut f)?;
    Ok(f)
}

/// 3-d type 1; output is `[mu, mt, ms]` with the `ms` axis fastest
#[allow(clippy::too_many_arguments)]
pub fn nufft_3d1<T: NufftFloat>(
    x: &[T],
    y: &[T],
    z: &[T],
    c: &[Complex<T>],
    sign: i32,
    tol: f64,
    ms: usize,
    mt: usize,
    mu: usize,
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type1, 3, &[ms, mt, mu], sign, 1, tol, opts)?;
    plan.set_points(x, Some(y), Some(z))?;
    let mut strengths = c.to_vec();
    let mut f = vec![Complex::new(T::zero(), T::zero()); ms * mt * mu];
    plan.execute(&mut strengths, &mut f)?;
    Ok(f)
}

/// 3-d type 2
#[allow(clippy::too_many_arguments)]
pub fn nufft_3d2<T: NufftFloat>(
    x: &[T],
    y: &[T],
    z: &[T],
    f: &[Complex<T>],
    sign: i32,
    tol: f64,
    ms: usize,
    mt: usize,
    mu: usize,
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type2, 3, &[ms, mt, mu], sign, 1, tol, opts)?;
    plan.set_points(x, Some(y), Some(z))?;
    let mut modes = f.to_vec();
    let mut c = vec![Complex::new(T::zero(), T::zero()); x.len()];
    plan.execute(&mut c, &mut modes)?;
    Ok(c)
}

/// 3-d type 3
#[allow(clippy::too_many_arguments)]
pub fn nufft_3d3<T: NufftFloat>(
    x: &[T],
    y: &[T],
    z: &[T],
    c: &[Complex<T>],
    sign: i32,
    tol: f64,
    s: &[T],
    t: &[T],
    u: &[T],
    opts: &NufftOpts,
) -> NufftResult<Vec<Complex<T>>> {
    let mut plan = NufftPlan::new(TransformKind::Type3, 3, &[], sign, 1, tol, opts)?;
    plan.set_points_type3(x, Some(y), Some(z), s, Some(t), Some(u))?;
    let mut strengths = c.to_vec();
    let mut f = vec![Complex::new(T::zero(), T::zero()); s.len()];
    plan.execute(&mut strengths, &mut f)?;
    Ok(f)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod driver_tests {
    use super::*;
    use crate::opts::default_options;
    use std::f64::consts::PI;

    #[test]
    fn one_shot_driver_matches_plan_lifecycle() {
        let opts = default_options();
        let x = vec![-1.1, 0.0, 0.7, 2.4];
        let c: Vec<Complex<f64>> = (0..4)
            .map(|i| Complex::new(1.0 + i as f64, -0.5 * i as f64))
            .collect();
        let ms = 10;

        let quick = nufft_1d1(&x, &c, 1, 1e-9, ms, &opts).unwrap();

        let mut plan = NufftPlan::new(TransformKind::Type1, 1, &[ms], 1, 1, 1e-9, &opts).unwrap();
        plan.set_points(&x, None, None).unwrap();
        let mut strengths = c.clone();
        let mut f = vec![Complex::new(0.0, 0.0); ms];
        plan.execute(&mut strengths, &mut f).unwrap();

        for (a, b) in quick.iter().zip(&f) {
            assert!((a - b).norm() < 1e-13);
        }
    }

    #[test]
    fn type2_driver_evaluates_a_pure_mode() {
        // f holding a single mode k=1 must evaluate to e^{i sign x}
        let opts = default_options();
        let ms = 5; // CMCL modes -2..=2, k=1 sits at index 3
        let mut f = vec![Complex::new(0.0, 0.0); ms];
        f[3] = Complex::new(1.0, 0.0);
        let x = vec![0.0, PI / 3.0, -1.9];
        let c = nufft_1d2(&x, &f, -1, 1e-12, ms, &opts).unwrap();
        for (xi, ci) in x.iter().zip(&c) {
            let want = Complex::new(xi.cos(), -xi.sin());
            assert!((ci - want).norm() < 1e-10, "x={} got={}", xi, ci);
        }
    }
}
