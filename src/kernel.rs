use num_traits::{Float, FromPrimitive};
use std::f64::consts::PI;

use crate::opts::{KernelEvalMethod, NufftWarning};
use crate::NufftFloat;

/////////////
// Globals //
/////////////

/// Widest supported stencil; reached near double machine precision
pub const MAX_KERNEL_WIDTH: usize = 16;
/// Narrowest useful stencil
pub const MIN_KERNEL_WIDTH: usize = 2;

const MIN_TOLERANCE: f64 = 1e-15;
/// The widest kernel cannot reach below this at sigma = 1.25
const MIN_TOLERANCE_LOW_UPSAMP: f64 = 2e-10;
const MAX_TOLERANCE: f64 = 0.5;

// Shape-constant prefactors beta = gamma_beta * pi * (1 - 1/(2 sigma)) * w;
// the first reproduces the classical 2.30*w at sigma = 2.0.
const BETA_GAMMA_STD: f64 = 0.976;
const BETA_GAMMA_LOW: f64 = 0.97;

////////////////
// Parameters //
////////////////

/// Exponential-of-semicircle spreading window
///
/// `psi(z) = exp(beta * (sqrt(1 - (2z/w)^2) - 1))` for `|z| <= w/2` in
/// fine-grid units, zero outside. Width and shape are chosen together
/// from the requested tolerance and oversampling ratio.
///
/// ### Fields
///
/// * `width` - Stencil width `w` in grid points
/// * `padded_width` - `width` rounded up to a multiple of 4 when kernel
///   padding is on; the stencil buffer length
/// * `beta` - Shape parameter
/// * `half_width` - `w/2` in grid units
/// * `upsampfac` - Oversampling ratio the pair was chosen for
/// * `eval_method` - Hot-path evaluation method
#[derive(Debug, Clone)]
pub struct KernelParams<T> {
    pub width: usize,
    pub padded_width: usize,
    pub beta: T,
    pub half_width: T,
    pub upsampfac: f64,
    pub eval_method: KernelEvalMethod,
}

impl<T> KernelParams<T>
where
    T: Float + FromPrimitive,
{
    /// Choose kernel width and shape for a requested tolerance
    ///
    /// Tolerances outside the supported range are clamped and reported
    /// through the returned warning; planning continues.
    ///
    /// ### Params
    ///
    /// * `tol` - Requested relative tolerance
    /// * `upsampfac` - Oversampling ratio, 2.0 or 1.25 (validated upstream)
    /// * `kerpad` - Pad the stencil buffer to a multiple of 4
    /// * `eval_method` - Hot-path evaluation method
    ///
    /// ### Returns
    ///
    /// The kernel parameters and, when the tolerance was clamped, the
    /// warning describing what happened.
    pub fn from_tolerance(
        tol: f64,
        upsampfac: f64,
        kerpad: bool,
        eval_method: KernelEvalMethod,
    ) -> (Self, Option<NufftWarning>) {
        let floor = if upsampfac >= 2.0 {
            MIN_TOLERANCE
        } else {
            MIN_TOLERANCE_LOW_UPSAMP
        };
        let clamped = tol.clamp(floor, MAX_TOLERANCE);
        let warning = if clamped != tol {
            Some(NufftWarning::ToleranceClamped {
                requested: tol,
                clamped,
            })
        } else {
            None
        };

        // width at sigma = 2 follows the one-digit-per-point rule; the
        // smaller oversampling ratio needs more points per digit, set by
        // the kernel's exponential decay rate pi*sqrt(1 - 1/sigma)
        let width = if upsampfac >= 2.0 {
            ((1.0 / clamped).log10() - 1e-9).ceil() as usize + 1
        } else {
            let rate = PI * (1.0 - 1.0 / upsampfac).sqrt();
            ((1.0 / clamped).ln() / rate).ceil() as usize
        };
        let width = width.clamp(MIN_KERNEL_WIDTH, MAX_KERNEL_WIDTH);

        let gamma_beta = if upsampfac >= 2.0 {
            BETA_GAMMA_STD
        } else {
            BETA_GAMMA_LOW
        };
        let beta = gamma_beta * PI * (1.0 - 0.5 / upsampfac) * width as f64;

        let padded_width = if kerpad { width.div_ceil(4) * 4 } else { width };

        (
            Self {
                width,
                padded_width,
                beta: T::from_f64(beta).unwrap(),
                half_width: T::from_f64(width as f64 / 2.0).unwrap(),
                upsampfac,
                eval_method,
            },
            warning,
        )
    }

    /// Evaluate the window at one point (grid units), zero outside support
    #[inline]
    pub fn evaluate(&self, z: T) -> T {
        if z.abs() >= self.half_width {
            return T::zero();
        }
        let u = z / self.half_width;
        (self.beta * ((T::one() - u * u).sqrt() - T::one())).exp()
    }
}

///////////////////
// Horner tables //
///////////////////

/// Piecewise-polynomial rendition of the window, one polynomial per
/// stencil offset, fitted at plan time for the exact `(w, beta)` in use
///
/// The free coordinate is `z = 2*(x1 + w/2) - 1` in `[-1, 1)`, where
/// `x1` is the offset of the leftmost stencil point from the non-uniform
/// point. Polynomials are stored in Newton form at Chebyshev nodes and
/// evaluated nested, which keeps the fit stable at the widths needed
/// near machine precision.
#[derive(Debug, Clone)]
pub struct HornerKernel<T> {
    width: usize,
    n_coef: usize,
    nodes: Vec<T>,
    /// `width` blocks of `n_coef` Newton coefficients
    coeffs: Vec<T>,
}

impl<T> HornerKernel<T>
where
    T: Float + FromPrimitive,
{
    /// Fit the table for the given kernel parameters
    pub fn new(params: &KernelParams<T>) -> Self {
        let width = params.width;
        let n_coef = width + 4;

        // Chebyshev nodes of the first kind on [-1, 1]
        let mut nodes = Vec::with_capacity(n_coef);
        for k in 0..n_coef {
            let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * n_coef as f64);
            nodes.push(T::from_f64(theta.cos()).unwrap());
        }

        let half = T::from_f64(0.5).unwrap();
        let mut coeffs = vec![T::zero(); width * n_coef];
        for j in 0..width {
            let block = &mut coeffs[j * n_coef..(j + 1) * n_coef];
            for (k, &zk) in nodes.iter().enumerate() {
                // kernel argument of stencil offset j at parameter z
                let x = T::from_usize(j).unwrap() - params.half_width + (zk + T::one()) * half;
                block[k] = params.evaluate(x);
            }
            // divided differences in place -> Newton coefficients
            for lvl in 1..n_coef {
                for i in (lvl..n_coef).rev() {
                    block[i] = (block[i] - block[i - 1]) / (nodes[i] - nodes[i - lvl]);
                }
            }
        }

        Self {
            width,
            n_coef,
            nodes,
            coeffs,
        }
    }

    /// Evaluate all `width` stencil values at parameter `z` in `[-1, 1)`
    #[inline]
    pub fn eval(&self, z: T, out: &mut [T]) {
        for j in 0..self.width {
            let block = &self.coeffs[j * self.n_coef..(j + 1) * self.n_coef];
            let mut p = block[self.n_coef - 1];
            for i in (0..self.n_coef - 1).rev() {
                p = block[i] + (z - self.nodes[i]) * p;
            }
            out[j] = p;
        }
    }
}

///////////////
// Evaluator //
///////////////

/// Bundles the parameters with the optional fitted table and dispatches
/// stencil evaluation
#[derive(Debug, Clone)]
pub struct KernelEvaluator<T> {
    pub params: KernelParams<T>,
    horner: Option<HornerKernel<T>>,
}

impl<T> KernelEvaluator<T>
where
    T: NufftFloat,
{
    pub fn new(params: KernelParams<T>) -> Self {
        let horner = match params.eval_method {
            KernelEvalMethod::Horner => Some(HornerKernel::new(&params)),
            KernelEvalMethod::Direct => None,
        };
        Self { params, horner }
    }

    /// Evaluate the stencil `psi(x1 + j)` for `j = 0..width`
    ///
    /// `x1` is the leftmost stencil offset, in `[-w/2, -w/2 + 1)`. `out`
    /// must hold at least `padded_width` values; the padded tail is
    /// zeroed so padded inner loops only ever add zeros.
    #[inline]
    pub fn stencil(&self, x1: T, out: &mut [T]) {
        let w = self.params.width;
        match &self.horner {
            Some(table) => {
                let z = (x1 + self.params.half_width) * T::from_f64(2.0).unwrap() - T::one();
                table.eval(z, out);
            }
            None => {
                // branch-free: clamp the radicand instead of testing
                // support, valid since stencil offsets stay inside it
                let inv_half = T::one() / self.params.half_width;
                for j in 0..w {
                    let u = (x1 + T::from_usize(j).unwrap()) * inv_half;
                    let r = (T::one() - u * u).max(T::zero());
                    out[j] = (self.params.beta * (r.sqrt() - T::one())).exp();
                }
            }
        }
        for v in out.iter_mut().take(self.params.padded_width).skip(w) {
            *v = T::zero();
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.params.width
    }

    #[inline]
    pub fn padded_width(&self) -> usize {
        self.params.padded_width
    }
}

///////////
// Tests //
///////////
