use num_traits::{Float, FromPrimitive};
use rayon::prelude::*;
use std::f64::consts::PI;

use crate::kernel::KernelParams;
use crate::NufftFloat;

/////////////
// Globals //
/////////////

/// Hard cap on quadrature nodes per half-axis
pub const MAX_QUAD_NODES: usize = 100;

////////////////////
// Gauss-Legendre //
////////////////////

/// Positive nodes and weights of the `2q`-point Gauss-Legendre rule
///
/// Nodes are computed by Newton iteration on the three-term Legendre
/// recurrence; only the `q` positive roots are returned since every use
/// here integrates an even function over a symmetric interval.
///
/// ### Params
///
/// * `q` - Number of positive nodes (half of the full rule)
///
/// ### Returns
///
/// * `(nodes, weights)` - Nodes in `(0, 1)` descending, matching weights
pub fn gauss_legendre_half(q: usize) -> (Vec<f64>, Vec<f64>) {
    let n = 2 * q;
    let mut nodes = Vec::with_capacity(q);
    let mut weights = Vec::with_capacity(q);

    for i in 0..q {
        // Tricomi-style initial guess for the i-th positive root
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();

        for _ in 0..100 {
            // Legendre recurrence for P_n(x) and P_{n-1}(x)
            let mut p0 = 1.0;
            let mut p1 = x;
            for k in 2..=n {
                let kf = k as f64;
                let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
                p0 = p1;
                p1 = p2;
            }
            let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
            let dx = p1 / dp;
            x -= dx;
            if dx.abs() < 1e-16 {
                break;
            }
        }

        // re-evaluate the derivative at the converged root for the weight
        let mut p0 = 1.0;
        let mut p1 = x;
        for k in 2..=n {
            let kf = k as f64;
            let p2 = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
            p0 = p1;
            p1 = p2;
        }
        let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);

        nodes.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    (nodes, weights)
}

/////////////////////
// Kernel spectrum //
/////////////////////

/// Nodes and weighted kernel values shared by the series and integral
/// evaluations: `z_n` on `(0, w/2]`, `f_n = J2 * w_n * psi(z_n)`
fn kernel_quad<T>(params: &KernelParams<T>) -> (Vec<T>, Vec<T>)
where
    T: Float + FromPrimitive,
{
    let j2 = params.width as f64 / 2.0;
    let q = ((2.0 + 1.5 * params.width as f64).ceil() as usize).min(MAX_QUAD_NODES);
    let (nodes, weights) = gauss_legendre_half(q);

    let mut z = Vec::with_capacity(q);
    let mut f = Vec::with_capacity(q);
    for n in 0..q {
        let zn = T::from_f64(j2 * nodes[n]).unwrap();
        z.push(zn);
        f.push(T::from_f64(j2 * weights[n]).unwrap() * params.evaluate(zn));
    }
    (z, f)
}

/// Fourier-series samples of the kernel on one fine-grid dimension
///
/// Approximates `phi_hat[k] = 2 * int_0^{w/2} psi(z) cos(2 pi k z / nf) dz`
/// for `k = 0..=nf/2` by Gauss-Legendre quadrature, exploiting the
/// narrow support and evenness of the window. Strictly positive over
/// every mode retained by the deconvolver.
///
/// ### Params
///
/// * `nf` - Fine grid size (even)
/// * `params` - Kernel parameters
///
/// ### Returns
///
/// * `Vec<T>` - The `nf/2 + 1` non-negative-frequency samples
pub fn fseries_kernel<T>(nf: usize, params: &KernelParams<T>) -> Vec<T>
where
    T: NufftFloat,
{
    let (z, f) = kernel_quad(params);
    let step = T::from_f64(2.0 * PI / nf as f64).unwrap();
    let two = T::from_f64(2.0).unwrap();

    let mut out = vec![T::zero(); nf / 2 + 1];
    out.par_iter_mut().enumerate().for_each(|(k, v)| {
        let theta = step * T::from_usize(k).unwrap();
        let mut acc = T::zero();
        for (zn, fn_) in z.iter().zip(&f) {
            acc = acc + *fn_ * (theta * *zn).cos();
        }
        *v = two * acc;
    });
    out
}

/// Fourier integral of the kernel at arbitrary frequencies
///
/// Same quadrature as [`fseries_kernel`] but evaluated at caller-chosen
/// frequencies `xi` (in radians per grid unit); used by the type-3
/// post-deconvolution at the rescaled non-uniform target frequencies.
pub fn nuft_kernel<T>(freqs: &[T], params: &KernelParams<T>) -> Vec<T>
where
    T: NufftFloat,
{
    let (z, f) = kernel_quad(params);
    let two = T::from_f64(2.0).unwrap();

    let mut out = vec![T::zero(); freqs.len()];
    out.par_iter_mut().zip(freqs).for_each(|(v, xi)| {
        let mut acc = T::zero();
        for (zn, fn_) in z.iter().zip(&f) {
            acc = acc + *fn_ * (*xi * *zn).cos();
        }
        *v = two * acc;
    });
    out
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opts::KernelEvalMethod;

    #[test]
    fn gauss_legendre_integrates_low_polynomials_exactly() {
        let (nodes, weights) = gauss_legendre_half(8);
        // full rule: int_{-1}^{1} x^{2m} dx = 2/(2m+1), even halves doubled
        for m in 0..8 {
            let approx: f64 = nodes
                .iter()
                .zip(&weights)
                .map(|(&x, &w)| 2.0 * w * x.powi(2 * m))
                .sum();
            let exact = 2.0 / (2.0 * m as f64 + 1.0);
            assert!(
                (approx - exact).abs() < 1e-13,
                "m={} approx={} exact={}",
                m,
                approx,
                exact
            );
        }
    }

    #[test]
    fn gauss_legendre_weights_sum_to_interval_length() {
        for q in [2, 5, 12, 26] {
            let (_, weights) = gauss_legendre_half(q);
            let total: f64 = 2.0 * weights.iter().sum::<f64>();
            assert!((total - 2.0).abs() < 1e-13);
        }
    }

    fn test_params(tol: f64) -> KernelParams<f64> {
        KernelParams::from_tolerance(tol, 2.0, false, KernelEvalMethod::Direct).0
    }

    #[test]
    fn fseries_matches_brute_force_integration() {
        let params = test_params(1e-9);
        let nf = 64;
        let phi = fseries_kernel(nf, &params);
        assert_eq!(phi.len(), nf / 2 + 1);

        // crude Riemann check at a few frequencies
        let j2 = params.width as f64 / 2.0;
        let n_steps = 200_000;
        let dz = j2 / n_steps as f64;
        for &k in &[0usize, 3, 17, 32] {
            let theta = 2.0 * PI * k as f64 / nf as f64;
            let mut acc = 0.0;
            for i in 0..n_steps {
                let z = (i as f64 + 0.5) * dz;
                acc += params.evaluate(z) * (theta * z).cos() * dz;
            }
            let brute = 2.0 * acc;
            assert!(
                (phi[k] - brute).abs() < 1e-8 * phi[0].abs(),
                "k={} quad={} brute={}",
                k,
                phi[k],
                brute
            );
        }
    }

    #[test]
    fn fseries_is_positive_and_decreasing_over_kept_modes() {
        let params = test_params(1e-12);
        let nf = 96;
        let phi = fseries_kernel(nf, &params);
        // modes kept by deconvolution reach nf / (2 sigma) = nf / 4
        for k in 0..=nf / 4 {
            assert!(phi[k] > 0.0, "phi_hat[{}] = {}", k, phi[k]);
            if k > 0 {
                assert!(phi[k] < phi[k - 1]);
            }
        }
    }

    #[test]
    fn nuft_agrees_with_fseries_at_grid_frequencies() {
        let params = test_params(1e-9);
        let nf = 50;
        let phi = fseries_kernel(nf, &params);
        let freqs: Vec<f64> = (0..=nf / 2)
            .map(|k| 2.0 * PI * k as f64 / nf as f64)
            .collect();
        let direct = nuft_kernel(&freqs, &params);
        for k in 0..freqs.len() {
            assert!((phi[k] - direct[k]).abs() < 1e-14 * phi[0]);
        }
    }
}
