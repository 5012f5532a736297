#![allow(dead_code)]

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Uniform random points in `[-pi, pi]`
pub fn random_points(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.random::<f64>() * 2.0 * PI - PI).collect()
}

/// Uniform random frequencies in `[-half_width, half_width]`
pub fn random_freqs(n: usize, half_width: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (rng.random::<f64>() * 2.0 - 1.0) * half_width)
        .collect()
}

/// Standard-normal complex strengths
pub fn random_strengths(n: usize, seed: u64) -> Vec<Complex<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let re: f64 = StandardNormal.sample(&mut rng);
            let im: f64 = StandardNormal.sample(&mut rng);
            Complex::new(re, im)
        })
        .collect()
}

/// Relative 2-norm error `||got - want|| / ||want||`
pub fn rel_l2_error(got: &[Complex<f64>], want: &[Complex<f64>]) -> f64 {
    assert_eq!(got.len(), want.len());
    let mut num = 0.0;
    let mut den = 0.0;
    for (g, w) in got.iter().zip(want) {
        num += (g - w).norm_sqr();
        den += w.norm_sqr();
    }
    (num / den.max(f64::MIN_POSITIVE)).sqrt()
}

fn cis(theta: f64) -> Complex<f64> {
    Complex::new(theta.cos(), theta.sin())
}

/// Direct `O(nj * N)` type-1 sum, CMCL mode order, `ms` axis fastest
pub fn direct_type1(
    x: &[f64],
    y: Option<&[f64]>,
    z: Option<&[f64]>,
    c: &[Complex<f64>],
    modes: [usize; 3],
    sign: f64,
) -> Vec<Complex<f64>> {
    let [ms, mt, mu] = modes;
    let kmin = [-((ms / 2) as i64), -((mt / 2) as i64), -((mu / 2) as i64)];
    let mut out = vec![Complex::new(0.0, 0.0); ms * mt * mu];

    for k3 in 0..mu as i64 {
        for k2 in 0..mt as i64 {
            for k1 in 0..ms as i64 {
                let kx = (k1 + kmin[0]) as f64;
                let ky = (k2 + kmin[1]) as f64;
                let kz = (k3 + kmin[2]) as f64;
                let mut acc = Complex::new(0.0, 0.0);
                for j in 0..x.len() {
                    let mut phase = kx * x[j];
                    if let Some(y) = y {
                        phase += ky * y[j];
                    }
                    if let Some(z) = z {
                        phase += kz * z[j];
                    }
                    acc += c[j] * cis(sign * phase);
                }
                out[((k3 as usize) * mt + k2 as usize) * ms + k1 as usize] = acc;
            }
        }
    }
    out
}

/// Direct type-2 sum: evaluate the CMCL mode array at each point
pub fn direct_type2(
    x: &[f64],
    y: Option<&[f64]>,
    z: Option<&[f64]>,
    f: &[Complex<f64>],
    modes: [usize; 3],
    sign: f64,
) -> Vec<Complex<f64>> {
    let [ms, mt, mu] = modes;
    let kmin = [-((ms / 2) as i64), -((mt / 2) as i64), -((mu / 2) as i64)];
    let mut out = vec![Complex::new(0.0, 0.0); x.len()];

    for j in 0..x.len() {
        let mut acc = Complex::new(0.0, 0.0);
        for k3 in 0..mu as i64 {
            for k2 in 0..mt as i64 {
                for k1 in 0..ms as i64 {
                    let mut phase = (k1 + kmin[0]) as f64 * x[j];
                    if let Some(y) = y {
                        phase += (k2 + kmin[1]) as f64 * y[j];
                    }
                    if let Some(z) = z {
                        phase += (k3 + kmin[2]) as f64 * z[j];
                    }
                    acc += f[((k3 as usize) * mt + k2 as usize) * ms + k1 as usize]
                        * cis(sign * phase);
                }
            }
        }
        out[j] = acc;
    }
    out
}

/// Direct type-3 sum at arbitrary target frequencies
#[allow(clippy::too_many_arguments)]
pub fn direct_type3(
    x: &[f64],
    y: Option<&[f64]>,
    z: Option<&[f64]>,
    c: &[Complex<f64>],
    s: &[f64],
    t: Option<&[f64]>,
    u: Option<&[f64]>,
    sign: f64,
) -> Vec<Complex<f64>> {
    let mut out = vec![Complex::new(0.0, 0.0); s.len()];
    for k in 0..s.len() {
        let mut acc = Complex::new(0.0, 0.0);
        for j in 0..x.len() {
            let mut phase = s[k] * x[j];
            if let Some(y) = y {
                phase += t.unwrap()[k] * y[j];
            }
            if let Some(z) = z {
                phase += u.unwrap()[k] * z[j];
            }
            acc += c[j] * cis(sign * phase);
        }
        out[k] = acc;
    }
    out
}
