use num_traits::{Float, FromPrimitive};
use std::f64::consts::PI;

use crate::opts::{NufftError, NufftResult};

/////////////
// Globals //
/////////////

/// Largest fine-grid extent along one dimension
pub const MAX_NF_PER_DIM: u64 = 1 << 27;
/// Largest total fine-grid allocation, counted as `nf1*nf2*nf3*batch`
pub const MAX_NF_TOTAL: u64 = 1 << 34;

//////////////////
// Smooth sizes //
//////////////////

fn is_235_smooth(mut n: usize) -> bool {
    for p in [2, 3, 5] {
        while n % p == 0 {
            n /= p;
        }
    }
    n == 1
}

/// Smallest even number `>= n` whose only prime factors are 2, 3 and 5
///
/// Steps in twos from the even ceiling of `n`; smooth numbers are dense
/// enough that this terminates after a handful of probes.
pub fn next_smooth_even(n: usize) -> usize {
    let mut nd = n.max(2);
    if nd % 2 == 1 {
        nd += 1;
    }
    while !is_235_smooth(nd) {
        nd += 2;
    }
    nd
}

/// Fine-grid size for one dimension of a type-1/2 problem
///
/// ### Params
///
/// * `n_modes` - Requested mode count along this dimension
/// * `upsampfac` - Oversampling ratio sigma
/// * `width` - Kernel width (the grid must fit two stencils)
///
/// ### Returns
///
/// Smallest FFT-friendly even `nf >= max(2w, ceil(sigma * n_modes))`, or
/// [`NufftError::GridTooLarge`] past the per-dimension cap.
pub fn fine_grid_size(n_modes: usize, upsampfac: f64, width: usize) -> NufftResult<usize> {
    let mut nf = (upsampfac * n_modes as f64).ceil() as usize;
    if nf < 2 * width {
        nf = 2 * width;
    }
    if nf as u64 > MAX_NF_PER_DIM {
        return Err(NufftError::GridTooLarge {
            requested: nf as u64,
            cap: MAX_NF_PER_DIM,
        });
    }
    Ok(next_smooth_even(nf))
}

/// Guard the total fine-grid allocation across dimensions and batch
pub fn check_total_grid(nf: [usize; 3], batch: usize) -> NufftResult<()> {
    let total = nf[0] as u64 * nf[1] as u64 * nf[2] as u64 * batch as u64;
    if total > MAX_NF_TOTAL {
        return Err(NufftError::GridTooLarge {
            requested: total,
            cap: MAX_NF_TOTAL,
        });
    }
    Ok(())
}

////////////////////
// Type-3 scaling //
////////////////////

/// Per-dimension grid geometry of the type-3 reduction
///
/// ### Fields
///
/// * `nf` - Fine grid size
/// * `h` - Grid spacing `2 pi / nf`
/// * `gamma` - Point rescale factor: `x' = (x - C) / gamma` puts the
///   sources inside `(-pi, pi)`, while targets scale as `gamma * (s - D)`
#[derive(Debug, Clone, Copy)]
pub struct Type3Grid<T> {
    pub nf: usize,
    pub h: T,
    pub gamma: T,
}

/// Choose `(nf, h, gamma)` from the source and target half-widths
///
/// Zero half-widths are nudged so that `X * S >= 1`, which keeps the
/// grid non-degenerate for point-like or frequency-like clouds.
pub fn type3_grid<T>(
    s_half: T,
    x_half: T,
    upsampfac: f64,
    width: usize,
) -> NufftResult<Type3Grid<T>>
where
    T: Float + FromPrimitive,
{
    let s = s_half.to_f64().unwrap_or(f64::NAN);
    let x = x_half.to_f64().unwrap_or(f64::NAN);

    let (x_safe, s_safe) = if x == 0.0 {
        if s == 0.0 {
            (1.0, 1.0)
        } else {
            (1.0 / s, s)
        }
    } else {
        (x, s.max(1.0 / x))
    };

    let nf_real = 2.0 * upsampfac * s_safe * x_safe / PI + (width + 1) as f64;
    let nf_real = if nf_real.is_finite() { nf_real } else { 0.0 };
    let mut nf = nf_real as usize;
    if nf < 2 * width {
        nf = 2 * width;
    }
    if nf as u64 > MAX_NF_PER_DIM {
        return Err(NufftError::GridTooLarge {
            requested: nf as u64,
            cap: MAX_NF_PER_DIM,
        });
    }
    let nf = next_smooth_even(nf);

    Ok(Type3Grid {
        nf,
        h: T::from_f64(2.0 * PI / nf as f64).unwrap(),
        gamma: T::from_f64(nf as f64 / (2.0 * upsampfac * s_safe)).unwrap(),
    })
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth_sizes_are_smooth_even_and_minimal() {
        for n in [1, 2, 7, 26, 97, 120, 121, 1000, 4097] {
            let s = next_smooth_even(n);
            assert!(s >= n);
            assert_eq!(s % 2, 0);
            assert!(is_235_smooth(s));
            // nothing smaller works
            let mut probe = n.max(2);
            if probe % 2 == 1 {
                probe += 1;
            }
            while probe < s {
                assert!(!is_235_smooth(probe));
                probe += 2;
            }
        }
    }

    #[test]
    fn fine_grid_respects_both_lower_bounds() {
        // sigma * m dominates
        let nf = fine_grid_size(100, 2.0, 7).unwrap();
        assert!(nf >= 200);
        assert!(is_235_smooth(nf));
        // kernel width dominates for tiny mode counts
        let nf = fine_grid_size(4, 2.0, 13).unwrap();
        assert!(nf >= 26);
    }

    #[test]
    fn oversized_grids_are_rejected() {
        let err = fine_grid_size(1 << 28, 2.0, 7).unwrap_err();
        assert!(matches!(err, NufftError::GridTooLarge { .. }));

        let err = check_total_grid([1 << 14, 1 << 14, 1 << 7], 4).unwrap_err();
        assert!(matches!(err, NufftError::GridTooLarge { .. }));
        check_total_grid([256, 256, 1], 8).unwrap();
    }

    #[test]
    fn type3_geometry_keeps_rescaled_points_inside_pi() {
        let g = type3_grid::<f64>(50.0, 3.0, 2.0, 10).unwrap();
        // x' = x/gamma must stay strictly inside (-pi, pi)
        assert!(3.0 / g.gamma < PI);
        assert!((g.h - 2.0 * PI / g.nf as f64).abs() < 1e-15);
        assert!(is_235_smooth(g.nf));
        // targets scale into the oversampled band: gamma*S*h <= pi/sigma
        assert!(g.gamma * 50.0 * g.h <= PI / 2.0 + 1e-12);
    }

    #[test]
    fn type3_degenerate_widths_are_nudged() {
        let g = type3_grid::<f64>(0.0, 0.0, 2.0, 7).unwrap();
        assert!(g.nf >= 14);
        let g = type3_grid::<f64>(5.0, 0.0, 2.0, 7).unwrap();
        assert!(g.gamma.is_finite() && g.gamma > 0.0);
    }
}
