use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

use crate::opts::FftPlanEffort;
use crate::NufftFloat;

/// Batched in-place multi-dimensional complex FFT over the fine grid
///
/// Wraps per-axis 1-d rustfft plans. The buffer layout is row-major with
/// the first grid dimension fastest-varying, transforms of a batch laid
/// out in consecutive slabs of `nf1 * nf2 * nf3` elements. The leading
/// axis is transformed in place over the contiguous lines; trailing axes
/// go through a gathered column buffer.
///
/// ### Fields
///
/// * `shape` - `(nf1, nf2, nf3)`, unused dimensions 1
/// * `slab` - Elements per transform, `nf1 * nf2 * nf3`
pub struct BatchedFft<T> {
    dim: usize,
    shape: [usize; 3],
    slab: usize,
    axis_plans: [Option<Arc<dyn Fft<T>>>; 3],
    effort: FftPlanEffort,
}

impl<T> std::fmt::Debug for BatchedFft<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchedFft")
            .field("dim", &self.dim)
            .field("shape", &self.shape)
            .field("slab", &self.slab)
            .field(
                "axis_plans",
                &self.axis_plans.each_ref().map(|p| p.is_some()),
            )
            .field("effort", &self.effort)
            .finish()
    }
}

impl<T> BatchedFft<T>
where
    T: NufftFloat,
{
    /// Plan the batched transform
    ///
    /// ### Params
    ///
    /// * `dim` - Number of transformed dimensions, 1 to 3
    /// * `shape` - Fine grid sizes, unused dimensions 1
    /// * `sign` - `+1` for `e^{+i...}`, `-1` for `e^{-i...}`; matches the
    ///   sign convention of the surrounding transform
    /// * `effort` - Planning hint (rustfft plans algorithmically, so this
    ///   is recorded but does not change the plan)
    pub fn plan(dim: usize, shape: [usize; 3], sign: i32, effort: FftPlanEffort) -> Self {
        let direction = if sign >= 0 {
            FftDirection::Inverse
        } else {
            FftDirection::Forward
        };
        let mut planner = FftPlanner::new();
        let mut axis_plans: [Option<Arc<dyn Fft<T>>>; 3] = [None, None, None];
        for (d, plan) in axis_plans.iter_mut().enumerate().take(dim) {
            *plan = Some(planner.plan_fft(shape[d], direction));
        }

        Self {
            dim,
            shape,
            slab: shape[0] * shape[1] * shape[2],
            axis_plans,
            effort,
        }
    }

    /// Execute the transform on the first `n_sets` slabs of `fw`
    ///
    /// Slabs beyond `n_sets` (a short final batch) are left untouched;
    /// no re-planning is needed for shorter batches.
    pub fn execute(&self, fw: &mut [Complex<T>], n_sets: usize) {
        fw.par_chunks_mut(self.slab)
            .take(n_sets)
            .for_each(|slab| self.execute_slab(slab));
    }

    fn execute_slab(&self, slab: &mut [Complex<T>]) {
        let [nf1, nf2, nf3] = self.shape;

        // axis 1: the lines are contiguous, rustfft batches them itself
        if let Some(fft) = &self.axis_plans[0] {
            fft.process(slab);
        }

        // axis 2: gather columns across the nf1 stride
        if self.dim > 1 {
            let fft = self.axis_plans[1].as_ref().unwrap();
            let mut col = vec![Complex::new(T::zero(), T::zero()); nf2];
            for i3 in 0..nf3 {
                let plane = &mut slab[i3 * nf1 * nf2..(i3 + 1) * nf1 * nf2];
                for i1 in 0..nf1 {
                    for i2 in 0..nf2 {
                        col[i2] = plane[i2 * nf1 + i1];
                    }
                    fft.process(&mut col);
                    for i2 in 0..nf2 {
                        plane[i2 * nf1 + i1] = col[i2];
                    }
                }
            }
        }

        // axis 3: gather columns across the nf1*nf2 stride
        if self.dim > 2 {
            let fft = self.axis_plans[2].as_ref().unwrap();
            let np = nf1 * nf2;
            let mut col = vec![Complex::new(T::zero(), T::zero()); nf3];
            for i12 in 0..np {
                for i3 in 0..nf3 {
                    col[i3] = slab[i3 * np + i12];
                }
                fft.process(&mut col);
                for i3 in 0..nf3 {
                    slab[i3 * np + i12] = col[i3];
                }
            }
        }
    }

    #[inline]
    pub fn slab_len(&self) -> usize {
        self.slab
    }

    #[inline]
    pub fn effort(&self) -> FftPlanEffort {
        self.effort
    }
}

///////////
// Tests //
///////////
