use rayon::prelude::*;
use rustfft::num_complex::Complex;
use std::time::Instant;
use thousands::*;

use crate::deconvolve::{
    deconvolve_shuffle_1d, deconvolve_shuffle_2d, deconvolve_shuffle_3d, DeconvolveDir,
};
use crate::fft::BatchedFft;
use crate::grid::{check_total_grid, fine_grid_size, type3_grid, Type3Grid};
use crate::kernel::{KernelEvaluator, KernelParams};
use crate::opts::{ModeOrder, NufftError, NufftOpts, NufftResult, NufftWarning, SpreadThreading};
use crate::quadrature::{fseries_kernel, nuft_kernel};
use crate::spread::{bin_sort_points, decide_sort, interp_sorted, spread_check, spread_sorted};
use crate::NufftFloat;

///////////
// Kinds //
///////////

/// The three transform kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    /// Non-uniform points to uniform Fourier modes
    Type1,
    /// Uniform Fourier modes to non-uniform points
    Type2,
    /// Non-uniform points to non-uniform target frequencies
    Type3,
}

impl TransformKind {
    /// Conventional numeric label, for debug output
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            TransformKind::Type1 => 1,
            TransformKind::Type2 => 2,
            TransformKind::Type3 => 3,
        }
    }
}

/// `e^{i theta}`
#[inline]
fn cis<T: NufftFloat>(theta: T) -> Complex<T> {
    Complex::new(theta.cos(), theta.sin())
}

fn min_max<T: NufftFloat>(v: &[T]) -> (T, T) {
    if v.is_empty() {
        return (T::zero(), T::zero());
    }
    let mut lo = T::infinity();
    let mut hi = T::neg_infinity();
    for &a in v {
        lo = lo.min(a);
        hi = hi.max(a);
    }
    (lo, hi)
}

/// Outer/inner parallelism split for one batch, see the option docs
fn thread_split(mode: SpreadThreading, n_sets: usize) -> (bool, bool) {
    let threads = rayon::current_num_threads();
    match mode {
        SpreadThreading::SeqOuter => (false, true),
        SpreadThreading::ParOuter => (true, false),
        SpreadThreading::Nested => (true, true),
        SpreadThreading::Auto => {
            if threads > 1 && n_sets >= threads {
                (true, false)
            } else {
                (false, threads > 1)
            }
        }
    }
}

////////////
// Points //
////////////

/// Point coordinates bound to a plan: borrowed from the caller for
/// types 1/2, owned rescaled copies for type 3 and the inner type-2 plan
#[derive(Debug)]
enum Coords<'a, T> {
    Unset,
    Borrowed {
        x: &'a [T],
        y: Option<&'a [T]>,
        z: Option<&'a [T]>,
    },
    Owned {
        x: Vec<T>,
        y: Option<Vec<T>>,
        z: Option<Vec<T>>,
    },
}

impl<'a, T> Coords<'a, T> {
    fn get(&self) -> Option<(&[T], Option<&[T]>, Option<&[T]>)> {
        match self {
            Coords::Unset => None,
            Coords::Borrowed { x, y, z } => Some((x, *y, *z)),
            Coords::Owned { x, y, z } => Some((x.as_slice(), y.as_deref(), z.as_deref())),
        }
    }
}

fn validate_coord_shape<T>(
    dim: usize,
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
) -> NufftResult<()> {
    if (dim >= 2) != y.is_some() || (dim >= 3) != z.is_some() {
        return Err(NufftError::CoordsMismatch { dim });
    }
    for cs in [y, z].into_iter().flatten() {
        if cs.len() != x.len() {
            return Err(NufftError::InvalidArrayLength {
                expected: x.len(),
                got: cs.len(),
            });
        }
    }
    Ok(())
}

////////////////////
// Type-3 payload //
////////////////////

/// Everything set_points precomputes for the type-3 reduction
#[derive(Debug)]
struct Type3State<'a, T: NufftFloat> {
    nk: usize,
    /// Per-point `e^{i sign D.x}`, `None` when every target centre is zero
    prephase: Option<Vec<Complex<T>>>,
    /// Per-target `e^{i sign (s - D).C} / phi_hat[k]`
    postphase: Vec<Complex<T>>,
    /// Re-phased strengths scratch, `nj * batch_size`
    cpj: Vec<Complex<T>>,
    /// Fully-built type-2 plan over the outer fine grid, owning its
    /// rescaled target points
    inner: Box<NufftPlan<'a, T>>,
}

//////////
// Plan //
//////////

/// A planned batched NUFFT problem
///
/// Lifecycle: [`NufftPlan::new`] chooses grids and kernels and plans the
/// FFT; [`NufftPlan::set_points`] (or [`NufftPlan::set_points_type3`])
/// binds and sorts the non-uniform points; [`NufftPlan::execute`] may
/// then run any number of times with different strength/coefficient
/// arrays. Dropping the plan releases everything it owns; point slices
/// stay borrowed for the plan's lifetime, so the borrow checker enforces
/// the "caller keeps points alive and unchanged" contract.
#[derive(Debug)]
pub struct NufftPlan<'a, T: NufftFloat> {
    kind: TransformKind,
    dim: usize,
    n_transf: usize,
    batch_size: usize,
    tol: f64,
    sign: i32,
    /// Mode counts (ms, mt, mu), unused dimensions 1
    modes: [usize; 3],
    /// Fine grid sizes, unused dimensions 1
    nf: [usize; 3],
    opts: NufftOpts,
    kernel: KernelEvaluator<T>,
    /// Types 1/2: concatenated per-dimension half-spectra; type 3: the
    /// per-target product of kernel Fourier integrals (length nk)
    phi_hat: Vec<T>,
    /// Fine-grid scratch, one slab per transform of a batch
    fw: Vec<Complex<T>>,
    fft: Option<BatchedFft<T>>,
    coords: Coords<'a, T>,
    nj: usize,
    sort_idx: Vec<usize>,
    did_sort: bool,
    t3: Option<Type3State<'a, T>>,
    warnings: Vec<NufftWarning>,
}

impl<'a, T> NufftPlan<'a, T>
where
    T: NufftFloat,
{
    /// Plan a transform
    ///
    /// For types 1 and 2 this sizes the fine grid, evaluates the kernel
    /// spectrum and plans the batched FFT; type 3 defers all of that to
    /// [`NufftPlan::set_points_type3`] where the point geometry is known.
    ///
    /// ### Params
    ///
    /// * `kind` - Transform kind
    /// * `dim` - Dimension, 1 to 3
    /// * `n_modes` - Mode counts per dimension (ignored for type 3)
    /// * `sign` - Sign of `i` in the transform exponentials (>= 0 maps
    ///   to +1)
    /// * `n_transf` - Transforms sharing the same points
    /// * `tol` - Requested relative tolerance; clamped with a warning
    ///   outside the supported range
    /// * `opts` - Options, copied into the plan
    ///
    /// ### Returns
    ///
    /// The plan, or the first configuration/resource error.
    pub fn new(
        kind: TransformKind,
        dim: usize,
        n_modes: &[usize],
        sign: i32,
        n_transf: usize,
        tol: f64,
        opts: &NufftOpts,
    ) -> NufftResult<Self> {
        if !(1..=3).contains(&dim) {
            return Err(NufftError::InvalidDim(dim));
        }
        if n_transf < 1 {
            return Err(NufftError::InvalidTransformCount(n_transf));
        }
        if opts.upsampfac != 2.0 && opts.upsampfac != 1.25 {
            return Err(NufftError::InvalidUpsampFactor(opts.upsampfac));
        }
        if kind != TransformKind::Type3 && n_modes.len() < dim {
            return Err(NufftError::InvalidArrayLength {
                expected: dim,
                got: n_modes.len(),
            });
        }

        let sign = if sign >= 0 { 1 } else { -1 };
        let (params, warning) = KernelParams::from_tolerance(
            tol,
            opts.upsampfac,
            opts.spread_kerpad,
            opts.kernel_eval,
        );
        let mut warnings = Vec::new();
        if let Some(w) = warning {
            if opts.debug > 0 {
                println!("[plan] warning: {:?}", w);
            }
            warnings.push(w);
        }

        let batch_size = if opts.max_batch_size == 0 {
            n_transf.min(rayon::current_num_threads().max(1))
        } else {
            n_transf.min(opts.max_batch_size)
        };

        let mut plan = Self {
            kind,
            dim,
            n_transf,
            batch_size,
            tol,
            sign,
            modes: [1; 3],
            nf: [1; 3],
            opts: opts.clone(),
            kernel: KernelEvaluator::new(params),
            phi_hat: Vec::new(),
            fw: Vec::new(),
            fft: None,
            coords: Coords::Unset,
            nj: 0,
            sort_idx: Vec::new(),
            did_sort: false,
            t3: None,
            warnings,
        };

        if kind != TransformKind::Type3 {
            plan.setup_type12_grids(n_modes)?;
        } else if opts.debug > 0 {
            println!("[plan] {}d3: deferred to set_points", dim);
        }
        Ok(plan)
    }

    fn setup_type12_grids(&mut self, n_modes: &[usize]) -> NufftResult<()> {
        let w = self.kernel.width();
        for d in 0..self.dim {
            self.modes[d] = n_modes[d];
            self.nf[d] = fine_grid_size(n_modes[d], self.opts.upsampfac, w)?;
        }
        check_total_grid(self.nf, self.batch_size)?;
        let nf_total = self.nf[0] * self.nf[1] * self.nf[2];

        if self.opts.debug > 0 {
            println!(
                "[plan] {}d{}: (ms,mt,mu)=({},{},{}) (nf1,nf2,nf3)=({},{},{}) batch={} w={}",
                self.dim,
                self.kind.index(),
                self.modes[0],
                self.modes[1],
                self.modes[2],
                self.nf[0],
                self.nf[1],
                self.nf[2],
                self.batch_size,
                w
            );
        }

        let timer = Instant::now();
        let mut phi_hat = Vec::with_capacity(
            (0..self.dim).map(|d| self.nf[d] / 2 + 1).sum::<usize>(),
        );
        for d in 0..self.dim {
            phi_hat.extend(fseries_kernel(self.nf[d], &self.kernel.params));
        }
        self.phi_hat = phi_hat;
        if self.opts.debug > 0 {
            println!("[plan] kernel fourier series: {:.2?}", timer.elapsed());
        }

        self.fw = vec![Complex::new(T::zero(), T::zero()); nf_total * self.batch_size];

        let timer = Instant::now();
        self.fft = Some(BatchedFft::plan(
            self.dim,
            self.nf,
            self.sign,
            self.opts.fft_effort,
        ));
        if self.opts.debug > 0 {
            println!("[plan] fft plan: {:.2?}", timer.elapsed());
        }
        Ok(())
    }

    /// Sort and bind the points shared by helpers of both ownership modes
    fn prepare_points(&mut self, x: &[T], y: Option<&[T]>, z: Option<&[T]>) -> NufftResult<()> {
        validate_coord_shape(self.dim, x, y, z)?;
        spread_check(x, y, z, self.opts.chkbnds)?;

        let timer = Instant::now();
        self.nj = x.len();
        let nf_total = self.nf[0] * self.nf[1] * self.nf[2];
        self.did_sort = decide_sort(self.opts.spread_sort, self.nj, nf_total);
        self.sort_idx = if self.did_sort {
            bin_sort_points(x, y, z, self.nf)
        } else {
            (0..self.nj).collect()
        };
        if self.opts.debug > 0 {
            println!(
                "[set_points] {} points (did_sort={}): {:.2?}",
                self.nj.separate_with_underscores(),
                self.did_sort,
                timer.elapsed()
            );
        }
        Ok(())
    }

    /// Bind non-uniform points for a type-1 or type-2 plan
    ///
    /// The slices are borrowed; the caller keeps them alive and
    /// unchanged across every later `execute`.
    pub fn set_points(
        &mut self,
        x: &'a [T],
        y: Option<&'a [T]>,
        z: Option<&'a [T]>,
    ) -> NufftResult<()> {
        if self.kind == TransformKind::Type3 {
            return Err(NufftError::TargetsRequired);
        }
        self.prepare_points(x, y, z)?;
        self.coords = Coords::Borrowed { x, y, z };
        Ok(())
    }

    /// As `set_points`, for point arrays the plan owns (type-3 inner plan)
    fn set_points_owned(
        &mut self,
        x: Vec<T>,
        y: Option<Vec<T>>,
        z: Option<Vec<T>>,
    ) -> NufftResult<()> {
        self.prepare_points(&x, y.as_deref(), z.as_deref())?;
        self.coords = Coords::Owned { x, y, z };
        Ok(())
    }

    /// Bind source points and target frequencies for a type-3 plan
    ///
    /// Computes the per-dimension shift/scale geometry, rescales and
    /// sorts owned copies of the sources, precomputes the pre/post phase
    /// factors and the kernel Fourier integral at every target, and
    /// builds the inner type-2 plan over the fine grid.
    #[allow(clippy::too_many_arguments)]
    pub fn set_points_type3(
        &mut self,
        x: &'a [T],
        y: Option<&'a [T]>,
        z: Option<&'a [T]>,
        s: &'a [T],
        t: Option<&'a [T]>,
        u: Option<&'a [T]>,
    ) -> NufftResult<()> {
        if self.kind != TransformKind::Type3 {
            return Err(NufftError::TargetsUnexpected);
        }
        validate_coord_shape(self.dim, x, y, z)?;
        validate_coord_shape(self.dim, s, t, u)?;
        // no range check on the raw sources: the shift/scale below maps
        // any finite cloud into the grid; the rescaled copies are checked

        let nj = x.len();
        let nk = s.len();
        let timer = Instant::now();

        // per-dimension centres, half-widths and grid geometry
        let srcs = [Some(x), y, z];
        let tgts = [Some(s), t, u];
        let half = T::from_f64(0.5).unwrap();
        let mut center_x = [T::zero(); 3];
        let mut center_s = [T::zero(); 3];
        let mut geom = [Type3Grid {
            nf: 1,
            h: T::one(),
            gamma: T::one(),
        }; 3];
        let w = self.kernel.width();
        for d in 0..self.dim {
            let (lo, hi) = min_max(srcs[d].unwrap());
            center_x[d] = (lo + hi) * half;
            let half_x = (hi - lo) * half;
            let (lo, hi) = min_max(tgts[d].unwrap());
            center_s[d] = (lo + hi) * half;
            let half_s = (hi - lo) * half;
            geom[d] = type3_grid(half_s, half_x, self.opts.upsampfac, w)?;
            self.nf[d] = geom[d].nf;
            if self.opts.debug > 0 {
                println!(
                    "[set_points] t3 dim {}: X={:.3e} C={:.3e} S={:.3e} D={:.3e} gamma={:.3e} nf={}",
                    d + 1,
                    half_x.to_f64().unwrap_or(f64::NAN),
                    center_x[d].to_f64().unwrap_or(f64::NAN),
                    half_s.to_f64().unwrap_or(f64::NAN),
                    center_s[d].to_f64().unwrap_or(f64::NAN),
                    geom[d].gamma.to_f64().unwrap_or(f64::NAN),
                    geom[d].nf
                );
            }
        }
        check_total_grid(self.nf, self.batch_size)?;
        let nf_total = self.nf[0] * self.nf[1] * self.nf[2];

        // owned rescaled sources x' = (x - C) / gamma, then sort them
        let rescale = |cs: &[T], d: usize| -> Vec<T> {
            cs.iter()
                .map(|&v| (v - center_x[d]) / geom[d].gamma)
                .collect()
        };
        let xp = rescale(x, 0);
        let yp = y.map(|y| rescale(y, 1));
        let zp = z.map(|z| rescale(z, 2));
        self.prepare_points(&xp, yp.as_deref(), zp.as_deref())?;
        self.coords = Coords::Owned {
            x: xp,
            y: yp,
            z: zp,
        };

        self.fw = vec![Complex::new(T::zero(), T::zero()); nf_total * self.batch_size];

        // pre-phase: e^{i sign D.x} over the original sources
        let sgn = T::from_i32(self.sign).unwrap();
        let d_nonzero = (0..self.dim).any(|d| center_s[d] != T::zero());
        let prephase = if d_nonzero {
            Some(
                (0..nj)
                    .map(|i| {
                        let mut sum = center_s[0] * x[i];
                        if let Some(y) = y {
                            sum = sum + center_s[1] * y[i];
                        }
                        if let Some(z) = z {
                            sum = sum + center_s[2] * z[i];
                        }
                        cis(sgn * sum)
                    })
                    .collect(),
            )
        } else {
            None
        };

        // rescaled target frequencies feed both the inner type-2 plan
        // and the kernel Fourier integral
        let rescale_t = |cs: &[T], d: usize| -> Vec<T> {
            cs.iter()
                .map(|&v| geom[d].h * geom[d].gamma * (v - center_s[d]))
                .collect()
        };
        let tk1 = rescale_t(s, 0);
        let tk2 = t.map(|t| rescale_t(t, 1));
        let tk3 = u.map(|u| rescale_t(u, 2));

        let mut phi = nuft_kernel(&tk1, &self.kernel.params);
        if let Some(ref tk) = tk2 {
            for (p, extra) in phi.iter_mut().zip(nuft_kernel(tk, &self.kernel.params)) {
                *p = *p * extra;
            }
        }
        if let Some(ref tk) = tk3 {
            for (p, extra) in phi.iter_mut().zip(nuft_kernel(tk, &self.kernel.params)) {
                *p = *p * extra;
            }
        }

        // post factor: phase shift to the source centre over 1 / phi_hat
        let c_finite = (0..self.dim).all(|d| center_x[d].is_finite());
        let c_nonzero = (0..self.dim).any(|d| center_x[d] != T::zero());
        let postphase: Vec<Complex<T>> = (0..nk)
            .map(|k| {
                let mag = T::one() / phi[k];
                if c_finite && c_nonzero {
                    let mut sum = (s[k] - center_s[0]) * center_x[0];
                    if let Some(t) = t {
                        sum = sum + (t[k] - center_s[1]) * center_x[1];
                    }
                    if let Some(u) = u {
                        sum = sum + (u[k] - center_s[2]) * center_x[2];
                    }
                    cis(sgn * sum) * mag
                } else {
                    Complex::new(mag, T::zero())
                }
            })
            .collect();
        self.phi_hat = phi;

        // inner type-2 plan over the outer fine grid; the spread output
        // is naturally in FFT mode order
        let mut inner_opts = self.opts.clone();
        inner_opts.modeord = ModeOrder::Fft;
        inner_opts.chkbnds = false;
        let inner_modes = self.nf;
        let mut inner = NufftPlan::new(
            TransformKind::Type2,
            self.dim,
            &inner_modes[..self.dim],
            self.sign,
            self.batch_size,
            self.tol,
            &inner_opts,
        )?;
        inner.set_points_owned(tk1, tk2, tk3)?;

        self.t3 = Some(Type3State {
            nk,
            prephase,
            postphase,
            cpj: vec![Complex::new(T::zero(), T::zero()); nj * self.batch_size],
            inner: Box::new(inner),
        });

        if self.opts.debug > 0 {
            println!(
                "[set_points] t3 setup ({} sources, {} targets): {:.2?}",
                nj.separate_with_underscores(),
                nk.separate_with_underscores(),
                timer.elapsed()
            );
        }
        Ok(())
    }

    /// Run the planned transform on one set of value arrays
    ///
    /// Array shapes (interleaved complex):
    /// * type 1: reads `c` of `[n_transf, nj]`, writes `f` of
    ///   `[n_transf, mu, mt, ms]` with the leading mode axis fastest
    /// * type 2: reads `f`, writes `c`, same shapes
    /// * type 3: reads `c` of `[n_transf, nj]`, writes `f` of
    ///   `[n_transf, nk]`
    ///
    /// Transforms are processed in batches of at most `batch_size`; the
    /// first failing sub-step aborts the batch loop and is returned.
    pub fn execute(&mut self, c: &mut [Complex<T>], f: &mut [Complex<T>]) -> NufftResult<()> {
        match self.kind {
            TransformKind::Type1 | TransformKind::Type2 => self.execute_type12(c, f),
            TransformKind::Type3 => self.execute_type3(c, f),
        }
    }

    fn execute_type12(&mut self, c: &mut [Complex<T>], f: &mut [Complex<T>]) -> NufftResult<()> {
        let (x, y, z) = self.coords.get().ok_or(NufftError::PointsNotSet)?;
        let Some(fft) = self.fft.as_ref() else {
            return Err(NufftError::PointsNotSet);
        };
        let fw = &mut self.fw;
        let sort_idx = &self.sort_idx;
        let kernel = &self.kernel;

        let kind = self.kind;
        let dim = self.dim;
        let nf = self.nf;
        let modes = self.modes;
        let nj = self.nj;
        let n_transf = self.n_transf;
        let batch_size = self.batch_size;
        let modeord = self.opts.modeord;
        let spread_thread = self.opts.spread_thread;
        let spread_debug = self.opts.spread_debug;
        let debug = self.opts.debug;

        let nf_total = nf[0] * nf[1] * nf[2];
        let n_modes_total = modes[0] * modes[1] * modes[2];
        if c.len() != n_transf * nj {
            return Err(NufftError::InvalidArrayLength {
                expected: n_transf * nj,
                got: c.len(),
            });
        }
        if f.len() != n_transf * n_modes_total {
            return Err(NufftError::InvalidArrayLength {
                expected: n_transf * n_modes_total,
                got: f.len(),
            });
        }

        // split the concatenated spectrum back into per-dimension halves
        let (ker1, rest) = self.phi_hat.split_at(nf[0] / 2 + 1);
        let (ker2, ker3) = if dim > 1 {
            rest.split_at(nf[1] / 2 + 1)
        } else {
            (rest, rest)
        };

        let mut t_spread = 0.0f64;
        let mut t_fft = 0.0f64;
        let mut t_deconv = 0.0f64;

        let mut done = 0;
        while done < n_transf {
            let n_sets = (n_transf - done).min(batch_size);
            let blk = done;
            let (outer_par, inner_par) = thread_split(spread_thread, n_sets);

            if kind == TransformKind::Type1 {
                // step 1: spread all sets of the batch onto the fine grid
                let timer = Instant::now();
                let c_ref: &[Complex<T>] = c;
                if outer_par {
                    fw.par_chunks_mut(nf_total)
                        .take(n_sets)
                        .enumerate()
                        .try_for_each(|(i, slab)| {
                            let cs = &c_ref[(blk + i) * nj..(blk + i + 1) * nj];
                            spread_sorted(
                                sort_idx,
                                nf,
                                slab,
                                x,
                                y,
                                z,
                                cs,
                                kernel,
                                inner_par,
                                spread_debug,
                            )
                        })?;
                } else {
                    for (i, slab) in fw.chunks_mut(nf_total).take(n_sets).enumerate() {
                        let cs = &c_ref[(blk + i) * nj..(blk + i + 1) * nj];
                        spread_sorted(
                            sort_idx,
                            nf,
                            slab,
                            x,
                            y,
                            z,
                            cs,
                            kernel,
                            inner_par,
                            spread_debug,
                        )?;
                    }
                }
                t_spread += timer.elapsed().as_secs_f64();
            } else {
                // type 2, step 1: amplify user modes into the fine grid
                let timer = Instant::now();
                f[blk * n_modes_total..(blk + n_sets) * n_modes_total]
                    .par_chunks_mut(n_modes_total)
                    .zip(fw.par_chunks_mut(nf_total))
                    .for_each(|(fk, slab)| {
                        deconvolve_set(
                            DeconvolveDir::FromModes,
                            dim,
                            modes,
                            nf,
                            ker1,
                            ker2,
                            ker3,
                            fk,
                            slab,
                            modeord,
                        );
                    });
                t_deconv += timer.elapsed().as_secs_f64();
            }

            // step 2: one batched FFT
            let timer = Instant::now();
            fft.execute(fw, n_sets);
            t_fft += timer.elapsed().as_secs_f64();

            if kind == TransformKind::Type1 {
                // step 3: deconvolve and shuffle into the user mode array
                let timer = Instant::now();
                f[blk * n_modes_total..(blk + n_sets) * n_modes_total]
                    .par_chunks_mut(n_modes_total)
                    .zip(fw.par_chunks_mut(nf_total))
                    .for_each(|(fk, slab)| {
                        deconvolve_set(
                            DeconvolveDir::ToModes,
                            dim,
                            modes,
                            nf,
                            ker1,
                            ker2,
                            ker3,
                            fk,
                            slab,
                            modeord,
                        );
                    });
                t_deconv += timer.elapsed().as_secs_f64();
            } else {
                // type 2, step 3: interpolate onto the points
                let timer = Instant::now();
                let fw_ref: &[Complex<T>] = fw;
                if outer_par {
                    c[blk * nj..(blk + n_sets) * nj]
                        .par_chunks_mut(nj)
                        .zip(fw_ref.par_chunks(nf_total))
                        .try_for_each(|(cs, slab)| {
                            interp_sorted(nf, slab, x, y, z, cs, kernel, inner_par)
                        })?;
                } else {
                    for (cs, slab) in c[blk * nj..(blk + n_sets) * nj]
                        .chunks_mut(nj)
                        .zip(fw_ref.chunks(nf_total))
                    {
                        interp_sorted(nf, slab, x, y, z, cs, kernel, inner_par)?;
                    }
                }
                t_spread += timer.elapsed().as_secs_f64();
            }

            done += n_sets;
        }

        if debug > 0 {
            let verb = if kind == TransformKind::Type1 {
                "spread"
            } else {
                "interp"
            };
            println!("[execute] tot {}: {:.3}s", verb, t_spread);
            println!("[execute] tot fft: {:.3}s", t_fft);
            println!("[execute] tot deconvolve: {:.3}s", t_deconv);
        }
        Ok(())
    }

    fn execute_type3(&mut self, c: &mut [Complex<T>], f: &mut [Complex<T>]) -> NufftResult<()> {
        let mut state = self.t3.take().ok_or(NufftError::PointsNotSet)?;
        let mut fw = std::mem::take(&mut self.fw);
        let result = self.type3_batches(&mut state, &mut fw, c, f);
        self.fw = fw;
        self.t3 = Some(state);
        result
    }

    fn type3_batches(
        &self,
        state: &mut Type3State<'a, T>,
        fw: &mut [Complex<T>],
        c: &mut [Complex<T>],
        f: &mut [Complex<T>],
    ) -> NufftResult<()> {
        let (x, y, z) = self.coords.get().ok_or(NufftError::PointsNotSet)?;
        let nj = self.nj;
        let nk = state.nk;
        let nf_total = self.nf[0] * self.nf[1] * self.nf[2];

        if c.len() != self.n_transf * nj {
            return Err(NufftError::InvalidArrayLength {
                expected: self.n_transf * nj,
                got: c.len(),
            });
        }
        if f.len() != self.n_transf * nk {
            return Err(NufftError::InvalidArrayLength {
                expected: self.n_transf * nk,
                got: f.len(),
            });
        }

        let mut t_prephase = 0.0f64;
        let mut t_spread = 0.0f64;
        let mut t_inner = 0.0f64;
        let mut t_post = 0.0f64;

        let mut done = 0;
        while done < self.n_transf {
            let n_sets = (self.n_transf - done).min(self.batch_size);
            let blk = done;

            // step 1: re-phase this batch of strengths into cpj
            let timer = Instant::now();
            let c_ref: &[Complex<T>] = c;
            let pre = &state.prephase;
            state.cpj[..n_sets * nj]
                .par_chunks_mut(nj)
                .enumerate()
                .for_each(|(k, chunk)| {
                    let src = &c_ref[(blk + k) * nj..(blk + k + 1) * nj];
                    match pre {
                        Some(pre) => {
                            for i in 0..nj {
                                chunk[i] = src[i] * pre[i];
                            }
                        }
                        None => chunk.copy_from_slice(src),
                    }
                });
            t_prephase += timer.elapsed().as_secs_f64();

            // step 2: spread the re-phased strengths at the rescaled points
            let timer = Instant::now();
            let (outer_par, inner_par) = thread_split(self.opts.spread_thread, n_sets);
            let cpj_ref: &[Complex<T>] = &state.cpj;
            if outer_par {
                fw.par_chunks_mut(nf_total)
                    .take(n_sets)
                    .enumerate()
                    .try_for_each(|(i, slab)| {
                        spread_sorted(
                            &self.sort_idx,
                            self.nf,
                            slab,
                            x,
                            y,
                            z,
                            &cpj_ref[i * nj..(i + 1) * nj],
                            &self.kernel,
                            inner_par,
                            self.opts.spread_debug,
                        )
                    })?;
            } else {
                for (i, slab) in fw.chunks_mut(nf_total).take(n_sets).enumerate() {
                    spread_sorted(
                        &self.sort_idx,
                        self.nf,
                        slab,
                        x,
                        y,
                        z,
                        &cpj_ref[i * nj..(i + 1) * nj],
                        &self.kernel,
                        inner_par,
                        self.opts.spread_debug,
                    )?;
                }
            }
            t_spread += timer.elapsed().as_secs_f64();

            // step 3: inner type-2 over exactly this batch's slabs; the
            // FFT adapter iterates per slab, so a short final batch just
            // lowers the inner transform count without re-planning
            let timer = Instant::now();
            state.inner.n_transf = n_sets;
            state
                .inner
                .execute(&mut f[blk * nk..(blk + n_sets) * nk], &mut fw[..n_sets * nf_total])?;
            t_inner += timer.elapsed().as_secs_f64();

            // step 4: post phase and kernel-transform division, fused at
            // set_points time into a single multiplier per target
            let timer = Instant::now();
            let post = &state.postphase;
            f[blk * nk..(blk + n_sets) * nk]
                .par_chunks_mut(nk)
                .for_each(|chunk| {
                    for (v, p) in chunk.iter_mut().zip(post) {
                        *v = *v * *p;
                    }
                });
            t_post += timer.elapsed().as_secs_f64();

            done += n_sets;
        }

        if self.opts.debug > 0 {
            println!("[execute] tot prephase: {:.3}s", t_prephase);
            println!("[execute] tot spread: {:.3}s", t_spread);
            println!("[execute] tot inner type-2: {:.3}s", t_inner);
            println!("[execute] tot postprocess: {:.3}s", t_post);
        }
        Ok(())
    }

    ///////////////
    // Accessors //
    ///////////////

    /// Warnings queued while planning (tolerance clamps)
    pub fn warnings(&self) -> &[NufftWarning] {
        &self.warnings
    }

    pub fn kind(&self) -> TransformKind {
        self.kind
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn transform_count(&self) -> usize {
        self.n_transf
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Fine grid sizes chosen by the planner (unused dimensions 1)
    pub fn fine_grid(&self) -> [usize; 3] {
        self.nf
    }

    pub fn kernel_width(&self) -> usize {
        self.kernel.width()
    }

    pub fn did_sort(&self) -> bool {
        self.did_sort
    }
}

/// Deconvolve one transform's slab in the dimension-appropriate shape
#[allow(clippy::too_many_arguments)]
fn deconvolve_set<T: NufftFloat>(
    dir: DeconvolveDir,
    dim: usize,
    modes: [usize; 3],
    nf: [usize; 3],
    ker1: &[T],
    ker2: &[T],
    ker3: &[T],
    fk: &mut [Complex<T>],
    fw: &mut [Complex<T>],
    modeord: ModeOrder,
) {
    match dim {
        1 => deconvolve_shuffle_1d(dir, T::one(), ker1, modes[0], fk, nf[0], fw, modeord),
        2 => deconvolve_shuffle_2d(
            dir,
            T::one(),
            ker1,
            ker2,
            modes[0],
            modes[1],
            fk,
            nf[0],
            nf[1],
            fw,
            modeord,
        ),
        _ => deconvolve_shuffle_3d(
            dir,
            T::one(),
            ker1,
            ker2,
            ker3,
            modes[0],
            modes[1],
            modes[2],
            fk,
            nf[0],
            nf[1],
            nf[2],
            fw,
            modeord,
        ),
    }
}

///////////
// Tests //
///////////
