use rayon::prelude::*;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;
use std::sync::Mutex;
use thousands::*;

use crate::kernel::KernelEvaluator;
use crate::opts::{NufftError, NufftResult, SortStrategy};
use crate::NufftFloat;

/////////////
// Globals //
/////////////

/// Tile edge along the leading (fastest) grid dimension
const SORT_TILE_LEADING: usize = 16;
/// Tile edge along the trailing dimensions
const SORT_TILE_TRAILING: usize = 4;
/// Sorted points per parallel spreading subproblem
const MAX_SUBPROBLEM_SIZE: usize = 10_000;
/// Below this many points a single serial subproblem wins
const SERIAL_SPREAD_CUTOFF: usize = 10_000;
/// Points handled per interpolation work item
const INTERP_CHUNK: usize = 2_048;

/////////////
// Folding //
/////////////

/// Fold a coordinate into `[0, 2 pi)` and rescale to grid units `[0, nf)`
///
/// Wraps by `2 pi` at most twice, covering the legal input range
/// `[-3 pi, 3 pi]` without a floor; `x = 0` lands exactly on grid
/// index 0, which keeps the kernel spectrum a pure positive cosine
/// integral.
#[inline(always)]
pub fn fold_rescale<T: NufftFloat>(x: T, nf: usize) -> T {
    let two_pi = T::from_f64(2.0 * PI).unwrap();
    let folded = if x >= T::zero() {
        if x < two_pi {
            x
        } else {
            x - two_pi
        }
    } else if x >= -two_pi {
        x + two_pi
    } else {
        x + two_pi + two_pi
    };
    folded * T::from_f64(nf as f64 / (2.0 * PI)).unwrap()
}

///////////////////
// Point checks  //
///////////////////

/// Verify all points lie in the fold-safe range `[-3 pi, 3 pi]`
///
/// Only called when `chkbnds` is on; with it off, stray points are
/// caught later when their stencil centre misses the grid.
pub fn spread_check<T: NufftFloat>(
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    chkbnds: bool,
) -> NufftResult<()> {
    if !chkbnds {
        return Ok(());
    }
    let bound = T::from_f64(3.0 * PI).unwrap();
    for coords in [Some(x), y, z].into_iter().flatten() {
        for (i, &v) in coords.iter().enumerate() {
            if !(v.abs() <= bound) {
                return Err(NufftError::PointOutOfRange {
                    index: i,
                    coord: v.to_f64().unwrap_or(f64::NAN),
                });
            }
        }
    }
    Ok(())
}

/////////////
// Sorting //
/////////////

/// Whether to bucket-sort under the given strategy
pub fn decide_sort(strategy: SortStrategy, nj: usize, nf_total: usize) -> bool {
    match strategy {
        SortStrategy::Never => false,
        SortStrategy::Always => true,
        SortStrategy::Auto => nj <= 10 * nf_total && rayon::current_num_threads() > 1,
    }
}

/// Stable counting sort of points by coarse fine-grid tile
///
/// Tiles are `16 x 4 x 4` grid cells (leading dimension first), so the
/// sorted order visits points grouped by contiguous patches of the fine
/// grid and spread writes stay in a bounded working set per tile.
///
/// ### Params
///
/// * `x`, `y`, `z` - Point coordinates, trailing dimensions optional
/// * `nf` - Fine grid sizes (unused dimensions 1)
///
/// ### Returns
///
/// A permutation of `0..nj`, stable within each tile.
pub fn bin_sort_points<T: NufftFloat>(
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    nf: [usize; 3],
) -> Vec<usize> {
    let nj = x.len();
    let nb = [
        nf[0].div_ceil(SORT_TILE_LEADING).max(1),
        nf[1].div_ceil(SORT_TILE_TRAILING).max(1),
        nf[2].div_ceil(SORT_TILE_TRAILING).max(1),
    ];

    let tile_of = |v: T, nf_d: usize, tile: usize, nb_d: usize| -> usize {
        let g = fold_rescale(v, nf_d).to_usize().unwrap_or(0);
        (g / tile).min(nb_d - 1)
    };

    let mut bin_of = vec![0usize; nj];
    for i in 0..nj {
        let b0 = tile_of(x[i], nf[0], SORT_TILE_LEADING, nb[0]);
        let b1 = y.map_or(0, |y| tile_of(y[i], nf[1], SORT_TILE_TRAILING, nb[1]));
        let b2 = z.map_or(0, |z| tile_of(z[i], nf[2], SORT_TILE_TRAILING, nb[2]));
        bin_of[i] = (b2 * nb[1] + b1) * nb[0] + b0;
    }

    let mut counts = vec![0usize; nb[0] * nb[1] * nb[2]];
    for &b in &bin_of {
        counts[b] += 1;
    }
    let mut offsets = counts;
    let mut running = 0;
    for o in offsets.iter_mut() {
        let c = *o;
        *o = running;
        running += c;
    }

    let mut sort_idx = vec![0usize; nj];
    for i in 0..nj {
        let b = bin_of[i];
        sort_idx[offsets[b]] = i;
        offsets[b] += 1;
    }
    sort_idx
}

//////////////
// Subgrids //
//////////////

/// A padded local grid one subproblem spreads into before the serial
/// wrap-around merge
struct Subgrid<T> {
    offset: [i64; 3],
    size: [usize; 3],
    data: Vec<Complex<T>>,
}

/// Leftmost stencil index and offset for a folded grid coordinate
#[inline(always)]
fn stencil_start<T: NufftFloat>(xi: T, half_width: T) -> (i64, T) {
    let i0 = (xi - half_width).ceil();
    (i0.to_i64().unwrap_or(0), i0 - xi)
}

/// Fold one dimension of a point, rejecting coordinates that miss the
/// grid even after wrapping (possible with `chkbnds` off or NaN input)
#[inline(always)]
fn fold_checked<T: NufftFloat>(v: T, nf: usize, index: usize) -> NufftResult<T> {
    let nf_t = T::from_usize(nf).unwrap();
    let mut xi = fold_rescale(v, nf);
    if xi == nf_t {
        // a tiny negative coordinate can be absorbed by the 2 pi wrap
        xi = T::zero();
    }
    if xi >= T::zero() && xi < nf_t {
        Ok(xi)
    } else {
        Err(NufftError::PointOutOfRange {
            index,
            coord: v.to_f64().unwrap_or(f64::NAN),
        })
    }
}

/// Spread one chunk of (sorted) points into a local subgrid
fn spread_subproblem<T: NufftFloat>(
    chunk: &[usize],
    nf: [usize; 3],
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    c: &[Complex<T>],
    kernel: &KernelEvaluator<T>,
) -> NufftResult<Subgrid<T>> {
    let w = kernel.width();
    let half_width = kernel.params.half_width;

    // pass 1: fold all coordinates, find the padded bounding box
    let mut xi = vec![[T::zero(); 3]; chunk.len()];
    let mut lo = [i64::MAX; 3];
    let mut hi = [i64::MIN; 3];
    for (slot, &j) in xi.iter_mut().zip(chunk) {
        slot[0] = fold_checked(x[j], nf[0], j)?;
        if let Some(y) = y {
            slot[1] = fold_checked(y[j], nf[1], j)?;
        }
        if let Some(z) = z {
            slot[2] = fold_checked(z[j], nf[2], j)?;
        }
        for d in 0..3 {
            let (i0, _) = stencil_start(slot[d], half_width);
            lo[d] = lo[d].min(i0);
            hi[d] = hi[d].max(i0);
        }
    }

    let used = [true, y.is_some(), z.is_some()];
    let mut offset = [0i64; 3];
    let mut size = [1usize; 3];
    for d in 0..3 {
        if used[d] {
            offset[d] = lo[d];
            size[d] = (hi[d] - lo[d]) as usize + w;
        }
    }

    let zero = Complex::new(T::zero(), T::zero());
    let mut data = vec![zero; size[0] * size[1] * size[2]];
    let pw = kernel.padded_width();
    let mut ker1 = vec![T::zero(); pw];
    let mut ker2 = vec![T::zero(); pw];
    let mut ker3 = vec![T::zero(); pw];

    // pass 2: accumulate the tensor stencil of every point
    for (slot, &j) in xi.iter().zip(chunk) {
        let cj = c[j];
        let (i1, x1) = stencil_start(slot[0], half_width);
        kernel.stencil(x1, &mut ker1);
        let l1 = (i1 - offset[0]) as usize;

        match (y, z) {
            (None, _) => {
                for dx in 0..w {
                    data[l1 + dx] = data[l1 + dx] + cj * ker1[dx];
                }
            }
            (Some(_), None) => {
                let (i2, x2) = stencil_start(slot[1], half_width);
                kernel.stencil(x2, &mut ker2);
                let l2 = (i2 - offset[1]) as usize;
                for dy in 0..w {
                    let row = (l2 + dy) * size[0] + l1;
                    let cw = cj * ker2[dy];
                    for dx in 0..w {
                        data[row + dx] = data[row + dx] + cw * ker1[dx];
                    }
                }
            }
            (Some(_), Some(_)) => {
                let (i2, x2) = stencil_start(slot[1], half_width);
                kernel.stencil(x2, &mut ker2);
                let l2 = (i2 - offset[1]) as usize;
                let (i3, x3) = stencil_start(slot[2], half_width);
                kernel.stencil(x3, &mut ker3);
                let l3 = (i3 - offset[2]) as usize;
                for dz in 0..w {
                    let cz = cj * ker3[dz];
                    let plane = (l3 + dz) * size[1];
                    for dy in 0..w {
                        let row = (plane + l2 + dy) * size[0] + l1;
                        let cw = cz * ker2[dy];
                        for dx in 0..w {
                            data[row + dx] = data[row + dx] + cw * ker1[dx];
                        }
                    }
                }
            }
        }
    }

    Ok(Subgrid { offset, size, data })
}

/// Add a subgrid into the global fine grid with periodic wrap-around
fn merge_subgrid<T: NufftFloat>(fw: &mut [Complex<T>], nf: [usize; 3], sub: &Subgrid<T>) {
    let wrap = |v: i64, n: usize| -> usize { v.rem_euclid(n as i64) as usize };
    let ix: Vec<usize> = (0..sub.size[0])
        .map(|l| wrap(sub.offset[0] + l as i64, nf[0]))
        .collect();
    let iy: Vec<usize> = (0..sub.size[1])
        .map(|l| wrap(sub.offset[1] + l as i64, nf[1]))
        .collect();
    let iz: Vec<usize> = (0..sub.size[2])
        .map(|l| wrap(sub.offset[2] + l as i64, nf[2]))
        .collect();

    for l3 in 0..sub.size[2] {
        for l2 in 0..sub.size[1] {
            let grow = (iz[l3] * nf[1] + iy[l2]) * nf[0];
            let srow = (l3 * sub.size[1] + l2) * sub.size[0];
            for l1 in 0..sub.size[0] {
                let g = grow + ix[l1];
                fw[g] = fw[g] + sub.data[srow + l1];
            }
        }
    }
}

///////////////
// Spreading //
///////////////

/// Scatter point strengths onto one fine-grid slab (types 1 and 3)
///
/// The slab is zeroed first. With `parallel` on and enough points, the
/// sorted order is cut into subproblems spread concurrently into local
/// subgrids; each finished subgrid is merged into the slab serially
/// under a lock, so the scatter itself needs no atomics.
///
/// ### Params
///
/// * `sort_idx` - Iteration order (tile-sorted or identity permutation)
/// * `nf` - Fine grid sizes, unused dimensions 1
/// * `fw` - The slab, length `nf1 * nf2 * nf3`
/// * `x`, `y`, `z` - Point coordinates
/// * `c` - Strengths, one per point
/// * `kernel` - Stencil evaluator
/// * `parallel` - Allow multi-threaded subproblems
/// * `spread_debug` - Verbosity
#[allow(clippy::too_many_arguments)]
pub fn spread_sorted<T: NufftFloat>(
    sort_idx: &[usize],
    nf: [usize; 3],
    fw: &mut [Complex<T>],
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    c: &[Complex<T>],
    kernel: &KernelEvaluator<T>,
    parallel: bool,
    spread_debug: u32,
) -> NufftResult<()> {
    let zero = Complex::new(T::zero(), T::zero());
    for v in fw.iter_mut() {
        *v = zero;
    }
    let nj = sort_idx.len();
    if nj == 0 {
        return Ok(());
    }

    let run_parallel =
        parallel && nj > SERIAL_SPREAD_CUTOFF && rayon::current_num_threads() > 1;

    if !run_parallel {
        let sub = spread_subproblem(sort_idx, nf, x, y, z, c, kernel)?;
        merge_subgrid(fw, nf, &sub);
        return Ok(());
    }

    if spread_debug > 0 {
        println!(
            "[spread] {} points in {} subproblems",
            nj.separate_with_underscores(),
            nj.div_ceil(MAX_SUBPROBLEM_SIZE)
        );
    }

    let fw_lock = Mutex::new(fw);
    sort_idx
        .par_chunks(MAX_SUBPROBLEM_SIZE)
        .try_for_each(|chunk| {
            let sub = spread_subproblem(chunk, nf, x, y, z, c, kernel)?;
            let mut guard = fw_lock.lock().unwrap();
            merge_subgrid(&mut guard[..], nf, &sub);
            Ok(())
        })
}

///////////////////
// Interpolation //
///////////////////

/// Gather one point's value from the fine grid through the stencil
#[inline]
#[allow(clippy::too_many_arguments)]
fn interp_point<T: NufftFloat>(
    j: usize,
    nf: [usize; 3],
    fw: &[Complex<T>],
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    kernel: &KernelEvaluator<T>,
    ker: &mut [Vec<T>; 3],
    idx: &mut [Vec<usize>; 3],
) -> NufftResult<Complex<T>> {
    let w = kernel.width();
    let half_width = kernel.params.half_width;
    let wrap = |v: i64, n: usize| -> usize { v.rem_euclid(n as i64) as usize };

    let coords = [Some(x), y, z];
    for d in 0..3 {
        if let Some(cs) = coords[d] {
            let xi = fold_checked(cs[j], nf[d], j)?;
            let (i0, x1) = stencil_start(xi, half_width);
            kernel.stencil(x1, &mut ker[d]);
            for (t, slot) in idx[d].iter_mut().enumerate() {
                *slot = wrap(i0 + t as i64, nf[d]);
            }
        }
    }

    let mut acc = Complex::new(T::zero(), T::zero());
    match (y, z) {
        (None, _) => {
            for dx in 0..w {
                acc = acc + fw[idx[0][dx]] * ker[0][dx];
            }
        }
        (Some(_), None) => {
            for dy in 0..w {
                let row = idx[1][dy] * nf[0];
                let mut line = Complex::new(T::zero(), T::zero());
                for dx in 0..w {
                    line = line + fw[row + idx[0][dx]] * ker[0][dx];
                }
                acc = acc + line * ker[1][dy];
            }
        }
        (Some(_), Some(_)) => {
            for dz in 0..w {
                let plane = idx[2][dz] * nf[1];
                let mut slab = Complex::new(T::zero(), T::zero());
                for dy in 0..w {
                    let row = (plane + idx[1][dy]) * nf[0];
                    let mut line = Complex::new(T::zero(), T::zero());
                    for dx in 0..w {
                        line = line + fw[row + idx[0][dx]] * ker[0][dx];
                    }
                    slab = slab + line * ker[1][dy];
                }
                acc = acc + slab * ker[2][dz];
            }
        }
    }
    Ok(acc)
}

/// Gather point values from one fine-grid slab (type 2)
///
/// Threads only read the grid, so points are simply split into chunks;
/// each output slot is written by exactly one thread.
#[allow(clippy::too_many_arguments)]
pub fn interp_sorted<T: NufftFloat>(
    nf: [usize; 3],
    fw: &[Complex<T>],
    x: &[T],
    y: Option<&[T]>,
    z: Option<&[T]>,
    c: &mut [Complex<T>],
    kernel: &KernelEvaluator<T>,
    parallel: bool,
) -> NufftResult<()> {
    let pw = kernel.padded_width();
    let w = kernel.width();
    let fresh = || {
        (
            [
                vec![T::zero(); pw],
                vec![T::zero(); pw],
                vec![T::zero(); pw],
            ],
            [vec![0usize; w], vec![0usize; w], vec![0usize; w]],
        )
    };

    if parallel && rayon::current_num_threads() > 1 {
        c.par_chunks_mut(INTERP_CHUNK)
            .enumerate()
            .try_for_each(|(chunk_no, chunk)| {
                let (mut ker, mut idx) = fresh();
                for (off, slot) in chunk.iter_mut().enumerate() {
                    let j = chunk_no * INTERP_CHUNK + off;
                    *slot = interp_point(j, nf, fw, x, y, z, kernel, &mut ker, &mut idx)?;
                }
                Ok(())
            })
    } else {
        let (mut ker, mut idx) = fresh();
        for (j, slot) in c.iter_mut().enumerate() {
            *slot = interp_point(j, nf, fw, x, y, z, kernel, &mut ker, &mut idx)?;
        }
        Ok(())
    }
}

///////////
// Tests //
///////////
