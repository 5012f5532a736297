use rustfft::num_complex::Complex;

use crate::opts::ModeOrder;
use crate::NufftFloat;

/// Which way coefficients flow through the deconvolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeconvolveDir {
    /// Type 1: read the fine grid, write (amplified) user modes
    ToModes,
    /// Type 2: read user modes, write the zero-padded fine grid
    FromModes,
}

/// Start offsets of the non-negative and negative frequency runs inside
/// the user mode array, for either ordering
#[inline]
fn mode_offsets(kmin: i64, kmax: i64, modeord: ModeOrder) -> (usize, usize) {
    match modeord {
        ModeOrder::Cmcl => ((-kmin) as usize, 0),
        ModeOrder::Fft => (0, (kmax + 1) as usize),
    }
}

/// Divide modes by the kernel spectrum along one dimension while
/// translating between CMCL and FFT orderings
///
/// `ToModes` reads the `nf1`-long fine-grid line and writes the `ms`
/// retained modes of `fk`; `FromModes` reads `fk` and writes the line,
/// zeroing the unused middle frequencies. Both directions divide by
/// `ker`, whose `nf1/2 + 1` entries cover the non-negative frequencies
/// (negative ones by symmetry).
#[allow(clippy::too_many_arguments)]
pub fn deconvolve_shuffle_1d<T: NufftFloat>(
    dir: DeconvolveDir,
    prefac: T,
    ker: &[T],
    ms: usize,
    fk: &mut [Complex<T>],
    nf1: usize,
    fw: &mut [Complex<T>],
    modeord: ModeOrder,
) {
    let kmin = -((ms / 2) as i64);
    let kmax = if ms == 0 { -1 } else { (ms as i64 - 1) / 2 };
    let (pp, pn) = mode_offsets(kmin, kmax, modeord);

    match dir {
        DeconvolveDir::ToModes => {
            for k in 0..=kmax {
                fk[pp + k as usize] = fw[k as usize] * (prefac / ker[k as usize]);
            }
            for k in kmin..0 {
                fk[pn + (k - kmin) as usize] =
                    fw[(nf1 as i64 + k) as usize] * (prefac / ker[(-k) as usize]);
            }
        }
        DeconvolveDir::FromModes => {
            // zero pad precisely where no mode lands
            let zero = Complex::new(T::zero(), T::zero());
            for v in fw
                .iter_mut()
                .take((nf1 as i64 + kmin) as usize)
                .skip((kmax + 1) as usize)
            {
                *v = zero;
            }
            for k in 0..=kmax {
                fw[k as usize] = fk[pp + k as usize] * (prefac / ker[k as usize]);
            }
            for k in kmin..0 {
                fw[(nf1 as i64 + k) as usize] =
                    fk[pn + (k - kmin) as usize] * (prefac / ker[(-k) as usize]);
            }
        }
    }
}

/// Two-dimensional deconvolve: a 1-d pass per retained `ky` line, with
/// the `ky` kernel factor folded into the prefactor
#[allow(clippy::too_many_arguments)]
pub fn deconvolve_shuffle_2d<T: NufftFloat>(
    dir: DeconvolveDir,
    prefac: T,
    ker1: &[T],
    ker2: &[T],
    ms: usize,
    mt: usize,
    fk: &mut [Complex<T>],
    nf1: usize,
    nf2: usize,
    fw: &mut [Complex<T>],
    modeord: ModeOrder,
) {
    let k2min = -((mt / 2) as i64);
    let k2max = if mt == 0 { -1 } else { (mt as i64 - 1) / 2 };
    let (pp, pn) = mode_offsets(k2min, k2max, modeord);

    if dir == DeconvolveDir::FromModes {
        let zero = Complex::new(T::zero(), T::zero());
        let lo = nf1 * (k2max + 1) as usize;
        let hi = nf1 * (nf2 as i64 + k2min) as usize;
        for v in fw[lo..hi].iter_mut() {
            *v = zero;
        }
    }

    for k2 in 0..=k2max {
        let fk_row = (pp + k2 as usize) * ms;
        let fw_row = k2 as usize * nf1;
        deconvolve_shuffle_1d(
            dir,
            prefac / ker2[k2 as usize],
            ker1,
            ms,
            &mut fk[fk_row..fk_row + ms],
            nf1,
            &mut fw[fw_row..fw_row + nf1],
            modeord,
        );
    }
    for k2 in k2min..0 {
        let fk_row = (pn + (k2 - k2min) as usize) * ms;
        let fw_row = (nf2 as i64 + k2) as usize * nf1;
        deconvolve_shuffle_1d(
            dir,
            prefac / ker2[(-k2) as usize],
            ker1,
            ms,
            &mut fk[fk_row..fk_row + ms],
            nf1,
            &mut fw[fw_row..fw_row + nf1],
            modeord,
        );
    }
}

/// Three-dimensional deconvolve: a 2-d pass per retained `kz` plane
#[allow(clippy::too_many_arguments)]
pub fn deconvolve_shuffle_3d<T: NufftFloat>(
    dir: DeconvolveDir,
    prefac: T,
    ker1: &[T],
    ker2: &[T],
    ker3: &[T],
    ms: usize,
    mt: usize,
    mu: usize,
    fk: &mut [Complex<T>],
    nf1: usize,
    nf2: usize,
    nf3: usize,
    fw: &mut [Complex<T>],
    modeord: ModeOrder,
) {
    let k3min = -((mu / 2) as i64);
    let k3max = if mu == 0 { -1 } else { (mu as i64 - 1) / 2 };
    let (pp, pn) = mode_offsets(k3min, k3max, modeord);
    let np = nf1 * nf2;
    let mp = ms * mt;

    if dir == DeconvolveDir::FromModes {
        let zero = Complex::new(T::zero(), T::zero());
        let lo = np * (k3max + 1) as usize;
        let hi = np * (nf3 as i64 + k3min) as usize;
        for v in fw[lo..hi].iter_mut() {
            *v = zero;
        }
    }

    for k3 in 0..=k3max {
        let fk_plane = (pp + k3 as usize) * mp;
        let fw_plane = k3 as usize * np;
        deconvolve_shuffle_2d(
            dir,
            prefac / ker3[k3 as usize],
            ker1,
            ker2,
            ms,
            mt,
            &mut fk[fk_plane..fk_plane + mp],
            nf1,
            nf2,
            &mut fw[fw_plane..fw_plane + np],
            modeord,
        );
    }
    for k3 in k3min..0 {
        let fk_plane = (pn + (k3 - k3min) as usize) * mp;
        let fw_plane = (nf3 as i64 + k3) as usize * np;
        deconvolve_shuffle_2d(
            dir,
            prefac / ker3[(-k3) as usize],
            ker1,
            ker2,
            ms,
            mt,
            &mut fk[fk_plane..fk_plane + mp],
            nf1,
            nf2,
            &mut fw[fw_plane..fw_plane + np],
            modeord,
        );
    }
}

///////////
// Tests //
///////////
