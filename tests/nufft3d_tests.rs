#![allow(clippy::needless_range_loop)]

mod commons;
use commons::*;

use nufft_rs::prelude::*;
use rustfft::num_complex::Complex;

/// Accuracy against direct summation in three dimensions
#[test]
fn accuracy_against_direct_summation_3d() {
    let nj = 400;
    let (ms, mt, mu) = (10, 8, 6);
    let tol = 1e-9;
    let x = random_points(nj, 201);
    let y = random_points(nj, 202);
    let z = random_points(nj, 203);
    let c = random_strengths(nj, 204);

    let opts = default_options();
    let f = nufft_3d1(&x, &y, &z, &c, 1, tol, ms, mt, mu, &opts).unwrap();
    let f_direct = direct_type1(&x, Some(&y), Some(&z), &c, [ms, mt, mu], 1.0);
    let err = rel_l2_error(&f, &f_direct);
    println!("3d t1 err={:.2e}", err);
    assert!(err < 10.0 * tol);
}

/// Round trip: forward then adjoint, each leg checked against direct
/// summation (the composition itself is a Dirichlet-kernel smoothing,
/// not the identity, so each leg is validated on its own)
#[test]
fn type1_then_type2_round_trip_legs() {
    let nj = 300;
    let (ms, mt, mu) = (8, 8, 8);
    let tol = 1e-9;
    let x = random_points(nj, 211);
    let y = random_points(nj, 212);
    let z = random_points(nj, 213);
    let c = random_strengths(nj, 214);

    let opts = default_options();
    let f = nufft_3d1(&x, &y, &z, &c, 1, tol, ms, mt, mu, &opts).unwrap();
    let f_direct = direct_type1(&x, Some(&y), Some(&z), &c, [ms, mt, mu], 1.0);
    assert!(rel_l2_error(&f, &f_direct) < 10.0 * tol);

    let back = nufft_3d2(&x, &y, &z, &f, -1, tol, ms, mt, mu, &opts).unwrap();
    let back_direct = direct_type2(&x, Some(&y), Some(&z), &f, [ms, mt, mu], -1.0);
    assert!(rel_l2_error(&back, &back_direct) < 10.0 * tol);
}

/// Type 3 in three dimensions against direct summation
#[test]
fn type3_matches_direct_summation_3d() {
    let nj = 150;
    let nk = 60;
    let tol = 1e-7;
    let x = random_points(nj, 221);
    let y = random_points(nj, 222);
    let z = random_points(nj, 223);
    let c = random_strengths(nj, 224);
    let s = random_freqs(nk, 6.0, 225);
    let t = random_freqs(nk, 5.0, 226);
    let u = random_freqs(nk, 4.0, 227);

    let opts = default_options();
    let f = nufft_3d3(&x, &y, &z, &c, -1, tol, &s, &t, &u, &opts).unwrap();
    let f_direct = direct_type3(&x, Some(&y), Some(&z), &c, &s, Some(&t), Some(&u), -1.0);
    let err = rel_l2_error(&f, &f_direct);
    println!("3d t3 err={:.2e}", err);
    assert!(err < 10.0 * tol);
}

/// A batched 3-d type 1 with a short last batch
#[test]
fn batched_3d_with_short_final_batch() {
    let nj = 200;
    let n_transf = 5;
    let (ms, mt, mu) = (6, 6, 6);
    let tol = 1e-8;
    let x = random_points(nj, 231);
    let y = random_points(nj, 232);
    let z = random_points(nj, 233);
    let c = random_strengths(nj * n_transf, 234);

    let mut opts = default_options();
    opts.max_batch_size = 2; // 5 transforms -> batches of 2, 2, 1
    let mut plan =
        NufftPlan::new(TransformKind::Type1, 3, &[ms, mt, mu], 1, n_transf, tol, &opts).unwrap();
    plan.set_points(&x, Some(&y), Some(&z)).unwrap();
    let mut strengths = c.clone();
    let n_modes = ms * mt * mu;
    let mut f = vec![Complex::new(0.0, 0.0); n_modes * n_transf];
    plan.execute(&mut strengths, &mut f).unwrap();

    for i in 0..n_transf {
        let want = direct_type1(
            &x,
            Some(&y),
            Some(&z),
            &c[i * nj..(i + 1) * nj],
            [ms, mt, mu],
            1.0,
        );
        let err = rel_l2_error(&f[i * n_modes..(i + 1) * n_modes], &want);
        assert!(err < 10.0 * tol, "set {}: err={:.2e}", i, err);
    }
}

/// Batched type 3 with a short last batch exercises the mutable inner
/// transform count
#[test]
fn batched_type3_with_short_final_batch() {
    let nj = 120;
    let nk = 45;
    let n_transf = 3;
    let tol = 1e-7;
    let x = random_points(nj, 241);
    let c = random_strengths(nj * n_transf, 242);
    let s = random_freqs(nk, 10.0, 243);

    let mut opts = default_options();
    opts.max_batch_size = 2; // batches of 2 then 1
    let mut plan = NufftPlan::new(TransformKind::Type3, 1, &[], 1, n_transf, tol, &opts).unwrap();
    plan.set_points_type3(&x, None, None, &s, None, None).unwrap();
    let mut strengths = c.clone();
    let mut f = vec![Complex::new(0.0, 0.0); nk * n_transf];
    plan.execute(&mut strengths, &mut f).unwrap();

    for i in 0..n_transf {
        let want = direct_type3(
            &x,
            None,
            None,
            &c[i * nj..(i + 1) * nj],
            &s,
            None,
            None,
            1.0,
        );
        let err = rel_l2_error(&f[i * nk..(i + 1) * nk], &want);
        assert!(err < 10.0 * tol, "set {}: err={:.2e}", i, err);
    }

    // a second execute after the short batch must still be correct
    let c2 = random_strengths(nj * n_transf, 244);
    let mut strengths2 = c2.clone();
    plan.execute(&mut strengths2, &mut f).unwrap();
    let want = direct_type3(&x, None, None, &c2[..nj], &s, None, None, 1.0);
    assert!(rel_l2_error(&f[..nk], &want) < 10.0 * tol);
}
