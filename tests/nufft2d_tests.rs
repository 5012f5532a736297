#![allow(clippy::needless_range_loop)]

mod commons;
use commons::*;

use nufft_rs::prelude::*;
use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Scenario: one strength-2 point produces pure phase ramps
#[test]
fn type1_single_point_phase_ramp() {
    let tol = 1e-10;
    let opts = default_options();
    let x = vec![PI / 3.0];
    let y = vec![PI / 4.0];
    let c = vec![Complex::new(2.0, 0.0)];
    let (ms, mt) = (4, 4);

    let f = nufft_2d1(&x, &y, &c, 1, tol, ms, mt, &opts).unwrap();

    for ky in -2i64..2 {
        for kx in -2i64..2 {
            let phase = kx as f64 * PI / 3.0 + ky as f64 * PI / 4.0;
            let want = Complex::new(2.0 * phase.cos(), 2.0 * phase.sin());
            let got = f[((ky + 2) * 4 + kx + 2) as usize];
            assert!(
                (got - want).norm() < 2.0 * 5.0 * tol,
                "k=({},{}) got={} want={}",
                kx,
                ky,
                got,
                want
            );
        }
    }
}

/// Accuracy against direct summation, both directions
#[test]
fn accuracy_against_direct_summation() {
    let nj = 600;
    let (ms, mt) = (20, 14);
    let x = random_points(nj, 101);
    let y = random_points(nj, 102);
    let c = random_strengths(nj, 103);

    for &tol in &[1e-6, 1e-10] {
        let opts = default_options();
        let f = nufft_2d1(&x, &y, &c, -1, tol, ms, mt, &opts).unwrap();
        let f_direct = direct_type1(&x, Some(&y), None, &c, [ms, mt, 1], -1.0);
        let err1 = rel_l2_error(&f, &f_direct);

        let vals = nufft_2d2(&x, &y, &f_direct, 1, tol, ms, mt, &opts).unwrap();
        let vals_direct = direct_type2(&x, Some(&y), None, &f_direct, [ms, mt, 1], 1.0);
        let err2 = rel_l2_error(&vals, &vals_direct);

        println!("2d tol={:.0e}: t1={:.2e} t2={:.2e}", tol, err1, err2);
        assert!(err1 < 10.0 * tol);
        assert!(err2 < 10.0 * tol);
    }
}

/// Type 3 in two dimensions against direct summation
#[test]
fn type3_matches_direct_summation_2d() {
    let nj = 300;
    let nk = 100;
    let tol = 1e-9;
    let x = random_points(nj, 111);
    let y = random_points(nj, 112);
    let c = random_strengths(nj, 113);
    let s = random_freqs(nk, 12.0, 114);
    let t = random_freqs(nk, 8.0, 115);

    let opts = default_options();
    let f = nufft_2d3(&x, &y, &c, 1, tol, &s, &t, &opts).unwrap();
    let f_direct = direct_type3(&x, Some(&y), None, &c, &s, Some(&t), None, 1.0);
    let err = rel_l2_error(&f, &f_direct);
    println!("2d t3 err={:.2e}", err);
    assert!(err < 10.0 * tol);
}

/// Scenario: batched and one-at-a-time executions agree
#[test]
fn batched_execution_matches_single_transforms() {
    let nj = 400;
    let n_transf = 7;
    let (ms, mt) = (16, 12);
    let tol = 1e-9;
    let x = random_points(nj, 121);
    let y = random_points(nj, 122);
    let c = random_strengths(nj * n_transf, 123);

    let run = |max_batch: usize| -> Vec<Complex<f64>> {
        let mut opts = default_options();
        opts.max_batch_size = max_batch;
        let mut plan =
            NufftPlan::new(TransformKind::Type1, 2, &[ms, mt], 1, n_transf, tol, &opts).unwrap();
        plan.set_points(&x, Some(&y), None).unwrap();
        let mut strengths = c.clone();
        let mut f = vec![Complex::new(0.0, 0.0); ms * mt * n_transf];
        plan.execute(&mut strengths, &mut f).unwrap();
        f
    };

    let f_batched = run(3);
    let f_single = run(1);
    let err = rel_l2_error(&f_batched, &f_single);
    println!("batched vs single err={:.2e}", err);
    assert!(err < 10.0 * tol);

    // each set also matches its own direct sum
    let f_direct: Vec<Complex<f64>> = (0..n_transf)
        .flat_map(|i| {
            direct_type1(
                &x,
                Some(&y),
                None,
                &c[i * nj..(i + 1) * nj],
                [ms, mt, 1],
                1.0,
            )
        })
        .collect();
    assert!(rel_l2_error(&f_batched, &f_direct) < 10.0 * tol);
}

/// Property: outputs do not depend on the threading scheme
#[test]
fn output_is_thread_mode_invariant() {
    let nj = 500;
    let n_transf = 4;
    let (ms, mt) = (12, 12);
    let tol = 1e-9;
    let x = random_points(nj, 131);
    let y = random_points(nj, 132);
    let c = random_strengths(nj * n_transf, 133);

    let run = |mode: SpreadThreading| -> Vec<Complex<f64>> {
        let mut opts = default_options();
        opts.spread_thread = mode;
        let mut plan =
            NufftPlan::new(TransformKind::Type1, 2, &[ms, mt], -1, n_transf, tol, &opts).unwrap();
        plan.set_points(&x, Some(&y), None).unwrap();
        let mut strengths = c.clone();
        let mut f = vec![Complex::new(0.0, 0.0); ms * mt * n_transf];
        plan.execute(&mut strengths, &mut f).unwrap();
        f
    };

    let base = run(SpreadThreading::SeqOuter);
    for mode in [
        SpreadThreading::Auto,
        SpreadThreading::ParOuter,
        SpreadThreading::Nested,
    ] {
        let f = run(mode);
        assert!(rel_l2_error(&f, &base) < tol, "mode {:?}", mode);
    }
}

/// Batched type 2 pulls its slab of modes per set
#[test]
fn batched_type2_reads_per_set_modes() {
    let nj = 250;
    let n_transf = 3;
    let (ms, mt) = (10, 8);
    let tol = 1e-9;
    let x = random_points(nj, 141);
    let y = random_points(nj, 142);
    let modes = random_strengths(ms * mt * n_transf, 143);

    let opts = default_options();
    let mut plan =
        NufftPlan::new(TransformKind::Type2, 2, &[ms, mt], -1, n_transf, tol, &opts).unwrap();
    plan.set_points(&x, Some(&y), None).unwrap();
    let mut f = modes.clone();
    let mut c = vec![Complex::new(0.0, 0.0); nj * n_transf];
    plan.execute(&mut c, &mut f).unwrap();

    for i in 0..n_transf {
        let want = direct_type2(
            &x,
            Some(&y),
            None,
            &modes[i * ms * mt..(i + 1) * ms * mt],
            [ms, mt, 1],
            -1.0,
        );
        let err = rel_l2_error(&c[i * nj..(i + 1) * nj], &want);
        assert!(err < 10.0 * tol, "set {}: err={:.2e}", i, err);
    }
}

/// The low oversampling factor carries through two dimensions
#[test]
fn low_upsampling_factor_2d() {
    let nj = 400;
    let (ms, mt) = (18, 18);
    let tol = 1e-6;
    let x = random_points(nj, 151);
    let y = random_points(nj, 152);
    let c = random_strengths(nj, 153);

    let mut opts = default_options();
    opts.upsampfac = 1.25;
    let f = nufft_2d1(&x, &y, &c, 1, tol, ms, mt, &opts).unwrap();
    let f_direct = direct_type1(&x, Some(&y), None, &c, [ms, mt, 1], 1.0);
    let err = rel_l2_error(&f, &f_direct);
    println!("2d sigma=1.25 err={:.2e}", err);
    assert!(err < 10.0 * tol);
}
