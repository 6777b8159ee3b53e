use half::f16;
use wlm_kernels::packing::{pack4x16float, unpack4x16float};
use wlm_kernels::{activate_inplace, activate_packed_inplace, Activation};

#[test]
fn squared_relu_is_nonnegative_and_matches_definition() {
    let input: Vec<f32> = (0..64).map(|i| (i as f32 - 32.0) * 0.25).collect();
    let mut output = input.clone();
    activate_inplace(Activation::SquaredRelu, &mut output, 64, 1, 1).unwrap();

    for (&x, &y) in input.iter().zip(output.iter()) {
        let expected = x.max(0.0) * x.max(0.0);
        assert_eq!(y, expected);
        assert!(y >= 0.0);
    }
}

#[test]
fn tanh_is_bounded_and_odd() {
    let input: Vec<f32> = (0..32).map(|i| (i as f32 - 16.0) * 0.5).collect();
    let mut pos = input.clone();
    let mut neg: Vec<f32> = input.iter().map(|x| -x).collect();
    activate_inplace(Activation::Tanh, &mut pos, 32, 1, 1).unwrap();
    activate_inplace(Activation::Tanh, &mut neg, 32, 1, 1).unwrap();

    for (&a, &b) in pos.iter().zip(neg.iter()) {
        assert!(a.abs() <= 1.0);
        assert!((a + b).abs() < 1e-6, "tanh not odd: {a} vs {b}");
    }
    // Strict interior bound for moderate inputs.
    assert!(pos.iter().take(24).skip(8).all(|&y| y > -1.0 && y < 1.0));
}

#[test]
fn stable_exp_limits() {
    let mut data = vec![-40.0f32, -5.0, 0.0, 5.0, 40.0, 0.0, 0.0, 0.0];
    activate_inplace(Activation::StableExp, &mut data, 8, 1, 1).unwrap();

    for &y in &data {
        assert!(y.is_finite());
        assert!((0.0..=1.0).contains(&y));
    }
    // input -> -inf: output -> 1; input -> +inf: output -> 0.
    assert!((data[0] - 1.0).abs() < 1e-6);
    assert!(data[4] < 1e-30);
    assert!((data[2] - (-1.0f32).exp()).abs() < 1e-6);
}

#[test]
fn neg_exp_is_strictly_negative() {
    let mut data = vec![-10.0f32, -1.0, 0.0, 1.0];
    activate_inplace(Activation::NegExp, &mut data, 4, 1, 1).unwrap();
    assert!(data.iter().all(|&y| y < 0.0));
    assert_eq!(data[2], -1.0);
}

#[test]
fn transforms_are_positionally_independent() {
    // The same channel value must map to the same output at every
    // (batch, token) position.
    let channels = 8;
    let tokens = 3;
    let batches = 2;
    let pattern = [-1.0f32, -0.5, 0.0, 0.25, 0.5, 1.0, 2.0, -2.0];
    let mut data: Vec<f32> = pattern
        .iter()
        .cycle()
        .take(channels * tokens * batches)
        .copied()
        .collect();
    activate_inplace(Activation::StableExp, &mut data, channels, tokens, batches).unwrap();

    let first = &data[..channels].to_vec();
    for chunk in data.chunks_exact(channels) {
        assert_eq!(chunk, first.as_slice());
    }
}

#[test]
fn half_packing_round_trip_accuracy() {
    let cases: Vec<[f32; 4]> = vec![
        [0.0, 1.0, -1.0, 0.5],
        [1e-3, -1e-3, 2e-2, -2e-2],
        [100.0, -100.0, 10000.0, -10000.0],
        [0.333333, -0.666666, 7.77, -9.99],
    ];
    for v in cases {
        let rt = unpack4x16float(pack4x16float(v));
        for (a, b) in v.iter().zip(rt.iter()) {
            if *a == 0.0 {
                assert_eq!(*b, 0.0);
            } else {
                assert!(
                    ((a - b) / a).abs() <= 2.0f32.powi(-11),
                    "{a} round-tripped to {b}"
                );
            }
        }
    }
}

#[test]
fn packed_transform_agrees_with_f16_arithmetic() {
    // One group, known values: the packed path must behave as if each lane
    // were unpacked to f32, transformed, and rounded back to f16.
    let values = [0.5f32, -0.5, 1.5, -1.5];
    let mut packed: Vec<u32> = pack4x16float(values).to_vec();
    activate_packed_inplace(Activation::Tanh, &mut packed, 4, 1, 1).unwrap();

    let got = unpack4x16float([packed[0], packed[1]]);
    for (x, y) in values.iter().zip(got.iter()) {
        let lane_in = f16::from_f32(*x).to_f32();
        let expected = f16::from_f32(lane_in.tanh()).to_f32();
        assert_eq!(*y, expected);
    }
}
