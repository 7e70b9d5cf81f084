use super::*;
use candle_core::{Device, Result, Tensor};
use candle_nn::ops::softmax_last_dim;

#[test]
fn causal_mask_discards_strictly_above_diagonal() -> Result<()> {
    let device = Device::Cpu;
    let q_len = 3;
    let kv_len = 5;

    let mask = build_causal_mask(&device, q_len, kv_len)?;
    assert_eq!(mask.dims(), &[q_len, kv_len]);
    assert_eq!(mask.dtype(), MASK_DTYPE);

    let rows = mask.to_vec2::<f32>()?;
    for (q, row) in rows.iter().enumerate() {
        for (k, value) in row.iter().enumerate() {
            if k > q {
                assert_eq!(*value, f32::NEG_INFINITY, "({q}, {k})");
            } else {
                assert_eq!(*value, 0.0, "({q}, {k})");
            }
        }
    }
    Ok(())
}

#[test]
fn causal_mask_handles_single_token_cases() -> Result<()> {
    let device = Device::Cpu;

    let mask = build_causal_mask(&device, 1, 1)?;
    assert_eq!(mask.flatten_all()?.to_vec1::<f32>()?, vec![0.0]);

    let mask = build_causal_mask(&device, 1, 4)?;
    assert_eq!(
        mask.flatten_all()?.to_vec1::<f32>()?,
        vec![0.0, f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY]
    );

    // More queries than keys: late queries see every key.
    let mask = build_causal_mask(&device, 4, 2)?;
    let rows = mask.to_vec2::<f32>()?;
    assert_eq!(rows[0], vec![0.0, f32::NEG_INFINITY]);
    assert_eq!(rows[3], vec![0.0, 0.0]);
    Ok(())
}

#[test]
fn masked_softmax_rows_sum_to_one() -> Result<()> {
    let device = Device::Cpu;
    let q_len = 4;
    let kv_len = 6;
    let scores: Vec<f32> = (0..q_len * kv_len).map(|i| (i as f32) * 0.37 - 2.0).collect();
    let scores = Tensor::from_vec(scores, (q_len, kv_len), &device)?;

    let mask = build_causal_mask(&device, q_len, kv_len)?;
    let probs = softmax_last_dim(&scores.broadcast_add(&mask)?)?;
    let rows = probs.to_vec2::<f32>()?;

    for (q, row) in rows.iter().enumerate() {
        let total: f32 = row.iter().sum();
        assert!((total - 1.0).abs() < 1e-5, "row {q} sums to {total}");
        for value in &row[q + 1..] {
            assert_eq!(*value, 0.0);
        }
    }
    // The first query only sees the first key.
    assert!((rows[0][0] - 1.0).abs() < 1e-6);
    Ok(())
}
