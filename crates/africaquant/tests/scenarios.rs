//! End-to-end codec scenarios with literal expected values.

use africaquant::{
    matrix_metadata_count, metadata_count, packed_buffer_size, packed_matrix_size,
    packed_row_bytes, AfricaQuant, BlockMeta, QuantizeConfig,
};

fn codec() -> AfricaQuant {
    AfricaQuant::new()
}

/// Mixed-sign vector at block 8, threshold 0.33: the exact packed bytes
/// follow from the code table {-1 -> 00, 0 -> 01, +1 -> 10}, LSB first.
#[test]
fn scenario_ternary_mixed_vector() {
    let q = codec();
    let weights = [1.0f32, -1.0, 0.0, 0.5, -0.5, 0.25, -0.25, 0.0];
    let mut packed = vec![0u8; packed_buffer_size(8)];
    let mut meta = vec![BlockMeta::default(); 1];

    let cfg = QuantizeConfig {
        ternary_threshold: 0.33,
        adaptive_threshold: false,
        ..Default::default()
    };
    q.quantize_ternary(&weights, &mut packed, &mut meta, 8, Some(&cfg))
        .unwrap();

    assert_eq!(meta[0].scale, 1.0);
    // Codes: +1 -1 0 +1 | -1 0 0 0
    assert_eq!(packed[0], 0b10_01_00_10);
    assert_eq!(packed[1], 0b01_01_01_00);
}

/// All-zero vector: scale 1.0, every code is 01, every byte 0b01010101.
#[test]
fn scenario_ternary_all_zero() {
    let q = codec();
    let weights = [0.0f32; 128];
    let mut packed = vec![0u8; packed_buffer_size(128)];
    let mut meta = vec![BlockMeta::default(); 1];

    q.quantize_ternary(&weights, &mut packed, &mut meta, 128, None)
        .unwrap();

    assert_eq!(meta[0].scale, 1.0);
    assert_eq!(packed_row_bytes(128), 32);
    for &b in &packed[..32] {
        assert_eq!(b, 0b01010101);
    }
}

/// Quaternary pattern [1.2, -0.8, 0.3] repeated: scale 1.2/1.5 = 0.8 and the
/// normalized values 1.5, -1.0, 0.375 land on {+1.5, -0.5, +0.5}.
#[test]
fn scenario_quaternary_pattern() {
    let q = codec();
    let pattern = [1.2f32, -0.8, 0.3];
    let weights: Vec<f32> = (0..128).map(|i| pattern[i % 3]).collect();
    let mut packed = vec![0u8; packed_buffer_size(128)];
    let mut meta = vec![BlockMeta::default(); 1];

    q.quantize_quaternary(&weights, &mut packed, &mut meta, 128, None)
        .unwrap();

    assert!((meta[0].scale - 0.8).abs() < 1e-6, "scale {}", meta[0].scale);
    assert_eq!(meta[0].codebook_size, 4);

    // Decode and check the level pattern.
    let mut out = vec![0.0f32; 128];
    q.dequantize_quaternary(&packed, 128, &mut out, &meta, 128)
        .unwrap();
    let s = meta[0].scale;
    for (i, &v) in out.iter().enumerate() {
        let expected = match i % 3 {
            0 => 1.5 * s,  // 1.2 -> +1.5 level
            1 => -0.5 * s, // -0.8 -> -0.5 level
            _ => 0.5 * s,  // 0.3 -> +0.5 level
        };
        assert!((v - expected).abs() < 1e-6, "index {}: {} vs {}", i, v, expected);
    }
}

/// GEMV equivalence: quantize a 4x8 matrix, multiply by ones, compare against
/// the dequantize-then-multiply reference elementwise within the block scale.
#[test]
fn scenario_gemv_equivalence() {
    let q = codec();
    let (m, k) = (4, 8);
    let weights: Vec<f32> = (0..m * k)
        .map(|i| {
            let v = (i as u32).wrapping_mul(2654435761) >> 16;
            (v % 200) as f32 / 100.0 - 1.0 // [-1, 1)
        })
        .collect();

    let mut packed = vec![0u8; packed_matrix_size(m, k)];
    let mut meta = vec![BlockMeta::default(); matrix_metadata_count(m, k, 8)];
    q.quantize_matrix_ternary(&weights, m, k, &mut packed, &mut meta, 8, None)
        .unwrap();

    let x = vec![1.0f32; k];
    let mut y = vec![0.0f32; m];
    q.matvec_mul_ternary(&packed, &meta, &x, &mut y, m, k)
        .unwrap();

    let bpr = packed_row_bytes(k);
    let gpr = metadata_count(k, 8);
    for row in 0..m {
        let mut dequant = vec![0.0f32; k];
        q.dequantize_ternary(
            &packed[row * bpr..(row + 1) * bpr],
            k,
            &mut dequant,
            &meta[row * gpr..(row + 1) * gpr],
            8,
        )
        .unwrap();
        let reference: f32 = dequant.iter().sum();
        let scale = meta[row * gpr].scale;
        assert!(
            (y[row] - reference).abs() <= scale + 1e-5,
            "row {}: {} vs {}",
            row,
            y[row],
            reference
        );
    }
}
