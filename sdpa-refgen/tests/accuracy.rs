//! Accuracy tests for the generated reference document.
//!
//! The document is the product this crate exists to produce, so these tests
//! treat it the way a downstream consumer would: generate the catalog, then
//! check every promised property against an independent plain-loop
//! recomputation that shares no code with the library's tensor ops.
//!
//! Tolerance: 1e-5 absolute, matching the comparison tolerance stated in the
//! document's contract.

use approx::assert_abs_diff_eq;

use sdpa_refgen::cases::{build_case, catalog, run_catalog};
use sdpa_refgen::document::{CaseInput, TestDocument};

const TOLERANCE: f32 = 1e-5;

/// Assert two flat buffers match element by element.
fn assert_all_close(predicted: &[f32], reference: &[f32], label: &str) {
    assert_eq!(
        predicted.len(),
        reference.len(),
        "{}: length mismatch: {} vs {}",
        label,
        predicted.len(),
        reference.len()
    );
    for (idx, (&p, &r)) in predicted.iter().zip(reference.iter()).enumerate() {
        assert!(
            (p - r).abs() < TOLERANCE,
            "{}: element {} differs: {} vs {}",
            label,
            idx,
            p,
            r
        );
    }
}

/// Independent recomputation of attention from a case's serialized inputs.
///
/// Deliberately written as straight loops over flat buffers, with no tensor
/// machinery, so an error in the library cannot hide here too. Returns the
/// softmax weights `(B, H, Sq, Sk)` and the output `(B, H, Sq, Dv)`.
fn reference_sdpa(input: &CaseInput) -> (Vec<f32>, Vec<f32>) {
    let (b, h, sq, d) = (
        input.query.shape[0],
        input.query.shape[1],
        input.query.shape[2],
        input.query.shape[3],
    );
    let sk = input.key.shape[2];
    let dv = input.value.shape[3];
    let scale = input.scale.unwrap_or(1.0 / (d as f32).sqrt());

    let q = &input.query.data;
    let k = &input.key.data;
    let v = &input.value.data;

    let mut weights = vec![0.0f32; b * h * sq * sk];
    let mut output = vec![0.0f32; b * h * sq * dv];

    for slice in 0..b * h {
        let q_off = slice * sq * d;
        let k_off = slice * sk * d;
        let v_off = slice * sk * dv;
        let w_off = slice * sq * sk;
        let o_off = slice * sq * dv;

        for i in 0..sq {
            let mut row = vec![0.0f32; sk];
            for (j, slot) in row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for p in 0..d {
                    acc += q[q_off + i * d + p] * k[k_off + j * d + p];
                }
                acc *= scale;
                if let Some(mask) = &input.mask {
                    acc += mask.data[i * sk + j];
                }
                *slot = acc;
            }

            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            for value in row.iter_mut() {
                *value = (*value - max).exp();
                sum += *value;
            }
            for value in row.iter_mut() {
                *value /= sum;
            }

            weights[w_off + i * sk..w_off + (i + 1) * sk].copy_from_slice(&row);
            for c in 0..dv {
                let mut acc = 0.0f32;
                for (j, &w) in row.iter().enumerate() {
                    acc += w * v[v_off + j * dv + c];
                }
                output[o_off + i * dv + c] = acc;
            }
        }
    }

    (weights, output)
}

fn generate() -> TestDocument {
    run_catalog(&catalog()).expect("catalog generation failed")
}

#[test]
fn test_every_case_matches_independent_recomputation() {
    let document = generate();
    assert_eq!(document.test_cases.len(), 4);
    for case in &document.test_cases {
        let (_, expected) = reference_sdpa(&case.input);
        assert_all_close(&case.output.data, &expected, &case.name);
    }
}

#[test]
fn test_data_lengths_match_shape_products() {
    let document = generate();
    for case in &document.test_cases {
        let tensors = [
            &case.input.query,
            &case.input.key,
            &case.input.value,
            &case.output,
        ];
        for tensor in tensors {
            assert_eq!(
                tensor.data.len(),
                tensor.shape.iter().product::<usize>(),
                "case '{}': data length does not match shape {:?}",
                case.name,
                tensor.shape
            );
        }
        if let Some(mask) = &case.input.mask {
            assert_eq!(mask.data.len(), mask.shape.iter().product::<usize>());
        }
    }
}

#[test]
fn test_output_shape_propagation() {
    let document = generate();
    for case in &document.test_cases {
        assert_eq!(
            &case.output.shape[..3],
            &case.input.query.shape[..3],
            "case '{}': leading output dims must follow the query",
            case.name
        );
        assert_eq!(
            case.output.shape[3], case.input.value.shape[3],
            "case '{}': trailing output dim must follow the value",
            case.name
        );
    }
}

#[test]
fn test_unmasked_softmax_rows_sum_to_one() {
    let document = generate();
    for case in &document.test_cases {
        if case.input.mask.is_some() {
            continue;
        }
        let (weights, _) = reference_sdpa(&case.input);
        let sk = case.input.key.shape[2];
        for (row_idx, row) in weights.chunks(sk).enumerate() {
            let sum: f32 = row.iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = TOLERANCE);
            assert!(
                row.iter().all(|&w| w >= 0.0),
                "case '{}': negative weight in row {}",
                case.name,
                row_idx
            );
        }
    }
}

#[test]
fn test_basic_case_is_softmax_weighted_average_of_value_rows() {
    let document = generate();
    let case = document.case("basic").expect("basic case missing");
    let (weights, _) = reference_sdpa(&case.input);

    // Two key positions: each output row is w0 * value_row0 + w1 * value_row1.
    let v = &case.input.value.data;
    for i in 0..2 {
        let (w0, w1) = (weights[i * 2], weights[i * 2 + 1]);
        assert_abs_diff_eq!(w0 + w1, 1.0, epsilon = TOLERANCE);
        for c in 0..4 {
            let expected = w0 * v[c] + w1 * v[4 + c];
            assert!(
                (case.output.data[i * 4 + c] - expected).abs() < TOLERANCE,
                "basic: row {} col {} is not the weighted value average",
                i,
                c
            );
        }
    }
}

#[test]
fn test_with_mask_first_row_reads_only_value_row_zero() {
    let document = generate();
    let case = document.case("with_mask").expect("with_mask case missing");
    assert_eq!(
        case.input.mask.as_ref().map(|m| m.shape.clone()),
        Some(vec![4, 4])
    );

    // All key positions after 0 are masked for query position 0, so the
    // first output row carries weight 1.0 on value row 0.
    let value = &case.input.value.data;
    assert_all_close(&case.output.data[..8], &value[..8], "with_mask row 0");
}

#[test]
fn test_omitted_scale_equals_explicit_default() {
    let mut spec = catalog()[0].clone();
    assert!(spec.scale.is_none());
    let implicit = build_case(&spec).expect("implicit-scale case failed");

    let head_dim = spec.query_shape[3] as f32;
    spec.scale = Some(1.0 / head_dim.sqrt());
    let explicit = build_case(&spec).expect("explicit-scale case failed");

    assert_all_close(
        &implicit.output.data,
        &explicit.output.data,
        "default scale",
    );
}

#[test]
fn test_case_results_do_not_depend_on_execution_order() {
    let forward = generate();
    let mut reversed_specs = catalog();
    reversed_specs.reverse();
    let reversed = run_catalog(&reversed_specs).expect("reversed run failed");

    for case in &forward.test_cases {
        let twin = reversed
            .case(&case.name)
            .expect("case missing from reversed run");
        assert_eq!(case, twin, "case '{}' changed with run order", case.name);
    }
}

#[test]
fn test_repeated_runs_are_bit_identical() {
    assert_eq!(generate(), generate());
}

#[test]
fn test_document_round_trips_through_disk() {
    let document = generate();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sdpa.json");

    document.write_to(&path).expect("write failed");
    let loaded = TestDocument::load_from(&path).expect("load failed");
    assert_eq!(document, loaded);
}

#[test]
fn test_serialized_layout_matches_consumer_contract() {
    let document = generate();
    let json: serde_json::Value =
        serde_json::from_str(&document.to_json().expect("to_json")).expect("parse");

    let cases = json["test_cases"].as_array().expect("test_cases array");
    assert_eq!(cases.len(), 4);

    let basic = &cases[0];
    assert_eq!(basic["name"], "basic");
    assert!(basic["input"]["query"]["shape"].is_array());
    assert!(basic["input"]["query"]["data"].is_array());
    assert!(basic["input"].get("mask").is_none());
    assert!(basic["input"].get("scale").is_none());

    let with_scale = &cases[1];
    assert_eq!(with_scale["input"]["scale"], 0.25);

    let with_mask = &cases[2];
    let mask = &with_mask["input"]["mask"];
    assert_eq!(mask["shape"], serde_json::json!([4, 4]));
    let sentinel = mask["data"][1].as_f64().expect("mask entry");
    assert_eq!(sentinel, -1e9);
}
