//! The fixed catalog of reference cases and the harness that runs it.
//!
//! Every case is a pure function of its spec: inputs are deterministic ramp
//! tensors, the mask (when present) is the standard causal mask, and the
//! output comes from the explicit attention kernel. Cases are independent,
//! so the harness maps over them in parallel; catalog order is preserved in
//! the result regardless of completion order. If any case fails, the whole
//! run fails with that case's name attached and nothing is emitted.

use rayon::prelude::*;
use tracing::debug;

use crate::document::{CaseInput, TensorData, TestCase, TestDocument};
use crate::error::{RefgenError, Result};
use crate::mask::causal_mask;
use crate::sdpa::sdpa;
use crate::tensor::Tensor;

/// Ramp multiplier for query tensors.
pub const QUERY_MULTIPLIER: f32 = 1.0;
/// Ramp multiplier for key tensors.
pub const KEY_MULTIPLIER: f32 = 0.5;
/// Ramp multiplier for value tensors.
pub const VALUE_MULTIPLIER: f32 = 0.1;

/// One entry of the case catalog.
///
/// Shapes are `(batch, heads, sequence, head_dim)`. `mask_len` requests a
/// causal mask of that sequence length; `scale` overrides the default
/// `1 / sqrt(head_dim)`.
#[derive(Debug, Clone)]
pub struct CaseSpec {
    /// Case name, unique within the catalog.
    pub name: &'static str,
    /// Query shape.
    pub query_shape: [usize; 4],
    /// Key shape.
    pub key_shape: [usize; 4],
    /// Value shape.
    pub value_shape: [usize; 4],
    /// Causal mask sequence length, if the case is masked.
    pub mask_len: Option<usize>,
    /// Explicit scale override, if the case has one.
    pub scale: Option<f32>,
}

impl CaseSpec {
    fn unmasked(name: &'static str, shape: [usize; 4]) -> Self {
        CaseSpec {
            name,
            query_shape: shape,
            key_shape: shape,
            value_shape: shape,
            mask_len: None,
            scale: None,
        }
    }
}

/// The fixed catalog of reference scenarios.
///
/// Four cases covering the kernel's surface: a minimal unmasked case, an
/// explicit scale override, a causal mask, and a multi-batch multi-head
/// layout.
pub fn catalog() -> Vec<CaseSpec> {
    vec![
        CaseSpec::unmasked("basic", [1, 1, 2, 4]),
        CaseSpec {
            scale: Some(0.25),
            ..CaseSpec::unmasked("with_scale", [1, 1, 3, 8])
        },
        CaseSpec {
            mask_len: Some(4),
            ..CaseSpec::unmasked("with_mask", [1, 1, 4, 8])
        },
        CaseSpec::unmasked("multi_head", [2, 4, 3, 8]),
    ]
}

/// Build one test case: construct inputs, run the kernel, capture both.
///
/// # Errors
///
/// Propagates any construction or kernel error untouched; the harness adds
/// the case-name context.
pub fn build_case(spec: &CaseSpec) -> Result<TestCase> {
    let query = Tensor::ramp(&spec.query_shape, QUERY_MULTIPLIER)?;
    let key = Tensor::ramp(&spec.key_shape, KEY_MULTIPLIER)?;
    let value = Tensor::ramp(&spec.value_shape, VALUE_MULTIPLIER)?;
    let mask = spec.mask_len.map(causal_mask).transpose()?;

    let output = sdpa(&query, &key, &value, mask.as_ref(), spec.scale)?;
    debug!(
        name = spec.name,
        output_shape = ?output.shape(),
        "case computed"
    );

    Ok(TestCase {
        name: spec.name.to_string(),
        input: CaseInput {
            query: TensorData::from(&query),
            key: TensorData::from(&key),
            value: TensorData::from(&value),
            mask: mask.as_ref().map(TensorData::from),
            scale: spec.scale,
        },
        output: TensorData::from(&output),
    })
}

/// Run a list of case specs and assemble the ordered document.
///
/// Cases are computed in parallel; the collected order is the catalog order.
/// The first failure aborts the run, wrapped in a `Case` error naming the
/// scenario, and no document is produced.
pub fn run_catalog(specs: &[CaseSpec]) -> Result<TestDocument> {
    let test_cases = specs
        .par_iter()
        .map(|spec| {
            build_case(spec).map_err(|source| RefgenError::Case {
                name: spec.name.to_string(),
                source: Box::new(source),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TestDocument { test_cases })
}
