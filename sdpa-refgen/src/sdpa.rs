//! Scaled-dot-product attention over 4-D tensors.
//!
//! This is the reference computation the generated documents certify: an
//! explicit, step-by-step attention kernel rather than a call into a deep
//! learning library, so every intermediate value is pinned down for
//! cross-implementation comparison.
//!
//! Layout convention for all inputs: `(batch, heads, sequence, head_dim)`.
//! Every `(batch, head)` slice is computed independently of the others.

use crate::error::{RefgenError, Result};
use crate::tensor::Tensor;

/// Compute scaled-dot-product attention.
///
/// For each `(batch, head)` slice:
///
/// 1. `scores = Q @ Kᵗ`, shape `(Sq, Sk)`
/// 2. scale every score by `scale` if given, else by `1 / sqrt(D)` where
///    `D` is the query head-dim
/// 3. add `mask` elementwise if given (broadcast over batch/head when the
///    mask has fewer leading dimensions)
/// 4. row-wise softmax over the key positions, max-subtraction stabilized
/// 5. `output = weights @ V`, shape `(Sq, Dv)`
///
/// The value head-dim `Dv` may differ from `D`; it determines the output's
/// trailing dimension. The result has shape `(B, H, Sq, Dv)`.
///
/// # Arguments
///
/// * `query` - `(B, H, Sq, D)`
/// * `key`   - `(B, H, Sk, D)`
/// * `value` - `(B, H, Sk, Dv)`
/// * `mask`  - optional additive logits, broadcastable to `(Sq, Sk)` scores
/// * `scale` - optional override for the default `1 / sqrt(D)`
///
/// # Errors
///
/// Returns `ShapeMismatch` when Q/K/V disagree on batch, heads, shared
/// head-dim, or key/value sequence length, or when the mask cannot
/// broadcast against the scores. Nothing is computed on mismatch.
///
/// # Example
///
/// ```rust
/// use sdpa_refgen::sdpa::sdpa;
/// use sdpa_refgen::tensor::Tensor;
///
/// let q = Tensor::ramp(&[1, 1, 2, 4], 1.0).unwrap();
/// let k = Tensor::ramp(&[1, 1, 2, 4], 0.5).unwrap();
/// let v = Tensor::ramp(&[1, 1, 2, 4], 0.1).unwrap();
///
/// let out = sdpa(&q, &k, &v, None, None).unwrap();
/// assert_eq!(out.shape(), &[1, 1, 2, 4]);
/// ```
pub fn sdpa(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    mask: Option<&Tensor>,
    scale: Option<f32>,
) -> Result<Tensor> {
    let q = rank4(query, "query")?;
    let k = rank4(key, "key")?;
    let v = rank4(value, "value")?;

    let [b, h, _sq, d] = q;
    let [kb, kh, sk, kd] = k;
    let [vb, vh, vs, _dv] = v;

    // Q and K must agree on batch, heads, and the dot-product dimension.
    if kb != b || kh != h || kd != d {
        return Err(RefgenError::ShapeMismatch {
            expected: vec![b, h, sk, d],
            got: key.shape().to_vec(),
        });
    }
    // V shares batch/heads and K's sequence length; its head-dim is free.
    if vb != b || vh != h || vs != sk {
        return Err(RefgenError::ShapeMismatch {
            expected: vec![b, h, sk, v[3]],
            got: value.shape().to_vec(),
        });
    }

    let effective_scale = match scale {
        Some(s) => s,
        None => 1.0 / (d as f32).sqrt(),
    };

    // (B, H, Sq, D) @ (B, H, D, Sk) -> (B, H, Sq, Sk)
    let key_t = key.transpose_dims(2, 3)?;
    let scores = query.matmul(&key_t)?.mul_scalar(effective_scale);

    let scores = match mask {
        Some(mask) => scores.add(mask)?,
        None => scores,
    };

    let weights = scores.softmax(3)?;

    // (B, H, Sq, Sk) @ (B, H, Sk, Dv) -> (B, H, Sq, Dv)
    weights.matmul(value)
}

/// Extract a tensor's shape as `[B, H, S, D]`, rejecting other ranks.
fn rank4(t: &Tensor, role: &str) -> Result<[usize; 4]> {
    let shape = t.shape();
    if shape.len() != 4 {
        return Err(RefgenError::Msg(format!(
            "{} must be rank 4 (batch, heads, sequence, head_dim), got shape {:?}",
            role, shape
        )));
    }
    Ok([shape[0], shape[1], shape[2], shape[3]])
}
