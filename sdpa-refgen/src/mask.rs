//! Causal additive-mask construction.
//!
//! The mask is added to raw attention scores before softmax; it is not a
//! boolean mask. Allowed positions contribute `0.0`, disallowed positions a
//! large negative sentinel that drives their softmax weight to (effectively)
//! zero while keeping every intermediate value finite.
//!
//! # Mask layout
//!
//! For a sequence of length 4:
//!
//! ```text
//! Position: 0      1      2      3
//!        0  0.0   -1e9   -1e9   -1e9
//!        1  0.0    0.0   -1e9   -1e9
//!        2  0.0    0.0    0.0   -1e9
//!        3  0.0    0.0    0.0    0.0
//! ```

use crate::error::Result;
use crate::tensor::Tensor;

/// Additive sentinel for disallowed attention positions.
///
/// Exactly `-1e9`, not `f32::NEG_INFINITY`: downstream comparison tooling
/// consumes the finite sentinel, and the softmax stays finite even for rows
/// where every position carries it.
pub const MASK_SENTINEL: f32 = -1e9;

/// Build a causal mask of shape `[seq_len, seq_len]`.
///
/// Cell `(i, j)` is `0.0` when `j <= i` (query position `i` may attend to
/// key position `j`) and [`MASK_SENTINEL`] when `j > i`.
///
/// # Errors
///
/// Returns `InvalidShape` when `seq_len` is 0.
///
/// # Example
///
/// ```rust
/// use sdpa_refgen::mask::{causal_mask, MASK_SENTINEL};
///
/// let mask = causal_mask(3).unwrap();
/// assert_eq!(mask.shape(), &[3, 3]);
///
/// let data = mask.data();
/// assert_eq!(data[0], 0.0);            // (0, 0) visible
/// assert_eq!(data[1], MASK_SENTINEL);  // (0, 1) future
/// assert_eq!(data[5], MASK_SENTINEL);  // (1, 2) future
/// assert_eq!(data[8], 0.0);            // (2, 2) visible
/// ```
pub fn causal_mask(seq_len: usize) -> Result<Tensor> {
    let mut data = vec![0.0f32; seq_len.saturating_mul(seq_len)];
    for i in 0..seq_len {
        for j in (i + 1)..seq_len {
            data[i * seq_len + j] = MASK_SENTINEL;
        }
    }
    Tensor::new(data, vec![seq_len, seq_len])
}
