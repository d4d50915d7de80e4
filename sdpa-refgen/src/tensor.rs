//! Immutable row-major tensor values.
//!
//! The [`Tensor`] type is the unit of data for the whole generator: inputs
//! are built once, flowed through the attention kernel, and serialized. All
//! storage and arithmetic is single-precision (f32) and row-major, so a
//! tensor's flat `data` buffer is directly comparable with the flattened
//! arrays in the output document.
//!
//! Only the operations the generator needs are implemented: deterministic
//! construction, reshape, dimension transpose, matrix multiply (2-D and
//! batched 4-D), broadcasting addition, scalar multiply, and a stabilized
//! softmax over the trailing dimension.
//!
//! # Example
//!
//! ```rust
//! use sdpa_refgen::tensor::Tensor;
//!
//! // A 2x3 ramp: 0, 1, 2, 3, 4, 5
//! let t = Tensor::ramp(&[2, 3], 1.0).unwrap();
//! assert_eq!(t.shape(), &[2, 3]);
//! assert_eq!(t.numel(), 6);
//! assert_eq!(t.data()[4], 4.0);
//! ```

use rayon::prelude::*;

use crate::error::{RefgenError, Result};

/// An immutable N-dimensional array of f32 values in row-major order.
///
/// Invariant: `data.len() == shape.iter().product()`, the rank is at least 1,
/// and every dimension is at least 1. Both are enforced at construction, so
/// operations never re-check them.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a tensor from a flat data buffer and a shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` if the shape has rank 0 or any zero dimension,
    /// and `ShapeMismatch` if `data.len()` differs from the shape's element
    /// count.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
    /// assert_eq!(t.shape(), &[2, 2]);
    ///
    /// assert!(Tensor::new(vec![1.0], vec![0]).is_err());
    /// ```
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        check_shape(&shape)?;
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(RefgenError::ShapeMismatch {
                expected: vec![numel],
                got: vec![data.len()],
            });
        }
        Ok(Tensor { data, shape })
    }

    /// Build a deterministic ramp tensor.
    ///
    /// The flat element at index `i` is `i as f32 * multiplier`, reshaped
    /// row-major to `shape`. The same shape and multiplier always produce
    /// bit-identical data; there is no randomness anywhere in construction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` if the shape has rank 0 or any zero dimension.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let t = Tensor::ramp(&[2, 2], 0.5).unwrap();
    /// assert_eq!(t.data(), &[0.0, 0.5, 1.0, 1.5]);
    /// ```
    pub fn ramp(shape: &[usize], multiplier: f32) -> Result<Self> {
        check_shape(shape)?;
        let numel: usize = shape.iter().product();
        let data = (0..numel).map(|i| i as f32 * multiplier).collect();
        Ok(Tensor {
            data,
            shape: shape.to_vec(),
        })
    }

    /// The tensor's shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements (product of all dimensions).
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// The flat row-major data buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Consume the tensor and return its flat data buffer.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Reinterpret the data under a new shape with the same element count.
    ///
    /// Row-major order is preserved; no data moves.
    ///
    /// # Errors
    ///
    /// Returns `InvalidShape` for a degenerate target shape and
    /// `ShapeMismatch` if the element counts differ.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let t = Tensor::ramp(&[2, 3], 1.0).unwrap();
    /// let r = t.reshape(&[3, 2]).unwrap();
    /// assert_eq!(r.shape(), &[3, 2]);
    /// assert_eq!(r.data(), t.data());
    /// ```
    pub fn reshape(&self, new_shape: &[usize]) -> Result<Tensor> {
        check_shape(new_shape)?;
        let new_numel: usize = new_shape.iter().product();
        if new_numel != self.numel() {
            return Err(RefgenError::ShapeMismatch {
                expected: vec![self.numel()],
                got: vec![new_numel],
            });
        }
        Ok(Tensor {
            data: self.data.clone(),
            shape: new_shape.to_vec(),
        })
    }

    /// Swap two dimensions, reordering data to match the new layout.
    ///
    /// Works for tensors of any rank. Swapping a dimension with itself is a
    /// copy.
    ///
    /// # Errors
    ///
    /// Returns `DimOutOfRange` if either index is not a valid dimension.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// // [[0, 1], [2, 3]] transposed is [[0, 2], [1, 3]]
    /// let t = Tensor::ramp(&[2, 2], 1.0).unwrap();
    /// let tt = t.transpose_dims(0, 1).unwrap();
    /// assert_eq!(tt.data(), &[0.0, 2.0, 1.0, 3.0]);
    /// ```
    pub fn transpose_dims(&self, dim0: usize, dim1: usize) -> Result<Tensor> {
        let ndim = self.ndim();
        for dim in [dim0, dim1] {
            if dim >= ndim {
                return Err(RefgenError::DimOutOfRange { dim, ndim });
            }
        }
        if dim0 == dim1 {
            return Ok(self.clone());
        }

        let mut out_shape = self.shape.clone();
        out_shape.swap(dim0, dim1);
        let out_strides = strides_for(&out_shape);
        let src_strides = strides_for(&self.shape);

        let mut out = vec![0.0f32; self.numel()];
        for (flat, slot) in out.iter_mut().enumerate() {
            // Decompose the output index axis by axis and accumulate the
            // source offset with dim0/dim1 exchanged.
            let mut rem = flat;
            let mut src = 0usize;
            for (d, &stride) in out_strides.iter().enumerate() {
                let idx = rem / stride;
                rem %= stride;
                let sd = if d == dim0 {
                    dim1
                } else if d == dim1 {
                    dim0
                } else {
                    d
                };
                src += idx * src_strides[sd];
            }
            *slot = self.data[src];
        }

        Tensor::new(out, out_shape)
    }

    /// Matrix multiplication: `self @ rhs`.
    ///
    /// Supports two layouts:
    /// - 2-D: `[M, K] @ [K, N] -> [M, N]`
    /// - 4-D batched: `[B, H, M, K] @ [B, H, K, N] -> [B, H, M, N]`, one
    ///   independent 2-D multiply per `(batch, head)` slice
    ///
    /// The 4-D form is what attention uses for both `Q @ Kᵗ` and
    /// `weights @ V`. Slices share no state, so they are computed in
    /// parallel; each writes only its own output range and the result is
    /// identical to a sequential pass.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` when batch/head/inner dimensions disagree and
    /// `Msg` for unsupported ranks.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
    /// let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]).unwrap();
    /// let c = a.matmul(&b).unwrap();
    /// assert_eq!(c.data(), &[19.0, 22.0, 43.0, 50.0]);
    /// ```
    pub fn matmul(&self, rhs: &Tensor) -> Result<Tensor> {
        match (self.ndim(), rhs.ndim()) {
            (2, 2) => matmul_2d(self, rhs),
            (4, 4) => matmul_4d(self, rhs),
            (a, b) => Err(RefgenError::Msg(format!(
                "matmul: unsupported ranks {}D @ {}D (only 2D and batched 4D)",
                a, b
            ))),
        }
    }

    /// Elementwise addition with NumPy-style broadcasting.
    ///
    /// Shapes are aligned from the right; each pair of dimensions must be
    /// equal or one of them 1, and missing leading dimensions count as 1.
    /// This is how a `[Sq, Sk]` mask lands on `[B, H, Sq, Sk]` attention
    /// scores.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` if the shapes cannot broadcast.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let a = Tensor::ramp(&[2, 2], 1.0).unwrap();
    /// let row = Tensor::new(vec![10.0, 20.0], vec![2]).unwrap();
    /// let c = a.add(&row).unwrap();
    /// assert_eq!(c.data(), &[10.0, 21.0, 12.0, 23.0]);
    /// ```
    pub fn add(&self, rhs: &Tensor) -> Result<Tensor> {
        if self.shape == rhs.shape {
            let data = self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(a, b)| a + b)
                .collect();
            return Ok(Tensor {
                data,
                shape: self.shape.clone(),
            });
        }
        broadcast_add(self, rhs)
    }

    /// Multiply every element by a scalar.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let t = Tensor::ramp(&[3], 1.0).unwrap();
    /// assert_eq!(t.mul_scalar(2.0).data(), &[0.0, 2.0, 4.0]);
    /// ```
    pub fn mul_scalar(&self, scalar: f32) -> Tensor {
        Tensor {
            data: self.data.iter().map(|x| x * scalar).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Softmax along the trailing dimension, one row at a time.
    ///
    /// Each row is stabilized by subtracting its maximum before
    /// exponentiation. The row maximum therefore exponentiates to exactly 1,
    /// so the normalizing sum is at least 1 and the division is always
    /// well-defined, including for rows dominated by a large negative mask
    /// sentinel.
    ///
    /// Rows are independent and processed in parallel; within a row the
    /// accumulation order is fixed, so results are deterministic.
    ///
    /// # Errors
    ///
    /// Returns `DimOutOfRange` for an invalid dimension index and `Msg` if
    /// `dim` is not the trailing dimension.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sdpa_refgen::tensor::Tensor;
    ///
    /// let t = Tensor::new(vec![0.0, 0.0, 1.0, 2.0], vec![2, 2]).unwrap();
    /// let s = t.softmax(1).unwrap();
    /// let row0: f32 = s.data()[..2].iter().sum();
    /// assert!((row0 - 1.0).abs() < 1e-6);
    /// ```
    pub fn softmax(&self, dim: usize) -> Result<Tensor> {
        let ndim = self.ndim();
        if dim >= ndim {
            return Err(RefgenError::DimOutOfRange { dim, ndim });
        }
        if dim != ndim - 1 {
            return Err(RefgenError::Msg(format!(
                "softmax: only the trailing dimension is supported, got dim {} of {}",
                dim, ndim
            )));
        }

        let width = self.shape[ndim - 1];
        let mut out = self.data.clone();
        out.par_chunks_mut(width).for_each(|row| {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0f32;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        });

        Ok(Tensor {
            data: out,
            shape: self.shape.clone(),
        })
    }
}

/// Reject shapes with rank 0 or a zero dimension.
fn check_shape(shape: &[usize]) -> Result<()> {
    if shape.is_empty() || shape.contains(&0) {
        return Err(RefgenError::InvalidShape {
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

/// Row-major strides: the last dimension has stride 1, each earlier one the
/// product of all later sizes.
fn strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// `[M, K] @ [K, N] -> [M, N]`, naive triple loop.
fn matmul_2d(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let (m, k) = (lhs.shape[0], lhs.shape[1]);
    let (k_rhs, n) = (rhs.shape[0], rhs.shape[1]);
    if k != k_rhs {
        return Err(RefgenError::ShapeMismatch {
            expected: vec![k, n],
            got: rhs.shape.clone(),
        });
    }

    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0f32;
            for p in 0..k {
                acc += lhs.data[i * k + p] * rhs.data[p * n + j];
            }
            out[i * n + j] = acc;
        }
    }
    Tensor::new(out, vec![m, n])
}

/// `[B, H, M, K] @ [B, H, K, N] -> [B, H, M, N]`.
///
/// Each `(batch, head)` slice is an independent 2-D multiply over its own
/// contiguous range, mapped in parallel.
fn matmul_4d(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let (b, h, m, k) = (lhs.shape[0], lhs.shape[1], lhs.shape[2], lhs.shape[3]);
    if rhs.shape[0] != b || rhs.shape[1] != h {
        return Err(RefgenError::ShapeMismatch {
            expected: vec![b, h, rhs.shape[2], rhs.shape[3]],
            got: rhs.shape.clone(),
        });
    }
    if rhs.shape[2] != k {
        return Err(RefgenError::ShapeMismatch {
            expected: vec![b, h, k, rhs.shape[3]],
            got: rhs.shape.clone(),
        });
    }
    let n = rhs.shape[3];

    let mut out = vec![0.0f32; b * h * m * n];
    out.par_chunks_mut(m * n)
        .enumerate()
        .for_each(|(slice, out_slice)| {
            let a = &lhs.data[slice * m * k..(slice + 1) * m * k];
            let bm = &rhs.data[slice * k * n..(slice + 1) * k * n];
            for i in 0..m {
                for j in 0..n {
                    let mut acc = 0.0f32;
                    for p in 0..k {
                        acc += a[i * k + p] * bm[p * n + j];
                    }
                    out_slice[i * n + j] = acc;
                }
            }
        });

    Tensor::new(out, vec![b, h, m, n])
}

/// The broadcast output shape for two operand shapes, aligned from the right.
fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let ndim = a.len().max(b.len());
    let mut out = vec![0usize; ndim];
    for i in 0..ndim {
        let ad = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let bd = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        out[ndim - 1 - i] = if ad == bd || bd == 1 {
            ad
        } else if ad == 1 {
            bd
        } else {
            return Err(RefgenError::ShapeMismatch {
                expected: a.to_vec(),
                got: b.to_vec(),
            });
        };
    }
    Ok(out)
}

/// Strides for a shape padded to `ndim` axes, with stride 0 on broadcast
/// (size-1) axes so the same source element is reused across that axis.
fn broadcast_strides(shape: &[usize], ndim: usize) -> Vec<usize> {
    let pad = ndim - shape.len();
    let real = strides_for(shape);
    let mut out = vec![0usize; ndim];
    for d in 0..shape.len() {
        out[pad + d] = if shape[d] == 1 { 0 } else { real[d] };
    }
    out
}

fn broadcast_add(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let out_shape = broadcast_shape(&lhs.shape, &rhs.shape)?;
    let ndim = out_shape.len();
    let out_strides = strides_for(&out_shape);
    let l_strides = broadcast_strides(&lhs.shape, ndim);
    let r_strides = broadcast_strides(&rhs.shape, ndim);

    let numel: usize = out_shape.iter().product();
    let mut out = vec![0.0f32; numel];
    for (flat, slot) in out.iter_mut().enumerate() {
        let mut rem = flat;
        let mut l = 0usize;
        let mut r = 0usize;
        for d in 0..ndim {
            let idx = rem / out_strides[d];
            rem %= out_strides[d];
            l += idx * l_strides[d];
            r += idx * r_strides[d];
        }
        *slot = lhs.data[l] + rhs.data[r];
    }

    Tensor::new(out, out_shape)
}
