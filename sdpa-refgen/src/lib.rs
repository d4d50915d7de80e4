//! Reference-output generator for scaled-dot-product attention.
//!
//! Builds deterministic input tensors, computes attention with exact,
//! library-free numeric semantics (optional additive mask, optional scale
//! override, stability-aware softmax), and serializes inputs and outputs to
//! a portable JSON document. Independent implementations reproduce the
//! document bit-for-bit within a stated floating-point tolerance.
//!
//! Bottom-up structure:
//!
//! - [`tensor`]: immutable row-major f32 values and the few operations the
//!   kernel needs
//! - [`mask`]: causal additive-mask construction with a finite sentinel
//! - [`sdpa`]: the attention kernel itself
//! - [`cases`] and [`document`]: the fixed scenario catalog and the
//!   serialized reference document
//! - [`embeddings`]: contract surface for the external embedding-extraction
//!   collaborator
//!
//! # Example
//!
//! ```rust
//! use sdpa_refgen::cases;
//!
//! let document = cases::run_catalog(&cases::catalog()).unwrap();
//! assert_eq!(document.test_cases.len(), 4);
//! assert_eq!(document.test_cases[0].name, "basic");
//! ```

#![warn(missing_docs)]

pub mod cases;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod mask;
pub mod sdpa;
pub mod tensor;
