//! The persisted reference document.
//!
//! A document pairs every case's inputs with its expected output as flat
//! row-major arrays plus shape metadata, and is the contract an independent
//! attention implementation must reproduce within a stated floating-point
//! tolerance. Writing is a single scoped operation: the whole document is
//! serialized to a string first and hits the filesystem in one write, so a
//! failed run never leaves a partial file behind.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tensor::Tensor;

/// A tensor flattened for interchange: shape metadata plus row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    /// Dimensions, outermost first.
    pub shape: Vec<usize>,
    /// Row-major flattening of the tensor.
    pub data: Vec<f32>,
}

impl From<&Tensor> for TensorData {
    fn from(tensor: &Tensor) -> Self {
        TensorData {
            shape: tensor.shape().to_vec(),
            data: tensor.data().to_vec(),
        }
    }
}

impl TensorData {
    /// Rebuild the in-memory tensor this entry describes.
    ///
    /// # Errors
    ///
    /// Returns the usual construction errors if the entry is internally
    /// inconsistent (length not matching the shape product, zero dims).
    pub fn to_tensor(&self) -> Result<Tensor> {
        Tensor::new(self.data.clone(), self.shape.clone())
    }
}

/// The inputs of one test case.
///
/// `mask` and `scale` are present only when the case defines them; absence
/// means "no mask" and "use the default `1 / sqrt(D)` scale".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseInput {
    /// Query tensor, `(B, H, Sq, D)`.
    pub query: TensorData,
    /// Key tensor, `(B, H, Sk, D)`.
    pub key: TensorData,
    /// Value tensor, `(B, H, Sk, Dv)`.
    pub value: TensorData,
    /// Optional additive mask, `(Sq, Sk)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<TensorData>,
    /// Optional scale override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

/// One named scenario: inputs and the expected attention output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    /// Case name, unique within a document.
    pub name: String,
    /// The case inputs.
    pub input: CaseInput,
    /// Expected output, `(B, H, Sq, Dv)`.
    pub output: TensorData,
}

/// The complete, ordered reference document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDocument {
    /// Cases in catalog order, preserved for reproducible diffing.
    pub test_cases: Vec<TestCase>,
}

impl TestDocument {
    /// Look up a case by name.
    pub fn case(&self, name: &str) -> Option<&TestCase> {
        self.test_cases.iter().find(|c| c.name == name)
    }

    /// Serialize the whole document as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the document to `path` in one scoped operation.
    ///
    /// Serialization happens fully in memory before any filesystem access;
    /// there are no incremental or streaming writes.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if JSON encoding fails and `Io` if the write
    /// itself does.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously written document.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `Serialization` if it is
    /// not a valid document.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
