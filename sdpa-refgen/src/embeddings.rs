//! Contract surface for the embedding-extraction collaborator.
//!
//! Actual model inference (weight loading, tokenization, forward passes)
//! lives outside this crate behind the [`EmbeddingModel`] trait. What this
//! module owns is the fixed model-family tag set, the per-family extraction
//! strategy (pooling, truncation, normalization), and the post-processing
//! that turns a collaborator's embedding tensor into the flat numeric vector
//! callers compare against.
//!
//! # Example
//!
//! ```rust
//! use sdpa_refgen::embeddings::ModelFamily;
//!
//! let family: ModelFamily = "xlm-roberta".parse().unwrap();
//! assert_eq!(family, ModelFamily::XlmRoberta);
//! assert!("word2vec-large".parse::<ModelFamily>().is_err());
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{RefgenError, Result};
use crate::tensor::Tensor;

/// The supported pretrained model families.
///
/// Each tag selects an extraction strategy; parsing any other string fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// BERT encoders, CLS-token pooled.
    Bert,
    /// RoBERTa encoders, CLS-token pooled.
    Roberta,
    /// XLM-RoBERTa encoders, CLS-token pooled.
    XlmRoberta,
    /// ModernBERT sentence encoders, truncated to 768 dimensions.
    ModernBert,
    /// CLIP text towers, pooler output.
    Clip,
    /// Model2Vec static embedding models.
    Model2Vec,
    /// Static sentence embeddings, truncated to 1023 dimensions and
    /// L2-normalized.
    StaticEmbeddings,
    /// Nomic encoders, truncated to 768 dimensions, unnormalized.
    Nomic,
}

impl ModelFamily {
    /// Every supported family, in tag order.
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::Bert,
        ModelFamily::Roberta,
        ModelFamily::XlmRoberta,
        ModelFamily::ModernBert,
        ModelFamily::Clip,
        ModelFamily::Model2Vec,
        ModelFamily::StaticEmbeddings,
        ModelFamily::Nomic,
    ];

    /// The family's string tag as it appears on the command line.
    pub fn tag(&self) -> &'static str {
        match self {
            ModelFamily::Bert => "bert",
            ModelFamily::Roberta => "roberta",
            ModelFamily::XlmRoberta => "xlm-roberta",
            ModelFamily::ModernBert => "modernbert",
            ModelFamily::Clip => "clip",
            ModelFamily::Model2Vec => "model2vec",
            ModelFamily::StaticEmbeddings => "static-embeddings",
            ModelFamily::Nomic => "nomic",
        }
    }

    /// The post-processing strategy applied to this family's embeddings.
    pub fn strategy(&self) -> ExtractionStrategy {
        match self {
            ModelFamily::Bert | ModelFamily::Roberta | ModelFamily::XlmRoberta => {
                ExtractionStrategy {
                    pooling: Pooling::ClsToken,
                    truncate_dim: None,
                    normalize: false,
                }
            }
            ModelFamily::ModernBert => ExtractionStrategy {
                pooling: Pooling::Pooled,
                truncate_dim: Some(768),
                normalize: false,
            },
            ModelFamily::Clip | ModelFamily::Model2Vec => ExtractionStrategy {
                pooling: Pooling::Pooled,
                truncate_dim: None,
                normalize: false,
            },
            ModelFamily::StaticEmbeddings => ExtractionStrategy {
                pooling: Pooling::Pooled,
                truncate_dim: Some(1023),
                normalize: true,
            },
            ModelFamily::Nomic => ExtractionStrategy {
                pooling: Pooling::Pooled,
                truncate_dim: Some(768),
                normalize: false,
            },
        }
    }
}

impl FromStr for ModelFamily {
    type Err = RefgenError;

    fn from_str(tag: &str) -> Result<Self> {
        ModelFamily::ALL
            .into_iter()
            .find(|family| family.tag() == tag)
            .ok_or_else(|| RefgenError::UnknownModelFamily(tag.to_string()))
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// How a family's raw embedding tensor becomes the reported vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStrategy {
    /// Where the per-text vector comes from.
    pub pooling: Pooling,
    /// Keep only the first this-many dimensions of each vector, if set.
    pub truncate_dim: Option<usize>,
    /// L2-normalize each vector after truncation.
    pub normalize: bool,
}

/// Pooling mode for a model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    /// The collaborator returns token-level output `[batch, tokens, hidden]`;
    /// take the first (CLS) token of every sequence.
    ClsToken,
    /// The collaborator already returns one vector per text,
    /// `[batch, hidden]` or `[hidden]` for a single text.
    Pooled,
}

/// Text to embed: one string or an ordered batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextInput {
    /// A single text.
    Single(String),
    /// An ordered batch of texts.
    Batch(Vec<String>),
}

impl TextInput {
    /// Number of texts in the input.
    pub fn len(&self) -> usize {
        match self {
            TextInput::Single(_) => 1,
            TextInput::Batch(texts) => texts.len(),
        }
    }

    /// True when the input holds no text at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The external collaborator: anything that can turn text into an embedding
/// tensor for a model stored under `model_dir`.
///
/// CLS-pooled families must return rank-3 `[batch, tokens, hidden]` output;
/// pre-pooled families return `[batch, hidden]` (or `[hidden]` for a single
/// text).
pub trait EmbeddingModel {
    /// Encode the input texts for the given family.
    fn encode(&self, model_dir: &Path, family: ModelFamily, input: &TextInput) -> Result<Tensor>;
}

/// Run the full extraction contract: encode, apply the family strategy, and
/// flatten row-major.
///
/// # Errors
///
/// Propagates collaborator errors, and fails when the returned tensor's
/// rank does not fit the family's pooling mode.
pub fn extract_embeddings(
    model: &dyn EmbeddingModel,
    model_dir: &Path,
    family: ModelFamily,
    input: &TextInput,
) -> Result<Vec<f32>> {
    let raw = model.encode(model_dir, family, input)?;
    finalize(&raw, family.strategy())
}

/// Apply a strategy to a raw embedding tensor and flatten the result.
pub fn finalize(embeddings: &Tensor, strategy: ExtractionStrategy) -> Result<Vec<f32>> {
    let pooled = match strategy.pooling {
        Pooling::ClsToken => cls_pool(embeddings)?,
        Pooling::Pooled => as_rows(embeddings)?,
    };
    let truncated = match strategy.truncate_dim {
        Some(dim) => truncate_rows(&pooled, dim),
        None => pooled,
    };
    let finished = if strategy.normalize {
        normalize_rows(&truncated)
    } else {
        truncated
    };
    Ok(finished.into_iter().flatten().collect())
}

/// `[batch, tokens, hidden]` -> one CLS (position 0) vector per batch row.
fn cls_pool(embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    let shape = embeddings.shape();
    if shape.len() != 3 {
        return Err(RefgenError::Msg(format!(
            "CLS pooling needs rank-3 [batch, tokens, hidden] output, got shape {:?}",
            shape
        )));
    }
    let (batch, tokens, hidden) = (shape[0], shape[1], shape[2]);
    let data = embeddings.data();
    let rows = (0..batch)
        .map(|b| data[b * tokens * hidden..b * tokens * hidden + hidden].to_vec())
        .collect();
    Ok(rows)
}

/// Interpret a pre-pooled tensor as one vector per text.
fn as_rows(embeddings: &Tensor) -> Result<Vec<Vec<f32>>> {
    let shape = embeddings.shape();
    match shape.len() {
        1 => Ok(vec![embeddings.data().to_vec()]),
        2 => {
            let hidden = shape[1];
            Ok(embeddings.data().chunks(hidden).map(<[f32]>::to_vec).collect())
        }
        _ => Err(RefgenError::Msg(format!(
            "pre-pooled output must be rank 1 or 2, got shape {:?}",
            shape
        ))),
    }
}

/// Keep the first `dim` entries of each row. Rows narrower than `dim` are
/// left as-is, matching the upstream slicing semantics.
fn truncate_rows(rows: &[Vec<f32>], dim: usize) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|row| row[..dim.min(row.len())].to_vec())
        .collect()
}

/// L2-normalize each row, guarding the all-zero vector.
fn normalize_rows(rows: &[Vec<f32>]) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|row| {
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-12);
            row.iter().map(|x| x / norm).collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stand-in collaborator returning deterministic ramp embeddings.
    struct RampModel {
        tokens: usize,
        hidden: usize,
    }

    impl EmbeddingModel for RampModel {
        fn encode(
            &self,
            _model_dir: &Path,
            family: ModelFamily,
            input: &TextInput,
        ) -> Result<Tensor> {
            match family.strategy().pooling {
                Pooling::ClsToken => {
                    Tensor::ramp(&[input.len(), self.tokens, self.hidden], 1.0)
                }
                Pooling::Pooled => Tensor::ramp(&[input.len(), self.hidden], 1.0),
            }
        }
    }

    #[test]
    fn test_every_tag_parses_back_to_its_family() {
        for family in ModelFamily::ALL {
            let parsed: ModelFamily = family.tag().parse().unwrap();
            assert_eq!(parsed, family);
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected_with_context() {
        match "distilgpt".parse::<ModelFamily>() {
            Err(RefgenError::UnknownModelFamily(tag)) => assert_eq!(tag, "distilgpt"),
            other => panic!("Expected UnknownModelFamily, got: {:?}", other),
        }
    }

    #[test]
    fn test_strategies_match_the_family_table() {
        assert_eq!(ModelFamily::Bert.strategy().pooling, Pooling::ClsToken);
        assert_eq!(ModelFamily::ModernBert.strategy().truncate_dim, Some(768));
        assert_eq!(
            ModelFamily::StaticEmbeddings.strategy().truncate_dim,
            Some(1023)
        );
        assert!(ModelFamily::StaticEmbeddings.strategy().normalize);
        assert!(!ModelFamily::Nomic.strategy().normalize);
        assert_eq!(ModelFamily::Clip.strategy().truncate_dim, None);
    }

    #[test]
    fn test_cls_pooling_takes_token_zero_per_text() {
        let model = RampModel {
            tokens: 3,
            hidden: 4,
        };
        let input = TextInput::Batch(vec!["a".into(), "b".into()]);
        let out =
            extract_embeddings(&model, Path::new("/models/bert"), ModelFamily::Bert, &input)
                .unwrap();

        // Batch row 0 starts at flat 0, row 1 at 3 * 4 = 12; each contributes
        // its first 4 values.
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0, 12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn test_truncation_keeps_leading_dimensions() {
        let rows = vec![vec![1.0, 2.0, 3.0, 4.0]];
        assert_eq!(truncate_rows(&rows, 2), vec![vec![1.0, 2.0]]);
        // Wider than the row: unchanged.
        assert_eq!(truncate_rows(&rows, 10), rows);
    }

    #[test]
    fn test_normalization_produces_unit_rows() {
        let rows = vec![vec![3.0, 4.0]];
        let normed = normalize_rows(&rows);
        assert!((normed[0][0] - 0.6).abs() < 1e-6);
        assert!((normed[0][1] - 0.8).abs() < 1e-6);

        // All-zero rows stay finite.
        let zero = normalize_rows(&[vec![0.0, 0.0]]);
        assert!(zero[0].iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_single_text_pooled_extraction() {
        let model = RampModel {
            tokens: 0,
            hidden: 5,
        };
        let input = TextInput::Single("hello".into());
        let out = extract_embeddings(
            &model,
            Path::new("/models/m2v"),
            ModelFamily::Model2Vec,
            &input,
        )
        .unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[4], 4.0);
    }

    #[test]
    fn test_cls_family_rejects_pre_pooled_rank() {
        let t = Tensor::ramp(&[2, 4], 1.0).unwrap();
        assert!(matches!(
            finalize(&t, ModelFamily::Bert.strategy()),
            Err(RefgenError::Msg(_))
        ));
    }
}
