//! Structured views of the YAML the engine returns.
//!
//! ModelFinder answers with a flat mapping: one `best_model_*` key per
//! information criterion, one key per model tried whose value is
//! `"lnL nfp tree_length"`, and some bookkeeping keys (`initTree`) that are
//! skipped. AliSim answers with the simulated sequences in FASTA form under
//! `alignment`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::alignment::Alignment;
use crate::error::{IqTreeError, Result};
use crate::io::parse_fasta;
use crate::model::Model;

/// Fit statistics of one candidate model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelStats {
    /// Log likelihood
    pub lnl: f64,
    /// Number of free parameters
    pub nfp: u32,
    /// Sum of branch lengths
    pub tree_length: f64,
}

impl FromStr for ModelStats {
    type Err = IqTreeError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || IqTreeError::parse("ModelFinder result", format!("expected \"lnL nfp tree_length\", got {s:?}"));
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [lnl, nfp, tree_length] = fields.as_slice() else {
            return Err(bad());
        };
        Ok(ModelStats {
            lnl: lnl.parse().map_err(|_| bad())?,
            nfp: nfp.parse().map_err(|_| bad())?,
            tree_length: tree_length.parse().map_err(|_| bad())?,
        })
    }
}

#[derive(Deserialize)]
struct RawModelFinder {
    #[serde(rename = "best_model_AIC")]
    best_aic: String,
    #[serde(rename = "best_model_AICc")]
    best_aicc: String,
    #[serde(rename = "best_model_BIC")]
    best_bic: String,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_yaml::Value>,
}

/// What ModelFinder selected, plus the statistics of every model it tried.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFinderResult {
    pub best_aic: Model,
    pub best_aicc: Model,
    pub best_bic: Model,
    /// Keyed by the model's IQ-TREE string.
    pub model_stats: BTreeMap<String, ModelStats>,
}

impl ModelFinderResult {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawModelFinder =
            serde_yaml::from_str(yaml).map_err(|e| IqTreeError::parse("ModelFinder result", e.to_string()))?;

        let mut model_stats = BTreeMap::new();
        for (key, value) in &raw.rest {
            if key.starts_with("initTree") {
                continue;
            }
            if let serde_yaml::Value::String(line) = value {
                model_stats.insert(key.clone(), line.parse::<ModelStats>()?);
            }
        }
        debug!(models = model_stats.len(), best_bic = %raw.best_bic, "parsed ModelFinder result");

        let mut best = |text: &str| -> Result<Model> {
            let model: Model = text.parse()?;
            let stats = *model_stats.get(text).ok_or_else(|| {
                IqTreeError::parse("ModelFinder result", format!("no statistics for selected model {text:?}"))
            })?;
            model_stats.insert(model.to_string(), stats);
            Ok(model)
        };
        let best_aic = best(&raw.best_aic)?;
        let best_aicc = best(&raw.best_aicc)?;
        let best_bic = best(&raw.best_bic)?;
        Ok(ModelFinderResult { best_aic, best_aicc, best_bic, model_stats })
    }

    pub fn stats(&self, model: &Model) -> Option<&ModelStats> {
        self.model_stats.get(&model.to_string())
    }
}

#[derive(Deserialize)]
struct RawSimulation {
    alignment: String,
}

/// Sequences of an AliSim run, in the order the engine wrote them.
pub fn parse_simulated_alignment(yaml: &str) -> Result<Alignment> {
    let raw: RawSimulation =
        serde_yaml::from_str(yaml).map_err(|e| IqTreeError::parse("simulated alignment", e.to_string()))?;
    parse_fasta(&raw.alignment)
}
