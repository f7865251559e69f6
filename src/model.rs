//! IQ-TREE model strings such as `GTR+FO+I{0.2}+G4{0.5}`.
//!
//! The engine takes models as plain text; [`Model`] builds and checks that
//! text before it crosses the boundary, so typos surface as parse errors
//! instead of an engine failure halfway through a search.
//!
//! Substitution model names are checked against the catalogue below. DNA and
//! Lie-Markov models may carry rate parameters in braces (`GTR{1,2,1,1,2}`),
//! Lie-Markov names an `RY`, `WS` or `MK` pairing prefix. Protein models take
//! neither.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::error::{IqTreeError, Result};

/// Lie-Markov models AliSim cannot simulate under.
const UNSUPPORTED_FOR_SIMULATION: [&str; 7] = ["1.1", "3.3a", "4.4a", "6.7a", "9.20a", "9.20b", "12.12"];

const DNA_MODELS: [&str; 30] = [
    "JC", "JC69", "F81", "K80", "K2P", "HKY", "HKY85", "TN", "TN93", "TNe", "K81", "K3P", "K81u", "K3Pu", "TPM2",
    "TPM2u", "TPM3", "TPM3u", "TIM", "TIMe", "TIM2", "TIM2e", "TIM3", "TIM3e", "TVM", "TVMe", "SYM", "GTR", "STRSYM",
    "UNREST",
];

const LIE_MARKOV_MODELS: [&str; 37] = [
    "1.1", "2.2b", "3.3a", "3.3b", "3.3c", "3.4", "4.4a", "4.4b", "4.5a", "4.5b", "5.6a", "5.6b", "5.7a", "5.7b",
    "5.7c", "5.11a", "5.11b", "5.11c", "5.16", "6.6", "6.7a", "6.7b", "6.8a", "6.8b", "6.17a", "6.17b", "8.8",
    "8.10a", "8.10b", "8.16", "8.17", "8.18", "9.20a", "9.20b", "10.12", "10.34", "12.12",
];

const LIE_MARKOV_PAIRINGS: [&str; 3] = ["RY", "WS", "MK"];

const PROTEIN_MODELS: [&str; 38] = [
    "Blosum62", "cpREV", "Dayhoff", "DCMut", "EAL", "ELM", "FLAVI", "FLU", "GTR20", "HIVb", "HIVw", "JTT", "JTTDCMut",
    "LG", "mtART", "mtMAM", "mtREV", "mtZOA", "mtMet", "mtVer", "mtInv", "NQ.bird", "NQ.insect", "NQ.mammal",
    "NQ.pfam", "NQ.plant", "NQ.yeast", "Poisson", "PMB", "Q.bird", "Q.insect", "Q.mammal", "Q.pfam", "Q.plant",
    "Q.yeast", "rtREV", "VT", "WAG",
];

/// Family a substitution model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelKind {
    Nucleotide,
    LieMarkov,
    Protein,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::Nucleotide => "nucleotide",
            ModelKind::LieMarkov => "lie-markov",
            ModelKind::Protein => "protein",
        })
    }
}

/// Every substitution model name the catalogue accepts, without rate
/// parameters. Lie-Markov models are listed bare and with each pairing.
pub fn available_models() -> Vec<(ModelKind, String)> {
    let dna = DNA_MODELS.iter().map(|name| (ModelKind::Nucleotide, name.to_string()));
    let lie = std::iter::once("")
        .chain(LIE_MARKOV_PAIRINGS)
        .flat_map(|prefix| LIE_MARKOV_MODELS.iter().map(move |name| (ModelKind::LieMarkov, format!("{prefix}{name}"))));
    let protein = PROTEIN_MODELS.iter().map(|name| (ModelKind::Protein, name.to_string()));
    dna.chain(lie).chain(protein).collect()
}

/// Look a substitution model up in the catalogue.
///
/// `name` is the part before the first `+`, e.g. `HKY`, `GTR{1,2,1,1,2}`,
/// `WS6.7a` or `Q.pfam`.
pub fn substitution_model_kind(name: &str) -> Result<ModelKind> {
    let unknown = || IqTreeError::parse("model", format!("unknown substitution model {name:?}"));
    if PROTEIN_MODELS.contains(&name) {
        return Ok(ModelKind::Protein);
    }

    let base = match name.split_once('{') {
        Some((base, params)) => {
            let params = params
                .strip_suffix('}')
                .ok_or_else(|| IqTreeError::parse("model", format!("missing closing bracket in {name:?}")))?;
            if params.split(',').any(|p| p.trim().parse::<f64>().is_err()) {
                return Err(IqTreeError::parse("model", format!("rate parameters of {name:?} are not numbers")));
            }
            base
        }
        None => name,
    };

    if DNA_MODELS.contains(&base) {
        return Ok(ModelKind::Nucleotide);
    }
    let lie = LIE_MARKOV_PAIRINGS
        .iter()
        .find_map(|prefix| base.strip_prefix(prefix))
        .unwrap_or(base);
    if LIE_MARKOV_MODELS.contains(&lie) {
        return Ok(ModelKind::LieMarkov);
    }
    Err(unknown())
}

/// State frequency specification.
#[derive(Debug, Clone, PartialEq)]
pub enum FreqType {
    /// `F`: empirical frequencies observed in the data
    Empirical,
    /// `FO`: optimised by maximum likelihood
    Optimized,
    /// `FQ`: equal frequencies
    Equal,
    /// `F{...}`: fixed, 4 values for DNA or 20 for amino acids
    Custom(Vec<f64>),
}

impl FreqType {
    pub fn custom(frequencies: Vec<f64>) -> Result<Self> {
        if !matches!(frequencies.len(), 4 | 20) {
            return Err(IqTreeError::parse(
                "model",
                format!(
                    "expected 4 frequencies for a DNA model or 20 for an AA model but got {}",
                    frequencies.len()
                ),
            ));
        }
        Ok(FreqType::Custom(frequencies))
    }
}

impl fmt::Display for FreqType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreqType::Empirical => f.write_str("F"),
            FreqType::Optimized => f.write_str("FO"),
            FreqType::Equal => f.write_str("FQ"),
            FreqType::Custom(values) => write!(f, "F{{{}}}", values.iter().join(",")),
        }
    }
}

impl FromStr for FreqType {
    type Err = IqTreeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim_start_matches('+');
        match s {
            "F" => Ok(FreqType::Empirical),
            "FO" => Ok(FreqType::Optimized),
            "FQ" => Ok(FreqType::Equal),
            _ => {
                let inner = s
                    .strip_prefix("F{")
                    .and_then(|rest| rest.strip_suffix('}'))
                    .ok_or_else(|| IqTreeError::parse("model", format!("unknown state frequency type {s:?}")))?;
                let values = inner
                    .split(',')
                    .map(|v| v.trim().parse::<f64>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|_| IqTreeError::parse("model", format!("unable to read frequencies in {s:?}")))?;
                FreqType::custom(values)
            }
        }
    }
}

/// Rate heterogeneity across sites.
#[derive(Debug, Clone, PartialEq)]
pub enum RateModel {
    /// `G[n][{alpha}]`: discrete Gamma, alpha fixed when given
    Gamma { categories: Option<u32>, alpha: Option<f64> },
    /// `R[n]`: FreeRate
    FreeRate { categories: Option<u32> },
}

impl fmt::Display for RateModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateModel::Gamma { categories, alpha } => {
                f.write_str("G")?;
                if let Some(n) = categories {
                    write!(f, "{n}")?;
                }
                if let Some(alpha) = alpha {
                    write!(f, "{{{alpha}}}")?;
                }
                Ok(())
            }
            RateModel::FreeRate { categories: Some(n) } => write!(f, "R{n}"),
            RateModel::FreeRate { categories: None } => f.write_str("R"),
        }
    }
}

impl FromStr for RateModel {
    type Err = IqTreeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim_start_matches('+');
        let (head, params) = match s.find('{') {
            Some(open) => {
                let params = s[open + 1..]
                    .strip_suffix('}')
                    .ok_or_else(|| IqTreeError::parse("model", format!("missing closing bracket in {s:?}")))?;
                (&s[..open], Some(params))
            }
            None => (s, None),
        };

        let mut chars = head.chars();
        let kind = chars.next();
        let digits = chars.as_str();
        let categories = if digits.is_empty() {
            None
        } else {
            Some(
                digits
                    .parse::<u32>()
                    .map_err(|_| IqTreeError::parse("model", format!("invalid rate categories in {s:?}")))?,
            )
        };

        match (kind, params) {
            (Some('G'), None) => Ok(RateModel::Gamma { categories, alpha: None }),
            (Some('G'), Some(p)) => {
                let alpha = p
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| IqTreeError::parse("model", format!("gamma shape is not a number in {s:?}")))?;
                Ok(RateModel::Gamma { categories, alpha: Some(alpha) })
            }
            (Some('R'), None) => Ok(RateModel::FreeRate { categories }),
            _ => Err(IqTreeError::parse("model", format!("unexpected rate model {s:?}"))),
        }
    }
}

/// Proportion of invariable sites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvariableSites {
    /// `I`: estimated from the data
    Estimated,
    /// `I{p}` with `0 <= p < 1`
    Proportion(f64),
}

impl InvariableSites {
    pub fn proportion(p: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(IqTreeError::parse(
                "model",
                format!("proportion of invariable sites must be in [0, 1), got {p}"),
            ));
        }
        Ok(InvariableSites::Proportion(p))
    }
}

impl fmt::Display for InvariableSites {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariableSites::Estimated => f.write_str("I"),
            InvariableSites::Proportion(p) => write!(f, "I{{{p}}}"),
        }
    }
}

impl FromStr for InvariableSites {
    type Err = IqTreeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim_start_matches('+');
        let rest = s
            .strip_prefix('I')
            .ok_or_else(|| IqTreeError::parse("model", format!("not an invariable sites component {s:?}")))?;
        if rest.is_empty() {
            return Ok(InvariableSites::Estimated);
        }
        let inner = rest
            .strip_prefix('{')
            .and_then(|r| r.strip_suffix('}'))
            .ok_or_else(|| IqTreeError::parse("model", format!("invalid invariable sites specification {s:?}")))?;
        let p = inner
            .trim()
            .parse::<f64>()
            .map_err(|_| IqTreeError::parse("model", format!("failed to read proportion of invariable sites {s:?}")))?;
        InvariableSites::proportion(p)
    }
}

/// A substitution model with optional frequency and rate components.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub submodel: String,
    pub freq_type: Option<FreqType>,
    pub invariable_sites: Option<InvariableSites>,
    pub rate_model: Option<RateModel>,
}

impl Model {
    pub fn new(submodel: impl Into<String>) -> Self {
        Model {
            submodel: submodel.into(),
            freq_type: None,
            invariable_sites: None,
            rate_model: None,
        }
    }

    pub fn with_freq_type(mut self, freq_type: FreqType) -> Self {
        self.freq_type = Some(freq_type);
        self
    }

    pub fn with_invariable_sites(mut self, invariable_sites: InvariableSites) -> Self {
        self.invariable_sites = Some(invariable_sites);
        self
    }

    pub fn with_rate_model(mut self, rate_model: RateModel) -> Self {
        self.rate_model = Some(rate_model);
        self
    }

    /// Catalogue family of the substitution model.
    pub fn kind(&self) -> Result<ModelKind> {
        substitution_model_kind(&self.submodel)
    }

    /// Whether AliSim can simulate under this substitution model.
    ///
    /// Lie-Markov names may carry an `RY`, `WS` or `MK` pairing prefix.
    pub fn is_simulation_supported(&self) -> bool {
        let base = self.submodel.split('{').next().unwrap_or_default();
        let base = ["RY", "WS", "MK"]
            .iter()
            .find_map(|prefix| base.strip_prefix(prefix))
            .unwrap_or(base);
        !UNSUPPORTED_FOR_SIMULATION.contains(&base)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.submodel)?;
        if let Some(freq) = &self.freq_type {
            write!(f, "+{freq}")?;
        }
        if let Some(inv) = &self.invariable_sites {
            write!(f, "+{inv}")?;
        }
        if let Some(rate) = &self.rate_model {
            write!(f, "+{rate}")?;
        }
        Ok(())
    }
}

impl FromStr for Model {
    type Err = IqTreeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('+');
        let submodel = parts.next().unwrap_or_default().trim();
        if submodel.is_empty() {
            return Err(IqTreeError::parse("model", format!("missing substitution model in {s:?}")));
        }
        substitution_model_kind(submodel)?;

        let mut model = Model::new(submodel);
        for component in parts {
            let duplicate = |what: &str| IqTreeError::parse("model", format!("{s:?} contains multiple {what} specifications"));
            match component.chars().next() {
                Some('F') => {
                    if model.freq_type.is_some() {
                        return Err(duplicate("base frequency"));
                    }
                    model.freq_type = Some(component.parse()?);
                }
                Some('I') => {
                    if model.invariable_sites.is_some() {
                        return Err(duplicate("invariable sites"));
                    }
                    model.invariable_sites = Some(component.parse()?);
                }
                Some('G') | Some('R') => {
                    if model.rate_model.is_some() {
                        return Err(duplicate("rate heterogeneity"));
                    }
                    model.rate_model = Some(component.parse()?);
                }
                _ => {
                    return Err(IqTreeError::parse(
                        "model",
                        format!("{s:?} contains unexpected component {component:?}"),
                    ));
                }
            }
        }
        Ok(model)
    }
}
