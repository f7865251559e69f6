//! Per-operation settings and their defaults.
//!
//! Defaults follow what IQ-TREE itself assumes when an argument is left out:
//! seed 0 means "no fixed seed", one thread, no bootstrap.

use std::fmt;
use std::str::FromStr;

use crate::error::{IqTreeError, Result};

/// How `random_tree` shapes the generated topology.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TreeGenMode {
    YuleHarding,
    Uniform,
    Caterpillar,
    Balanced,
    BirthDeath,
    StarTree,
}

impl TreeGenMode {
    pub const ALL: [TreeGenMode; 6] = [
        TreeGenMode::YuleHarding,
        TreeGenMode::Uniform,
        TreeGenMode::Caterpillar,
        TreeGenMode::Balanced,
        TreeGenMode::BirthDeath,
        TreeGenMode::StarTree,
    ];

    /// Name understood by the engine.
    pub fn as_str(self) -> &'static str {
        match self {
            TreeGenMode::YuleHarding => "YULE_HARDING",
            TreeGenMode::Uniform => "UNIFORM",
            TreeGenMode::Caterpillar => "CATERPILLAR",
            TreeGenMode::Balanced => "BALANCED",
            TreeGenMode::BirthDeath => "BIRTH_DEATH",
            TreeGenMode::StarTree => "STAR_TREE",
        }
    }
}

impl fmt::Display for TreeGenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TreeGenMode {
    type Err = IqTreeError;

    fn from_str(s: &str) -> Result<Self> {
        TreeGenMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                IqTreeError::invalid(
                    "tree_gen_mode",
                    format!("unknown mode {s:?}, expected one of YULE_HARDING, UNIFORM, CATERPILLAR, BALANCED, BIRTH_DEATH, STAR_TREE"),
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RandomTreeOptions {
    pub num_trees: i32,
    pub rand_seed: i32,
}

impl Default for RandomTreeOptions {
    fn default() -> Self {
        RandomTreeOptions { num_trees: 1, rand_seed: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildTreeOptions {
    pub rand_seed: i32,
    /// 0 disables bootstrapping; IQ-TREE needs at least 1000 otherwise.
    pub bootstrap_replicates: i32,
    /// 0 lets IQ-TREE pick the thread count.
    pub num_threads: i32,
}

impl Default for BuildTreeOptions {
    fn default() -> Self {
        BuildTreeOptions { rand_seed: 0, bootstrap_replicates: 0, num_threads: 1 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitTreeOptions {
    /// Keep the supplied branch lengths and only evaluate the likelihood.
    pub branch_lengths_fixed: bool,
    pub rand_seed: i32,
    pub num_threads: i32,
}

impl Default for FitTreeOptions {
    fn default() -> Self {
        FitTreeOptions { branch_lengths_fixed: false, rand_seed: 0, num_threads: 1 }
    }
}

/// Search space for ModelFinder. Empty sets leave the choice to IQ-TREE.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFinderOptions {
    pub model_set: Vec<String>,
    pub freq_set: Vec<String>,
    pub rate_set: Vec<String>,
    pub rand_seed: i32,
    pub num_threads: i32,
}

impl Default for ModelFinderOptions {
    fn default() -> Self {
        ModelFinderOptions {
            model_set: Vec::new(),
            freq_set: Vec::new(),
            rate_set: Vec::new(),
            rand_seed: 0,
            num_threads: 1,
        }
    }
}

/// Size distribution of insertion or deletion events.
#[derive(Debug, Clone, PartialEq)]
pub enum IndelDistribution {
    Zipfian { exponent: f64, max_size: u32 },
    Geometric { mean: f64 },
    NegativeBinomial { mean: f64, variance: f64 },
    Lavalette { a: f64, max_size: u32 },
}

impl Default for IndelDistribution {
    fn default() -> Self {
        IndelDistribution::Zipfian { exponent: 1.7, max_size: 100 }
    }
}

impl fmt::Display for IndelDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndelDistribution::Zipfian { exponent, max_size } => write!(f, "POW{{{exponent}/{max_size}}}"),
            IndelDistribution::Geometric { mean } => write!(f, "GEO{{{mean}}}"),
            IndelDistribution::NegativeBinomial { mean, variance } => write!(f, "NB{{{mean}/{variance}}}"),
            IndelDistribution::Lavalette { a, max_size } => write!(f, "LAV{{{a}/{max_size}}}"),
        }
    }
}

impl FromStr for IndelDistribution {
    type Err = IqTreeError;

    /// Parse `POW{a/max}`, `GEO{mean}`, `NB{mean/variance}` or `LAV{a/max}`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || IqTreeError::parse("indel size distribution", format!("{s:?}"));
        let (kind, rest) = s.trim().split_once('{').ok_or_else(bad)?;
        let params: Vec<&str> = rest.strip_suffix('}').ok_or_else(bad)?.split('/').map(str::trim).collect();
        let float = |idx: usize| params.get(idx).and_then(|p| p.parse::<f64>().ok()).ok_or_else(bad);
        let size = |idx: usize| params.get(idx).and_then(|p| p.parse::<u32>().ok()).ok_or_else(bad);
        let dist = match (kind.to_ascii_uppercase().as_str(), params.len()) {
            ("POW", 2) => IndelDistribution::Zipfian { exponent: float(0)?, max_size: size(1)? },
            ("GEO", 1) => IndelDistribution::Geometric { mean: float(0)? },
            ("NB", 2) => IndelDistribution::NegativeBinomial { mean: float(0)?, variance: float(1)? },
            ("LAV", 2) => IndelDistribution::Lavalette { a: float(0)?, max_size: size(1)? },
            _ => return Err(bad()),
        };
        Ok(dist)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOptions {
    /// Sites before indels; insertions can make the result longer.
    pub length: i32,
    pub rand_seed: i32,
    /// Relative to the substitution rate.
    pub insertion_rate: f64,
    pub deletion_rate: f64,
    pub insertion_size_distribution: IndelDistribution,
    pub deletion_size_distribution: IndelDistribution,
    pub root_seq: Option<String>,
    pub partition_info: String,
    pub partition_type: String,
    pub num_threads: i32,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        SimulationOptions {
            length: 1000,
            rand_seed: 0,
            insertion_rate: 0.0,
            deletion_rate: 0.0,
            insertion_size_distribution: IndelDistribution::default(),
            deletion_size_distribution: IndelDistribution::default(),
            root_seq: None,
            partition_info: String::new(),
            partition_type: String::new(),
            num_threads: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_gen_mode_names_round_trip() {
        for mode in TreeGenMode::ALL {
            assert_eq!(mode.as_str().parse::<TreeGenMode>().unwrap(), mode);
        }
        assert_eq!("birth_death".parse::<TreeGenMode>().unwrap(), TreeGenMode::BirthDeath);
    }

    #[test]
    fn unknown_tree_gen_mode_is_rejected() {
        let err = "RANDOM".parse::<TreeGenMode>().unwrap_err();
        assert!(matches!(err, IqTreeError::InvalidArgument { arg: "tree_gen_mode", .. }));
    }

    #[test]
    fn indel_distributions_render_iqtree_syntax() {
        assert_eq!(IndelDistribution::default().to_string(), "POW{1.7/100}");
        assert_eq!(IndelDistribution::Geometric { mean: 2.5 }.to_string(), "GEO{2.5}");
        assert_eq!(
            IndelDistribution::NegativeBinomial { mean: 3.0, variance: 1.5 }.to_string(),
            "NB{3/1.5}"
        );
        assert_eq!(IndelDistribution::Lavalette { a: 1.5, max_size: 50 }.to_string(), "LAV{1.5/50}");
    }

    #[test]
    fn indel_distributions_parse_back() {
        let geo: IndelDistribution = "GEO{2.5}".parse().unwrap();
        assert_eq!(geo, IndelDistribution::Geometric { mean: 2.5 });
        let pow: IndelDistribution = "pow{1.7/100}".parse().unwrap();
        assert_eq!(pow, IndelDistribution::default());
        assert!("GEO{2.5/3}".parse::<IndelDistribution>().is_err());
        assert!("ZIPF{1.7}".parse::<IndelDistribution>().is_err());
        assert!("NB{3".parse::<IndelDistribution>().is_err());
    }

    #[test]
    fn defaults_match_engine_defaults() {
        let build = BuildTreeOptions::default();
        assert_eq!((build.rand_seed, build.bootstrap_replicates, build.num_threads), (0, 0, 1));
        let sim = SimulationOptions::default();
        assert_eq!(sim.length, 1000);
        assert!(sim.root_seq.is_none());
    }
}
