//! Typed entry points over an [`Engine`].
//!
//! # Overview
//! Each method follows the same three steps:
//! 1. check what can be checked cheaply on this side (argument shapes,
//!    ranges, taxa sets),
//! 2. marshal the arguments into owned C buffers,
//! 3. call the engine and convert the result envelope with
//!    [`crate::marshal`], which raises the engine's error string if any.
//!
//! Calls that make IQ-TREE write report files run inside a [`ScratchDir`]
//! unless file isolation is turned off. Every call runs with the engine's
//! console output silenced ([`QuietOutput`]) unless that is turned off too.
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "iqtree")]
//! # fn demo() -> rust_python_iqtree::Result<()> {
//! use rust_python_iqtree::IqTree;
//!
//! let iq = IqTree::native();
//! let rf = iq.robinson_foulds("(a,b,(c,(d,e)));", "(a,b,(e,(d,c)));")?;
//! println!("IQ-TREE {} says RF = {rf}", iq.version()?);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::OnceLock;

use itertools::Itertools;
use tracing::debug;

use crate::alignment::Alignment;
use crate::engine::{Engine, SimulationArgs};
use crate::error::{IqTreeError, Result};
use crate::io::tree_taxa;
use crate::marshal::{self, c_string, DoubleArray, MarshalledAlignment, StringArray};
use crate::model::Model;
use crate::options::{
    BuildTreeOptions, FitTreeOptions, ModelFinderOptions, RandomTreeOptions, SimulationOptions, TreeGenMode,
};
use crate::quiet::QuietOutput;
use crate::report::{parse_simulated_alignment, ModelFinderResult};
use crate::scratch::ScratchDir;

/// Pairwise distances between the sequences of an alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    pub names: Vec<String>,
    /// Row-major, `names.len()` squared entries.
    pub values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        (i < self.len() && j < self.len()).then(|| self.values[i * self.len() + j])
    }

    /// Square form, for writing out as a table.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        if self.is_empty() {
            return Vec::new();
        }
        self.values.chunks(self.len()).map(<[f64]>::to_vec).collect()
    }

    /// Labelled TSV, gzip-compressed when `path` ends in `.gz`.
    pub fn write_tsv<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        crate::io::write_matrix_tsv(path, &self.names, &self.rows())
    }
}

pub struct IqTree<E: Engine> {
    engine: E,
    isolate_files: bool,
    silence_output: bool,
    version: OnceLock<String>,
}

#[cfg(feature = "iqtree")]
impl IqTree<crate::engine::NativeEngine> {
    /// Facade over the linked IQ-TREE library.
    pub fn native() -> Self {
        IqTree::new(crate::engine::NativeEngine)
    }
}

impl<E: Engine> IqTree<E> {
    pub fn new(engine: E) -> Self {
        IqTree { engine, isolate_files: true, silence_output: true, version: OnceLock::new() }
    }

    /// Run file-writing calls in a throwaway directory (on by default).
    pub fn with_file_isolation(mut self, isolate: bool) -> Self {
        self.isolate_files = isolate;
        self
    }

    /// Point stdout and stderr at the null device during engine calls (on
    /// by default).
    pub fn with_output_suppressed(mut self, suppress: bool) -> Self {
        self.silence_output = suppress;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn quiet<T>(&self, call: impl FnOnce() -> Result<T>) -> Result<T> {
        let _quiet = self.silence_output.then(QuietOutput::enter).transpose()?;
        call()
    }

    fn isolated<T>(&self, label: &str, call: impl FnOnce() -> Result<T>) -> Result<T> {
        self.quiet(|| {
            let _scratch = self.isolate_files.then(|| ScratchDir::enter(label)).transpose()?;
            call()
        })
    }

    /// Robinson-Foulds distance between two newick trees.
    pub fn robinson_foulds(&self, tree1: &str, tree2: &str) -> Result<i32> {
        debug!("robinson_fould");
        let t1 = c_string("tree1", tree1)?;
        let t2 = c_string("tree2", tree2)?;
        self.quiet(|| marshal::take_integer(&self.engine, self.engine.robinson_fould(&t1, &t2)))
    }

    /// Symmetric RF matrix over a set of trees, one engine call per pair.
    pub fn pairwise_robinson_foulds<S: AsRef<str>>(&self, trees: &[S]) -> Result<Vec<Vec<i32>>> {
        let n = trees.len();
        debug!(trees = n, pairs = n * n.saturating_sub(1) / 2, "pairwise robinson_fould");
        let mut matrix = vec![vec![0; n]; n];
        for (i, j) in (0..n).tuple_combinations() {
            let d = self.robinson_foulds(trees[i].as_ref(), trees[j].as_ref())?;
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
        Ok(matrix)
    }

    /// Random tree(s) as newick text, one per line.
    pub fn random_tree(&self, num_taxa: i32, mode: TreeGenMode, opts: &RandomTreeOptions) -> Result<String> {
        debug!(num_taxa, %mode, num_trees = opts.num_trees, "random_tree");
        if opts.num_trees < 1 {
            return Err(IqTreeError::invalid("num_trees", format!("must be at least 1, got {}", opts.num_trees)));
        }
        let mode = c_string("tree_gen_mode", mode.as_str())?;
        self.quiet(|| {
            marshal::take_string(
                &self.engine,
                self.engine.random_tree(num_taxa, &mode, opts.num_trees, opts.rand_seed),
            )
        })
    }

    /// Maximum-likelihood tree search. Returns the engine's YAML report; the
    /// best tree sits under `PhyloTree.newick`.
    pub fn build_tree(&self, aln: &Alignment, model: &Model, opts: &BuildTreeOptions) -> Result<String> {
        debug!(taxa = aln.len(), %model, bootstrap = opts.bootstrap_replicates, "build_tree");
        let marshalled = MarshalledAlignment::new(aln)?;
        let model = c_string("model", &model.to_string())?;
        self.isolated("build_tree", || {
            marshal::take_string(
                &self.engine,
                self.engine.build_tree(
                    &marshalled,
                    &model,
                    opts.rand_seed,
                    opts.bootstrap_replicates,
                    opts.num_threads,
                ),
            )
        })
    }

    /// Fit `model` on a fixed topology. Returns the engine's YAML report.
    pub fn fit_tree(&self, aln: &Alignment, tree: &str, model: &Model, opts: &FitTreeOptions) -> Result<String> {
        debug!(taxa = aln.len(), %model, fixed = opts.branch_lengths_fixed, "fit_tree");
        let marshalled = MarshalledAlignment::new(aln)?;
        let model = c_string("model", &model.to_string())?;
        let tree = c_string("tree", tree)?;
        self.isolated("fit_tree", || {
            marshal::take_string(
                &self.engine,
                self.engine.fit_tree(
                    &marshalled,
                    &model,
                    &tree,
                    opts.branch_lengths_fixed,
                    opts.rand_seed,
                    opts.num_threads,
                ),
            )
        })
    }

    /// Run ModelFinder and parse what it selected.
    pub fn model_finder(&self, aln: &Alignment, opts: &ModelFinderOptions) -> Result<ModelFinderResult> {
        debug!(taxa = aln.len(), "modelfinder");
        let marshalled = MarshalledAlignment::new(aln)?;
        let model_set = c_string("model_set", &opts.model_set.iter().join(","))?;
        let freq_set = c_string("freq_set", &opts.freq_set.iter().join(","))?;
        let rate_set = c_string("rate_set", &opts.rate_set.iter().join(","))?;
        let report = self.isolated("modelfinder", || {
            marshal::take_string(
                &self.engine,
                self.engine.model_finder(
                    &marshalled,
                    opts.rand_seed,
                    &model_set,
                    &freq_set,
                    &rate_set,
                    opts.num_threads,
                ),
            )
        })?;
        ModelFinderResult::from_yaml(&report)
    }

    /// Jukes-Cantor distances between every pair of sequences.
    pub fn distance_matrix(&self, aln: &Alignment, num_threads: i32) -> Result<DistanceMatrix> {
        debug!(taxa = aln.len(), "build_distmatrix");
        let marshalled = MarshalledAlignment::new(aln)?;
        let values = self.isolated("distmatrix", || {
            marshal::take_doubles(&self.engine, self.engine.distance_matrix(&marshalled, num_threads))
        })?;
        if values.len() != aln.len() * aln.len() {
            return Err(IqTreeError::parse(
                "distance matrix",
                format!("expected {} entries for {} sequences, got {}", aln.len() * aln.len(), aln.len(), values.len()),
            ));
        }
        Ok(DistanceMatrix { names: aln.names().to_vec(), values })
    }

    /// Neighbour-joining tree from a flattened square distance matrix.
    ///
    /// The engine works on a copy; `distances` is never touched.
    pub fn nj_tree<S: AsRef<str>>(&self, labels: &[S], distances: &[f64]) -> Result<String> {
        debug!(taxa = labels.len(), "build_njtree");
        let n = labels.len();
        if distances.len() != n * n {
            return Err(IqTreeError::invalid(
                "distances",
                format!("{} labels need {} distances, got {}", n, n * n, distances.len()),
            ));
        }
        if let Some(idx) = distances.iter().position(|d| d.is_nan()) {
            return Err(IqTreeError::invalid("distances", format!("entry {idx} is NaN")));
        }
        let labels = StringArray::new("labels", labels.iter().map(|s| s.as_ref()))?;
        let mut distances = DoubleArray::new(distances);
        self.isolated("njtree", || marshal::take_string(&self.engine, self.engine.nj_tree(&labels, &mut distances)))
    }

    /// Majority-rule style consensus of trees over the same taxa.
    pub fn consensus_tree<S: AsRef<str>>(&self, trees: &[S], min_support: f64) -> Result<String> {
        debug!(trees = trees.len(), min_support, "consensus_tree");
        if !(0.0..=1.0).contains(&min_support) {
            return Err(IqTreeError::invalid("min_support", format!("must lie in [0, 1], got {min_support}")));
        }
        let Some(first) = trees.first() else {
            return Err(IqTreeError::invalid("trees", "at least one tree is required"));
        };
        let taxa: BTreeSet<String> = tree_taxa(first.as_ref())?;
        for (idx, tree) in trees.iter().enumerate().skip(1) {
            if tree_taxa(tree.as_ref())? != taxa {
                return Err(IqTreeError::invalid("trees", format!("tree {idx} has a different taxon set than tree 0")));
            }
        }
        let trees = StringArray::new("trees", trees.iter().map(|s| s.as_ref()))?;
        self.isolated("consensus", || {
            marshal::take_string(&self.engine, self.engine.consensus_tree(&trees, min_support))
        })
    }

    /// Simulate an alignment along `tree` with AliSim.
    pub fn simulate_alignment(&self, tree: &str, model: &Model, opts: &SimulationOptions) -> Result<Alignment> {
        debug!(%model, length = opts.length, "simulate_alignment");
        if !model.is_simulation_supported() {
            return Err(IqTreeError::invalid(
                "model",
                format!("{} is not supported for alignment simulation", model.submodel),
            ));
        }
        if opts.length < 1 {
            return Err(IqTreeError::invalid("length", format!("must be positive, got {}", opts.length)));
        }
        if opts.insertion_rate < 0.0 || opts.deletion_rate < 0.0 {
            return Err(IqTreeError::invalid("indel rates", "must not be negative"));
        }
        let args = SimulationArgs {
            tree: c_string("tree", tree)?,
            model: c_string("model", &model.to_string())?,
            rand_seed: opts.rand_seed,
            partition_info: c_string("partition_info", &opts.partition_info)?,
            partition_type: c_string("partition_type", &opts.partition_type)?,
            length: opts.length,
            insertion_rate: opts.insertion_rate,
            deletion_rate: opts.deletion_rate,
            root_seq: c_string("root_seq", opts.root_seq.as_deref().unwrap_or_default())?,
            num_threads: opts.num_threads,
            insertion_size_distribution: c_string(
                "insertion_size_distribution",
                &opts.insertion_size_distribution.to_string(),
            )?,
            deletion_size_distribution: c_string(
                "deletion_size_distribution",
                &opts.deletion_size_distribution.to_string(),
            )?,
        };
        let report =
            self.isolated("alisim", || marshal::take_string(&self.engine, self.engine.simulate_alignment(&args)))?;
        parse_simulated_alignment(&report)
    }

    /// Engine version, fetched once and cached.
    pub fn version(&self) -> Result<&str> {
        if let Some(version) = self.version.get() {
            return Ok(version);
        }
        let fetched = self.quiet(|| marshal::take_string(&self.engine, self.engine.version()))?;
        debug!(version = %fetched, "fetched engine version");
        Ok(self.version.get_or_init(|| fetched))
    }
}
