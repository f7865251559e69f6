//! Python binding layer over the IQ-TREE boundary.
//!
//! Text arguments must be real sequences (list, tuple, ...) whose elements
//! are all `str`. A bare `str` is refused instead of being split into
//! characters; sets, dicts and generators are refused because their order is
//! not the caller's. Model strings are parsed and checked against the model
//! catalogue before the engine is entered. Numeric input
//! must be a one-dimensional float64 numpy array and is copied before the
//! engine sees it.
//!
//! Errors map as follows: conversion failures raise `TypeError`, rejected
//! arguments and parse failures raise `ValueError`, engine-reported errors
//! raise `IqTreeError` (a `RuntimeError` subclass) with the engine's message.
//!
//! All calls hold the GIL for their whole duration, which keeps engine calls
//! serialised.

use std::borrow::Cow;
use std::sync::OnceLock;

use numpy::{PyArray1, PyReadonlyArrayDyn, PyUntypedArrayMethods};
use pyo3::create_exception;
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PySequence, PyString};

use crate::alignment::Alignment;
use crate::engine::NativeEngine;
use crate::error::IqTreeError as BoundaryError;
use crate::iqtree::IqTree;
use crate::marshal::{collect_text, DoubleArray, TextElement};
use crate::model::Model;
use crate::options::{
    BuildTreeOptions, FitTreeOptions, IndelDistribution, ModelFinderOptions, RandomTreeOptions,
    SimulationOptions, TreeGenMode,
};
use crate::report::ModelFinderResult;

create_exception!(
    rust_python_iqtree,
    IqTreeError,
    PyRuntimeError,
    "Error reported by the IQ-TREE engine."
);

impl From<BoundaryError> for PyErr {
    fn from(err: BoundaryError) -> PyErr {
        let message = err.to_string();
        match err {
            BoundaryError::Conversion { .. } => PyTypeError::new_err(message),
            BoundaryError::InvalidArgument { .. } | BoundaryError::Parse { .. } => PyValueError::new_err(message),
            BoundaryError::Engine(_) => IqTreeError::new_err(message),
            BoundaryError::Io(_) => PyIOError::new_err(message),
        }
    }
}

impl TextElement for Bound<'_, PyAny> {
    fn as_text(&self) -> Result<Cow<'_, str>, String> {
        self.extract::<String>().map(Cow::Owned).map_err(|_| {
            self.get_type()
                .name()
                .map(|name| name.to_string())
                .unwrap_or_else(|_| "object".to_string())
        })
    }
}

fn iqtree() -> &'static IqTree<NativeEngine> {
    static IQTREE: OnceLock<IqTree<NativeEngine>> = OnceLock::new();
    IQTREE.get_or_init(IqTree::native)
}

/// Copy a Python sequence of `str` into owned Rust strings.
fn text_sequence(arg: &'static str, obj: &Bound<'_, PyAny>) -> PyResult<Vec<String>> {
    if obj.is_instance_of::<PyString>() {
        return Err(BoundaryError::conversion(arg, "expected a sequence of str, got a single str").into());
    }
    let seq = obj
        .cast::<PySequence>()
        .map_err(|_| BoundaryError::conversion(arg, "expected a sequence of str"))?;
    let items = seq.try_iter()?.collect::<PyResult<Vec<_>>>()?;
    Ok(collect_text(arg, &items)?)
}

fn parse_model(text: &str) -> PyResult<Model> {
    Ok(text.parse::<Model>()?)
}

fn model_finder_dict<'py>(py: Python<'py>, result: &ModelFinderResult) -> PyResult<Bound<'py, PyDict>> {
    let stats = PyDict::new(py);
    for (name, s) in &result.model_stats {
        stats.set_item(name, (s.lnl, s.nfp, s.tree_length))?;
    }
    let dict = PyDict::new(py);
    dict.set_item("best_model_AIC", result.best_aic.to_string())?;
    dict.set_item("best_model_AICc", result.best_aicc.to_string())?;
    dict.set_item("best_model_BIC", result.best_bic.to_string())?;
    dict.set_item("model_stats", stats)?;
    Ok(dict)
}

fn alignment_dict<'py>(py: Python<'py>, aln: &Alignment) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (name, seq) in aln.names().iter().zip(aln.seqs()) {
        dict.set_item(name, seq)?;
    }
    Ok(dict)
}

fn alignment(names: &Bound<'_, PyAny>, seqs: &Bound<'_, PyAny>) -> PyResult<Alignment> {
    Ok(Alignment::new(text_sequence("names", names)?, text_sequence("seqs", seqs)?)?)
}

/// Robinson-Foulds distance between two trees.
///
/// Args:
///     tree1: First tree in newick format
///     tree2: Second tree in newick format
///
/// Returns:
///     The RF distance as an int
///
/// Raises:
///     IqTreeError: If IQ-TREE cannot read either tree
#[pyfunction]
fn iq_robinson_fould(tree1: &str, tree2: &str) -> PyResult<i32> {
    Ok(iqtree().robinson_foulds(tree1, tree2)?)
}

/// Generate random trees.
///
/// Args:
///     num_taxa: Number of taxa
///     tree_gen_mode: One of YULE_HARDING, UNIFORM, CATERPILLAR, BALANCED, BIRTH_DEATH, STAR_TREE
///     num_trees: Number of trees to generate (default: 1)
///     rand_seed: Random seed, 0 for none (default: 0)
///
/// Returns:
///     The trees in newick format, one per line
///
/// Raises:
///     ValueError: If the mode is unknown
#[pyfunction]
#[pyo3(signature = (num_taxa, tree_gen_mode, num_trees=1, rand_seed=0))]
fn iq_random_tree(num_taxa: i32, tree_gen_mode: &str, num_trees: i32, rand_seed: i32) -> PyResult<String> {
    let mode: TreeGenMode = tree_gen_mode.parse()?;
    Ok(iqtree().random_tree(num_taxa, mode, &RandomTreeOptions { num_trees, rand_seed })?)
}

/// Infer a maximum-likelihood tree.
///
/// Args:
///     names: Sequence names
///     seqs: Aligned sequences, in the same order as `names`
///     model: Substitution model (default: "HKY")
///     rand_seed: Random seed, 0 for none (default: 0)
///     bootstrap_rep: Ultrafast bootstrap replicates, 0 to disable (default: 0)
///     num_thres: Threads, 0 for automatic (default: 1)
///
/// Returns:
///     IQ-TREE's YAML report; the tree is under PhyloTree.newick
///
/// Raises:
///     TypeError: If `names` or `seqs` is not a sequence of str
///     ValueError: If the model is not a known IQ-TREE model
///     IqTreeError: If IQ-TREE fails
#[pyfunction]
#[pyo3(signature = (names, seqs, model="HKY", rand_seed=0, bootstrap_rep=0, num_thres=1))]
fn iq_build_tree(
    names: &Bound<'_, PyAny>,
    seqs: &Bound<'_, PyAny>,
    model: &str,
    rand_seed: i32,
    bootstrap_rep: i32,
    num_thres: i32,
) -> PyResult<String> {
    let aln = alignment(names, seqs)?;
    let model = parse_model(model)?;
    let opts = BuildTreeOptions { rand_seed, bootstrap_replicates: bootstrap_rep, num_threads: num_thres };
    Ok(iqtree().build_tree(&aln, &model, &opts)?)
}

/// Fit a model on a fixed tree topology.
///
/// Args:
///     names: Sequence names
///     seqs: Aligned sequences
///     model: Substitution model
///     intree: Tree in newick format
///     blfix: Keep the branch lengths of `intree` (default: False)
///     rand_seed: Random seed, 0 for none (default: 0)
///     num_thres: Threads (default: 1)
///
/// Returns:
///     IQ-TREE's YAML report as a string
#[pyfunction]
#[pyo3(signature = (names, seqs, model, intree, blfix=false, rand_seed=0, num_thres=1))]
fn iq_fit_tree(
    names: &Bound<'_, PyAny>,
    seqs: &Bound<'_, PyAny>,
    model: &str,
    intree: &str,
    blfix: bool,
    rand_seed: i32,
    num_thres: i32,
) -> PyResult<String> {
    let aln = alignment(names, seqs)?;
    let model = parse_model(model)?;
    let opts = FitTreeOptions { branch_lengths_fixed: blfix, rand_seed, num_threads: num_thres };
    Ok(iqtree().fit_tree(&aln, intree, &model, &opts)?)
}

/// Select the best substitution model with ModelFinder.
///
/// Args:
///     names: Sequence names
///     seqs: Aligned sequences
///     rand_seed: Random seed, 0 for none (default: 0)
///     model_set: Comma-separated candidate models, empty for all (default: "")
///     freq_set: Comma-separated frequency types (default: "")
///     rate_set: Comma-separated rate models (default: "")
///     num_thres: Threads (default: 1)
///
/// Returns:
///     A dict with keys best_model_AIC, best_model_AICc, best_model_BIC
///     (model strings) and model_stats, mapping every model tried to a
///     (lnL, nfp, tree_length) tuple
#[pyfunction]
#[pyo3(signature = (names, seqs, rand_seed=0, model_set="", freq_set="", rate_set="", num_thres=1))]
#[allow(clippy::too_many_arguments)]
fn iq_model_finder<'py>(
    py: Python<'py>,
    names: &Bound<'py, PyAny>,
    seqs: &Bound<'py, PyAny>,
    rand_seed: i32,
    model_set: &str,
    freq_set: &str,
    rate_set: &str,
    num_thres: i32,
) -> PyResult<Bound<'py, PyDict>> {
    let aln = alignment(names, seqs)?;
    let split = |s: &str| -> Vec<String> {
        s.split(',').map(str::trim).filter(|p| !p.is_empty()).map(String::from).collect()
    };
    let opts = ModelFinderOptions {
        model_set: split(model_set),
        freq_set: split(freq_set),
        rate_set: split(rate_set),
        rand_seed,
        num_threads: num_thres,
    };
    model_finder_dict(py, &iqtree().model_finder(&aln, &opts)?)
}

/// Jukes-Cantor distance matrix.
///
/// Args:
///     names: Sequence names
///     seqs: Aligned sequences
///     num_thres: Threads, 0 for automatic (default: 0)
///
/// Returns:
///     A flat float64 numpy array of length len(names)**2, row-major
#[pyfunction]
#[pyo3(signature = (names, seqs, num_thres=0))]
fn iq_jc_distances<'py>(
    py: Python<'py>,
    names: &Bound<'py, PyAny>,
    seqs: &Bound<'py, PyAny>,
    num_thres: i32,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let aln = alignment(names, seqs)?;
    let matrix = iqtree().distance_matrix(&aln, num_thres)?;
    Ok(PyArray1::from_vec(py, matrix.values))
}

/// Neighbour-joining tree.
///
/// Args:
///     names: Taxon labels
///     distances: Flat float64 numpy array of length len(names)**2
///
/// Returns:
///     The tree in newick format
///
/// Raises:
///     TypeError: If `distances` is not one-dimensional float64
///     ValueError: If its length does not match `names` or it holds NaN
#[pyfunction]
fn iq_nj_tree(names: &Bound<'_, PyAny>, distances: PyReadonlyArrayDyn<'_, f64>) -> PyResult<String> {
    let labels = text_sequence("names", names)?;
    let copy = DoubleArray::from_shaped("distances", distances.shape(), distances.as_array().iter().copied())?;
    Ok(iqtree().nj_tree(&labels, copy.as_slice())?)
}

/// Consensus of a set of trees.
///
/// Args:
///     trees: Trees in newick format, all over the same taxa
///     minsup: Minimum split support in [0, 1] (default: 0.5)
///
/// Returns:
///     The consensus tree in newick format
#[pyfunction]
#[pyo3(signature = (trees, minsup=0.5))]
fn iq_consensus_tree(trees: &Bound<'_, PyAny>, minsup: f64) -> PyResult<String> {
    let trees = text_sequence("trees", trees)?;
    Ok(iqtree().consensus_tree(&trees, minsup)?)
}

/// Simulate an alignment along a tree with AliSim.
///
/// Args:
///     tree: Tree in newick format
///     subst_model: Substitution model
///     seed: Random seed, 0 for none (default: 0)
///     partition_info: Partition definition (default: "")
///     partition_type: Partition type (default: "")
///     seq_length: Sites before indels (default: 1000)
///     insertion_rate: Relative insertion rate (default: 0.0)
///     deletion_rate: Relative deletion rate (default: 0.0)
///     root_seq: Sequence at the root (default: "")
///     num_threads: Threads (default: 1)
///     insertion_size_distribution: IQ-TREE indel size spec (default: "POW{1.7/100}")
///     deletion_size_distribution: IQ-TREE indel size spec (default: "POW{1.7/100}")
///
/// Returns:
///     A dict mapping each taxon name to its simulated sequence
///
/// Raises:
///     ValueError: If the model is unknown or cannot be simulated
#[pyfunction]
#[pyo3(signature = (
    tree,
    subst_model,
    seed=0,
    partition_info="",
    partition_type="",
    seq_length=1000,
    insertion_rate=0.0,
    deletion_rate=0.0,
    root_seq="",
    num_threads=1,
    insertion_size_distribution=None,
    deletion_size_distribution=None,
))]
#[allow(clippy::too_many_arguments)]
fn iq_simulate_alignment<'py>(
    py: Python<'py>,
    tree: &str,
    subst_model: &str,
    seed: i32,
    partition_info: &str,
    partition_type: &str,
    seq_length: i32,
    insertion_rate: f64,
    deletion_rate: f64,
    root_seq: &str,
    num_threads: i32,
    insertion_size_distribution: Option<&str>,
    deletion_size_distribution: Option<&str>,
) -> PyResult<Bound<'py, PyDict>> {
    let subst_model = parse_model(subst_model)?;
    let opts = SimulationOptions {
        length: seq_length,
        rand_seed: seed,
        insertion_rate,
        deletion_rate,
        insertion_size_distribution: parse_distribution(insertion_size_distribution)?,
        deletion_size_distribution: parse_distribution(deletion_size_distribution)?,
        root_seq: (!root_seq.is_empty()).then(|| root_seq.to_string()),
        partition_info: partition_info.to_string(),
        partition_type: partition_type.to_string(),
        num_threads,
    };
    alignment_dict(py, &iqtree().simulate_alignment(tree, &subst_model, &opts)?)
}

fn parse_distribution(spec: Option<&str>) -> PyResult<IndelDistribution> {
    Ok(spec.map(str::parse).transpose()?.unwrap_or_default())
}

/// Python module definition
#[pymodule]
fn rust_python_iqtree(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("IqTreeError", m.py().get_type::<IqTreeError>())?;
    m.add("__iqtree_version__", iqtree().version()?)?;
    m.add_function(wrap_pyfunction!(iq_robinson_fould, m)?)?;
    m.add_function(wrap_pyfunction!(iq_random_tree, m)?)?;
    m.add_function(wrap_pyfunction!(iq_build_tree, m)?)?;
    m.add_function(wrap_pyfunction!(iq_fit_tree, m)?)?;
    m.add_function(wrap_pyfunction!(iq_model_finder, m)?)?;
    m.add_function(wrap_pyfunction!(iq_jc_distances, m)?)?;
    m.add_function(wrap_pyfunction!(iq_nj_tree, m)?)?;
    m.add_function(wrap_pyfunction!(iq_consensus_tree, m)?)?;
    m.add_function(wrap_pyfunction!(iq_simulate_alignment, m)?)?;
    Ok(())
}
