//! The seam between the marshaller and whatever computes the answers.
//!
//! [`Engine`] has one method per native entry point. Arguments arrive already
//! marshalled (owned C strings, [`StringArray`], [`DoubleArray`]) and results
//! leave as raw envelopes that still hold engine-owned pointers; turning
//! those into Rust values is [`crate::marshal`]'s job.
//!
//! [`NativeEngine`] forwards to the linked IQ-TREE 2 library. Tests use an
//! allocation-tracking double instead.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use crate::ffi;
use crate::marshal::{DoubleArray, MarshalledAlignment, StringArray};

/// Marshalled arguments of an alignment simulation.
#[derive(Debug, Clone)]
pub struct SimulationArgs {
    pub tree: CString,
    pub model: CString,
    pub rand_seed: c_int,
    pub partition_info: CString,
    pub partition_type: CString,
    pub length: c_int,
    pub insertion_rate: f64,
    pub deletion_rate: f64,
    pub root_seq: CString,
    pub num_threads: c_int,
    pub insertion_size_distribution: CString,
    pub deletion_size_distribution: CString,
}

/// One native entry point per method.
///
/// Implementations make no thread-safety promise; calls are expected to be
/// serialised by the caller.
pub trait Engine {
    fn robinson_fould(&self, tree1: &CStr, tree2: &CStr) -> ffi::IntegerResult;

    fn random_tree(&self, num_taxa: c_int, mode: &CStr, num_trees: c_int, rand_seed: c_int) -> ffi::StringResult;

    fn build_tree(
        &self,
        aln: &MarshalledAlignment,
        model: &CStr,
        rand_seed: c_int,
        bootstrap_replicates: c_int,
        num_threads: c_int,
    ) -> ffi::StringResult;

    fn fit_tree(
        &self,
        aln: &MarshalledAlignment,
        model: &CStr,
        tree: &CStr,
        branch_lengths_fixed: bool,
        rand_seed: c_int,
        num_threads: c_int,
    ) -> ffi::StringResult;

    fn model_finder(
        &self,
        aln: &MarshalledAlignment,
        rand_seed: c_int,
        model_set: &CStr,
        freq_set: &CStr,
        rate_set: &CStr,
        num_threads: c_int,
    ) -> ffi::StringResult;

    fn distance_matrix(&self, aln: &MarshalledAlignment, num_threads: c_int) -> ffi::DoubleArrayResult;

    /// `distances` is mutable because the engine receives a writable pointer.
    fn nj_tree(&self, labels: &StringArray, distances: &mut DoubleArray) -> ffi::StringResult;

    fn consensus_tree(&self, trees: &StringArray, min_support: f64) -> ffi::StringResult;

    fn simulate_alignment(&self, args: &SimulationArgs) -> ffi::StringResult;

    fn version(&self) -> ffi::StringResult;

    /// Release a string the engine allocated.
    ///
    /// # Safety
    /// `ptr` must come from an envelope returned by this engine and must not
    /// have been released before.
    unsafe fn free_string(&self, ptr: *mut c_char);

    /// Release a double buffer the engine allocated.
    ///
    /// # Safety
    /// Same contract as [`Engine::free_string`].
    unsafe fn free_doubles(&self, ptr: *mut f64);
}

/// The linked IQ-TREE 2 library.
#[cfg(feature = "iqtree")]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

// SAFETY (all calls below): every pointer handed over borrows a buffer that
// outlives the call, strings are NUL-terminated, and array views carry their
// true lengths. The engine does not retain any of them after returning.
#[cfg(feature = "iqtree")]
impl Engine for NativeEngine {
    fn robinson_fould(&self, tree1: &CStr, tree2: &CStr) -> ffi::IntegerResult {
        unsafe { ffi::robinson_fould(tree1.as_ptr(), tree2.as_ptr()) }
    }

    fn random_tree(&self, num_taxa: c_int, mode: &CStr, num_trees: c_int, rand_seed: c_int) -> ffi::StringResult {
        unsafe { ffi::random_tree(num_taxa, mode.as_ptr(), num_trees, rand_seed) }
    }

    fn build_tree(
        &self,
        aln: &MarshalledAlignment,
        model: &CStr,
        rand_seed: c_int,
        bootstrap_replicates: c_int,
        num_threads: c_int,
    ) -> ffi::StringResult {
        let mut names = aln.names.as_ffi();
        let mut seqs = aln.seqs.as_ffi();
        unsafe {
            ffi::build_tree(
                &mut names,
                &mut seqs,
                model.as_ptr(),
                rand_seed,
                bootstrap_replicates,
                num_threads,
            )
        }
    }

    fn fit_tree(
        &self,
        aln: &MarshalledAlignment,
        model: &CStr,
        tree: &CStr,
        branch_lengths_fixed: bool,
        rand_seed: c_int,
        num_threads: c_int,
    ) -> ffi::StringResult {
        let mut names = aln.names.as_ffi();
        let mut seqs = aln.seqs.as_ffi();
        unsafe {
            ffi::fit_tree(
                &mut names,
                &mut seqs,
                model.as_ptr(),
                tree.as_ptr(),
                c_int::from(branch_lengths_fixed),
                rand_seed,
                num_threads,
            )
        }
    }

    fn model_finder(
        &self,
        aln: &MarshalledAlignment,
        rand_seed: c_int,
        model_set: &CStr,
        freq_set: &CStr,
        rate_set: &CStr,
        num_threads: c_int,
    ) -> ffi::StringResult {
        let mut names = aln.names.as_ffi();
        let mut seqs = aln.seqs.as_ffi();
        unsafe {
            ffi::modelfinder(
                &mut names,
                &mut seqs,
                rand_seed,
                model_set.as_ptr(),
                freq_set.as_ptr(),
                rate_set.as_ptr(),
                num_threads,
            )
        }
    }

    fn distance_matrix(&self, aln: &MarshalledAlignment, num_threads: c_int) -> ffi::DoubleArrayResult {
        let mut names = aln.names.as_ffi();
        let mut seqs = aln.seqs.as_ffi();
        unsafe { ffi::build_distmatrix(&mut names, &mut seqs, num_threads) }
    }

    fn nj_tree(&self, labels: &StringArray, distances: &mut DoubleArray) -> ffi::StringResult {
        let mut names = labels.as_ffi();
        let mut dists = distances.as_ffi();
        unsafe { ffi::build_njtree(&mut names, &mut dists) }
    }

    fn consensus_tree(&self, trees: &StringArray, min_support: f64) -> ffi::StringResult {
        let mut trees = trees.as_ffi();
        unsafe { ffi::consensus_tree(&mut trees, min_support) }
    }

    fn simulate_alignment(&self, args: &SimulationArgs) -> ffi::StringResult {
        unsafe {
            ffi::simulate_alignment(
                args.tree.as_ptr(),
                args.model.as_ptr(),
                args.rand_seed,
                args.partition_info.as_ptr(),
                args.partition_type.as_ptr(),
                args.length,
                args.insertion_rate,
                args.deletion_rate,
                args.root_seq.as_ptr(),
                args.num_threads,
                args.insertion_size_distribution.as_ptr(),
                args.deletion_size_distribution.as_ptr(),
            )
        }
    }

    fn version(&self) -> ffi::StringResult {
        unsafe { ffi::version() }
    }

    unsafe fn free_string(&self, ptr: *mut c_char) {
        unsafe { ffi::free_string(ptr) }
    }

    unsafe fn free_doubles(&self, ptr: *mut f64) {
        unsafe { ffi::free_double_array(ptr) }
    }
}
