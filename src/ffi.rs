//! Raw C-ABI view of the IQ-TREE 2 library.
//!
//! The structs mirror the library's `StringArray`, `DoubleArray` and result
//! envelopes field for field. Nothing here owns memory: argument views borrow
//! from [`crate::marshal`] buffers, and envelope pointers belong to the native
//! allocator until released through [`free_string`] / [`free_double_array`].
//!
//! Using the functions in this module is `unsafe`; go through
//! [`crate::engine::NativeEngine`] instead.

use std::os::raw::{c_char, c_int};

/// Borrowed array of NUL-terminated strings passed into the engine.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StringArray {
    pub strings: *const *const c_char,
    pub length: usize,
}

/// Contiguous doubles, used both as argument view and as result payload.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DoubleArray {
    pub doubles: *mut f64,
    pub length: usize,
}

/// Integer payload with optional error string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IntegerResult {
    pub value: c_int,
    pub error_str: *mut c_char,
}

/// String payload with optional error string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StringResult {
    pub value: *mut c_char,
    pub error_str: *mut c_char,
}

/// Double-array payload with optional error string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DoubleArrayResult {
    pub value: DoubleArray,
    pub error_str: *mut c_char,
}

#[cfg(feature = "iqtree")]
unsafe extern "C" {
    pub fn robinson_fould(ctree1: *const c_char, ctree2: *const c_char) -> IntegerResult;

    pub fn random_tree(
        num_taxa: c_int,
        tree_gen_mode: *const c_char,
        num_trees: c_int,
        rand_seed: c_int,
    ) -> StringResult;

    pub fn build_tree(
        names: *mut StringArray,
        seqs: *mut StringArray,
        model: *const c_char,
        rand_seed: c_int,
        bootstrap_rep: c_int,
        num_thres: c_int,
    ) -> StringResult;

    pub fn fit_tree(
        names: *mut StringArray,
        seqs: *mut StringArray,
        model: *const c_char,
        intree: *const c_char,
        blfix: c_int,
        rand_seed: c_int,
        num_thres: c_int,
    ) -> StringResult;

    pub fn modelfinder(
        names: *mut StringArray,
        seqs: *mut StringArray,
        rand_seed: c_int,
        model_set: *const c_char,
        freq_set: *const c_char,
        rate_set: *const c_char,
        num_thres: c_int,
    ) -> StringResult;

    pub fn build_distmatrix(
        names: *mut StringArray,
        seqs: *mut StringArray,
        num_thres: c_int,
    ) -> DoubleArrayResult;

    pub fn build_njtree(names: *mut StringArray, dists: *mut DoubleArray) -> StringResult;

    pub fn consensus_tree(trees: *mut StringArray, min_support: f64) -> StringResult;

    pub fn simulate_alignment(
        tree: *const c_char,
        subst_model: *const c_char,
        seed: c_int,
        partition_info: *const c_char,
        partition_type: *const c_char,
        seq_length: c_int,
        insertion_rate: f64,
        deletion_rate: f64,
        root_seq: *const c_char,
        num_threads: c_int,
        insertion_size_distribution: *const c_char,
        deletion_size_distribution: *const c_char,
    ) -> StringResult;

    pub fn version() -> StringResult;

    pub fn free_string(s: *mut c_char);

    pub fn free_double_array(d: *mut f64);
}
