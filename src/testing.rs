//! Allocation-tracking engine double for unit tests.
//!
//! Every buffer [`MockEngine`] hands out is recorded in a ledger keyed by
//! address; releasing an unknown address counts as a double free instead of
//! touching memory. Answers are cheap stand-ins computed in Rust, good enough
//! to check what the marshaller does with them.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};

use itertools::Itertools;
use phylotree::tree::Tree;

use crate::engine::{Engine, SimulationArgs};
use crate::ffi;
use crate::marshal::{DoubleArray, MarshalledAlignment, StringArray};

/// One engine call as the engine saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub op: &'static str,
    pub texts: Vec<String>,
    pub numbers: Vec<f64>,
}

#[derive(Debug)]
enum Allocation {
    Text,
    Doubles(usize),
}

#[derive(Debug, Default)]
pub struct MockEngine {
    live: RefCell<HashMap<usize, Allocation>>,
    releases: Cell<usize>,
    double_frees: Cell<usize>,
    calls: RefCell<Vec<Recorded>>,
    fail_next: RefCell<Option<String>>,
    version_calls: Cell<usize>,
}

impl MockEngine {
    pub fn new() -> Self {
        MockEngine::default()
    }

    pub fn alloc_string(&self, text: &str) -> *mut c_char {
        self.alloc_bytes(text.as_bytes())
    }

    /// Raw bytes, which need not be UTF-8, as a NUL-terminated native string.
    pub fn alloc_bytes(&self, bytes: &[u8]) -> *mut c_char {
        let ptr = CString::new(bytes).expect("mock strings have no NUL").into_raw();
        self.live.borrow_mut().insert(ptr as usize, Allocation::Text);
        ptr
    }

    pub fn alloc_doubles(&self, values: &[f64]) -> ffi::DoubleArray {
        if values.is_empty() {
            return ffi::DoubleArray { doubles: std::ptr::null_mut(), length: 0 };
        }
        let boxed: Box<[f64]> = values.into();
        let ptr = Box::into_raw(boxed) as *mut f64;
        self.live.borrow_mut().insert(ptr as usize, Allocation::Doubles(values.len()));
        ffi::DoubleArray { doubles: ptr, length: values.len() }
    }

    pub fn string_ok(&self, text: &str) -> ffi::StringResult {
        ffi::StringResult { value: self.alloc_string(text), error_str: std::ptr::null_mut() }
    }

    /// Error envelope, optionally with a half-built payload the engine
    /// still expects to get back.
    pub fn string_err(&self, message: &str, with_payload: bool) -> ffi::StringResult {
        let value = if with_payload { self.alloc_string("partial") } else { std::ptr::null_mut() };
        ffi::StringResult { value, error_str: self.alloc_string(message) }
    }

    pub fn int_ok(&self, value: i32) -> ffi::IntegerResult {
        ffi::IntegerResult { value, error_str: std::ptr::null_mut() }
    }

    pub fn int_err(&self, message: &str) -> ffi::IntegerResult {
        ffi::IntegerResult { value: 0, error_str: self.alloc_string(message) }
    }

    pub fn doubles_ok(&self, values: &[f64]) -> ffi::DoubleArrayResult {
        ffi::DoubleArrayResult { value: self.alloc_doubles(values), error_str: std::ptr::null_mut() }
    }

    pub fn doubles_err(&self, message: &str, partial: &[f64]) -> ffi::DoubleArrayResult {
        ffi::DoubleArrayResult { value: self.alloc_doubles(partial), error_str: self.alloc_string(message) }
    }

    /// Make the next engine call fail with `message`.
    pub fn fail_next(&self, message: &str) {
        *self.fail_next.borrow_mut() = Some(message.to_string());
    }

    pub fn live_allocations(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn releases(&self) -> usize {
        self.releases.get()
    }

    pub fn version_calls(&self) -> usize {
        self.version_calls.get()
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.borrow().clone()
    }

    pub fn last_call(&self) -> Recorded {
        self.calls.borrow().last().cloned().expect("no engine call recorded")
    }

    /// Nothing leaked, nothing released twice, and exactly `releases`
    /// buffers given back so far.
    pub fn assert_clean(&self, releases: usize) {
        assert_eq!(self.live_allocations(), 0, "native buffers leaked");
        assert_eq!(self.double_frees.get(), 0, "native buffer released twice");
        assert_eq!(self.releases.get(), releases, "unexpected number of releases");
    }

    fn record(&self, op: &'static str, texts: Vec<String>, numbers: Vec<f64>) {
        self.calls.borrow_mut().push(Recorded { op, texts, numbers });
    }

    fn take_failure(&self) -> Option<String> {
        self.fail_next.borrow_mut().take()
    }

    fn answer(&self, result: Result<String, String>) -> ffi::StringResult {
        match self.take_failure().map(Err).unwrap_or(result) {
            Ok(text) => self.string_ok(&text),
            Err(message) => self.string_err(&message, true),
        }
    }

    fn release(&self, addr: usize) -> Option<Allocation> {
        let found = self.live.borrow_mut().remove(&addr);
        match found {
            Some(_) => self.releases.set(self.releases.get() + 1),
            None => self.double_frees.set(self.double_frees.get() + 1),
        }
        found
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        for (addr, allocation) in self.live.get_mut().drain() {
            // SAFETY: addresses in the ledger were produced by alloc_* and not
            // released yet.
            unsafe {
                match allocation {
                    Allocation::Text => drop(CString::from_raw(addr as *mut c_char)),
                    Allocation::Doubles(len) => {
                        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(addr as *mut f64, len)))
                    }
                }
            }
        }
    }
}

fn text(s: &CStr) -> String {
    s.to_string_lossy().into_owned()
}

fn texts(array: &StringArray) -> Vec<String> {
    array.iter().map(text).collect()
}

/// Non-trivial splits of an unrooted tree, each stored as the side without
/// the alphabetically first taxon.
fn splits(newick: &str) -> Result<BTreeSet<BTreeSet<String>>, String> {
    let tree = Tree::from_newick(newick).map_err(|e| e.to_string())?;
    let root = tree.get_root().map_err(|e| e.to_string())?;

    fn below(tree: &Tree, id: usize, out: &mut Vec<BTreeSet<String>>) -> Result<BTreeSet<String>, String> {
        let node = tree.get(&id).map_err(|e| e.to_string())?;
        if node.children.is_empty() {
            return Ok(node.name.iter().cloned().collect());
        }
        let mut leaves = BTreeSet::new();
        for &child in &node.children {
            leaves.extend(below(tree, child, out)?);
        }
        out.push(leaves.clone());
        Ok(leaves)
    }

    let mut clades = Vec::new();
    let all = below(&tree, root, &mut clades)?;
    let first = all.iter().next().cloned().unwrap_or_default();
    Ok(clades
        .into_iter()
        .map(|clade| if clade.contains(&first) { all.difference(&clade).cloned().collect() } else { clade })
        .filter(|side: &BTreeSet<String>| side.len() >= 2 && all.len() - side.len() >= 2)
        .collect())
}

impl Engine for MockEngine {
    fn robinson_fould(&self, tree1: &CStr, tree2: &CStr) -> ffi::IntegerResult {
        let (t1, t2) = (text(tree1), text(tree2));
        self.record("robinson_fould", vec![t1.clone(), t2.clone()], vec![]);
        if let Some(message) = self.take_failure() {
            return self.int_err(&message);
        }
        match (splits(&t1), splits(&t2)) {
            (Ok(a), Ok(b)) => self.int_ok(a.symmetric_difference(&b).count() as i32),
            (Err(e), _) | (_, Err(e)) => self.int_err(&e),
        }
    }

    fn random_tree(&self, num_taxa: c_int, mode: &CStr, num_trees: c_int, rand_seed: c_int) -> ffi::StringResult {
        self.record(
            "random_tree",
            vec![text(mode)],
            vec![num_taxa as f64, num_trees as f64, rand_seed as f64],
        );
        let result = if num_taxa < 3 {
            Err("ERROR: Number of taxa must be at least 3".to_string())
        } else {
            let caterpillar = (2..=num_taxa).fold("T1".to_string(), |acc, i| format!("({acc},T{i})"));
            Ok((0..num_trees).map(|_| format!("{caterpillar};\n")).collect())
        };
        self.answer(result)
    }

    fn build_tree(
        &self,
        aln: &MarshalledAlignment,
        model: &CStr,
        rand_seed: c_int,
        bootstrap_replicates: c_int,
        num_threads: c_int,
    ) -> ffi::StringResult {
        let names = texts(&aln.names);
        let mut recorded = names.clone();
        recorded.push(text(model));
        self.record(
            "build_tree",
            recorded,
            vec![rand_seed as f64, bootstrap_replicates as f64, num_threads as f64],
        );
        self.answer(Ok(format!("({});", names.join(","))))
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
        self.record(
            "fit_tree",
            vec![text(model), text(tree)],
            vec![f64::from(u8::from(branch_lengths_fixed)), rand_seed as f64, num_threads as f64],
        );
        self.answer(Ok(format!("Model: {}\nSequences: {}\n", text(model), aln.names.len())))
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
        self.record(
            "model_finder",
            vec![text(model_set), text(freq_set), text(rate_set)],
            vec![rand_seed as f64, num_threads as f64, aln.names.len() as f64],
        );
        let report = format!(
            "initTree: ({});\nJC: -1301.5 5 0.512\nHKY+F+G4: -1240.25 10 0.431\nGTR+F+G4: -1234.75 14 0.44\n\
             best_model_AIC: GTR+F+G4\nbest_model_AICc: GTR+F+G4\nbest_model_BIC: HKY+F+G4\n",
            texts(&aln.names).join(",")
        );
        self.answer(Ok(report))
    }

    fn distance_matrix(&self, aln: &MarshalledAlignment, num_threads: c_int) -> ffi::DoubleArrayResult {
        let seqs = texts(&aln.seqs);
        self.record("distance_matrix", texts(&aln.names), vec![num_threads as f64]);
        if let Some(message) = self.take_failure() {
            return self.doubles_err(&message, &[0.0]);
        }
        let hamming = |a: &str, b: &str| {
            let sites = a.len().max(1) as f64;
            a.bytes().zip(b.bytes()).filter(|(x, y)| x != y).count() as f64 / sites
        };
        let values: Vec<f64> = seqs
            .iter()
            .cartesian_product(seqs.iter())
            .map(|(a, b)| hamming(a, b))
            .collect();
        self.doubles_ok(&values)
    }

    fn nj_tree(&self, labels: &StringArray, distances: &mut DoubleArray) -> ffi::StringResult {
        self.record("nj_tree", texts(labels), distances.as_slice().to_vec());
        let view = distances.as_ffi();
        if view.length > 0 {
            // SAFETY: the view borrows `distances` mutably for this call.
            unsafe { *view.doubles = f64::NAN };
        }
        self.answer(Ok(format!("({});", texts(labels).join(","))))
    }

    fn consensus_tree(&self, trees: &StringArray, min_support: f64) -> ffi::StringResult {
        let trees = texts(trees);
        self.record("consensus_tree", trees.clone(), vec![min_support]);
        self.answer(trees.into_iter().next().ok_or_else(|| "no trees".to_string()))
    }

    fn simulate_alignment(&self, args: &SimulationArgs) -> ffi::StringResult {
        self.record(
            "simulate_alignment",
            vec![
                text(&args.tree),
                text(&args.model),
                text(&args.partition_info),
                text(&args.partition_type),
                text(&args.root_seq),
                text(&args.insertion_size_distribution),
                text(&args.deletion_size_distribution),
            ],
            vec![
                args.rand_seed as f64,
                args.length as f64,
                args.insertion_rate,
                args.deletion_rate,
                args.num_threads as f64,
            ],
        );
        let taxa = crate::io::tree_taxa(&text(&args.tree)).map_err(|e| e.to_string());
        let site = "A".repeat(usize::try_from(args.length).unwrap_or(0));
        self.answer(taxa.map(|taxa| {
            let body: String = taxa.into_iter().map(|name| format!("  >{name}\n  {site}\n")).collect();
            format!("alignment: |\n{body}")
        }))
    }

    fn version(&self) -> ffi::StringResult {
        self.version_calls.set(self.version_calls.get() + 1);
        self.answer(Ok("2.3.6".to_string()))
    }

    unsafe fn free_string(&self, ptr: *mut c_char) {
        if let Some(Allocation::Text) = self.release(ptr as usize) {
            // SAFETY: the ledger confirms `ptr` came from CString::into_raw.
            drop(unsafe { CString::from_raw(ptr) });
        }
    }

    unsafe fn free_doubles(&self, ptr: *mut f64) {
        if let Some(Allocation::Doubles(len)) = self.release(ptr as usize) {
            // SAFETY: the ledger confirms `ptr` is a boxed slice of `len` values.
            drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, len)) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_distance_of_swapped_cherry() {
        let a = splits("(a,b,(c,(d,e)));").unwrap();
        let b = splits("(a,b,(e,(d,c)));").unwrap();
        assert_eq!(a.symmetric_difference(&b).count(), 2);
    }

    #[test]
    fn double_release_is_counted_not_performed() {
        let engine = MockEngine::new();
        let ptr = engine.alloc_string("x");
        unsafe {
            engine.free_string(ptr);
            engine.free_string(ptr);
        }
        assert_eq!(engine.double_frees.get(), 1);
        assert_eq!(engine.releases(), 1);
    }
}
