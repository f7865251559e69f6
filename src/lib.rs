//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `ffi`: raw `#[repr(C)]` envelopes and the IQ-TREE entry points (feature "iqtree").
//! - `marshal`: copying arguments in and results out, releasing native buffers.
//! - `engine`: the `Engine` seam and the linked `NativeEngine`.
//! - `iqtree`: typed facade with pre-call validation.
//! - `alignment`, `options`, `model`: argument types and the model catalogue.
//! - `report`: typed views of the engine's YAML results.
//! - `scratch`, `quiet`: working directory and console guards around calls.
//! - `io`: FASTA and tree file readers, TSV matrix writer.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod alignment;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod io;
pub mod iqtree;
pub mod marshal;
pub mod model;
pub mod options;
pub mod quiet;
pub mod report;
pub mod scratch;

#[cfg(feature = "python")]
pub mod api;

#[cfg(test)]
mod testing;

// Re-export frequently used types & functions
pub use alignment::Alignment;
pub use engine::Engine;
#[cfg(feature = "iqtree")]
pub use engine::NativeEngine;
pub use error::{IqTreeError, Result};
pub use iqtree::{DistanceMatrix, IqTree};
pub use io::{read_fasta, read_trees, write_matrix_tsv};
pub use model::{Model, ModelKind};
pub use report::{ModelFinderResult, ModelStats};
