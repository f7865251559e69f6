use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use itertools::Itertools;
use phylotree::tree::Tree;

use crate::alignment::Alignment;
use crate::error::{IqTreeError, Result};

/// Remove BEAST `[&key=value,...]` comments, which IQ-TREE rejects. Branch
/// lengths after them are kept; plain `[...]` comments are left alone. An
/// unterminated annotation swallows the rest of the string.
pub fn strip_beast_annotations(newick: &str) -> String {
    let mut kept = String::with_capacity(newick.len());
    let mut rest = newick;
    while let Some(open) = rest.find("[&") {
        kept.push_str(&rest[..open]);
        rest = match rest[open..].find(']') {
            Some(close) => &rest[open + close + 1..],
            None => "",
        };
    }
    kept.push_str(rest);
    kept
}

/// Parse a newick string, mapping the parser error into ours.
pub fn parse_newick(newick: &str) -> Result<Tree> {
    Tree::from_newick(newick).map_err(|e| IqTreeError::parse("newick tree", e.to_string()))
}

/// Leaf names of a newick tree. Unnamed leaves are an error.
pub fn tree_taxa(newick: &str) -> Result<BTreeSet<String>> {
    let tree = parse_newick(newick)?;
    tree.get_leaves()
        .iter()
        .map(|id| {
            let node = tree.get(id).map_err(|e| IqTreeError::parse("newick tree", e.to_string()))?;
            node.name
                .clone()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| IqTreeError::parse("newick tree", format!("unnamed leaf in {newick}")))
        })
        .collect()
}

/// Read trees from a file: either NEXUS `tree NAME = ...;` lines (BEAST
/// annotations stripped) or plain newick, one tree per non-empty line.
///
/// Every tree is parsed once so a malformed file fails here rather than
/// inside the engine.
pub fn read_trees<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())?;

    let is_nexus = content.trim_start().to_ascii_uppercase().starts_with("#NEXUS");
    let trees: Vec<String> = if is_nexus {
        collect_tree_blocks(&content)
            .into_iter()
            .map(|body| strip_beast_annotations(&body))
            .collect()
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    };

    for (idx, newick) in trees.iter().enumerate() {
        parse_newick(newick).map_err(|e| {
            IqTreeError::parse("tree file", format!("{} tree {idx}: {e}", path.as_ref().display()))
        })?;
    }

    Ok(trees)
}

/// Bodies of the `tree NAME = ...;` lines, up to the closing `END;`.
fn collect_tree_blocks(content: &str) -> Vec<String> {
    content
        .lines()
        .skip_while(|line| !line.trim_start().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| line.split_once('=').map(|(_, body)| body.trim().to_string()))
        .collect()
}

/// Read a FASTA file into an alignment. Sequence lines are concatenated
/// with whitespace removed; the name is the header up to the first space.
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Alignment> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_fasta(&content)
}

pub fn parse_fasta(content: &str) -> Result<Alignment> {
    let mut records: Vec<(String, String)> = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            let name = header.split_whitespace().next().unwrap_or_default();
            if name.is_empty() {
                return Err(IqTreeError::parse("FASTA", format!("empty sequence name at line {}", line_no + 1)));
            }
            records.push((name.to_string(), String::new()));
        } else {
            let (_, seq) = records.last_mut().ok_or_else(|| {
                IqTreeError::parse("FASTA", format!("sequence data before first header at line {}", line_no + 1))
            })?;
            seq.extend(line.chars().filter(|c| !c.is_whitespace()));
        }
    }

    Ok(records.into_iter().collect())
}

/// Format an alignment as FASTA, one line per sequence.
pub fn to_fasta(aln: &Alignment) -> String {
    aln.names()
        .iter()
        .zip(aln.seqs())
        .map(|(name, seq)| format!(">{name}\n{seq}\n"))
        .collect()
}

/// Destination of a TSV table: stdout for `-`, gzip for `*.gz`, else a file.
enum TableSink {
    Stdout(io::StdoutLock<'static>),
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl TableSink {
    fn create(path: &Path) -> io::Result<Self> {
        if path.as_os_str() == "-" {
            return Ok(TableSink::Stdout(io::stdout().lock()));
        }
        let file = File::create(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            Ok(TableSink::Gzip(BufWriter::new(GzEncoder::new(file, Compression::default()))))
        } else {
            Ok(TableSink::Plain(BufWriter::new(file)))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            TableSink::Stdout(w) => w,
            TableSink::Plain(w) => w,
            TableSink::Gzip(w) => w,
        }
    }

    /// Flush everything, and write the gzip trailer, reporting any failure.
    fn finish(self) -> io::Result<()> {
        match self {
            TableSink::Stdout(mut w) => w.flush(),
            TableSink::Plain(w) => w.into_inner().map(drop).map_err(io::IntoInnerError::into_error),
            TableSink::Gzip(w) => {
                w.into_inner().map_err(io::IntoInnerError::into_error)?.finish()?;
                Ok(())
            }
        }
    }
}

/// Write a square matrix as TSV with `names` labelling both rows and
/// columns. `path` may be `-` for stdout; a `.gz` path is gzip-compressed.
pub fn write_matrix_tsv<P, S, T>(path: P, names: &[S], mat: &[Vec<T>]) -> Result<()>
where
    P: AsRef<Path>,
    S: AsRef<str>,
    T: Display,
{
    if mat.len() != names.len() {
        return Err(IqTreeError::invalid(
            "matrix",
            format!("{} rows but {} labels", mat.len(), names.len()),
        ));
    }
    if let Some(idx) = mat.iter().position(|row| row.len() != names.len()) {
        return Err(IqTreeError::invalid(
            "matrix",
            format!("row {idx} has {} columns, expected {}", mat[idx].len(), names.len()),
        ));
    }

    let mut sink = TableSink::create(path.as_ref())?;
    let out = sink.writer();
    writeln!(out, "\t{}", names.iter().map(|s| s.as_ref()).join("\t"))?;
    for (name, row) in names.iter().zip(mat) {
        writeln!(out, "{}\t{}", name.as_ref(), row.iter().join("\t"))?;
    }
    sink.finish()?;
    Ok(())
}
