//! Named sequence alignment handed to the engine as two parallel arrays.

use crate::error::{IqTreeError, Result};

/// Sequence names and aligned sequences, kept in matching order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    names: Vec<String>,
    seqs: Vec<String>,
}

impl Alignment {
    /// Pair up names and sequences.
    ///
    /// # Errors
    /// `InvalidArgument` if the two lists differ in length.
    pub fn new(names: Vec<String>, seqs: Vec<String>) -> Result<Self> {
        if names.len() != seqs.len() {
            return Err(IqTreeError::invalid(
                "alignment",
                format!("{} names but {} sequences", names.len(), seqs.len()),
            ));
        }
        Ok(Alignment { names, seqs })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn seqs(&self) -> &[String] {
        &self.seqs
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(String, String)> for Alignment {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let (names, seqs) = iter.into_iter().unzip();
        Alignment { names, seqs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = Alignment::new(vec!["a".into(), "b".into()], vec!["ACGT".into()]).unwrap_err();
        assert_eq!(err.to_string(), "invalid argument `alignment`: 2 names but 1 sequences");
    }

    #[test]
    fn collects_pairs_in_order() {
        let aln: Alignment = [("a", "GGG"), ("b", "GGC")]
            .into_iter()
            .map(|(n, s)| (n.to_string(), s.to_string()))
            .collect();
        assert_eq!(aln.names(), ["a", "b"]);
        assert_eq!(aln.seqs(), ["GGG", "GGC"]);
        assert_eq!(aln.len(), 2);
    }
}
