//! Coordinate model: chromosomes of a reference genome.
//!
//! Every other component resolves contig names through [`Reference::resolve`]
//! and bounds-checks coordinates against [`Chromosome::size`].

use crate::{Error, Result};
use noodles::fasta::fai;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chromosome {
    pub id: u64,
    pub name: String,
    pub size: u64,
}

impl Chromosome {
    pub fn new(id: u64, name: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            name: name.into(),
            size,
        }
    }

    /// Whether a 1-based position lies on this chromosome.
    ///
    /// A chromosome of unknown size (0) accepts any position.
    pub fn contains(&self, pos: u64) -> bool {
        pos >= 1 && (self.size == 0 || pos <= self.size)
    }

    /// Clamp a 1-based inclusive range to the chromosome bounds.
    pub fn clamp(&self, start: u64, end: u64) -> Result<(u64, u64)> {
        let start = start.max(1);
        let end = if self.size == 0 { end } else { end.min(self.size) };
        if start > end {
            return Err(Error::InvalidRange(format!(
                "{}:{}-{} is outside the chromosome",
                self.name, start, end
            )));
        }
        Ok((start, end))
    }
}

/// A reference genome: ordered chromosomes plus name lookup.
#[derive(Debug, Clone)]
pub struct Reference {
    pub id: u64,
    pub name: String,
    chromosomes: Vec<Chromosome>,
    by_name: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
}

impl Reference {
    pub fn new(id: u64, name: impl Into<String>, chromosomes: Vec<Chromosome>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(chromosomes.len());
        let mut by_alias = HashMap::with_capacity(chromosomes.len());

        for (i, chromosome) in chromosomes.iter().enumerate() {
            if by_name.insert(chromosome.name.clone(), i).is_some() {
                return Err(Error::InvalidInput(format!(
                    "duplicate chromosome name: {}",
                    chromosome.name
                )));
            }
            // First chromosome wins an alias, e.g. "chr1" and "1" both present
            by_alias.entry(normalize_contig(&chromosome.name)).or_insert(i);
        }

        Ok(Self {
            id,
            name: name.into(),
            chromosomes,
            by_name,
            by_alias,
        })
    }

    /// Build a reference from named sequence lengths, assigning ids in order.
    pub fn from_lengths<I, S>(id: u64, name: impl Into<String>, lengths: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let chromosomes = lengths
            .into_iter()
            .enumerate()
            .map(|(i, (name, size))| Chromosome::new(i as u64 + 1, name, size))
            .collect();
        Self::new(id, name, chromosomes)
    }

    /// Load chromosome names and sizes from a FASTA index (`.fai`).
    pub fn from_fai(id: u64, name: impl Into<String>, path: &Path) -> Result<Self> {
        let index = fai::read(path)
            .map_err(|e| Error::Internal(format!("failed to read FAI index: {}", e)))?;

        let lengths: Vec<(String, u64)> = index
            .as_ref()
            .iter()
            .map(|record| {
                (
                    String::from_utf8_lossy(record.name()).into_owned(),
                    record.length() as u64,
                )
            })
            .collect();

        Self::from_lengths(id, name, lengths)
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        &self.chromosomes
    }

    /// Resolve a contig name, first as written, then through its normalized alias.
    pub fn resolve(&self, contig: &str) -> Option<&Chromosome> {
        self.by_name
            .get(contig)
            .or_else(|| self.by_alias.get(&normalize_contig(contig)))
            .map(|&i| &self.chromosomes[i])
    }
}

/// Normalized alias of a contig name: no `chr` prefix, upper case, `M` spelled `MT`.
pub fn normalize_contig(name: &str) -> String {
    let trimmed = name.trim();
    let stripped = match trimmed.get(..3) {
        Some(prefix) if trimmed.len() > 3 && prefix.eq_ignore_ascii_case("chr") => &trimmed[3..],
        _ => trimmed,
    };
    let upper = stripped.to_ascii_uppercase();
    if upper == "M" { "MT".to_string() } else { upper }
}
