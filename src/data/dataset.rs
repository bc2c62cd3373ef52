//! Raw observation types.
//!
//! A dataset is a collection of contigs; each contig is a run-length encoded
//! sequence of folded site observations for one population sample. The
//! pipeline owns the dataset exclusively while it runs, so filters take and
//! return it by value.

use serde::{Deserialize, Serialize};

/// A run of `span` adjacent sites sharing one observation.
///
/// `derived` is the derived allele count in a sample of `sample_size`
/// haploids; `-1` marks a missing/masked observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteObs {
    pub span: u32,
    pub derived: i32,
    pub sample_size: u32,
}

impl SiteObs {
    pub fn new(span: u32, derived: i32, sample_size: u32) -> Self {
        Self {
            span,
            derived,
            sample_size,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.derived < 0
    }

    /// Segregating: both alleles observed in the sample.
    pub fn is_segregating(&self) -> bool {
        self.derived > 0 && (self.derived as u32) < self.sample_size
    }
}

/// A contiguous stretch of observed sequence, treated as one unit through
/// the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contig {
    pub name: String,
    pub population: String,
    pub sites: Vec<SiteObs>,
}

impl Contig {
    pub fn new(name: impl Into<String>, population: impl Into<String>, sites: Vec<SiteObs>) -> Self {
        Self {
            name: name.into(),
            population: population.into(),
            sites,
        }
    }

    pub fn segregating_sites(&self) -> usize {
        self.sites.iter().filter(|s| s.is_segregating()).count()
    }

    pub fn total_span(&self) -> u64 {
        self.sites.iter().map(|s| s.span as u64).sum()
    }
}

/// The full input to one analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub contigs: Vec<Contig>,
}

impl Dataset {
    pub fn new(contigs: Vec<Contig>) -> Self {
        Self { contigs }
    }

    /// Distinct population identifiers, in first-appearance order.
    pub fn populations(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for contig in &self.contigs {
            if !out.iter().any(|p| p == &contig.population) {
                out.push(contig.population.clone());
            }
        }
        out
    }

    pub fn total_span(&self) -> u64 {
        self.contigs.iter().map(|c| c.total_span()).sum()
    }

    pub fn segregating_sites(&self) -> usize {
        self.contigs.iter().map(|c| c.segregating_sites()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segregating_excludes_monomorphic_and_missing() {
        assert!(SiteObs::new(1, 3, 10).is_segregating());
        assert!(!SiteObs::new(1, 0, 10).is_segregating());
        assert!(!SiteObs::new(1, 10, 10).is_segregating());
        assert!(!SiteObs::new(1, -1, 10).is_segregating());
    }

    #[test]
    fn populations_deduplicate_in_order() {
        let ds = Dataset::new(vec![
            Contig::new("chr1", "popA", vec![]),
            Contig::new("chr2", "popB", vec![]),
            Contig::new("chr3", "popA", vec![]),
        ]);
        assert_eq!(ds.populations(), vec!["popA", "popB"]);
    }
}
