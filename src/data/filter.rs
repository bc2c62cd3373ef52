//! The data-reduction pipeline.
//!
//! Raw observations pass through an ordered chain of named filters. The
//! registration order is part of the contract: recoding assumes thinned and
//! binned resolution, compression assumes recoded alphabets, validation
//! assumes compressed input, and summary statistics are computed only after
//! uninformative contigs have been rejected.
//!
//! Filters may publish named statistics (e.g. `"watterson"`) into a mapping
//! that survives pipeline completion; the transformed dataset and that
//! mapping are the only outputs.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::data::dataset::{Contig, Dataset, SiteObs};
use crate::error::AnalysisError;

/// Named summary statistics accumulated across pipeline stages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    values: BTreeMap<String, f64>,
}

impl Statistics {
    pub fn publish(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// The Watterson estimate published by the summary stage.
    pub fn watterson(&self) -> Result<f64, AnalysisError> {
        self.get("watterson").ok_or_else(|| {
            AnalysisError::data("No Watterson estimate available; pipeline has not run a summary stage.")
        })
    }
}

/// A named transformation `Dataset -> Dataset`.
pub trait Filter {
    fn name(&self) -> &'static str;

    fn apply(&mut self, dataset: Dataset, stats: &mut Statistics) -> Result<Dataset, AnalysisError>;
}

/// An ordered chain of filters plus the accumulated statistics.
#[derive(Default)]
pub struct Pipeline {
    filters: Vec<Box<dyn Filter>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filter(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// Run every stage in registration order. The dataset is owned
    /// exclusively by the pipeline for the duration; a stage failure aborts
    /// the run (no partial statistics are trusted).
    pub fn run(mut self, dataset: Dataset) -> Result<(Dataset, Statistics), AnalysisError> {
        let mut stats = Statistics::default();
        let mut dataset = dataset;
        for filter in &mut self.filters {
            dataset = filter.apply(dataset, &mut stats)?;
        }
        Ok((dataset, stats))
    }
}

/// Masks segregating observations between retained site positions.
///
/// A row is retained when its span covers a site position that is a multiple
/// of the stride; non-retained segregating rows become missing. This
/// decorrelates dense linked sites before binning.
pub struct Thin {
    stride: usize,
}

impl Thin {
    pub fn new(stride: usize) -> Self {
        Self { stride }
    }
}

impl Filter for Thin {
    fn name(&self) -> &'static str {
        "thin"
    }

    fn apply(&mut self, mut dataset: Dataset, _stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        let stride = self.stride as u64;
        if stride <= 1 {
            return Ok(dataset);
        }
        for contig in &mut dataset.contigs {
            let mut pos: u64 = 0;
            for site in &mut contig.sites {
                let end = pos + site.span as u64;
                let next_mark = pos.div_ceil(stride) * stride;
                let retained = next_mark < end;
                if !retained && site.is_segregating() {
                    site.derived = -1;
                }
                pos = end;
            }
        }
        Ok(dataset)
    }
}

/// Re-chunks each contig into fixed windows of `width` sites.
///
/// A window becomes one row: derived 1 if it contains a segregating site,
/// 0 if all observed sites are monomorphic, missing if nothing in the window
/// was observed. The sample size is the maximum over the window. The final
/// window of a contig may be short.
pub struct Bin {
    width: u32,
}

impl Bin {
    pub fn new(width: u32) -> Self {
        Self { width }
    }
}

impl Filter for Bin {
    fn name(&self) -> &'static str {
        "bin"
    }

    fn apply(&mut self, mut dataset: Dataset, _stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        let width = self.width as u64;
        if width <= 1 {
            return Ok(dataset);
        }
        for contig in &mut dataset.contigs {
            let mut out: Vec<SiteObs> = Vec::new();
            let mut fill: u64 = 0;
            let mut segregating = false;
            let mut observed = false;
            let mut sample_size: u32 = 0;

            let flush = |fill: u64, segregating: bool, observed: bool, n: u32, out: &mut Vec<SiteObs>| {
                let derived = if segregating {
                    1
                } else if observed {
                    0
                } else {
                    -1
                };
                out.push(SiteObs::new(fill as u32, derived, n));
            };

            for site in &contig.sites {
                let mut remaining = site.span as u64;
                while remaining > 0 {
                    let take = (width - fill).min(remaining);
                    remaining -= take;
                    fill += take;
                    sample_size = sample_size.max(site.sample_size);
                    if !site.is_missing() {
                        observed = true;
                        if site.is_segregating() {
                            segregating = true;
                        }
                    }
                    if fill == width {
                        flush(fill, segregating, observed, sample_size, &mut out);
                        fill = 0;
                        segregating = false;
                        observed = false;
                        sample_size = 0;
                    }
                }
            }
            if fill > 0 {
                flush(fill, segregating, observed, sample_size, &mut out);
            }
            contig.sites = out;
        }
        Ok(dataset)
    }
}

/// Collapses monomorphic rows to the ancestral code so that every
/// nonsegregating observation shares one representation. Rows fixed for the
/// derived allele become `derived = 0`.
pub struct RecodeMonomorphic;

impl Filter for RecodeMonomorphic {
    fn name(&self) -> &'static str {
        "recode_monomorphic"
    }

    fn apply(&mut self, mut dataset: Dataset, _stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        for contig in &mut dataset.contigs {
            for site in &mut contig.sites {
                if site.derived >= 0 && site.sample_size > 0 && site.derived as u32 == site.sample_size {
                    site.derived = 0;
                }
            }
        }
        Ok(dataset)
    }
}

/// Run-length merges adjacent nonsegregating rows with identical codes.
///
/// Segregating rows are never merged: later summary stages count them
/// row-by-row. Assumes monomorphic rows were already recoded to a single
/// representation.
pub struct Compress;

impl Filter for Compress {
    fn name(&self) -> &'static str {
        "compress"
    }

    fn apply(&mut self, mut dataset: Dataset, _stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        dataset.contigs.par_iter_mut().for_each(|contig| {
            let mut out: Vec<SiteObs> = Vec::with_capacity(contig.sites.len());
            for site in contig.sites.drain(..) {
                match out.last_mut() {
                    Some(last)
                        if !site.is_segregating()
                            && !last.is_segregating()
                            && last.derived == site.derived
                            && last.sample_size == site.sample_size =>
                    {
                        last.span = last.span.saturating_add(site.span);
                    }
                    _ => out.push(site),
                }
            }
            contig.sites = out;
        });
        Ok(dataset)
    }
}

/// Structural checks over the compressed, recoded input.
pub struct Validate;

fn validate_contig(contig: &Contig) -> Result<(), AnalysisError> {
    if contig.sites.is_empty() {
        return Err(AnalysisError::data(format!(
            "Contig '{}' is empty after filtering.",
            contig.name
        )));
    }
    for (i, site) in contig.sites.iter().enumerate() {
        if site.span == 0 {
            return Err(AnalysisError::data(format!(
                "Contig '{}': zero-length span at row {i}.",
                contig.name
            )));
        }
        if site.sample_size == 0 {
            return Err(AnalysisError::data(format!(
                "Contig '{}': zero sample size at row {i}.",
                contig.name
            )));
        }
        if site.derived < -1 || site.derived > site.sample_size as i32 {
            return Err(AnalysisError::data(format!(
                "Contig '{}': derived count {} out of range for sample size {} at row {i}.",
                contig.name, site.derived, site.sample_size
            )));
        }
    }
    Ok(())
}

impl Filter for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn apply(&mut self, dataset: Dataset, _stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        dataset.contigs.par_iter().try_for_each(validate_contig)?;
        Ok(dataset)
    }
}

/// Rejects contigs left entirely uninformative by the preceding stages.
///
/// An uninformative contig is a data failure, not a silent drop: summary
/// statistics computed over a partially discarded dataset are not trusted.
pub struct DropUninformativeContigs;

impl Filter for DropUninformativeContigs {
    fn name(&self) -> &'static str {
        "drop_uninformative"
    }

    fn apply(&mut self, dataset: Dataset, _stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        for contig in &dataset.contigs {
            if contig.segregating_sites() == 0 {
                return Err(AnalysisError::data(format!(
                    "Contig '{}' has no segregating sites after filtering.",
                    contig.name
                )));
            }
        }
        Ok(dataset)
    }
}

/// Publishes dataset-level summary statistics, notably the Watterson
/// estimate of the population-scaled mutation rate per site:
/// `theta_hat = S / (a_n * L)` with `S` segregating rows, `L` total span,
/// and `a_n` the harmonic number for the largest observed sample size.
pub struct Summarize;

fn harmonic(n: u32) -> f64 {
    (1..n).map(|i| 1.0 / i as f64).sum()
}

impl Filter for Summarize {
    fn name(&self) -> &'static str {
        "summarize"
    }

    fn apply(&mut self, dataset: Dataset, stats: &mut Statistics) -> Result<Dataset, AnalysisError> {
        let segregating = dataset.segregating_sites();
        let total_span = dataset.total_span();
        let sample_size = dataset
            .contigs
            .iter()
            .flat_map(|c| c.sites.iter())
            .filter(|s| !s.is_missing())
            .map(|s| s.sample_size)
            .max()
            .unwrap_or(0);

        if total_span == 0 {
            return Err(AnalysisError::data("Empty dataset: no observed sites to summarize."));
        }
        if sample_size < 2 {
            return Err(AnalysisError::data(format!(
                "Sample size {sample_size} too small for a Watterson estimate."
            )));
        }

        let theta_hat = segregating as f64 / (harmonic(sample_size) * total_span as f64);
        if !theta_hat.is_finite() {
            return Err(AnalysisError::data("Non-finite Watterson estimate."));
        }

        stats.publish("watterson", theta_hat);
        stats.publish("segregating_sites", segregating as f64);
        stats.publish("total_span", total_span as f64);
        Ok(dataset)
    }
}
