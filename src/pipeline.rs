//! The filter driver.
//!
//! Every record goes through the same fixed sequence of steps:
//!
//! 1. quick filters, on the fixed columns only, before genotypes are decoded;
//! 2. sample pruning, with the selection computed once per run;
//! 3. genotype filters, which mask individual calls instead of removing them;
//! 4. the non-variant check, when samples or genotypes were filtered and at
//!    least one sample survives;
//! 5. line filters;
//! 6. AC/AN/AF recomputation, when samples or genotypes were filtered;
//! 7. variant filters, against the recomputed statistics.
//!
//! Under the default [`RecomputePolicy::AfterLineFilters`], line filters that
//! read AC/AN/AF see the values from the input, not the recomputed ones.
//! Within a stage, filters run in configuration order and evaluation stops at
//! the first one that discards.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Result, VcfFilterError};
use crate::filter::{Filter, Stage, StagedFilter, evaluate_filter};
use crate::filters::RegionFilter;
use crate::genotype::Genotype;
use crate::header::VariantHeader;
use crate::record::{FixedColumns, VariantRecord};
use crate::sample::{Sample, SampleSelection};
use crate::stats::{AlleleStats, Variant};

/// When AC/AN/AF are rewritten relative to the line filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecomputePolicy {
    /// Line filters see the input statistics; only surviving lines pay for
    /// recomputation.
    #[default]
    AfterLineFilters,
    /// Line filters see the recomputed statistics.
    BeforeLineFilters,
}

/// Driver settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Abort on the first malformed record instead of skipping it.
    pub strict: bool,
    pub recompute: RecomputePolicy,
    /// Lines per batch in [`Pipeline::run_parallel`].
    pub batch_size: usize,
    /// Worker threads for [`Pipeline::run_parallel`]; the global rayon pool
    /// when unset.
    pub threads: Option<usize>,
    /// Stop reading once a record lies past this region. Assumes
    /// coordinate-sorted input.
    pub stop_past: Option<RegionFilter>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            strict: false,
            recompute: RecomputePolicy::default(),
            batch_size: 1024,
            threads: None,
            stop_past: None,
        }
    }
}

/// Why a record was not emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Filter { stage: Stage, filter: String },
    /// Every remaining call was missing or homozygous reference.
    NonVariant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Emit,
    Drop(DropReason),
}

/// A record after the pipeline, with the decision taken on it.
#[derive(Debug, Clone)]
pub struct Processed {
    pub record: VariantRecord,
    pub verdict: Verdict,
}

impl Processed {
    fn emit(record: VariantRecord) -> Self {
        Self {
            record,
            verdict: Verdict::Emit,
        }
    }

    fn dropped(record: VariantRecord, reason: DropReason) -> Self {
        debug!(
            chrom = %record.fixed().chrom,
            pos = record.fixed().pos,
            reason = ?reason,
            "record dropped"
        );
        Self {
            record,
            verdict: Verdict::Drop(reason),
        }
    }

    fn by_filter(record: VariantRecord, stage: Stage, filter: String) -> Self {
        Self::dropped(record, DropReason::Filter { stage, filter })
    }

    pub fn is_emitted(&self) -> bool {
        self.verdict == Verdict::Emit
    }
}

/// Shared flag that stops line intake.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Data lines taken from the source.
    pub lines_read: usize,
    pub emitted: usize,
    /// Malformed lines skipped outside strict mode.
    pub malformed: usize,
    pub dropped_by_stage: BTreeMap<Stage, usize>,
    pub dropped_non_variant: usize,
    pub cancelled: bool,
    /// Intake stopped because a record lay past the configured region.
    pub stopped_past_region: bool,
}

impl RunReport {
    pub fn dropped(&self) -> usize {
        self.dropped_by_stage.values().sum::<usize>() + self.dropped_non_variant
    }
}

/// A configured, immutable filter pipeline.
///
/// Construction validates every filter against its stage and evaluates the
/// sample filters once. Processing is a pure function of the record, so one
/// pipeline can serve many threads.
pub struct Pipeline {
    input_header: Arc<VariantHeader>,
    header: Arc<VariantHeader>,
    selection: SampleSelection,
    quick: Vec<Box<dyn Filter<Input = FixedColumns>>>,
    sample: Vec<Box<dyn Filter<Input = Sample>>>,
    genotype: Vec<Box<dyn Filter<Input = Genotype>>>,
    line: Vec<Box<dyn Filter<Input = VariantRecord>>>,
    variant: Vec<Box<dyn Filter<Input = Variant>>>,
    /// Some line filter counts calls, so the block is decoded before the line stage.
    line_reads_genotypes: bool,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        header: impl Into<Arc<VariantHeader>>,
        filters: Vec<StagedFilter>,
        options: PipelineOptions,
    ) -> Result<Self> {
        let input_header = header.into();
        for filter in &filters {
            filter.validate()?;
        }

        let (mut quick, mut sample, mut genotype, mut line, mut variant) =
            (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
        for filter in filters {
            match filter {
                StagedFilter::Quick(f) => quick.push(f),
                StagedFilter::Sample(f) => sample.push(f),
                StagedFilter::Genotype(f) => genotype.push(f),
                StagedFilter::Line(f) => line.push(f),
                StagedFilter::Variant(f) => variant.push(f),
            }
        }

        let selection = SampleSelection::compute(&input_header, &sample)?;
        let header = if selection.is_all() {
            Arc::clone(&input_header)
        } else {
            Arc::new(input_header.select_samples(selection.indices()))
        };

        let line_reads_genotypes = line.iter().any(|f| f.needs_genotypes());
        let pipeline = Self {
            input_header,
            header,
            selection,
            quick,
            sample,
            genotype,
            line,
            variant,
            line_reads_genotypes,
            options,
        };
        for (stage, summary) in pipeline.provenance() {
            info!(%stage, filter = %summary, "filter configured");
        }
        info!(
            kept = pipeline.selection.len(),
            total = pipeline.selection.total(),
            "sample selection"
        );
        Ok(pipeline)
    }

    /// Header the input lines are decoded against.
    pub fn input_header(&self) -> &Arc<VariantHeader> {
        &self.input_header
    }

    /// Header after sample pruning, describing the emitted records.
    pub fn header(&self) -> &Arc<VariantHeader> {
        &self.header
    }

    pub fn selection(&self) -> &SampleSelection {
        &self.selection
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Filter summaries in the order they run.
    pub fn provenance(&self) -> Vec<(Stage, String)> {
        let mut out = Vec::new();
        out.extend(self.quick.iter().map(|f| (Stage::Quick, f.summary())));
        out.extend(self.sample.iter().map(|f| (Stage::Sample, f.summary())));
        out.extend(self.genotype.iter().map(|f| (Stage::Genotype, f.summary())));
        out.extend(self.line.iter().map(|f| (Stage::Line, f.summary())));
        out.extend(self.variant.iter().map(|f| (Stage::Variant, f.summary())));
        out
    }

    /// Whether sample or genotype filters can change the calls of a record.
    pub fn mutates_genotypes(&self) -> bool {
        !self.sample.is_empty() || !self.genotype.is_empty()
    }

    /// Decode one data line against the input header and process it.
    pub fn process_line(&self, line: &str) -> Result<Processed> {
        let record = VariantRecord::from_line(line, &self.input_header)?;
        self.process(record)
    }

    /// Run one record through every stage.
    pub fn process(&self, mut record: VariantRecord) -> Result<Processed> {
        for filter in &self.quick {
            if !evaluate_filter(filter.as_ref(), record.fixed())? {
                return Ok(Processed::by_filter(record, Stage::Quick, filter.summary()));
            }
        }

        if !self.sample.is_empty() {
            record.prune_samples(&self.selection)?;
        }

        if !self.genotype.is_empty() {
            for genotype in record.genotypes_mut()?.iter_mut() {
                if genotype.is_missing() {
                    continue;
                }
                for filter in &self.genotype {
                    if !evaluate_filter(filter.as_ref(), &*genotype)? {
                        genotype.set_missing();
                        break;
                    }
                }
            }
        }

        let mutates = self.mutates_genotypes();
        if mutates {
            let genotypes = record.genotypes_mut()?;
            if genotypes.len() != self.header.sample_count() {
                return Err(VcfFilterError::SampleColumnMismatch {
                    expected: self.header.sample_count(),
                    found: genotypes.len(),
                });
            }
            let non_variant = genotypes.iter().all(|g| g.is_missing() || g.is_hom_ref());
            if !self.selection.is_empty() && non_variant {
                return Ok(Processed::dropped(record, DropReason::NonVariant));
            }
        }

        let mut recomputed = None;
        if mutates && self.options.recompute == RecomputePolicy::BeforeLineFilters {
            recomputed = Some(recompute(&mut record)?);
        }

        if self.line_reads_genotypes {
            record.decode_genotypes()?;
        }
        for filter in &self.line {
            if !evaluate_filter(filter.as_ref(), &record)? {
                return Ok(Processed::by_filter(record, Stage::Line, filter.summary()));
            }
        }

        if mutates && recomputed.is_none() {
            recomputed = Some(recompute(&mut record)?);
        }

        if self.variant.is_empty() {
            return Ok(Processed::emit(record));
        }
        let variant = match recomputed {
            Some(stats) => Variant::with_stats(record, stats),
            None => Variant::new(record)?,
        };
        for filter in &self.variant {
            if !evaluate_filter(filter.as_ref(), &variant)? {
                let summary = filter.summary();
                return Ok(Processed::by_filter(variant.into_record(), Stage::Variant, summary));
            }
        }
        Ok(Processed::emit(variant.into_record()))
    }

    /// Process `lines` one at a time, handing survivors to `sink` in input order.
    ///
    /// Blank lines and `#` header lines are skipped. Cancellation is checked
    /// before each line is read.
    pub fn run<I, F>(&self, lines: I, mut sink: F, cancel: &CancellationToken) -> Result<RunReport>
    where
        I: IntoIterator<Item = io::Result<String>>,
        F: FnMut(VariantRecord) -> Result<()>,
    {
        let mut report = RunReport::default();
        let mut lines = data_lines(lines);
        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let Some(next) = lines.next() else { break };
            let (number, line) = next?;
            report.lines_read += 1;
            let outcome = self.process_line(&line);
            if !self.settle(number, outcome, &mut report, &mut sink)? {
                break;
            }
        }
        self.finish(&report);
        Ok(report)
    }

    /// Process `lines` in batches on a rayon pool.
    ///
    /// Records within a batch are filtered in parallel and emitted in input
    /// order once the whole batch is done. A batch that finishes after
    /// cancellation is discarded without emitting any of it.
    pub fn run_parallel<I, F>(
        &self,
        lines: I,
        mut sink: F,
        cancel: &CancellationToken,
    ) -> Result<RunReport>
    where
        I: IntoIterator<Item = io::Result<String>>,
        F: FnMut(VariantRecord) -> Result<()>,
    {
        let pool = match self.options.threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(io::Error::other)?,
            ),
            None => None,
        };
        let batch_size = self.options.batch_size.max(1);

        let mut report = RunReport::default();
        let mut lines = data_lines(lines);
        'batches: loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let mut batch = Vec::with_capacity(batch_size);
            let mut source_error = None;
            for next in lines.by_ref().take(batch_size) {
                match next {
                    Ok(line) => batch.push(line),
                    Err(err) => {
                        source_error = Some(err);
                        break;
                    }
                }
            }
            if batch.is_empty() {
                match source_error {
                    Some(err) => return Err(err.into()),
                    None => break,
                }
            }

            let outcomes = match &pool {
                Some(pool) => pool.install(|| self.process_batch(&batch)),
                None => self.process_batch(&batch),
            };
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            for ((number, _), outcome) in batch.iter().zip(outcomes) {
                report.lines_read += 1;
                if !self.settle(*number, outcome, &mut report, &mut sink)? {
                    break 'batches;
                }
            }
            // Lines read before a source error are settled first, as in `run`.
            if let Some(err) = source_error {
                return Err(err.into());
            }
        }
        self.finish(&report);
        Ok(report)
    }

    fn process_batch(&self, batch: &[(usize, String)]) -> Vec<Result<Processed>> {
        batch
            .par_iter()
            .map(|(_, line)| self.process_line(line))
            .collect()
    }

    /// Account for one outcome in input order. Returns false once intake
    /// should stop.
    fn settle<F>(
        &self,
        number: usize,
        outcome: Result<Processed>,
        report: &mut RunReport,
        sink: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(VariantRecord) -> Result<()>,
    {
        let processed = match outcome {
            Ok(processed) => processed,
            Err(err) => {
                let err = err.at_line(number);
                if err.is_fatal(self.options.strict) {
                    return Err(err);
                }
                warn!(line = number, error = %err, "skipping malformed record");
                report.malformed += 1;
                return Ok(true);
            }
        };

        if let Some(region) = &self.options.stop_past {
            let fixed = processed.record.fixed();
            if region.is_past(&fixed.chrom, fixed.pos) {
                debug!(line = number, "past the requested region, stopping");
                report.stopped_past_region = true;
                return Ok(false);
            }
        }

        match processed.verdict {
            Verdict::Emit => {
                sink(processed.record)?;
                report.emitted += 1;
            }
            Verdict::Drop(DropReason::Filter { stage, .. }) => {
                *report.dropped_by_stage.entry(stage).or_default() += 1;
            }
            Verdict::Drop(DropReason::NonVariant) => report.dropped_non_variant += 1,
        }
        Ok(true)
    }

    fn finish(&self, report: &RunReport) {
        info!(
            lines = report.lines_read,
            emitted = report.emitted,
            dropped = report.dropped(),
            malformed = report.malformed,
            cancelled = report.cancelled,
            "run finished"
        );
    }
}

/// Recompute AC/AN/AF from the record's genotypes and write them to INFO.
fn recompute(record: &mut VariantRecord) -> Result<AlleleStats> {
    let n_alt = record.fixed().alt_alleles.len();
    let stats = AlleleStats::from_genotypes(record.genotypes_mut()?, n_alt);
    stats.apply(record.fixed_mut());
    Ok(stats)
}

/// Number lines from 1 and skip the ones that carry no record.
fn data_lines<I>(lines: I) -> impl Iterator<Item = io::Result<(usize, String)>>
where
    I: IntoIterator<Item = io::Result<String>>,
{
    lines
        .into_iter()
        .enumerate()
        .filter_map(|(i, line)| match line {
            Ok(line) if line.trim().is_empty() || line.starts_with('#') => None,
            Ok(line) => Some(Ok((i + 1, line))),
            Err(err) => Some(Err(err)),
        })
}
