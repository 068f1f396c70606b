//! Built-in filters for each stage.

use std::marker::PhantomData;

use crate::error::{Result, VcfFilterError};
use crate::eval::{FieldSource, evaluate_predicate};
use crate::expr::{Expr, parse_expr};
use crate::filter::{Filter, Stage};
use crate::genotype::Genotype;
use crate::record::{FixedColumns, VariantRecord};
use crate::sample::Sample;
use crate::stats::Variant;

const FIXED_FIELDS: [&str; 7] = ["CHROM", "POS", "ID", "REF", "ALT", "QUAL", "FILTER"];
const SAMPLE_FIELDS: [&str; 2] = ["NAME", "INDEX"];
const GENOTYPE_FIELDS: [&str; 5] = ["GT", "GQ", "PLOIDY", "PHASED", "MISSING"];
const LINE_FIELDS: [&str; 2] = ["N_SAMPLES", "N_CALLED"];
const VARIANT_FIELDS: [&str; 2] = ["MAF", "MAF_BUCKET"];

/// Inputs an [`ExprFilter`] can run against, and the fields each can see.
pub trait ExprInput: FieldSource + Send + Sync + 'static {
    const STAGE: Stage;

    /// `Err(reason)` when `field` is not available at this stage.
    fn check_field(field: &str) -> std::result::Result<(), &'static str>;
}

fn reject_in(field: &str, names: &[&str], reason: &'static str) -> std::result::Result<(), &'static str> {
    if names.contains(&field) {
        Err(reason)
    } else {
        Ok(())
    }
}

fn reject_namespace(field: &str, ns: &str, reason: &'static str) -> std::result::Result<(), &'static str> {
    match field.split_once('.') {
        Some((prefix, _)) if prefix == ns => Err(reason),
        _ => Ok(()),
    }
}

impl ExprInput for FixedColumns {
    const STAGE: Stage = Stage::Quick;

    fn check_field(field: &str) -> std::result::Result<(), &'static str> {
        reject_namespace(field, "FORMAT", "genotype columns are not decoded yet")?;
        reject_in(field, &GENOTYPE_FIELDS, "genotype columns are not decoded yet")?;
        reject_in(field, &SAMPLE_FIELDS, "sample identity belongs to sample filters")?;
        reject_in(field, &LINE_FIELDS, "sample counts are only known after pruning")?;
        reject_in(field, &VARIANT_FIELDS, "recomputed statistics are not available yet")
    }
}

impl ExprInput for Sample {
    const STAGE: Stage = Stage::Sample;

    fn check_field(field: &str) -> std::result::Result<(), &'static str> {
        if SAMPLE_FIELDS.contains(&field) {
            Ok(())
        } else {
            Err("sample filters only see NAME and INDEX")
        }
    }
}

impl ExprInput for Genotype {
    const STAGE: Stage = Stage::Genotype;

    fn check_field(field: &str) -> std::result::Result<(), &'static str> {
        reject_namespace(field, "INFO", "genotype filters only see FORMAT values")?;
        reject_in(field, &FIXED_FIELDS, "genotype filters only see FORMAT values")?;
        reject_in(field, &SAMPLE_FIELDS, "sample identity belongs to sample filters")?;
        reject_in(field, &LINE_FIELDS, "genotype filters only see FORMAT values")?;
        reject_in(field, &VARIANT_FIELDS, "recomputed statistics are not available yet")
    }
}

impl ExprInput for VariantRecord {
    const STAGE: Stage = Stage::Line;

    fn check_field(field: &str) -> std::result::Result<(), &'static str> {
        reject_namespace(field, "FORMAT", "line filters do not see individual genotypes")?;
        reject_in(field, &GENOTYPE_FIELDS, "line filters do not see individual genotypes")?;
        reject_in(field, &SAMPLE_FIELDS, "sample identity belongs to sample filters")?;
        reject_in(field, &VARIANT_FIELDS, "recomputed statistics are only available to variant filters")
    }
}

impl ExprInput for Variant {
    const STAGE: Stage = Stage::Variant;

    fn check_field(field: &str) -> std::result::Result<(), &'static str> {
        reject_namespace(field, "FORMAT", "variant filters do not see individual genotypes")?;
        reject_in(field, &GENOTYPE_FIELDS, "variant filters do not see individual genotypes")?;
        reject_in(field, &SAMPLE_FIELDS, "sample identity belongs to sample filters")
    }
}

/// A filter driven by an expression such as `QUAL >= 30 && FILTER == "PASS"`.
pub struct ExprFilter<I> {
    text: String,
    expr: Expr,
    keep: bool,
    _input: PhantomData<fn(&I)>,
}

impl<I: ExprInput> ExprFilter<I> {
    pub fn new(text: &str, keep: bool) -> Result<Self> {
        Ok(Self {
            text: text.trim().to_string(),
            expr: parse_expr(text)?,
            keep,
            _input: PhantomData,
        })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl<I: ExprInput> Filter for ExprFilter<I> {
    type Input = I;

    fn name(&self) -> &str {
        "ExprFilter"
    }

    fn keep(&self) -> bool {
        self.keep
    }

    fn matches(&self, input: &I) -> Result<bool> {
        evaluate_predicate(&self.expr, input)
    }

    fn details(&self) -> Vec<(String, String)> {
        vec![("expr".to_string(), self.text.clone())]
    }

    fn validate(&self, stage: Stage) -> Result<()> {
        let config_error = |reason: String| VcfFilterError::FilterConfigurationError {
            filter: self.summary(),
            stage,
            reason,
        };
        if stage != I::STAGE {
            return Err(config_error(format!("expression was built for the {} stage", I::STAGE)));
        }
        for field in self.expr.fields() {
            I::check_field(&field).map_err(|reason| config_error(format!("{field}: {reason}")))?;
        }
        Ok(())
    }

    fn left_columns_only(&self) -> bool {
        I::STAGE == Stage::Quick
    }

    fn needs_genotypes(&self) -> bool {
        I::STAGE == Stage::Line && self.expr.fields().iter().any(|f| f == "N_CALLED")
    }
}

/// A genomic interval on one contig, 1-based and inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFilter {
    chrom: String,
    start: Option<u64>,
    end: Option<u64>,
    keep: bool,
}

impl RegionFilter {
    pub fn new(chrom: &str, start: Option<u64>, end: Option<u64>) -> Self {
        Self {
            chrom: chrom.to_string(),
            start,
            end,
            keep: true,
        }
    }

    /// Parse `chr1`, `chr1:100` or `chr1:100-200`.
    pub fn parse(text: &str) -> Result<Self> {
        let bad = |reason: &str| VcfFilterError::FilterParseError(format!("region {text:?}: {reason}"));
        let Some((chrom, range)) = text.split_once(':') else {
            return Ok(Self::new(text, None, None));
        };
        let parse_pos = |s: &str| s.replace(',', "").parse::<u64>().map_err(|_| bad("invalid position"));
        let (start, end) = match range.split_once('-') {
            Some((start, end)) => (parse_pos(start)?, Some(parse_pos(end)?)),
            None => (parse_pos(range)?, None),
        };
        if end.is_some_and(|end| end < start) {
            return Err(bad("end before start"));
        }
        Ok(Self::new(chrom, Some(start), end))
    }

    /// Invert the polarity, dropping records inside the region instead.
    pub fn exclude(mut self) -> Self {
        self.keep = false;
        self
    }

    pub fn contains(&self, chrom: &str, pos: u64) -> bool {
        chrom == self.chrom
            && self.start.is_none_or(|start| pos >= start)
            && self.end.is_none_or(|end| pos <= end)
    }

    /// On coordinate-sorted input, nothing after this record can fall inside.
    pub fn is_past(&self, chrom: &str, pos: u64) -> bool {
        chrom == self.chrom && self.end.is_some_and(|end| pos > end)
    }
}

impl Filter for RegionFilter {
    type Input = FixedColumns;

    fn name(&self) -> &str {
        "RegionFilter"
    }

    fn keep(&self) -> bool {
        self.keep
    }

    fn matches(&self, input: &FixedColumns) -> Result<bool> {
        Ok(self.contains(&input.chrom, input.pos))
    }

    fn details(&self) -> Vec<(String, String)> {
        let pos = |p: Option<u64>| p.map(|p| p.to_string()).unwrap_or_else(|| ".".to_string());
        vec![
            ("chrom".to_string(), self.chrom.clone()),
            ("start".to_string(), pos(self.start)),
            ("end".to_string(), pos(self.end)),
        ]
    }

    fn left_columns_only(&self) -> bool {
        true
    }
}

/// Keep or discard samples by name.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleNameFilter {
    names: Vec<String>,
    keep: bool,
}

impl SampleNameFilter {
    fn with_names<S: Into<String>>(names: impl IntoIterator<Item = S>, keep: bool) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for name in names.into_iter().map(Into::into) {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self {
            names: unique,
            keep,
        }
    }

    /// Keep only the named samples.
    pub fn keep<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::with_names(names, true)
    }

    /// Drop the named samples.
    pub fn discard<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::with_names(names, false)
    }
}

impl Filter for SampleNameFilter {
    type Input = Sample;

    fn name(&self) -> &str {
        "SampleNameFilter"
    }

    fn keep(&self) -> bool {
        self.keep
    }

    fn matches(&self, input: &Sample) -> Result<bool> {
        Ok(self.names.iter().any(|n| *n == input.name))
    }

    fn details(&self) -> Vec<(String, String)> {
        vec![("names".to_string(), self.names.join(";"))]
    }
}

/// Mask calls below a depth or genotype-quality threshold.
///
/// A call without DP (or GQ) is not held to that threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct GenotypeDepthFilter {
    min_depth: Option<u32>,
    min_quality: Option<u32>,
}

impl GenotypeDepthFilter {
    pub fn new(min_depth: Option<u32>, min_quality: Option<u32>) -> Self {
        Self {
            min_depth,
            min_quality,
        }
    }
}

impl Filter for GenotypeDepthFilter {
    type Input = Genotype;

    fn name(&self) -> &str {
        "GenotypeDepthFilter"
    }

    fn keep(&self) -> bool {
        true
    }

    fn matches(&self, input: &Genotype) -> Result<bool> {
        let meets = |min: Option<u32>, value: Option<u32>| match (min, value) {
            (Some(min), Some(value)) => value >= min,
            _ => true,
        };
        Ok(meets(self.min_depth, input.depth()) && meets(self.min_quality, input.quality()))
    }

    fn details(&self) -> Vec<(String, String)> {
        let bound = |b: Option<u32>| b.map(|b| b.to_string()).unwrap_or_else(|| ".".to_string());
        vec![
            ("min_dp".to_string(), bound(self.min_depth)),
            ("min_gq".to_string(), bound(self.min_quality)),
        ]
    }
}

/// Select variants by recomputed minor allele frequency, bounds inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct AlleleFrequencyFilter {
    min_maf: Option<f64>,
    max_maf: Option<f64>,
    keep: bool,
}

impl AlleleFrequencyFilter {
    pub fn new(min_maf: Option<f64>, max_maf: Option<f64>) -> Self {
        Self {
            min_maf,
            max_maf,
            keep: true,
        }
    }

    /// Drop the variants in range instead of keeping them.
    pub fn exclude(mut self) -> Self {
        self.keep = false;
        self
    }
}

impl Filter for AlleleFrequencyFilter {
    type Input = Variant;

    fn name(&self) -> &str {
        "AlleleFrequencyFilter"
    }

    fn keep(&self) -> bool {
        self.keep
    }

    fn matches(&self, input: &Variant) -> Result<bool> {
        let Some(maf) = input.maf() else {
            return Ok(false);
        };
        Ok(self.min_maf.is_none_or(|min| maf >= min) && self.max_maf.is_none_or(|max| maf <= max))
    }

    fn details(&self) -> Vec<(String, String)> {
        let bound = |b: Option<f64>| b.map(|b| b.to_string()).unwrap_or_else(|| ".".to_string());
        vec![
            ("min_maf".to_string(), bound(self.min_maf)),
            ("max_maf".to_string(), bound(self.max_maf)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::genotype::FormatLayout;
    use crate::header::VariantHeader;

    fn header() -> Arc<VariantHeader> {
        Arc::new(VariantHeader::new(vec!["S1".into(), "S2".into()], vec![]).unwrap())
    }

    fn record(line: &str) -> VariantRecord {
        VariantRecord::from_line(line, &header()).unwrap()
    }

    #[test]
    fn test_quick_expr_on_fixed_columns() {
        let filter = ExprFilter::<FixedColumns>::new(r#"QUAL >= 30 && FILTER == "PASS""#, true).unwrap();
        let good = record("chr1\t10\t.\tA\tG\t45\tPASS\tDP=3\tGT\t0/1\t0/0");
        let bad = record("chr1\t10\t.\tA\tG\t12\tPASS\tDP=3\tGT\t0/1\t0/0");
        assert!(filter.evaluate(good.fixed()).unwrap());
        assert!(!filter.evaluate(bad.fixed()).unwrap());
        assert!(filter.left_columns_only());
        filter.validate(Stage::Quick).unwrap();
    }

    #[test]
    fn test_stage_field_validation() {
        let quick = ExprFilter::<FixedColumns>::new("FORMAT.DP > 3", true).unwrap();
        assert!(matches!(
            quick.validate(Stage::Quick),
            Err(VcfFilterError::FilterConfigurationError { stage: Stage::Quick, .. })
        ));
        let quick = ExprFilter::<FixedColumns>::new("MAF < 0.01", true).unwrap();
        assert!(quick.validate(Stage::Quick).is_err());

        let line = ExprFilter::<VariantRecord>::new("N_CALLED >= 1 && INFO.DP > 3", true).unwrap();
        line.validate(Stage::Line).unwrap();
        assert!(line.validate(Stage::Variant).is_err());

        let genotype = ExprFilter::<Genotype>::new("INFO.DP > 3", false).unwrap();
        assert!(genotype.validate(Stage::Genotype).is_err());

        let sample = ExprFilter::<Sample>::new("QUAL > 3", true).unwrap();
        assert!(sample.validate(Stage::Sample).is_err());

        let variant = ExprFilter::<Variant>::new("MAF < 0.05 && AN >= 10", true).unwrap();
        variant.validate(Stage::Variant).unwrap();
    }

    #[test]
    fn test_call_counting_line_filters_need_genotypes() {
        let counting = ExprFilter::<VariantRecord>::new("N_SAMPLES > 1 && N_CALLED >= 1", true).unwrap();
        assert!(counting.needs_genotypes());
        let info_only = ExprFilter::<VariantRecord>::new("INFO.DP > 3", true).unwrap();
        assert!(!info_only.needs_genotypes());
        let quick = ExprFilter::<FixedColumns>::new("QUAL > 3", true).unwrap();
        assert!(!quick.needs_genotypes());
    }

    #[test]
    fn test_region_parse_and_contains() {
        let region = RegionFilter::parse("chr2:1,000-2,000").unwrap();
        assert!(region.contains("chr2", 1000));
        assert!(region.contains("chr2", 2000));
        assert!(!region.contains("chr2", 2001));
        assert!(!region.contains("chr1", 1500));
        assert!(region.is_past("chr2", 2001));
        assert!(!region.is_past("chr3", 1));
        assert_eq!(
            region.summary(),
            "RegionFilter{keep=true,chrom=chr2,start=1000,end=2000}"
        );

        let whole = RegionFilter::parse("chrX").unwrap();
        assert!(whole.contains("chrX", 1));
        assert!(!whole.is_past("chrX", u64::MAX));

        assert!(RegionFilter::parse("chr1:200-100").is_err());
        assert!(RegionFilter::parse("chr1:abc").is_err());
    }

    #[test]
    fn test_region_exclude() {
        let region = RegionFilter::new("chr1", Some(5), Some(10)).exclude();
        let inside = record("chr1\t7\t.\tA\tG\t.\t.\t.\tGT\t0/1\t0/0");
        assert!(!region.evaluate(inside.fixed()).unwrap());
        assert!(region.is_filter());
    }

    #[test]
    fn test_sample_name_filter_summary_keeps_order() {
        let filter = SampleNameFilter::discard(["B", "A", "B"]);
        assert_eq!(filter.summary(), "SampleNameFilter{keep=false,names=B;A}");
    }

    #[test]
    fn test_genotype_depth_filter() {
        let layout = Arc::new(FormatLayout::parse("GT:DP:GQ"));
        let filter = GenotypeDepthFilter::new(Some(10), Some(20));
        let deep = Genotype::parse(&layout, "0/1:15:30").unwrap();
        let shallow = Genotype::parse(&layout, "0/1:5:30").unwrap();
        let unknown = Genotype::parse(&layout, "0/1:.:.").unwrap();
        assert!(filter.evaluate(&deep).unwrap());
        assert!(!filter.evaluate(&shallow).unwrap());
        assert!(filter.evaluate(&unknown).unwrap());
        assert_eq!(
            filter.summary(),
            "GenotypeDepthFilter{keep=true,min_dp=10,min_gq=20}"
        );
    }
}
