//! # VCF Pipeline Library
//!
//! A multi-stage filter pipeline for VCF (Variant Call Format) records.
//!
//! ## Features
//!
//! - Quick filters on the fixed columns, run before any genotype is decoded
//! - Sample pruning computed once per run
//! - Genotype filters that mask individual calls
//! - Automatic removal of lines left without a variant call
//! - AC/AN/AF recomputation after genotypes change
//! - Variant filters on the recomputed allele frequencies
//! - Filter expressions with comparison, logical, list and containment operators
//! - Order-preserving parallel processing with rayon
//!
//! ## Example
//!
//! ```rust
//! use vcf_pipeline::{
//!     CancellationToken, GenotypeDepthFilter, Pipeline, PipelineOptions, SampleNameFilter, Stage,
//!     StagedFilter, VariantHeader,
//! };
//!
//! let header = VariantHeader::parse(concat!(
//!     "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth\">\n",
//!     "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA1\tNA2\tNA3\n",
//! ))
//! .unwrap();
//!
//! let filters = vec![
//!     StagedFilter::expr(Stage::Quick, r#"QUAL >= 30 && FILTER == "PASS""#, true).unwrap(),
//!     StagedFilter::sample(SampleNameFilter::discard(["NA2"])),
//!     StagedFilter::genotype(GenotypeDepthFilter::new(Some(10), None)),
//! ];
//! let pipeline = Pipeline::new(header, filters, PipelineOptions::default()).unwrap();
//!
//! let lines = [
//!     "chr1\t100\t.\tA\tG\t50\tPASS\tDP=30\tGT:DP\t0/1:12\t1/1:20\t0/0:15",
//!     "chr1\t200\t.\tC\tT\t12\tPASS\tDP=8\tGT:DP\t0/1:12\t0/0:20\t0/0:15",
//! ];
//! let mut out = Vec::new();
//! let report = pipeline
//!     .run(
//!         lines.iter().map(|l| Ok::<_, std::io::Error>(l.to_string())),
//!         |record| {
//!             out.push(record.to_line());
//!             Ok(())
//!         },
//!         &CancellationToken::new(),
//!     )
//!     .unwrap();
//!
//! assert_eq!(report.emitted, 1);
//! assert_eq!(
//!     out[0],
//!     "chr1\t100\t.\tA\tG\t50\tPASS\tDP=30;AC=1;AN=4;AF=0.25\tGT:DP\t0/1:12\t0/0:15"
//! );
//! ```
//!
//! ## Filter Expression Syntax
//!
//! ### Comparison Operators
//! - `==` Equal
//! - `!=` Not equal
//! - `>` Greater than
//! - `<` Less than
//! - `>=` Greater than or equal
//! - `<=` Less than or equal
//! - `contains` String containment
//! - `in` List membership, e.g. `CHROM in ["chr1", "chr2"]`
//!
//! ### Logical Operators
//! - `&&` Logical AND
//! - `||` Logical OR
//! - `!` Logical NOT
//!
//! ### Field Access
//! - `QUAL`, `FILTER`, `CHROM`, `POS` - Fixed VCF columns
//! - `DP`, `INFO.DP` - INFO field
//! - `GT`, `GQ`, `FORMAT.AD` - Genotype fields (genotype stage)
//! - `NAME`, `INDEX` - Sample identity (sample stage)
//! - `N_SAMPLES`, `N_CALLED` - Sample counts (line stage)
//! - `AC`, `AN`, `AF`, `MAF`, `MAF_BUCKET` - Recomputed statistics (variant stage)
//! - `ANN[0].Gene_Name` - First annotation's gene name
//! - `ANN[*].Annotation_Impact` - Any annotation's impact (wildcard)
//!
//! ### Functions
//! - `exists(field)` - Check if a field exists

/// Embedded README.md documentation
const README: &str = include_str!("../README.md");

/// Returns the embedded README.md documentation.
///
/// # Example
///
/// ```rust
/// use vcf_pipeline::docs;
///
/// assert!(docs().contains("vcf-pipeline"));
/// ```
pub fn docs() -> &'static str {
    README
}

pub mod error;
pub mod eval;
pub mod expr;
pub mod filter;
pub mod filters;
pub mod genotype;
pub mod header;
pub mod pipeline;
pub mod record;
pub mod sample;
pub mod stats;
pub mod value;

pub use error::{Result, VcfFilterError};
pub use eval::FieldSource;
pub use expr::{AccessPart, BinaryOp, Expr, UnaryOp, parse_expr};
pub use filter::{Filter, Stage, StagedFilter};
pub use filters::{
    AlleleFrequencyFilter, ExprFilter, GenotypeDepthFilter, RegionFilter, SampleNameFilter,
};
pub use genotype::{FormatLayout, Genotype};
pub use header::{FormatMap, InfoMap, MetaField, MetaNumber, MetaType, VariantHeader};
pub use pipeline::{
    CancellationToken, DropReason, Pipeline, PipelineOptions, Processed, RecomputePolicy,
    RunReport, Verdict,
};
pub use record::{FixedColumns, VariantRecord};
pub use sample::{Sample, SampleSelection};
pub use stats::{AlleleStats, MafBucket, Variant};
pub use value::Value;
