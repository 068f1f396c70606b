//! Allele statistics recomputed from genotypes, and the variant view
//! that variant filters see.

use std::fmt;

use crate::error::Result;
use crate::eval::FieldSource;
use crate::genotype::Genotype;
use crate::record::{FixedColumns, VariantRecord};
use crate::value::Value;

/// AC per alt allele and AN over all called alleles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlleleStats {
    ac: Vec<u32>,
    an: u32,
}

impl AlleleStats {
    pub fn new(ac: Vec<u32>, an: u32) -> Self {
        Self { ac, an }
    }

    /// Count alleles over `genotypes`.
    ///
    /// Missing calls and missing alleles contribute nothing. Allele indices
    /// beyond `n_alt` are counted in AN only.
    pub fn from_genotypes(genotypes: &[Genotype], n_alt: usize) -> Self {
        let mut ac = vec![0u32; n_alt];
        let mut an = 0u32;
        for allele in genotypes.iter().flat_map(Genotype::called_alleles) {
            an += 1;
            if allele > 0 {
                if let Some(count) = ac.get_mut(allele as usize - 1) {
                    *count += 1;
                }
            }
        }
        Self { ac, an }
    }

    /// Read AC/AN from INFO, for sites-only records.
    pub fn from_info(fixed: &FixedColumns) -> Option<Self> {
        let an = fixed.info_raw("AN")??.parse::<u32>().ok()?;
        let ac = match fixed.info_raw("AC")? {
            Some(raw) => raw
                .split(',')
                .map(|c| c.parse::<u32>().ok())
                .collect::<Option<Vec<_>>>()?,
            None => return None,
        };
        Some(Self { ac, an })
    }

    pub fn ac(&self) -> &[u32] {
        &self.ac
    }

    pub fn an(&self) -> u32 {
        self.an
    }

    /// AF per alt allele, `None` when no allele was called.
    pub fn af(&self) -> Option<Vec<f64>> {
        if self.an == 0 {
            return None;
        }
        Some(self.ac.iter().map(|&c| c as f64 / self.an as f64).collect())
    }

    /// One minus the frequency of the most common allele, reference included.
    pub fn maf(&self) -> Option<f64> {
        let af = self.af()?;
        let alt_total: f64 = af.iter().sum();
        let major = af.iter().copied().fold((1.0 - alt_total).max(0.0), f64::max);
        Some((1.0 - major).max(0.0))
    }

    /// Write AC, AN and AF into INFO. AF is removed when AN is zero.
    pub fn apply(&self, fixed: &mut FixedColumns) {
        if self.ac.is_empty() {
            fixed.remove_info("AC");
        } else {
            fixed.set_info("AC", Some(join(self.ac.iter().map(u32::to_string))));
        }
        fixed.set_info("AN", Some(self.an.to_string()));
        match self.af() {
            Some(af) if !af.is_empty() => {
                fixed.set_info("AF", Some(join(af.into_iter().map(format_frequency))))
            }
            _ => fixed.remove_info("AF"),
        }
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(",")
}

/// Six decimals with trailing zeros trimmed: `0.5`, `0.333333`, `0`.
fn format_frequency(value: f64) -> String {
    let text = format!("{value:.6}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Coarse minor allele frequency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MafBucket {
    /// No called alleles.
    Uncalled,
    Monomorphic,
    /// Below 1%.
    Rare,
    /// Below 5%.
    LowFrequency,
    Common,
}

impl MafBucket {
    pub fn from_maf(maf: Option<f64>) -> Self {
        match maf {
            None => MafBucket::Uncalled,
            Some(m) if m <= 0.0 => MafBucket::Monomorphic,
            Some(m) if m < 0.01 => MafBucket::Rare,
            Some(m) if m < 0.05 => MafBucket::LowFrequency,
            Some(_) => MafBucket::Common,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MafBucket::Uncalled => "uncalled",
            MafBucket::Monomorphic => "monomorphic",
            MafBucket::Rare => "rare",
            MafBucket::LowFrequency => "low_frequency",
            MafBucket::Common => "common",
        }
    }
}

impl fmt::Display for MafBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record with its allele statistics, as seen by variant filters.
#[derive(Debug, Clone)]
pub struct Variant {
    record: VariantRecord,
    stats: AlleleStats,
    maf: Option<f64>,
    bucket: MafBucket,
}

impl Variant {
    /// Derive statistics from the record's genotypes, decoding them if needed.
    /// Sites-only records fall back to INFO AC/AN.
    pub fn new(mut record: VariantRecord) -> Result<Self> {
        let n_alt = record.fixed().alt_alleles.len();
        let stats = if record.fixed().header().sample_count() == 0 {
            AlleleStats::from_info(record.fixed()).unwrap_or_else(|| AlleleStats::new(vec![0; n_alt], 0))
        } else {
            AlleleStats::from_genotypes(record.genotypes_mut()?, n_alt)
        };
        Ok(Self::with_stats(record, stats))
    }

    pub fn with_stats(record: VariantRecord, stats: AlleleStats) -> Self {
        let maf = stats.maf();
        Self {
            record,
            stats,
            maf,
            bucket: MafBucket::from_maf(maf),
        }
    }

    pub fn record(&self) -> &VariantRecord {
        &self.record
    }

    pub fn into_record(self) -> VariantRecord {
        self.record
    }

    pub fn stats(&self) -> &AlleleStats {
        &self.stats
    }

    pub fn maf(&self) -> Option<f64> {
        self.maf
    }

    pub fn bucket(&self) -> MafBucket {
        self.bucket
    }
}

impl FieldSource for Variant {
    fn field(&self, name: &str) -> Value {
        match name {
            "AC" => self.stats.ac.clone().into(),
            "AN" => self.stats.an.into(),
            "AF" => self.stats.af().into(),
            "MAF" => self.maf.into(),
            "MAF_BUCKET" => self.bucket.as_str().into(),
            other => self.record.field(other),
        }
    }

    fn info(&self, name: &str) -> Value {
        self.record.info(name)
    }

    fn subfields(&self, name: &str) -> Option<&[String]> {
        self.record.subfields(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::header::VariantHeader;

    fn calls(gts: &[&str]) -> Vec<Genotype> {
        let layout = Arc::new(crate::genotype::FormatLayout::parse("GT"));
        gts.iter().map(|g| Genotype::parse(&layout, g).unwrap()).collect()
    }

    #[test]
    fn test_counts_skip_missing_calls() {
        let stats = AlleleStats::from_genotypes(&calls(&["0/1", "0/0", "1/1", "./."]), 1);
        assert_eq!(stats.an(), 6);
        assert_eq!(stats.ac(), [3]);
        assert_eq!(stats.af(), Some(vec![0.5]));
    }

    #[test]
    fn test_masked_calls_contribute_nothing() {
        let mut genotypes = calls(&["0/1", "1/1"]);
        genotypes[1].set_missing();
        let stats = AlleleStats::from_genotypes(&genotypes, 1);
        assert_eq!(stats, AlleleStats::new(vec![1], 2));
    }

    #[test]
    fn test_multiallelic_and_partial() {
        let stats = AlleleStats::from_genotypes(&calls(&["1/2", "0/.", "2|2"]), 2);
        assert_eq!(stats.an(), 5);
        assert_eq!(stats.ac(), [1, 3]);
        assert_eq!(stats.maf(), Some(0.4));
    }

    #[test]
    fn test_no_called_alleles() {
        let stats = AlleleStats::from_genotypes(&calls(&["./.", "."]), 1);
        assert_eq!(stats.an(), 0);
        assert_eq!(stats.af(), None);
        assert_eq!(stats.maf(), None);
        assert_eq!(MafBucket::from_maf(stats.maf()), MafBucket::Uncalled);
    }

    #[test]
    fn test_apply_writes_info() {
        let header = Arc::new(VariantHeader::new(vec![], vec![]).unwrap());
        let line = "chr1\t5\t.\tA\tG,T\t.\tPASS\tDP=4;AF=0.9";
        let mut record = VariantRecord::from_line(line, &header).unwrap();
        AlleleStats::new(vec![1, 2], 6).apply(record.fixed_mut());
        assert_eq!(
            record.to_line(),
            "chr1\t5\t.\tA\tG,T\t.\tPASS\tDP=4;AF=0.166667,0.333333;AC=1,2;AN=6"
        );

        AlleleStats::new(vec![0, 0], 0).apply(record.fixed_mut());
        assert_eq!(record.to_line(), "chr1\t5\t.\tA\tG,T\t.\tPASS\tDP=4;AC=0,0;AN=0");
    }

    #[test]
    fn test_buckets() {
        assert_eq!(MafBucket::from_maf(Some(0.0)), MafBucket::Monomorphic);
        assert_eq!(MafBucket::from_maf(Some(0.005)), MafBucket::Rare);
        assert_eq!(MafBucket::from_maf(Some(0.02)), MafBucket::LowFrequency);
        assert_eq!(MafBucket::from_maf(Some(0.3)), MafBucket::Common);
    }

    #[test]
    fn test_variant_fields() {
        let header = Arc::new(
            VariantHeader::new(vec!["A".into(), "B".into()], vec![]).unwrap(),
        );
        let record =
            VariantRecord::from_line("chr1\t5\t.\tA\tG\t.\t.\t.\tGT\t0/1\t0/0", &header).unwrap();
        let variant = Variant::new(record).unwrap();
        assert_eq!(variant.field("AN"), Value::Number(4.0));
        assert_eq!(variant.field("MAF"), Value::Number(0.25));
        assert_eq!(variant.field("MAF_BUCKET"), Value::String("common".into()));
        assert_eq!(variant.field("POS"), Value::Number(5.0));
    }

    #[test]
    fn test_sites_only_uses_info() {
        let header = Arc::new(VariantHeader::new(vec![], vec![]).unwrap());
        let record =
            VariantRecord::from_line("chr1\t5\t.\tA\tG\t.\t.\tAC=1;AN=200", &header).unwrap();
        let variant = Variant::new(record).unwrap();
        assert_eq!(variant.stats(), &AlleleStats::new(vec![1], 200));
        assert_eq!(variant.bucket(), MafBucket::Rare);
    }
}
