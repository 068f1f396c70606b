//! VCF header model.
//!
//! The header is built once per run, before any line is processed, and is
//! shared read-only (behind an `Arc`) by every stage afterwards. Besides the
//! sample order and contig list it keeps INFO/FORMAT metadata so that INFO
//! values can be typed and structured annotations (ANN, LOF, NMD) can be
//! addressed by subfield name.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, VcfFilterError};

/// The number of values a meta field can have.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaNumber {
    /// A fixed number of values.
    Count(usize),
    /// One value per alternate allele (A).
    PerAltAllele,
    /// One value per possible genotype (G).
    PerGenotype,
    /// One value per allele including reference (R).
    PerAllele,
    /// Variable number of values (.).
    Variable,
    /// Flag type (0 values, presence indicates true).
    Flag,
}

/// The data type of a meta field.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

/// Metadata for a single `##INFO` or `##FORMAT` line.
#[derive(Debug, Clone)]
pub struct MetaField {
    /// The field identifier (e.g. "ANN", "DP").
    pub id: String,
    pub number: MetaNumber,
    pub field_type: MetaType,
    pub description: String,
    /// Subfield names for structured fields (e.g. ANN), taken from the
    /// quoted format specification in the description.
    pub subfields: Option<Vec<String>>,
}

impl MetaField {
    pub fn new(id: &str, number: MetaNumber, field_type: MetaType, description: &str) -> Self {
        Self {
            id: id.to_string(),
            number,
            field_type,
            description: description.to_string(),
            subfields: extract_subfields(description),
        }
    }
}

/// Map of INFO field ID to its metadata.
pub type InfoMap = HashMap<String, MetaField>;

/// Map of FORMAT field ID to its metadata.
pub type FormatMap = HashMap<String, MetaField>;

/// The parsed header shared by every stage of a run.
#[derive(Debug, Clone, Default)]
pub struct VariantHeader {
    samples: Vec<String>,
    contigs: Vec<String>,
    info: InfoMap,
    format: FormatMap,
}

impl VariantHeader {
    /// Build a header from sample names and contigs.
    ///
    /// Sample names must be unique.
    pub fn new(samples: Vec<String>, contigs: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(samples.len());
        for name in &samples {
            if !seen.insert(name.as_str()) {
                return Err(VcfFilterError::HeaderParseError(format!(
                    "duplicate sample name {name}"
                )));
            }
        }
        Ok(Self {
            samples,
            contigs,
            info: InfoMap::new(),
            format: FormatMap::new(),
        })
    }

    /// Parse `##INFO`, `##FORMAT`, `##contig` and the `#CHROM` line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut info = InfoMap::new();
        let mut format = FormatMap::new();
        let mut contigs = Vec::new();
        let mut samples = None;

        for line in text.lines() {
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(content) = meta_content(line, "##INFO=<") {
                if let Some(field) = parse_meta_line(content) {
                    info.insert(field.id.clone(), field);
                }
            } else if let Some(content) = meta_content(line, "##FORMAT=<") {
                if let Some(field) = parse_meta_line(content) {
                    format.insert(field.id.clone(), field);
                }
            } else if let Some(content) = meta_content(line, "##contig=<") {
                if let Some(id) = parse_attrs(content).remove("ID") {
                    contigs.push(id);
                }
            } else if line.starts_with("#CHROM") {
                samples = Some(parse_column_line(line)?);
            }
        }

        let samples = samples
            .ok_or_else(|| VcfFilterError::HeaderParseError("missing #CHROM line".to_string()))?;
        let mut header = Self::new(samples, contigs)?;
        header.info = info;
        header.format = format;
        Ok(header)
    }

    /// Register INFO metadata, replacing any field with the same ID.
    pub fn with_info(mut self, field: MetaField) -> Self {
        self.info.insert(field.id.clone(), field);
        self
    }

    /// Register FORMAT metadata, replacing any field with the same ID.
    pub fn with_format(mut self, field: MetaField) -> Self {
        self.format.insert(field.id.clone(), field);
        self
    }

    /// A copy of this header keeping only the samples at `indices`.
    ///
    /// `indices` must be ascending and in range; the result keeps header order.
    pub fn select_samples(&self, indices: &[usize]) -> Self {
        Self {
            samples: indices
                .iter()
                .filter_map(|&i| self.samples.get(i).cloned())
                .collect(),
            contigs: self.contigs.clone(),
            info: self.info.clone(),
            format: self.format.clone(),
        }
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn sample_index(&self, name: &str) -> Option<usize> {
        self.samples.iter().position(|s| s == name)
    }

    pub fn contigs(&self) -> &[String] {
        &self.contigs
    }

    pub fn info(&self) -> &InfoMap {
        &self.info
    }

    pub fn format(&self) -> &FormatMap {
        &self.format
    }
}

fn meta_content<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.trim().strip_prefix(prefix)?.strip_suffix('>')
}

/// Sample names are the columns after FORMAT on the `#CHROM` line.
fn parse_column_line(line: &str) -> Result<Vec<String>> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() < 8 {
        return Err(VcfFilterError::HeaderParseError(format!(
            "#CHROM line has {} columns, expected at least 8",
            columns.len()
        )));
    }
    Ok(columns.iter().skip(9).map(|s| s.to_string()).collect())
}

fn parse_number(s: &str) -> MetaNumber {
    match s {
        "A" => MetaNumber::PerAltAllele,
        "G" => MetaNumber::PerGenotype,
        "R" => MetaNumber::PerAllele,
        "." => MetaNumber::Variable,
        "0" => MetaNumber::Flag,
        _ => MetaNumber::Count(s.parse().unwrap_or(1)),
    }
}

fn parse_type(s: &str) -> MetaType {
    match s {
        "Integer" => MetaType::Integer,
        "Float" => MetaType::Float,
        "Flag" => MetaType::Flag,
        "Character" => MetaType::Character,
        _ => MetaType::String,
    }
}

/// Parse the key=value pairs inside the angle brackets of a meta line.
fn parse_attrs(content: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut remaining = content;

    while let Some(eq_pos) = remaining.find('=') {
        let key = remaining[..eq_pos].trim();
        remaining = &remaining[eq_pos + 1..];

        let value = if let Some(quoted) = remaining.strip_prefix('"') {
            let end_quote = quoted.find('"').unwrap_or(quoted.len());
            let val = &quoted[..end_quote];
            remaining = &quoted[(end_quote + 1).min(quoted.len())..];
            remaining = remaining.strip_prefix(',').unwrap_or(remaining);
            val
        } else {
            let comma_pos = remaining.find(',').unwrap_or(remaining.len());
            let val = &remaining[..comma_pos];
            remaining = remaining.get(comma_pos + 1..).unwrap_or("");
            val
        };

        attrs.insert(key.to_string(), value.to_string());
    }

    attrs
}

/// Extract subfield names from a description such as
/// `"Functional annotations: 'Allele | Annotation | Annotation_Impact'"`.
fn extract_subfields(description: &str) -> Option<Vec<String>> {
    let start = description.find('\'')?;
    let end = description[start + 1..].find('\'')? + start + 1;
    let format_str = &description[start + 1..end];

    if !format_str.contains('|') {
        return None;
    }

    let subfields: Vec<String> = format_str
        .split('|')
        .map(|s| s.trim().replace([' ', '.', '/'], "_"))
        .filter(|s| !s.is_empty())
        .collect();

    (subfields.len() >= 2).then_some(subfields)
}

fn parse_meta_line(content: &str) -> Option<MetaField> {
    let attrs = parse_attrs(content);
    let id = attrs.get("ID")?;
    let number = parse_number(attrs.get("Number")?);
    let field_type = parse_type(attrs.get("Type")?);
    let description = attrs.get("Description").map(String::as_str).unwrap_or("");
    Some(MetaField::new(id, number, field_type, description))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const HEADER: &str = concat!(
        "##fileformat=VCFv4.2\n",
        "##contig=<ID=chr1,length=248956422>\n",
        "##contig=<ID=chr2,length=242193529>\n",
        "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth\">\n",
        "##INFO=<ID=AF,Number=A,Type=Float,Description=\"Allele frequency\">\n",
        "##INFO=<ID=LOF,Number=.,Type=String,Description=\"Predicted loss of function effects for this variant. Format: 'Gene_Name | Gene_ID | Number_of_transcripts_in_gene | Percent_of_transcripts_affected'\">\n",
        "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n",
        "##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype quality\">\n",
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3\n",
    );

    #[test]
    fn test_parse_samples_and_contigs() {
        let header = VariantHeader::parse(HEADER).unwrap();
        assert_eq!(header.samples(), ["S1", "S2", "S3"]);
        assert_eq!(header.contigs(), ["chr1", "chr2"]);
        assert_eq!(header.sample_index("S2"), Some(1));
    }

    #[test]
    fn test_parse_meta_fields() {
        let header = VariantHeader::parse(HEADER).unwrap();
        let dp = header.info().get("DP").unwrap();
        assert_eq!(dp.number, MetaNumber::Count(1));
        assert_eq!(dp.field_type, MetaType::Integer);
        assert_eq!(header.info().get("AF").unwrap().number, MetaNumber::PerAltAllele);
        assert!(header.format().contains_key("GQ"));
    }

    #[test]
    fn test_parse_lof_with_subfields() {
        let header = VariantHeader::parse(HEADER).unwrap();
        let subfields = header.info().get("LOF").unwrap().subfields.clone().unwrap();
        assert_eq!(subfields.len(), 4);
        assert_eq!(subfields[0], "Gene_Name");
        assert_eq!(subfields[1], "Gene_ID");
    }

    #[test]
    fn test_subfield_names_are_normalised() {
        let field = MetaField::new(
            "ANN",
            MetaNumber::Variable,
            MetaType::String,
            "Functional annotations: 'Allele | HGVS.c | cDNA.pos / cDNA.length'",
        );
        assert_eq!(
            field.subfields.unwrap(),
            vec!["Allele", "HGVS_c", "cDNA_pos___cDNA_length"]
        );
    }

    #[test]
    fn test_duplicate_samples_rejected() {
        let err = VariantHeader::new(vec!["A".into(), "A".into()], vec![]).unwrap_err();
        assert!(matches!(err, VcfFilterError::HeaderParseError(_)));
    }

    #[test]
    fn test_missing_chrom_line_rejected() {
        let err = VariantHeader::parse("##fileformat=VCFv4.2\n").unwrap_err();
        assert!(matches!(err, VcfFilterError::HeaderParseError(_)));
    }

    #[test]
    fn test_select_samples_keeps_order() {
        let header = VariantHeader::parse(HEADER).unwrap();
        let pruned = header.select_samples(&[0, 2]);
        assert_eq!(pruned.samples(), ["S1", "S3"]);
        assert_eq!(pruned.contigs(), header.contigs());
    }
}
