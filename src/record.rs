//! In-memory VCF records.
//!
//! A [`VariantRecord`] decodes its eight fixed columns up front and keeps
//! the FORMAT and sample columns as raw text until something actually needs
//! genotypes. Lines rejected on fixed columns alone never pay for genotype
//! parsing.

use std::sync::Arc;

use crate::error::{Result, VcfFilterError};
use crate::eval::FieldSource;
use crate::genotype::{FormatLayout, Genotype};
use crate::header::{MetaField, MetaNumber, MetaType, VariantHeader};
use crate::sample::SampleSelection;
use crate::value::Value;

/// The leftmost columns of a VCF line, CHROM through INFO.
#[derive(Debug, Clone)]
pub struct FixedColumns {
    pub chrom: String,
    pub pos: u64,
    pub id: Option<String>,
    pub ref_allele: String,
    pub alt_alleles: Vec<String>,
    pub qual: Option<f64>,
    pub filter: Vec<String>,
    info: Vec<(String, Option<String>)>,
    header: Arc<VariantHeader>,
}

impl FixedColumns {
    /// Decode the eight fixed columns of a line.
    pub fn from_columns(columns: &[&str; 8], header: &Arc<VariantHeader>) -> Result<Self> {
        let [chrom, pos, id, ref_allele, alt, qual, filter, info] = *columns;

        let pos = pos
            .parse::<u64>()
            .map_err(|e| VcfFilterError::malformed(format!("invalid POS {pos:?}: {e}")))?;

        let qual = match qual {
            "." => None,
            q => Some(
                q.parse::<f64>()
                    .map_err(|e| VcfFilterError::malformed(format!("invalid QUAL {q:?}: {e}")))?,
            ),
        };

        Ok(Self {
            chrom: chrom.to_string(),
            pos,
            id: (id != ".").then(|| id.to_string()),
            ref_allele: ref_allele.to_string(),
            alt_alleles: split_list(alt, ','),
            qual,
            filter: split_list(filter, ';'),
            info: parse_info_column(info),
            header: Arc::clone(header),
        })
    }

    pub fn header(&self) -> &VariantHeader {
        &self.header
    }

    /// INFO entries in column order; flags have no value.
    pub fn info_entries(&self) -> &[(String, Option<String>)] {
        &self.info
    }

    /// Raw INFO value; `Some(None)` for a flag that is present.
    pub fn info_raw(&self, key: &str) -> Option<Option<&str>> {
        self.info
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref())
    }

    /// INFO value typed through the header metadata when available.
    pub fn info_value(&self, key: &str) -> Value {
        match self.info_raw(key) {
            None => Value::Missing,
            Some(None) => Value::Bool(true),
            Some(Some(raw)) => match self.header.info().get(key) {
                Some(meta) => parse_info_value(raw, meta),
                None => parse_info_value_unknown(raw),
            },
        }
    }

    /// Set an INFO entry in place, appending it when absent.
    pub fn set_info(&mut self, key: &str, value: Option<String>) {
        match self.info.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.info.push((key.to_string(), value)),
        }
    }

    pub fn remove_info(&mut self, key: &str) {
        self.info.retain(|(k, _)| k != key);
    }

    fn write_columns(&self, out: &mut String) {
        let qual = self
            .qual
            .map(|q| q.to_string())
            .unwrap_or_else(|| ".".to_string());
        let columns = [
            self.chrom.clone(),
            self.pos.to_string(),
            self.id.clone().unwrap_or_else(|| ".".to_string()),
            self.ref_allele.clone(),
            join_list(&self.alt_alleles, ","),
            qual,
            join_list(&self.filter, ";"),
            self.info_column(),
        ];
        out.push_str(&columns.join("\t"));
    }

    fn info_column(&self) -> String {
        if self.info.is_empty() {
            return ".".to_string();
        }
        self.info
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={v}"),
                None => k.clone(),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    if raw == "." || raw.is_empty() {
        Vec::new()
    } else {
        raw.split(sep).map(str::to_string).collect()
    }
}

fn join_list(items: &[String], sep: &str) -> String {
    if items.is_empty() {
        ".".to_string()
    } else {
        items.join(sep)
    }
}

fn parse_info_column(raw: &str) -> Vec<(String, Option<String>)> {
    if raw == "." {
        return Vec::new();
    }
    raw.split(';')
        .filter(|field| !field.is_empty())
        .map(|field| match field.split_once('=') {
            Some((key, value)) => (key.to_string(), Some(value.to_string())),
            None => (field.to_string(), None),
        })
        .collect()
}

/// Parse an INFO value based on its declared type and number.
fn parse_info_value(raw: &str, field: &MetaField) -> Value {
    // Structured annotations: comma-separated entries of pipe-separated subfields.
    if let Some(ref subfield_names) = field.subfields {
        return Value::Array(
            raw.split(',')
                .map(|ann| {
                    let parts: Vec<&str> = ann.split('|').collect();
                    Value::Array(
                        (0..subfield_names.len())
                            .map(|i| {
                                parts
                                    .get(i)
                                    .map(|v| Value::String(v.to_string()))
                                    .unwrap_or(Value::Missing)
                            })
                            .collect(),
                    )
                })
                .collect(),
        );
    }

    match (&field.number, &field.field_type) {
        (MetaNumber::Flag, _) | (_, MetaType::Flag) => Value::Bool(true),
        (_, MetaType::Integer | MetaType::Float) => Value::from_list(raw),
        _ => {
            if raw.contains(',') && !raw.contains('|') {
                Value::Array(
                    raw.split(',')
                        .map(|s| Value::String(s.to_string()))
                        .collect(),
                )
            } else {
                Value::String(raw.to_string())
            }
        }
    }
}

/// Parse an INFO value when the header does not describe it.
fn parse_info_value_unknown(raw: &str) -> Value {
    if raw.contains(',') && !raw.contains('|') {
        return Value::from_list(raw);
    }
    Value::from_token(raw)
}

impl FieldSource for FixedColumns {
    fn field(&self, name: &str) -> Value {
        match name {
            "CHROM" => Value::String(self.chrom.clone()),
            "POS" => self.pos.into(),
            "ID" => self.id.clone().into(),
            "REF" => Value::String(self.ref_allele.clone()),
            "ALT" => list_value(&self.alt_alleles),
            "QUAL" => self.qual.into(),
            "FILTER" => list_value(&self.filter),
            other => self.info_value(other),
        }
    }

    fn info(&self, name: &str) -> Value {
        self.info_value(name)
    }

    fn subfields(&self, name: &str) -> Option<&[String]> {
        self.header.info().get(name)?.subfields.as_deref()
    }
}

fn list_value(items: &[String]) -> Value {
    match items {
        [] => Value::Missing,
        [single] => Value::String(single.clone()),
        many => Value::Array(many.iter().map(|s| Value::String(s.clone())).collect()),
    }
}

#[derive(Debug, Clone)]
enum GenotypeBlock {
    /// Sites-only line.
    Absent,
    /// FORMAT column and sample columns, still tab-joined.
    Raw(String),
    Decoded {
        layout: Arc<FormatLayout>,
        genotypes: Vec<Genotype>,
    },
}

/// One VCF line: fixed columns plus a lazily decoded genotype block.
#[derive(Debug, Clone)]
pub struct VariantRecord {
    fixed: FixedColumns,
    block: GenotypeBlock,
    selection: Option<SampleSelection>,
}

impl VariantRecord {
    /// Decode a tab-separated data line.
    ///
    /// Only the fixed columns are parsed here. The number of sample columns
    /// is checked against the header without decoding them.
    pub fn from_line(line: &str, header: &Arc<VariantHeader>) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(9, '\t');
        let mut columns = [""; 8];
        for (i, slot) in columns.iter_mut().enumerate() {
            *slot = parts.next().ok_or_else(|| {
                VcfFilterError::malformed(format!("expected at least 8 columns, got {i}"))
            })?;
        }
        let fixed = FixedColumns::from_columns(&columns, header)?;

        let expected = header.sample_count();
        let block = match parts.next() {
            None if expected == 0 => GenotypeBlock::Absent,
            None => {
                return Err(VcfFilterError::malformed(format!(
                    "expected {expected} sample columns, found none"
                )));
            }
            Some(tail) => {
                let found = tail.matches('\t').count();
                if found != expected {
                    return Err(VcfFilterError::malformed(format!(
                        "expected {expected} sample columns, found {found}"
                    )));
                }
                GenotypeBlock::Raw(tail.to_string())
            }
        };

        Ok(Self {
            fixed,
            block,
            selection: None,
        })
    }

    /// Build a record whose genotypes are already decoded.
    pub fn from_parts(fixed: FixedColumns, layout: FormatLayout, genotypes: Vec<Genotype>) -> Self {
        Self {
            fixed,
            block: GenotypeBlock::Decoded {
                layout: Arc::new(layout),
                genotypes,
            },
            selection: None,
        }
    }

    pub fn fixed(&self) -> &FixedColumns {
        &self.fixed
    }

    pub fn fixed_mut(&mut self) -> &mut FixedColumns {
        &mut self.fixed
    }

    pub fn is_genotype_block_decoded(&self) -> bool {
        !matches!(self.block, GenotypeBlock::Raw(_))
    }

    /// Number of sample columns after any pruning.
    pub fn sample_count(&self) -> usize {
        match &self.block {
            GenotypeBlock::Absent => 0,
            GenotypeBlock::Decoded { genotypes, .. } => genotypes.len(),
            GenotypeBlock::Raw(_) => self
                .selection
                .as_ref()
                .map(SampleSelection::len)
                .unwrap_or_else(|| self.fixed.header.sample_count()),
        }
    }

    /// Restrict the sample columns to `selection`, keeping header order.
    ///
    /// Undecoded blocks are pruned when they are decoded. Applying the same
    /// selection again is a no-op.
    pub fn prune_samples(&mut self, selection: &SampleSelection) -> Result<()> {
        if let Some(applied) = &self.selection {
            if applied == selection {
                return Ok(());
            }
            return Err(VcfFilterError::SampleColumnMismatch {
                expected: selection.total(),
                found: applied.len(),
            });
        }

        if let GenotypeBlock::Decoded { genotypes, .. } = &mut self.block {
            if genotypes.len() != selection.total() {
                return Err(VcfFilterError::SampleColumnMismatch {
                    expected: selection.total(),
                    found: genotypes.len(),
                });
            }
            let keep = selection.mask();
            let mut column = 0;
            genotypes.retain(|_| {
                let kept = keep[column];
                column += 1;
                kept
            });
        }

        self.selection = Some(selection.clone());
        Ok(())
    }

    /// Materialize genotypes, applying any pending sample pruning.
    pub fn decode_genotypes(&mut self) -> Result<()> {
        let decoded = match &self.block {
            GenotypeBlock::Raw(text) => Some(decode_block(text, self.selection.as_ref())?),
            _ => None,
        };
        if let Some(block) = decoded {
            self.block = block;
        }
        Ok(())
    }

    /// Decoded genotypes, or `None` while the block is still raw.
    pub fn genotypes(&self) -> Option<&[Genotype]> {
        match &self.block {
            GenotypeBlock::Absent => Some(&[]),
            GenotypeBlock::Raw(_) => None,
            GenotypeBlock::Decoded { genotypes, .. } => Some(genotypes),
        }
    }

    /// Decode if needed and hand out the genotypes for mutation.
    pub fn genotypes_mut(&mut self) -> Result<&mut [Genotype]> {
        self.decode_genotypes()?;
        match &mut self.block {
            GenotypeBlock::Decoded { genotypes, .. } => Ok(genotypes),
            _ => Ok(&mut []),
        }
    }

    /// Re-serialize the record as a tab-separated line.
    pub fn to_line(&self) -> String {
        let mut out = String::new();
        self.fixed.write_columns(&mut out);
        match &self.block {
            GenotypeBlock::Absent => {}
            GenotypeBlock::Raw(text) => match &self.selection {
                Some(selection) if !selection.is_all() => {
                    let mut columns = text.split('\t');
                    out.push('\t');
                    out.push_str(columns.next().unwrap_or("."));
                    let columns: Vec<&str> = columns.collect();
                    for &i in selection.indices() {
                        out.push('\t');
                        out.push_str(columns.get(i).copied().unwrap_or("."));
                    }
                }
                _ => {
                    out.push('\t');
                    out.push_str(text);
                }
            },
            GenotypeBlock::Decoded { layout, genotypes } => {
                out.push('\t');
                out.push_str(&layout.to_field_string());
                for genotype in genotypes {
                    out.push('\t');
                    out.push_str(&genotype.to_field_string());
                }
            }
        }
        out
    }
}

fn decode_block(text: &str, selection: Option<&SampleSelection>) -> Result<GenotypeBlock> {
    let mut columns = text.split('\t');
    let layout = Arc::new(FormatLayout::parse(columns.next().unwrap_or(".")));
    let columns: Vec<&str> = columns.collect();

    let genotypes = match selection {
        None => columns
            .iter()
            .map(|c| Genotype::parse(&layout, c))
            .collect::<Result<Vec<_>>>()?,
        Some(selection) => {
            if columns.len() != selection.total() {
                return Err(VcfFilterError::SampleColumnMismatch {
                    expected: selection.total(),
                    found: columns.len(),
                });
            }
            selection
                .indices()
                .iter()
                .map(|&i| Genotype::parse(&layout, columns[i]))
                .collect::<Result<Vec<_>>>()?
        }
    };

    Ok(GenotypeBlock::Decoded { layout, genotypes })
}

impl FieldSource for VariantRecord {
    fn field(&self, name: &str) -> Value {
        match name {
            "N_SAMPLES" => self.sample_count().into(),
            "N_CALLED" => self
                .genotypes()
                .map(|g| g.iter().filter(|g| !g.is_missing()).count())
                .into(),
            other => self.fixed.field(other),
        }
    }

    fn info(&self, name: &str) -> Value {
        self.fixed.info_value(name)
    }

    fn subfields(&self, name: &str) -> Option<&[String]> {
        self.fixed.subfields(name)
    }
}
