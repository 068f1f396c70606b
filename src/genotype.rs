//! Per-sample genotype calls.
//!
//! FORMAT field order may differ from line to line, so every genotype is
//! decoded against its own line's [`FormatLayout`]. The layout is shared by
//! all genotypes of a line through an `Arc`, which lets genotype filters
//! stay immutable while still resolving `FORMAT` keys by name.

use std::sync::Arc;

use crate::error::{Result, VcfFilterError};
use crate::eval::FieldSource;
use crate::value::Value;

/// Ordered FORMAT keys of one line (`GT:DP:GQ` ...).
#[derive(Debug, Clone, PartialEq)]
pub struct FormatLayout {
    keys: Vec<String>,
    gt: Option<usize>,
    dp: Option<usize>,
    gq: Option<usize>,
}

impl FormatLayout {
    pub fn parse(text: &str) -> Self {
        let keys: Vec<String> = if text.is_empty() || text == "." {
            Vec::new()
        } else {
            text.split(':').map(str::to_string).collect()
        };
        let find = |key: &str| keys.iter().position(|k| k == key);
        let (gt, dp, gq) = (find("GT"), find("DP"), find("GQ"));
        Self { keys, gt, dp, gq }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn has_gt(&self) -> bool {
        self.gt.is_some()
    }

    pub fn to_field_string(&self) -> String {
        if self.keys.is_empty() {
            ".".to_string()
        } else {
            self.keys.join(":")
        }
    }
}

/// One sample's call at one line.
#[derive(Debug, Clone, PartialEq)]
pub struct Genotype {
    layout: Arc<FormatLayout>,
    values: Vec<String>,
    alleles: Vec<Option<u32>>,
    phased: bool,
    depth: Option<u32>,
    quality: Option<u32>,
    missing: bool,
}

impl Genotype {
    /// Decode one sample column against the line's FORMAT layout.
    ///
    /// Trailing fields may be dropped, as VCF allows; extra fields are an error.
    pub fn parse(layout: &Arc<FormatLayout>, text: &str) -> Result<Self> {
        let values: Vec<String> = text.split(':').map(str::to_string).collect();
        if values.len() > layout.keys.len().max(1) {
            return Err(VcfFilterError::malformed(format!(
                "sample column {text:?} has more fields than FORMAT ({})",
                layout.keys.len()
            )));
        }

        let value_at = |idx: Option<usize>| idx.and_then(|i| values.get(i)).map(String::as_str);

        let (alleles, phased) = match value_at(layout.gt) {
            Some(gt) => parse_gt(gt)?,
            None => (Vec::new(), false),
        };
        let depth = parse_count(value_at(layout.dp), "DP")?;
        let quality = parse_count(value_at(layout.gq), "GQ")?;

        Ok(Self {
            layout: Arc::clone(layout),
            values,
            alleles,
            phased,
            depth,
            quality,
            missing: false,
        })
    }

    /// Build a call directly from alleles, with a `GT`-only layout.
    pub fn from_alleles(alleles: Vec<Option<u32>>, phased: bool) -> Self {
        let layout = Arc::new(FormatLayout::parse("GT"));
        let gt = format_gt(&alleles, phased);
        Self {
            layout,
            values: vec![gt],
            alleles,
            phased,
            depth: None,
            quality: None,
            missing: false,
        }
    }

    pub fn alleles(&self) -> &[Option<u32>] {
        &self.alleles
    }

    pub fn ploidy(&self) -> usize {
        self.alleles.len()
    }

    pub fn is_phased(&self) -> bool {
        self.phased
    }

    pub fn depth(&self) -> Option<u32> {
        self.depth
    }

    pub fn quality(&self) -> Option<u32> {
        self.quality
    }

    pub fn layout(&self) -> &FormatLayout {
        &self.layout
    }

    /// Raw value of a FORMAT key, if present in this column.
    pub fn raw_value(&self, key: &str) -> Option<&str> {
        self.layout
            .position(key)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Masked by a filter, or no allele was called in the first place.
    pub fn is_missing(&self) -> bool {
        self.missing || self.alleles.iter().all(Option::is_none)
    }

    /// Whether a genotype filter has masked this call.
    pub fn is_masked(&self) -> bool {
        self.missing
    }

    /// Mask the call. There is no way back within a line.
    pub fn set_missing(&mut self) {
        self.missing = true;
    }

    /// Every allele called and all of them reference.
    pub fn is_hom_ref(&self) -> bool {
        !self.is_missing() && self.alleles.iter().all(|a| *a == Some(0))
    }

    /// At least one called non-reference allele.
    pub fn has_alt(&self) -> bool {
        !self.is_missing() && self.alleles.iter().any(|a| matches!(a, Some(n) if *n > 0))
    }

    /// Alleles that count towards AC/AN. A masked call contributes nothing.
    pub fn called_alleles(&self) -> impl Iterator<Item = u32> + '_ {
        let alleles: &[Option<u32>] = if self.missing { &[] } else { &self.alleles };
        alleles.iter().filter_map(|a| *a)
    }

    /// Re-encode the sample column. Masked calls are written as `./.`
    /// (ploidy and phasing preserved), other fields are kept.
    pub fn to_field_string(&self) -> String {
        if !self.missing {
            return self.values.join(":");
        }
        let mut values = self.values.clone();
        if let Some(gt) = self.layout.gt {
            if values.len() <= gt {
                values.resize(gt + 1, ".".to_string());
            }
            values[gt] = format_gt(&vec![None; self.alleles.len().max(1)], self.phased);
        }
        values.join(":")
    }
}

fn parse_gt(text: &str) -> Result<(Vec<Option<u32>>, bool)> {
    let phased = text.contains('|');
    let alleles = text
        .split(['/', '|'])
        .map(|allele| match allele {
            "." => Ok(None),
            a => a.parse::<u32>().map(Some).map_err(|_| {
                VcfFilterError::malformed(format!("invalid allele {a:?} in GT {text:?}"))
            }),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((alleles, phased))
}

fn format_gt(alleles: &[Option<u32>], phased: bool) -> String {
    let sep = if phased { "|" } else { "/" };
    alleles
        .iter()
        .map(|a| a.map(|n| n.to_string()).unwrap_or_else(|| ".".to_string()))
        .collect::<Vec<_>>()
        .join(sep)
}

fn parse_count(raw: Option<&str>, key: &str) -> Result<Option<u32>> {
    match raw {
        None | Some(".") | Some("") => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| VcfFilterError::malformed(format!("invalid {key} value {v:?}"))),
    }
}

impl FieldSource for Genotype {
    fn field(&self, name: &str) -> Value {
        match name {
            "GT" => {
                if self.missing {
                    Value::Missing
                } else {
                    self.raw_value("GT").map(Value::from).unwrap_or(Value::Missing)
                }
            }
            "DP" => self.depth.into(),
            "GQ" => self.quality.into(),
            "PLOIDY" => self.ploidy().into(),
            "PHASED" => self.phased.into(),
            "MISSING" => self.is_missing().into(),
            other => self.format(other),
        }
    }

    fn format(&self, name: &str) -> Value {
        self.raw_value(name)
            .map(Value::from_list)
            .unwrap_or(Value::Missing)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn layout(text: &str) -> Arc<FormatLayout> {
        Arc::new(FormatLayout::parse(text))
    }

    #[test]
    fn test_parse_diploid_call() {
        let gt = Genotype::parse(&layout("GT:DP:GQ"), "0/1:25:99").unwrap();
        assert_eq!(gt.alleles(), [Some(0), Some(1)]);
        assert_eq!(gt.depth(), Some(25));
        assert_eq!(gt.quality(), Some(99));
        assert!(!gt.is_phased());
        assert!(gt.has_alt());
    }

    #[test]
    fn test_layout_order_varies_per_line() {
        let gt = Genotype::parse(&layout("GQ:GT:DP"), "40:1|1:7").unwrap();
        assert_eq!(gt.alleles(), [Some(1), Some(1)]);
        assert!(gt.is_phased());
        assert_eq!(gt.depth(), Some(7));
        assert_eq!(gt.quality(), Some(40));
    }

    #[test]
    fn test_trailing_fields_may_be_dropped() {
        let gt = Genotype::parse(&layout("GT:DP:GQ"), "0/0").unwrap();
        assert!(gt.is_hom_ref());
        assert_eq!(gt.depth(), None);
    }

    #[test]
    fn test_missing_and_partial_calls() {
        let missing = Genotype::parse(&layout("GT"), "./.").unwrap();
        assert!(missing.is_missing());
        assert!(!missing.is_hom_ref());

        let partial = Genotype::parse(&layout("GT"), "0/.").unwrap();
        assert!(!partial.is_missing());
        assert!(!partial.is_hom_ref());
        assert!(!partial.has_alt());
        assert_eq!(partial.called_alleles().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_polyploid_call() {
        let gt = Genotype::parse(&layout("GT"), "0/0/1/2").unwrap();
        assert_eq!(gt.ploidy(), 4);
        assert_eq!(gt.called_alleles().collect::<Vec<_>>(), vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_masking_is_one_way_and_reencodes() {
        let mut gt = Genotype::parse(&layout("GT:DP"), "0|1:12").unwrap();
        gt.set_missing();
        assert!(gt.is_missing());
        assert!(gt.is_masked());
        assert_eq!(gt.called_alleles().count(), 0);
        assert_eq!(gt.to_field_string(), ".|.:12");
    }

    #[test]
    fn test_invalid_values_are_malformed() {
        assert!(matches!(
            Genotype::parse(&layout("GT"), "0/x"),
            Err(VcfFilterError::MalformedRecord { .. })
        ));
        assert!(matches!(
            Genotype::parse(&layout("GT:DP"), "0/1:deep"),
            Err(VcfFilterError::MalformedRecord { .. })
        ));
        assert!(matches!(
            Genotype::parse(&layout("GT"), "0/1:5"),
            Err(VcfFilterError::MalformedRecord { .. })
        ));
    }

    #[test]
    fn test_field_source() {
        let gt = Genotype::parse(&layout("GT:AD:DP"), "0/1:10,5:15").unwrap();
        assert_eq!(gt.raw_value("GT"), Some("0/1"));
        assert_eq!(gt.field("DP"), Value::Number(15.0));
        assert_eq!(
            gt.format("AD"),
            Value::Array(vec![Value::Number(10.0), Value::Number(5.0)])
        );
        assert_eq!(gt.field("AD"), gt.format("AD"));
    }
}
