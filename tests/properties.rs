//! Property-based tests for filter polarity, sample pruning and allele counting.

use std::sync::Arc;

use proptest::prelude::*;
use vcf_pipeline::{
    AlleleStats, ExprFilter, Filter, FixedColumns, Genotype, Pipeline, PipelineOptions, Sample,
    SampleNameFilter, SampleSelection, StagedFilter, VariantHeader, VariantRecord,
};

fn allele() -> impl Strategy<Value = Option<u32>> {
    prop_oneof![Just(None), (0u32..3).prop_map(Some)]
}

fn genotype() -> impl Strategy<Value = (Vec<Option<u32>>, bool, bool)> {
    (prop::collection::vec(allele(), 1..4), any::<bool>(), any::<bool>())
}

fn sample_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("S{i}")).collect()
}

proptest! {
    /// Property: flipping polarity flips the verdict and nothing else
    #[test]
    fn prop_polarity_inverts_verdict(qual in 0u32..200, threshold in 0u32..200) {
        let header = Arc::new(VariantHeader::new(vec![], vec![]).unwrap());
        let line = format!("chr1\t1\t.\tA\tG\t{qual}\tPASS\t.");
        let record = VariantRecord::from_line(&line, &header).unwrap();
        let text = format!("QUAL >= {threshold}");
        let keep = ExprFilter::<FixedColumns>::new(&text, true).unwrap();
        let discard = ExprFilter::<FixedColumns>::new(&text, false).unwrap();

        let fixed = record.fixed();
        prop_assert_eq!(keep.matches(fixed).unwrap(), discard.matches(fixed).unwrap());
        prop_assert_ne!(keep.evaluate(fixed).unwrap(), discard.evaluate(fixed).unwrap());
        prop_assert_eq!(keep.evaluate(fixed).unwrap(), qual >= threshold);
    }

    /// Property: pruning twice with the same filters changes nothing
    #[test]
    fn prop_sample_pruning_is_idempotent(
        count in 1usize..12,
        drop in prop::collection::vec(0usize..12, 0..6),
    ) {
        let header = VariantHeader::new(sample_names(count), vec![]).unwrap();
        let dropped: Vec<String> = drop.iter().map(|i| format!("S{i}")).collect();
        let filters: Vec<Box<dyn Filter<Input = Sample>>> =
            vec![Box::new(SampleNameFilter::discard(dropped.iter().map(String::as_str)))];

        let once = SampleSelection::compute(&header, &filters).unwrap();
        prop_assert!(once.indices().windows(2).all(|w| w[0] < w[1]));
        prop_assert!(once.names(&header).iter().all(|n| !dropped.iter().any(|d| d == n)));

        let pruned = header.select_samples(once.indices());
        let twice = SampleSelection::compute(&pruned, &filters).unwrap();
        prop_assert!(twice.is_all());
        prop_assert_eq!(twice.names(&pruned), once.names(&header));
    }

    /// Property: AN counts called alleles of unmasked calls, AC its non-reference share
    #[test]
    fn prop_allele_counts_ignore_missing(calls in prop::collection::vec(genotype(), 0..20)) {
        let genotypes: Vec<Genotype> = calls
            .iter()
            .map(|(alleles, phased, masked)| {
                let mut genotype = Genotype::from_alleles(alleles.clone(), *phased);
                if *masked {
                    genotype.set_missing();
                }
                genotype
            })
            .collect();
        let stats = AlleleStats::from_genotypes(&genotypes, 2);

        let called: Vec<u32> = calls
            .iter()
            .filter(|(_, _, masked)| !masked)
            .flat_map(|(alleles, _, _)| alleles.iter().flatten().copied())
            .collect();
        prop_assert_eq!(stats.an() as usize, called.len());
        prop_assert_eq!(
            stats.ac().iter().sum::<u32>() as usize,
            called.iter().filter(|a| **a > 0).count()
        );
        match stats.af() {
            None => prop_assert_eq!(stats.an(), 0),
            Some(af) => prop_assert!(af.iter().all(|f| (0.0..=1.0).contains(f))),
        }
    }

    /// Property: emitted records always carry exactly the selected samples
    #[test]
    fn prop_emitted_width_matches_selection(
        calls in prop::collection::vec(0usize..3, 5),
        drop in prop::collection::vec(0usize..5, 0..5),
    ) {
        let header = VariantHeader::new(sample_names(5), vec![]).unwrap();
        let dropped: Vec<String> = drop.iter().map(|i| format!("S{i}")).collect();
        let pipeline = Pipeline::new(
            header,
            vec![StagedFilter::sample(SampleNameFilter::discard(dropped.iter().map(String::as_str)))],
            PipelineOptions::default(),
        )
        .unwrap();

        let gts: Vec<&str> = calls.iter().map(|c| ["0/0", "0/1", "./."][*c]).collect();
        let line = format!("chr1\t7\t.\tC\tT\t.\t.\t.\tGT\t{}", gts.join("\t"));
        let processed = pipeline.process_line(&line).unwrap();
        let width = processed.record.genotypes().map(<[Genotype]>::len);
        prop_assert_eq!(width, Some(pipeline.selection().len()));
        if processed.is_emitted() {
            prop_assert_eq!(
                processed.record.to_line().split('\t').count(),
                9 + pipeline.header().sample_count()
            );
        }
    }
}
