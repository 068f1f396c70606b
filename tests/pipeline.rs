//! End-to-end runs of the filter pipeline over generated VCF text.

use std::io;

use pretty_assertions::assert_eq;
use vcf_pipeline::{
    AlleleFrequencyFilter, CancellationToken, GenotypeDepthFilter, Pipeline, PipelineOptions,
    RegionFilter, SampleNameFilter, Stage, StagedFilter, VariantHeader, VariantRecord,
};

const SAMPLES: [&str; 4] = ["NA1", "NA2", "NA3", "NA4"];

fn header() -> VariantHeader {
    let mut text = String::from(
        "##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count\">\n\
         ##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Allele number\">\n\
         #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT",
    );
    for sample in SAMPLES {
        text.push('\t');
        text.push_str(sample);
    }
    VariantHeader::parse(&text).unwrap()
}

/// Deterministic synthetic lines with varying quality, depth and calls.
fn synthetic_lines(count: usize) -> Vec<String> {
    const CALLS: [&str; 5] = ["0/0", "0/1", "1/1", "./.", "0|1"];
    (0..count)
        .map(|i| {
            let qual = (i * 7) % 100;
            let samples: Vec<String> = (0..SAMPLES.len())
                .map(|s| format!("{}:{}", CALLS[(i + s * 3) % CALLS.len()], (i + s) % 40))
                .collect();
            format!(
                "chr1\t{}\t.\tA\tG\t{}\tPASS\tAC=1;AN=8\tGT:DP\t{}",
                i + 1,
                qual,
                samples.join("\t")
            )
        })
        .collect()
}

fn source(lines: &[String]) -> impl Iterator<Item = io::Result<String>> + '_ {
    lines.iter().cloned().map(Ok)
}

fn filters() -> Vec<StagedFilter> {
    vec![
        StagedFilter::expr(Stage::Quick, "QUAL >= 20", true).unwrap(),
        StagedFilter::sample(SampleNameFilter::discard(["NA3"])),
        StagedFilter::genotype(GenotypeDepthFilter::new(Some(5), None)),
        StagedFilter::expr(Stage::Line, "N_CALLED >= 1", true).unwrap(),
        StagedFilter::variant(AlleleFrequencyFilter::new(Some(0.1), None)),
    ]
}

fn collect(pipeline: &Pipeline, lines: &[String], parallel: bool) -> Vec<VariantRecord> {
    let mut out = Vec::new();
    let sink = |record: VariantRecord| -> vcf_pipeline::Result<()> {
        out.push(record);
        Ok(())
    };
    let token = CancellationToken::new();
    if parallel {
        pipeline.run_parallel(source(lines), sink, &token).unwrap();
    } else {
        pipeline.run(source(lines), sink, &token).unwrap();
    }
    out
}

#[test]
fn test_parallel_run_preserves_input_order() {
    let lines = synthetic_lines(1000);
    let options = PipelineOptions {
        batch_size: 37,
        threads: Some(4),
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(header(), filters(), options).unwrap();

    let parallel = collect(&pipeline, &lines, true);
    let sequential = collect(&pipeline, &lines, false);

    assert!(!parallel.is_empty());
    assert!(parallel.len() < lines.len());
    let positions: Vec<u64> = parallel.iter().map(|r| r.fixed().pos).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let parallel: Vec<String> = parallel.iter().map(VariantRecord::to_line).collect();
    let sequential: Vec<String> = sequential.iter().map(VariantRecord::to_line).collect();
    assert_eq!(parallel, sequential);
}

#[test]
fn test_emitted_records_match_pruned_header() {
    let lines = synthetic_lines(200);
    let pipeline = Pipeline::new(header(), filters(), PipelineOptions::default()).unwrap();
    assert_eq!(pipeline.header().samples(), ["NA1", "NA2", "NA4"]);

    for record in collect(&pipeline, &lines, false) {
        let genotypes = record.genotypes().unwrap();
        assert_eq!(genotypes.len(), pipeline.selection().len());
        assert_eq!(record.to_line().split('\t').count(), 9 + 3);
    }
}

#[test]
fn test_recomputed_statistics_example() {
    let pipeline = Pipeline::new(
        header(),
        vec![StagedFilter::genotype(GenotypeDepthFilter::new(Some(1), None))],
        PipelineOptions::default(),
    )
    .unwrap();
    let processed = pipeline
        .process_line("chr1\t100\t.\tA\tG\t50\tPASS\tAC=7;AN=8\tGT\t0/1\t0/0\t1/1\t./.")
        .unwrap();
    assert!(processed.is_emitted());
    assert_eq!(
        processed.record.to_line(),
        "chr1\t100\t.\tA\tG\t50\tPASS\tAC=3;AN=6;AF=0.5\tGT\t0/1\t0/0\t1/1\t./."
    );
}

#[test]
fn test_summaries_are_stable_across_runs() {
    let first = Pipeline::new(header(), filters(), PipelineOptions::default()).unwrap();
    let second = Pipeline::new(header(), filters(), PipelineOptions::default()).unwrap();
    assert_eq!(first.provenance(), second.provenance());

    let summaries: Vec<String> = first.provenance().into_iter().map(|(_, s)| s).collect();
    assert_eq!(
        summaries,
        vec![
            "ExprFilter{keep=true,expr=QUAL >= 20}",
            "SampleNameFilter{keep=false,names=NA3}",
            "GenotypeDepthFilter{keep=true,min_dp=5,min_gq=.}",
            "ExprFilter{keep=true,expr=N_CALLED >= 1}",
            "AlleleFrequencyFilter{keep=true,min_maf=0.1,max_maf=.}",
        ]
    );
}

#[test]
fn test_region_filter_with_early_stop() {
    let lines = synthetic_lines(500);
    let options = PipelineOptions {
        stop_past: Some(RegionFilter::parse("chr1:100-150").unwrap()),
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(
        header(),
        vec![StagedFilter::quick(RegionFilter::parse("chr1:100-150").unwrap())],
        options,
    )
    .unwrap();

    let mut positions = Vec::new();
    let report = pipeline
        .run_parallel(
            source(&lines),
            |record| {
                positions.push(record.fixed().pos);
                Ok(())
            },
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(positions, (100..=150).collect::<Vec<u64>>());
    assert!(report.stopped_past_region);
    assert_eq!(report.lines_read, 151);
    assert_eq!(report.dropped_by_stage.get(&Stage::Quick), Some(&99));
}
