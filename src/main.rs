//! Example usage of the vcf-pipeline library.

use std::io;

use tracing_subscriber::EnvFilter;
use vcf_pipeline::{
    AlleleFrequencyFilter, CancellationToken, GenotypeDepthFilter, Pipeline, PipelineOptions,
    RegionFilter, Result, SampleNameFilter, Stage, StagedFilter, VariantHeader, docs,
};

const VCF: &str = concat!(
    "##fileformat=VCFv4.2\n",
    "##contig=<ID=chr1>\n",
    "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total depth\">\n",
    "##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count\">\n",
    "##INFO=<ID=AN,Number=1,Type=Integer,Description=\"Allele number\">\n",
    "##INFO=<ID=ANN,Number=.,Type=String,Description=\"Functional annotations: 'Allele | Annotation | Annotation_Impact | Gene_Name'\">\n",
    "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n",
    "##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">\n",
    "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA001\tNA002\tNA003\tNA004\n",
    "chr1\t1000\trs1\tA\tG\t60\tPASS\tDP=80;AC=3;AN=8;ANN=G|missense_variant|MODERATE|GENE1\tGT:DP\t0/1:20\t0/0:25\t1/1:3\t0/1:30\n",
    "chr1\t2000\trs2\tC\tT\t15\tLowQual\tDP=12;AC=1;AN=8\tGT:DP\t0/1:4\t0/0:3\t0/0:2\t0/0:3\n",
    "chr1\t3000\t.\tG\tA\t99\tPASS\tDP=90;AC=1;AN=8\tGT:DP\t0/0:20\t0/0:25\t0/1:4\t0/0:30\n",
    "chr1\t4000\trs4\tT\tC,G\t80\tPASS\tDP=70;AC=2,1;AN=8\tGT:DP\t1/2:15\t0/1:25\t0/0:22\t./.:.\n",
    "chr1\t9000\trs9\tA\tT\t70\tPASS\tDP=60;AC=4;AN=8\tGT:DP\t1/1:15\t0/0:25\t1/1:22\t0/0:40\n",
);

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let (header_text, body): (Vec<&str>, Vec<&str>) =
        VCF.lines().partition(|line| line.starts_with('#'));
    let header = VariantHeader::parse(&header_text.join("\n"))?;

    let filters = vec![
        StagedFilter::expr(Stage::Quick, r#"FILTER == "PASS" && QUAL >= 30"#, true)?,
        StagedFilter::sample(SampleNameFilter::discard(["NA002"])),
        StagedFilter::genotype(GenotypeDepthFilter::new(Some(10), None)),
        StagedFilter::expr(Stage::Line, "N_CALLED >= 2", true)?,
        StagedFilter::variant(AlleleFrequencyFilter::new(Some(0.05), None)),
    ];
    let options = PipelineOptions {
        stop_past: Some(RegionFilter::parse("chr1:1-5000")?),
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(header, filters, options)?;

    println!("VCF Pipeline Demo");
    println!("=================\n");
    println!("Samples kept: {}", pipeline.header().samples().join(", "));
    for (stage, summary) in pipeline.provenance() {
        println!("  {stage:<14} {summary}");
    }
    println!();

    let report = pipeline.run_parallel(
        body.into_iter().map(|line| Ok::<_, io::Error>(line.to_string())),
        |record| {
            println!("{}", record.to_line());
            Ok(())
        },
        &CancellationToken::new(),
    )?;

    println!(
        "\nRead {} lines, emitted {}, dropped {} ({} without a variant call), malformed {}",
        report.lines_read,
        report.emitted,
        report.dropped(),
        report.dropped_non_variant,
        report.malformed
    );
    for (stage, count) in &report.dropped_by_stage {
        println!("  dropped at {stage}: {count}");
    }

    println!("\n\nEmbedded Documentation Preview");
    println!("===============================");
    let documentation = docs();
    let preview: String = documentation
        .lines()
        .take(10)
        .collect::<Vec<_>>()
        .join("\n");
    println!("{}", preview);

    Ok(())
}
