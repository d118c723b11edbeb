//! The thin process entry point: wires logging and configuration, then
//! calls straight into the library. Parsing alignments, references, or VCF
//! candidates is out of scope — `--candidates` and `--observations` are
//! pre-computed JSON fixtures standing in for the haplotype block and the
//! likelihood oracle.

use std::fs::File;
use std::path::PathBuf;
use std::process::exit;

use serde::Deserialize;
use structopt::StructOpt;

use cellcaller::cancellation::CancellationToken;
use cellcaller::config::Parameters;
use cellcaller::haplotype::HaplotypeBlock;
use cellcaller::testcase::LikelihoodTable;
use cellcaller::{CellCaller, RegionInputs, VariantCaller};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "cellcaller",
    about = "Clonal phylogeny inference and variant calling for single-cell somatic sequencing.",
    setting = structopt::clap::AppSettings::ColoredHelp,
)]
enum Opt {
    /// Run phylogeny search and variant calling over one region's fixtures.
    Call {
        /// YAML-encoded `Parameters` (§6).
        #[structopt(long, parse(from_os_str))]
        scenario: PathBuf,
        /// JSON fixture standing in for the haplotype block and sample list.
        #[structopt(long, parse(from_os_str))]
        candidates: PathBuf,
        /// JSON fixture standing in for the likelihood oracle.
        #[structopt(long, parse(from_os_str))]
        observations: PathBuf,
        /// Optional path to write the §3 SUPPLEMENT search diagnostic trace
        /// as CSV (one row per topology explored).
        #[structopt(long, parse(from_os_str))]
        trace_out: Option<PathBuf>,
    },
}

/// The candidates fixture: a haplotype block plus the ordered sample list it
/// was called against, bundled together since `Parameters` itself carries no
/// sample ordering (only name-keyed overrides, §6).
#[derive(Debug, Deserialize)]
struct CandidatesFixture {
    haplotype_block: HaplotypeBlock,
    samples: Vec<String>,
}

fn run(opt: Opt) -> anyhow::Result<()> {
    let Opt::Call {
        scenario,
        candidates,
        observations,
        trace_out,
    } = opt;

    let mut params: Parameters = serde_yaml::from_reader(File::open(&scenario)?)?;
    params.validate()?;

    let candidates: CandidatesFixture = serde_json::from_reader(File::open(&candidates)?)?;
    let likelihoods: LikelihoodTable = serde_json::from_reader(File::open(&observations)?)?;

    let num_haplotypes = candidates.haplotype_block.len();
    let caller = CellCaller::new(params);
    let inputs = RegionInputs {
        haplotype_block: candidates.haplotype_block,
        samples: candidates.samples,
        oracle: &likelihoods,
    };
    let cancel = CancellationToken::new();

    let latents = caller.infer_latents(&inputs, &cancel)?;

    if let Some(trace_out) = trace_out {
        let trace = latents.as_ref().map(|l| l.trace.as_slice()).unwrap_or(&[]);
        cellcaller::search::write_trace_csv(trace, File::create(trace_out)?)?;
    }

    let calls = match latents {
        Some(latents) => caller.call_variants(&latents, num_haplotypes),
        None => Vec::new(),
    };

    serde_json::to_writer_pretty(std::io::stdout(), &calls)?;
    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();

    fern::Dispatch::new()
        .level(log::LevelFilter::Info)
        .chain(std::io::stderr())
        .apply()
        .unwrap();

    exit(match run(opt) {
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
        Ok(()) => 0,
    })
}
