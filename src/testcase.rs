//! Testcase fixtures (AMBIENT — Test tooling): a serializable snapshot of one
//! region's inputs for regression replay, generalized from a BAM/VCF-backed
//! `Testcase` (which snapshots read slices and a candidate record under a
//! `prefix` directory) to this core's in-memory inputs: a haplotype block,
//! an ordered sample list, a dense per-sample/per-haplotype likelihood table
//! standing in for the oracle (§1 Non-goals: the pair-HMM itself stays
//! external), and the [`Parameters`] the region was run with.
//!
//! Supports both a human-readable `serde_json` form (for hand-authored or
//! diffable fixtures) and a compact `bincode` form (for regression corpora),
//! the same two-format split used across a CLI and its testcase module.

use std::fs::File;
use std::io::{Read as IoRead, Write};
use std::path::Path;

use bio::stats::LogProb;
use serde::{Deserialize, Serialize};

use crate::config::Parameters;
use crate::errors::Error;
use crate::haplotype::HaplotypeBlock;
use crate::likelihood::LikelihoodOracle;

/// A dense `[sample][haplotype]` log-likelihood table: the recorded output
/// of a likelihood oracle for one region, replayed without needing the
/// aligner or pair-HMM that originally produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodTable {
    values: Vec<Vec<f64>>,
}

impl LikelihoodTable {
    pub fn new(values: Vec<Vec<f64>>) -> Self {
        LikelihoodTable { values }
    }
}

impl LikelihoodOracle for LikelihoodTable {
    fn log_likelihood(&self, sample: usize, haplotype: usize) -> LogProb {
        LogProb(self.values[sample][haplotype])
    }
}

/// A full region snapshot: everything [`crate::RegionInputs`] needs plus the
/// [`Parameters`] it was run with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Testcase {
    pub haplotype_block: HaplotypeBlock,
    pub samples: Vec<String>,
    pub likelihoods: LikelihoodTable,
    pub params: Parameters,
}

impl Testcase {
    pub fn new(
        haplotype_block: HaplotypeBlock,
        samples: Vec<String>,
        likelihoods: LikelihoodTable,
        params: Parameters,
    ) -> Self {
        Testcase {
            haplotype_block,
            samples,
            likelihoods,
            params,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path.as_ref()).map_err(|e| Error::TestcaseIo(e.to_string()))?;
        serde_json::to_writer_pretty(file, self).map_err(|e| Error::TestcaseIo(e.to_string()))
    }

    pub fn read_json(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path.as_ref()).map_err(|e| Error::TestcaseIo(e.to_string()))?;
        serde_json::from_reader(file).map_err(|e| Error::TestcaseIo(e.to_string()))
    }

    pub fn write_bincode(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let mut file = File::create(path.as_ref()).map_err(|e| Error::TestcaseIo(e.to_string()))?;
        let bytes = bincode::serialize(self).map_err(|e| Error::TestcaseIo(e.to_string()))?;
        file.write_all(&bytes).map_err(|e| Error::TestcaseIo(e.to_string()))
    }

    pub fn read_bincode(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut file = File::open(path.as_ref()).map_err(|e| Error::TestcaseIo(e.to_string()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| Error::TestcaseIo(e.to_string()))?;
        bincode::deserialize(&bytes).map_err(|e| Error::TestcaseIo(e.to_string()))
    }
}
