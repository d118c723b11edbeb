//! The Likelihood Oracle (§2, §6) is an external collaborator: it returns
//! `log P(reads | haplotype)` per sample and haplotype. Combining those
//! per-haplotype likelihoods into a per-genotype likelihood — needed by the
//! variational engine (§4.4) — is in scope: we treat a genotype's reads as
//! drawn from a mixture over its constituent haplotype copies, weighted by
//! their allele fraction within the genotype.

use bio::stats::LogProb;

use crate::haplotype::Genotype;

/// `log P(reads | haplotype)` per sample and haplotype index.
pub trait LikelihoodOracle: Sync {
    fn log_likelihood(&self, sample: usize, haplotype: usize) -> LogProb;
}

/// `log P(reads | genotype)` as a log-sum-exp mixture over the genotype's
/// constituent haplotype copies, each weighted by its allele fraction
/// (`copy_count / ploidy`). This is the natural extension of a per-
/// haplotype oracle to a genotype when only an aggregate per-sample
/// log-likelihood is available per haplotype, rather than per read.
pub fn genotype_log_likelihood(
    oracle: &dyn LikelihoodOracle,
    sample: usize,
    genotype: &Genotype,
) -> LogProb {
    let ploidy = genotype.ploidy() as f64;
    let counts = genotype.haplotype_indices().fold(
        std::collections::BTreeMap::<usize, usize>::new(),
        |mut acc, idx| {
            *acc.entry(idx).or_insert(0) += 1;
            acc
        },
    );
    let terms: Vec<LogProb> = counts
        .into_iter()
        .map(|(idx, count)| {
            LogProb((count as f64 / ploidy).ln()) + oracle.log_likelihood(sample, idx)
        })
        .collect();
    LogProb::ln_sum_exp(&terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedOracle {
        values: Vec<Vec<LogProb>>, // [sample][haplotype]
    }
    impl LikelihoodOracle for FixedOracle {
        fn log_likelihood(&self, sample: usize, haplotype: usize) -> LogProb {
            self.values[sample][haplotype]
        }
    }

    #[test]
    fn homozygous_genotype_equals_single_haplotype_likelihood() {
        let oracle = FixedOracle {
            values: vec![vec![LogProb(-2.0), LogProb(-5.0)]],
        };
        let genotype = Genotype::from_indices(vec![0, 0]);
        let ll = genotype_log_likelihood(&oracle, 0, &genotype);
        assert!((ll.0 - (-2.0)).abs() < 1e-9);
    }
}
