//! Genotype Prior Provider (§6): assigns a log prior to each joint
//! genotype. Used at the phylogeny root (§4.3). Two concrete providers are
//! supplemented from `cell_caller.cpp`'s `make_prior_model`: a flat uniform
//! prior, and a coalescent-population-derived prior, selected by whether
//! `prior_model_params` was supplied (§6).

use bio::stats::LogProb;

use crate::haplotype::{Genotype, HaplotypeBlock};
use crate::priors::coalescent::CoalescentModel;

pub trait GenotypePriorModel: Sync {
    fn log_prior(&self, genotype: &Genotype) -> LogProb;
}

/// Flat prior over all genotypes; used when no coalescent parameters are
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformGenotypePrior;

impl GenotypePriorModel for UniformGenotypePrior {
    fn log_prior(&self, _genotype: &Genotype) -> LogProb {
        LogProb::ln_one()
    }
}

/// Prior derived from the coalescent population model: a genotype's log
/// prior is the sum, over its constituent haplotype copies, of that
/// haplotype's coalescent log probability within the block (independence
/// across ploidy slots is the same simplifying assumption a per-haplotype
/// `CoalescentGenotypePriorModel` makes).
pub struct CoalescentGenotypePrior<'a> {
    model: CoalescentModel,
    block: &'a HaplotypeBlock,
}

impl<'a> CoalescentGenotypePrior<'a> {
    pub fn new(model: CoalescentModel, block: &'a HaplotypeBlock) -> Self {
        CoalescentGenotypePrior { model, block }
    }
}

impl<'a> GenotypePriorModel for CoalescentGenotypePrior<'a> {
    fn log_prior(&self, genotype: &Genotype) -> LogProb {
        genotype
            .haplotype_indices()
            .map(|idx| self.model.log_prob(self.block, idx))
            .fold(LogProb::ln_one(), |acc, lp| acc + lp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_prior_is_constant() {
        let prior = UniformGenotypePrior;
        let a = Genotype::from_indices(vec![0, 0]);
        let b = Genotype::from_indices(vec![0, 1]);
        assert_eq!(prior.log_prior(&a), prior.log_prior(&b));
    }
}
