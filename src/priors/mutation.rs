//! De Novo Mutation Provider (§6): `log P(child genotype | parent genotype)`
//! along a tree edge, consumed allele-by-allele by [`crate::priors::single_cell`].
//! Generalized from `cell_caller.cpp`'s `DeNovoModel mutation_model_parameters`.

use bio::stats::LogProb;

pub trait DeNovoMutationModel: Sync {
    /// `log P(child_allele | parent_allele)` for a single haplotype slot.
    fn log_mutation(&self, parent_allele: usize, child_allele: usize) -> LogProb;
}

/// A uniform de novo mutation model: with probability `1 - rate` a haplotype
/// slot is inherited unchanged; otherwise it mutates to one of the other
/// `num_haplotypes - 1` candidate haplotypes uniformly at random.
#[derive(Debug, Clone, Copy)]
pub struct UniformDeNovoModel {
    rate: f64,
    num_haplotypes: usize,
}

impl UniformDeNovoModel {
    pub fn new(rate: f64, num_haplotypes: usize) -> Self {
        UniformDeNovoModel { rate, num_haplotypes }
    }
}

impl DeNovoMutationModel for UniformDeNovoModel {
    fn log_mutation(&self, parent_allele: usize, child_allele: usize) -> LogProb {
        if parent_allele == child_allele {
            LogProb((1.0 - self.rate).ln())
        } else if self.num_haplotypes > 1 {
            LogProb((self.rate / (self.num_haplotypes - 1) as f64).ln())
        } else {
            LogProb::ln_zero()
        }
    }
}
