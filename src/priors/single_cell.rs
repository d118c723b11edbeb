//! Single-Cell Prior Model (§4.3): the tree-edge prior that turns the
//! per-haplotype Genotype Prior Provider and De Novo Mutation Provider into
//! a log prior over a child group's genotype given its parent's.

use bio::stats::LogProb;

use crate::haplotype::Genotype;
use crate::priors::genotype::GenotypePriorModel;
use crate::priors::mutation::DeNovoMutationModel;
use crate::utils::log_mix;

pub struct SingleCellPriorModel<'a> {
    genotype_prior: &'a dyn GenotypePriorModel,
    mutation_model: &'a dyn DeNovoMutationModel,
    /// Log probability that any given allele slot's transition is
    /// explained by a bare copy-number event rather than a point mutation
    /// (`log(somatic_cnv_mutation_rate)`, §6).
    copy_number_log_probability: LogProb,
}

impl<'a> SingleCellPriorModel<'a> {
    pub fn new(
        genotype_prior: &'a dyn GenotypePriorModel,
        mutation_model: &'a dyn DeNovoMutationModel,
        copy_number_log_probability: LogProb,
    ) -> Self {
        SingleCellPriorModel {
            genotype_prior,
            mutation_model,
            copy_number_log_probability,
        }
    }

    /// `log P(child | parent)` along a tree edge (§4.3), or the root prior
    /// when `parent` is `None`.
    pub fn log_prior(&self, parent: Option<&Genotype>, child: &Genotype) -> LogProb {
        match parent {
            None => self.genotype_prior.log_prior(child),
            Some(parent) => self.edge_log_prior(parent, child),
        }
    }

    fn edge_log_prior(&self, parent: &Genotype, child: &Genotype) -> LogProb {
        let parent_alleles: Vec<usize> = parent.haplotype_indices().collect();
        let child_alleles: Vec<usize> = child.haplotype_indices().collect();
        let shared = parent_alleles.len().min(child_alleles.len());

        let mut log_prior = LogProb::ln_one();
        for l in 0..shared {
            let log_mutation = self
                .mutation_model
                .log_mutation(parent_alleles[l], child_alleles[l]);
            log_prior = log_prior + log_mix(self.copy_number_log_probability, log_mutation);
        }
        // Surplus slots on either side reflect a ploidy change; they are
        // entirely explained by the copy-number event, with no mutation
        // term to mix in.
        let surplus = parent_alleles.len().max(child_alleles.len()) - shared;
        for _ in 0..surplus {
            log_prior = log_prior + self.copy_number_log_probability;
        }
        log_prior
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priors::genotype::UniformGenotypePrior;
    use crate::priors::mutation::UniformDeNovoModel;

    #[test]
    fn identical_genotype_is_more_probable_than_divergent_one() {
        let genotype_prior = UniformGenotypePrior;
        let mutation_model = UniformDeNovoModel::new(0.001, 4);
        let model = SingleCellPriorModel::new(&genotype_prior, &mutation_model, LogProb(0.01f64.ln()));

        let parent = Genotype::from_indices(vec![0, 0]);
        let same = Genotype::from_indices(vec![0, 0]);
        let different = Genotype::from_indices(vec![1, 1]);

        assert!(model.log_prior(Some(&parent), &same) > model.log_prior(Some(&parent), &different));
    }

    #[test]
    fn root_uses_genotype_prior_provider() {
        let genotype_prior = UniformGenotypePrior;
        let mutation_model = UniformDeNovoModel::new(0.001, 4);
        let model = SingleCellPriorModel::new(&genotype_prior, &mutation_model, LogProb(0.01f64.ln()));
        let root_genotype = Genotype::from_indices(vec![0, 1]);
        assert_eq!(model.log_prior(None, &root_genotype), LogProb::ln_one());
    }
}
