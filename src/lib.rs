//! cellcaller — clonal phylogeny inference and variant calling for
//! single-cell somatic sequencing (§1).
//!
//! This crate is the core: phylogeny search (§4.5), the single-cell
//! variational model (§4.4), and posterior aggregation/calling (§4.7, §4.8).
//! Read alignment, haplotype enumeration, the pair-HMM likelihood, and
//! VCF/process I/O are external collaborators, consumed here only through
//! their interfaces (§1, §6).

#[macro_use]
extern crate lazy_static;

pub mod aggregate;
pub mod calling;
pub mod cancellation;
pub mod config;
pub mod copy_number;
pub mod dedup;
pub mod engine;
pub mod errors;
pub mod genotype_enum;
pub mod genotype_set;
pub mod haplotype;
pub mod likelihood;
pub mod phylogeny;
pub mod priors;
pub mod search;
pub mod testcase;
pub mod utils;

use crate::aggregate::Latents;
use crate::cancellation::CancellationToken;
use crate::calling::VariantCall;
use crate::config::Parameters;
use crate::copy_number::CopyNumberExtension;
use crate::dedup::{deduplicate_structural, deduplicate_with_prior_model};
use crate::engine::VariationalEngine;
use crate::errors::Error;
use crate::genotype_set::CombinedGenotypeSet;
use crate::haplotype::{generate_all_genotypes, HaplotypeBlock};
use crate::likelihood::LikelihoodOracle;
use crate::priors::coalescent::CoalescentModel;
use crate::priors::genotype::{CoalescentGenotypePrior, GenotypePriorModel, UniformGenotypePrior};
use crate::priors::mutation::{DeNovoMutationModel, UniformDeNovoModel};
use crate::priors::single_cell::SingleCellPriorModel;
use crate::search::SearchParams;

/// Everything the core needs for one genomic region (§6 Inputs), minus the
/// configuration (carried separately as [`Parameters`]).
pub struct RegionInputs<'a> {
    pub haplotype_block: HaplotypeBlock,
    pub samples: Vec<String>,
    pub oracle: &'a dyn LikelihoodOracle,
}

/// The capability interface design note 9 prescribes in place of a
/// "Caller base + derived" class hierarchy: a cell caller is one
/// implementation, others (bulk, germline, ...) would be independent types
/// sharing this same surface, not subclasses of a shared base.
pub trait VariantCaller {
    fn min_ploidy(&self) -> usize;
    fn max_ploidy(&self) -> usize;
    fn remove_duplicates(&self, block: &HaplotypeBlock) -> HaplotypeBlock;
    fn infer_latents(&self, inputs: &RegionInputs<'_>, cancel: &CancellationToken) -> Result<Option<Latents>, Error>;
    fn call_variants(&self, latents: &Latents, num_haplotypes: usize) -> Vec<VariantCall>;
    /// Always empty: this caller does not emit reference blocks (§1 Non-goals).
    fn call_reference(&self) -> Vec<VariantCall>;
}

/// The single-cell somatic variant caller (§1-§4).
pub struct CellCaller {
    params: Parameters,
}

impl CellCaller {
    pub fn new(params: Parameters) -> Self {
        CellCaller { params }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    fn genotype_prior_model<'a>(&self, block: &'a HaplotypeBlock) -> Box<dyn GenotypePriorModel + 'a> {
        // `cell_caller.cpp:777-787`'s `make_prior_model`: coalescent when
        // population-prior parameters are configured, flat otherwise.
        match self.params.prior_model_params() {
            Some(coalescent_params) => {
                let model = CoalescentModel::from(*coalescent_params);
                Box::new(CoalescentGenotypePrior::new(model, block))
            }
            None => Box::new(UniformGenotypePrior),
        }
    }
}

impl VariantCaller for CellCaller {
    fn min_ploidy(&self) -> usize {
        self.params.ploidy().saturating_sub(*self.params.max_copy_loss())
    }

    fn max_ploidy(&self) -> usize {
        self.params.ploidy() + self.params.max_copy_gain()
    }

    fn remove_duplicates(&self, block: &HaplotypeBlock) -> HaplotypeBlock {
        if *self.params.deduplicate_haplotypes_with_prior_model() && block.len() >= 2 {
            let model = self
                .params
                .prior_model_params()
                .map(CoalescentModel::from)
                .unwrap_or_else(|| CoalescentModel::new(1.0));
            deduplicate_with_prior_model(block, &model)
        } else {
            deduplicate_structural(block)
        }
    }

    fn infer_latents(&self, inputs: &RegionInputs<'_>, cancel: &CancellationToken) -> Result<Option<Latents>, Error> {
        let block = self.remove_duplicates(&inputs.haplotype_block);
        if block.is_empty() {
            return Err(Error::EmptyHaplotypeBlock);
        }
        if inputs.samples.is_empty() {
            return Err(Error::EmptySamples);
        }
        let ploidy = *self.params.ploidy();
        if ploidy == 0 {
            return Err(Error::ZeroPloidy);
        }

        let num_haplotypes = block.len();
        let genotype_prior = self.genotype_prior_model(&block);
        let mutation_model: Box<dyn DeNovoMutationModel> =
            Box::new(UniformDeNovoModel::new(*self.params.mutation_rate(), num_haplotypes));
        let copy_number_log_probability =
            bio::stats::LogProb(self.params.somatic_cnv_mutation_rate().ln());
        let prior_model = SingleCellPriorModel::new(
            genotype_prior.as_ref(),
            mutation_model.as_ref(),
            copy_number_log_probability,
        );

        let genotypes = generate_all_genotypes(num_haplotypes, ploidy);
        let model_params = self.params.resolve_model_parameters(&inputs.samples);
        let algo_params = self.params.resolve_algorithm_parameters();
        let engine = VariationalEngine::new(inputs.oracle, &prior_model, &model_params, &algo_params);

        let search_params = SearchParams {
            max_clones: *self.params.max_clones(),
            max_joint_genotypes: *self.params.max_joint_genotypes(),
            max_seeds: *self.params.max_vb_seeds(),
            top_m_seeds: *self.params.top_m_seeds(),
            rng_seed: *self.params.rng_seed(),
            execution_policy: algo_params.execution_policy,
        };

        let genotype_prior_fn = |i: usize| prior_model.log_prior(None, &genotypes[i]);
        let mutation_fn = |p: usize, c: usize| prior_model.log_prior(Some(&genotypes[p]), &genotypes[c]);

        let result = search::search(
            &engine,
            inputs.samples.len(),
            &genotypes,
            genotype_prior_fn,
            mutation_fn,
            &search_params,
            cancel,
        )?;
        if result.topologies.is_empty() {
            return Ok(None);
        }

        let wants_copy_number = *self.params.max_copy_loss() > 0 || *self.params.max_copy_gain() > 0;
        let trace = result.trace;
        let mut topologies = result.topologies;
        let mut genotypes = genotypes;
        let mut copy_change_predicted = false;
        let mut default_ploidy_idx = 0;

        if wants_copy_number {
            if let Some(best_idx) = topologies
                .iter()
                .enumerate()
                .filter(|(_, t)| t.phylogeny.size() >= 2)
                .max_by(|(_, a), (_, b)| {
                    a.log_evidence
                        .partial_cmp(&b.log_evidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(i, _)| i)
            {
                let combined = CombinedGenotypeSet::build(
                    num_haplotypes,
                    ploidy,
                    *self.params.max_copy_loss(),
                    *self.params.max_copy_gain(),
                );
                default_ploidy_idx = combined.default_ploidy_idx;
                let shape = topologies[best_idx].phylogeny.transform(|_| ());
                if let Some(CopyNumberExtension { inferences, promoted }) = copy_number::extend(
                    &engine,
                    &shape,
                    inputs.samples.len(),
                    &topologies[best_idx],
                    &combined,
                    ploidy,
                    *self.params.max_vb_seeds(),
                    cancel,
                )? {
                    if promoted {
                        topologies[best_idx] = inferences;
                        copy_change_predicted = true;
                        genotypes = combined.genotypes;
                    }
                }
            }
        }

        Latents::aggregate(
            topologies,
            genotypes,
            copy_change_predicted,
            default_ploidy_idx,
            trace,
            result.capacity_exceeded,
        )
        .map(Some)
    }

    fn call_variants(&self, latents: &Latents, num_haplotypes: usize) -> Vec<VariantCall> {
        calling::call_variants(latents, num_haplotypes, *self.params.min_variant_posterior())
    }

    fn call_reference(&self) -> Vec<VariantCall> {
        Vec::new()
    }
}
