//! Configuration (§6 Parameters): a plain, `serde`-deserializable struct the
//! way `grammar::Scenario` is a YAML-facing configuration type, built with
//! `derive_builder` for programmatic construction (tests, the CLI) and
//! `getset` for field access.

use std::collections::{BTreeSet, HashMap};

use derive_builder::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};

use crate::engine::{AlgorithmParameters, ExecutionPolicy, GroupPrior, ModelParameters};
use crate::errors::Error;
use crate::priors::coalescent::CoalescentModel;

/// Coalescent population-prior parameters (§1 SUPPLEMENT, §4.9); `theta` is
/// the population-scaled mutation rate the way `CoalescentModel` consumes
/// it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoalescentParams {
    pub theta: f64,
}

impl From<CoalescentParams> for CoalescentModel {
    fn from(params: CoalescentParams) -> Self {
        CoalescentModel::new(params.theta)
    }
}

/// §6 Parameters, clamped and validated by [`Parameters::validate`] the way
/// `CellCaller::CellCaller`'s constructor does in `cell_caller.cpp`.
#[derive(Debug, Clone, Builder, Getters, Serialize, Deserialize)]
#[builder(setter(into))]
#[get = "pub"]
pub struct Parameters {
    ploidy: usize,
    max_clones: usize,
    #[builder(default = "0")]
    max_copy_loss: usize,
    #[builder(default = "0")]
    max_copy_gain: usize,
    #[builder(default = "1e-6")]
    somatic_cnv_mutation_rate: f64,
    #[builder(default = "1e-4")]
    mutation_rate: f64,
    #[builder(default = "10.0")]
    dropout_concentration: f64,
    #[builder(default)]
    sample_dropout_concentrations: HashMap<String, f64>,
    #[builder(default)]
    normal_samples: BTreeSet<String>,
    #[builder(default)]
    prior_model_params: Option<CoalescentParams>,
    #[builder(default = "10_000")]
    max_joint_genotypes: usize,
    #[builder(default = "16")]
    max_vb_seeds: usize,
    #[builder(default = "20.0")]
    min_variant_posterior: f64,
    #[builder(default = "false")]
    deduplicate_haplotypes_with_prior_model: bool,
    #[builder(default)]
    #[serde(skip)]
    execution_policy: ExecutionPolicy,
    #[builder(default = "1e-3")]
    convergence_epsilon: f64,
    #[builder(default = "100")]
    max_iterations: usize,
    #[builder(default = "4")]
    top_m_seeds: usize,
    #[builder(default = "0")]
    rng_seed: u64,
}

impl Parameters {
    /// Enforce the §6 input invariants, mutating in place so a
    /// deserialized-from-YAML scenario is corrected the same way a
    /// programmatically built one is.
    pub fn validate(&mut self) -> Result<(), Error> {
        if self.ploidy == 0 {
            return Err(Error::ZeroPloidy);
        }
        if self.max_clones == 0 {
            return Err(Error::ZeroMaxClones);
        }
        let max_loss = self.ploidy.saturating_sub(1);
        if self.max_copy_loss > max_loss {
            self.max_copy_loss = max_loss;
        }
        Ok(())
    }

    /// Resolve §4.4's per-sample model parameters against an ordered sample
    /// list: dropout concentrations default globally with per-sample
    /// overrides applied once (§4.4 SUPPLEMENT), and `normal_samples` pins
    /// that sample's group prior to the root (§9's `GroupPrior` enum).
    pub fn resolve_model_parameters(&self, samples: &[String]) -> ModelParameters {
        let sample_dropout_concentrations = samples
            .iter()
            .map(|s| {
                *self
                    .sample_dropout_concentrations
                    .get(s)
                    .unwrap_or(&self.dropout_concentration)
            })
            .collect();
        let group_priors = samples
            .iter()
            .map(|s| {
                if self.normal_samples.contains(s) {
                    GroupPrior::PinnedTo(0)
                } else {
                    GroupPrior::Unconstrained
                }
            })
            .collect();
        ModelParameters {
            dropout_concentration: self.dropout_concentration,
            sample_dropout_concentrations,
            group_concentration: 1.0,
            group_priors,
        }
    }

    pub fn resolve_algorithm_parameters(&self) -> AlgorithmParameters {
        AlgorithmParameters {
            max_genotype_combinations: self.max_joint_genotypes,
            max_seeds: self.max_vb_seeds,
            top_m_seeds: self.top_m_seeds,
            execution_policy: self.execution_policy,
            convergence_epsilon: self.convergence_epsilon,
            max_iterations: self.max_iterations,
            rng_seed: self.rng_seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_copy_loss_is_clamped_to_ploidy_minus_one() {
        let mut params = ParametersBuilder::default()
            .ploidy(2usize)
            .max_clones(3usize)
            .max_copy_loss(5usize)
            .build()
            .unwrap();
        params.validate().unwrap();
        assert_eq!(*params.max_copy_loss(), 1);
    }

    #[test]
    fn zero_max_clones_is_rejected() {
        let mut params = ParametersBuilder::default()
            .ploidy(2usize)
            .max_clones(0usize)
            .build()
            .unwrap();
        assert_eq!(params.validate(), Err(Error::ZeroMaxClones));
    }

    #[test]
    fn normal_samples_pin_group_prior_to_root() {
        let params = ParametersBuilder::default()
            .ploidy(2usize)
            .max_clones(3usize)
            .normal_samples(vec!["A".to_string()].into_iter().collect())
            .build()
            .unwrap();
        let samples = vec!["A".to_string(), "B".to_string()];
        let model_params = params.resolve_model_parameters(&samples);
        assert_eq!(model_params.group_priors[0], GroupPrior::PinnedTo(0));
        assert_eq!(model_params.group_priors[1], GroupPrior::Unconstrained);
    }

    #[test]
    fn per_sample_dropout_override_applies() {
        let mut overrides = HashMap::new();
        overrides.insert("B".to_string(), 2.0);
        let params = ParametersBuilder::default()
            .ploidy(2usize)
            .max_clones(3usize)
            .dropout_concentration(10.0)
            .sample_dropout_concentrations(overrides)
            .build()
            .unwrap();
        let samples = vec!["A".to_string(), "B".to_string()];
        let model_params = params.resolve_model_parameters(&samples);
        assert_eq!(model_params.sample_dropout_concentrations[0], 10.0);
        assert_eq!(model_params.sample_dropout_concentrations[1], 2.0);
    }
}
