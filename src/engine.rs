//! Variational Inference Engine (§4.4): coordinate-ascent mean-field
//! inference of the factorized posterior `q(G,Z,W) = q(G)·q(Z)·q(W)` over a
//! fixed phylogeny shape, seeded by [`crate::genotype_enum::seed_joint_genotypes`].

use bio::stats::LogProb;
use rayon::prelude::*;

use crate::cancellation::CancellationToken;
use crate::errors::Error;
use crate::genotype_enum::JointGenotype;
use crate::haplotype::Genotype;
use crate::likelihood::{genotype_log_likelihood, LikelihoodOracle};
use crate::phylogeny::Phylogeny;
use crate::priors::single_cell::SingleCellPriorModel;

/// Whether a sample's group attachment is free to vary under `q(Z)` or fixed
/// to a specific group, the way `normal_samples` pins a sample's group to the
/// root in `cell_caller.cpp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPrior {
    Unconstrained,
    PinnedTo(usize),
}

/// `execution_policy` (§5): `ParByTopology` only affects the phylogeny
/// search driver's loop over candidate topologies; a single engine call
/// treats it the same as `Serial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString)]
pub enum ExecutionPolicy {
    Serial,
    ParByTopology,
    ParBySeed,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        ExecutionPolicy::Serial
    }
}

/// §4.4 model parameters: dropout concentrations, group concentration, and
/// the optional per-sample group pinning.
#[derive(Debug, Clone)]
pub struct ModelParameters {
    pub dropout_concentration: f64,
    /// Resolved per sample (length = number of samples); defaults to
    /// `dropout_concentration` with per-sample overrides already applied
    /// (§4.4 SUPPLEMENT — resolved once per `infer_latents` call).
    pub sample_dropout_concentrations: Vec<f64>,
    pub group_concentration: f64,
    /// One entry per sample.
    pub group_priors: Vec<GroupPrior>,
}

/// §4.4 algorithm parameters.
#[derive(Debug, Clone)]
pub struct AlgorithmParameters {
    pub max_genotype_combinations: usize,
    pub max_seeds: usize,
    pub top_m_seeds: usize,
    pub execution_policy: ExecutionPolicy,
    pub convergence_epsilon: f64,
    pub max_iterations: usize,
    pub rng_seed: u64,
}

/// Per-group converged latents: a discrete distribution over the enumerated
/// genotype set, and (duplicated onto every group for simplicity of
/// indexing) each sample's attachment posterior.
#[derive(Debug, Clone)]
pub struct GroupLatents {
    pub genotype_posteriors: Vec<f64>,
    pub sample_attachment_posteriors: Vec<f64>,
}

/// The converged result of running the engine on one phylogeny shape.
#[derive(Debug, Clone)]
pub struct Inferences {
    pub phylogeny: Phylogeny<GroupLatents>,
    pub log_evidence: LogProb,
}

pub enum EngineRun {
    Converged(Inferences),
    Cancelled,
}

struct SeedState {
    q_g: Vec<Vec<f64>>,
    q_z: Vec<Vec<f64>>,
    w: Vec<f64>,
}

pub struct VariationalEngine<'a> {
    oracle: &'a (dyn LikelihoodOracle + 'a),
    prior_model: &'a SingleCellPriorModel<'a>,
    model_params: &'a ModelParameters,
    algo_params: &'a AlgorithmParameters,
}

impl<'a> VariationalEngine<'a> {
    pub fn new(
        oracle: &'a (dyn LikelihoodOracle + 'a),
        prior_model: &'a SingleCellPriorModel<'a>,
        model_params: &'a ModelParameters,
        algo_params: &'a AlgorithmParameters,
    ) -> Self {
        VariationalEngine {
            oracle,
            prior_model,
            model_params,
            algo_params,
        }
    }

    /// Run coordinate-ascent mean-field inference over every seed for a
    /// fixed phylogeny shape (§4.4), returning the converged result with the
    /// highest ELBO, or [`EngineRun::Cancelled`] if `cancel` fires first.
    pub fn infer(
        &self,
        shape: &Phylogeny<()>,
        num_samples: usize,
        genotypes: &[Genotype],
        seeds: &[JointGenotype],
        cancel: &CancellationToken,
    ) -> Result<EngineRun, Error> {
        let masks = Self::unmasked(shape.size(), genotypes.len());
        self.infer_masked(shape, num_samples, genotypes, &masks, seeds, cancel)
    }

    /// The "every group may select every genotype" mask used by the
    /// ordinary (non-copy-number) search path.
    pub fn unmasked(num_groups: usize, num_genotypes: usize) -> Vec<Vec<usize>> {
        vec![(0..num_genotypes).collect(); num_groups]
    }

    /// As [`Self::infer`], but restricts group `g`'s candidate genotypes to
    /// `masks[g]` (indices into `genotypes`). Used by the copy-number
    /// extension (§4.6) to pin each non-root group to genotypes of its
    /// assigned ploidy within the combined copy-change genotype set.
    pub fn infer_masked(
        &self,
        shape: &Phylogeny<()>,
        num_samples: usize,
        genotypes: &[Genotype],
        masks: &[Vec<usize>],
        seeds: &[JointGenotype],
        cancel: &CancellationToken,
    ) -> Result<EngineRun, Error> {
        if cancel.is_cancelled() {
            return Ok(EngineRun::Cancelled);
        }

        let run_one = |seed: &JointGenotype| -> Option<(SeedState, LogProb)> {
            self.run_seed(shape, num_samples, genotypes, masks, seed)
        };

        let results: Vec<Option<(SeedState, LogProb)>> = match self.algo_params.execution_policy {
            ExecutionPolicy::ParBySeed => seeds.par_iter().map(run_one).collect(),
            ExecutionPolicy::Serial | ExecutionPolicy::ParByTopology => {
                seeds.iter().map(run_one).collect()
            }
        };

        if cancel.is_cancelled() {
            return Ok(EngineRun::Cancelled);
        }

        let best = results
            .into_iter()
            .flatten()
            .fold(None, |best: Option<(SeedState, LogProb)>, (state, evidence)| {
                match &best {
                    Some((_, best_evidence)) if *best_evidence >= evidence => best,
                    _ => Some((state, evidence)),
                }
            });

        match best {
            None => Err(Error::InferenceUnderflow {
                groups: shape.size(),
                seeds: seeds.len(),
            }),
            Some((state, log_evidence)) => {
                let phylogeny = shape.transform(|_| ());
                let phylogeny = Self::fill_latents(phylogeny, &state);
                Ok(EngineRun::Converged(Inferences {
                    phylogeny,
                    log_evidence,
                }))
            }
        }
    }

    fn fill_latents(shape: Phylogeny<()>, state: &SeedState) -> Phylogeny<GroupLatents> {
        let num_samples = state.w.len();
        // `transform` has no access to a group's own id, so seed placeholder
        // values here and fill the real per-group vectors in a second pass
        // keyed by id.
        let mut filled = shape.transform(|_| GroupLatents {
            genotype_posteriors: Vec::new(),
            sample_attachment_posteriors: vec![0.0; num_samples],
        });
        for id in filled.group_ids() {
            let genotype_posteriors = state.q_g[id].clone();
            let sample_attachment_posteriors: Vec<f64> =
                (0..num_samples).map(|s| state.q_z[s][id]).collect();
            *filled.group_mut(id) = GroupLatents {
                genotype_posteriors,
                sample_attachment_posteriors,
            };
        }
        filled
    }

    fn run_seed(
        &self,
        shape: &Phylogeny<()>,
        num_samples: usize,
        genotypes: &[Genotype],
        masks: &[Vec<usize>],
        seed: &JointGenotype,
    ) -> Option<(SeedState, LogProb)> {
        let num_groups = shape.size();
        let num_genotypes = genotypes.len();
        let group_ids = shape.group_ids();

        let mut state = SeedState {
            q_g: vec![Vec::new(); num_groups],
            q_z: vec![vec![1.0 / num_groups as f64; num_groups]; num_samples],
            w: vec![1.0; num_samples],
        };
        for &g in &group_ids {
            let allowed = &masks[g];
            let spike_idx = allowed[seed[g] % allowed.len()];
            let mut spike = vec![LogProb(-50.0); num_genotypes];
            spike[spike_idx] = LogProb::ln_one();
            state.q_g[g] = crate::utils::exp_normalize(&spike)?;
        }
        for (s, prior) in self.model_params.group_priors.iter().enumerate() {
            if let GroupPrior::PinnedTo(g) = prior {
                state.q_z[s] = Self::one_hot(num_groups, *g);
            }
        }

        let mut prev_elbo = f64::NEG_INFINITY;
        for _ in 0..self.algo_params.max_iterations {
            self.update_genotypes(shape, &group_ids, genotypes, masks, num_samples, &mut state)?;
            self.update_attachments(&group_ids, genotypes, num_samples, &mut state)?;
            self.update_dropout_weights(&group_ids, genotypes, num_samples, &mut state);

            let elbo = self.elbo(shape, &group_ids, genotypes, num_samples, &state)?;
            if (elbo - prev_elbo).abs() < self.algo_params.convergence_epsilon {
                prev_elbo = elbo;
                break;
            }
            prev_elbo = elbo;
        }

        Some((state, LogProb(prev_elbo)))
    }

    fn one_hot(len: usize, index: usize) -> Vec<f64> {
        let mut v = vec![0.0; len];
        v[index] = 1.0;
        v
    }

    /// `log prior_g(i | parent)` (§4.3), taking the expectation over the
    /// parent's current `q(G)` distribution when there is a parent group.
    fn group_log_prior(
        &self,
        shape: &Phylogeny<()>,
        group: usize,
        genotype_idx: usize,
        genotypes: &[Genotype],
        state: &SeedState,
    ) -> LogProb {
        match shape.parent(group) {
            None => self.prior_model.log_prior(None, &genotypes[genotype_idx]),
            Some(parent) => {
                let q_parent = &state.q_g[parent];
                let terms: Vec<LogProb> = q_parent
                    .iter()
                    .enumerate()
                    .map(|(j, &p)| {
                        LogProb(p.ln())
                            + self
                                .prior_model
                                .log_prior(Some(&genotypes[j]), &genotypes[genotype_idx])
                    })
                    .collect();
                LogProb::ln_sum_exp(&terms)
            }
        }
    }

    fn update_genotypes(
        &self,
        shape: &Phylogeny<()>,
        group_ids: &[usize],
        genotypes: &[Genotype],
        masks: &[Vec<usize>],
        num_samples: usize,
        state: &mut SeedState,
    ) -> Option<()> {
        for &g in group_ids {
            let num_genotypes = genotypes.len();
            let allowed = &masks[g];
            let mut log_unnorm = Vec::with_capacity(num_genotypes);
            for i in 0..num_genotypes {
                if !allowed.contains(&i) {
                    log_unnorm.push(LogProb::ln_zero());
                    continue;
                }
                let log_prior = self.group_log_prior(shape, g, i, genotypes, state);
                let weighted_loglik: f64 = (0..num_samples)
                    .map(|s| {
                        let attach = state.q_z[s][g];
                        let w = state.w[s];
                        attach * w * genotype_log_likelihood(self.oracle, s, &genotypes[i]).0
                    })
                    .sum();
                log_unnorm.push(LogProb(log_prior.0 + weighted_loglik));
            }
            let normalized = crate::utils::exp_normalize(&log_unnorm)?;
            let gc = self.model_params.group_concentration;
            let g_len = allowed.len() as f64;
            state.q_g[g] = normalized
                .into_iter()
                .enumerate()
                .map(|(i, p)| {
                    if allowed.contains(&i) {
                        (p + gc / g_len) / (1.0 + gc)
                    } else {
                        0.0
                    }
                })
                .collect();
        }
        Some(())
    }

    fn update_attachments(
        &self,
        group_ids: &[usize],
        genotypes: &[Genotype],
        num_samples: usize,
        state: &mut SeedState,
    ) -> Option<()> {
        let num_groups = group_ids.len();
        for s in 0..num_samples {
            if let GroupPrior::PinnedTo(_) = self.model_params.group_priors[s] {
                continue;
            }
            let attach_prior = LogProb((1.0 / num_groups as f64).ln());
            let mut log_unnorm = Vec::with_capacity(num_groups);
            for &g in group_ids {
                let mixture: f64 = genotypes
                    .iter()
                    .enumerate()
                    .map(|(i, genotype)| {
                        state.q_g[g][i]
                            * state.w[s]
                            * genotype_log_likelihood(self.oracle, s, genotype).0
                    })
                    .sum();
                log_unnorm.push(LogProb(attach_prior.0 + mixture));
            }
            state.q_z[s] = crate::utils::exp_normalize(&log_unnorm)?;
        }
        Some(())
    }

    /// `q(W)` (§4.4): a bounded, monotone proxy for a Dirichlet/Beta update —
    /// a sample whose attachment-weighted expected log-likelihood is poor
    /// (large negative "evidence") is down-weighted toward zero, with the
    /// per-sample concentration controlling how readily that happens (higher
    /// concentration tolerates worse evidence before down-weighting).
    fn update_dropout_weights(
        &self,
        group_ids: &[usize],
        genotypes: &[Genotype],
        num_samples: usize,
        state: &mut SeedState,
    ) {
        for s in 0..num_samples {
            let evidence: f64 = group_ids
                .iter()
                .map(|&g| {
                    let attach = state.q_z[s][g];
                    let mixture: f64 = genotypes
                        .iter()
                        .enumerate()
                        .map(|(i, genotype)| {
                            state.q_g[g][i] * genotype_log_likelihood(self.oracle, s, genotype).0
                        })
                        .sum();
                    attach * mixture
                })
                .sum();
            let concentration = self.model_params.sample_dropout_concentrations[s];
            let badness = (-evidence).max(0.0);
            state.w[s] = concentration / (concentration + badness);
        }
    }

    fn elbo(
        &self,
        shape: &Phylogeny<()>,
        group_ids: &[usize],
        genotypes: &[Genotype],
        num_samples: usize,
        state: &SeedState,
    ) -> Option<f64> {
        const EPS: f64 = 1e-300;
        let num_groups = group_ids.len();
        let mut elbo = 0.0;

        for &g in group_ids {
            for (i, &p) in state.q_g[g].iter().enumerate() {
                if p <= 0.0 {
                    continue;
                }
                let log_prior = self.group_log_prior(shape, g, i, genotypes, state);
                elbo += p * (log_prior.0 - (p + EPS).ln());
            }
        }

        let attach_prior = (1.0 / num_groups as f64).ln();
        for s in 0..num_samples {
            for &g in group_ids {
                let p = state.q_z[s][g];
                if p <= 0.0 {
                    continue;
                }
                elbo += p * (attach_prior - (p + EPS).ln());
                let mixture: f64 = genotypes
                    .iter()
                    .enumerate()
                    .map(|(i, genotype)| {
                        state.q_g[g][i]
                            * state.w[s]
                            * genotype_log_likelihood(self.oracle, s, genotype).0
                    })
                    .sum();
                elbo += p * mixture;
            }
        }

        if elbo.is_finite() {
            Some(elbo)
        } else {
            None
        }
    }
}
