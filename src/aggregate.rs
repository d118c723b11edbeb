//! Posterior Aggregator (§4.7): normalizes the per-topology log-evidences
//! explored by the [`crate::search`] driver (optionally promoted by
//! [`crate::copy_number`]) into the region's `Latents` — phylogeny
//! posteriors, the MAP topology, per-clone-count size posteriors, and the
//! per-sample marginal genotype posterior every downstream call draws from.
//!
//! Per the design notes (§9): `Latents` owns its data rather than holding a
//! back-reference to the caller's configuration, and the three derived views
//! (haplotype posteriors, per-sample marginals, size posteriors) are
//! computed once and cached behind a `RefCell` rather than recomputed on
//! every access — the single-threaded-per-region analogue of a
//! smart-pointer-shared, lazily memoized latents structure.

use std::cell::RefCell;

use bio::stats::LogProb;

use crate::copy_number::rotate_to_combined_layout;
use crate::engine::Inferences;
use crate::errors::Error;
use crate::haplotype::Genotype;
use crate::phylogeny::Phylogeny;
use crate::search::SearchTraceEntry;
use crate::utils::{argmax, exp_normalize};

/// All per-region inference output (§3 `Latents`): the explored topologies
/// plus their normalized posteriors, ready for haplotype/variant calling.
pub struct Latents {
    pub topologies: Vec<Inferences>,
    pub genotypes: Vec<Genotype>,
    pub copy_change_predicted: bool,
    pub phylogeny_posteriors: Vec<f64>,
    pub map_phylogeny_idx: usize,
    /// §3 SUPPLEMENT diagnostic trace: one row per topology the search
    /// driver explored, kept here only for `--trace-out`; calling never
    /// reads it.
    pub trace: Vec<SearchTraceEntry>,
    /// §7: one [`Error::CapacityExceeded`] per topology where the
    /// genotype-combination cap was hit during search, carried as a value
    /// rather than thrown since the search proceeded on a seeded subset.
    pub capacity_exceeded: Vec<Error>,
    derived: RefCell<Option<DerivedViews>>,
}

#[derive(Clone)]
struct DerivedViews {
    phylogeny_size_posteriors: Vec<f64>,
    sample_genotype_marginals: Vec<Vec<f64>>,
}

impl Latents {
    /// Build the aggregated latents from the topologies the search driver
    /// (and, if applicable, the copy-number extension) produced. When
    /// `copy_change_predicted`, every topology's per-group genotype
    /// posteriors are padded and rotated into the combined genotype set's
    /// layout before anything else reads them (§4.7 step 5).
    pub fn aggregate(
        mut topologies: Vec<Inferences>,
        genotypes: Vec<Genotype>,
        copy_change_predicted: bool,
        default_ploidy_idx: usize,
        trace: Vec<SearchTraceEntry>,
        capacity_exceeded: Vec<Error>,
    ) -> Result<Self, Error> {
        if copy_change_predicted {
            let combined_len = genotypes.len();
            for inferences in &mut topologies {
                for id in inferences.phylogeny.group_ids() {
                    let latents = inferences.phylogeny.group_mut(id);
                    rotate_to_combined_layout(&mut latents.genotype_posteriors, combined_len, default_ploidy_idx);
                }
            }
        }

        let log_evidences: Vec<LogProb> = topologies.iter().map(|t| t.log_evidence).collect();
        let phylogeny_posteriors = exp_normalize(&log_evidences).ok_or(Error::NoViableTopology)?;
        let map_phylogeny_idx = argmax(&phylogeny_posteriors).ok_or(Error::NoViableTopology)?;

        Ok(Latents {
            topologies,
            genotypes,
            copy_change_predicted,
            phylogeny_posteriors,
            map_phylogeny_idx,
            trace,
            capacity_exceeded,
            derived: RefCell::new(None),
        })
    }

    pub fn map_topology(&self) -> &Inferences {
        &self.topologies[self.map_phylogeny_idx]
    }

    /// The MAP topology's shape with per-group values elided, for the
    /// `phylogeny_summary` carried on every emitted call (§4.8).
    pub fn map_topology_shape(&self) -> Phylogeny<()> {
        self.map_topology().phylogeny.transform(|_| ())
    }

    /// `phylogeny_size_posteriors[k]` (1-indexed by clone count): Σ of
    /// `phylogeny_posteriors` over topologies with `k` groups (§4.7 step 3).
    pub fn phylogeny_size_posteriors(&self) -> Vec<f64> {
        self.with_derived(|d| d.phylogeny_size_posteriors.clone())
    }

    /// Per-sample marginal genotype posterior (§3): `Σ_t phylogeny_posteriors[t]
    /// · Σ_g attachment_posteriors[t,g,s] · genotype_posteriors[t,g]`.
    pub fn sample_genotype_marginal(&self, sample: usize) -> Vec<f64> {
        self.with_derived(|d| d.sample_genotype_marginals[sample].clone())
    }

    fn with_derived<T>(&self, f: impl FnOnce(&DerivedViews) -> T) -> T {
        if self.derived.borrow().is_none() {
            *self.derived.borrow_mut() = Some(self.compute_derived());
        }
        f(self.derived.borrow().as_ref().expect("just computed"))
    }

    fn compute_derived(&self) -> DerivedViews {
        let max_size = self.topologies.iter().map(|t| t.phylogeny.size()).max().unwrap_or(0);
        let mut phylogeny_size_posteriors = vec![0.0; max_size + 1];
        for (t, inferences) in self.topologies.iter().enumerate() {
            phylogeny_size_posteriors[inferences.phylogeny.size()] += self.phylogeny_posteriors[t];
        }

        let num_samples = self
            .topologies
            .first()
            .and_then(|t| t.phylogeny.groups().first().map(|(_, g)| g.sample_attachment_posteriors.len()))
            .unwrap_or(0);
        let num_genotypes = self.genotypes.len();
        let mut sample_genotype_marginals = vec![vec![0.0; num_genotypes]; num_samples];

        for (t, inferences) in self.topologies.iter().enumerate() {
            let p_t = self.phylogeny_posteriors[t];
            if p_t == 0.0 {
                continue;
            }
            for (_, latents) in inferences.phylogeny.groups() {
                for s in 0..num_samples {
                    let attach = latents.sample_attachment_posteriors[s];
                    if attach == 0.0 {
                        continue;
                    }
                    let weight = p_t * attach;
                    for (i, &p_genotype) in latents.genotype_posteriors.iter().enumerate() {
                        sample_genotype_marginals[s][i] += weight * p_genotype;
                    }
                }
            }
        }

        DerivedViews {
            phylogeny_size_posteriors,
            sample_genotype_marginals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GroupLatents;

    fn inferences(log_evidence: f64, genotype_posteriors: Vec<f64>, attach: Vec<f64>) -> Inferences {
        let phylogeny = Phylogeny::with_root(GroupLatents {
            genotype_posteriors,
            sample_attachment_posteriors: attach,
        });
        Inferences {
            phylogeny,
            log_evidence: LogProb(log_evidence),
        }
    }

    #[test]
    fn phylogeny_posteriors_sum_to_one() {
        let topologies = vec![
            inferences(-1.0, vec![0.5, 0.5], vec![1.0]),
            inferences(-2.0, vec![0.3, 0.7], vec![1.0]),
        ];
        let genotypes = vec![Genotype::from_indices(vec![0, 0]), Genotype::from_indices(vec![0, 1])];
        let latents = Latents::aggregate(topologies, genotypes, false, 0, Vec::new(), Vec::new()).unwrap();
        let sum: f64 = latents.phylogeny_posteriors.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn size_posteriors_sum_to_one() {
        let mut two_groups = Phylogeny::with_root(GroupLatents {
            genotype_posteriors: vec![1.0],
            sample_attachment_posteriors: vec![1.0],
        });
        two_groups
            .add_descendant(
                GroupLatents {
                    genotype_posteriors: vec![1.0],
                    sample_attachment_posteriors: vec![0.0],
                },
                0,
            )
            .unwrap();
        let topologies = vec![
            inferences(-1.0, vec![1.0], vec![1.0]),
            Inferences {
                phylogeny: two_groups,
                log_evidence: LogProb(-0.5),
            },
        ];
        let genotypes = vec![Genotype::from_indices(vec![0, 0])];
        let latents = Latents::aggregate(topologies, genotypes, false, 0, Vec::new(), Vec::new()).unwrap();
        let sizes = latents.phylogeny_size_posteriors();
        let sum: f64 = sizes.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sample_marginal_sums_to_one() {
        let topologies = vec![inferences(-1.0, vec![0.25, 0.75], vec![1.0])];
        let genotypes = vec![Genotype::from_indices(vec![0, 0]), Genotype::from_indices(vec![0, 1])];
        let latents = Latents::aggregate(topologies, genotypes, false, 0, Vec::new(), Vec::new()).unwrap();
        let marginal = latents.sample_genotype_marginal(0);
        let sum: f64 = marginal.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
