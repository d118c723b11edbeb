//! Haplotype and Variant Posteriors, and variant calling (§4.8).
//!
//! A candidate variant is the presence of one non-reference haplotype from
//! the block against haplotype `0` (the reference haplotype the block is
//! always built around, the way this crate never emits a reference block of
//! its own, §1 Non-goals) — the opaque `Haplotype` type carries no
//! site-level allele structure to decompose further (§3), so "ref/alt pair"
//! collapses to "haplotype 0 vs. haplotype `h`" for every other haplotype
//! `h` in the block.

use serde::{Deserialize, Serialize};

use crate::aggregate::Latents;
use crate::haplotype::Genotype;
use crate::phylogeny::Phylogeny;
use crate::utils::{argmax, probability_false_to_phred};

/// One sample's call at a variant: the whole-region MAP genotype, that same
/// genotype collapsed to the variant's ref/alt alleles, and its phred score
/// (§4.8 SUPPLEMENT: both genotype views are carried, as in
/// `cell_caller.cpp:682-700`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenotypeCall {
    pub genotype: Genotype,
    pub variant_genotype: Genotype,
    pub phred: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhylogenySummary {
    pub map_topology_shape: Phylogeny<()>,
    pub map_posterior: f64,
    pub size_posteriors: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantCall {
    pub alt_haplotype_idx: usize,
    /// Per-sample genotype calls, in the order samples were supplied.
    pub genotype_calls: Vec<GenotypeCall>,
    pub quality: f64,
    pub phylogeny_summary: PhylogenySummary,
}

/// `P(h observed in sample s)` (§4.8): one minus the sample's marginal mass
/// on genotypes that do not contain `h` at all.
pub fn haplotype_posterior(sample_marginal: &[f64], genotypes: &[Genotype], haplotype_idx: usize) -> f64 {
    let mass_without: f64 = genotypes
        .iter()
        .enumerate()
        .filter(|(_, g)| !g.contains(haplotype_idx))
        .map(|(i, _)| sample_marginal[i])
        .sum();
    (1.0 - mass_without).clamp(0.0, 1.0)
}

/// Restrict a whole-region genotype to the ref/alt alleles of one variant:
/// every copy equal to `alt_idx` stays `alt_idx`, every other copy collapses
/// to the reference haplotype `0` (or to `alt_idx` itself if `alt_idx == 0`,
/// which cannot happen since alt candidates start at haplotype 1).
fn restrict_to_variant(genotype: &Genotype, alt_idx: usize) -> Genotype {
    let indices = genotype
        .haplotype_indices()
        .map(|idx| if idx == alt_idx { alt_idx } else { 0 })
        .collect();
    Genotype::from_indices(indices)
}

/// Emit every candidate variant passing §4.8's filter, for haplotypes
/// `1..num_haplotypes` against the reference haplotype `0`.
pub fn call_variants(latents: &Latents, num_haplotypes: usize, min_variant_posterior_phred: f64) -> Vec<VariantCall> {
    if num_haplotypes == 0 {
        return Vec::new();
    }
    let num_samples = latents.map_topology().phylogeny.group(0).sample_attachment_posteriors.len();
    let marginals: Vec<Vec<f64>> = (0..num_samples).map(|s| latents.sample_genotype_marginal(s)).collect();
    let map_genotype_per_sample: Vec<Genotype> = marginals
        .iter()
        .map(|m| {
            let idx = argmax(m).unwrap_or(0);
            latents.genotypes[idx].clone()
        })
        .collect();

    let phylogeny_summary = PhylogenySummary {
        map_topology_shape: latents.map_topology_shape(),
        map_posterior: probability_false_to_phred(1.0 - latents.phylogeny_posteriors[latents.map_phylogeny_idx]),
        size_posteriors: latents
            .phylogeny_size_posteriors()
            .into_iter()
            .map(|p| probability_false_to_phred(1.0 - p))
            .collect(),
    };

    let mut calls = Vec::new();
    for alt in 1..num_haplotypes {
        let alt_posteriors: Vec<f64> = marginals
            .iter()
            .map(|m| haplotype_posterior(m, &latents.genotypes, alt))
            .collect();

        let any_above_threshold = alt_posteriors
            .iter()
            .any(|&p| probability_false_to_phred(1.0 - p) >= min_variant_posterior_phred);
        let any_map_contains_alt = map_genotype_per_sample.iter().any(|g| g.contains(alt));
        if !any_above_threshold || !any_map_contains_alt {
            continue;
        }

        let genotype_calls = (0..num_samples)
            .map(|s| {
                let genotype = map_genotype_per_sample[s].clone();
                let variant_genotype = restrict_to_variant(&genotype, alt);
                GenotypeCall {
                    genotype,
                    variant_genotype,
                    phred: probability_false_to_phred(1.0 - alt_posteriors[s]),
                }
            })
            .collect();

        let quality = alt_posteriors.iter().cloned().fold(0.0_f64, f64::max);
        calls.push(VariantCall {
            alt_haplotype_idx: alt,
            genotype_calls,
            quality: probability_false_to_phred(1.0 - quality),
            phylogeny_summary: phylogeny_summary.clone(),
        });
    }

    // §5: ordered by variant start, then alt allele; we have no site-level
    // start coordinate (a whole-haplotype block carries one region, §3), so
    // alt haplotype index is the only available, and already monotonic, key.
    calls.sort_by_key(|c| c.alt_haplotype_idx);
    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GroupLatents;
    use bio::stats::LogProb;

    fn latents_with_marginal(genotype_posteriors: Vec<f64>, genotypes: Vec<Genotype>) -> Latents {
        let phylogeny = Phylogeny::with_root(GroupLatents {
            genotype_posteriors,
            sample_attachment_posteriors: vec![1.0],
        });
        let topologies = vec![crate::engine::Inferences {
            phylogeny,
            log_evidence: LogProb(-0.1),
        }];
        Latents::aggregate(topologies, genotypes, false, 0, Vec::new()).unwrap()
    }

    #[test]
    fn strongly_supported_alt_is_called() {
        let genotypes = vec![Genotype::from_indices(vec![0, 0]), Genotype::from_indices(vec![0, 1])];
        let latents = latents_with_marginal(vec![0.01, 0.99], genotypes);
        let calls = call_variants(&latents, 2, 20.0);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].alt_haplotype_idx, 1);
    }

    #[test]
    fn homozygous_reference_calls_nothing() {
        let genotypes = vec![Genotype::from_indices(vec![0, 0]), Genotype::from_indices(vec![0, 1])];
        let latents = latents_with_marginal(vec![1.0, 0.0], genotypes);
        let calls = call_variants(&latents, 2, 20.0);
        assert!(calls.is_empty());
    }

    #[test]
    fn haplotype_posterior_is_complement_of_non_containing_mass() {
        let genotypes = vec![Genotype::from_indices(vec![0, 0]), Genotype::from_indices(vec![0, 1])];
        let marginal = vec![0.4, 0.6];
        let p = haplotype_posterior(&marginal, &genotypes, 1);
        assert!((p - 0.6).abs() < 1e-9);
    }
}
