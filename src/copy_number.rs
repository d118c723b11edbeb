//! Copy-Number Extension (§4.6): per the best explored topology, tries every
//! distinct assignment of non-default ploidy to the non-root groups and
//! promotes the topology's [`Inferences`] if any assignment scores higher.
//!
//! `cell_caller.cpp:407-426` generates these assignments with a
//! `next_permutation` trick over a flat, repetition-padded vector; since
//! Rust's standard library has no equivalent, we enumerate the same
//! assignment space directly as the cartesian product of `{lo..=hi}` taken
//! once per non-root group (`itertools::Itertools::multi_cartesian_product`)
//! — the resulting assignment set is identical, just reached without the
//! permutation detour.

use bio::stats::LogProb;
use itertools::Itertools;

use crate::cancellation::CancellationToken;
use crate::engine::{EngineRun, GroupLatents, Inferences, VariationalEngine};
use crate::errors::Error;
use crate::genotype_set::CombinedGenotypeSet;
use crate::genotype_enum::JointGenotype;
use crate::phylogeny::Phylogeny;

pub struct CopyNumberExtension {
    pub inferences: Inferences,
    pub promoted: bool,
}

/// Try every ploidy assignment to the non-root groups of `shape` and return
/// the best-scoring [`Inferences`], re-expressed over `combined.genotypes`.
/// `promoted` is `cell_caller.cpp`'s `copy_change_predicted`: `true` iff some
/// assignment beat `best.log_evidence`.
///
/// Precondition (checked by the caller, §4.6): `shape.size() >= 2` and the
/// combined set spans more than one ploidy.
pub fn extend(
    engine: &VariationalEngine<'_>,
    shape: &Phylogeny<()>,
    num_samples: usize,
    best: &Inferences,
    combined: &CombinedGenotypeSet,
    default_ploidy: usize,
    max_seeds: usize,
    cancel: &CancellationToken,
) -> Result<Option<CopyNumberExtension>, Error> {
    let group_ids = shape.group_ids();
    let non_root: Vec<usize> = group_ids.iter().copied().filter(|&g| g != 0).collect();
    if non_root.is_empty() {
        return Ok(None);
    }

    let ploidy_range: Vec<usize> = (combined.min_ploidy()..=combined.max_ploidy()).collect();
    let default_mask = combined.indices_for_ploidy(default_ploidy);

    let mut best_result = reexpress_at_default_ploidy(best, &default_mask);
    let mut best_evidence = best.log_evidence;
    let mut promoted = false;

    for assignment in non_root
        .iter()
        .map(|_| ploidy_range.clone())
        .multi_cartesian_product()
    {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        // Root stays at the default ploidy; this is a genuinely different
        // candidate only when some non-root group departs from it.
        if assignment.iter().all(|&p| p == default_ploidy) {
            continue;
        }

        let mut masks = vec![Vec::new(); shape.size()];
        masks[0] = default_mask.clone();
        for (&g, &ploidy) in non_root.iter().zip(assignment.iter()) {
            masks[g] = combined.indices_for_ploidy(ploidy);
        }

        let seeds = deterministic_seeds(shape.size(), max_seeds.max(1));
        let run = engine.infer_masked(shape, num_samples, &combined.genotypes, &masks, &seeds, cancel)?;
        if let EngineRun::Converged(inferences) = run {
            if inferences.log_evidence > best_evidence {
                best_evidence = inferences.log_evidence;
                best_result = inferences;
                promoted = true;
            }
        }
    }

    Ok(Some(CopyNumberExtension {
        inferences: best_result,
        promoted,
    }))
}

/// A handful of deterministic seeds; the genotype masks applied inside
/// [`crate::engine::VariationalEngine::infer_masked`] already restrict each
/// group to its assigned ploidy's block, so the seed values only need to
/// vary the starting point within that block (`seed % allowed.len()`).
fn deterministic_seeds(num_groups: usize, count: usize) -> Vec<JointGenotype> {
    (0..count).map(|s| vec![s; num_groups]).collect()
}

/// A topology the extension did not improve on stays expressed over its
/// original default-ploidy-only genotype indices (length = the default
/// block's size); §4.7's pad+rotate step lifts every topology into the
/// combined layout uniformly; `default_mask` is unused here beyond
/// documenting that length relationship at the call site.
fn reexpress_at_default_ploidy(best: &Inferences, default_mask: &[usize]) -> Inferences {
    debug_assert!(best.phylogeny.groups().iter().all(|(_, latents): &(usize, &GroupLatents)| {
        latents.genotype_posteriors.len() <= default_mask.len()
    }));
    best.clone()
}

/// §4.7.5 / §9: right-pad `posteriors` to `combined_len` with zeros, then
/// cyclically rotate so the (previously default-ploidy-only) values land in
/// the default-ploidy slot of the combined layout. Implemented as
/// `cell_caller.cpp:449-460` does: rotate the *reversed* vector by
/// `default_ploidy_idx` from its start, then reverse back — a naive forward
/// rotation gives the wrong alignment.
pub fn rotate_to_combined_layout(posteriors: &mut Vec<f64>, combined_len: usize, default_ploidy_idx: usize) {
    if posteriors.len() < combined_len {
        posteriors.resize(combined_len, 0.0);
    }
    if combined_len == 0 {
        return;
    }
    posteriors.reverse();
    posteriors.rotate_left(default_ploidy_idx % combined_len);
    posteriors.reverse();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_aligns_default_block_at_offset() {
        let mut posteriors = vec![0.2, 0.3, 0.5]; // default-ploidy-only, length 3
        rotate_to_combined_layout(&mut posteriors, 10, 2);
        assert_eq!(&posteriors[0..2], &[0.0, 0.0]);
        assert_eq!(&posteriors[2..5], &[0.2, 0.3, 0.5]);
        assert_eq!(&posteriors[5..], &[0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn no_offset_is_a_plain_right_pad() {
        let mut posteriors = vec![1.0];
        rotate_to_combined_layout(&mut posteriors, 4, 0);
        assert_eq!(posteriors, vec![1.0, 0.0, 0.0, 0.0]);
    }
}
