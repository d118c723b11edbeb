//! Haplotype Deduplication (§4.9), run once per region before the core: when
//! enabled and the block holds at least two haplotypes, duplicates are
//! removed under a "coalescent-probability-greater" ordering (ties broken
//! lexicographically by sequence); when disabled, the caller falls back to
//! plain structural (value-equality) dedup on the haplotype block.

use std::collections::HashSet;

use crate::haplotype::{Haplotype, HaplotypeBlock};
use crate::priors::coalescent::CoalescentModel;

/// Remove sequence-identical duplicates, keeping the one with the highest
/// coalescent log-probability within the block (ties broken by the smaller
/// sequence, lexicographically).
pub fn deduplicate_with_prior_model(block: &HaplotypeBlock, model: &CoalescentModel) -> HaplotypeBlock {
    if block.len() < 2 {
        return block.clone();
    }

    let haplotypes = block.as_slice();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    'outer: for (i, h) in haplotypes.iter().enumerate() {
        for group in groups.iter_mut() {
            if haplotypes[group[0]] == *h {
                group.push(i);
                continue 'outer;
            }
        }
        groups.push(vec![i]);
    }

    let mut keep = Vec::with_capacity(groups.len());
    for group in &groups {
        let best = group
            .iter()
            .copied()
            .max_by(|&a, &b| {
                let pa = model.log_prob(block, a);
                let pb = model.log_prob(block, b);
                pa.partial_cmp(&pb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| haplotypes[b].sequence().cmp(haplotypes[a].sequence()))
            })
            .expect("non-empty dedup group");
        keep.push(best);
    }
    keep.sort_unstable();

    HaplotypeBlock::new(keep.into_iter().map(|i| haplotypes[i].clone()).collect())
}

/// Default structural dedup: drop later occurrences of a sequence already
/// seen (value-equality, §3's "identified by value equality over sequence").
pub fn deduplicate_structural(block: &HaplotypeBlock) -> HaplotypeBlock {
    let mut seen: HashSet<&Haplotype> = HashSet::new();
    let kept: Vec<Haplotype> = block
        .as_slice()
        .iter()
        .filter(|h| seen.insert(h))
        .cloned()
        .collect();
    HaplotypeBlock::new(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bio_types::genome;

    fn region() -> genome::Interval {
        genome::Interval::new("1".to_owned(), 0..10)
    }

    #[test]
    fn prior_model_dedup_drops_exact_duplicates() {
        let block = HaplotypeBlock::new(vec![
            Haplotype::new(b"AAAA".to_vec(), region()),
            Haplotype::new(b"AAAA".to_vec(), region()),
            Haplotype::new(b"AAAT".to_vec(), region()),
        ]);
        let model = CoalescentModel::new(1.0);
        let deduped = deduplicate_with_prior_model(&block, &model);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn structural_dedup_drops_exact_duplicates() {
        let block = HaplotypeBlock::new(vec![
            Haplotype::new(b"AAAA".to_vec(), region()),
            Haplotype::new(b"AAAA".to_vec(), region()),
            Haplotype::new(b"AAAT".to_vec(), region()),
        ]);
        let deduped = deduplicate_structural(&block);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn single_haplotype_block_is_unchanged() {
        let block = HaplotypeBlock::new(vec![Haplotype::new(b"AAAA".to_vec(), region())]);
        let model = CoalescentModel::new(1.0);
        let deduped = deduplicate_with_prior_model(&block, &model);
        assert_eq!(deduped.len(), 1);
    }
}
