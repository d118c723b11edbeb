//! The copy-change genotype set (§4.2 SUPPLEMENT, §4.6): the combined list
//! of genotypes across every ploidy the copy-number extension is willing to
//! try for a non-root group, built once per region and shared by every
//! candidate ploidy assignment.
//!
//! Concatenation order is load-bearing (§9 Open Questions): losses
//! (ascending ploidy, i.e. `default_ploidy - max_loss ..= default_ploidy - 1`),
//! then the default-ploidy block, then gains (ascending). `default_ploidy_idx`
//! is the running offset of the default block within the concatenation, the
//! same quantity `cell_caller.cpp` uses to align the rotation in §4.7.5.

use crate::haplotype::{generate_all_genotypes, Genotype};

/// The combined genotype set plus enough bookkeeping to recover, for any
/// ploidy in range, the slice of `genotypes` that holds it.
pub struct CombinedGenotypeSet {
    pub genotypes: Vec<Genotype>,
    pub default_ploidy_idx: usize,
    /// `(ploidy, start, len)` for each ploidy block, in concatenation order.
    blocks: Vec<(usize, usize, usize)>,
}

impl CombinedGenotypeSet {
    /// Build the combined set for a block of `num_haplotypes` candidate
    /// haplotypes, trying every ploidy in
    /// `default_ploidy - max_loss ..= default_ploidy + max_gain`.
    pub fn build(
        num_haplotypes: usize,
        default_ploidy: usize,
        max_loss: usize,
        max_gain: usize,
    ) -> Self {
        let lo = default_ploidy.saturating_sub(max_loss);
        let hi = default_ploidy + max_gain;

        let mut genotypes = Vec::new();
        let mut blocks = Vec::new();
        let mut default_ploidy_idx = 0;
        for ploidy in lo..=hi {
            let start = genotypes.len();
            let block = generate_all_genotypes(num_haplotypes, ploidy);
            let len = block.len();
            genotypes.extend(block);
            blocks.push((ploidy, start, len));
            if ploidy == default_ploidy {
                default_ploidy_idx = start;
            }
        }

        CombinedGenotypeSet {
            genotypes,
            default_ploidy_idx,
            blocks,
        }
    }

    /// Indices into `genotypes` whose ploidy is exactly `ploidy`, i.e. the
    /// admissible genotype set for a group the copy-number extension has
    /// assigned that ploidy to.
    pub fn indices_for_ploidy(&self, ploidy: usize) -> Vec<usize> {
        self.blocks
            .iter()
            .find(|&&(p, _, _)| p == ploidy)
            .map(|&(_, start, len)| (start..start + len).collect())
            .unwrap_or_default()
    }

    pub fn min_ploidy(&self) -> usize {
        self.blocks.first().map(|&(p, _, _)| p).unwrap_or(0)
    }

    pub fn max_ploidy(&self) -> usize {
        self.blocks.last().map(|&(p, _, _)| p).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_copy_number_range_is_just_the_default_block() {
        let set = CombinedGenotypeSet::build(2, 2, 0, 0);
        assert_eq!(set.default_ploidy_idx, 0);
        assert_eq!(set.genotypes.len(), generate_all_genotypes(2, 2).len());
    }

    #[test]
    fn default_ploidy_idx_is_offset_by_loss_block() {
        let set = CombinedGenotypeSet::build(2, 2, 1, 1);
        let loss_len = generate_all_genotypes(2, 1).len();
        assert_eq!(set.default_ploidy_idx, loss_len);
        let total = loss_len + generate_all_genotypes(2, 2).len() + generate_all_genotypes(2, 3).len();
        assert_eq!(set.genotypes.len(), total);
    }

    #[test]
    fn indices_for_ploidy_select_contiguous_block() {
        let set = CombinedGenotypeSet::build(2, 2, 1, 1);
        let idx = set.indices_for_ploidy(1);
        assert_eq!(idx.len(), generate_all_genotypes(2, 1).len());
        assert_eq!(idx[0], 0);
    }
}
