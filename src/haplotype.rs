//! The haplotype block and genotype types the core consumes. Haplotype
//! enumeration itself is out of scope (§1); this module only carries the
//! opaque value the rest of the core needs: identity by sequence, a mapped
//! region, and the unordered multiset of haplotypes that makes a genotype.

use std::collections::BTreeMap;
use std::sync::Arc;

use bio_types::genome::{self, AbstractInterval};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A candidate haplotype sequence over a genomic region. Equality and
/// hashing are by sequence value: identified by value equality over
/// sequence, and hashable (§3). The sequence is `Arc`-shared so
/// that genotypes (which reference haplotypes many times over) stay cheap
/// to clone, the way `Insertion` shares its inserted sequence via `Rc` in
/// similar variant types. `Serialize`/`Deserialize` let a block round-trip
/// through a [`crate::testcase::Testcase`] fixture.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Haplotype {
    sequence: Arc<Vec<u8>>,
    region: genome::Interval,
}

impl Haplotype {
    pub fn new(sequence: Vec<u8>, region: genome::Interval) -> Self {
        Haplotype {
            sequence: Arc::new(sequence),
            region,
        }
    }

    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn region(&self) -> &genome::Interval {
        &self.region
    }
}

impl PartialEq for Haplotype {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}
impl Eq for Haplotype {}

impl std::hash::Hash for Haplotype {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
    }
}

impl Ord for Haplotype {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence.cmp(&other.sequence)
    }
}
impl PartialOrd for Haplotype {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A block of candidate haplotypes all mapped to the same region (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HaplotypeBlock {
    haplotypes: Vec<Haplotype>,
}

impl HaplotypeBlock {
    pub fn new(haplotypes: Vec<Haplotype>) -> Self {
        HaplotypeBlock { haplotypes }
    }

    pub fn as_slice(&self) -> &[Haplotype] {
        &self.haplotypes
    }

    pub fn len(&self) -> usize {
        self.haplotypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.haplotypes.is_empty()
    }

    pub fn mapped_region(&self) -> Option<genome::Interval> {
        self.haplotypes.first().map(|h| h.region().clone())
    }

    pub fn remove_indices(&mut self, mut indices: Vec<usize>) {
        indices.sort_unstable();
        indices.dedup();
        for &idx in indices.iter().rev() {
            self.haplotypes.remove(idx);
        }
    }
}

/// An unordered multiset of haplotype indices of fixed ploidy: "how many
/// copies of each haplotype" is kept as a sorted `(index, count)` tally
/// rather than the raw ploidy-length index list, so equality and hashing are
/// order-independent without re-sorting on every comparison. We store
/// indices into the owning `HaplotypeBlock` rather than cloned haplotypes to
/// keep genotype enumeration cheap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genotype {
    counts: Vec<(usize, usize)>, // (haplotype index, copy count), sorted by index
    ploidy: usize,
}

impl Genotype {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        let ploidy = indices.len();
        let mut tally: BTreeMap<usize, usize> = BTreeMap::new();
        for idx in indices {
            *tally.entry(idx).or_insert(0) += 1;
        }
        let counts: Vec<(usize, usize)> = tally.into_iter().collect();
        Genotype { counts, ploidy }
    }

    pub fn ploidy(&self) -> usize {
        self.ploidy
    }

    /// True if this genotype contains at least one copy of haplotype `idx`.
    pub fn contains(&self, idx: usize) -> bool {
        self.counts.iter().any(|&(i, _)| i == idx)
    }

    pub fn haplotype_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.counts
            .iter()
            .flat_map(|&(idx, count)| std::iter::repeat(idx).take(count))
    }

    /// Alleles as an ordered vector for display/diagnostics.
    pub fn alleles(&self) -> Vec<usize> {
        self.haplotype_indices().collect_vec()
    }
}

/// Enumerate every unordered multiset of `ploidy` indices drawn from
/// `0..num_haplotypes`, i.e. every genotype over the block. This is the raw
/// combinatorial building block that the joint-genotype enumerator (§4.2)
/// and the copy-number extension (§4.6) both call with varying ploidy.
pub fn generate_all_genotypes(num_haplotypes: usize, ploidy: usize) -> Vec<Genotype> {
    if ploidy == 0 {
        return vec![Genotype::from_indices(vec![])];
    }
    (0..num_haplotypes)
        .combinations_with_replacement(ploidy)
        .map(Genotype::from_indices)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_all_genotypes_diploid_two_haplotypes() {
        let genotypes = generate_all_genotypes(2, 2);
        // {0,0}, {0,1}, {1,1}
        assert_eq!(genotypes.len(), 3);
    }

    #[test]
    fn genotype_contains() {
        let g = Genotype::from_indices(vec![0, 1]);
        assert!(g.contains(0));
        assert!(g.contains(1));
        assert!(!g.contains(2));
    }

    #[test]
    fn genotype_equality_ignores_order() {
        let a = Genotype::from_indices(vec![1, 0]);
        let b = Genotype::from_indices(vec![0, 1]);
        assert_eq!(a, b);
    }
}
