//! Coalescent population prior, injected per §6 ("Coalescent Population
//! Prior") and used only by haplotype deduplication (§4.9). The mathematical
//! contract is given by the caller: we take a population-scaled mutation
//! rate `theta` and score each haplotype in a block by how divergent it is
//! from the rest of the block, the infinite-alleles intuition behind
//! coalescent models of haplotype diversity (cf. the Watterson estimator).

use bio::stats::LogProb;

use crate::haplotype::HaplotypeBlock;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoalescentModel {
    /// Population-scaled mutation rate (`theta = 4*N_e*mu` in the
    /// diploid neutral coalescent).
    theta: f64,
}

impl CoalescentModel {
    pub fn new(theta: f64) -> Self {
        CoalescentModel { theta }
    }

    /// Unnormalized log coalescent probability of the haplotype at `index`
    /// within `block`: higher for haplotypes closer (in Hamming distance)
    /// to the rest of the block, since under neutral coalescent genealogies
    /// recent, shared lineages are more probable than deeply diverged ones.
    pub fn log_prob(&self, block: &HaplotypeBlock, index: usize) -> LogProb {
        let haplotypes = block.as_slice();
        let target = &haplotypes[index];
        if haplotypes.len() <= 1 {
            return LogProb::ln_one();
        }
        let total_distance: f64 = haplotypes
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != index)
            .map(|(_, other)| hamming_distance(target.sequence(), other.sequence()) as f64)
            .sum();
        let mean_distance = total_distance / (haplotypes.len() - 1) as f64;
        LogProb(-self.theta * mean_distance)
    }
}

fn hamming_distance(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .zip(b.iter())
        .filter(|(x, y)| x != y)
        .count()
        + (a.len() as isize - b.len() as isize).unsigned_abs() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use bio_types::genome;
    use crate::haplotype::Haplotype;

    fn region() -> genome::Interval {
        genome::Interval::new("1".to_owned(), 0..10)
    }

    #[test]
    fn identical_haplotype_has_highest_prob() {
        let block = HaplotypeBlock::new(vec![
            Haplotype::new(b"AAAA".to_vec(), region()),
            Haplotype::new(b"AAAA".to_vec(), region()),
            Haplotype::new(b"AAAT".to_vec(), region()),
        ]);
        let model = CoalescentModel::new(1.0);
        let p_dup = model.log_prob(&block, 0);
        let p_divergent = model.log_prob(&block, 2);
        assert!(p_dup > p_divergent);
    }
}
