//! Numeric helpers shared across the core: log-space mixing, exp-normalize,
//! and PHRED conversion, all built on `bio::stats::LogProb` the way the rest
//! of the crate does rather than hand-rolling log-sum-exp again.

use bio::stats::{LogProb, PHREDProb, Prob};

lazy_static! {
    /// Smallest probability we are willing to report; guards `-10*log10(p)`
    /// against `p == 0.0` producing an infinite PHRED score.
    pub static ref MIN_PROB_FALSE: f64 = 1e-300;
}

/// `-10 * log10(p_false)`, clamping `p_false` away from zero so a perfectly
/// confident call still yields a finite, if very large, PHRED score.
pub fn probability_false_to_phred(p_false: f64) -> f64 {
    let p = if p_false < *MIN_PROB_FALSE {
        *MIN_PROB_FALSE
    } else if p_false > 1.0 {
        1.0
    } else {
        p_false
    };
    PHREDProb::from(Prob(p)).abs()
}

/// `-10 * log10(1 - p_true)`; the complement of [`probability_false_to_phred`],
/// used for scores defined over "probability this is true" rather than
/// "probability this is false" (e.g. the MAP phylogeny posterior).
pub fn probability_true_to_phred(p_true: f64) -> f64 {
    probability_false_to_phred(1.0 - p_true)
}

/// Exp-normalize a vector of log-evidences into a probability distribution.
///
/// Returns `None` if every entry is `LogProb::ln_zero()` (all candidates
/// were numerically impossible); the caller must treat that as
/// [`crate::errors::Error::InferenceUnderflow`], not as a degenerate but
/// valid distribution.
pub fn exp_normalize(log_weights: &[LogProb]) -> Option<Vec<f64>> {
    if log_weights.is_empty() {
        return Some(Vec::new());
    }
    let total = LogProb::ln_sum_exp(log_weights);
    if total == LogProb::ln_zero() {
        return None;
    }
    Some(log_weights.iter().map(|&w| *Prob::from(w - total)).collect())
}

/// Index of the maximum value, ties broken toward the earliest index so
/// that argmax is deterministic given a fixed input order (§5 Determinism).
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best, (i, &v)| match best {
            None => Some((i, v)),
            Some((_, bv)) if v > bv => Some((i, v)),
            _ => best,
        })
        .map(|(i, _)| i)
}

/// Mix two log-probabilities as a two-component mixture where `log_weight`
/// is the log-probability of the first ("this slot is explained by a bare
/// copy-number event") component and the second component (weighted by its
/// complement) contributes `log_prob`. Used by the single-cell prior model
/// (§4.3) to combine the copy-number and de novo mutation explanations for
/// a genotype's allele transition along a phylogeny edge.
pub fn log_mix(log_weight: LogProb, log_prob: LogProb) -> LogProb {
    LogProb::ln_add_exp(log_weight, log_weight.ln_one_minus_exp() + log_prob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exp_normalize_sums_to_one() {
        let weights = vec![LogProb(-1.0), LogProb(-2.0), LogProb(-0.5)];
        let normalized = exp_normalize(&weights).unwrap();
        assert_relative_eq!(normalized.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn exp_normalize_all_zero_is_none() {
        let weights = vec![LogProb::ln_zero(), LogProb::ln_zero()];
        assert!(exp_normalize(&weights).is_none());
    }

    #[test]
    fn phred_clamps_zero_probability() {
        assert!(probability_false_to_phred(0.0).is_finite());
    }

    #[test]
    fn log_mix_reduces_to_weight_when_prob_is_zero() {
        let mixed = log_mix(LogProb(-1.0), LogProb::ln_zero());
        assert_relative_eq!(mixed.exp(), LogProb(-1.0).exp(), epsilon = 1e-9);
    }

    #[test]
    fn argmax_picks_first_on_tie() {
        assert_eq!(argmax(&[1.0, 2.0, 2.0, 0.5]), Some(1));
    }
}
