//! Phylogeny Search Driver (§4.5): a greedy level-by-level model-selection
//! loop over phylogeny shapes, stopping the first time a level fails to beat
//! the previous best log-evidence.
//!
//! The K=1/K=2/K=3/K>=4 topology proposal rule is taken structurally from
//! `propose_next_phylogenies` in `cell_caller.cpp`: K=3 is the only level
//! that proposes more than one *new* shape relative to extending the prior
//! level, and K>=4 extends the single best K-1 topology breadth-first, not a
//! fresh global search.

use bio::stats::LogProb;
use rayon::prelude::*;
use serde::Serialize;

use crate::cancellation::CancellationToken;
use crate::engine::{EngineRun, ExecutionPolicy, Inferences, VariationalEngine};
use crate::errors::Error;
use crate::genotype_enum::{seed_joint_genotypes, JointGenotype};
use crate::haplotype::Genotype;
use crate::phylogeny::Phylogeny;

/// One row of the §3 SUPPLEMENT diagnostic trace.
#[derive(Debug, Clone, Serialize)]
pub struct SearchTraceEntry {
    pub num_groups: usize,
    pub log_evidence: f64,
    pub seeds_used: usize,
    pub fully_enumerated: bool,
}

/// Writes a `--trace-out` CSV, one row per explored topology (§3 SUPPLEMENT).
/// Diagnostic only: never read back by the caller.
pub fn write_trace_csv(trace: &[SearchTraceEntry], writer: impl std::io::Write) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for entry in trace {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

/// All topologies explored by the driver, including the "over-shot" level
/// that triggered the stop rule (§9 Open Questions: this level is kept in
/// the result set and normalized over along with everything else).
pub struct SearchResult {
    pub topologies: Vec<Inferences>,
    pub trace: Vec<SearchTraceEntry>,
    /// One [`Error::CapacityExceeded`] value per topology where the
    /// genotype-combination cap was hit (§7: recoverable, carried as a value
    /// rather than thrown).
    pub capacity_exceeded: Vec<Error>,
}

pub struct SearchParams {
    pub max_clones: usize,
    pub max_joint_genotypes: usize,
    pub max_seeds: usize,
    pub top_m_seeds: usize,
    pub rng_seed: u64,
    /// `execution_policy` (§5): `ParByTopology` evaluates every candidate
    /// shape at a level concurrently via `rayon`; the other policies (and a
    /// single-shape level, e.g. K=1/K=2) run the candidates sequentially.
    pub execution_policy: ExecutionPolicy,
}

/// Run the driver's greedy level-by-level search (§4.5), seeding and
/// evaluating every proposed topology at each level with `engine`.
pub fn search(
    engine: &VariationalEngine<'_>,
    num_samples: usize,
    genotypes: &[Genotype],
    genotype_prior: impl Fn(usize) -> LogProb + Copy + Sync,
    mutation_log_prob: impl Fn(usize, usize) -> LogProb + Copy + Sync,
    params: &SearchParams,
    cancel: &CancellationToken,
) -> Result<SearchResult, Error> {
    let mut topologies: Vec<Inferences> = Vec::new();
    let mut trace: Vec<SearchTraceEntry> = Vec::new();
    let mut capacity_exceeded: Vec<Error> = Vec::new();

    let k1_shape = Phylogeny::with_root(());
    let (k1_outcome, k1_trace, k1_capacity) = evaluate_shape(
        engine,
        &k1_shape,
        num_samples,
        genotypes,
        genotype_prior,
        mutation_log_prob,
        params,
        cancel,
    )?;
    let k1 = match k1_outcome {
        // §7: all seeds underflowing at K=1 means the region emits no calls,
        // not a hard error — there is no prior level to fall back to.
        ShapeOutcome::Converged(inferences) => inferences,
        ShapeOutcome::Cancelled | ShapeOutcome::Underflowed => {
            return Ok(SearchResult {
                topologies,
                trace,
                capacity_exceeded,
            })
        }
    };
    trace.extend(k1_trace);
    capacity_exceeded.extend(k1_capacity);
    let mut best_evidence = k1.log_evidence;
    topologies.push(k1);
    log::info!("phylogeny search: K=1 log_evidence={:.3}", best_evidence.0);

    let mut best_shape_at_prev_level: Phylogeny<()> = Phylogeny::with_root(());

    for k in 2..=params.max_clones {
        let candidate_shapes = propose_shapes(k, &best_shape_at_prev_level);
        if candidate_shapes.is_empty() {
            break;
        }

        let evaluate = |shape: &Phylogeny<()>| {
            evaluate_shape(
                engine,
                shape,
                num_samples,
                genotypes,
                genotype_prior,
                mutation_log_prob,
                params,
                cancel,
            )
        };
        let outcomes: Vec<Result<(ShapeOutcome, Option<SearchTraceEntry>, Option<Error>), Error>> =
            match params.execution_policy {
                ExecutionPolicy::ParByTopology => {
                    candidate_shapes.par_iter().map(evaluate).collect()
                }
                ExecutionPolicy::Serial | ExecutionPolicy::ParBySeed => {
                    candidate_shapes.iter().map(evaluate).collect()
                }
            };

        let mut level_best_evidence = LogProb::ln_zero();
        let mut level_best_shape: Option<Phylogeny<()>> = None;
        let mut level_results: Vec<Inferences> = Vec::new();

        for (shape, outcome) in candidate_shapes.iter().zip(outcomes) {
            let (outcome, entry, capacity) = outcome?;
            let result = match outcome {
                ShapeOutcome::Converged(result) => result,
                ShapeOutcome::Cancelled => {
                    return Ok(SearchResult {
                        topologies,
                        trace,
                        capacity_exceeded,
                    })
                }
                // §7: this one topology is excluded from the search results;
                // the level survives on whichever of its siblings converged.
                ShapeOutcome::Underflowed => continue,
            };
            trace.extend(entry);
            capacity_exceeded.extend(capacity);
            if result.log_evidence > level_best_evidence {
                level_best_evidence = result.log_evidence;
                level_best_shape = Some(shape.clone());
            }
            level_results.push(result);
        }

        if level_results.is_empty() {
            break;
        }

        log::info!(
            "phylogeny search: K={} best log_evidence={:.3}",
            k,
            level_best_evidence.0
        );

        let is_overshoot = level_best_evidence < best_evidence;
        topologies.extend(level_results);

        if is_overshoot {
            // The over-shot level stays in the result set (§9 Open
            // Questions); downstream aggregation normalizes over it too.
            break;
        }

        best_evidence = level_best_evidence;
        best_shape_at_prev_level = level_best_shape.expect("non-empty level has a best shape");
    }

    Ok(SearchResult {
        topologies,
        trace,
        capacity_exceeded,
    })
}

/// `evaluate_shape`'s three-way result: a converged topology, a cancellation
/// that should stop the whole search, or an all-seeds-underflowed topology
/// that the caller excludes without aborting its siblings (§7).
enum ShapeOutcome {
    Converged(Inferences),
    Cancelled,
    Underflowed,
}

/// Seeds and scores one candidate shape. Returns the trace row alongside
/// the outcome (rather than pushing into a shared `Vec`) so the caller can
/// run this over several shapes concurrently under `ParByTopology` and
/// append to the trace afterwards, in candidate order.
fn evaluate_shape(
    engine: &VariationalEngine<'_>,
    shape: &Phylogeny<()>,
    num_samples: usize,
    genotypes: &[Genotype],
    genotype_prior: impl Fn(usize) -> LogProb,
    mutation_log_prob: impl Fn(usize, usize) -> LogProb,
    params: &SearchParams,
    cancel: &CancellationToken,
) -> Result<(ShapeOutcome, Option<SearchTraceEntry>, Option<Error>), Error> {
    let seed_result = seed_joint_genotypes(
        shape,
        genotypes.len(),
        params.max_joint_genotypes,
        params.top_m_seeds,
        params.rng_seed,
        genotype_prior,
        mutation_log_prob,
    );
    let seeds: Vec<JointGenotype> = seed_result.seeds.into_iter().take(params.max_seeds).collect();

    // §7: the cap is a recoverable condition, captured as an `Error` value on
    // the result rather than thrown — the search continues with the seeded
    // subset, and the caller decides what to do with the value.
    let capacity_exceeded = if seed_result.fully_enumerated {
        None
    } else {
        let err = Error::CapacityExceeded {
            groups: shape.size(),
            cap: params.max_joint_genotypes,
        };
        log::debug!("{} ({} seed(s) used)", err, seeds.len());
        Some(err)
    };

    match engine.infer(shape, num_samples, genotypes, &seeds, cancel) {
        Ok(EngineRun::Converged(inferences)) => {
            let entry = SearchTraceEntry {
                num_groups: shape.size(),
                log_evidence: inferences.log_evidence.0,
                seeds_used: seeds.len(),
                fully_enumerated: seed_result.fully_enumerated,
            };
            Ok((ShapeOutcome::Converged(inferences), Some(entry), capacity_exceeded))
        }
        Ok(EngineRun::Cancelled) => Ok((ShapeOutcome::Cancelled, None, capacity_exceeded)),
        Err(Error::InferenceUnderflow { .. }) => {
            log::debug!(
                "all seeds underflowed for a {}-group phylogeny; excluding this topology",
                shape.size()
            );
            Ok((ShapeOutcome::Underflowed, None, capacity_exceeded))
        }
        Err(e) => Err(e),
    }
}

/// §4.5.1 topology extension: the exact K=1/K=2/K=3/K>=4 proposal rule.
fn propose_shapes(k: usize, best_prev: &Phylogeny<()>) -> Vec<Phylogeny<()>> {
    match k {
        0 | 1 => vec![],
        2 => {
            let mut shape = Phylogeny::with_root(());
            shape.add_descendant((), 0).expect("root accepts a first child");
            vec![shape]
        }
        3 => {
            let mut chain = Phylogeny::with_root(());
            let a = chain.add_descendant((), 0).expect("root accepts a first child");
            chain.add_descendant((), a).expect("single-child group accepts a child");

            let mut fork = Phylogeny::with_root(());
            fork.add_descendant((), 0).expect("root accepts a first child");
            fork.add_descendant((), 0).expect("root accepts a second child");

            vec![chain, fork]
        }
        _ => {
            let mut shapes = Vec::new();
            for id in best_prev.group_ids() {
                if best_prev.num_descendants(id) < 2 {
                    let mut shape = best_prev.clone();
                    shape
                        .add_descendant((), id)
                        .expect("checked fewer than two descendants");
                    shapes.push(shape);
                }
            }
            shapes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k2_proposes_single_topology() {
        let shapes = propose_shapes(2, &Phylogeny::with_root(()));
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].size(), 2);
    }

    #[test]
    fn k3_proposes_chain_and_fork() {
        let shapes = propose_shapes(3, &Phylogeny::with_root(()));
        assert_eq!(shapes.len(), 2);
        assert!(shapes.iter().all(|s| s.size() == 3));
    }

    #[test]
    fn k4_extends_every_group_with_room() {
        let mut fork = Phylogeny::with_root(());
        fork.add_descendant((), 0).unwrap();
        fork.add_descendant((), 0).unwrap();
        // Root is full; only the two leaves admit a child each.
        let shapes = propose_shapes(4, &fork);
        assert_eq!(shapes.len(), 2);
        assert!(shapes.iter().all(|s| s.size() == 4));
    }
}
