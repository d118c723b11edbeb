use thiserror::Error;

/// Error kinds produced by the core (§7 of the design). Recoverable kinds
/// (`CapacityExceeded`, `Cancelled`) are surfaced as values on the result
/// rather than as a thrown error; fatal kinds propagate to the region
/// dispatcher, which skips the region and logs.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum Error {
    #[error("haplotype block is empty")]
    EmptyHaplotypeBlock,

    #[error("ploidy must be greater than zero")]
    ZeroPloidy,

    #[error("no samples given")]
    EmptySamples,

    #[error("max_clones must be at least 1")]
    ZeroMaxClones,

    #[error("all {seeds} seed(s) yielded -infinity evidence for a {groups}-group phylogeny")]
    InferenceUnderflow { groups: usize, seeds: usize },

    #[error("genotype combination cap ({cap}) hit for a {groups}-group phylogeny; proceeding with a seeded subset")]
    CapacityExceeded { groups: usize, cap: usize },

    #[error("phylogeny group {child} cannot be added beneath group {parent}: it already has two descendants")]
    ParentFull { parent: usize, child: usize },

    #[error("phylogeny group {id} has {count} descendants, violating the at-most-two invariant")]
    TooManyDescendants { id: usize, count: usize },

    #[error("no topology reached a finite log-evidence for region")]
    NoViableTopology,

    #[error("testcase fixture I/O failed: {0}")]
    TestcaseIo(String),
}

impl Error {
    /// True for the conditions §7 classifies as fatal (must propagate to
    /// the region dispatcher rather than degrade the search in place).
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::InferenceUnderflow { .. } | Error::CapacityExceeded { .. }
        )
    }
}
