//! Prior providers injected into the single-cell model (§4.3, §6): the
//! Genotype Prior Provider, the De Novo Mutation Provider, the combined
//! single-cell tree-edge prior, and the coalescent population prior used
//! only by haplotype deduplication (§4.9).

pub mod coalescent;
pub mod genotype;
pub mod mutation;
pub mod single_cell;

pub use coalescent::CoalescentModel;
pub use genotype::{CoalescentGenotypePrior, GenotypePriorModel, UniformGenotypePrior};
pub use mutation::{DeNovoMutationModel, UniformDeNovoModel};
pub use single_cell::SingleCellPriorModel;
