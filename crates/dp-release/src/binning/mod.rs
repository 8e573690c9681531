//! Histogram binning: edge construction and the variable-type × bin-strategy policy

pub mod edges;
pub mod policy;

pub use edges::{BinEdgeError, BinEdges, UNCATEGORIZED};
pub use policy::{
    label_counts, BinStrategy, BinningInput, BinningPolicyError, HistogramBinningPolicy,
    HistogramCategories,
};
