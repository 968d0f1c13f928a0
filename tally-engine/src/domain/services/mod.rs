mod rebalance;

pub use rebalance::*;
