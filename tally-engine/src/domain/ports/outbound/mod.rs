mod ledger_store;
mod record_store;
mod weight_generator;

pub use ledger_store::*;
pub use record_store::*;
pub use weight_generator::*;
