mod clock;
mod distribution;
mod duration;
mod error;
mod history;
mod intensity;
mod ledger;
mod weights;

pub mod models;
pub mod ports;
pub mod services;

pub use clock::*;
pub use distribution::*;
pub use duration::*;
pub use error::*;
pub use history::*;
pub use intensity::*;
pub use ledger::*;
pub use weights::*;
