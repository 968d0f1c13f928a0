mod ids;
mod worklog;

pub use ids::*;
pub use worklog::*;
