mod auth_extractor;
mod rate_limit;
mod tracing_layer;

pub use auth_extractor::*;
pub use rate_limit::*;
pub use tracing_layer::*;
