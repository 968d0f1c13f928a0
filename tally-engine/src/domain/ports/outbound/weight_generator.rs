use async_trait::async_trait;

use crate::domain::{models::WorklogRecord, GeneratorError};

/// Outbound port for the text-generation service that scores relative effort.
///
/// Implementations return the raw reply. It is expected to contain a JSON array
/// of `{index, hours}` somewhere in it; see [`crate::domain::parse_weight_payload`].
#[async_trait]
pub trait WeightGenerator: Send + Sync + 'static {
    async fn generate(&self, records: &[WorklogRecord]) -> Result<String, GeneratorError>;
}
