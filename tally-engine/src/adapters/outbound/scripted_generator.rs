use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{models::WorklogRecord, ports::outbound::WeightGenerator, GeneratorError};

/// Weight generator that replays canned replies.
///
/// Stands in for the text-generation service in tests and when replies were
/// produced out of band and saved to a file.
#[derive(Debug, Clone)]
pub struct ScriptedWeightGenerator {
    replies: Arc<Vec<Result<String, GeneratorError>>>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedWeightGenerator {
    /// Always reply with `text`.
    pub fn returning(text: impl Into<String>) -> Self {
        Self::with_sequence(vec![Ok(text.into())])
    }

    /// Always fail with `error`.
    pub fn failing(error: GeneratorError) -> Self {
        Self::with_sequence(vec![Err(error)])
    }

    /// Reply in sequence, wrapping around after the last reply.
    pub fn with_sequence(replies: Vec<Result<String, GeneratorError>>) -> Self {
        Self {
            replies: Arc::new(replies),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeightGenerator for ScriptedWeightGenerator {
    async fn generate(&self, _records: &[WorklogRecord]) -> Result<String, GeneratorError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.replies.is_empty() {
            return Err(GeneratorError::Unavailable);
        }
        self.replies[idx % self.replies.len()].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_sequence_and_counts_calls() {
        let generator = ScriptedWeightGenerator::with_sequence(vec![
            Ok("[]".to_string()),
            Err(GeneratorError::Failed("rate limited".to_string())),
        ]);

        assert_eq!(generator.generate(&[]).await, Ok("[]".to_string()));
        assert!(generator.generate(&[]).await.is_err());
        assert_eq!(generator.generate(&[]).await, Ok("[]".to_string()));
        assert_eq!(generator.call_count(), 3);
    }
}
