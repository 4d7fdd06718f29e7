//! Deception responder: role-plays the decoy service via the text generator.

use std::sync::Arc;

use mirage_core::config::GeneratorConfig;

use crate::error::Result;
use crate::generator::TextGenerator;
use crate::prompts;

/// Produces the simulated service response for an allowed command.
///
/// Every engagement generates fresh text; responses are deliberately not
/// cached so the role-play adapts to each payload. A
/// [`GenerationUnavailable`](crate::EngineError::GenerationUnavailable)
/// failure here is surfaced to the caller -- the honeypot's value depends on
/// always answering.
pub struct DeceptionResponder {
    generator: Arc<dyn TextGenerator>,
    config: GeneratorConfig,
}

impl DeceptionResponder {
    pub fn new(generator: Arc<dyn TextGenerator>, config: GeneratorConfig) -> Self {
        Self { generator, config }
    }

    /// Generate the simulated response for one attacker command.
    pub async fn respond(&self, command: &str) -> Result<String> {
        let request = prompts::build_deception_request(command, &self.config);
        self.generator.generate(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::generator::MockGenerator;

    fn make_responder(mock: Arc<MockGenerator>) -> DeceptionResponder {
        DeceptionResponder::new(mock, GeneratorConfig::default())
    }

    #[tokio::test]
    async fn returns_generated_text() {
        let mock = Arc::new(MockGenerator::new());
        mock.push_response("+----+-------+\n| id | user  |\n+----+-------+");
        let responder = make_responder(mock.clone());
        let out = responder.respond("' OR '1'='1'").await.unwrap();
        assert!(out.contains("id"));

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].user_prompt, "' OR '1'='1'");
    }

    #[tokio::test]
    async fn unavailable_generator_surfaces() {
        let mock = Arc::new(MockGenerator::new());
        mock.push_error(EngineError::GenerationUnavailable);
        let responder = make_responder(mock);
        let err = responder.respond("SELECT 1").await.unwrap_err();
        assert!(matches!(err, EngineError::GenerationUnavailable));
    }
}
