//! Question sourcing with graceful degradation.
//!
//! Three tiers: a configured LLM provider chain, then the built-in bank,
//! then a hardcoded default. A game turn never fails because question
//! generation did; it just gets a less fresh question.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::games::WyrQuestion;
use crate::llm::{GenerateRequest, LlmManager};

const WYR_PROMPT: &str = "Write one party-game \"would you rather\" question as a JSON object \
    with exactly two keys, \"option_a\" and \"option_b\", each a short phrase completing the \
    sentence \"Would you rather...\". Keep it playful and safe for a mixed group. \
    Answer with only the JSON object.";

const PARANOIA_PROMPT: &str = "Write one party-game \"paranoia\" question: a single short \
    question of the form \"Who here ...?\" or \"Who in this room ...?\" that must be answered \
    with another player's name. Keep it playful and safe for a mixed group. \
    Answer with only the question text.";

/// Built-in bank used when no LLM is reachable.
const WYR_BANK: &[(&str, &str)] = &[
    ("be able to fly", "be able to read minds"),
    ("always sing instead of speak", "always dance instead of walk"),
    ("live without music", "live without movies"),
    ("fight one horse-sized duck", "fight a hundred duck-sized horses"),
    ("only eat breakfast food", "only eat dinner food"),
    ("have unlimited free flights", "never pay for food again"),
    ("know every language", "play every instrument"),
    ("relive the same day for a year", "skip a year entirely"),
];

const PARANOIA_BANK: &[&str] = &[
    "Who here would survive the longest in a zombie apocalypse?",
    "Who in this room checks their phone the most?",
    "Who here would accidentally become famous?",
    "Who in this room is most likely to cry at a movie?",
    "Who here would win a lying contest?",
    "Who in this room would forget their own birthday?",
    "Who here gives the best advice?",
    "Who in this room is secretly the most competitive?",
];

const DEFAULT_WYR: (&str, &str) = ("always be ten minutes late", "always be twenty minutes early");
const DEFAULT_PARANOIA: &str = "Who here is most likely to become famous?";

/// Fallback chain for question generation. Cheap to clone and share; the
/// LLM manager, when present, is behind an `Arc`.
#[derive(Clone, Default)]
pub struct QuestionChain {
    llm: Option<Arc<LlmManager>>,
    timeout: Duration,
    max_tokens: u32,
}

impl QuestionChain {
    pub fn new(llm: Option<Arc<LlmManager>>, timeout: Duration, max_tokens: u32) -> Self {
        Self {
            llm,
            timeout,
            max_tokens,
        }
    }

    /// Bank-and-default only, no network.
    pub fn offline() -> Self {
        Self::default()
    }

    pub async fn next_would_you_rather(&self) -> WyrQuestion {
        if let Some(question) = self.generate_wyr().await {
            return question;
        }

        if WYR_BANK.is_empty() {
            let (a, b) = DEFAULT_WYR;
            return WyrQuestion {
                option_a: a.to_string(),
                option_b: b.to_string(),
            };
        }
        let (a, b) = WYR_BANK[rand::rng().random_range(0..WYR_BANK.len())];
        WyrQuestion {
            option_a: a.to_string(),
            option_b: b.to_string(),
        }
    }

    pub async fn next_paranoia(&self) -> String {
        if let Some(question) = self.generate_paranoia().await {
            return question;
        }

        if PARANOIA_BANK.is_empty() {
            return DEFAULT_PARANOIA.to_string();
        }
        PARANOIA_BANK[rand::rng().random_range(0..PARANOIA_BANK.len())].to_string()
    }

    async fn generate_wyr(&self) -> Option<WyrQuestion> {
        let text = self.generate(WYR_PROMPT).await?;
        match serde_json::from_str::<WyrQuestion>(strip_code_fences(&text)) {
            Ok(question) if !question.option_a.is_empty() && !question.option_b.is_empty() => {
                Some(question)
            }
            Ok(_) => {
                tracing::warn!("Generated question had empty options, falling back to bank");
                None
            }
            Err(e) => {
                tracing::warn!("Could not parse generated question ({}), falling back to bank", e);
                None
            }
        }
    }

    async fn generate_paranoia(&self) -> Option<String> {
        let text = self.generate(PARANOIA_PROMPT).await?;
        let question = text.trim().trim_matches('"').to_string();
        if question.is_empty() {
            tracing::warn!("Generated question was empty, falling back to bank");
            return None;
        }
        Some(question)
    }

    async fn generate(&self, prompt: &str) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            max_tokens: Some(self.max_tokens),
            timeout: self.timeout,
            model_override: None,
        };
        match llm.generate(request).await {
            Ok(response) => Some(response.text),
            Err(e) => {
                tracing::warn!("Question generation failed: {}", e);
                None
            }
        }
    }
}

/// LLMs like to wrap JSON in markdown fences even when told not to.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{
        GenerateResponse, LlmError, LlmProvider, LlmResult, ResponseMetadata,
    };
    use async_trait::async_trait;

    struct CannedProvider {
        text: Option<String>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        async fn generate(&self, _request: GenerateRequest) -> LlmResult<GenerateResponse> {
            match &self.text {
                Some(text) => Ok(GenerateResponse {
                    text: text.clone(),
                    metadata: ResponseMetadata {
                        provider: "canned".to_string(),
                        model: "canned".to_string(),
                        tokens_used: None,
                        latency_ms: 1,
                    },
                }),
                None => Err(LlmError::ApiError("canned failure".to_string())),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn chain_with(text: Option<&str>) -> QuestionChain {
        let manager = LlmManager::new(vec![Box::new(CannedProvider {
            text: text.map(str::to_string),
        })]);
        QuestionChain::new(Some(Arc::new(manager)), Duration::from_secs(1), 100)
    }

    #[tokio::test]
    async fn test_generated_question_is_used() {
        let chain = chain_with(Some(
            r#"{"option_a": "time travel to the past", "option_b": "time travel to the future"}"#,
        ));
        let question = chain.next_would_you_rather().await;
        assert_eq!(question.option_a, "time travel to the past");
        assert_eq!(question.option_b, "time travel to the future");
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let chain = chain_with(Some(
            "```json\n{\"option_a\": \"a\", \"option_b\": \"b\"}\n```",
        ));
        let question = chain.next_would_you_rather().await;
        assert_eq!(question.option_a, "a");
        assert_eq!(question.option_b, "b");
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_bank() {
        let chain = chain_with(None);
        let question = chain.next_would_you_rather().await;
        assert!(WYR_BANK
            .iter()
            .any(|(a, b)| question.option_a == *a && question.option_b == *b));
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back_to_bank() {
        let chain = chain_with(Some("Would you rather fly or swim? Great question!"));
        let question = chain.next_would_you_rather().await;
        assert!(WYR_BANK
            .iter()
            .any(|(a, b)| question.option_a == *a && question.option_b == *b));
    }

    #[tokio::test]
    async fn test_offline_chain_serves_paranoia_bank() {
        let chain = QuestionChain::offline();
        let question = chain.next_paranoia().await;
        assert!(PARANOIA_BANK.contains(&question.as_str()));
    }

    #[tokio::test]
    async fn test_generated_paranoia_question_is_trimmed() {
        let chain = chain_with(Some("  \"Who here naps the most?\"  "));
        let question = chain.next_paranoia().await;
        assert_eq!(question, "Who here naps the most?");
    }
}
