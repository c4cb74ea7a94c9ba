use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::fallback::FallbackBank;
use super::parse::{normalize, parse_questions, validate};
use super::prompt;
use crate::config::GameConfig;
use crate::llm::{GenerateRequest, LlmManager};
use crate::types::{GameSettings, Question};

/// Extra questions requested from each backend on top of its share
const OVERSHOOT_PER_PROVIDER: usize = 2;

/// Produces validated, de-duplicated batches of questions.
///
/// Never returns an empty batch for a non-zero request: when no backend yields
/// anything usable the fallback bank fills in.
pub struct QuestionGenerator {
    llm: Option<LlmManager>,
    fallback: FallbackBank,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
    max_tokens: Option<u32>,
    avoid_recent: usize,
    fallback_cursor: AtomicUsize,
}

impl QuestionGenerator {
    pub fn new(llm: Option<LlmManager>, fallback: FallbackBank, config: &GameConfig) -> Self {
        Self {
            llm: llm.filter(|manager| !manager.is_empty()),
            fallback,
            timeout: config.generation_timeout,
            max_attempts: config.generation_attempts.max(1),
            retry_delay: config.generation_retry_delay,
            max_tokens: config.generation_max_tokens,
            avoid_recent: config.avoid_recent_questions,
            fallback_cursor: AtomicUsize::new(0),
        }
    }

    /// Generator that only ever serves the fallback bank
    pub fn offline(config: &GameConfig) -> Self {
        Self::new(None, config.fallback_bank(), config)
    }

    pub fn has_backends(&self) -> bool {
        self.llm.is_some()
    }

    /// Generate up to `count` new questions, none of which duplicates `avoid`
    /// or each other (case-insensitive, after normalization).
    pub async fn generate_batch(
        &self,
        settings: &GameSettings,
        count: usize,
        avoid: &[String],
    ) -> Vec<Question> {
        if count == 0 {
            return Vec::new();
        }

        let mut collected: Vec<Question> = Vec::with_capacity(count);
        let mut known: HashSet<String> = avoid.iter().map(|t| normalize(t)).collect();

        if let Some(manager) = &self.llm {
            for attempt in 1..=self.max_attempts {
                let needed = count - collected.len();
                let per_provider = needed.div_ceil(manager.len()) + OVERSHOOT_PER_PROVIDER;

                let avoid_list = self.avoid_list(avoid, &collected);
                let request = GenerateRequest {
                    system_prompt: prompt::system_prompt(settings, per_provider, &avoid_list),
                    prompt: prompt::user_prompt(settings, per_provider),
                    temperature: prompt::temperature_for_attempt(attempt),
                    max_tokens: self.max_tokens,
                    timeout: self.timeout,
                    model_override: None,
                };

                let before = collected.len();
                for (provider, response) in manager.generate_from_all(request).await {
                    let raw = match parse_questions(&response.text) {
                        Ok(raw) => raw,
                        Err(e) => {
                            tracing::warn!("Discarding output from {}: {}", provider, e);
                            continue;
                        }
                    };

                    let offered = raw.len();
                    let mut accepted = 0;
                    for item in &raw {
                        let Some(question) = validate(item, ulid::Ulid::new().to_string()) else {
                            continue;
                        };
                        if known.insert(normalize(&question.text)) {
                            collected.push(question);
                            accepted += 1;
                        }
                    }
                    tracing::debug!(
                        "Provider {} ({}, {}ms): {} of {} questions accepted",
                        provider,
                        response.metadata.model,
                        response.metadata.latency_ms,
                        accepted,
                        offered
                    );
                }

                if collected.len() >= count {
                    break;
                }
                if collected.len() == before && attempt < self.max_attempts {
                    tracing::warn!(
                        "Generation attempt {}/{} produced nothing usable, retrying",
                        attempt,
                        self.max_attempts
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        collected.truncate(count);
        if !collected.is_empty() {
            return collected;
        }

        tracing::warn!(
            "All generation attempts failed, using {} fallback questions",
            count
        );
        let offset = self.fallback_cursor.fetch_add(count, Ordering::SeqCst);
        self.fallback.synthesize_avoiding(
            count,
            offset,
            chrono::Utc::now().timestamp_millis(),
            &known,
        )
    }

    /// Most recent texts to steer the backend away from
    fn avoid_list(&self, avoid: &[String], collected: &[Question]) -> Vec<String> {
        let all: Vec<String> = avoid
            .iter()
            .cloned()
            .chain(collected.iter().map(|q| q.text.clone()))
            .collect();
        let skip = all.len().saturating_sub(self.avoid_recent);
        all.into_iter().skip(skip).collect()
    }
}
