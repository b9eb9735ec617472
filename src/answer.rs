//! Grounded answer generation with retry and fallback.
//!
//! The [`AnswerAssembler`] turns a question and its [`RetrievalResult`]
//! into an [`Answer`]. Generation runs as an explicit state machine:
//!
//! ```text
//!            success
//! Attempt(n) ───────────────────────────────▶ Done(primary)
//!    │ transient failure or timeout, n < max_retries
//!    ▼
//! Backoff(n) ── sleep initial × multiplier^n (capped) ──▶ Attempt(n+1)
//!
//! Attempt(n) ── permanent failure or retries exhausted ─▶ Fallback
//! Fallback   ── fallback enabled ──────────────────────▶ Done(fallback)
//! Fallback   ── fallback disabled ─────────────────────▶ Done(failure)
//! ```
//!
//! The fallback answer is built offline from the cited excerpts, so an
//! unavailable model degrades answers without failing the request.

use std::sync::Arc;
use std::time::Duration;

use talk_to_docs_core::generation::{GenerationError, GenerationProvider};
use talk_to_docs_core::models::{Answer, GenerationMode, RetrievalResult};
use talk_to_docs_core::prompt::{build_prompt, fallback_answer};
use talk_to_docs_core::{Error, Result};

use crate::config::GenerationConfig;

/// Exponential backoff schedule for primary generation attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// Delay before retry number `retry + 1`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let capped = millis.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

enum Step {
    Attempt(u32),
    Backoff { attempt: u32, delay: Duration },
    Fallback(String),
    Done(Outcome),
}

enum Outcome {
    Primary(String),
    Fallback(String),
    Failed(String),
}

pub struct AnswerAssembler {
    generator: Arc<dyn GenerationProvider>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    max_context_chars: usize,
    fallback_enabled: bool,
}

impl AnswerAssembler {
    pub fn new(generator: Arc<dyn GenerationProvider>, config: &GenerationConfig) -> Self {
        Self {
            generator,
            policy: RetryPolicy::from_config(config),
            attempt_timeout: config.timeout(),
            max_context_chars: config.max_context_chars,
            fallback_enabled: config.fallback_enabled,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Answer `question` from `retrieval`.
    ///
    /// Citations are exactly the chunks that made it into the prompt.
    ///
    /// # Errors
    ///
    /// [`Error::GenerationFailure`] only when fallback is disabled and the
    /// primary path gave up.
    pub async fn answer(&self, question: &str, retrieval: &RetrievalResult) -> Result<Answer> {
        let plan = build_prompt(question, retrieval, self.max_context_chars);
        let grounded = !plan.citations.is_empty();

        let outcome = self.run(&plan.prompt).await;
        let (text, mode) = match outcome {
            Outcome::Primary(text) => (text, GenerationMode::Primary),
            Outcome::Fallback(reason) => {
                tracing::warn!(
                    generator = self.generator.name(),
                    reason = %reason,
                    "answering in fallback mode"
                );
                (fallback_answer(question, &plan.citations), GenerationMode::Fallback)
            }
            Outcome::Failed(reason) => return Err(Error::GenerationFailure(reason)),
        };

        Ok(Answer {
            text,
            citations: plan.citations,
            mode,
            grounded,
        })
    }

    async fn run(&self, prompt: &str) -> Outcome {
        let mut step = Step::Attempt(0);
        loop {
            step = match step {
                Step::Attempt(attempt) => self.attempt(prompt, attempt).await,
                Step::Backoff { attempt, delay } => {
                    tokio::time::sleep(delay).await;
                    Step::Attempt(attempt + 1)
                }
                Step::Fallback(reason) => {
                    if self.fallback_enabled {
                        Step::Done(Outcome::Fallback(reason))
                    } else {
                        Step::Done(Outcome::Failed(reason))
                    }
                }
                Step::Done(outcome) => return outcome,
            };
        }
    }

    async fn attempt(&self, prompt: &str, attempt: u32) -> Step {
        let result = match tokio::time::timeout(self.attempt_timeout, self.generator.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Transient(format!(
                "no response within {} ms",
                self.attempt_timeout.as_millis()
            ))),
        };

        match result {
            Ok(text) => Step::Done(Outcome::Primary(text)),
            Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                let delay = self.policy.backoff(attempt);
                tracing::warn!(
                    generator = self.generator.name(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "generation attempt failed, retrying"
                );
                Step::Backoff { attempt, delay }
            }
            Err(e) => Step::Fallback(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use talk_to_docs_core::models::RetrievedChunk;

    /// Fails with the scripted errors, then succeeds.
    struct Scripted {
        failures: Vec<GenerationError>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(failures: Vec<GenerationError>) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(n) {
                Some(e) => Err(e.clone()),
                None => Ok(format!("answer to: {}", prompt.len())),
            }
        }
    }

    struct Hangs;

    #[async_trait]
    impl GenerationProvider for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".to_string())
        }
    }

    fn config() -> GenerationConfig {
        GenerationConfig {
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 1000,
            ..GenerationConfig::default()
        }
    }

    fn retrieval() -> RetrievalResult {
        RetrievalResult {
            chunks: vec![RetrievedChunk {
                chunk_id: "c1".to_string(),
                document_id: "d1".to_string(),
                source_name: "facts.txt".to_string(),
                sequence_index: 0,
                text: "The capital of France is Paris.".to_string(),
                score: 0.8,
            }],
        }
    }

    fn transient() -> GenerationError {
        GenerationError::Transient("503".to_string())
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(30), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let generator = Scripted::new(vec![transient(), transient()]);
        let assembler = AnswerAssembler::new(generator.clone(), &config());
        let answer = assembler.answer("q", &retrieval()).await.unwrap();
        assert_eq!(answer.mode, GenerationMode::Primary);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert!(answer.grounded);
        assert_eq!(answer.citations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fall_back() {
        let generator = Scripted::new(vec![transient(); 10]);
        let assembler = AnswerAssembler::new(generator.clone(), &config());
        let answer = assembler.answer("Where?", &retrieval()).await.unwrap();
        assert_eq!(answer.mode, GenerationMode::Fallback);
        // One initial attempt plus max_retries.
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
        assert!(answer.text.contains("The capital of France is Paris."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_skips_retries() {
        let generator = Scripted::new(vec![GenerationError::Permanent("no key".to_string())]);
        let assembler = AnswerAssembler::new(generator.clone(), &config());
        let answer = assembler.answer("q", &retrieval()).await.unwrap();
        assert_eq!(answer.mode, GenerationMode::Fallback);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_disabled_surfaces_failure() {
        let generator = Scripted::new(vec![GenerationError::Permanent("no key".to_string())]);
        let config = GenerationConfig {
            fallback_enabled: false,
            ..config()
        };
        let assembler = AnswerAssembler::new(generator, &config);
        let err = assembler.answer("q", &retrieval()).await.unwrap_err();
        assert!(matches!(err, Error::GenerationFailure(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_transient() {
        let config = GenerationConfig {
            timeout_secs: 1,
            ..config()
        };
        let assembler = AnswerAssembler::new(Arc::new(Hangs), &config);
        let answer = assembler.answer("q", &retrieval()).await.unwrap();
        assert_eq!(answer.mode, GenerationMode::Fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_retrieval_is_ungrounded() {
        let generator = Scripted::new(vec![GenerationError::Permanent("off".to_string())]);
        let assembler = AnswerAssembler::new(generator, &config());
        let answer = assembler.answer("q", &RetrievalResult::default()).await.unwrap();
        assert!(!answer.grounded);
        assert!(answer.citations.is_empty());
        assert_eq!(answer.mode, GenerationMode::Fallback);
    }
}
