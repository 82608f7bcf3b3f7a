use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::quiz::cache::QuestionCache;
use crate::quiz::generator::{Generation, QuestionGenerator};
use crate::quiz::CACHE_MIN;

/// Low watermark and pause lengths of the refill loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillPolicy {
    pub cache_min: usize,
    /// After every generation attempt that reached the model.
    pub generated_pause: Duration,
    /// Between checks while the cache sits at or above the watermark.
    pub idle_pause: Duration,
    pub error_pause: Duration,
    pub quota_pause: Duration,
}

impl Default for RefillPolicy {
    fn default() -> Self {
        Self {
            cache_min: CACHE_MIN,
            generated_pause: Duration::from_secs(1),
            idle_pause: Duration::from_secs(2),
            error_pause: Duration::from_secs(5),
            quota_pause: Duration::from_secs(35),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    /// The cache was at or above the watermark; nothing was generated.
    Idle,
    Stored,
    /// The reply was unparseable or lacked a prompt or code snippet.
    Discarded,
    /// A question was generated but the cache was already full.
    Rejected,
    QuotaExhausted,
    UpstreamFailed,
}

impl RefillOutcome {
    pub fn pause(self, policy: &RefillPolicy) -> Duration {
        match self {
            RefillOutcome::Idle => policy.idle_pause,
            RefillOutcome::Stored | RefillOutcome::Discarded | RefillOutcome::Rejected => {
                policy.generated_pause
            }
            RefillOutcome::QuotaExhausted => policy.quota_pause,
            RefillOutcome::UpstreamFailed => policy.error_pause,
        }
    }
}

/// Keeps the question cache above its low watermark.
pub struct RefillWorker {
    cache: Arc<QuestionCache>,
    generator: Arc<QuestionGenerator>,
    policy: RefillPolicy,
}

impl RefillWorker {
    pub fn new(
        cache: Arc<QuestionCache>,
        generator: Arc<QuestionGenerator>,
        policy: RefillPolicy,
    ) -> Self {
        Self {
            cache,
            generator,
            policy,
        }
    }

    /// Run the refill loop on its own task for the rest of the process.
    ///
    /// The loop never exits by itself; abort the returned handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "Starting question refill worker (watermark {}, capacity {})",
            self.policy.cache_min,
            self.cache.capacity()
        );
        tokio::spawn(async move {
            loop {
                let outcome = self.step().await;
                tokio::time::sleep(outcome.pause(&self.policy)).await;
            }
        })
    }

    /// One iteration of the loop, without the pause that follows it.
    pub async fn step(&self) -> RefillOutcome {
        let size = self.cache.len();
        if size >= self.policy.cache_min {
            return RefillOutcome::Idle;
        }

        match self.generator.generate().await {
            Ok(Generation::Question(record)) if record.is_cacheable() => {
                match self.cache.try_enqueue(record) {
                    Ok(()) => {
                        debug!("Cached a question ({} queued)", size + 1);
                        RefillOutcome::Stored
                    }
                    Err(_) => RefillOutcome::Rejected,
                }
            }
            Ok(Generation::Question(_)) => {
                debug!("Discarding a question without prompt or code");
                RefillOutcome::Discarded
            }
            Ok(Generation::Malformed(error)) => {
                debug!("Discarding unparseable reply: {}", error.detail);
                RefillOutcome::Discarded
            }
            Err(e) => {
                let text = e.to_string();
                if self.generator.is_quota_exhausted(&text) {
                    warn!(
                        "Model quota exhausted, pausing refill for {:?}",
                        self.policy.quota_pause
                    );
                    RefillOutcome::QuotaExhausted
                } else {
                    warn!("Question generation failed: {}", text);
                    RefillOutcome::UpstreamFailed
                }
            }
        }
    }
}
