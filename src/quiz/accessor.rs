use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::quiz::cache::QuestionCache;
use crate::quiz::generator::{Generation, QuestionGenerator};
use crate::quiz::QuestionRecord;

pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Hands questions to chat handlers: from the cache when possible, straight
/// from the model otherwise.
pub struct CacheAccessor {
    cache: Arc<QuestionCache>,
    generator: Arc<QuestionGenerator>,
    wait: Duration,
}

impl CacheAccessor {
    pub fn new(cache: Arc<QuestionCache>, generator: Arc<QuestionGenerator>, wait: Duration) -> Self {
        Self {
            cache,
            generator,
            wait,
        }
    }

    /// Always yields something the front-end can show. When the model quota
    /// is exhausted that is [`QuestionRecord::usage_limit`]; any other failure
    /// gives [`QuestionRecord::unavailable`] carrying the failure detail.
    pub async fn obtain(&self) -> QuestionRecord {
        if let Some(record) = self.cache.dequeue(self.wait).await {
            return record;
        }

        info!("Question cache empty after {:?}, generating on demand", self.wait);

        let detail = match self.generator.generate().await {
            Ok(Generation::Question(record)) => return record,
            Ok(Generation::Malformed(error)) => error.detail,
            Err(e) => e.to_string(),
        };

        if self.generator.is_quota_exhausted(&detail) {
            warn!("Model quota exhausted while serving a question");
            return QuestionRecord::usage_limit();
        }

        warn!("On-demand question generation failed: {}", detail);
        QuestionRecord::unavailable(detail)
    }
}
