use jobflow_core::models::{JobId, QueueTier};

const PROCESSING_QUEUE: &str = "processing-queue";
const DEAD_LETTER_QUEUE: &str = "dead-letter-queue";

/// 工作队列使用的键名
///
/// 前缀为空时直接使用原始键名，否则为 `{prefix}:{name}`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn build_key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", self.prefix, name)
        }
    }

    pub fn tier(&self, tier: QueueTier) -> String {
        self.build_key(tier.queue_name())
    }

    pub fn processing(&self) -> String {
        self.build_key(PROCESSING_QUEUE)
    }

    pub fn dead_letter(&self) -> String {
        self.build_key(DEAD_LETTER_QUEUE)
    }

    pub fn job(&self, job_id: &JobId) -> String {
        self.build_key(&format!("job:{job_id}"))
    }

    pub fn worker_stats(&self, worker_id: &str) -> String {
        self.build_key(&format!("worker:{worker_id}:stats"))
    }
}
