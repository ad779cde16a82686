use serde::{Deserialize, Serialize};

/// Work queue backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkQueueType {
    #[default]
    Redis,
    InMemory,
}

/// Redis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub connection_timeout_seconds: u64,
    pub max_retry_attempts: u32,
    pub retry_delay_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            connection_timeout_seconds: 30,
            max_retry_attempts: 3,
            retry_delay_seconds: 1,
        }
    }
}

impl RedisConfig {
    /// Validate Redis configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Redis主机地址不能为空"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Redis端口必须大于0"));
        }

        if self.database < 0 {
            return Err(anyhow::anyhow!("Redis数据库索引不能为负数"));
        }

        if self.connection_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("Redis连接超时时间必须大于0"));
        }

        if self.max_retry_attempts == 0 {
            return Err(anyhow::anyhow!("Redis最大重试次数必须大于0"));
        }

        Ok(())
    }

    /// Build Redis connection URL
    pub fn build_url(&self) -> String {
        let auth = if let Some(password) = &self.password {
            format!(":{password}@")
        } else {
            String::new()
        };
        format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database
        )
    }
}

/// Work queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkQueueConfig {
    #[serde(rename = "type")]
    pub r#type: WorkQueueType,
    pub redis: RedisConfig,
    /// 键名前缀，为空时直接使用 `high-priority-queue` 等原始键名
    pub key_prefix: String,
    /// 每个优先级队列为空时的最长等待时间（毫秒）
    pub acquire_wait_ms: u64,
    /// 等待期间的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 已完成任务结果的保留时间（秒）
    pub result_ttl_seconds: u64,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            r#type: WorkQueueType::default(),
            redis: RedisConfig::default(),
            key_prefix: String::new(),
            acquire_wait_ms: 2000,
            poll_interval_ms: 100,
            result_ttl_seconds: 24 * 60 * 60,
        }
    }
}

impl WorkQueueConfig {
    /// Validate work queue configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.r#type == WorkQueueType::Redis {
            self.redis.validate()?;
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("队列轮询间隔必须大于0"));
        }

        if self.result_ttl_seconds == 0 {
            return Err(anyhow::anyhow!("结果保留时间必须大于0"));
        }

        if self.key_prefix.contains(char::is_whitespace) {
            return Err(anyhow::anyhow!("键名前缀不能包含空白字符"));
        }

        Ok(())
    }
}
