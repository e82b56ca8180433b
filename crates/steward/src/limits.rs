//! Resource limits for shell execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource limits for shell execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionLimits {
    /// Wall-clock timeout
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Maximum output returned from a single command, in bytes
    pub max_output_bytes: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_output_bytes: 1024 * 1024, // 1 MB output
        }
    }
}

/// Helper for serializing Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Buffer that limits how much data can be written
#[derive(Debug, Clone)]
pub struct LimitedBuffer {
    buffer: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl LimitedBuffer {
    /// Create a buffer that keeps at most `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
            truncated: false,
        }
    }

    /// Append data, dropping whatever does not fit.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let remaining = self.limit.saturating_sub(self.buffer.len());
        if remaining == 0 {
            if !data.is_empty() {
                self.truncated = true;
            }
            return data.len(); // Pretend we wrote it
        }

        let to_write = data.len().min(remaining);
        self.buffer.extend_from_slice(&data[..to_write]);

        if to_write < data.len() {
            self.truncated = true;
        }

        data.len()
    }

    /// Whether any data was dropped.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    /// Decode the kept bytes as text, appending a marker if anything was dropped.
    pub fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.buffer).into_owned();
        if self.truncated {
            text.push_str("\n[output truncated]");
        }
        text
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.timeout, Duration::from_secs(5));
        assert_eq!(limits.max_output_bytes, 1024 * 1024);
    }

    #[test]
    fn test_limits_deserialize_from_millis() {
        let limits: ExecutionLimits = toml::from_str("timeout_ms = 250").unwrap();
        assert_eq!(limits.timeout, Duration::from_millis(250));
        assert_eq!(limits.max_output_bytes, 1024 * 1024);
    }

    #[test]
    fn test_limited_buffer_under_limit() {
        let mut buf = LimitedBuffer::new(100);
        assert_eq!(buf.write(b"hello"), 5);
        assert!(!buf.was_truncated());
        assert_eq!(buf.into_text(), "hello");
    }

    #[test]
    fn test_limited_buffer_truncates() {
        let mut buf = LimitedBuffer::new(5);
        buf.write(b"hello world");
        assert!(buf.was_truncated());
        assert_eq!(buf.into_text(), "hello\n[output truncated]");
    }

    #[test]
    fn test_limited_buffer_full_then_more() {
        let mut buf = LimitedBuffer::new(3);
        buf.write(b"abc");
        assert!(!buf.was_truncated());
        buf.write(b"d");
        assert!(buf.was_truncated());
    }
}
