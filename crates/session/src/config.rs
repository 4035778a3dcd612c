//! Session configuration
//!
//! All knobs are injected here rather than read from ambient globals; the
//! caller owns settings storage and hands the session a ready config.

use std::time::Duration;

use codedeck_term::Theme;

/// Retry behavior for unexpected disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay multiplier: attempt N waits `base_delay × N`.
    pub base_delay: Duration,
    /// Retries allowed before the session gives up and fails.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 5,
        }
    }
}

/// Configuration for one connection session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint, e.g. `wss://host/ws`.
    pub url: String,
    /// Opaque auth credential, attached as a `token` query parameter.
    pub token: Option<String>,
    pub reconnect: ReconnectConfig,
    /// Outbound queue bound; `enqueue` past this is rejected.
    pub queue_capacity: usize,
    /// Default colors for decoding shell output.
    pub theme: Theme,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            reconnect: ReconnectConfig::default(),
            queue_capacity: 100,
            theme: Theme::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The connect URL with the credential attached. Token auth is the only
    /// handshake mechanism the backend supports; headers are not used.
    pub fn connect_url(&self) -> String {
        match &self.token {
            Some(token) => {
                let sep = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.url, sep, token)
            }
            None => self.url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_appended_as_query_parameter() {
        let config = SessionConfig::new("wss://host/ws").with_token("tok123");
        assert_eq!(config.connect_url(), "wss://host/ws?token=tok123");
    }

    #[test]
    fn token_appended_after_existing_query() {
        let config = SessionConfig::new("wss://host/ws?v=2").with_token("tok123");
        assert_eq!(config.connect_url(), "wss://host/ws?v=2&token=tok123");
    }

    #[test]
    fn no_token_leaves_url_untouched() {
        let config = SessionConfig::new("ws://localhost:3001/ws");
        assert_eq!(config.connect_url(), "ws://localhost:3001/ws");
    }

    #[test]
    fn defaults_match_backoff_contract() {
        let config = SessionConfig::new("ws://x");
        assert_eq!(config.reconnect.base_delay, Duration::from_secs(2));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.queue_capacity, 100);
    }
}
