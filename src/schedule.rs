//! Equity market session status
//!
//! Reads the broker's current-session endpoint and caches the payload for a
//! short window. Any failure reads as [`MarketState::Unknown`].

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::config::BrokerConfig;
use crate::error::{GexDeskError, Result};

const SESSIONS_ENDPOINT: &str = "/market-time/equities/sessions/current";
const CERT_API_URL: &str = "https://api.cert.tastyworks.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketState {
    Open,
    Closed,
    #[serde(rename = "Pre-Market")]
    PreMarket,
    #[serde(rename = "Post-Market")]
    PostMarket,
    #[serde(other)]
    Unknown,
}

impl MarketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketState::Open => "Open",
            MarketState::Closed => "Closed",
            MarketState::PreMarket => "Pre-Market",
            MarketState::PostMarket => "Post-Market",
            MarketState::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionWindow {
    #[serde(default)]
    pub open_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub close_at: Option<DateTime<Utc>>,
}

/// `data` payload of the current-session response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionData {
    #[serde(default = "unknown_state")]
    pub state: MarketState,
    #[serde(default)]
    pub next_session: Option<SessionWindow>,
    #[serde(default)]
    pub previous_session: Option<SessionWindow>,
}

fn unknown_state() -> MarketState {
    MarketState::Unknown
}

#[derive(Debug, Deserialize)]
struct SessionEnvelope {
    data: Option<SessionData>,
}

impl SessionData {
    pub fn parse(body: &str) -> Result<Option<Self>> {
        let envelope: SessionEnvelope = serde_json::from_str(body)?;
        Ok(envelope.data)
    }

    pub fn next_open(&self) -> Option<DateTime<Utc>> {
        self.next_session.as_ref().and_then(|s| s.open_at)
    }
}

/// Anything that can report the current market state
#[async_trait]
pub trait SessionStatus: Send + Sync {
    async fn market_state(&self) -> MarketState;

    async fn is_market_open(&self) -> bool {
        self.market_state().await == MarketState::Open
    }
}

/// Fixed state, for offline runs
#[derive(Debug, Clone, Copy)]
pub struct FixedSession(pub MarketState);

#[async_trait]
impl SessionStatus for FixedSession {
    async fn market_state(&self) -> MarketState {
        self.0
    }
}

/// Client for the broker's market-sessions endpoint
pub struct MarketSchedule {
    http: Client,
    base_url: String,
    session_token: Option<String>,
    cache_ttl: Duration,
    cache: RwLock<Option<(Instant, SessionData)>>,
}

impl MarketSchedule {
    pub fn new(base_url: &str, session_token: Option<String>, cache_ttl: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("gexdesk/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GexDeskError::Validation(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token,
            cache_ttl,
            cache: RwLock::new(None),
        })
    }

    pub fn from_config(config: &BrokerConfig) -> Result<Self> {
        let base_url = if config.is_test {
            CERT_API_URL
        } else {
            config.api_url.as_str()
        };
        Self::new(
            base_url,
            config.session_token.clone(),
            Duration::from_secs(config.session_cache_secs),
        )
    }

    /// Current session data, served from cache while fresh
    pub async fn session_data(&self) -> Option<SessionData> {
        if let Some((fetched_at, data)) = self.cache.read().await.as_ref() {
            if fetched_at.elapsed() < self.cache_ttl {
                return Some(data.clone());
            }
        }

        match self.fetch().await {
            Ok(Some(data)) => {
                *self.cache.write().await = Some((Instant::now(), data.clone()));
                Some(data)
            }
            Ok(None) => {
                error!("Market session response had no data");
                None
            }
            Err(e) => {
                error!("Failed to fetch market session data: {}", e);
                None
            }
        }
    }

    async fn fetch(&self) -> Result<Option<SessionData>> {
        let token = self.session_token.as_deref().ok_or_else(|| {
            GexDeskError::Auth("No session token available for market schedule".to_string())
        })?;

        let url = format!("{}{}", self.base_url, SESSIONS_ENDPOINT);
        debug!("GET {}", url);
        let body = self
            .http
            .get(&url)
            .header(AUTHORIZATION, token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        SessionData::parse(&body)
    }

    pub async fn next_open(&self) -> Option<DateTime<Utc>> {
        self.session_data().await.and_then(|d| d.next_open())
    }

    pub async fn time_to_next_open(&self) -> Option<ChronoDuration> {
        self.next_open().await.map(|open| open - Utc::now())
    }
}

#[async_trait]
impl SessionStatus for MarketSchedule {
    async fn market_state(&self) -> MarketState {
        self.session_data()
            .await
            .map(|d| d.state)
            .unwrap_or(MarketState::Unknown)
    }
}

/// Render a duration as `1d 3h 20m`, dropping the day part when zero
pub fn format_countdown(duration: ChronoDuration) -> String {
    let total_minutes = duration.num_minutes().max(0);
    let (days, rem) = (total_minutes / (24 * 60), total_minutes % (24 * 60));
    let (hours, minutes) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CLOSED: &str = r#"{
        "data": {
            "state": "Closed",
            "next-session": {
                "open-at": "2025-01-06T14:30:00Z",
                "close-at": "2025-01-06T21:00:00Z"
            },
            "previous-session": {
                "open-at": "2025-01-03T14:30:00Z",
                "close-at": "2025-01-03T21:00:00Z"
            }
        },
        "context": "/market-time/equities/sessions/current"
    }"#;

    #[test]
    fn test_parse_session_payload() {
        let data = SessionData::parse(CLOSED).unwrap().unwrap();
        assert_eq!(data.state, MarketState::Closed);
        assert_eq!(
            data.next_open(),
            Some(Utc.with_ymd_and_hms(2025, 1, 6, 14, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_market_state_names() {
        let state: MarketState = serde_json::from_str("\"Pre-Market\"").unwrap();
        assert_eq!(state, MarketState::PreMarket);
        let state: MarketState = serde_json::from_str("\"Halted\"").unwrap();
        assert_eq!(state, MarketState::Unknown);
        assert_eq!(MarketState::PostMarket.to_string(), "Post-Market");
    }

    #[test]
    fn test_missing_data_is_none() {
        assert!(SessionData::parse(r#"{"context": "x"}"#).unwrap().is_none());
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(ChronoDuration::minutes(3 * 60 + 5)), "3h 5m");
        assert_eq!(
            format_countdown(ChronoDuration::minutes(2 * 24 * 60 + 61)),
            "2d 1h 1m"
        );
    }

    #[tokio::test]
    async fn test_without_token_reads_unknown() {
        let schedule =
            MarketSchedule::new("http://127.0.0.1:9", None, Duration::from_secs(60)).unwrap();
        assert_eq!(schedule.market_state().await, MarketState::Unknown);
        assert!(!schedule.is_market_open().await);
        assert!(schedule.next_open().await.is_none());
    }

    #[tokio::test]
    async fn test_fixed_session() {
        assert!(FixedSession(MarketState::Open).is_market_open().await);
        assert!(!FixedSession(MarketState::Closed).is_market_open().await);
    }
}
