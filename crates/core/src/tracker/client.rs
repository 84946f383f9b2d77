//! Gazelle API client.
//!
//! All calls go through a single rate gate: the tracker's usage policy caps
//! request frequency, so requests are serialized and spaced by a minimum
//! interval measured from the end of the previous call. No concurrency is
//! ever applied to this client.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;

use super::{Candidate, ReleaseGroup, Tracker, TrackerError};

const USER_AGENT: &str = concat!("gapfiller/", env!("CARGO_PKG_VERSION"));

/// Spaces calls by a minimum interval, stamped after each call completes.
/// Holding the lock across the call also serializes callers.
struct RateGate {
    last: Mutex<Option<Instant>>,
    interval: Duration,
}

impl RateGate {
    fn new(interval: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            interval,
        }
    }

    async fn run<T, F>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!("Rate gate: waiting {wait:?}");
                sleep(wait).await;
            }
        }
        let result = call.await;
        *last = Some(Instant::now());
        result
    }
}

/// Session details obtained from `action=index` after login.
#[derive(Debug, Clone)]
struct AccountInfo {
    authkey: String,
    passkey: String,
    user_id: u64,
}

/// Credential strategies in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginStrategy {
    ApiKey,
    SessionCookie,
    Password,
}

/// API key wins outright when configured; a session cookie falls back to
/// username/password; otherwise password is the only option.
fn strategy_order(config: &TrackerConfig) -> Vec<LoginStrategy> {
    if !config.api_key.is_empty() {
        vec![LoginStrategy::ApiKey]
    } else if !config.session_cookie.is_empty() {
        vec![LoginStrategy::SessionCookie, LoginStrategy::Password]
    } else {
        vec![LoginStrategy::Password]
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    status: String,
    #[serde(default)]
    response: Value,
}

/// Splits "server said no" from "client couldn't parse": a non-success
/// status is absence, an undecodable body is a hard error.
fn parse_envelope(bytes: &[u8]) -> Result<Option<Value>, TrackerError> {
    let envelope: ApiEnvelope = serde_json::from_slice(bytes)
        .map_err(|e| TrackerError::MalformedResponse(e.to_string()))?;
    if envelope.status == "success" {
        Ok(Some(envelope.response))
    } else {
        debug!("Tracker returned status {:?}", envelope.status);
        Ok(None)
    }
}

/// Gazelle ids arrive as numbers or decimal strings depending on endpoint.
fn id_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Authenticated Gazelle client. Construction logs in; a client that exists
/// is a client with a working session.
pub struct GazelleClient {
    client: Client,
    config: TrackerConfig,
    account: AccountInfo,
    api_key_auth: bool,
    gate: RateGate,
}

impl GazelleClient {
    /// Logs in using the configured credentials, trying each applicable
    /// strategy in order and short-circuiting on the first success.
    pub async fn login(config: TrackerConfig) -> Result<Self, TrackerError> {
        for strategy in strategy_order(&config) {
            match Self::attempt(&config, strategy).await {
                Ok(client) => {
                    info!("Logged in via {strategy:?} as user {}", client.account.user_id);
                    return Ok(client);
                }
                Err(e) => warn!("Login via {strategy:?} failed: {e}"),
            }
        }
        Err(TrackerError::AllLoginsFailed)
    }

    async fn attempt(
        config: &TrackerConfig,
        strategy: LoginStrategy,
    ) -> Result<Self, TrackerError> {
        let mut headers = HeaderMap::new();
        let api_key_auth = matches!(strategy, LoginStrategy::ApiKey);

        match strategy {
            LoginStrategy::ApiKey => {
                let value = HeaderValue::from_str(&config.api_key)
                    .map_err(|_| TrackerError::MissingCredential("api_key"))?;
                headers.insert(AUTHORIZATION, value);
            }
            LoginStrategy::SessionCookie => {
                let value =
                    HeaderValue::from_str(&format!("session={}", config.session_cookie))
                        .map_err(|_| TrackerError::MissingCredential("session_cookie"))?;
                headers.insert(COOKIE, value);
            }
            LoginStrategy::Password => {
                if config.username.is_empty() {
                    return Err(TrackerError::MissingCredential("username"));
                }
            }
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        if matches!(strategy, LoginStrategy::Password) {
            let url = format!("{}/login.php", config.base_url());
            let params = [
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ];
            let response = client.post(&url).form(&params).send().await?;
            if !response.status().is_success() && !response.status().is_redirection() {
                return Err(TrackerError::MalformedResponse(format!(
                    "login.php returned {}",
                    response.status()
                )));
            }
        }

        let account = Self::fetch_account_info(&client, config).await?;
        Ok(Self {
            client,
            config: config.clone(),
            account,
            api_key_auth,
            gate: RateGate::new(Duration::from_millis(config.rate_limit_ms)),
        })
    }

    /// `action=index` doubles as the session validity probe.
    async fn fetch_account_info(
        client: &Client,
        config: &TrackerConfig,
    ) -> Result<AccountInfo, TrackerError> {
        let url = format!("{}/ajax.php", config.base_url());
        let response = client.get(&url).query(&[("action", "index")]).send().await?;
        let bytes = response.bytes().await?;
        let payload = parse_envelope(&bytes)?
            .ok_or_else(|| TrackerError::MalformedResponse("index declined".to_string()))?;

        let authkey = payload["authkey"].as_str().unwrap_or_default().to_string();
        let passkey = payload["passkey"].as_str().unwrap_or_default().to_string();
        let user_id = id_from_value(&payload["id"]).ok_or_else(|| {
            TrackerError::MalformedResponse("index response missing user id".to_string())
        })?;
        if authkey.is_empty() || passkey.is_empty() {
            return Err(TrackerError::MalformedResponse(
                "index response missing auth keys".to_string(),
            ));
        }
        Ok(AccountInfo {
            authkey,
            passkey,
            user_id,
        })
    }

    /// A single rate-limited AJAX call. `Ok(None)` means the server said
    /// no; a malformed payload is a hard error.
    pub async fn request(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Option<Value>, TrackerError> {
        let url = format!("{}/ajax.php", self.config.base_url());
        let mut query: Vec<(&str, String)> = vec![("action", action.to_string())];
        if !self.api_key_auth {
            query.push(("auth", self.account.authkey.clone()));
        }
        query.extend(params.iter().map(|(k, v)| (*k, v.clone())));

        let response = self
            .gate
            .run(self.client.get(&url).query(&query).send())
            .await?;
        let bytes = response.bytes().await?;
        parse_envelope(&bytes)
    }

    /// Lazily enumerates the account's snatched torrents, one fixed-size
    /// page at a time.
    pub fn snatched(&self, page_size: u64) -> SnatchedPages<'_> {
        SnatchedPages {
            source: self,
            page: 0,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }
}

/// One page of the snatched listing. `Ok(None)` means the server declined
/// the request.
#[async_trait]
trait SnatchedSource: Sync {
    async fn snatched_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Option<Value>, TrackerError>;
}

#[async_trait]
impl SnatchedSource for GazelleClient {
    async fn snatched_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<Option<Value>, TrackerError> {
        let params = [
            ("id", self.account.user_id.to_string()),
            ("type", "snatched".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        self.request("user_torrents", &params).await
    }
}

#[async_trait]
impl Tracker for GazelleClient {
    async fn fetch_group(&self, group_id: u64) -> Result<Option<ReleaseGroup>, TrackerError> {
        let payload = match self
            .request("torrentgroup", &[("id", group_id.to_string())])
            .await?
        {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let group = serde_json::from_value(payload)
            .map_err(|e| TrackerError::MalformedResponse(format!("torrentgroup: {e}")))?;
        Ok(Some(group))
    }

    async fn download_torrent(&self, torrent_id: u64) -> Result<Option<Vec<u8>>, TrackerError> {
        let url = format!("{}/torrents.php", self.config.base_url());
        let query = [
            ("action", "download".to_string()),
            ("id", torrent_id.to_string()),
            ("authkey", self.account.authkey.clone()),
            ("torrent_pass", self.account.passkey.clone()),
        ];

        let response = self
            .gate
            .run(self.client.get(&url).query(&query).send())
            .await?;

        let is_torrent = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/x-bittorrent"))
            .unwrap_or(false);
        if !response.status().is_success() || !is_torrent {
            debug!("Torrent {torrent_id} download declined by tracker");
            return Ok(None);
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }

    fn permalink(&self, torrent_id: u64) -> String {
        format!("{}/torrents.php?torrentid={torrent_id}", self.config.base_url())
    }

    fn announce_url(&self) -> String {
        format!(
            "{}/{}/announce",
            self.config.announce_host(),
            self.account.passkey
        )
    }
}

/// Forward-only, restartable-from-scratch pull over the snatched listing.
/// Buffers one page; ends on the first empty page.
pub struct SnatchedPages<'a> {
    source: &'a dyn SnatchedSource,
    page: u64,
    page_size: u64,
    buffer: VecDeque<Candidate>,
    exhausted: bool,
}

impl SnatchedPages<'_> {
    pub async fn next(&mut self) -> Result<Option<Candidate>, TrackerError> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Ok(Some(candidate));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), TrackerError> {
        let offset = self.page * self.page_size;
        let payload = match self.source.snatched_page(self.page_size, offset).await? {
            Some(payload) => payload,
            None => {
                warn!("Snatched listing declined at offset {offset}, stopping enumeration");
                self.exhausted = true;
                return Ok(());
            }
        };

        let entries = payload["snatched"].as_array().cloned().unwrap_or_default();
        if entries.is_empty() {
            self.exhausted = true;
            return Ok(());
        }

        info!(
            "Fetched snatched results {} to {}",
            offset,
            offset + self.page_size - 1
        );
        for entry in &entries {
            let group_id = id_from_value(&entry["groupId"]);
            let torrent_id = id_from_value(&entry["torrentId"]);
            if let (Some(group_id), Some(torrent_id)) = (group_id, torrent_id) {
                self.buffer.push_back(Candidate {
                    group_id,
                    torrent_id,
                });
            } else {
                warn!("Skipping malformed snatched entry: {entry}");
            }
        }
        self.page += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(api_key: &str, cookie: &str, username: &str) -> TrackerConfig {
        TrackerConfig {
            api_key: api_key.to_string(),
            session_cookie: cookie.to_string(),
            username: username.to_string(),
            ..TrackerConfig::default()
        }
    }

    #[test]
    fn test_api_key_wins_outright() {
        let order = strategy_order(&config_with("key", "cookie", "user"));
        assert_eq!(order, vec![LoginStrategy::ApiKey]);
    }

    #[test]
    fn test_cookie_falls_back_to_password() {
        let order = strategy_order(&config_with("", "cookie", "user"));
        assert_eq!(
            order,
            vec![LoginStrategy::SessionCookie, LoginStrategy::Password]
        );
    }

    #[test]
    fn test_password_only() {
        let order = strategy_order(&config_with("", "", "user"));
        assert_eq!(order, vec![LoginStrategy::Password]);
    }

    #[test]
    fn test_parse_envelope_success() {
        let payload = parse_envelope(br#"{"status":"success","response":{"x":1}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(payload["x"], 1);
    }

    #[test]
    fn test_parse_envelope_failure_is_absence() {
        let result = parse_envelope(br#"{"status":"failure","error":"bad"}"#).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_parse_envelope_garbage_is_hard_error() {
        let result = parse_envelope(b"<html>rate limited</html>");
        assert!(matches!(result, Err(TrackerError::MalformedResponse(_))));
    }

    #[test]
    fn test_id_from_value_accepts_numbers_and_strings() {
        assert_eq!(id_from_value(&serde_json::json!(42)), Some(42));
        assert_eq!(id_from_value(&serde_json::json!("42")), Some(42));
        assert_eq!(id_from_value(&serde_json::json!(null)), None);
        assert_eq!(id_from_value(&serde_json::json!(-1)), None);
    }

    struct ScriptedPages {
        pages: std::sync::Mutex<VecDeque<Value>>,
        fetches: std::sync::atomic::AtomicUsize,
    }

    impl ScriptedPages {
        fn new(pages: Vec<Value>) -> Self {
            Self {
                pages: std::sync::Mutex::new(pages.into()),
                fetches: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnatchedSource for ScriptedPages {
        async fn snatched_page(
            &self,
            _limit: u64,
            _offset: u64,
        ) -> Result<Option<Value>, TrackerError> {
            self.fetches
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let page = self.pages.lock().unwrap().pop_front();
            Ok(Some(page.unwrap_or_else(|| serde_json::json!({ "snatched": [] }))))
        }
    }

    fn pages_over(source: &ScriptedPages, page_size: u64) -> SnatchedPages<'_> {
        SnatchedPages {
            source,
            page: 0,
            page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn entry(group_id: u64, torrent_id: u64) -> Value {
        serde_json::json!({ "groupId": group_id, "torrentId": torrent_id })
    }

    #[tokio::test]
    async fn test_snatched_empty_first_page_yields_nothing() {
        let source = ScriptedPages::new(vec![serde_json::json!({ "snatched": [] })]);
        let mut pages = pages_over(&source, 10);

        assert_eq!(pages.next().await.unwrap(), None);
        assert_eq!(source.fetch_count(), 1);

        // Exhaustion is sticky; further pulls never hit the server again.
        assert_eq!(pages.next().await.unwrap(), None);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_snatched_stops_after_first_empty_page() {
        let source = ScriptedPages::new(vec![
            serde_json::json!({ "snatched": [entry(1, 10), entry(2, 20)] }),
            serde_json::json!({ "snatched": [] }),
        ]);
        let mut pages = pages_over(&source, 2);

        // Construction fetches nothing; the first pull buffers one page.
        assert_eq!(source.fetch_count(), 0);
        assert_eq!(
            pages.next().await.unwrap(),
            Some(Candidate { group_id: 1, torrent_id: 10 })
        );
        assert_eq!(source.fetch_count(), 1);

        // Second candidate comes from the buffer, no prefetch.
        assert_eq!(
            pages.next().await.unwrap(),
            Some(Candidate { group_id: 2, torrent_id: 20 })
        );
        assert_eq!(source.fetch_count(), 1);

        assert_eq!(pages.next().await.unwrap(), None);
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_snatched_skips_malformed_entries() {
        let source = ScriptedPages::new(vec![
            serde_json::json!({ "snatched": [
                entry(1, 10),
                { "groupId": "not a number", "torrentId": 20 },
                { "groupId": "3", "torrentId": "30" },
            ] }),
            serde_json::json!({ "snatched": [] }),
        ]);
        let mut pages = pages_over(&source, 10);

        assert_eq!(
            pages.next().await.unwrap(),
            Some(Candidate { group_id: 1, torrent_id: 10 })
        );
        assert_eq!(
            pages.next().await.unwrap(),
            Some(Candidate { group_id: 3, torrent_id: 30 })
        );
        assert_eq!(pages.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rate_gate_spaces_consecutive_calls() {
        let gate = RateGate::new(Duration::from_millis(50));
        let started = std::time::Instant::now();
        gate.run(async {}).await;
        gate.run(async {}).await;
        gate.run(async {}).await;
        // Two inter-call gaps of at least the configured interval.
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_rate_gate_first_call_is_immediate() {
        let gate = RateGate::new(Duration::from_secs(10));
        let started = std::time::Instant::now();
        gate.run(async {}).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
