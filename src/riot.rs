use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::{LeagueEntry, Region, RiotAccount, RiotId, RoutingRegion};
use crate::error::LamError;

pub const DEFAULT_MATCH_COUNT: u32 = 5;
pub const MAX_MATCH_COUNT: u32 = 100;

const MAX_RETRY_AFTER_SECS: u64 = 10;

/// Read-only lookups against the Riot API. Every call is independent and
/// idempotent; failures propagate to the caller unchanged.
pub trait RiotClient: Send + Sync {
    fn account_by_riot_id(
        &self,
        routing: RoutingRegion,
        riot_id: &RiotId,
    ) -> Result<RiotAccount, LamError>;
    fn league_entries_by_puuid(
        &self,
        region: Region,
        puuid: &str,
    ) -> Result<Vec<LeagueEntry>, LamError>;
    fn match_ids_by_puuid(
        &self,
        routing: RoutingRegion,
        puuid: &str,
        query: &MatchHistoryQuery,
    ) -> Result<Vec<String>, LamError>;
    fn match_by_id(&self, routing: RoutingRegion, match_id: &str)
    -> Result<MatchRecord, LamError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchHistoryQuery {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub queue: Option<u32>,
    pub match_type: Option<String>,
    pub start: Option<u32>,
    pub count: u32,
}

impl Default for MatchHistoryQuery {
    fn default() -> Self {
        Self {
            start_time: None,
            end_time: None,
            queue: None,
            match_type: None,
            start: None,
            count: DEFAULT_MATCH_COUNT,
        }
    }
}

impl MatchHistoryQuery {
    pub fn with_count(count: u32) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }

    /// Query string for match-v5 `by-puuid/{puuid}/ids`. The count is clamped
    /// to what the endpoint accepts.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(start_time) = self.start_time {
            pairs.push(("startTime", start_time.timestamp().to_string()));
        }
        if let Some(end_time) = self.end_time {
            pairs.push(("endTime", end_time.timestamp().to_string()));
        }
        if let Some(queue) = self.queue {
            pairs.push(("queue", queue.to_string()));
        }
        if let Some(match_type) = &self.match_type {
            pairs.push(("type", match_type.clone()));
        }
        if let Some(start) = self.start {
            pairs.push(("start", start.to_string()));
        }
        pairs.push((
            "count",
            self.count.clamp(1, MAX_MATCH_COUNT).to_string(),
        ));
        pairs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub game_mode: Option<String>,
    pub queue_id: Option<u32>,
    pub game_creation: Option<i64>,
    pub game_duration: Option<u64>,
    pub participants: Vec<String>,
    #[serde(skip)]
    pub raw_json: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSummary {
    pub champion_name: Option<String>,
    pub kills: u64,
    pub deaths: u64,
    pub assists: u64,
    pub win: bool,
}

impl MatchRecord {
    pub fn from_json(match_id: &str, raw_json: Value) -> Self {
        let info = raw_json.get("info");
        let game_mode = info
            .and_then(|value| value.get("gameMode"))
            .and_then(|value| value.as_str())
            .map(|value| value.to_string());
        let queue_id = info
            .and_then(|value| value.get("queueId"))
            .and_then(|value| value.as_u64())
            .and_then(|value| u32::try_from(value).ok());
        let game_creation = info
            .and_then(|value| value.get("gameCreation"))
            .and_then(|value| value.as_i64());
        let game_duration = info
            .and_then(|value| value.get("gameDuration"))
            .and_then(|value| value.as_u64());
        let participants = raw_json
            .get("metadata")
            .and_then(|value| value.get("participants"))
            .and_then(|value| value.as_array())
            .map(|array| {
                array
                    .iter()
                    .filter_map(|value| value.as_str())
                    .map(|value| value.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            match_id: match_id.to_string(),
            game_mode,
            queue_id,
            game_creation,
            game_duration,
            participants,
            raw_json,
        }
    }

    /// Scoreline of one player in this match.
    pub fn summary_for(&self, puuid: &str) -> Option<ParticipantSummary> {
        let participant = self
            .raw_json
            .get("info")
            .and_then(|value| value.get("participants"))
            .and_then(|value| value.as_array())?
            .iter()
            .find(|value| value.get("puuid").and_then(|p| p.as_str()) == Some(puuid))?;

        let count = |field: &str| {
            participant
                .get(field)
                .and_then(|value| value.as_u64())
                .unwrap_or(0)
        };
        Some(ParticipantSummary {
            champion_name: participant
                .get("championName")
                .and_then(|value| value.as_str())
                .map(|value| value.to_string()),
            kills: count("kills"),
            deaths: count("deaths"),
            assists: count("assists"),
            win: participant
                .get("win")
                .and_then(|value| value.as_bool())
                .unwrap_or(false),
        })
    }
}

/// Fetches a page of match ids, then each match in order, one request at a time.
pub fn match_history<C: RiotClient + ?Sized>(
    client: &C,
    routing: RoutingRegion,
    puuid: &str,
    query: &MatchHistoryQuery,
) -> Result<Vec<MatchRecord>, LamError> {
    let ids = client.match_ids_by_puuid(routing, puuid, query)?;
    ids.iter()
        .map(|match_id| client.match_by_id(routing, match_id))
        .collect()
}

#[derive(Clone)]
pub struct RiotHttpClient {
    client: Client,
    host_template: String,
}

impl RiotHttpClient {
    pub fn new(api_key: &str, timeout: Option<Duration>) -> Result<Self, LamError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(LamError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lam/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LamError::RemoteLookup(err.to_string()))?,
        );
        let mut token = HeaderValue::from_str(api_key).map_err(|_| LamError::MissingApiKey)?;
        token.set_sensitive(true);
        headers.insert("X-Riot-Token", token);

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| LamError::RemoteLookup(err.to_string()))?;

        Ok(Self {
            client,
            host_template: "https://{host}.api.riotgames.com".to_string(),
        })
    }

    /// Points every request at another server, e.g. a local mock.
    /// `{host}` in the template is replaced by the routing value or platform id.
    pub fn with_host_template(mut self, template: impl Into<String>) -> Self {
        self.host_template = template.into();
        self
    }

    fn endpoint(&self, host: &str, segments: &[&str]) -> Result<Url, LamError> {
        let base = self.host_template.replace("{host}", host);
        let mut url =
            Url::parse(&base).map_err(|err| LamError::RemoteLookup(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| LamError::RemoteLookup(format!("cannot build request from {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn account_url(&self, routing: RoutingRegion, riot_id: &RiotId) -> Result<Url, LamError> {
        self.endpoint(
            routing.account_route().as_str(),
            &[
                "riot",
                "account",
                "v1",
                "accounts",
                "by-riot-id",
                &riot_id.game_name,
                &riot_id.tag_line,
            ],
        )
    }

    pub fn league_url(&self, region: Region, puuid: &str) -> Result<Url, LamError> {
        self.endpoint(
            region.platform_id(),
            &["lol", "league", "v4", "entries", "by-puuid", puuid],
        )
    }

    pub fn match_ids_url(&self, routing: RoutingRegion, puuid: &str) -> Result<Url, LamError> {
        self.endpoint(
            routing.as_str(),
            &["lol", "match", "v5", "matches", "by-puuid", puuid, "ids"],
        )
    }

    pub fn match_url(&self, routing: RoutingRegion, match_id: &str) -> Result<Url, LamError> {
        self.endpoint(
            routing.as_str(),
            &["lol", "match", "v5", "matches", match_id],
        )
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LamError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .unwrap_or_else(|_| "Riot API request failed".to_string());
        Err(LamError::RemoteStatus {
            status,
            message: error_message(&body),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, LamError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = retry_after(&resp).unwrap_or_else(|| {
                            Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1))
                        });
                        debug!(status, attempt, ?delay, "retrying Riot API request");
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(LamError::RemoteLookup(err.to_string()));
                }
            }
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&'static str, String)],
    ) -> Result<T, LamError> {
        debug!(url = %url, "Riot API request");
        let response = self.send_with_retries(|| self.client.get(url.clone()).query(query))?;
        let response = Self::handle_status(response)?;
        response
            .json()
            .map_err(|err| LamError::RemoteLookup(err.to_string()))
    }
}

impl RiotClient for RiotHttpClient {
    fn account_by_riot_id(
        &self,
        routing: RoutingRegion,
        riot_id: &RiotId,
    ) -> Result<RiotAccount, LamError> {
        self.get_json(self.account_url(routing, riot_id)?, &[])
    }

    fn league_entries_by_puuid(
        &self,
        region: Region,
        puuid: &str,
    ) -> Result<Vec<LeagueEntry>, LamError> {
        self.get_json(self.league_url(region, puuid)?, &[])
    }

    fn match_ids_by_puuid(
        &self,
        routing: RoutingRegion,
        puuid: &str,
        query: &MatchHistoryQuery,
    ) -> Result<Vec<String>, LamError> {
        self.get_json(self.match_ids_url(routing, puuid)?, &query.query_pairs())
    }

    fn match_by_id(
        &self,
        routing: RoutingRegion,
        match_id: &str,
    ) -> Result<MatchRecord, LamError> {
        let raw_json: Value = self.get_json(self.match_url(routing, match_id)?, &[])?;
        Ok(MatchRecord::from_json(match_id, raw_json))
    }
}

/// Riot error bodies look like `{"status":{"message":"...","status_code":404}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("status")
                .and_then(|status| status.get("message"))
                .and_then(|message| message.as_str())
                .map(|message| message.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

fn retry_after(response: &reqwest::blocking::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn client() -> RiotHttpClient {
        RiotHttpClient::new("RGAPI-test", None).unwrap()
    }

    #[test]
    fn account_url_escapes_riot_id() {
        let riot_id: RiotId = "Hide on bush#KR1".parse().unwrap();
        let url = client()
            .account_url(RoutingRegion::Asia, &riot_id)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://asia.api.riotgames.com/riot/account/v1/accounts/by-riot-id/Hide%20on%20bush/KR1"
        );
    }

    #[test]
    fn league_url_uses_platform_host() {
        let url = client().league_url(Region::Euw1, "abc").unwrap();
        assert_eq!(
            url.as_str(),
            "https://euw1.api.riotgames.com/lol/league/v4/entries/by-puuid/abc"
        );
    }

    #[test]
    fn host_template_override() {
        let url = client()
            .with_host_template("http://127.0.0.1:8080/{host}")
            .match_url(RoutingRegion::Europe, "EUW1_1")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8080/europe/lol/match/v5/matches/EUW1_1"
        );
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            RiotHttpClient::new("  ", None),
            Err(LamError::MissingApiKey)
        ));
    }

    #[test]
    fn match_query_pairs() {
        let query = MatchHistoryQuery {
            start_time: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            end_time: None,
            queue: Some(420),
            match_type: Some("ranked".to_string()),
            start: Some(10),
            count: 500,
        };
        assert_eq!(
            query.query_pairs(),
            vec![
                ("startTime", "1704067200".to_string()),
                ("queue", "420".to_string()),
                ("type", "ranked".to_string()),
                ("start", "10".to_string()),
                ("count", "100".to_string()),
            ]
        );
        assert_eq!(
            MatchHistoryQuery::default().query_pairs(),
            vec![("count", "5".to_string())]
        );
    }

    #[test]
    fn riot_error_body_message() {
        let body = r#"{"status":{"message":"Data not found - no results found","status_code":404}}"#;
        assert_eq!(error_message(body), "Data not found - no results found");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn match_record_extraction() {
        let raw = json!({
            "metadata": {"matchId": "EUW1_1", "participants": ["p1", "p2"]},
            "info": {
                "gameMode": "CLASSIC",
                "queueId": 420,
                "gameDuration": 1800,
                "participants": [
                    {"puuid": "p1", "championName": "Ahri", "kills": 7, "deaths": 2, "assists": 9, "win": true},
                    {"puuid": "p2", "championName": "Zed", "kills": 1, "deaths": 8, "assists": 0, "win": false}
                ]
            }
        });
        let record = MatchRecord::from_json("EUW1_1", raw);
        assert_eq!(record.queue_id, Some(420));
        assert_eq!(record.participants, vec!["p1", "p2"]);
        let summary = record.summary_for("p1").unwrap();
        assert_eq!(summary.champion_name.as_deref(), Some("Ahri"));
        assert_eq!((summary.kills, summary.deaths, summary.assists), (7, 2, 9));
        assert!(summary.win);
        assert!(record.summary_for("p3").is_none());
    }
}
