use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LamError;

pub const SOLO_QUEUE: &str = "RANKED_SOLO_5x5";
pub const FLEX_QUEUE: &str = "RANKED_FLEX_SR";

const APEX_TIERS: &[&str] = &["MASTER", "GRANDMASTER", "CHALLENGER"];
const MIN_USERNAME_LEN: usize = 3;

static DESCRIPTOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+?--.+?#.+?--.+$").expect("descriptor pattern"));
static RIOT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.+#.+$").expect("riot id pattern"));

/// Regional routing value used by the account and match endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingRegion {
    Americas,
    Asia,
    Europe,
    Sea,
}

impl RoutingRegion {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingRegion::Americas => "americas",
            RoutingRegion::Asia => "asia",
            RoutingRegion::Europe => "europe",
            RoutingRegion::Sea => "sea",
        }
    }

    /// account-v1 is not served from the SEA cluster.
    pub fn account_route(self) -> RoutingRegion {
        match self {
            RoutingRegion::Sea => RoutingRegion::Asia,
            other => other,
        }
    }
}

impl fmt::Display for RoutingRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Game server an account plays on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Br1,
    Eun1,
    Euw1,
    Jp1,
    Kr,
    La1,
    La2,
    Na1,
    Oc1,
    Tr1,
    Ru,
    Ph2,
    Sg2,
    Th2,
    Tw2,
    Vn2,
}

impl Region {
    pub fn platform_id(self) -> &'static str {
        match self {
            Region::Br1 => "br1",
            Region::Eun1 => "eun1",
            Region::Euw1 => "euw1",
            Region::Jp1 => "jp1",
            Region::Kr => "kr",
            Region::La1 => "la1",
            Region::La2 => "la2",
            Region::Na1 => "na1",
            Region::Oc1 => "oc1",
            Region::Tr1 => "tr1",
            Region::Ru => "ru",
            Region::Ph2 => "ph2",
            Region::Sg2 => "sg2",
            Region::Th2 => "th2",
            Region::Tw2 => "tw2",
            Region::Vn2 => "vn2",
        }
    }

    pub fn routing(self) -> RoutingRegion {
        match self {
            Region::Br1 | Region::La1 | Region::La2 | Region::Na1 => RoutingRegion::Americas,
            Region::Jp1 | Region::Kr => RoutingRegion::Asia,
            Region::Eun1 | Region::Euw1 | Region::Tr1 | Region::Ru => RoutingRegion::Europe,
            Region::Oc1 | Region::Ph2 | Region::Sg2 | Region::Th2 | Region::Tw2 | Region::Vn2 => {
                RoutingRegion::Sea
            }
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.platform_id())
    }
}

impl FromStr for Region {
    type Err = LamError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let region = match value.trim().to_lowercase().as_str() {
            "br1" | "br" => Region::Br1,
            "eun1" | "eune" => Region::Eun1,
            "euw1" | "euw" => Region::Euw1,
            "jp1" | "jp" => Region::Jp1,
            "kr" => Region::Kr,
            "la1" | "lan" => Region::La1,
            "la2" | "las" => Region::La2,
            "na1" | "na" => Region::Na1,
            "oc1" | "oce" => Region::Oc1,
            "tr1" | "tr" => Region::Tr1,
            "ru" => Region::Ru,
            "ph2" => Region::Ph2,
            "sg2" => Region::Sg2,
            "th2" => Region::Th2,
            "tw2" => Region::Tw2,
            "vn2" => Region::Vn2,
            _ => return Err(LamError::InvalidRegion(value.to_string())),
        };
        Ok(region)
    }
}

/// Riot identity record as returned by account-v1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiotAccount {
    pub puuid: String,
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub tag_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniSeries {
    pub losses: u32,
    pub progress: String,
    pub target: u32,
    pub wins: u32,
}

/// One ranked queue entry as returned by league-v4.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueEntry {
    #[serde(default)]
    pub league_id: Option<String>,
    #[serde(default)]
    pub puuid: Option<String>,
    #[serde(default)]
    pub summoner_id: Option<String>,
    pub queue_type: String,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default)]
    pub league_points: i32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub hot_streak: bool,
    #[serde(default)]
    pub veteran: bool,
    #[serde(default)]
    pub fresh_blood: bool,
    #[serde(default)]
    pub inactive: bool,
    #[serde(default)]
    pub mini_series: Option<MiniSeries>,
}

impl LeagueEntry {
    /// Rounded win percentage, 0 when no games were played.
    pub fn win_rate(&self) -> u32 {
        let total = u64::from(self.wins) + u64::from(self.losses);
        if total == 0 {
            return 0;
        }
        ((f64::from(self.wins) / total as f64) * 100.0).round() as u32
    }

    pub fn is_apex(&self) -> bool {
        self.tier
            .as_deref()
            .map(|tier| APEX_TIERS.contains(&tier))
            .unwrap_or(false)
    }

    /// "GOLD II 54 LP", or just tier and LP for apex tiers.
    pub fn display_rank(&self) -> String {
        let tier = self.tier.as_deref().unwrap_or("UNRANKED");
        match (self.is_apex(), self.rank.as_deref()) {
            (false, Some(rank)) => format!("{tier} {rank} {} LP", self.league_points),
            _ => format!("{tier} {} LP", self.league_points),
        }
    }
}

/// A managed credential plus the identity and ranked data cached for it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub game_name: String,
    pub tag_line: String,
    pub user_name: String,
    pub password: String,
    pub region: Region,
    pub riot_data: RiotAccount,
    #[serde(default)]
    pub league_data: Vec<LeagueEntry>,
}

impl Account {
    pub fn puuid(&self) -> &str {
        &self.riot_data.puuid
    }

    pub fn riot_id(&self) -> RiotId {
        RiotId {
            game_name: self.game_name.clone(),
            tag_line: self.tag_line.clone(),
        }
    }

    pub fn queue_entry(&self, queue_type: &str) -> Option<&LeagueEntry> {
        self.league_data
            .iter()
            .find(|entry| entry.queue_type == queue_type)
    }

    pub fn solo_queue_entry(&self) -> Option<&LeagueEntry> {
        self.queue_entry(SOLO_QUEUE)
    }

    pub fn is_ranked(&self) -> bool {
        self.solo_queue_entry().is_some()
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("game_name", &self.game_name)
            .field("tag_line", &self.tag_line)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("region", &self.region)
            .field("riot_data", &self.riot_data)
            .field("league_data", &self.league_data)
            .finish()
    }
}

/// Fields to merge into a stored account. `None` leaves the field untouched.
///
/// The user name is the registry key and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub game_name: Option<String>,
    pub tag_line: Option<String>,
    pub password: Option<String>,
    pub region: Option<Region>,
    pub riot_data: Option<RiotAccount>,
    pub league_data: Option<Vec<LeagueEntry>>,
}

impl AccountPatch {
    pub fn password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn league_data(entries: Vec<LeagueEntry>) -> Self {
        Self {
            league_data: Some(entries),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(self, account: &mut Account) {
        if let Some(game_name) = self.game_name {
            account.game_name = game_name;
        }
        if let Some(tag_line) = self.tag_line {
            account.tag_line = tag_line;
        }
        if let Some(password) = self.password {
            account.password = password;
        }
        if let Some(region) = self.region {
            account.region = region;
        }
        if let Some(riot_data) = self.riot_data {
            account.riot_data = riot_data;
        }
        if let Some(league_data) = self.league_data {
            account.league_data = league_data;
        }
    }
}

/// Accounts keyed by user name, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountMap {
    entries: Vec<(String, Account)>,
}

impl AccountMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, user_name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == user_name)
    }

    pub fn contains_key(&self, user_name: &str) -> bool {
        self.position(user_name).is_some()
    }

    pub fn get(&self, user_name: &str) -> Option<&Account> {
        self.entries
            .iter()
            .find(|(key, _)| key == user_name)
            .map(|(_, account)| account)
    }

    pub fn get_mut(&mut self, user_name: &str) -> Option<&mut Account> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == user_name)
            .map(|(_, account)| account)
    }

    /// Inserts or replaces in place, keeping the original position on replace.
    pub fn insert(&mut self, user_name: String, account: Account) -> Option<Account> {
        match self.position(&user_name) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, account)),
            None => {
                self.entries.push((user_name, account));
                None
            }
        }
    }

    pub fn remove(&mut self, user_name: &str) -> Option<Account> {
        let index = self.position(user_name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Account)> {
        self.entries
            .iter()
            .map(|(key, account)| (key.as_str(), account))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Account> {
        self.entries.iter().map(|(_, account)| account)
    }

    pub fn entries(&self) -> &[(String, Account)] {
        &self.entries
    }
}

impl FromIterator<(String, Account)> for AccountMap {
    fn from_iter<I: IntoIterator<Item = (String, Account)>>(iter: I) -> Self {
        let mut map = AccountMap::new();
        for (user_name, account) in iter {
            map.insert(user_name, account);
        }
        map
    }
}

impl IntoIterator for AccountMap {
    type Item = (String, Account);
    type IntoIter = std::vec::IntoIter<(String, Account)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

impl FromStr for RiotId {
    type Err = LamError;

    /// Splits on the first `#`; any later `#` stays in the tag line.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !RIOT_ID.is_match(value) {
            return Err(LamError::InvalidRiotId(value.to_string()));
        }
        let (game_name, tag_line) = value
            .split_once('#')
            .ok_or_else(|| LamError::InvalidRiotId(value.to_string()))?;
        if game_name.trim().is_empty() || tag_line.trim().is_empty() {
            return Err(LamError::InvalidRiotId(value.to_string()));
        }
        Ok(Self {
            game_name: game_name.to_string(),
            tag_line: tag_line.to_string(),
        })
    }
}

/// A (username, Riot ID, password) triple waiting to be resolved.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountDescriptor {
    pub username: String,
    pub riot_id: RiotId,
    pub password: String,
}

impl AccountDescriptor {
    /// Single-add path: fields come in separately and are validated as a form would.
    pub fn new(username: &str, riot_id: &str, password: &str) -> Result<Self, LamError> {
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(LamError::InvalidUsername(format!(
                "{username} (must be at least {MIN_USERNAME_LEN} characters)"
            )));
        }
        if password.is_empty() {
            return Err(LamError::MissingPassword);
        }
        Ok(Self {
            username: username.to_string(),
            riot_id: riot_id.parse()?,
            password: password.to_string(),
        })
    }

    /// Best-effort username of a raw bulk line, for reporting lines that fail to parse.
    pub fn username_hint(line: &str) -> String {
        let line = line.trim();
        line.split_once("--")
            .map(|(username, _)| username)
            .unwrap_or(line)
            .to_string()
    }
}

impl fmt::Debug for AccountDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountDescriptor")
            .field("username", &self.username)
            .field("riot_id", &self.riot_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl FromStr for AccountDescriptor {
    type Err = LamError;

    /// Parses `username--gamename#tag--password`. Splits happen at the first
    /// `--`, then the next `--`; the password keeps whatever remains.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let line = value.trim();
        if !DESCRIPTOR_LINE.is_match(line) {
            return Err(LamError::InvalidDescriptor(line.to_string()));
        }
        let (username, rest) = line
            .split_once("--")
            .ok_or_else(|| LamError::InvalidDescriptor(line.to_string()))?;
        let (riot_id, password) = rest
            .split_once("--")
            .ok_or_else(|| LamError::InvalidDescriptor(line.to_string()))?;
        let riot_id = riot_id
            .parse::<RiotId>()
            .map_err(|_| LamError::InvalidDescriptor(line.to_string()))?;
        Ok(Self {
            username: username.to_string(),
            riot_id,
            password: password.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn entry(queue_type: &str, tier: &str, wins: u32, losses: u32) -> LeagueEntry {
        LeagueEntry {
            league_id: None,
            puuid: None,
            summoner_id: None,
            queue_type: queue_type.to_string(),
            tier: Some(tier.to_string()),
            rank: Some("II".to_string()),
            league_points: 54,
            wins,
            losses,
            hot_streak: false,
            veteran: false,
            fresh_blood: false,
            inactive: false,
            mini_series: None,
        }
    }

    #[test]
    fn parse_riot_id_valid() {
        let id: RiotId = "Faker#KR1".parse().unwrap();
        assert_eq!(id.game_name, "Faker");
        assert_eq!(id.tag_line, "KR1");
        assert_eq!(id.to_string(), "Faker#KR1");
    }

    #[test]
    fn parse_riot_id_invalid() {
        assert_matches!("Faker".parse::<RiotId>(), Err(LamError::InvalidRiotId(_)));
        assert_matches!("#KR1".parse::<RiotId>(), Err(LamError::InvalidRiotId(_)));
    }

    #[test]
    fn parse_descriptor_line() {
        let descriptor: AccountDescriptor = "  user1--Player1#EUW--mypass123 ".parse().unwrap();
        assert_eq!(descriptor.username, "user1");
        assert_eq!(descriptor.riot_id.game_name, "Player1");
        assert_eq!(descriptor.riot_id.tag_line, "EUW");
        assert_eq!(descriptor.password, "mypass123");
    }

    #[test]
    fn parse_descriptor_rejects_missing_tag() {
        let err = "user1--Player1--pass".parse::<AccountDescriptor>().unwrap_err();
        assert_matches!(err, LamError::InvalidDescriptor(_));
    }

    #[test]
    fn descriptor_validation_on_single_add() {
        assert_matches!(
            AccountDescriptor::new("ab", "A#EUW", "pw"),
            Err(LamError::InvalidUsername(_))
        );
        assert_matches!(
            AccountDescriptor::new("abc", "A#EUW", ""),
            Err(LamError::MissingPassword)
        );
        assert!(AccountDescriptor::new("abc", "A#EUW", "pw").is_ok());
    }

    #[test]
    fn region_routing() {
        let region: Region = "EUW".parse().unwrap();
        assert_eq!(region, Region::Euw1);
        assert_eq!(region.routing(), RoutingRegion::Europe);
        assert_eq!(Region::Vn2.routing().account_route(), RoutingRegion::Asia);
        assert_matches!("moon".parse::<Region>(), Err(LamError::InvalidRegion(_)));
    }

    #[test]
    fn win_rate_and_apex() {
        assert_eq!(entry(SOLO_QUEUE, "GOLD", 0, 0).win_rate(), 0);
        assert_eq!(entry(SOLO_QUEUE, "GOLD", 2, 1).win_rate(), 67);
        assert!(entry(SOLO_QUEUE, "GRANDMASTER", 1, 1).is_apex());
        assert_eq!(entry(SOLO_QUEUE, "GOLD", 1, 1).display_rank(), "GOLD II 54 LP");
        assert_eq!(
            entry(SOLO_QUEUE, "MASTER", 1, 1).display_rank(),
            "MASTER 54 LP"
        );
    }

    #[test]
    fn win_rate_with_huge_counts() {
        assert_eq!(entry(SOLO_QUEUE, "GOLD", u32::MAX, u32::MAX).win_rate(), 50);
        assert_eq!(entry(SOLO_QUEUE, "GOLD", u32::MAX, 0).win_rate(), 100);
    }

    #[test]
    fn account_map_keeps_insertion_order() {
        let mut map = AccountMap::new();
        for name in ["c", "a", "b"] {
            map.insert(name.to_string(), sample_account(name));
        }
        map.insert("a".to_string(), sample_account("a"));
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["c", "a", "b"]);
        assert!(map.remove("a").is_some());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["c", "b"]);
    }

    #[test]
    fn debug_redacts_password() {
        let account = sample_account("alice");
        let debug = format!("{account:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    fn sample_account(user_name: &str) -> Account {
        Account {
            game_name: "Player".to_string(),
            tag_line: "EUW".to_string(),
            user_name: user_name.to_string(),
            password: "secret".to_string(),
            region: Region::Euw1,
            riot_data: RiotAccount {
                puuid: format!("puuid-{user_name}"),
                game_name: Some("Player".to_string()),
                tag_line: Some("EUW".to_string()),
            },
            league_data: vec![entry(FLEX_QUEUE, "SILVER", 3, 4)],
        }
    }
}
