use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::domain::{Account, AccountDescriptor, AccountPatch, LeagueEntry, Region};
use crate::error::LamError;
use crate::import::{self, ImportReport};
use crate::registry::{AccountRegistry, Outcome};
use crate::riot::{self, MatchHistoryQuery, ParticipantSummary, RiotClient};
use crate::store::BlobStore;

/// Account as shown to the user. The password never leaves the store.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub user_name: String,
    pub riot_id: String,
    pub region: Region,
    pub puuid: String,
    pub solo_rank: Option<String>,
    pub win_rate: Option<u32>,
    pub league_data: Vec<LeagueEntry>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        let solo = account.solo_queue_entry();
        Self {
            user_name: account.user_name.clone(),
            riot_id: account.riot_id().to_string(),
            region: account.region,
            puuid: account.puuid().to_string(),
            solo_rank: solo.map(LeagueEntry::display_rank),
            win_rate: solo.map(LeagueEntry::win_rate),
            league_data: account.league_data.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AddResult {
    pub account: AccountView,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub accounts: Vec<AccountView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MutationResult {
    pub user_name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchEntry {
    pub match_id: String,
    pub game_mode: Option<String>,
    pub queue_id: Option<u32>,
    pub game_creation: Option<i64>,
    pub game_duration: Option<u64>,
    pub player: Option<ParticipantSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchHistoryResult {
    pub user_name: String,
    pub matches: Vec<MatchEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<R: RiotClient, B: BlobStore> {
    registry: AccountRegistry<B>,
    riot: R,
    default_region: Region,
    match_count: u32,
}

impl<R: RiotClient, B: BlobStore> App<R, B> {
    /// The registry is hydrated here if nobody did it yet.
    pub fn new(mut registry: AccountRegistry<B>, riot: R, default_region: Region) -> Self {
        if !registry.is_ready() {
            registry.hydrate();
        }
        Self {
            registry,
            riot,
            default_region,
            match_count: riot::DEFAULT_MATCH_COUNT,
        }
    }

    pub fn with_match_count(mut self, match_count: u32) -> Self {
        self.match_count = match_count;
        self
    }

    pub fn registry(&self) -> &AccountRegistry<B> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AccountRegistry<B> {
        &mut self.registry
    }

    pub fn riot(&self) -> &R {
        &self.riot
    }

    /// Single-add path. Any failure aborts this one add and comes back to the caller.
    pub fn add_account(
        &mut self,
        descriptor: &AccountDescriptor,
        region: Option<Region>,
        sink: &dyn ProgressSink,
    ) -> Result<AddResult, LamError> {
        let region = region.unwrap_or(self.default_region);
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; looking up {} on {region}", descriptor.riot_id),
            elapsed: None,
        });

        let outcome = import::register_descriptor(&mut self.registry, &self.riot, descriptor, region)?;
        let account = self
            .registry
            .get_by_username(&descriptor.username)
            .ok_or_else(|| LamError::AccountNotFound(descriptor.username.clone()))?;

        sink.event(ProgressEvent {
            message: format!("phase=Store; added {}", descriptor.username),
            elapsed: Some(started.elapsed()),
        });
        Ok(AddResult {
            account: AccountView::from(account),
            outcome,
        })
    }

    /// Bulk path over pasted text. Never fails as a whole; see the per-line results.
    pub fn import_text(
        &mut self,
        text: &str,
        region: Option<Region>,
        sink: &dyn ProgressSink,
    ) -> ImportReport {
        let region = region.unwrap_or(self.default_region);
        let lines = import::parse_bulk_text(text);
        let total = lines.len();
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Import; {total} line(s) on {region}"),
            elapsed: None,
        });

        let mut done = 0;
        import::import_descriptors(&mut self.registry, &self.riot, lines, region, |result| {
            done += 1;
            let status = if result.success { "ok" } else { "failed" };
            sink.event(ProgressEvent {
                message: format!("phase=Import; [{done}/{total}] {} {status}", result.username),
                elapsed: Some(started.elapsed()),
            });
        })
    }

    /// Fetches fresh rank entries and merges them into the stored account.
    pub fn refresh_account(
        &mut self,
        user_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<AccountView, LamError> {
        let (region, puuid) = {
            let account = self.require(user_name)?;
            (account.region, account.puuid().to_string())
        };
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Resolve; refreshing {user_name}"),
            elapsed: None,
        });

        let entries = self.riot.league_entries_by_puuid(region, &puuid)?;
        debug!(user_name, entries = entries.len(), "league entries refreshed");
        self.registry
            .update(user_name, AccountPatch::league_data(entries))?;

        sink.event(ProgressEvent {
            message: format!("phase=Store; refreshed {user_name}"),
            elapsed: Some(started.elapsed()),
        });
        Ok(AccountView::from(self.require(user_name)?))
    }

    /// Match ids first, then each match in turn. A `count` of zero in the
    /// query falls back to the configured default.
    pub fn match_history(
        &self,
        user_name: &str,
        mut query: MatchHistoryQuery,
        sink: &dyn ProgressSink,
    ) -> Result<MatchHistoryResult, LamError> {
        let account = self.require(user_name)?;
        if query.count == 0 {
            query.count = self.match_count;
        }
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; up to {} match(es) for {user_name}", query.count),
            elapsed: None,
        });

        let puuid = account.puuid();
        let records = riot::match_history(&self.riot, account.region.routing(), puuid, &query)?;
        let matches = records
            .into_iter()
            .map(|record| MatchEntry {
                player: record.summary_for(puuid),
                match_id: record.match_id,
                game_mode: record.game_mode,
                queue_id: record.queue_id,
                game_creation: record.game_creation,
                game_duration: record.game_duration,
            })
            .collect::<Vec<_>>();

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; {} match(es) loaded", matches.len()),
            elapsed: Some(started.elapsed()),
        });
        Ok(MatchHistoryResult {
            user_name: user_name.to_string(),
            matches,
        })
    }

    pub fn remove_account(&mut self, user_name: &str) -> Result<MutationResult, LamError> {
        let outcome = self.registry.remove(user_name)?;
        Ok(MutationResult {
            user_name: user_name.to_string(),
            outcome,
        })
    }

    pub fn update_password(
        &mut self,
        user_name: &str,
        password: &str,
    ) -> Result<MutationResult, LamError> {
        if password.is_empty() {
            return Err(LamError::MissingPassword);
        }
        let outcome = self
            .registry
            .update(user_name, AccountPatch::password(password))?;
        Ok(MutationResult {
            user_name: user_name.to_string(),
            outcome,
        })
    }

    pub fn list(&self) -> ListResult {
        ListResult {
            accounts: self.registry.accounts().values().map(AccountView::from).collect(),
        }
    }

    pub fn show(&self, user_name: &str) -> Result<AccountView, LamError> {
        self.require(user_name).map(AccountView::from)
    }

    /// Looks an account up by the Riot identity id instead of the user name.
    pub fn show_by_puuid(&self, puuid: &str) -> Result<AccountView, LamError> {
        self.registry
            .get_by_puuid(puuid)
            .map(AccountView::from)
            .ok_or_else(|| LamError::AccountNotFound(puuid.to_string()))
    }

    pub fn clear(&mut self, sink: &dyn ProgressSink) -> Result<ClearResult, LamError> {
        sink.event(ProgressEvent {
            message: format!("phase=Store; clearing {} account(s)", self.registry.len()),
            elapsed: None,
        });
        let outcome = self.registry.clear()?;
        Ok(ClearResult {
            cleared: outcome == Outcome::Applied,
        })
    }

    fn require(&self, user_name: &str) -> Result<&Account, LamError> {
        self.registry
            .get_by_username(user_name)
            .ok_or_else(|| LamError::AccountNotFound(user_name.to_string()))
    }
}
