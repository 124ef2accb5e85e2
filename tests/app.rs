use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use league_account_manager::app::{App, ProgressEvent, ProgressSink};
use league_account_manager::domain::{
    AccountDescriptor, LeagueEntry, Region, RiotAccount, RiotId, RoutingRegion,
};
use league_account_manager::error::LamError;
use league_account_manager::output::JsonOutput;
use league_account_manager::registry::{AccountRegistry, Outcome};
use league_account_manager::riot::{MatchHistoryQuery, MatchRecord, RiotClient};
use league_account_manager::store::BlobStore;

struct MockRiot {
    calls: Mutex<Vec<String>>,
    wins: Mutex<u32>,
}

impl MockRiot {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            wins: Mutex::new(10),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RiotClient for MockRiot {
    fn account_by_riot_id(
        &self,
        _routing: RoutingRegion,
        riot_id: &RiotId,
    ) -> Result<RiotAccount, LamError> {
        self.calls.lock().unwrap().push(format!("account {riot_id}"));
        Ok(RiotAccount {
            puuid: format!("puuid-{}", riot_id.game_name),
            game_name: Some(riot_id.game_name.clone()),
            tag_line: Some(riot_id.tag_line.clone()),
        })
    }

    fn league_entries_by_puuid(
        &self,
        _region: Region,
        puuid: &str,
    ) -> Result<Vec<LeagueEntry>, LamError> {
        self.calls.lock().unwrap().push(format!("league {puuid}"));
        let wins = *self.wins.lock().unwrap();
        Ok(vec![
            serde_json::from_value(json!({
                "queueType": "RANKED_SOLO_5x5",
                "tier": "MASTER",
                "rank": "I",
                "leaguePoints": 120,
                "wins": wins,
                "losses": 10
            }))
            .unwrap(),
        ])
    }

    fn match_ids_by_puuid(
        &self,
        routing: RoutingRegion,
        puuid: &str,
        query: &MatchHistoryQuery,
    ) -> Result<Vec<String>, LamError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("ids {puuid} @{routing} count={}", query.count));
        Ok((0..query.count).map(|n| format!("EUW1_{n}")).collect())
    }

    fn match_by_id(
        &self,
        _routing: RoutingRegion,
        match_id: &str,
    ) -> Result<MatchRecord, LamError> {
        self.calls.lock().unwrap().push(format!("match {match_id}"));
        Ok(MatchRecord::from_json(
            match_id,
            json!({
                "metadata": { "participants": ["puuid-A", "puuid-other"] },
                "info": {
                    "gameMode": "CLASSIC",
                    "queueId": 420,
                    "participants": [
                        { "puuid": "puuid-A", "championName": "Ahri", "kills": 7, "deaths": 2, "assists": 9, "win": true },
                        { "puuid": "puuid-other", "championName": "Zed", "kills": 1, "deaths": 7, "assists": 0, "win": false }
                    ]
                }
            }),
        ))
    }
}

#[derive(Default)]
struct MemoryBlob {
    value: Mutex<Option<Value>>,
}

impl BlobStore for MemoryBlob {
    fn get(&self, _key: &str) -> Result<Option<Value>, LamError> {
        Ok(self.value.lock().unwrap().clone())
    }

    fn set(&self, _key: &str, value: Value) -> Result<(), LamError> {
        *self.value.lock().unwrap() = Some(value);
        Ok(())
    }

    fn save(&self) -> Result<(), LamError> {
        Ok(())
    }

    fn clear(&self) -> Result<(), LamError> {
        *self.value.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn app() -> App<MockRiot, MemoryBlob> {
    let registry = AccountRegistry::new(league_account_manager::store::AccountStore::new(
        MemoryBlob::default(),
    ));
    App::new(registry, MockRiot::new(), Region::Euw1)
}

fn add(app: &mut App<MockRiot, MemoryBlob>, username: &str, riot_id: &str) {
    let descriptor = AccountDescriptor::new(username, riot_id, "secret").unwrap();
    app.add_account(&descriptor, None, &JsonOutput).unwrap();
}

#[test]
fn new_app_hydrates_registry() {
    let app = app();
    assert!(app.registry().is_ready());
}

#[test]
fn add_account_resolves_and_hides_password() {
    let mut app = app();
    let sink = RecordingSink::default();
    let descriptor = AccountDescriptor::new("main", "A#EUW", "secret").unwrap();

    let result = app.add_account(&descriptor, None, &sink).unwrap();

    assert_eq!(result.outcome, Outcome::Applied);
    assert_eq!(result.account.riot_id, "A#EUW");
    assert_eq!(result.account.region, Region::Euw1);
    assert_eq!(result.account.solo_rank.as_deref(), Some("MASTER 120 LP"));
    assert_eq!(result.account.win_rate, Some(50));
    let json = serde_json::to_string(&result).unwrap();
    assert!(!json.contains("secret"));
    assert_eq!(sink.messages.lock().unwrap().len(), 2);
}

#[test]
fn add_account_duplicate_is_an_error() {
    let mut app = app();
    add(&mut app, "main", "A#EUW");
    let descriptor = AccountDescriptor::new("main", "B#EUW", "other").unwrap();
    assert_matches!(
        app.add_account(&descriptor, None, &JsonOutput),
        Err(LamError::DuplicateAccount(_))
    );
}

#[test]
fn import_text_reports_progress_per_line() {
    let mut app = app();
    let sink = RecordingSink::default();

    let report = app.import_text("u1--A#EUW--p1\n\nnope\nu3--C#EUW--p3\n", Some(Region::Na1), &sink);

    assert_eq!(report.results.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert!(report.started_at <= report.finished_at);
    assert_eq!(app.show("u1").unwrap().region, Region::Na1);
    let messages = sink.messages.lock().unwrap();
    assert_eq!(messages.len(), 4);
    assert!(messages[2].contains("[2/3] nope failed"));
}

#[test]
fn refresh_merges_league_data_only() {
    let mut app = app();
    add(&mut app, "main", "A#EUW");
    *app_riot_wins(&app) = 30;
    app.update_password("main", "rotated").unwrap();

    let view = app.refresh_account("main", &JsonOutput).unwrap();

    assert_eq!(view.win_rate, Some(75));
    let stored = app.registry().get_by_username("main").unwrap();
    assert_eq!(stored.password, "rotated");
    assert_eq!(stored.game_name, "A");
}

fn app_riot_wins(app: &App<MockRiot, MemoryBlob>) -> std::sync::MutexGuard<'_, u32> {
    app.riot().wins.lock().unwrap()
}

#[test]
fn refresh_of_unknown_account_is_not_found() {
    let mut app = app();
    assert_matches!(
        app.refresh_account("ghost", &JsonOutput),
        Err(LamError::AccountNotFound(_))
    );
}

#[test]
fn match_history_defaults_to_five_and_fetches_in_order() {
    let mut app = app();
    add(&mut app, "main", "A#EUW");
    let before = app.riot().calls().len();

    let result = app
        .match_history("main", MatchHistoryQuery::default(), &JsonOutput)
        .unwrap();

    assert_eq!(result.matches.len(), 5);
    let player = result.matches[0].player.as_ref().unwrap();
    assert_eq!(player.champion_name.as_deref(), Some("Ahri"));
    assert!(player.win);
    let calls = app.riot().calls()[before..].to_vec();
    assert_eq!(calls[0], "ids puuid-A @europe count=5");
    assert_eq!(
        &calls[1..],
        ["match EUW1_0", "match EUW1_1", "match EUW1_2", "match EUW1_3", "match EUW1_4"]
    );
}

#[test]
fn zero_count_falls_back_to_configured_default() {
    let registry = AccountRegistry::new(league_account_manager::store::AccountStore::new(
        MemoryBlob::default(),
    ));
    let mut app = App::new(registry, MockRiot::new(), Region::Euw1).with_match_count(2);
    add(&mut app, "main", "A#EUW");

    let result = app
        .match_history("main", MatchHistoryQuery::with_count(0), &JsonOutput)
        .unwrap();
    assert_eq!(result.matches.len(), 2);
}

#[test]
fn list_show_remove_and_clear() {
    let mut app = app();
    add(&mut app, "first", "A#EUW");
    add(&mut app, "second", "B#EUW");

    let names: Vec<_> = app
        .list()
        .accounts
        .into_iter()
        .map(|account| account.user_name)
        .collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(app.show_by_puuid("puuid-B").unwrap().user_name, "second");

    assert_eq!(app.remove_account("first").unwrap().outcome, Outcome::Applied);
    assert_eq!(app.remove_account("first").unwrap().outcome, Outcome::Unchanged);
    assert_matches!(app.show("first"), Err(LamError::AccountNotFound(_)));

    assert!(app.clear(&JsonOutput).unwrap().cleared);
    assert!(app.list().accounts.is_empty());
}

#[test]
fn empty_password_is_rejected() {
    let mut app = app();
    add(&mut app, "main", "A#EUW");
    assert_matches!(app.update_password("main", ""), Err(LamError::MissingPassword));
    assert_eq!(app.registry().get_by_username("main").unwrap().password, "secret");
}
