use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{Account, AccountDescriptor, Region};
use crate::error::LamError;
use crate::registry::{AccountRegistry, Outcome};
use crate::riot::RiotClient;
use crate::store::BlobStore;

/// One line of a bulk import, either parsed or carrying the reason it could not be.
pub type ParsedLine = Result<AccountDescriptor, (String, LamError)>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub username: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl ImportResult {
    pub fn succeeded(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            success: true,
            error: None,
            error_kind: None,
        }
    }

    pub fn failed(username: impl Into<String>, error: &LamError) -> Self {
        Self {
            username: username.into(),
            success: false,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub results: Vec<ImportResult>,
    pub started_at: String,
    pub finished_at: String,
}

impl ImportReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|result| result.success)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|result| result.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Splits pasted text into descriptor lines. Lines are trimmed and blank
/// ones dropped; a line that does not match the grammar is kept as an error
/// so it still shows up in the report.
pub fn parse_bulk_text(text: &str) -> Vec<ParsedLine> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<AccountDescriptor>()
                .map_err(|err| (AccountDescriptor::username_hint(line), err))
        })
        .collect()
}

/// Identity lookup, then rank lookup keyed by the returned puuid.
pub fn resolve_descriptor<C: RiotClient + ?Sized>(
    client: &C,
    descriptor: &AccountDescriptor,
    region: Region,
) -> Result<Account, LamError> {
    debug!(username = %descriptor.username, riot_id = %descriptor.riot_id, %region, "resolving account");
    let riot_data = client.account_by_riot_id(region.routing(), &descriptor.riot_id)?;
    let league_data = client.league_entries_by_puuid(region, &riot_data.puuid)?;
    Ok(Account {
        game_name: descriptor.riot_id.game_name.clone(),
        tag_line: descriptor.riot_id.tag_line.clone(),
        user_name: descriptor.username.clone(),
        password: descriptor.password.clone(),
        region,
        riot_data,
        league_data,
    })
}

/// Duplicate check, resolution and registration of a single descriptor.
/// The duplicate check runs before any remote call, so the registry must
/// already be hydrated.
pub fn register_descriptor<C, B>(
    registry: &mut AccountRegistry<B>,
    client: &C,
    descriptor: &AccountDescriptor,
    region: Region,
) -> Result<Outcome, LamError>
where
    C: RiotClient + ?Sized,
    B: BlobStore,
{
    if !registry.is_ready() {
        return Err(LamError::NotHydrated);
    }
    if registry.contains(&descriptor.username) {
        return Err(LamError::DuplicateAccount(descriptor.username.clone()));
    }
    let account = resolve_descriptor(client, descriptor, region)?;
    registry.add(account)
}

/// Resolves lines strictly one after another, in input order. A failing line
/// is recorded and the loop moves on; `on_result` sees each result as soon
/// as it is known.
pub fn import_descriptors<C, B>(
    registry: &mut AccountRegistry<B>,
    client: &C,
    lines: Vec<ParsedLine>,
    region: Region,
    mut on_result: impl FnMut(&ImportResult),
) -> ImportReport
where
    C: RiotClient + ?Sized,
    B: BlobStore,
{
    let started_at = Utc::now().to_rfc3339();
    let mut results = Vec::with_capacity(lines.len());

    for line in lines {
        let result = match line {
            Ok(descriptor) => match register_descriptor(registry, client, &descriptor, region) {
                Ok(_) => ImportResult::succeeded(&descriptor.username),
                Err(err) => {
                    warn!(username = %descriptor.username, error = %err, "import line failed");
                    ImportResult::failed(&descriptor.username, &err)
                }
            },
            Err((username, err)) => {
                warn!(username = %username, error = %err, "import line rejected");
                ImportResult::failed(username, &err)
            }
        };
        on_result(&result);
        results.push(result);
    }

    let report = ImportReport {
        results,
        started_at,
        finished_at: Utc::now().to_rfc3339(),
    };
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "import finished"
    );
    report
}
