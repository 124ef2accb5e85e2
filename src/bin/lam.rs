use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use league_account_manager::app::{AccountView, App, ProgressSink};
use league_account_manager::config::{ConfigLoader, ResolvedConfig};
use league_account_manager::domain::{
    AccountDescriptor, LeagueEntry, Region, RiotAccount, RiotId, RoutingRegion,
};
use league_account_manager::error::LamError;
use league_account_manager::import::ImportReport;
use league_account_manager::output::{JsonOutput, OutputMode, StderrProgress};
use league_account_manager::registry::{AccountRegistry, Outcome};
use league_account_manager::riot::{MatchHistoryQuery, MatchRecord, RiotClient, RiotHttpClient};
use league_account_manager::store::JsonFileStore;

#[derive(Parser)]
#[command(name = "lam")]
#[command(about = "Local League of Legends account manager with cached Riot rank data")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Manage stored accounts")]
    Accounts(AccountsArgs),
    #[command(about = "Show recent matches of a stored account")]
    Matches(MatchesArgs),
}

#[derive(Args)]
struct AccountsArgs {
    #[command(subcommand)]
    command: AccountsCommand,
}

#[derive(Subcommand)]
enum AccountsCommand {
    #[command(about = "Resolve a Riot ID and store the account")]
    Add(AddArgs),
    #[command(about = "Import username--gamename#tag--password lines from a file or stdin")]
    Import(ImportArgs),
    #[command(about = "List stored accounts")]
    List,
    #[command(about = "Show one stored account")]
    Show(ShowArgs),
    #[command(about = "Remove a stored account")]
    Remove(UserArgs),
    #[command(about = "Fetch fresh rank data for a stored account")]
    Refresh(UserArgs),
    #[command(about = "Change the stored password of an account")]
    SetPassword(SetPasswordArgs),
    #[command(about = "Remove every stored account")]
    Clear(ClearArgs),
}

#[derive(Args)]
struct AddArgs {
    #[arg(long)]
    riot_id: String,

    #[arg(long)]
    username: String,

    #[arg(long)]
    password: String,

    #[arg(long)]
    region: Option<String>,
}

#[derive(Args)]
struct ImportArgs {
    /// File with one account per line; `-` or nothing reads stdin.
    file: Option<String>,

    #[arg(long)]
    region: Option<String>,
}

#[derive(Args)]
struct ShowArgs {
    key: String,

    /// Treat the key as a puuid instead of a user name.
    #[arg(long)]
    puuid: bool,
}

#[derive(Args)]
struct UserArgs {
    username: String,
}

#[derive(Args)]
struct SetPasswordArgs {
    username: String,
    password: String,
}

#[derive(Args)]
struct ClearArgs {
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct MatchesArgs {
    username: String,

    #[arg(long)]
    count: Option<u32>,

    #[arg(long)]
    start: Option<u32>,

    #[arg(long)]
    queue: Option<u32>,

    #[arg(long = "type")]
    match_type: Option<String>,

    /// RFC 3339, e.g. 2024-01-01T00:00:00Z
    #[arg(long)]
    start_time: Option<DateTime<Utc>>,

    #[arg(long)]
    end_time: Option<DateTime<Utc>>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(lam) = report.downcast_ref::<LamError>() {
            return ExitCode::from(map_exit_code(lam));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LamError) -> u8 {
    if error.is_not_found() {
        return 2;
    }
    match error {
        LamError::DuplicateAccount(_) => 2,
        LamError::RemoteLookup(_) | LamError::RemoteStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let registry = AccountRegistry::open(JsonFileStore::new(config.store_path.clone()));

    match config.api_key.as_deref() {
        Some(key) => {
            let riot = RiotHttpClient::new(key, Some(config.request_timeout))?;
            let app = App::new(registry, riot, config.default_region)
                .with_match_count(config.match_count);
            run_command(cli.command, app, &config, output_mode)
        }
        None => {
            let app = App::new(registry, NoApiKey, config.default_region)
                .with_match_count(config.match_count);
            run_command(cli.command, app, &config, output_mode)
        }
    }
}

/// Stands in for the HTTP client when no API key is configured, so that
/// purely local commands still work.
struct NoApiKey;

impl RiotClient for NoApiKey {
    fn account_by_riot_id(
        &self,
        _routing: RoutingRegion,
        _riot_id: &RiotId,
    ) -> Result<RiotAccount, LamError> {
        Err(LamError::MissingApiKey)
    }

    fn league_entries_by_puuid(
        &self,
        _region: Region,
        _puuid: &str,
    ) -> Result<Vec<LeagueEntry>, LamError> {
        Err(LamError::MissingApiKey)
    }

    fn match_ids_by_puuid(
        &self,
        _routing: RoutingRegion,
        _puuid: &str,
        _query: &MatchHistoryQuery,
    ) -> Result<Vec<String>, LamError> {
        Err(LamError::MissingApiKey)
    }

    fn match_by_id(
        &self,
        _routing: RoutingRegion,
        _match_id: &str,
    ) -> Result<MatchRecord, LamError> {
        Err(LamError::MissingApiKey)
    }
}

fn run_command<R: RiotClient>(
    command: Commands,
    mut app: App<R, JsonFileStore>,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &StderrProgress,
        OutputMode::NonInteractive => &JsonOutput,
    };

    match command {
        Commands::Accounts(args) => match args.command {
            AccountsCommand::Add(args) => {
                let descriptor =
                    AccountDescriptor::new(&args.username, &args.riot_id, &args.password)?;
                let region = parse_region(args.region.as_deref())?;
                let result = app.add_account(&descriptor, region, sink)?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print_add(&result).into_diagnostic()?,
                    OutputMode::Interactive => {
                        println!("\x1b[32m✓ added\x1b[0m");
                        print_account(&result.account);
                    }
                }
                Ok(())
            }
            AccountsCommand::Import(args) => {
                let text = read_input(args.file.as_deref())?;
                let region = parse_region(args.region.as_deref())?;
                let report = app.import_text(&text, region, sink);
                match output_mode {
                    OutputMode::NonInteractive => {
                        JsonOutput::print_import(&report).into_diagnostic()?
                    }
                    OutputMode::Interactive => print_import_summary(&report),
                }
                if report.all_succeeded() {
                    Ok(())
                } else {
                    Err(miette::miette!(
                        "{} of {} line(s) failed to import",
                        report.failed(),
                        report.results.len()
                    ))
                }
            }
            AccountsCommand::List => {
                let result = app.list();
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic()?,
                    OutputMode::Interactive => {
                        if result.accounts.is_empty() {
                            println!("no accounts stored ({})", config.store_path);
                        }
                        for account in &result.accounts {
                            print_account(account);
                        }
                    }
                }
                Ok(())
            }
            AccountsCommand::Show(args) => {
                let account = if args.puuid {
                    app.show_by_puuid(&args.key)?
                } else {
                    app.show(&args.key)?
                };
                match output_mode {
                    OutputMode::NonInteractive => {
                        JsonOutput::print_account(&account).into_diagnostic()?
                    }
                    OutputMode::Interactive => print_account_details(&account),
                }
                Ok(())
            }
            AccountsCommand::Remove(args) => {
                let result = app.remove_account(&args.username)?;
                match output_mode {
                    OutputMode::NonInteractive => {
                        JsonOutput::print_mutation(&result).into_diagnostic()?
                    }
                    OutputMode::Interactive => match result.outcome {
                        Outcome::Unchanged => println!("{} was not stored", result.user_name),
                        _ => println!("\x1b[32m✓ removed {}\x1b[0m", result.user_name),
                    },
                }
                Ok(())
            }
            AccountsCommand::Refresh(args) => {
                let account = app.refresh_account(&args.username, sink)?;
                match output_mode {
                    OutputMode::NonInteractive => {
                        JsonOutput::print_account(&account).into_diagnostic()?
                    }
                    OutputMode::Interactive => print_account_details(&account),
                }
                Ok(())
            }
            AccountsCommand::SetPassword(args) => {
                let result = app.update_password(&args.username, &args.password)?;
                match output_mode {
                    OutputMode::NonInteractive => {
                        JsonOutput::print_mutation(&result).into_diagnostic()?
                    }
                    OutputMode::Interactive => {
                        println!("\x1b[32m✓ password updated for {}\x1b[0m", result.user_name)
                    }
                }
                Ok(())
            }
            AccountsCommand::Clear(args) => {
                if matches!(output_mode, OutputMode::Interactive)
                    && !args.yes
                    && !confirm(&format!(
                        "remove all {} stored account(s)?",
                        app.registry().len()
                    ))?
                {
                    return Ok(());
                }
                let result = app.clear(sink)?;
                match output_mode {
                    OutputMode::NonInteractive => JsonOutput::print_clear(&result).into_diagnostic()?,
                    OutputMode::Interactive => println!("\x1b[32m✓ cleared\x1b[0m"),
                }
                Ok(())
            }
        },
        Commands::Matches(args) => {
            let query = MatchHistoryQuery {
                start_time: args.start_time,
                end_time: args.end_time,
                queue: args.queue,
                match_type: args.match_type,
                start: args.start,
                count: args.count.unwrap_or(config.match_count),
            };
            let result = app.match_history(&args.username, query, sink)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_matches(&result).into_diagnostic()?,
                OutputMode::Interactive => {
                    for entry in &result.matches {
                        let mode = entry.game_mode.as_deref().unwrap_or("?");
                        match &entry.player {
                            Some(player) => {
                                let (color, label) = if player.win {
                                    ("\x1b[32m", "W")
                                } else {
                                    ("\x1b[31m", "L")
                                };
                                println!(
                                    "{color}{label}\x1b[0m {} {mode} {} {}/{}/{}",
                                    entry.match_id,
                                    player.champion_name.as_deref().unwrap_or("?"),
                                    player.kills,
                                    player.deaths,
                                    player.assists
                                );
                            }
                            None => println!("  {} {mode}", entry.match_id),
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

fn parse_region(value: Option<&str>) -> Result<Option<Region>, LamError> {
    value.map(str::parse::<Region>).transpose()
}

fn read_input(path: Option<&str>) -> miette::Result<String> {
    match path {
        None | Some("-") => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).into_diagnostic()?;
            Ok(text)
        }
        Some(path) => fs::read_to_string(path).into_diagnostic(),
    }
}

fn confirm(prompt: &str) -> miette::Result<bool> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush().into_diagnostic()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).into_diagnostic()?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_account(account: &AccountView) {
    let rank = account.solo_rank.as_deref().unwrap_or("Unranked");
    let win_rate = account
        .win_rate
        .map(|rate| format!(" {rate}% WR"))
        .unwrap_or_default();
    println!(
        "\x1b[36m{}\x1b[0m  {} [{}]  {rank}{win_rate}",
        account.user_name, account.riot_id, account.region
    );
}

fn print_account_details(account: &AccountView) {
    print_account(account);
    println!("   puuid: {}", account.puuid);
    for entry in &account.league_data {
        println!(
            "   {}: {} ({}W/{}L, {}%)",
            entry.queue_type,
            entry.display_rank(),
            entry.wins,
            entry.losses,
            entry.win_rate()
        );
    }
}

fn print_import_summary(report: &ImportReport) {
    let green = "\x1b[32m";
    let red = "\x1b[31m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}Import summary{reset}");
    println!("{green}✓ imported: {}{reset}", report.succeeded());
    println!("{red}✗ failed: {}{reset}", report.failed());
    for result in &report.results {
        if result.success {
            println!("{green}  ✓ {}{reset}", result.username);
        } else {
            println!(
                "{red}  ✗ {}: {}{reset}",
                result.username,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}
