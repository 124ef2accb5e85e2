use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    AccountView, AddResult, ClearResult, ListResult, MatchHistoryResult, MutationResult,
    ProgressEvent, ProgressSink,
};
use crate::import::ImportReport;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_add(result: &AddResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_import(report: &ImportReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_account(account: &AccountView) -> io::Result<()> {
        Self::print_json(account)
    }

    pub fn print_mutation(result: &MutationResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_matches(result: &MatchHistoryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive runs.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let cyan = "\x1b[36m";
        let dim = "\x1b[2m";
        let reset = "\x1b[0m";
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "{cyan}›{reset} {} {dim}({:.1}s){reset}",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => eprintln!("{cyan}›{reset} {}", event.message),
        }
    }
}
