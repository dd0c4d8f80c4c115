//! `locsync status`: translation coverage per document group.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use locsync_core::DocumentStore;
use locsync_sync::{collect_groups, staleness::format_system_time_age, GroupStatus, LocaleStatus};

use super::load_config;

/// Arguments for `locsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config_path: &Path) -> Result<u8> {
        let config = load_config(config_path)?;
        let root = config.content_root().context("invalid locale configuration")?;
        let store = DocumentStore::new(root);
        let groups = collect_groups(&store).context("failed to scan content root")?;

        if self.json {
            print_json(&store, &groups)?;
        } else {
            print_table(&store, &groups);
        }
        Ok(0)
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    content_root: String,
    summary: Summary,
    groups: Vec<GroupJson<'a>>,
}

#[derive(Serialize)]
struct Summary {
    groups: usize,
    complete: usize,
    stale_mirrors: usize,
    without_source: usize,
}

#[derive(Serialize)]
struct GroupJson<'a> {
    #[serde(flatten)]
    group: &'a GroupStatus,
    source_modified: Option<DateTime<Utc>>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "document")]
    document: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "locales")]
    locales: String,
    #[tabled(rename = "source edited")]
    source_edited: String,
}

fn summarize(groups: &[GroupStatus]) -> Summary {
    Summary {
        groups: groups.len(),
        complete: groups.iter().filter(|g| g.complete).count(),
        stale_mirrors: groups.iter().map(GroupStatus::stale_mirrors).sum(),
        without_source: groups.iter().filter(|g| !g.has_source()).count(),
    }
}

fn print_json(store: &DocumentStore, groups: &[GroupStatus]) -> Result<()> {
    let payload = StatusJson {
        content_root: store.root().path().display().to_string(),
        summary: summarize(groups),
        groups: groups
            .iter()
            .map(|group| GroupJson {
                group,
                source_modified: group.source_modified.map(DateTime::<Utc>::from),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(store: &DocumentStore, groups: &[GroupStatus]) {
    let summary = summarize(groups);
    println!(
        "locsync v{} | {} | {} documents | {} complete | {} stale",
        env!("CARGO_PKG_VERSION"),
        store.root().path().display(),
        summary.groups,
        summary.complete,
        summary.stale_mirrors,
    );

    if groups.is_empty() {
        println!("No documents found.");
        return;
    }

    println!(
        "Locales: {} source  {} mirror  {} stale  {} missing  {} invalid",
        locale_indicator(LocaleStatus::Source),
        locale_indicator(LocaleStatus::Mirror { stale: false }),
        locale_indicator(LocaleStatus::Mirror { stale: true }),
        locale_indicator(LocaleStatus::Missing),
        locale_indicator(LocaleStatus::Invalid),
    );

    let rows: Vec<StatusTableRow> = groups
        .iter()
        .map(|group| StatusTableRow {
            document: group.key.display().to_string(),
            status: group_label(group).to_string(),
            locales: group
                .locales
                .iter()
                .map(|entry| format!("{} {}", locale_indicator(entry.status), entry.locale))
                .collect::<Vec<_>>()
                .join("  "),
            source_edited: group
                .source_modified
                .map(format_system_time_age)
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if summary.stale_mirrors > 0 || summary.complete < summary.groups {
        println!("Run 'locsync reconcile' to update missing and stale translations.");
    }
}

fn group_label(group: &GroupStatus) -> &'static str {
    if !group.has_source() {
        "NO SOURCE"
    } else if group.stale_mirrors() > 0 {
        "STALE"
    } else if group.complete {
        "COMPLETE"
    } else {
        "INCOMPLETE"
    }
}

fn locale_indicator(status: LocaleStatus) -> String {
    match status {
        LocaleStatus::Source => "■".green().bold().to_string(),
        LocaleStatus::Mirror { stale: false } => "■".cyan().bold().to_string(),
        LocaleStatus::Mirror { stale: true } => "■".yellow().bold().to_string(),
        LocaleStatus::Missing => "■".bright_black().bold().to_string(),
        LocaleStatus::Invalid => "■".red().bold().to_string(),
    }
}
