use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use retentiondb::reaper::PurgeCycleOptions;
use retentiondb::store::{Allocation, AuditTriple, Communication, EntityRecord};
use retentiondb::{ContractStatus, EngineConfig, EntityKind, PurgeReport, RetentionEngine};

#[derive(Parser)]
#[command(name = "retentiondb")]
#[command(about = "Lifecycle and retention engine: soft delete, preserve, purge")]
struct Cli {
    /// Directory holding the snapshot and audit journal
    #[arg(long, global = true, default_value = "./retentiondb-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate the store with a small demonstration dataset
    SeedDemo,
    /// List records, children grouped under their live parents
    List {
        /// Restrict to one kind (e.g. warehouse, customer)
        #[arg(long)]
        kind: Option<String>,
        /// Include soft-deleted rows and rows hidden under deleted parents
        #[arg(long)]
        all: bool,
    },
    /// Run one purge cycle over everything past the retention window
    Purge {
        #[arg(long, default_value_t = 180)]
        retention_days: i64,
        /// Report what would be purged without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Emit the report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the audit trail, optionally for a single record id
    Audit {
        #[arg(long)]
        id: Option<Uuid>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    let config = EngineConfig::new().data_dir(cli.data_dir.clone());
    let engine = RetentionEngine::with_config(config)?;
    engine.load_snapshot().await?;

    match cli.command {
        Command::SeedDemo => {
            seed_demo(&engine).await?;
            engine.save_snapshot().await?;
            println!("Seeded demo data into {}", cli.data_dir.display());
        }
        Command::List { kind, all } => {
            let kinds: Vec<EntityKind> = match kind.as_deref() {
                Some(name) => match EntityKind::parse(name) {
                    Some(kind) => vec![kind],
                    None => anyhow::bail!("unknown kind '{name}'"),
                },
                // the default tree already shows children under their
                // parents, so walk the top-level kinds only
                None if !all => EntityKind::ALL
                    .into_iter()
                    .filter(|kind| engine.registry().policy(*kind).parent_kind.is_none())
                    .collect(),
                None => EntityKind::ALL.to_vec(),
            };
            list_records(&engine, &kinds, all).await;
        }
        Command::Purge {
            retention_days,
            dry_run,
            json,
        } => {
            let mut opts = PurgeCycleOptions::new(Utc::now(), retention_days)
                .with_instance_timeout(engine.config().instance_timeout);
            if dry_run {
                opts = opts.dry_run();
            }
            let report = engine.run_purge_cycle_with(opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if !dry_run {
                engine.save_snapshot().await?;
            }
        }
        Command::Audit { id } => {
            let mut entries = engine.audit_entries().await;
            if let Some(id) = id {
                entries.retain(|entry| entry.id.as_uuid() == id);
            }
            if entries.is_empty() {
                println!("No audit entries.");
            }
            for entry in &entries {
                let reason = entry.reason.as_deref().unwrap_or("-");
                println!(
                    "{}  {}/{}  {}  actor={}  reason={}",
                    entry.occurred_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    entry.id,
                    entry.action,
                    entry.actor,
                    reason
                );
            }
        }
    }
    Ok(())
}

/// A small dataset exercising the interesting corners: live records with
/// evidence, a test-flagged warehouse already past the retention window, and
/// a fresh soft delete that is not yet eligible.
async fn seed_demo(engine: &RetentionEngine) -> Result<()> {
    let store = engine.store();
    let now = Utc::now();

    let warehouse = store
        .insert(EntityRecord::new(EntityKind::Warehouse, "North Dock"))
        .await?;
    let zone = store
        .insert(EntityRecord::new(EntityKind::Zone, "Aisle 1").with_parent(warehouse))
        .await?;
    let customer = store
        .insert(EntityRecord::new(EntityKind::Customer, "Acme Logistics"))
        .await?;
    store
        .add_allocation(Allocation::new(warehouse.id, Some(zone.id), customer.id))
        .await?;

    let contact = store
        .insert(EntityRecord::new(EntityKind::Contact, "Dana Reeve").with_parent(customer))
        .await?;
    store
        .add_communication(Communication::new(contact.id, customer.id, "email"))
        .await?;
    store
        .insert(
            EntityRecord::new(EntityKind::Contract, "Storage agreement 2024")
                .with_parent(customer)
                .with_contract_status(ContractStatus::Active),
        )
        .await?;

    store
        .insert(EntityRecord::new(EntityKind::User, "pat").with_authentication_history())
        .await?;
    store
        .insert(EntityRecord::new(EntityKind::Role, "admin").as_system())
        .await?;
    store
        .insert(EntityRecord::new(EntityKind::Role, "auditor"))
        .await?;

    // already past the default retention window; the next live purge cycle
    // removes it together with its zone
    let mut aged = EntityRecord::new(EntityKind::Warehouse, "Loadtest Site").as_test_data();
    aged.lifecycle.deleted = Some(AuditTriple::new("ops", now - chrono::Duration::days(200)));
    let aged = store.insert(aged).await?;
    store
        .insert(EntityRecord::new(EntityKind::Zone, "Bay A").with_parent(aged))
        .await?;

    // deleted recently; a purge cycle leaves it alone
    let mut fresh = EntityRecord::new(EntityKind::Customer, "Ghost Ventures");
    fresh.lifecycle.deleted = Some(AuditTriple::new("ops", now - chrono::Duration::days(10)));
    store.insert(fresh).await?;

    Ok(())
}

async fn list_records(engine: &RetentionEngine, kinds: &[EntityKind], all: bool) {
    let store = engine.store();
    for &kind in kinds {
        if all {
            let records = store.list(kind).await;
            if records.is_empty() {
                continue;
            }
            println!("{kind}:");
            for record in &records {
                println!("  {}  {}{}", record.id, record.name, describe(record));
            }
            continue;
        }
        match engine.registry().policy(kind).parent_kind {
            None => {
                let records = store.list_live(kind).await;
                if records.is_empty() {
                    continue;
                }
                println!("{kind}:");
                for record in &records {
                    println!("  {}  {}{}", record.id, record.name, describe(record));
                    for child in store.live_children_of(record.entity_ref()).await {
                        println!("    {}  {}/{}{}", child.id, child.kind, child.name, describe(&child));
                    }
                }
            }
            // child kinds list under their live parents so rows hidden by a
            // deleted parent stay hidden here too
            Some(parent_kind) => {
                let mut shown = false;
                for parent in store.list_live(parent_kind).await {
                    for child in store.live_children_of(parent.entity_ref()).await {
                        if child.kind != kind {
                            continue;
                        }
                        if !shown {
                            println!("{kind}:");
                            shown = true;
                        }
                        println!(
                            "  {}  {}  (under {} '{}')",
                            child.id,
                            child.name,
                            parent_kind,
                            parent.name
                        );
                    }
                }
            }
        }
    }
}

fn describe(record: &EntityRecord) -> String {
    let mut tags: Vec<String> = Vec::new();
    if record.system {
        tags.push("system".to_string());
    }
    if record.test_data {
        tags.push("test data".to_string());
    }
    if let Some(verb) = record.lifecycle.preserved_verb() {
        tags.push(verb.past_tense().to_string());
    }
    if let Some(at) = record.lifecycle.deleted_at() {
        tags.push(format!("deleted {}", at.format("%Y-%m-%d")));
    }
    if !record.lifecycle.is_active() {
        tags.push("inactive".to_string());
    }
    if tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", tags.join(", "))
    }
}

fn print_report(report: &PurgeReport) {
    let mode = if report.dry_run { "dry run" } else { "live" };
    println!(
        "Purge cycle ({}) examined {} candidate(s): {} purged, {} skipped, {} failed",
        mode,
        report.examined,
        report.purged.len(),
        report.skipped.len(),
        report.failures.len()
    );
    for purged in &report.purged {
        println!(
            "  purged {}/{} '{}' (deleted {}, {} dependent row(s), {} evidence row(s))",
            purged.kind,
            purged.id,
            purged.name,
            purged.deleted_at.format("%Y-%m-%d"),
            purged.dependents_removed,
            purged.evidence_rows_removed
        );
    }
    for skipped in &report.skipped {
        println!("  skipped {}/{}: {}", skipped.kind, skipped.id, skipped.reason);
    }
    for failure in &report.failures {
        println!("  FAILED {}/{}: {}", failure.kind, failure.id, failure.error);
    }
}
