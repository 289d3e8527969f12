//! AgentMesh Audit Core — Demo CLI
//!
//! Walks the tamper-evident audit log through its paces: appending governed
//! events, verifying chain integrity, producing Merkle inclusion proofs,
//! demonstrating tamper detection, and exporting CloudEvents.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- walkthrough
//!   cargo run -p demo -- tamper
//!   cargo run -p demo -- persistence
//!   cargo run -p demo -- export

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use agentmesh_audit::{
    verify_proof, AuditLog, AuditQuery, ChainStatus, MemoryStore, MerkleAuditChain,
    PersistentAuditLog,
};
use agentmesh_contracts::{event_type, AuditEvent, AuditOutcome, AuditResult};

// ── CLI definition ────────────────────────────────────────────────────────────

/// AgentMesh — tamper-evident audit log demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "AgentMesh audit core demo",
    long_about = "Exercises the hash-chained, Merkle-proven audit log:\n\
                  append, verify, prove, detect tampering, export."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every demo in sequence.
    RunAll,
    /// Append events, verify the chain, prove one entry's inclusion.
    Walkthrough,
    /// Corrupt a stored entry and watch verification localize it.
    Tamper,
    /// Persist, restore, and re-verify through the storage seam.
    Persistence,
    /// Print the CloudEvents and bulk export forms.
    Export,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Structured logging; set RUST_LOG=debug to watch appends and tree growth.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::Walkthrough => run_walkthrough(),
        Command::Tamper => run_tamper(),
        Command::Persistence => run_persistence(),
        Command::Export => run_export(),
    };

    match result {
        Ok(()) => println!("All selected demos completed."),
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_all() -> AuditResult<()> {
    run_walkthrough()?;
    run_tamper()?;
    run_persistence()?;
    run_export()
}

// ── Shared fixture ────────────────────────────────────────────────────────────

/// A small log with a morning's worth of governed activity.
fn sample_log() -> AuditResult<AuditLog> {
    let mut log = AuditLog::new();

    log.append(
        AuditEvent::new(event_type::AGENT_REGISTERED, "did:mesh:translator-01", "register")
            .with_data_entry("display_name", serde_json::json!("Contract Translator")),
    )?;
    log.append(
        AuditEvent::new(event_type::TOOL_INVOCATION, "did:mesh:translator-01", "invoke_tool")
            .with_resource("tool/web_search")
            .with_trace_id("trace-4f2a")
            .with_data_entry("query", serde_json::json!("ISDA clause precedent")),
    )?;
    log.append(
        AuditEvent::new(event_type::POLICY_DECISION, "did:mesh:translator-01", "evaluate")
            .with_resource("doc/contract-17")
            .with_outcome(AuditOutcome::Denied)
            .with_policy_decision("deny")
            .with_matched_rule("no-bulk-export"),
    )?;
    log.append(
        AuditEvent::new(event_type::DELEGATION_CREATED, "did:mesh:translator-01", "delegate")
            .with_target("did:mesh:reviewer-02"),
    )?;

    Ok(log)
}

// ── Demos ─────────────────────────────────────────────────────────────────────

fn run_walkthrough() -> AuditResult<()> {
    println!("── Walkthrough ──────────────────────────────────────");
    let log = sample_log()?;

    println!("appended {} entries", log.len());
    println!("merkle root: {}", log.root_hash().unwrap_or("<empty>"));
    println!("chain verification: {:?}", log.verify_integrity());

    let denied = log.query(
        &AuditQuery::new()
            .for_agent("did:mesh:translator-01")
            .with_outcome(AuditOutcome::Denied),
    );
    for entry in &denied {
        println!(
            "denied action: {} on {} (rule: {})",
            entry.action,
            entry.resource.as_deref().unwrap_or("-"),
            entry.matched_rule.as_deref().unwrap_or("-"),
        );
    }

    // Prove the denial's inclusion, the way an auditor would.
    let Some(target) = denied.first().map(|e| e.entry_id.clone()) else {
        println!("no denied entries to prove");
        return Ok(());
    };
    if let Some(bundle) = log.proof(&target) {
        println!(
            "inclusion proof: {} steps, verified = {}",
            bundle.proof.len(),
            bundle.verified
        );
        // The proof also replays offline, with no access to the log.
        let offline = verify_proof(&bundle.entry.entry_hash, &bundle.proof, &bundle.root_hash);
        println!("offline replay: {}", offline);
    }
    println!();
    Ok(())
}

fn run_tamper() -> AuditResult<()> {
    println!("── Tamper detection ─────────────────────────────────");
    let log = sample_log()?;
    let mut entries = log.export(None, None).entries;

    let intact = MerkleAuditChain::from_entries(entries.clone());
    println!("original chain: {:?}", intact.verify_chain());

    // An attacker rewrites the denied action in storage.
    entries[2].action = "approve_export".to_string();
    let tampered = MerkleAuditChain::from_entries(entries);

    match tampered.verify_chain() {
        ChainStatus::Broken { index, reason } => {
            println!("tampering detected at entry {}: {}", index, reason)
        }
        ChainStatus::Valid => println!("UNEXPECTED: tampering went undetected"),
    }
    println!();
    Ok(())
}

fn run_persistence() -> AuditResult<()> {
    println!("── Persistence round trip ───────────────────────────");

    let mut persistent = PersistentAuditLog::new(MemoryStore::new());
    persistent.append(
        AuditEvent::new(event_type::TOOL_INVOCATION, "did:mesh:translator-01", "invoke_tool")
            .with_resource("tool/ocr"),
    )?;
    persistent.append(AuditEvent::new(
        event_type::IDENTITY_VERIFIED,
        "did:mesh:reviewer-02",
        "verify",
    ))?;
    let root = persistent.log().root_hash().unwrap_or("").to_string();
    println!("persisted {} entries, root {}", persistent.log().len(), root);

    // Simulate a restart: rebuild from the store and re-verify.
    let (store, _) = persistent.into_parts();
    let restored = PersistentAuditLog::load(store)?;
    println!(
        "restored {} entries, root matches: {}",
        restored.log().len(),
        restored.log().root_hash() == Some(root.as_str())
    );
    println!();
    Ok(())
}

fn run_export() -> AuditResult<()> {
    println!("── Export ───────────────────────────────────────────");
    let log = sample_log()?;

    for event in log.export_cloudevents(None, None).iter().take(2) {
        println!(
            "{}",
            serde_json::to_string_pretty(event).unwrap_or_else(|_| "<unserializable>".into())
        );
    }

    let export = log.export(None, None);
    println!(
        "bulk export: {} entries under root {}",
        export.entry_count,
        export.merkle_root.as_deref().unwrap_or("<empty>")
    );
    println!();
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("AgentMesh — Tamper-Evident Audit Log");
    println!("====================================");
    println!();
    println!("Every governed action becomes an immutable entry:");
    println!("  [1] SHA-256 content hash, linked to the previous entry's hash");
    println!("  [2] Leaf in an incrementally maintained Merkle tree");
    println!("  [3] Provable to third parties via O(log n) inclusion proofs");
    println!("  [4] Whole-history verification in O(n) at any time");
    println!();
}
