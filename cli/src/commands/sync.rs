use anyhow::{Result, bail};

use calgrid_core::service::{CalgridService, SyncReport};
use calgrid_core::store::SyncOutcome;

fn describe(kind: &str, outcome: Option<&SyncOutcome>) -> String {
    match outcome {
        None => format!("{kind}: fetch failed, local copy unchanged"),
        Some(o) => {
            let mut line = format!(
                "{kind}: {} fetched, {} added, {} updated",
                o.fetched, o.added, o.updated
            );
            if o.superseded > 0 {
                line.push_str(&format!(", {} duplicates removed", o.superseded));
            }
            if o.dropped > 0 {
                line.push_str(&format!(", {} unreadable skipped", o.dropped));
            }
            line
        }
    }
}

pub(crate) async fn cmd_sync(svc: &mut CalgridService, json: bool) -> Result<()> {
    if !svc.entry_store().has_remote() {
        bail!("No remote configured. Set CALGRID_REMOTE_URL or remote_url in config.toml");
    }

    let report: SyncReport = svc.sync().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", describe("Entries", report.entries.as_ref()));
    println!("{}", describe("Messages", report.messages.as_ref()));
    if report.entries.is_none() || report.messages.is_none() {
        eprintln!("Run with RUST_LOG=calgrid_core=debug for details");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(
            describe("Entries", None),
            "Entries: fetch failed, local copy unchanged"
        );
        let outcome = SyncOutcome {
            fetched: 5,
            dropped: 1,
            added: 2,
            updated: 1,
            superseded: 0,
        };
        assert_eq!(
            describe("Entries", Some(&outcome)),
            "Entries: 5 fetched, 2 added, 1 updated, 1 unreadable skipped"
        );
        let outcome = SyncOutcome {
            fetched: 2,
            updated: 1,
            superseded: 1,
            ..SyncOutcome::default()
        };
        assert_eq!(
            describe("Entries", Some(&outcome)),
            "Entries: 2 fetched, 0 added, 1 updated, 1 duplicates removed"
        );
    }
}
