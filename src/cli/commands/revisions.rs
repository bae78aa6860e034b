//! `bwstate revisions` — show the state timeline of the configured item.

use std::sync::Arc;

use crate::cli::{item_locator, open_vault, output, state_store, Cli};
use crate::diagnostics::TracingDiagnostics;
use crate::errors::Result;
use crate::store::RetentionPolicy;

/// Execute the `revisions` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let reference = config.state_reference()?;
    let vault = open_vault(&config)?;

    let locator = item_locator(&config, Arc::new(vault), Arc::new(TracingDiagnostics));
    let store = state_store(&config, locator);
    let revisions = store.revisions(&reference)?;

    output::info(&format!(
        "{} revision(s) on {reference}, keeping {} ({} retention)",
        revisions.len(),
        store.max_revisions(),
        config.retention(),
    ));
    if let Some(note) = over_retention(revisions.len(), store.max_revisions(), config.retention()) {
        output::warning(&note);
    }
    output::print_revisions_table(&revisions);
    Ok(())
}

/// A warning when more revisions are stored than `max_revisions`.
fn over_retention(stored: usize, max_revisions: u16, policy: RetentionPolicy) -> Option<String> {
    let max = usize::from(max_revisions);
    if stored <= max {
        return None;
    }
    let hint = match policy {
        RetentionPolicy::Literal => " Set `retention = \"strict\"` to cap them exactly.",
        RetentionPolicy::Strict => "",
    };
    Some(format!(
        "{} revision(s) more than max_revisions = {max} are stored.{hint}",
        stored - max
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_the_limit_says_nothing() {
        assert!(over_retention(0, 5, RetentionPolicy::Literal).is_none());
        assert!(over_retention(5, 5, RetentionPolicy::Strict).is_none());
    }

    #[test]
    fn literal_overflow_suggests_strict() {
        let note = over_retention(7, 5, RetentionPolicy::Literal).unwrap();
        assert!(note.starts_with("2 revision(s)"), "{note}");
        assert!(note.contains("strict"), "{note}");
    }

    #[test]
    fn strict_overflow_has_no_hint() {
        let note = over_retention(6, 5, RetentionPolicy::Strict).unwrap();
        assert!(!note.contains("retention ="), "{note}");
    }
}
