//! Interactive merge confirmation.

use dbcatalog_core::sync::{IdentityMismatchContext, MergeConfirmation};
use std::io::{BufRead, Write};

/// Asks on the terminal whether an unconfirmed artifact may be merged.
///
/// Anything but an explicit yes replaces the artifact.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConfirmation;

impl TerminalConfirmation {
    fn ask(&self, context: &IdentityMismatchContext) -> std::io::Result<bool> {
        let mut stderr = std::io::stderr().lock();
        writeln!(
            stderr,
            "The existing catalog at {} does not name database '{}' ({} tables).",
            context.artifact.display(),
            context.expected.logical_name,
            context.prior_table_count
        )?;
        write!(stderr, "Merge the refreshed tables into it anyway? [y/N] ")?;
        stderr.flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl MergeConfirmation for TerminalConfirmation {
    fn confirm(&self, context: &IdentityMismatchContext) -> bool {
        match self.ask(context) {
            Ok(merge) => merge,
            Err(e) => {
                tracing::warn!("Could not read confirmation ({}); replacing the catalog", e);
                false
            }
        }
    }
}
