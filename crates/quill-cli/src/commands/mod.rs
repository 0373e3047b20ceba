//! CLI command implementations

pub mod completions;
pub mod config;
pub mod index;
pub mod record;
pub mod search;

use quill_search::{SearchError, SyncOutcome};

/// Short description of an index sync result for command output
pub(crate) fn describe_sync(result: &Result<SyncOutcome, SearchError>) -> String {
    match result {
        Ok(SyncOutcome::Indexed(outcome)) if outcome.replaced > 0 => {
            format!("indexed, replaced {}", outcome.replaced)
        }
        Ok(SyncOutcome::Indexed(_)) => "indexed".to_string(),
        Ok(SyncOutcome::Removed { removed, .. }) => format!("removed {} from index", removed),
        Ok(SyncOutcome::Untracked(_)) => "not indexed".to_string(),
        Err(e) => format!("index sync failed: {}", e),
    }
}
