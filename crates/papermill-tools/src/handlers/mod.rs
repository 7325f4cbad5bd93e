//! Operation handlers backed by external command-line tools.
//!
//! One module per operation family. Handlers narrate progress through the
//! job's emitter, stage their intermediate files in the job's scratch
//! directory, and hand finished files to the artifact store; terminal
//! events are the worker's job, never theirs.

pub mod compress;
pub mod extract;
pub mod images;
pub mod merge;
pub mod office;
pub mod organize;
pub mod protect;
pub mod split;

use std::path::{Path, PathBuf};

use papermill_jobs::HandlerError;
use papermill_store::{Artifact, ArtifactStore, OutputSlot};

/// Wrap any underlying failure with the operation's user-facing context,
/// matching the `Error <doing thing>: <cause>` shape of terminal errors.
pub(crate) fn wrap<E>(context: &str, err: E) -> HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    HandlerError::with_source(format!("{context}: {err}"), err)
}

/// Parse a user page range like `1-3,5,8-10` into its comma groups.
///
/// Groups are validated here so a malformed range fails with a readable
/// message instead of a tool's usage dump.
pub(crate) fn parse_range_groups(raw: &str) -> Result<Vec<String>, HandlerError> {
    let groups: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    let valid = !groups.is_empty()
        && groups.iter().all(|group| match group.split_once('-') {
            Some((start, end)) => is_page_number(start) && is_page_number(end),
            None => is_page_number(group),
        });
    if valid {
        Ok(groups)
    } else {
        Err(HandlerError::new(format!("Invalid page range: {raw}")))
    }
}

fn is_page_number(s: &str) -> bool {
    s.trim().parse::<u32>().is_ok_and(|n| n > 0)
}

/// Move a file a tool produced in scratch onto an allocated output slot
/// and seal it. Scratch and output share a filesystem, so a rename is all
/// it takes.
pub(crate) async fn adopt_file(
    store: &ArtifactStore,
    produced: &Path,
    slot: OutputSlot,
) -> Result<Artifact, HandlerError> {
    tokio::fs::rename(produced, slot.path())
        .await
        .map_err(|e| {
            HandlerError::with_source(
                format!("Output file could not be collected: {}", slot.name()),
                e,
            )
        })?;
    Ok(store.seal(slot).await?)
}

/// List files in a scratch directory whose names start with `prefix`,
/// ordered by the page number their stem ends with.
pub(crate) async fn list_produced(
    dir: &Path,
    prefix: &str,
) -> Result<Vec<PathBuf>, HandlerError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| HandlerError::with_source("Scratch directory unreadable", e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| HandlerError::with_source("Scratch directory unreadable", e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(prefix) {
            names.push(name);
        }
    }
    names.sort_by_key(|name| trailing_number(name));
    Ok(names.into_iter().map(|name| dir.join(name)).collect())
}

/// Trailing page number of a file stem, for ordering tool output. Files
/// without one sort last, by name.
fn trailing_number(name: &str) -> (u64, String) {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let number = digits
        .chars()
        .rev()
        .collect::<String>()
        .parse()
        .unwrap_or(u64::MAX);
    (number, name.to_string())
}
