use std::{collections::HashSet, fmt::Display, fs, path::PathBuf};

use crate::history::HistoryLog;
use crate::library::identification::ShowIdentifier;

pub const DEFAULT_RENAME_FORMAT: &str =
    "{show_name} ({show_year}) - S{season_no}E{episode_no} - {episode_name}{ext}";

/// Everything needed to render one file's normalized name.
#[derive(Debug, Clone)]
pub struct EpisodeRename {
    pub path: PathBuf,
    pub identifier: ShowIdentifier,
    pub show_title: String,
    pub show_year: Option<u16>,
    /// Episode titles from the catalog, one per found episode number.
    /// Empty in tags-only and offline runs
    pub episode_titles: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// A file with the target name already exists on disk
    TargetExists,
    /// Another planned rename produces the same target
    DuplicateTarget,
}

impl Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::TargetExists => write!(f, "target already exists"),
            Conflict::DuplicateTarget => write!(f, "duplicate rename target"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedRename {
    pub from: PathBuf,
    pub to: PathBuf,
    pub conflict: Option<Conflict>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RenameOutcome {
    pub renamed: usize,
    pub skipped_conflicts: usize,
    pub failed: usize,
}

/// `E05` part of the tag: a single number, or a `min-max` span for
/// multi-episode files.
fn episode_span(episodes: &[u16]) -> String {
    let min = episodes.iter().min().copied().unwrap_or(0);
    let max = episodes.iter().max().copied().unwrap_or(0);
    if min == max {
        format!("{min:02}")
    } else {
        format!("{min:02}-E{max:02}")
    }
}

/// Characters that are unsafe in file names on at least one supported platform.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Renders the normalized file name for one episode.
///
/// Template segments whose value is missing (no year, no episode title) are
/// dropped together with their ` - `/`()` decorations so no dangling
/// separators remain.
pub fn render_file_name(format: &str, episode: &EpisodeRename) -> String {
    let ext = episode
        .path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let episode_name = episode.episode_titles.join("~~");

    let mut template = format.to_string();
    if episode_name.is_empty() {
        template = template
            .replace(" - {episode_name}", "")
            .replace("{episode_name}", "");
    }
    match episode.show_year {
        Some(year) => template = template.replace("{show_year}", &year.to_string()),
        None => {
            template = template
                .replace(" ({show_year})", "")
                .replace("{show_year}", "");
        }
    }
    let rendered = template
        .replace("{show_name}", &episode.show_title)
        .replace("{season_no}", &format!("{:02}", episode.identifier.season))
        .replace("{episode_no}", &episode_span(&episode.identifier.episodes))
        .replace("{episode_name}", &episode_name)
        .replace("{ext}", &ext);
    sanitize_file_name(&rendered)
}

/// Builds the rename plan: renders every target name, drops no-ops and marks
/// conflicting targets.
pub fn build_plan(episodes: &[EpisodeRename], format: &str) -> Vec<PlannedRename> {
    let mut plan: Vec<PlannedRename> = Vec::new();
    let mut targets: HashSet<String> = HashSet::new();
    for episode in episodes {
        let new_name = render_file_name(format, episode);
        let to = match episode.path.parent() {
            Some(parent) => parent.join(&new_name),
            None => PathBuf::from(&new_name),
        };
        let from_key = episode.path.to_string_lossy().to_lowercase();
        let to_key = to.to_string_lossy().to_lowercase();
        if from_key == to_key {
            tracing::trace!("{} already normalized", episode.path.display());
            continue;
        }
        let conflict = if !targets.insert(to_key) {
            Some(Conflict::DuplicateTarget)
        } else if to.exists() {
            Some(Conflict::TargetExists)
        } else {
            None
        };
        plan.push(PlannedRename {
            from: episode.path.clone(),
            to,
            conflict,
        });
    }
    plan
}

/// Applies the plan. Conflicting entries are skipped, failures are logged and
/// counted without aborting the batch.
pub fn execute_plan(plan: &[PlannedRename], history: &HistoryLog, dry_run: bool) -> RenameOutcome {
    let mut outcome = RenameOutcome::default();
    let testing_tag = if dry_run { "[TEST ONLY] " } else { "" };
    for (i, item) in plan.iter().enumerate() {
        if let Some(conflict) = item.conflict {
            tracing::warn!(
                "[{i}] Skipping \"{}\": {conflict}",
                item.from.display()
            );
            outcome.skipped_conflicts += 1;
            continue;
        }
        tracing::info!(
            "[{i}] {testing_tag}Renaming \"{}\" --> \"{}\"",
            item.from.display(),
            item.to.display()
        );
        if !dry_run {
            if let Err(e) = fs::rename(&item.from, &item.to) {
                tracing::error!("[{i}] Failed to rename {}: {e}", item.from.display());
                outcome.failed += 1;
                continue;
            }
        }
        outcome.renamed += 1;
        if let Err(e) = history.append(&item.from, &item.to) {
            tracing::warn!("Failed to log rename to history: {e}");
        }
    }
    outcome
}
