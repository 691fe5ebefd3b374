use std::collections::HashMap;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tv_renamer::config::{Args, Config, API_KEY_ENV};
use tv_renamer::history::HistoryLog;
use tv_renamer::library::{walk_show_tree, VideoFile};
use tv_renamer::metadata::tvdb_api::TvdbApi;
use tv_renamer::metadata::{ShowMetadata, ShowMetadataProvider};
use tv_renamer::rename::{build_plan, execute_plan, EpisodeRename, RenameOutcome};
use tv_renamer::tracing::init_tracer;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracer(args.log_level);
    if let Ok(path) = dotenv() {
        tracing::debug!("Loaded env variables from: {}", path.display());
    }
    match run(args).await {
        Ok(outcome) if outcome.failed == 0 => ExitCode::SUCCESS,
        Ok(outcome) => {
            tracing::error!("{} renames failed", outcome.failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RenameOutcome> {
    let config = Config::load(args)?;
    let files = walk_show_tree(&config.scan_dir, &config.video_extensions);
    if files.is_empty() {
        tracing::info!(
            "No episode files found under {}",
            config.scan_dir.display()
        );
        return Ok(RenameOutcome::default());
    }
    tracing::info!("Found {} episode files", files.len());

    let episodes = if config.offline {
        files.into_iter().map(offline_episode).collect()
    } else {
        let api_key = config.api_key.clone().with_context(|| {
            format!(
                "TVDB api key is missing, set {API_KEY_ENV} or api_key in {} (or pass --offline)",
                config.resources.config_path.display()
            )
        })?;
        let tvdb = TvdbApi::new(
            api_key,
            config.resources.token_path.clone(),
            config.resources.cache_path.clone(),
        );
        resolve_files(&tvdb, files, config.tags_only).await
    };

    let plan = build_plan(&episodes, &config.rename_format);
    if plan.is_empty() {
        tracing::info!("Nothing to rename");
        return Ok(RenameOutcome::default());
    }
    let history = if config.dry_run {
        HistoryLog::new(&config.dry_run_history_path)
    } else {
        HistoryLog::new(&config.history_path)
    };
    let outcome = execute_plan(&plan, &history, config.dry_run);
    tracing::info!(
        "Renamed {} files, {} conflicts skipped, {} failed",
        outcome.renamed,
        outcome.skipped_conflicts,
        outcome.failed
    );
    Ok(outcome)
}

fn offline_episode(file: VideoFile) -> EpisodeRename {
    let identifier = file.identifier;
    EpisodeRename {
        path: file.path,
        show_title: identifier.title.clone(),
        show_year: identifier.year,
        episode_titles: Vec::new(),
        identifier,
    }
}

/// Resolves every file against the catalog. Files are grouped by inferred
/// show so each show is searched once; lookup failures degrade to tags-only
/// naming instead of aborting the batch.
async fn resolve_files(
    provider: &impl ShowMetadataProvider,
    files: Vec<VideoFile>,
    tags_only: bool,
) -> Vec<EpisodeRename> {
    let mut shows: HashMap<(String, Option<u16>), Option<ShowMetadata>> = HashMap::new();
    let mut episodes = Vec::with_capacity(files.len());
    for file in files {
        let key = (file.identifier.title.to_lowercase(), file.identifier.year);
        let show = match shows.get(&key) {
            Some(cached) => cached.clone(),
            None => {
                let resolved = match provider
                    .search_show(&file.identifier.title, file.identifier.year)
                    .await
                {
                    Ok(Some(show)) => {
                        tracing::debug!(
                            "Resolved \"{}\" to \"{}\" via {}",
                            file.identifier.title,
                            show.title,
                            provider.provider_identifier()
                        );
                        Some(show)
                    }
                    Ok(None) => {
                        tracing::warn!(
                            "No {} results for \"{}\", falling back to parsed tags",
                            provider.provider_identifier(),
                            file.identifier.title
                        );
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Search for \"{}\" failed: {e}", file.identifier.title);
                        None
                    }
                };
                shows.insert(key, resolved.clone());
                resolved
            }
        };

        let mut episode_titles = Vec::new();
        if let Some(show) = &show {
            if !tags_only {
                for number in &file.identifier.episodes {
                    match provider
                        .episode(show.id, file.identifier.season, *number)
                        .await
                    {
                        Ok(Some(episode)) => {
                            if let Some(title) = episode.title {
                                episode_titles.push(title);
                            }
                        }
                        Ok(None) => tracing::debug!(
                            "S{:02}E{:02} of \"{}\" is not in the catalog",
                            file.identifier.season,
                            number,
                            show.title
                        ),
                        Err(e) => tracing::warn!("Episode lookup failed: {e}"),
                    }
                }
            }
        }

        let (show_title, show_year) = match &show {
            Some(show) => (show.title.clone(), show.year.or(file.identifier.year)),
            None => (file.identifier.title.clone(), file.identifier.year),
        };
        episodes.push(EpisodeRename {
            path: file.path,
            identifier: file.identifier,
            show_title,
            show_year,
            episode_titles,
        });
    }
    episodes
}
