use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Instant,
};

use crate::library::identification::{ShowIdent, ShowIdentifier};

pub mod identification;

pub const SUPPORTED_FILES: &[&str] = &["avi", "mkv", "mp4", "webm"];

/// Directories whose contents are not episodes.
pub const EXTRAS_FOLDERS: &[&str] = &[
    "behind the scenes",
    "deleted scenes",
    "extras",
    "featurettes",
    "interviews",
    "sample",
    "samples",
    "specials",
    "trailers",
];

/// A video file together with the identifier parsed out of its path.
#[derive(Debug, Clone)]
pub struct VideoFile {
    pub path: PathBuf,
    pub identifier: ShowIdentifier,
}

pub fn is_format_supported(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

fn is_extras_folder(name: &str) -> bool {
    EXTRAS_FOLDERS.iter().any(|e| name.eq_ignore_ascii_case(e))
}

/// Walks `root` collecting every identifiable episode file.
///
/// Each directory level feeds the identifier, so `Show (2005)/Season 2/03x..`
/// style trees resolve even when file names carry nothing but the episode
/// tag. Files without a recognizable tag are skipped, unreadable directories
/// are logged and skipped.
pub fn walk_show_tree(root: &Path, extensions: &[String]) -> Vec<VideoFile> {
    let start = Instant::now();
    let mut root_ident = ShowIdent::default();
    for component in root.components() {
        if let Component::Normal(name) = component {
            root_ident.parse_parent(&name.to_string_lossy());
        }
    }

    let mut files = Vec::new();
    let mut directories = vec![(root.to_path_buf(), root_ident)];
    while let Some((current_dir, dir_ident)) = directories.pop() {
        let Ok(read_dir) = fs::read_dir(&current_dir) else {
            tracing::warn!("Failed to read directory {}", current_dir.display());
            continue;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.is_dir() {
                let Some(dir_name) = path.file_name().map(|n| n.to_string_lossy().into_owned())
                else {
                    continue;
                };
                if is_extras_folder(&dir_name) {
                    tracing::debug!("Skipping extras directory: {}", path.display());
                    continue;
                }
                let mut child_ident = dir_ident.clone();
                child_ident.parse_parent(&dir_name);
                directories.push((path, child_ident));
                continue;
            }
            if !is_format_supported(&path, extensions) {
                tracing::trace!("Skipping unsupported file: {}", path.display());
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let mut ident = dir_ident.clone();
            if let Err(e) = ident.parse_name(&stem) {
                tracing::warn!("Skipping {}: {e}", path.display());
                continue;
            }
            match ShowIdentifier::try_from(ident) {
                Ok(identifier) => files.push(VideoFile { path, identifier }),
                Err(_) => {
                    tracing::debug!("No episode tag in {}, skipping", path.display());
                }
            }
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("Walking {} took {:?}", root.display(), start.elapsed());
    files
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};

    use super::*;

    fn touch(path: &Path) {
        File::create(path).expect("create file");
    }

    fn exts() -> Vec<String> {
        SUPPORTED_FILES.iter().map(|e| e.to_string()).collect()
    }

    #[test_log::test]
    fn walk_collects_identified_episodes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let show = dir.path().join("The Wire (2002)");
        let season = show.join("Season 2");
        fs::create_dir_all(&season).expect("mkdirs");
        touch(&season.join("2x01.mkv"));
        touch(&season.join("The.Wire.S02E02.720p.mkv"));
        touch(&season.join("cover.jpg"));
        touch(&season.join("no episode here.mkv"));

        let files = walk_show_tree(dir.path(), &exts());
        assert_eq!(files.len(), 2);
        for file in &files {
            assert_eq!(file.identifier.season, 2);
            assert_eq!(file.identifier.year, Some(2002));
        }
        assert_eq!(files[0].identifier.title, "The Wire");
        assert_eq!(files[0].identifier.episodes, vec![1]);
        assert_eq!(files[1].identifier.episodes, vec![2]);
    }

    #[test]
    fn walk_skips_extras_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let show = dir.path().join("Show");
        let extras = show.join("Extras");
        fs::create_dir_all(&extras).expect("mkdirs");
        touch(&show.join("Show.S01E01.mkv"));
        touch(&extras.join("Show.S01E99.mkv"));

        let files = walk_show_tree(dir.path(), &exts());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].identifier.episodes, vec![1]);
    }
}
