use std::{
    borrow::Cow,
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use time::macros::format_description;
use time::OffsetDateTime;

const HISTORY_HEADER: &str = "ts,folder,original_filename,new_filename";

/// Append-only CSV log of performed renames.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one rename row, creating the file with its header first if
    /// needed.
    pub fn append(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let write_header = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open history file {}", self.path.display()))?;
        if write_header {
            writeln!(file, "{HISTORY_HEADER}")?;
        }
        let folder = from
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let original = file_name(from);
        let renamed = file_name(to);
        writeln!(
            file,
            "{},{},{},{}",
            escape_field(&timestamp()?),
            escape_field(&folder),
            escape_field(&original),
            escape_field(&renamed),
        )?;
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn timestamp() -> anyhow::Result<String> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(now.format(&format)?)
}

/// RFC 4180 quoting for fields containing separators, quotes or line breaks.
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = HistoryLog::new(dir.path().join("history.csv"));
        log.append(Path::new("/tv/a.mkv"), Path::new("/tv/b.mkv"))
            .expect("append");
        log.append(Path::new("/tv/c.mkv"), Path::new("/tv/d.mkv"))
            .expect("append");

        let contents = fs::read_to_string(log.path()).expect("read back");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], HISTORY_HEADER);
        assert!(lines[1].ends_with("a.mkv,b.mkv"));
        assert!(lines[2].ends_with("c.mkv,d.mkv"));
    }

    #[test]
    fn fields_with_separators_are_quoted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = HistoryLog::new(dir.path().join("history.csv"));
        log.append(
            Path::new("/tv/show, the/a.mkv"),
            Path::new("/tv/show, the/Show, The - S01E01.mkv"),
        )
        .expect("append");

        let contents = fs::read_to_string(log.path()).expect("read back");
        assert!(contents.contains("\"/tv/show, the\""));
        assert!(contents.contains("\"Show, The - S01E01.mkv\""));
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("plain"), "plain");
    }
}
