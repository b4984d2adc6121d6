//! On-disk list format.
//!
//! One title per line:
//!
//! ```text
//! Breaking Bad (2008) [1396]
//! Inception (2010) [movie:27205]
//! The Office [Error]
//! Some Unmatched Title
//! ```
//!
//! Shows carry a bare `[ID]`, movies `[movie:ID]`. Lines that failed resolution are
//! tagged `[Error]` so the next `fix-errors` run picks them up again; untagged lines
//! are titles that were written with matching disabled.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::model::{CandidateMatch, MediaType, RawEntry, ResolutionRecord, ResolutionStatus};
use crate::reconcile::{ErrorEntry, ListEntry, Reconciliation};
use crate::title::split_trailing_year;

#[allow(clippy::expect_used)]
static ID_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<title>.*?)\s*\[(?P<movie>movie:)?(?P<id>\d+)\]$").expect("id line regex is valid")
});

const ERROR_TAG: &str = "[Error]";

/// Errors reading or writing a list file.
#[derive(Debug, Error)]
pub enum ListFileError {
    /// Reading the list failed.
    #[error("failed to read list {path}: {source}")]
    Read {
        /// List path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Writing the list failed.
    #[error("failed to write list {path}: {source}")]
    Write {
        /// List path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

impl ListFileError {
    fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A classified list line.
#[derive(Debug, Clone, PartialEq)]
pub enum ListLine {
    /// Line carrying a TMDB id; becomes a full-confidence resolved record.
    Resolved(ResolutionRecord),
    /// Line tagged `[Error]`.
    Error(RawEntry),
    /// Bare title.
    Plain(RawEntry),
}

/// Contents of a list file, split by line kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedList {
    /// Lines with an id.
    pub resolved: Vec<ResolutionRecord>,
    /// `[Error]` lines.
    pub errors: Vec<RawEntry>,
    /// Untagged lines.
    pub plain: Vec<RawEntry>,
}

impl ParsedList {
    /// Total number of parsed lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len() + self.errors.len() + self.plain.len()
    }

    /// Whether the list had no titles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries that still need a lookup: error lines first, then plain ones.
    #[must_use]
    pub fn unresolved(&self) -> Vec<RawEntry> {
        self.errors.iter().chain(&self.plain).cloned().collect()
    }
}

/// Formats a final-list entry.
///
/// # Examples
///
/// ```
/// use titlesync_core::listfile::format_entry;
/// use titlesync_core::{CanonicalEntity, ListEntry, MediaType};
///
/// let entry = ListEntry {
///     entity: CanonicalEntity { tmdb_id: 27205, media_type: MediaType::Movie },
///     title: "Inception".to_string(),
///     year: Some(2010),
///     confidence: 1.0,
///     source_id: "imdb".to_string(),
/// };
/// assert_eq!(format_entry(&entry, true), "Inception (2010) [movie:27205]");
/// assert_eq!(format_entry(&entry, false), "Inception [movie:27205]");
/// ```
#[must_use]
pub fn format_entry(entry: &ListEntry, include_year: bool) -> String {
    let year = match entry.year {
        Some(year) if include_year => format!(" ({year})"),
        _ => String::new(),
    };
    match entry.entity.media_type {
        MediaType::Movie => format!("{}{year} [movie:{}]", entry.title, entry.entity.tmdb_id),
        MediaType::Show => format!("{}{year} [{}]", entry.title, entry.entity.tmdb_id),
    }
}

/// Formats an error-report entry as `Title [Error]`.
#[must_use]
pub fn format_error(entry: &ErrorEntry) -> String {
    format!("{} {ERROR_TAG}", entry.raw.title)
}

/// Classifies one line. Blank lines yield `None`.
#[must_use]
pub fn parse_line(line: &str, source_id: &str) -> Option<ListLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Tags are only recognized at the end of the line; titles may contain brackets.
    if let Some(title_part) = line.strip_suffix(ERROR_TAG) {
        return RawEntry::from_line(title_part, source_id).map(ListLine::Error);
    }

    if let Some(caps) = ID_LINE.captures(line) {
        let tmdb_id = caps.name("id").and_then(|m| m.as_str().parse::<u64>().ok());
        let (title, year) = split_trailing_year(caps.name("title").map_or("", |m| m.as_str()));
        if let Some(tmdb_id) = tmdb_id
            && !title.is_empty()
        {
            let media_type = if caps.name("movie").is_some() {
                MediaType::Movie
            } else {
                MediaType::Show
            };
            return Some(ListLine::Resolved(listed_record(
                RawEntry {
                    title,
                    year_hint: year,
                    type_hint: None,
                    source_id: source_id.to_string(),
                },
                tmdb_id,
                media_type,
            )));
        }
    }

    RawEntry::from_line(line, source_id).map(ListLine::Plain)
}

/// Record for a line that already carries an id.
///
/// The raw entry keeps no type hint, so its lookup key matches the one of a
/// bare `Title [Error]` line for the same title.
fn listed_record(raw_entry: RawEntry, tmdb_id: u64, media_type: MediaType) -> ResolutionRecord {
    let chosen = CandidateMatch {
        tmdb_id,
        media_type,
        canonical_title: raw_entry.title.clone(),
        release_year: raw_entry.year_hint,
        score: 1.0,
    };
    ResolutionRecord {
        raw_entry,
        status: ResolutionStatus::Resolved,
        chosen: Some(chosen),
        confidence: 1.0,
        candidates: Vec::new(),
        detail: None,
        resolved_at: Utc::now(),
    }
}

/// Parses list text.
#[must_use]
pub fn parse_list(text: &str, source_id: &str) -> ParsedList {
    let mut parsed = ParsedList::default();
    for line in text.lines() {
        match parse_line(line, source_id) {
            Some(ListLine::Resolved(record)) => parsed.resolved.push(record),
            Some(ListLine::Error(raw)) => parsed.errors.push(raw),
            Some(ListLine::Plain(raw)) => parsed.plain.push(raw),
            None => {}
        }
    }
    parsed
}

/// Reads and classifies a list file. A missing file reads as an empty list.
///
/// # Errors
///
/// Returns [`ListFileError::Read`] for any I/O failure other than not-found.
#[instrument(fields(path = %path.display()))]
pub fn read_list(path: &Path, source_id: &str) -> Result<ParsedList, ListFileError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!("list does not exist yet");
            return Ok(ParsedList::default());
        }
        Err(err) => return Err(ListFileError::read(path, err)),
    };
    let parsed = parse_list(&text, source_id);
    debug!(
        resolved = parsed.resolved.len(),
        errors = parsed.errors.len(),
        plain = parsed.plain.len(),
        "list parsed"
    );
    Ok(parsed)
}

/// Renders a reconciliation: resolved entries, then every error entry.
#[must_use]
pub fn render_list(reconciliation: &Reconciliation, include_year: bool) -> String {
    let mut out = String::new();
    for entry in &reconciliation.final_list {
        out.push_str(&format_entry(entry, include_year));
        out.push('\n');
    }
    for (_, entry) in reconciliation.error_report.iter() {
        out.push_str(&format_error(entry));
        out.push('\n');
    }
    out
}

/// Writes `lines` to `path` through a sibling temp file, so a crash mid-write
/// leaves the previous list intact.
///
/// # Errors
///
/// Returns [`ListFileError::Write`] if the file cannot be written or renamed.
#[instrument(skip(lines), fields(path = %path.display()))]
pub fn write_lines<I, S>(path: &Path, lines: I) -> Result<(), ListFileError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ListFileError::write(path, e))?;
    }

    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    let write_result = (|| {
        let mut writer = BufWriter::new(fs::File::create(&tmp_path)?);
        for line in lines {
            writer.write_all(line.as_ref().as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    })();
    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(ListFileError::write(path, err));
    }

    fs::rename(&tmp_path, path).map_err(|e| ListFileError::write(path, e))?;
    debug!("list written");
    Ok(())
}

/// Writes a reconciliation to `path`, replacing the previous contents.
///
/// # Errors
///
/// Returns [`ListFileError::Write`] on I/O failure.
pub fn write_list(
    path: &Path,
    reconciliation: &Reconciliation,
    include_year: bool,
) -> Result<(), ListFileError> {
    write_lines(path, render_list(reconciliation, include_year).lines())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{CanonicalEntity, ErrorReason, ResolutionStatus};
    use crate::reconcile::ErrorReport;

    fn entry(id: u64, media_type: MediaType, title: &str, year: Option<i32>) -> ListEntry {
        ListEntry {
            entity: CanonicalEntity {
                tmdb_id: id,
                media_type,
            },
            title: title.to_string(),
            year,
            confidence: 1.0,
            source_id: "test".to_string(),
        }
    }

    #[test]
    fn test_format_show_uses_bare_id() {
        let line = format_entry(&entry(1396, MediaType::Show, "Breaking Bad", Some(2008)), true);
        assert_eq!(line, "Breaking Bad (2008) [1396]");
    }

    #[test]
    fn test_format_without_known_year() {
        let line = format_entry(&entry(949, MediaType::Movie, "Heat", None), true);
        assert_eq!(line, "Heat [movie:949]");
    }

    #[test]
    fn test_parse_movie_line() {
        let Some(ListLine::Resolved(record)) =
            parse_line("Inception (2010) [movie:27205]", "list")
        else {
            panic!("expected resolved line");
        };
        assert_eq!(record.status, ResolutionStatus::Resolved);
        assert!((record.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.raw_entry.title, "Inception");
        assert_eq!(record.raw_entry.year_hint, Some(2010));
        let entity = record.canonical().unwrap();
        assert_eq!(entity.tmdb_id, 27205);
        assert_eq!(entity.media_type, MediaType::Movie);
    }

    #[test]
    fn test_parse_show_line() {
        let Some(ListLine::Resolved(record)) = parse_line("The Wire [1438]", "list") else {
            panic!("expected resolved line");
        };
        assert_eq!(record.canonical().unwrap().media_type, MediaType::Show);
        assert_eq!(record.raw_entry.year_hint, None);
    }

    #[test]
    fn test_parse_error_and_plain_lines() {
        assert_eq!(
            parse_line("The Office (2005) [Error]", "list"),
            Some(ListLine::Error(RawEntry::new("The Office", "list").with_year(2005)))
        );
        assert_eq!(
            parse_line("  Severance  ", "list"),
            Some(ListLine::Plain(RawEntry::new("Severance", "list")))
        );
        assert_eq!(parse_line("   ", "list"), None);
    }

    #[test]
    fn test_parse_line_round_trips_format() {
        let original = entry(27205, MediaType::Movie, "Inception", Some(2010));
        let Some(ListLine::Resolved(record)) =
            parse_line(&format_entry(&original, true), "list")
        else {
            panic!("expected resolved line");
        };
        assert_eq!(record.canonical(), Some(original.entity));
    }

    #[test]
    fn test_bracketed_title_round_trips() {
        let original = entry(8329, MediaType::Movie, "[REC]", Some(2007));
        let line = format_entry(&original, true);
        assert_eq!(line, "[REC] (2007) [movie:8329]");

        let Some(ListLine::Resolved(record)) = parse_line(&line, "list") else {
            panic!("expected resolved line");
        };
        assert_eq!(record.raw_entry.title, "[REC]");
        assert_eq!(record.raw_entry.year_hint, Some(2007));
        assert_eq!(record.canonical(), Some(original.entity));
    }

    #[test]
    fn test_tags_only_count_at_end_of_line() {
        assert_eq!(
            parse_line("[Error] Files [Error]", "list"),
            Some(ListLine::Error(RawEntry::new("[Error] Files", "list")))
        );
        assert_eq!(
            parse_line("[REC] 2 [Error]", "list"),
            Some(ListLine::Error(RawEntry::new("[REC] 2", "list")))
        );
        assert_eq!(
            parse_line("Room [1] Redux", "list"),
            Some(ListLine::Plain(RawEntry::new("Room [1] Redux", "list")))
        );
    }

    #[test]
    fn test_write_and_read_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("list.txt");

        let mut report = ErrorReport::new();
        report.push(
            ErrorReason::Ambiguous,
            ErrorEntry {
                raw: RawEntry::new("The Office", "a"),
                candidates: Vec::new(),
                detail: None,
            },
        );
        let reconciliation = Reconciliation {
            final_list: vec![
                entry(1396, MediaType::Show, "Breaking Bad", Some(2008)),
                entry(27205, MediaType::Movie, "Inception", Some(2010)),
            ],
            error_report: report,
            duplicates_dropped: 0,
        };
        write_list(&path, &reconciliation, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Breaking Bad (2008) [1396]\nInception (2010) [movie:27205]\nThe Office [Error]\n"
        );

        let parsed = read_list(&path, "list").unwrap();
        assert_eq!(parsed.resolved.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.plain.is_empty());
        assert_eq!(parsed.unresolved()[0].title, "The Office");
    }

    #[test]
    fn test_read_missing_list_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let parsed = read_list(&dir.path().join("absent.txt"), "list").unwrap();
        assert!(parsed.is_empty());
    }
}
