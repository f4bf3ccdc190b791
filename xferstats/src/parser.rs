//! Grammar of transfer log lines.
//!
//! A line looks like `01/02/2020 10:00:00 (peer stats from <10.0.0.1>): Bytes: 1024 dest: 8.8.8.8`
//! or `01/02/2020 10:00:00 File Transfer Upload: Files: 3, Bytes: 4096`. It is split into a
//! timestamp-bearing prefix and a content section; the content optionally sits behind a
//! `(peer stats …):` marker, names the transfer direction and carries `key: value` pairs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::conversions::numeric::coerce_metric_value;
use crate::conversions::timestamp::parse_timestamp;
use crate::types::{ParsedLine, TransferDirection};

/// Prefix made of digits, whitespace, parentheses and date punctuation, then a space and the
/// rest of the line.
static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build_pattern(r"^([\d\s().:/-]+) (.*)$"));

static PEER_STATS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build_pattern(r"^\(peer stats[^)]*\):\s*(.*)$"));

/// Leading run of the prefix that can hold a date and time.
static TIMESTAMP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build_pattern(r"^\d[\d/:.\s-]*"));

static UPLOAD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build_pattern(r"^File Transfer Upload:"));

/// Label of two or more words ending in a colon, e.g. `File Transfer Download: `.
static LABEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build_pattern(r"^[A-Za-z]\w*(?:[ \t]+\w+)+:\s+"));

/// `key: value`, the value ending at whitespace or a comma.
static KEY_VALUE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| build_pattern(r"(\w+):\s+([^\s,]+)"));

fn build_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("log line pattern must compile")
}

/// Reasons a line yields no record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line has no timestamp prefix followed by content")]
    MalformedLine,
    #[error("line prefix does not start with a timestamp")]
    MissingTimestamp,
    #[error("timestamp `{0}` matches no known layout")]
    UnparseableTimestamp(String),
    #[error("line content holds no `key: value` pairs")]
    NoKeyValues,
}

impl ParseError {
    /// Stable label used in reports and as a metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::MalformedLine => "malformed_line",
            ParseError::MissingTimestamp => "missing_timestamp",
            ParseError::UnparseableTimestamp(_) => "unparseable_timestamp",
            ParseError::NoKeyValues => "no_key_values",
        }
    }
}

/// Turns raw log lines into [`ParsedLine`]s.
///
/// Holds no state; the compiled patterns are shared process-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl LineParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, line: &str) -> Result<ParsedLine, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let captures = LINE_PATTERN
            .captures(line)
            .ok_or(ParseError::MalformedLine)?;
        let prefix = captures.get(1).map_or("", |m| m.as_str());
        let mut content = captures.get(2).map_or("", |m| m.as_str());

        let mut peer_stats = false;
        if let Some(inner) = PEER_STATS_PATTERN
            .captures(content)
            .and_then(|captures| captures.get(1))
        {
            content = inner.as_str();
            peer_stats = true;
        }

        let event_time = parse_prefix_timestamp(prefix)?;

        let direction = if UPLOAD_PATTERN.is_match(content) {
            TransferDirection::Upload
        } else {
            TransferDirection::Download
        };

        let body = match LABEL_PATTERN.find(content) {
            Some(label) => &content[label.end()..],
            None => content,
        };

        let mut metrics = BTreeMap::new();
        for captures in KEY_VALUE_PATTERN.captures_iter(body) {
            if let (Some(key), Some(value)) = (captures.get(1), captures.get(2)) {
                metrics.insert(key.as_str().to_string(), coerce_metric_value(value.as_str()));
            }
        }
        if metrics.is_empty() {
            return Err(ParseError::NoKeyValues);
        }

        Ok(ParsedLine {
            event_time,
            direction,
            peer_stats,
            metrics,
        })
    }
}

/// Finds the timestamp at the start of the prefix.
///
/// The prefix may carry trailing numeric tokens after the timestamp, so the longest leading
/// run of whitespace-separated tokens that parses wins.
fn parse_prefix_timestamp(prefix: &str) -> Result<chrono::DateTime<chrono::Utc>, ParseError> {
    let run = TIMESTAMP_PATTERN
        .find(prefix)
        .map(|m| m.as_str().trim())
        .filter(|run| !run.is_empty())
        .ok_or(ParseError::MissingTimestamp)?;

    let tokens = run.split_whitespace().collect::<Vec<_>>();
    for len in (1..=tokens.len()).rev() {
        if let Some(timestamp) = parse_timestamp(&tokens[..len].join(" ")) {
            return Ok(timestamp);
        }
    }

    Err(ParseError::UnparseableTimestamp(run.to_string()))
}
