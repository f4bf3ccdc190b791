use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use thiserror::Error;
use xferstats::conversions::timestamp::parse_timestamp;

/// Ingests HTCondor transfer logs into daily statistics indices.
///
/// Either give a range, e.g. `xferstats-ingest "2020-01-02 00:00" "2020-01-03 00:00" -p 30`,
/// or ingest the last hour with `-1`.
#[derive(Parser, Debug)]
#[command(name = "xferstats-ingest", version)]
pub struct Args {
    /// Start of the range, inclusive.
    #[arg(requires = "to_date")]
    pub from_date: Option<String>,

    /// End of the range, exclusive.
    pub to_date: Option<String>,

    /// Ingest the last hour in 5 minute windows.
    #[arg(short = '1', long = "one-hour", conflicts_with_all = ["from_date", "to_date"])]
    pub one_hour: bool,

    /// Width of each window in minutes.
    #[arg(short = 'p', long = "period", default_value_t = 60)]
    pub period: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsError {
    #[error("give either a FROM and TO date or --one-hour")]
    MissingRange,

    #[error("could not parse `{0}` as a date")]
    UnparseableDate(String),

    #[error("the period must be a positive number of minutes, got {0}")]
    NonPositivePeriod(i64),
}

/// What a run should ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRequest {
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        width: Duration,
    },
    LastHour,
}

impl Args {
    pub fn resolve(&self) -> Result<RunRequest, ArgsError> {
        if self.one_hour {
            return Ok(RunRequest::LastHour);
        }

        let (Some(from), Some(to)) = (&self.from_date, &self.to_date) else {
            return Err(ArgsError::MissingRange);
        };

        if self.period <= 0 {
            return Err(ArgsError::NonPositivePeriod(self.period));
        }

        Ok(RunRequest::Range {
            from: parse_date(from)?,
            to: parse_date(to)?,
            width: Duration::minutes(self.period),
        })
    }
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, ArgsError> {
    parse_timestamp(raw.trim()).ok_or_else(|| ArgsError::UnparseableDate(raw.to_string()))
}
