use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use xferstats::error::IngestError;

use crate::args::ArgsError;

/// Returns whether terminal output should include backtraces.
fn should_render_backtrace() -> bool {
    matches!(
        std::env::var("RUST_BACKTRACE").as_deref(),
        Ok("1") | Ok("full")
    )
}

pub type IngestServiceResult<T> = Result<T, IngestServiceError>;

/// Backtrace captured when an infrastructure error is created.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the ingester binary.
///
/// Wraps [`IngestError`] for pipeline errors and adds variants for everything that can go
/// wrong before the pipeline starts.
#[derive(Debug)]
pub enum IngestServiceError {
    /// Pipeline error, or the aggregate of all failed windows.
    Ingest(IngestError),
    /// Invalid command line.
    Args(ArgsError, CapturedBacktrace),
    /// Configuration, logging or metrics setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    Io(std::io::Error, CapturedBacktrace),
}

impl IngestServiceError {
    pub fn category(&self) -> &'static str {
        match self {
            IngestServiceError::Ingest(_) => "ingestion error",
            IngestServiceError::Args(_, _) => "invalid arguments",
            IngestServiceError::Config(_, _) => "configuration error",
            IngestServiceError::Io(_, _) => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            IngestServiceError::Ingest(err) => err.backtrace(),
            IngestServiceError::Args(_, cb) => Some(&cb.0),
            IngestServiceError::Config(_, cb) => Some(&cb.0),
            IngestServiceError::Io(_, cb) => Some(&cb.0),
        }
    }

    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        IngestServiceError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns a report for terminal output: the error, its causes and, when
    /// `RUST_BACKTRACE` is set, the backtrace.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("xferstats-ingest failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        if let IngestServiceError::Ingest(err) = self
            && let Some(errors) = err.errors()
        {
            for (idx, err) in errors.iter().enumerate() {
                out.push_str(&format!("window failure {}: {err}\n", idx + 1));
            }
        } else {
            let mut source = Error::source(self);
            let mut idx = 1usize;
            while let Some(err) = source {
                out.push_str(&format!("cause {idx}: {err}\n"));
                source = err.source();
                idx += 1;
            }
        }

        if should_render_backtrace()
            && let Some(backtrace) = self.backtrace()
        {
            out.push_str("backtrace:\n");
            out.push_str(&backtrace.to_string());
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }

        out
    }
}

impl fmt::Display for IngestServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestServiceError::Ingest(err) => write!(f, "{err}"),
            IngestServiceError::Args(source, _) => write!(f, "invalid arguments: {source}"),
            IngestServiceError::Config(source, _) => write!(f, "configuration error: {source}"),
            IngestServiceError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for IngestServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestServiceError::Ingest(err) => err.source(),
            IngestServiceError::Args(source, _) => Some(source),
            IngestServiceError::Config(source, _) => Some(source.as_ref()),
            IngestServiceError::Io(source, _) => Some(source),
        }
    }
}

impl From<IngestError> for IngestServiceError {
    fn from(err: IngestError) -> Self {
        IngestServiceError::Ingest(err)
    }
}

impl From<ArgsError> for IngestServiceError {
    fn from(err: ArgsError) -> Self {
        IngestServiceError::Args(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for IngestServiceError {
    fn from(err: std::io::Error) -> Self {
        IngestServiceError::Io(err, CapturedBacktrace::capture())
    }
}

#[cfg(test)]
mod tests {
    use xferstats::error::ErrorKind;
    use xferstats::ingest_error;

    use super::*;

    #[test]
    fn report_lists_every_failed_window() {
        let err: IngestError = vec![
            ingest_error!(ErrorKind::BulkWriteFailed, "Bulk request was rejected"),
            ingest_error!(ErrorKind::SourceQueryFailed, "Scroll search failed"),
        ]
        .into();

        let report = IngestServiceError::from(err).render_report();

        assert!(report.contains("category: ingestion error"));
        assert!(report.contains("window failure 1: "));
        assert!(report.contains("window failure 2: "));
    }

    #[test]
    fn report_includes_the_cause_chain() {
        let err = IngestServiceError::from(ArgsError::NonPositivePeriod(0));

        let report = err.render_report();

        assert!(report.contains("category: invalid arguments"));
        assert!(report.contains("cause 1: "));
    }
}
