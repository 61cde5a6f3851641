//! Run report: counts, per-source status and an ordered timeline of notable
//! events for one pipeline execution.
//!
//! Each adapter fills its own [`SourceReport`]; the orchestrator is the single
//! writer that folds them into the [`RunReport`] after all adapters finish.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::types::{DateWindow, Source};

// ---------------------------------------------------------------------------
// Per-source report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Pagination ran to a natural end.
    Complete,
    /// Stopped early; whatever was collected is kept.
    Partial { reason: String },
    CompanyNotFound,
    /// Could not fetch a single listing page.
    Failed { reason: String },
    Cancelled,
}

/// Why an adapter stopped paginating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    CompanyNotFound,
    EndOfResults,
    NoNextPage,
    RevisitedUrl,
    PageLimit,
    OlderThanWindow,
    BudgetExhausted,
    Cancelled,
    FetchFailure,
}

impl TerminationReason {
    /// Whether stopping for this reason means results may be incomplete.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            TerminationReason::PageLimit
                | TerminationReason::BudgetExhausted
                | TerminationReason::FetchFailure
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub status: SourceStatus,
    pub product_url: Option<String>,
    pub pages_fetched: u32,
    pub records_extracted: usize,
    pub records_accepted: usize,
    pub skipped_unparseable_date: usize,
    pub skipped_out_of_range: usize,
    pub normalization_errors: usize,
    pub escalations: u32,
    pub termination: Option<TerminationReason>,
    pub warnings: Vec<String>,
    pub events: Vec<RunEvent>,
}

impl SourceReport {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            status: SourceStatus::Complete,
            product_url: None,
            pages_fetched: 0,
            records_extracted: 0,
            records_accepted: 0,
            skipped_unparseable_date: 0,
            skipped_out_of_range: 0,
            normalization_errors: 0,
            escalations: 0,
            termination: None,
            warnings: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        let seq = self.events.len() as u32;
        self.events.push(RunEvent {
            seq,
            ts: Utc::now(),
            kind,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// A source produced data once it fetched at least one listing page.
    pub fn produced_data(&self) -> bool {
        self.pages_fetched > 0
            && !matches!(
                self.status,
                SourceStatus::CompanyNotFound | SourceStatus::Failed { .. }
            )
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunEvent {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    CompanyResolved {
        query: String,
        product_url: String,
        matched_name: String,
        exact: bool,
    },
    CompanyNotFound {
        query: String,
        candidates: usize,
    },
    PageFetched {
        url: String,
        page: u32,
        rendered: bool,
        records: usize,
    },
    EscalatedToRendered {
        url: String,
        reason: String,
    },
    PageFailed {
        url: String,
        kind: String,
        message: String,
    },
    EarlyTermination {
        page: u32,
        reason: TerminationReason,
        oldest_on_page: Option<NaiveDate>,
    },
    DuplicateMerged {
        source_url: String,
        kept: Source,
        dropped: Source,
    },
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub company: String,
    pub window: DateWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: BTreeMap<Source, SourceReport>,
    pub total_records: usize,
    pub duplicates_merged: usize,
    pub cancelled: bool,
    pub events: Vec<RunEvent>,
}

impl RunReport {
    pub fn new(company: &str, window: DateWindow) -> Self {
        Self {
            company: company.to_string(),
            window,
            started_at: Utc::now(),
            finished_at: None,
            sources: BTreeMap::new(),
            total_records: 0,
            duplicates_merged: 0,
            cancelled: false,
            events: Vec::new(),
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        let seq = self.events.len() as u32;
        self.events.push(RunEvent {
            seq,
            ts: Utc::now(),
            kind,
        });
    }

    pub fn add_source(&mut self, report: SourceReport) {
        self.sources.insert(report.source, report);
    }

    pub fn finish(&mut self, total_records: usize) {
        self.total_records = total_records;
        self.finished_at = Some(Utc::now());
    }

    pub fn any_source_produced_data(&self) -> bool {
        self.sources.values().any(SourceReport::produced_data)
    }

    /// Sources that did not complete cleanly, for the caller to surface.
    pub fn flagged_sources(&self) -> Vec<Source> {
        self.sources
            .values()
            .filter(|r| r.status != SourceStatus::Complete)
            .map(|r| r.source)
            .collect()
    }

    pub fn records_from(&self, source: Source) -> usize {
        self.sources.get(&source).map_or(0, |r| r.records_accepted)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} reviews for {:?} ({} to {}), {} duplicates merged",
            self.total_records, self.company, self.window.start, self.window.end, self.duplicates_merged
        )?;
        for report in self.sources.values() {
            let status = match &report.status {
                SourceStatus::Complete => "complete".to_string(),
                SourceStatus::Partial { reason } => format!("partial: {reason}"),
                SourceStatus::CompanyNotFound => "company not found".to_string(),
                SourceStatus::Failed { reason } => format!("failed: {reason}"),
                SourceStatus::Cancelled => "cancelled".to_string(),
            };
            write!(
                f,
                "\n  {:<12} {:>4} records, {:>3} pages, {} skipped, {} escalations [{status}]",
                report.source.display_name(),
                report.records_accepted,
                report.pages_fetched,
                report.skipped_unparseable_date + report.skipped_out_of_range + report.normalization_errors,
                report.escalations,
            )?;
        }
        Ok(())
    }
}
