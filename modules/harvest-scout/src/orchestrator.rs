// PipelineOrchestrator: runs the selected adapters, normalizes, merges.
//
// Adapters share only the fetcher and the cancel flag. Each one owns its
// cursor and SourceReport (with its own event timeline); the orchestrator
// folds them into the RunReport after every adapter has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use harvest_common::{
    Concurrency, EventKind, HarvestConfig, Review, RunReport, Source, SourceReport, SourceStatus,
    TerminationReason,
};
use harvest_fetch::{PageFetcher, RetryPolicy};

use crate::adapters::{AdapterContext, PageCursor, SourceAdapter};
use crate::dates::{DateRangeFilter, DateVerdict};
use crate::merge::merge;
use crate::normalizer::ReviewNormalizer;

pub struct PipelineOrchestrator {
    config: HarvestConfig,
    ctx: AdapterContext,
}

impl PipelineOrchestrator {
    pub fn new(config: HarvestConfig, fetcher: Arc<dyn PageFetcher>, cancel: Arc<AtomicBool>) -> Self {
        let ctx = AdapterContext {
            fetcher,
            window: config.window,
            render_policy: config.render_policy,
            retry: RetryPolicy::from_settings(&config.fetch),
            max_pages: config.pagination.max_pages.max(1),
            cancel,
        };
        Self { config, ctx }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run every selected source and return the merged, ordered collection
    /// with its report. Per-source failures are recorded, never propagated.
    pub async fn run(&self) -> (Vec<Review>, RunReport) {
        let mut report = RunReport::new(&self.config.company, self.config.window);
        let mut sources = self.config.sources.clone();
        sources.sort();
        sources.dedup();

        info!(
            company = self.config.company.as_str(),
            sources = ?sources,
            concurrency = ?self.config.concurrency,
            "Starting harvest"
        );

        let results: Vec<(Vec<Review>, SourceReport)> = match self.config.concurrency {
            Concurrency::Concurrent => join_all(sources.iter().map(|s| self.run_source(*s))).await,
            Concurrency::Sequential => {
                let mut results = Vec::with_capacity(sources.len());
                for source in &sources {
                    results.push(self.run_source(*source).await);
                }
                results
            }
        };

        let mut batches = Vec::with_capacity(results.len());
        for (reviews, source_report) in results {
            report.add_source(source_report);
            batches.push(reviews);
        }

        let (reviews, merged) = merge(batches);
        report.duplicates_merged = merged.len();
        for dup in merged {
            debug!(source_url = dup.source_url.as_str(), kept = %dup.kept, dropped = %dup.dropped, "Duplicate merged");
            report.log(EventKind::DuplicateMerged {
                source_url: dup.source_url,
                kept: dup.kept,
                dropped: dup.dropped,
            });
        }

        report.cancelled = self.ctx.cancel.load(Ordering::Relaxed);
        report.finish(reviews.len());
        info!(
            total = reviews.len(),
            duplicates = report.duplicates_merged,
            cancelled = report.cancelled,
            "Harvest finished"
        );
        (reviews, report)
    }

    /// Walk one source to termination, then filter and normalize its records.
    pub async fn run_source(&self, source: Source) -> (Vec<Review>, SourceReport) {
        let adapter = SourceAdapter::new(source, self.ctx.clone());
        let mut report = SourceReport::new(source);
        let deadline = Instant::now() + self.config.pagination.adapter_budget;
        let delay = self.config.pagination.page_delay;

        let mut raw = Vec::new();
        let mut cursor = PageCursor::start();
        let termination = loop {
            let step = tokio::time::timeout_at(
                deadline,
                adapter.reviews_for(&self.config.company, cursor, &mut report),
            )
            .await;
            let (records, next) = match step {
                Ok(step) => step,
                Err(_) => {
                    warn!(source = %source, "Adapter budget exhausted");
                    report.log(EventKind::EarlyTermination {
                        page: report.pages_fetched,
                        reason: TerminationReason::BudgetExhausted,
                        oldest_on_page: None,
                    });
                    break TerminationReason::BudgetExhausted;
                }
            };
            raw.extend(records);
            if let Some(reason) = next.termination() {
                break reason;
            }
            cursor = next;

            if !delay.is_zero() && !self.ctx.cancel.load(Ordering::Relaxed) {
                let _ = tokio::time::timeout_at(deadline, tokio::time::sleep(delay)).await;
            }
        };

        report.termination = Some(termination);
        if report.status == SourceStatus::Complete {
            report.status = match termination {
                TerminationReason::Cancelled => SourceStatus::Cancelled,
                reason if reason.is_partial() => {
                    let message = format!("{reason:?} after {} pages", report.pages_fetched);
                    report.warn(message.clone());
                    SourceStatus::Partial { reason: message }
                }
                _ => SourceStatus::Complete,
            };
        }

        let reviews = self.normalize(source, raw, &mut report);
        info!(
            source = %source,
            pages = report.pages_fetched,
            extracted = report.records_extracted,
            accepted = reviews.len(),
            termination = ?termination,
            "Source finished"
        );
        (reviews, report)
    }

    fn normalize(
        &self,
        source: Source,
        raw: Vec<harvest_common::RawReview>,
        report: &mut SourceReport,
    ) -> Vec<Review> {
        let filter = DateRangeFilter::new(self.config.window);
        let mut reviews = Vec::new();

        for record in raw {
            match filter.check(record.date_text.as_deref()) {
                DateVerdict::Unparseable => report.skipped_unparseable_date += 1,
                DateVerdict::OutOfRange(_) => report.skipped_out_of_range += 1,
                DateVerdict::Accepted(_) => match ReviewNormalizer::normalize(&record, source) {
                    Ok(review) => reviews.push(review),
                    Err(e) => {
                        debug!(source = %source, page = record.page_url.as_str(), error = %e, "Record dropped");
                        report.normalization_errors += 1;
                        report.warn(format!("{}: {e}", record.page_url));
                    }
                },
            }
        }

        report.records_accepted = reviews.len();
        reviews
    }
}
