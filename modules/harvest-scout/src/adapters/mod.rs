// Source adapters: one per review platform.
//
// Platform-specific knowledge (URLs, selectors, pagination style, listing
// order) lives behind PlatformRules. SourceAdapter drives any of them through
// the same resolve → fetch → extract → paginate loop.

pub mod capterra;
pub mod cursor;
pub mod extract;
pub mod g2;
pub mod trustradius;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use harvest_common::{
    DateWindow, EventKind, RawReview, RenderPolicy, Source, SourceReport, SourceStatus,
    TerminationReason,
};
use harvest_fetch::{
    decide, fetch_with_retry, initial_mode, Escalation, FetchFailure, FetchMode, FetchedPage,
    PageFetcher, PageSignature, RetryPolicy, StaticOutcome,
};

use crate::dates::parse_review_date;
use crate::resolve::match_company;

pub use cursor::{CursorPosition, PageCursor};
use extract::{Candidate, FieldSelectors};

// ---------------------------------------------------------------------------
// Platform rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// Listing pages addressed by `page=N`.
    PageNumber,
    /// Follow the page's next link.
    NextLink,
}

/// Listing order by review date, as far as the platform guarantees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    Descending,
    Unknown,
}

pub trait PlatformRules: Send + Sync {
    fn source(&self) -> Source;

    /// Pages to look for the company on, tried in order.
    fn search_urls(&self, company: &str) -> Vec<String>;

    /// Map a link to the product's root URL, or `None` if it isn't a product link.
    fn product_url(&self, link: &Url) -> Option<String>;

    fn listing_url(&self, product_url: &str) -> String;

    fn pagination(&self) -> Pagination;

    fn date_order(&self) -> DateOrder;

    fn fields(&self) -> &'static FieldSelectors;

    /// Review containers that are empty in a client-rendered shell.
    fn render_containers(&self) -> &'static [&'static str];

    /// Whether a page's canonical link can identify the product (slug-guess pages).
    fn accepts_canonical(&self) -> bool {
        false
    }

    fn candidates(&self, doc: &Html, page_url: &str) -> Vec<Candidate> {
        let mut candidates = extract::product_candidates(doc, page_url, |u| self.product_url(u));
        if self.accepts_canonical() {
            let canonical = extract::canonical_link(doc, page_url)
                .and_then(|c| Url::parse(&c).ok())
                .and_then(|u| self.product_url(&u));
            if let (Some(url), Some(name)) = (canonical, extract::page_product_name(doc)) {
                if !candidates.iter().any(|c| c.url == url) {
                    candidates.push(Candidate { name, url });
                }
            }
        }
        candidates
    }

    fn extract(&self, doc: &Html, page_url: &str) -> Vec<RawReview> {
        extract::extract_reviews(doc, page_url, self.fields())
    }

    fn needs_rendering(&self, doc: &Html) -> bool {
        extract::needs_rendering(doc, self.render_containers())
    }

    fn first_position(&self, listing: &str) -> CursorPosition {
        match self.pagination() {
            Pagination::PageNumber => CursorPosition::Page {
                listing: listing.to_string(),
                page: 1,
            },
            Pagination::NextLink => CursorPosition::Next {
                listing: listing.to_string(),
                url: listing.to_string(),
            },
        }
    }

    /// Position after `current`, or `None` when the page has no next affordance.
    fn next_position(
        &self,
        doc: &Html,
        page_url: &str,
        current: &CursorPosition,
    ) -> Option<CursorPosition> {
        let link = extract::next_page_link(doc, page_url)?;
        match current {
            CursorPosition::Page { listing, page } if self.pagination() == Pagination::PageNumber => {
                Some(CursorPosition::Page {
                    listing: listing.clone(),
                    page: page + 1,
                })
            }
            _ => Some(CursorPosition::Next {
                listing: current.listing().unwrap_or(page_url).to_string(),
                url: link,
            }),
        }
    }
}

/// One of the three platforms, each behind the same rules interface.
pub enum Platform {
    G2(g2::G2),
    Capterra(capterra::Capterra),
    TrustRadius(trustradius::TrustRadius),
}

impl Platform {
    pub fn for_source(source: Source) -> Self {
        match source {
            Source::G2 => Platform::G2(g2::G2),
            Source::Capterra => Platform::Capterra(capterra::Capterra),
            Source::TrustRadius => Platform::TrustRadius(trustradius::TrustRadius),
        }
    }

    pub fn rules(&self) -> &dyn PlatformRules {
        match self {
            Platform::G2(p) => p as &dyn PlatformRules,
            Platform::Capterra(p) => p as &dyn PlatformRules,
            Platform::TrustRadius(p) => p as &dyn PlatformRules,
        }
    }
}

// ---------------------------------------------------------------------------
// SourceAdapter
// ---------------------------------------------------------------------------

/// Everything an adapter needs from the run, shared by all adapters.
#[derive(Clone)]
pub struct AdapterContext {
    pub fetcher: Arc<dyn PageFetcher>,
    pub window: DateWindow,
    pub render_policy: RenderPolicy,
    pub retry: RetryPolicy,
    pub max_pages: u32,
    pub cancel: Arc<AtomicBool>,
}

impl AdapterContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// One listing page after extraction.
struct PageAnalysis {
    records: Vec<RawReview>,
    next: Option<CursorPosition>,
}

enum ResolveError {
    NotFound { candidates: usize },
    Failed(FetchFailure),
    Cancelled,
}

pub struct SourceAdapter {
    platform: Platform,
    ctx: AdapterContext,
}

impl SourceAdapter {
    pub fn new(source: Source, ctx: AdapterContext) -> Self {
        Self {
            platform: Platform::for_source(source),
            ctx,
        }
    }

    pub fn source(&self) -> Source {
        self.rules().source()
    }

    fn rules(&self) -> &dyn PlatformRules {
        self.platform.rules()
    }

    /// Walk one listing page. Resolves the company on the first call, then
    /// returns the page's raw records and the advanced (or terminated) cursor.
    pub async fn reviews_for(
        &self,
        company: &str,
        mut cursor: PageCursor,
        report: &mut SourceReport,
    ) -> (Vec<RawReview>, PageCursor) {
        if cursor.is_terminated() {
            return (Vec::new(), cursor);
        }
        if self.ctx.cancelled() {
            cursor.terminate(TerminationReason::Cancelled);
            return (Vec::new(), cursor);
        }

        if *cursor.position() == CursorPosition::Start {
            match self.resolve(company, report).await {
                Ok(listing) => cursor.advance_to(self.rules().first_position(&listing)),
                Err(ResolveError::NotFound { candidates }) => {
                    warn!(source = %self.source(), company, candidates, "Company not found");
                    report.status = SourceStatus::CompanyNotFound;
                    cursor.terminate(TerminationReason::CompanyNotFound);
                    return (Vec::new(), cursor);
                }
                Err(ResolveError::Failed(failure)) => {
                    warn!(source = %self.source(), error = %failure, "Company lookup failed");
                    report.status = SourceStatus::Failed {
                        reason: failure.to_string(),
                    };
                    cursor.terminate(TerminationReason::FetchFailure);
                    return (Vec::new(), cursor);
                }
                Err(ResolveError::Cancelled) => {
                    cursor.terminate(TerminationReason::Cancelled);
                    return (Vec::new(), cursor);
                }
            }
        }

        let Some(url) = cursor.position().url() else {
            cursor.terminate(TerminationReason::EndOfResults);
            return (Vec::new(), cursor);
        };
        if cursor.has_visited(&url) {
            cursor.terminate(TerminationReason::RevisitedUrl);
            return (Vec::new(), cursor);
        }
        if cursor.pages_walked() >= self.ctx.max_pages {
            cursor.terminate(TerminationReason::PageLimit);
            return (Vec::new(), cursor);
        }

        let page_number = cursor.pages_walked() + 1;
        let position = cursor.position().clone();
        let rules = self.rules();
        let fetched = self
            .fetch_with_escalation(&url, report, |page| {
                let doc = Html::parse_document(&page.body);
                let listing = position.listing().unwrap_or(page.final_url.as_str()).to_string();
                let mut records = rules.extract(&doc, &page.final_url);
                for record in &mut records {
                    record.listing_url = Some(listing.clone());
                }
                let signature = PageSignature {
                    records: records.len(),
                    needs_rendering: rules.needs_rendering(&doc),
                };
                let next = rules.next_position(&doc, &page.final_url, &position);
                (PageAnalysis { records, next }, signature)
            })
            .await;

        let (page, analysis) = match fetched {
            Ok(ok) => ok,
            Err(failure) => {
                warn!(
                    source = %self.source(),
                    url = url.as_str(),
                    kind = %failure.kind,
                    "Listing page failed, stopping source"
                );
                if cursor.pages_walked() == 0 {
                    report.status = SourceStatus::Failed {
                        reason: failure.to_string(),
                    };
                } else {
                    report.warn(format!("stopped after page {}: {failure}", cursor.pages_walked()));
                }
                cursor.terminate(TerminationReason::FetchFailure);
                return (Vec::new(), cursor);
            }
        };

        cursor.mark_visited(&url, &page.final_url);
        report.pages_fetched += 1;
        report.records_extracted += analysis.records.len();
        report.log(EventKind::PageFetched {
            url: url.clone(),
            page: page_number,
            rendered: page.is_rendered(),
            records: analysis.records.len(),
        });
        info!(
            source = %self.source(),
            url = url.as_str(),
            page = page_number,
            rendered = page.is_rendered(),
            records = analysis.records.len(),
            "Listing page extracted"
        );

        let records = analysis.records;
        if records.is_empty() {
            cursor.terminate(TerminationReason::EndOfResults);
            return (records, cursor);
        }

        if let Some(oldest) = self.confirmed_older_than_window(&records) {
            info!(source = %self.source(), page = page_number, %oldest, "Listing passed the window start");
            report.log(EventKind::EarlyTermination {
                page: page_number,
                reason: TerminationReason::OlderThanWindow,
                oldest_on_page: Some(oldest),
            });
            cursor.terminate(TerminationReason::OlderThanWindow);
            return (records, cursor);
        }

        match analysis.next {
            None => cursor.terminate(TerminationReason::NoNextPage),
            Some(next) => {
                let revisit = next.url().is_some_and(|u| cursor.has_visited(&u));
                if revisit {
                    cursor.terminate(TerminationReason::RevisitedUrl);
                } else if cursor.pages_walked() >= self.ctx.max_pages {
                    report.log(EventKind::EarlyTermination {
                        page: page_number,
                        reason: TerminationReason::PageLimit,
                        oldest_on_page: None,
                    });
                    cursor.terminate(TerminationReason::PageLimit);
                } else {
                    cursor.advance_to(next);
                }
            }
        }

        (records, cursor)
    }

    /// Oldest date on the page when this platform lists newest-first, the
    /// page's own dates confirm that order, and it precedes the window.
    fn confirmed_older_than_window(&self, records: &[RawReview]) -> Option<chrono::NaiveDate> {
        if self.rules().date_order() != DateOrder::Descending {
            return None;
        }
        let dates: Vec<_> = records
            .iter()
            .filter_map(|r| r.date_text.as_deref().and_then(parse_review_date))
            .collect();
        let descending = dates.windows(2).all(|w| w[0] >= w[1]);
        let oldest = *dates.last()?;
        (descending && oldest < self.ctx.window.start).then_some(oldest)
    }

    async fn resolve(&self, company: &str, report: &mut SourceReport) -> Result<String, ResolveError> {
        let rules = self.rules();
        let mut seen_candidates = 0;
        let mut any_fetched = false;
        let mut last_failure = None;

        for search_url in rules.search_urls(company) {
            if self.ctx.cancelled() {
                return Err(ResolveError::Cancelled);
            }
            let fetched = self
                .fetch_with_escalation(&search_url, report, |page| {
                    let doc = Html::parse_document(&page.body);
                    let candidates = rules.candidates(&doc, &page.final_url);
                    let signature = PageSignature {
                        records: candidates.len(),
                        needs_rendering: rules.needs_rendering(&doc),
                    };
                    (candidates, signature)
                })
                .await;

            let candidates = match fetched {
                Ok((_, candidates)) => candidates,
                Err(failure) => {
                    debug!(url = search_url.as_str(), error = %failure, "Search page failed");
                    last_failure = Some(failure);
                    continue;
                }
            };
            any_fetched = true;
            seen_candidates += candidates.len();

            if let Some(found) = match_company(company, &candidates) {
                let listing = rules.listing_url(&found.candidate.url);
                info!(
                    source = %self.source(),
                    company,
                    matched = found.candidate.name.as_str(),
                    exact = found.exact,
                    listing = listing.as_str(),
                    "Company resolved"
                );
                report.product_url = Some(found.candidate.url.clone());
                report.log(EventKind::CompanyResolved {
                    query: company.to_string(),
                    product_url: found.candidate.url.clone(),
                    matched_name: found.candidate.name.clone(),
                    exact: found.exact,
                });
                return Ok(listing);
            }
        }

        match last_failure {
            Some(failure) if !any_fetched => Err(ResolveError::Failed(failure)),
            _ => {
                report.log(EventKind::CompanyNotFound {
                    query: company.to_string(),
                    candidates: seen_candidates,
                });
                Err(ResolveError::NotFound {
                    candidates: seen_candidates,
                })
            }
        }
    }

    /// Fetch `url` in the policy's initial mode, analyze it, and re-fetch it
    /// rendered at most once when the escalation policy asks for it.
    async fn fetch_with_escalation<T>(
        &self,
        url: &str,
        report: &mut SourceReport,
        analyze: impl Fn(&FetchedPage) -> (T, PageSignature),
    ) -> Result<(FetchedPage, T), FetchFailure> {
        let fetcher = self.ctx.fetcher.as_ref();
        let policy = self.ctx.render_policy;
        let mut mode = initial_mode(policy);
        if mode == FetchMode::Rendered && !fetcher.can_render() {
            mode = FetchMode::Static;
        }

        let (result, attempts) =
            fetch_with_retry(fetcher, url, mode, &self.ctx.retry, &self.ctx.cancel).await;
        debug!(url, attempts, ?mode, ok = result.is_ok(), "Fetch finished");

        let (fallback, reason) = match result {
            Ok(page) => {
                let (value, signature) = analyze(&page);
                match decide(policy, page.is_rendered(), StaticOutcome::Extracted(signature)) {
                    Escalation::Keep => return Ok((page, value)),
                    Escalation::Render { reason } => (Ok((page, value)), reason),
                }
            }
            Err(failure) => {
                let rendered = mode == FetchMode::Rendered;
                match decide(policy, rendered, StaticOutcome::Failed(failure.kind)) {
                    Escalation::Keep => return Err(failure),
                    Escalation::Render { reason } => {
                        report.log(page_failed(&failure));
                        (Err(failure), reason)
                    }
                }
            }
        };

        if !fetcher.can_render() {
            warn!(url, reason = reason.as_str(), "Page needs rendering but no renderer is available");
            report.warn(format!("{url}: {reason}, rendering unavailable"));
            return fallback;
        }
        if self.ctx.cancelled() {
            return fallback;
        }

        report.escalations += 1;
        report.log(EventKind::EscalatedToRendered {
            url: url.to_string(),
            reason: reason.clone(),
        });
        info!(url, reason = reason.as_str(), "Escalating to rendered fetch");

        let (rendered, _) =
            fetch_with_retry(fetcher, url, FetchMode::Rendered, &self.ctx.retry, &self.ctx.cancel).await;
        match rendered {
            Ok(page) => {
                let (value, _) = analyze(&page);
                Ok((page, value))
            }
            Err(failure) => {
                report.log(page_failed(&failure));
                Err(failure)
            }
        }
    }
}

fn page_failed(failure: &FetchFailure) -> EventKind {
    EventKind::PageFailed {
        url: failure.url.clone(),
        kind: failure.kind.to_string(),
        message: failure.message.clone(),
    }
}
