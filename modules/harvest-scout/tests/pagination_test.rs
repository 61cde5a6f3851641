//! Pagination termination: page limits, revisits, early exit on
//! newest-first listings, next-link walks and cancellation.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use harvest_common::{
    EventKind, HarvestConfig, Review, RunReport, Source, SourceStatus, TerminationReason,
};
use harvest_fetch::{FetchFailureKind, FetchMode};
use harvest_scout::testing::{listing_page, search_page, test_config, MockFetcher, ReviewFixture};
use harvest_scout::PipelineOrchestrator;

const G2_SEARCH: &str = "https://www.g2.com/search?query=Acme";
const CAPTERRA_SEARCH: &str = "https://www.capterra.com/search?search=Acme";
const CAPTERRA_LISTING: &str = "https://www.capterra.com/p/123/Acme/reviews/?sort=most_recent";
const TR_SEARCH: &str = "https://www.trustradius.com/search?query=Acme";
const TR_LISTING: &str = "https://www.trustradius.com/products/acme/reviews/all";

fn g2_page(n: u32) -> String {
    format!("https://www.g2.com/products/acme/reviews?order=most_recent&page={n}")
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

async fn run_with(
    fetcher: MockFetcher,
    config: HarvestConfig,
    cancelled: bool,
) -> (Vec<Review>, RunReport, Arc<MockFetcher>) {
    let fetcher = Arc::new(fetcher);
    let orchestrator =
        PipelineOrchestrator::new(config, fetcher.clone(), Arc::new(AtomicBool::new(cancelled)));
    let (reviews, report) = orchestrator.run().await;
    (reviews, report, fetcher)
}

fn g2_listing(pages: u32) -> MockFetcher {
    let mut fetcher =
        MockFetcher::new().on_page(G2_SEARCH, search_page(&[("/products/acme/reviews", "Acme")]));
    for n in 1..=pages {
        let card = ReviewFixture::new(&format!("p{n}"), &format!("2024-01-{:02}", 30 - n * 5)).g2_card();
        let next = format!("?order=most_recent&page={}", n + 1);
        fetcher = fetcher.on_page(&g2_page(n), listing_page(&[card], Some(&next)));
    }
    fetcher
}

#[tokio::test]
async fn page_limit_bounds_the_walk() {
    let mut config = test_config(&[Source::G2]);
    config.pagination.max_pages = 3;

    let (reviews, report, fetcher) = run_with(g2_listing(5), config, false).await;

    assert_eq!(reviews.len(), 3);
    assert!(fetcher.calls_for(&g2_page(4)).is_empty());

    let g2 = &report.sources[&Source::G2];
    assert_eq!(g2.pages_fetched, 3);
    assert_eq!(g2.termination, Some(TerminationReason::PageLimit));
    assert!(matches!(g2.status, SourceStatus::Partial { .. }));
    assert!(g2.events.iter().any(|e| matches!(
        e.kind,
        EventKind::EarlyTermination {
            reason: TerminationReason::PageLimit,
            ..
        }
    )));
}

#[tokio::test]
async fn newest_first_listing_stops_past_the_window() {
    let fixtures = [
        ReviewFixture::new("a", "2024-01-20"),
        ReviewFixture::new("b", "2024-01-10"),
        ReviewFixture::new("c", "2023-12-20"),
    ];
    let cards: Vec<String> = fixtures.iter().map(ReviewFixture::g2_card).collect();
    let fetcher = MockFetcher::new()
        .on_page(G2_SEARCH, search_page(&[("/products/acme/reviews", "Acme")]))
        .on_page(&g2_page(1), listing_page(&cards, Some("?order=most_recent&page=2")));

    let (reviews, report, fetcher) = run_with(fetcher, test_config(&[Source::G2]), false).await;

    assert_eq!(reviews.len(), 2);
    assert!(fetcher.calls_for(&g2_page(2)).is_empty());

    let g2 = &report.sources[&Source::G2];
    assert_eq!(g2.status, SourceStatus::Complete);
    assert_eq!(g2.termination, Some(TerminationReason::OlderThanWindow));
    assert!(g2.events.iter().any(|e| e.kind
        == EventKind::EarlyTermination {
            page: 1,
            reason: TerminationReason::OlderThanWindow,
            oldest_on_page: Some(date("2023-12-20")),
        }));
}

#[tokio::test]
async fn unknown_order_never_exits_early() {
    let second = "https://www.trustradius.com/products/acme/reviews/all?p=2";
    let page_one = [
        ReviewFixture::new("t1", "2024-01-10").trustradius_card(),
        ReviewFixture::new("t2", "2023-11-01").trustradius_card(),
    ];
    let fetcher = MockFetcher::new()
        .on_page(TR_SEARCH, search_page(&[("/products/acme/reviews", "Acme")]))
        .on_page(TR_LISTING, listing_page(&page_one, Some("/products/acme/reviews/all?p=2")))
        .on_page(
            second,
            listing_page(&[ReviewFixture::new("t3", "2024-01-25").trustradius_card()], None),
        );

    let (reviews, report, fetcher) = run_with(fetcher, test_config(&[Source::TrustRadius]), false).await;

    assert_eq!(fetcher.calls_for(second).len(), 1);
    let dates: Vec<_> = reviews.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date("2024-01-25"), date("2024-01-10")]);

    let tr = &report.sources[&Source::TrustRadius];
    assert_eq!(tr.pages_fetched, 2);
    assert_eq!(tr.skipped_out_of_range, 1);
    assert_eq!(tr.termination, Some(TerminationReason::NoNextPage));
}

#[tokio::test]
async fn self_linking_next_stops_as_revisit() {
    let fetcher = MockFetcher::new()
        .on_page(TR_SEARCH, search_page(&[("/products/acme/reviews", "Acme")]))
        .on_page(
            TR_LISTING,
            listing_page(
                &[ReviewFixture::new("t1", "2024-01-10").trustradius_card()],
                Some(TR_LISTING),
            ),
        );

    let (reviews, report, fetcher) = run_with(fetcher, test_config(&[Source::TrustRadius]), false).await;

    assert_eq!(reviews.len(), 1);
    assert_eq!(fetcher.calls_for(TR_LISTING).len(), 1);
    let tr = &report.sources[&Source::TrustRadius];
    assert_eq!(tr.termination, Some(TerminationReason::RevisitedUrl));
    assert_eq!(tr.status, SourceStatus::Complete);
}

#[tokio::test]
async fn next_link_walk_ends_on_an_empty_page() {
    let second = "https://www.capterra.com/p/123/Acme/reviews/?sort=most_recent&page=2";
    let fetcher = MockFetcher::new()
        .on_page(CAPTERRA_SEARCH, search_page(&[("/p/123/Acme/", "Acme")]))
        .on_page(
            CAPTERRA_LISTING,
            listing_page(
                &[ReviewFixture::new("c1", "2024-01-18").capterra_card()],
                Some("/p/123/Acme/reviews/?sort=most_recent&page=2"),
            ),
        )
        .on_page(second, "<html><body><p>No more reviews.</p></body></html>");

    let (reviews, report, _) = run_with(fetcher, test_config(&[Source::Capterra]), false).await;

    assert_eq!(reviews.len(), 1);
    let capterra = &report.sources[&Source::Capterra];
    assert_eq!(capterra.pages_fetched, 2);
    assert_eq!(capterra.termination, Some(TerminationReason::EndOfResults));
    assert_eq!(capterra.status, SourceStatus::Complete);
}

#[tokio::test]
async fn adapter_budget_keeps_records_gathered_before_the_deadline() {
    let mut config = test_config(&[Source::G2]);
    config.pagination.adapter_budget = Duration::from_millis(200);
    let fetcher = g2_listing(3).on_delay(&g2_page(2), Duration::from_secs(30));

    let started = Instant::now();
    let (reviews, report, fetcher) = run_with(fetcher, config, false).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(fetcher.calls_for(&g2_page(2)), vec![FetchMode::Static]);
    assert!(fetcher.calls_for(&g2_page(3)).is_empty());

    let dates: Vec<_> = reviews.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![date("2024-01-25")]);

    let g2 = &report.sources[&Source::G2];
    assert_eq!(g2.pages_fetched, 1);
    assert_eq!(g2.termination, Some(TerminationReason::BudgetExhausted));
    assert!(matches!(g2.status, SourceStatus::Partial { .. }));
    assert!(!g2.warnings.is_empty());
    assert!(g2.events.iter().any(|e| matches!(
        e.kind,
        EventKind::EarlyTermination {
            reason: TerminationReason::BudgetExhausted,
            ..
        }
    )));
}

#[tokio::test]
async fn blocked_second_page_keeps_the_first() {
    let fetcher = g2_listing(1)
        .on_failure(&g2_page(2), FetchMode::Static, FetchFailureKind::Blocked)
        .on_failure(&g2_page(2), FetchMode::Rendered, FetchFailureKind::Blocked);

    let (reviews, report, _) = run_with(fetcher, test_config(&[Source::G2]), false).await;

    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].date, date("2024-01-25"));

    let g2 = &report.sources[&Source::G2];
    assert_eq!(g2.pages_fetched, 1);
    assert_eq!(g2.termination, Some(TerminationReason::FetchFailure));
    assert!(matches!(g2.status, SourceStatus::Partial { .. }));
    assert!(g2.warnings.iter().any(|w| w.contains("stopped after page 1")));
    assert!(report.any_source_produced_data());
    assert!(report.flagged_sources().contains(&Source::G2));
}

#[tokio::test]
async fn cancelled_run_issues_no_fetches() {
    let (reviews, report, fetcher) = run_with(g2_listing(2), test_config(&Source::ALL), true).await;

    assert!(reviews.is_empty());
    assert!(fetcher.calls().is_empty());
    assert!(report.cancelled);
    assert!(report
        .sources
        .values()
        .all(|s| s.status == SourceStatus::Cancelled));
}
