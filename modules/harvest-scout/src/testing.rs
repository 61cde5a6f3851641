// Test support for the harvest pipeline.
//
// MockFetcher stands in for the network behind the PageFetcher seam: a
// URL→HTML map per fetch mode plus scripted failures, recording every call.
// ReviewFixture and the page builders produce platform-shaped markup.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use harvest_common::{DateWindow, HarvestConfig, Source};
use harvest_fetch::{FetchFailure, FetchFailureKind, FetchMode, FetchResult, FetchedPage, PageFetcher};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based page fetcher. Unregistered URLs fail with `NotFound`.
/// Builder pattern: `.on_page()`, `.on_rendered()`, `.on_failure()`, `.on_delay()`.
pub struct MockFetcher {
    static_pages: HashMap<String, String>,
    rendered_pages: HashMap<String, String>,
    failures: HashMap<(String, FetchMode), FetchFailureKind>,
    delays: HashMap<String, Duration>,
    can_render: bool,
    calls: Mutex<Vec<(String, FetchMode)>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            static_pages: HashMap::new(),
            rendered_pages: HashMap::new(),
            failures: HashMap::new(),
            delays: HashMap::new(),
            can_render: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Body served to static fetches of `url`.
    pub fn on_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.static_pages.insert(url.to_string(), html.into());
        self
    }

    /// Body served to rendered fetches of `url`.
    pub fn on_rendered(mut self, url: &str, html: impl Into<String>) -> Self {
        self.rendered_pages.insert(url.to_string(), html.into());
        self
    }

    /// Every fetch of `url` in `mode` fails with `kind`.
    pub fn on_failure(mut self, url: &str, mode: FetchMode, kind: FetchFailureKind) -> Self {
        self.failures.insert((url.to_string(), mode), kind);
        self
    }

    /// Every fetch of `url` sleeps for `delay` before answering.
    pub fn on_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn without_renderer(mut self) -> Self {
        self.can_render = false;
        self
    }

    pub fn calls(&self) -> Vec<(String, FetchMode)> {
        self.calls.lock().unwrap().clone()
    }

    /// Modes `url` was fetched in, in call order.
    pub fn calls_for(&self, url: &str) -> Vec<FetchMode> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, mode)| *mode)
            .collect()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode) -> FetchResult {
        self.calls.lock().unwrap().push((url.to_string(), mode));
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        if let Some(kind) = self.failures.get(&(url.to_string(), mode)) {
            return Err(FetchFailure::new(*kind, url, "MockFetcher: scripted failure"));
        }
        if mode == FetchMode::Rendered && !self.can_render {
            return Err(FetchFailure::new(
                FetchFailureKind::RenderUnavailable,
                url,
                "MockFetcher: no renderer",
            ));
        }

        let pages = match mode {
            FetchMode::Static => &self.static_pages,
            FetchMode::Rendered => &self.rendered_pages,
        };
        match pages.get(url) {
            Some(body) => Ok(FetchedPage {
                url: url.to_string(),
                final_url: url.to_string(),
                body: body.clone(),
                kind: mode.into(),
                status: (mode == FetchMode::Static).then_some(200),
            }),
            None => Err(FetchFailure::new(
                FetchFailureKind::NotFound,
                url,
                format!("MockFetcher: no {mode:?} page registered"),
            )),
        }
    }

    fn can_render(&self) -> bool {
        self.can_render
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// One review as it should appear on a listing page.
#[derive(Debug, Clone)]
pub struct ReviewFixture {
    pub id: String,
    pub date: String,
    pub title: String,
    pub body: String,
    pub rating: Option<String>,
    pub reviewer: Option<String>,
    /// Absolute permalink shared across platforms; platform default otherwise.
    pub permalink: Option<String>,
}

impl ReviewFixture {
    pub fn new(id: &str, date: &str) -> Self {
        Self {
            id: id.to_string(),
            date: date.to_string(),
            title: format!("Review {id}"),
            body: format!(
                "Review {id}: the reporting dashboards save our team hours every week and onboarding was painless."
            ),
            rating: None,
            reviewer: None,
            permalink: None,
        }
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn rating(mut self, rating: &str) -> Self {
        self.rating = Some(rating.to_string());
        self
    }

    pub fn reviewer(mut self, name: &str) -> Self {
        self.reviewer = Some(name.to_string());
        self
    }

    pub fn permalink(mut self, url: &str) -> Self {
        self.permalink = Some(url.to_string());
        self
    }

    pub fn card(&self, source: Source) -> String {
        match source {
            Source::G2 => self.g2_card(),
            Source::Capterra => self.capterra_card(),
            Source::TrustRadius => self.trustradius_card(),
        }
    }

    fn link(&self, default_href: String, class: &str) -> String {
        match self.permalink {
            Some(ref url) => format!(r#"<a rel="bookmark" href="{url}">Permalink</a>"#),
            None => format!(r#"<a class="{class}" href="{default_href}">Read review</a>"#),
        }
    }

    pub fn g2_card(&self) -> String {
        let id = &self.id;
        let rating = self
            .rating
            .as_ref()
            .map(|r| format!(r#"<span itemprop="ratingValue" content="{r}">{r}</span>"#))
            .unwrap_or_default();
        let reviewer = self
            .reviewer
            .as_ref()
            .map(|n| format!(r#"<span itemprop="author">{n}</span>"#))
            .unwrap_or_default();
        format!(
            r#"<div itemprop="review" data-review-id="{id}">
  <h3>{title}</h3>
  <time datetime="{date}">{date}</time>
  <div itemprop="reviewBody"><p>{body}</p></div>
  {rating}{reviewer}
  {link}
</div>"#,
            title = self.title,
            date = self.date,
            body = self.body,
            link = self.link(format!("/survey_responses/acme-review-{id}"), "survey-link"),
        )
    }

    pub fn capterra_card(&self) -> String {
        let id = &self.id;
        let rating = self
            .rating
            .as_ref()
            .map(|r| format!(r#"<span data-testid="rating">{r}</span>"#))
            .unwrap_or_default();
        let reviewer = self
            .reviewer
            .as_ref()
            .map(|n| format!(r#"<span data-testid="reviewer-name">{n}</span>"#))
            .unwrap_or_default();
        format!(
            r#"<div data-testid="review-card" data-review-id="{id}">
  <h3 data-testid="review-title">{title}</h3>
  <span data-testid="review-date">{date}</span>
  <p data-testid="review-content">{body}</p>
  {rating}{reviewer}
  {link}
</div>"#,
            title = self.title,
            date = self.date,
            body = self.body,
            link = self.link(format!("/reviews/{id}/"), "review-permalink"),
        )
    }

    pub fn trustradius_card(&self) -> String {
        let id = &self.id;
        let rating = self
            .rating
            .as_ref()
            .map(|r| format!(r#"<span class="trust-score__score">{r}</span>"#))
            .unwrap_or_default();
        let reviewer = self
            .reviewer
            .as_ref()
            .map(|n| format!(r#"<span class="reviewer-name">{n}</span>"#))
            .unwrap_or_default();
        format!(
            r#"<article data-review-id="{id}">
  <h3>{title}</h3>
  <span class="review-date">{date}</span>
  <div class="review-body">{body}</div>
  {rating}{reviewer}
  {link}
</article>"#,
            title = self.title,
            date = self.date,
            body = self.body,
            link = self.link(format!("/reviews/acme-{id}"), "link-to-review"),
        )
    }
}

/// Search results page listing `(href, name)` product links.
pub fn search_page(links: &[(&str, &str)]) -> String {
    let items: String = links
        .iter()
        .map(|(href, name)| format!(r#"<li><a href="{href}">{name}</a></li>"#))
        .collect();
    format!("<html><body><h1>Search results</h1><ul>{items}</ul></body></html>")
}

/// Listing page wrapping `cards`, with an optional next link.
pub fn listing_page(cards: &[String], next: Option<&str>) -> String {
    let next = next
        .map(|href| format!(r#"<a rel="next" href="{href}">Next page</a>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body><div id="reviews" data-reviews-root>{}</div>{next}</body></html>"#,
        cards.join("\n")
    )
}

/// Client-rendered app shell: empty review container and a noscript notice.
pub fn shell_page() -> String {
    r#"<html><body><div id="reviews" data-reviews-root></div><noscript>Please enable JavaScript to read reviews.</noscript></body></html>"#
        .to_string()
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// January 2024.
pub fn test_window() -> DateWindow {
    DateWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    )
    .unwrap()
}

/// Config for "Acme" over [`test_window`] with no delays or backoff.
pub fn test_config(sources: &[Source]) -> HarvestConfig {
    let mut config = HarvestConfig::new("Acme", test_window(), sources.to_vec()).unwrap();
    config.fetch.backoff_base = Duration::ZERO;
    config.fetch.backoff_max = Duration::ZERO;
    config.pagination.page_delay = Duration::ZERO;
    config
}
