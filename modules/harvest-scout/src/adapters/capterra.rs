// Capterra: next-link pagination, most-recent-first, 1-5 ratings. Company
// lookup tries both search endpoints, then guessed product slugs.

use url::Url;

use harvest_common::{slugify, Source};

use super::extract::FieldSelectors;
use super::{DateOrder, Pagination, PlatformRules};

const BASE: &str = "https://www.capterra.com";

static FIELDS: FieldSelectors = FieldSelectors {
    cards: &[
        "[data-test-id=\"review-card\"]",
        "[data-testid=\"review-card\"]",
        "div.review-card",
    ],
    native_id_attrs: &["data-review-id", "data-id", "id"],
    permalink: &["a.review-permalink", "a[href*=\"/reviews/\"][data-review-link]"],
    title: &["[data-testid=\"review-title\"]", "h3"],
    body: &[
        "[data-testid=\"review-content\"]",
        ".review-comments",
        ".review-body",
    ],
    date: &["[data-testid=\"review-date\"]", "time", ".review-date"],
    rating: &["[data-testid=\"rating\"]", ".overall-rating", "[data-rating]"],
    reviewer_name: &["[data-testid=\"reviewer-name\"]", ".reviewer-name"],
    reviewer_meta: &[
        ("job_title", "[data-testid=\"reviewer-job-title\"]"),
        ("industry", "[data-testid=\"reviewer-industry\"]"),
        ("company_size", "[data-testid=\"reviewer-company-size\"]"),
        ("used_for", "[data-testid=\"reviewer-usage\"]"),
    ],
};

pub struct Capterra;

impl PlatformRules for Capterra {
    fn source(&self) -> Source {
        Source::Capterra
    }

    fn search_urls(&self, company: &str) -> Vec<String> {
        let mut urls: Vec<String> = ["search", "query"]
            .iter()
            .filter_map(|param| {
                Url::parse_with_params(&format!("{BASE}/search"), &[(*param, company)]).ok()
            })
            .map(|u| u.to_string())
            .collect();
        let slug = slugify(company);
        if !slug.is_empty() {
            urls.push(format!("{BASE}/p/{slug}/"));
            urls.push(format!("{BASE}/software/{slug}"));
        }
        urls
    }

    /// `/p/<id>/<name>/...` or `/software/<id>/<name>/...` → product root.
    fn product_url(&self, link: &Url) -> Option<String> {
        if !link.host_str()?.ends_with("capterra.com") {
            return None;
        }
        let segments: Vec<&str> = link.path_segments()?.filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["p", id, name, ..] => Some(format!("{BASE}/p/{id}/{name}/")),
            ["p", slug] => Some(format!("{BASE}/p/{slug}/")),
            ["software", id, name, ..] if id.chars().all(|c| c.is_ascii_digit()) => {
                Some(format!("{BASE}/software/{id}/{name}/"))
            }
            ["software", slug, ..] => Some(format!("{BASE}/software/{slug}/")),
            _ => None,
        }
    }

    fn listing_url(&self, product_url: &str) -> String {
        format!("{}/reviews/?sort=most_recent", product_url.trim_end_matches('/'))
    }

    fn pagination(&self) -> Pagination {
        Pagination::NextLink
    }

    fn date_order(&self) -> DateOrder {
        DateOrder::Descending
    }

    fn fields(&self) -> &'static FieldSelectors {
        &FIELDS
    }

    fn render_containers(&self) -> &'static [&'static str] {
        &["#__next", "[data-testid=\"reviews-container\"]"]
    }

    fn accepts_canonical(&self) -> bool {
        true
    }
}
