// G2: numbered pages, most-recent-first, half-star ratings on a 5 scale.

use url::Url;

use harvest_common::Source;

use super::extract::FieldSelectors;
use super::{DateOrder, Pagination, PlatformRules};

const BASE: &str = "https://www.g2.com";

static FIELDS: FieldSelectors = FieldSelectors {
    cards: &[
        "[itemprop=\"review\"]",
        "div[id^=\"survey-response-\"]",
        "div.review-card",
    ],
    native_id_attrs: &["data-review-id", "id"],
    permalink: &["a[href*=\"/survey_responses/\"]"],
    title: &["h3", "[itemprop=\"name\"]"],
    body: &["[itemprop=\"reviewBody\"]", ".formatted-text"],
    date: &[
        "meta[itemprop=\"datePublished\"]",
        "time",
        ".x-current-review-date",
    ],
    rating: &["[itemprop=\"ratingValue\"]", "div.stars"],
    reviewer_name: &["[itemprop=\"author\"]", ".link--header-color"],
    reviewer_meta: &[
        ("title", ".reviewer-title"),
        ("company_size", ".reviewer-company-size"),
        ("industry", ".reviewer-industry"),
    ],
};

pub struct G2;

impl PlatformRules for G2 {
    fn source(&self) -> Source {
        Source::G2
    }

    fn search_urls(&self, company: &str) -> Vec<String> {
        Url::parse_with_params(&format!("{BASE}/search"), &[("query", company)])
            .map(|u| vec![u.to_string()])
            .unwrap_or_default()
    }

    /// `/products/<slug>/...` → `https://www.g2.com/products/<slug>`
    fn product_url(&self, link: &Url) -> Option<String> {
        if !link.host_str()?.ends_with("g2.com") {
            return None;
        }
        let mut segments = link.path_segments()?;
        if segments.next()? != "products" {
            return None;
        }
        let slug = segments.next().filter(|s| !s.is_empty())?;
        Some(format!("{BASE}/products/{slug}"))
    }

    fn listing_url(&self, product_url: &str) -> String {
        format!("{}/reviews?order=most_recent", product_url.trim_end_matches('/'))
    }

    fn pagination(&self) -> Pagination {
        Pagination::PageNumber
    }

    fn date_order(&self) -> DateOrder {
        DateOrder::Descending
    }

    fn fields(&self) -> &'static FieldSelectors {
        &FIELDS
    }

    fn render_containers(&self) -> &'static [&'static str] {
        &["#reviews", "[data-reviews-root]"]
    }
}
