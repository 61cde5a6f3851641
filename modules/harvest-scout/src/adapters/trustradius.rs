// TrustRadius: next-link pagination, 1-10 ratings. Listing order is not
// guaranteed, so date-based early exit stays off.

use url::Url;

use harvest_common::Source;

use super::extract::FieldSelectors;
use super::{DateOrder, Pagination, PlatformRules};

const BASE: &str = "https://www.trustradius.com";

static FIELDS: FieldSelectors = FieldSelectors {
    cards: &["article[data-review-id]", "div.review-card", ".serp-review"],
    native_id_attrs: &["data-review-id", "id"],
    permalink: &["a.link-to-review", "a.review-link"],
    title: &["h3", "h2.review-title"],
    body: &[".review-body", ".ugc", "[data-testid=\"review-body\"]"],
    date: &[".review-date", "time"],
    rating: &[".trust-score__score", "[data-rating]", ".rating"],
    reviewer_name: &[".reviewer-name", "[itemprop=\"author\"]"],
    reviewer_meta: &[
        ("position", ".reviewer-position"),
        ("company", ".reviewer-company"),
        ("company_size", ".reviewer-company-size"),
        ("industry", ".reviewer-industry"),
    ],
};

pub struct TrustRadius;

impl PlatformRules for TrustRadius {
    fn source(&self) -> Source {
        Source::TrustRadius
    }

    fn search_urls(&self, company: &str) -> Vec<String> {
        Url::parse_with_params(&format!("{BASE}/search"), &[("query", company)])
            .map(|u| vec![u.to_string()])
            .unwrap_or_default()
    }

    fn product_url(&self, link: &Url) -> Option<String> {
        if !link.host_str()?.ends_with("trustradius.com") {
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
        format!("{}/reviews/all", product_url.trim_end_matches('/'))
    }

    fn pagination(&self) -> Pagination {
        Pagination::NextLink
    }

    fn date_order(&self) -> DateOrder {
        DateOrder::Unknown
    }

    fn fields(&self) -> &'static FieldSelectors {
        &FIELDS
    }

    fn render_containers(&self) -> &'static [&'static str] {
        &["#root", "#app", "[data-reviews-root]"]
    }
}
