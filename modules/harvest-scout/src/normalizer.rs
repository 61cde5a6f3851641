// RawReview → Review. The only place canonical records are constructed.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use harvest_common::{RatingScale, RawReview, Review, Source};

use crate::dates::parse_review_date;

const TITLE_FALLBACK_CHARS: usize = 120;

static FRACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:/|out\s+of|of)\s*(\d+(?:[.,]\d+)?)").unwrap()
});

static STARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*stars?\b").unwrap());

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("review has no description text")]
    EmptyDescription,

    #[error("review has no date")]
    MissingDate,

    #[error("unparseable review date {0:?}")]
    UnparseableDate(String),
}

pub struct ReviewNormalizer;

impl ReviewNormalizer {
    pub fn normalize(raw: &RawReview, source: Source) -> Result<Review, NormalizationError> {
        let description = collapse_whitespace(&raw.body);
        if description.is_empty() {
            return Err(NormalizationError::EmptyDescription);
        }

        let date_text = raw
            .date_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(NormalizationError::MissingDate)?;
        let date = parse_review_date(date_text)
            .ok_or_else(|| NormalizationError::UnparseableDate(date_text.to_string()))?;

        let title = raw
            .title
            .as_deref()
            .map(collapse_whitespace)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_title(&description));

        let rating = raw
            .rating_text
            .as_deref()
            .and_then(|t| coerce_rating(t, source.rating_scale()));

        let reviewer_name = raw
            .reviewer_name
            .as_deref()
            .map(collapse_whitespace)
            .filter(|n| !n.is_empty());

        let reviewer_meta = raw
            .reviewer_meta
            .iter()
            .map(|(k, v)| (k.clone(), collapse_whitespace(v)))
            .filter(|(_, v)| !v.is_empty())
            .collect();

        let raw_id = derive_raw_id(raw, source, &description);
        let source_url = match raw.permalink.as_deref().filter(|p| !p.is_empty()) {
            Some(permalink) => permalink.to_string(),
            None => {
                let listing = raw
                    .listing_url
                    .as_deref()
                    .filter(|l| !l.is_empty())
                    .unwrap_or(raw.page_url.as_str());
                format!("{listing}#review-{raw_id}")
            }
        };

        Ok(Review {
            source,
            title,
            description,
            date,
            rating,
            reviewer_name,
            reviewer_meta,
            source_url,
            raw_id,
        })
    }
}

/// Collapse runs of whitespace (including non-breaking spaces) to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fallback_title(description: &str) -> String {
    if description.chars().count() <= TITLE_FALLBACK_CHARS {
        return description.to_string();
    }
    let head: String = description.chars().take(TITLE_FALLBACK_CHARS).collect();
    format!("{}...", head.trim_end())
}

/// Parse rating text onto `scale`. A stated denominator different from the
/// scale maximum is rescaled; values outside the scale become `None`.
pub fn coerce_rating(text: &str, scale: RatingScale) -> Option<f64> {
    let (value, denominator) = if let Some(caps) = FRACTION_RE.captures(text) {
        (parse_number(&caps[1])?, Some(parse_number(&caps[2])?))
    } else if let Some(caps) = STARS_RE.captures(text) {
        (parse_number(&caps[1])?, None)
    } else {
        (parse_number(NUMBER_RE.find(text)?.as_str())?, None)
    };

    let value = match denominator {
        Some(den) if den <= 0.0 => return None,
        Some(den) if (den - scale.max).abs() > f64::EPSILON => value * scale.max / den,
        _ => value,
    };
    let value = (value * 100.0).round() / 100.0;

    scale.contains(value).then_some(value)
}

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', ".").parse().ok()
}

/// Native id, else the permalink's last path segment, else a content hash.
fn derive_raw_id(raw: &RawReview, source: Source, description: &str) -> String {
    if let Some(id) = raw.native_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return id.to_string();
    }
    if let Some(segment) = raw.permalink.as_deref().and_then(last_path_segment) {
        return segment;
    }
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(raw.date_text.as_deref().unwrap_or_default().as_bytes());
    hasher.update(b"\n");
    hasher.update(description.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

fn last_path_segment(permalink: &str) -> Option<String> {
    let parsed = url::Url::parse(permalink).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn raw(body: &str, date: Option<&str>) -> RawReview {
        RawReview {
            page_url: "https://www.g2.com/products/acme/reviews?order=most_recent&page=1".into(),
            body: body.into(),
            date_text: date.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn requires_description_and_date() {
        assert_eq!(
            ReviewNormalizer::normalize(&raw("   ", Some("2024-01-05")), Source::G2),
            Err(NormalizationError::EmptyDescription)
        );
        assert_eq!(
            ReviewNormalizer::normalize(&raw("Works well", None), Source::G2),
            Err(NormalizationError::MissingDate)
        );
        assert!(matches!(
            ReviewNormalizer::normalize(&raw("Works well", Some("soon")), Source::G2),
            Err(NormalizationError::UnparseableDate(_))
        ));
    }

    #[test]
    fn fills_defaults_for_optional_fields() {
        let r = ReviewNormalizer::normalize(
            &raw("  Works   well\u{a0}for our team.  ", Some("Jan 5, 2024")),
            Source::Capterra,
        )
        .unwrap();
        assert_eq!(r.description, "Works well for our team.");
        assert_eq!(r.title, "Works well for our team.");
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(r.rating, None);
        assert_eq!(r.reviewer_name, None);
        assert!(r.reviewer_meta.is_empty());
        assert_eq!(r.raw_id.len(), 16);
        assert!(r.source_url.ends_with(&format!("#review-{}", r.raw_id)));
    }

    #[test]
    fn long_description_truncates_into_title() {
        let body = "x".repeat(300);
        let r = ReviewNormalizer::normalize(&raw(&body, Some("2024-01-05")), Source::G2).unwrap();
        assert_eq!(r.title.len(), 123);
        assert!(r.title.ends_with("..."));
    }

    #[test]
    fn id_comes_from_native_then_permalink() {
        let mut r = raw("Body text", Some("2024-01-05"));
        r.permalink = Some("https://www.g2.com/survey_responses/acme-review-991/".into());
        let out = ReviewNormalizer::normalize(&r, Source::G2).unwrap();
        assert_eq!(out.raw_id, "acme-review-991");
        assert_eq!(out.source_url, "https://www.g2.com/survey_responses/acme-review-991/");

        r.native_id = Some("991".into());
        let out = ReviewNormalizer::normalize(&r, Source::G2).unwrap();
        assert_eq!(out.raw_id, "991");
    }

    #[test]
    fn hash_id_is_stable() {
        let a = ReviewNormalizer::normalize(&raw("Same body", Some("2024-01-05")), Source::G2).unwrap();
        let b = ReviewNormalizer::normalize(&raw("Same body", Some("2024-01-05")), Source::G2).unwrap();
        assert_eq!(a.raw_id, b.raw_id);
    }

    #[test]
    fn fallback_url_is_the_same_on_every_page() {
        let listing = "https://www.trustradius.com/products/acme/reviews/all";
        let on_page = |page_url: &str| RawReview {
            page_url: page_url.into(),
            listing_url: Some(listing.into()),
            body: "Shifted onto the next page between fetches.".into(),
            date_text: Some("2024-01-12".into()),
            ..Default::default()
        };

        let first = ReviewNormalizer::normalize(&on_page(&format!("{listing}?p=1")), Source::TrustRadius).unwrap();
        let second = ReviewNormalizer::normalize(&on_page(&format!("{listing}?p=2")), Source::TrustRadius).unwrap();
        assert_eq!(first.source_url, second.source_url);
        assert!(first.source_url.starts_with(&format!("{listing}#review-")));

        let (kept, merged) = crate::merge::merge(vec![vec![first, second]]);
        assert_eq!(kept.len(), 1);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn ratings_coerce_to_scale() {
        let five = Source::G2.rating_scale();
        let ten = Source::TrustRadius.rating_scale();
        assert_eq!(coerce_rating("4.5/5", five), Some(4.5));
        assert_eq!(coerce_rating("4 out of 5", five), Some(4.0));
        assert_eq!(coerce_rating("4.5 stars", five), Some(4.5));
        assert_eq!(coerce_rating("Rating: 9/10", ten), Some(9.0));
        assert_eq!(coerce_rating("Rating: 9/10", five), Some(4.5));
        assert_eq!(coerce_rating("4/5", ten), Some(8.0));
        assert_eq!(coerce_rating("7", five), None, "outside the scale");
        assert_eq!(coerce_rating("0 out of 5", Source::Capterra.rating_scale()), None);
        assert_eq!(coerce_rating("no score", five), None);
    }
}
