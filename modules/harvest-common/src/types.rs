use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// A third-party review platform.
///
/// Variant order matches the alphabetical order of the serialized names so the
/// derived `Ord` agrees with output sorting by source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Capterra,
    G2,
    TrustRadius,
}

impl Source {
    pub const ALL: [Source; 3] = [Source::G2, Source::Capterra, Source::TrustRadius];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Capterra => "capterra",
            Source::G2 => "g2",
            Source::TrustRadius => "trustradius",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Source::Capterra => "Capterra",
            Source::G2 => "G2",
            Source::TrustRadius => "TrustRadius",
        }
    }

    /// Numeric scale the platform rates on.
    pub fn rating_scale(&self) -> RatingScale {
        match self {
            Source::G2 => RatingScale { min: 0.5, max: 5.0 },
            Source::Capterra => RatingScale { min: 1.0, max: 5.0 },
            Source::TrustRadius => RatingScale { min: 1.0, max: 10.0 },
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "g2" => Ok(Source::G2),
            "capterra" => Ok(Source::Capterra),
            "trustradius" => Ok(Source::TrustRadius),
            other => Err(ConfigError::UnknownSource(other.to_string())),
        }
    }
}

/// `--source` selection: one platform or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelection {
    All,
    One(Source),
}

impl SourceSelection {
    pub fn sources(&self) -> Vec<Source> {
        match self {
            SourceSelection::All => Source::ALL.to_vec(),
            SourceSelection::One(source) => vec![*source],
        }
    }
}

impl FromStr for SourceSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(SourceSelection::All);
        }
        s.parse().map(SourceSelection::One)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl RatingScale {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// ---------------------------------------------------------------------------
// Date window
// ---------------------------------------------------------------------------

/// Inclusive calendar-date window `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Parse a `YYYY-MM-DD` command-line date.
pub fn parse_iso_date(field: &'static str, value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Review records
// ---------------------------------------------------------------------------

/// A review as pulled off the page, before any validation. All fields are the
/// verbatim text the extractor found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReview {
    pub page_url: String,
    /// Listing URL without the page cursor. Anchors fallback `source_url`s so
    /// a review that shifts between pages keeps one identity.
    pub listing_url: Option<String>,
    pub native_id: Option<String>,
    pub permalink: Option<String>,
    pub title: Option<String>,
    pub body: String,
    pub date_text: Option<String>,
    pub rating_text: Option<String>,
    pub reviewer_name: Option<String>,
    pub reviewer_meta: BTreeMap<String, String>,
}

/// Canonical output record. Only built by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub source: Source,
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub rating: Option<f64>,
    pub reviewer_name: Option<String>,
    pub reviewer_meta: BTreeMap<String, String>,
    pub source_url: String,
    pub raw_id: String,
}

/// Identity used to merge records describing the same review.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Url(String),
    Native(Source, String),
}

impl Review {
    pub fn dedup_key(&self) -> DedupKey {
        if self.source_url.is_empty() {
            DedupKey::Native(self.source, self.raw_id.clone())
        } else {
            DedupKey::Url(self.source_url.clone())
        }
    }

    /// Number of optional fields carrying a value. Used to pick the most
    /// complete variant among duplicates.
    pub fn populated_fields(&self) -> usize {
        [
            !self.title.is_empty(),
            self.rating.is_some(),
            self.reviewer_name.is_some(),
            !self.reviewer_meta.is_empty(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
            + self.reviewer_meta.len().saturating_sub(1)
    }
}

/// Default output file name derived from the company name: `acme-corp-reviews.json`.
pub fn default_output_file(company: &str) -> String {
    let slug = slugify(company);
    if slug.is_empty() {
        "reviews.json".to_string()
    } else {
        format!("{slug}-reviews.json")
    }
}

/// Lowercase, alphanumerics and dashes only: "Acme Corp." → "acme-corp".
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
