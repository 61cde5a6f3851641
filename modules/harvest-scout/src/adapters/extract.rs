// Shared HTML extraction helpers.
//
// Platforms describe their markup as a FieldSelectors table; everything here
// walks that table first and falls back to generic review-card heuristics
// (data-review-id, <article>, review-ish class names) when it finds nothing.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use harvest_common::RawReview;

use crate::dates::parse_review_date;
use crate::normalizer::collapse_whitespace;

/// Cards with less visible text than this are navigation or chrome, not reviews.
const MIN_CARD_TEXT: usize = 40;

/// Longest text fragment scanned for a stray date or rating.
const MAX_FRAGMENT_LEN: usize = 80;

static REVIEW_CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9]+[-_])*review(?:[-_](?:card|item|container|wrapper|block))?$")
        .unwrap()
});

static STARS_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^stars-(\d{1,2})$").unwrap());

static TRAILING_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_](\d+)$").unwrap());

/// Where one platform keeps each review field. Every list is tried in order;
/// generic fallbacks run after it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSelectors {
    pub cards: &'static [&'static str],
    pub native_id_attrs: &'static [&'static str],
    pub permalink: &'static [&'static str],
    pub title: &'static [&'static str],
    pub body: &'static [&'static str],
    pub date: &'static [&'static str],
    pub rating: &'static [&'static str],
    pub reviewer_name: &'static [&'static str],
    /// `(meta key, selector)` pairs.
    pub reviewer_meta: &'static [(&'static str, &'static str)],
}

const GENERIC_PERMALINK: &[&str] = &["a[rel=\"bookmark\"]", "a[data-permalink]"];
const GENERIC_TITLE: &[&str] = &["h3", "h4", "h2"];
const GENERIC_BODY: &[&str] = &["[itemprop=\"reviewBody\"]"];
const GENERIC_DATE: &[&str] = &["time[datetime]", "time", "[itemprop=\"datePublished\"]"];
const GENERIC_RATING: &[&str] = &["[itemprop=\"ratingValue\"]", "[data-rating]"];
const GENERIC_REVIEWER: &[&str] = &["[itemprop=\"author\"]", ".reviewer-name"];

/// A product link found on a search or product page.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Review cards
// ---------------------------------------------------------------------------

/// Extract every review on the page. Cards with too little text are skipped and
/// repeated bodies within the page are kept once.
pub fn extract_reviews(doc: &Html, page_url: &str, fields: &FieldSelectors) -> Vec<RawReview> {
    let base = Url::parse(page_url).ok();
    let mut seen_bodies = HashSet::new();
    let mut reviews = Vec::new();

    for card in review_cards(doc, fields.cards) {
        let card_text = element_text(card);
        if card_text.chars().count() < MIN_CARD_TEXT {
            continue;
        }
        let raw = extract_card(card, &card_text, page_url, base.as_ref(), fields);
        if raw.body.is_empty() || !seen_bodies.insert(raw.body.clone()) {
            continue;
        }
        reviews.push(raw);
    }

    reviews
}

/// Platform card selectors first; the first one that matches anything wins.
pub fn review_cards<'a>(doc: &'a Html, card_selectors: &[&str]) -> Vec<ElementRef<'a>> {
    for sel in parse_selectors(card_selectors) {
        let cards: Vec<_> = doc.select(&sel).collect();
        if !cards.is_empty() {
            return cards;
        }
    }
    generic_cards(doc)
}

fn generic_cards(doc: &Html) -> Vec<ElementRef<'_>> {
    for css in ["[data-review-id]", "article"] {
        if let Ok(sel) = Selector::parse(css) {
            let cards: Vec<_> = doc.select(&sel).collect();
            if !cards.is_empty() {
                return cards;
            }
        }
    }
    let Ok(any_classed) = Selector::parse("[class]") else {
        return Vec::new();
    };
    doc.select(&any_classed)
        .filter(|el| el.value().classes().any(|c| REVIEW_CLASS_RE.is_match(c)))
        .collect()
}

fn extract_card(
    card: ElementRef,
    card_text: &str,
    page_url: &str,
    base: Option<&Url>,
    fields: &FieldSelectors,
) -> RawReview {
    let native_id = fields
        .native_id_attrs
        .iter()
        .find_map(|attr| card.value().attr(attr).map(|v| native_from_attr(attr, v)))
        .filter(|id| !id.is_empty());

    let permalink = select_first(card, &[fields.permalink, GENERIC_PERMALINK])
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve_href(href, base));

    let title = select_first(card, &[fields.title, GENERIC_TITLE])
        .map(element_text)
        .filter(|t| !t.is_empty());

    let body = select_first(card, &[fields.body, GENERIC_BODY])
        .map(element_text)
        .filter(|b| !b.is_empty())
        .or_else(|| paragraphs(card))
        .unwrap_or_else(|| card_text.to_string());

    let date_text = select_first(card, &[fields.date, GENERIC_DATE])
        .and_then(|el| attr_or_text(el, &["datetime", "content"]))
        .or_else(|| scan_for_date(card));

    let rating_text = select_first(card, &[fields.rating, GENERIC_RATING])
        .and_then(rating_value)
        .or_else(|| scan_for_rating(card));

    let reviewer_name = select_first(card, &[fields.reviewer_name, GENERIC_REVIEWER])
        .and_then(|el| attr_or_text(el, &["content"]));

    RawReview {
        page_url: page_url.to_string(),
        listing_url: None,
        native_id,
        permalink,
        title,
        body,
        date_text,
        rating_text,
        reviewer_name,
        reviewer_meta: reviewer_meta(card, fields.reviewer_meta),
    }
}

/// `id="survey-response-123"` → `123`; data attributes are taken verbatim.
fn native_from_attr(attr: &str, value: &str) -> String {
    let value = value.trim();
    if attr == "id" {
        if let Some(caps) = TRAILING_NUMBER_RE.captures(value) {
            return caps[1].to_string();
        }
    }
    value.to_string()
}

fn paragraphs(card: ElementRef) -> Option<String> {
    let sel = Selector::parse("p").ok()?;
    let text = card
        .select(&sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn rating_value(el: ElementRef) -> Option<String> {
    // G2 draws half-star ratings as `stars-9` (= 4.5 of 5).
    for class in el.value().classes() {
        if let Some(caps) = STARS_CLASS_RE.captures(class) {
            let halves: f64 = caps[1].parse().ok()?;
            return Some(format!("{}/5", halves / 2.0));
        }
    }
    attr_or_text(el, &["content", "data-rating", "aria-label"])
}

fn scan_for_date(card: ElementRef) -> Option<String> {
    fragments(card).find(|t| parse_review_date(t).is_some())
}

/// Text fragments like "4.5/5", "4 out of 5" or "Rating: 9/10".
fn scan_for_rating(card: ElementRef) -> Option<String> {
    fragments(card).find(|t| {
        let lower = t.to_ascii_lowercase();
        lower.ends_with("/5")
            || lower.ends_with("/10")
            || lower.ends_with(" out of 5")
            || lower.ends_with(" out of 10")
            || lower.starts_with("rating")
    })
}

fn fragments<'a>(card: ElementRef<'a>) -> impl Iterator<Item = String> + 'a {
    card.text()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty() && t.len() <= MAX_FRAGMENT_LEN)
}

fn reviewer_meta(card: ElementRef, pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    for (key, css) in pairs {
        if let Some(value) = Selector::parse(css)
            .ok()
            .and_then(|sel| card.select(&sel).next())
            .map(element_text)
            .filter(|v| !v.is_empty())
        {
            meta.insert(key.to_string(), value);
        }
    }
    if let Ok(sel) = Selector::parse("[data-meta-key]") {
        for el in card.select(&sel) {
            let value = element_text(el);
            if let (Some(key), false) = (el.value().attr("data-meta-key"), value.is_empty()) {
                meta.entry(key.to_string()).or_insert(value);
            }
        }
    }
    meta
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Resolve an href against the page URL, fragment stripped. Non-navigable
/// hrefs give `None`.
pub fn resolve_href(raw: &str, base: Option<&Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty()
        || raw.starts_with('#')
        || raw.starts_with("javascript:")
        || raw.starts_with("mailto:")
    {
        return None;
    }
    let mut parsed = match base {
        Some(base) => base.join(raw).ok()?,
        None => Url::parse(raw).ok()?,
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// The page's "next page" affordance: `rel=next`, a pagination-next anchor,
/// or an anchor whose text says "next". Disabled links are ignored.
pub fn next_page_link(doc: &Html, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok();
    let explicit = [
        "link[rel=\"next\"]",
        "a[rel=\"next\"]",
        "a.pagination-next",
        "a.next",
        "a[aria-label=\"Next\"]",
        "a[aria-label=\"Next page\"]",
    ];
    for sel in parse_selectors(&explicit) {
        for el in doc.select(&sel) {
            if is_disabled(el) {
                continue;
            }
            if let Some(url) = el.value().attr("href").and_then(|h| resolve_href(h, base.as_ref())) {
                return Some(url);
            }
        }
    }

    let anchors = Selector::parse("a[href]").ok()?;
    doc.select(&anchors)
        .filter(|a| !is_disabled(*a))
        .find(|a| {
            let text = element_text(*a).to_lowercase();
            text.len() <= 20 && text.contains("next")
        })
        .and_then(|a| a.value().attr("href"))
        .and_then(|h| resolve_href(h, base.as_ref()))
}

fn is_disabled(el: ElementRef) -> bool {
    el.value().attr("aria-disabled") == Some("true")
        || el.value().attr("disabled").is_some()
        || el.value().classes().any(|c| c == "disabled")
}

/// `<link rel="canonical">`, resolved.
pub fn canonical_link(doc: &Html, page_url: &str) -> Option<String> {
    let sel = Selector::parse("link[rel=\"canonical\"]").ok()?;
    let base = Url::parse(page_url).ok();
    doc.select(&sel)
        .find_map(|el| el.value().attr("href"))
        .and_then(|h| resolve_href(h, base.as_ref()))
}

/// Product links on a search or product page. `to_product` maps a resolved
/// link to the product's base URL, or `None` for non-product links. The
/// first anchor with a usable name wins per product.
pub fn product_candidates(
    doc: &Html,
    page_url: &str,
    to_product: impl Fn(&Url) -> Option<String>,
) -> Vec<Candidate> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let base = Url::parse(page_url).ok();
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for a in doc.select(&anchors) {
        let Some(resolved) = a
            .value()
            .attr("href")
            .and_then(|h| resolve_href(h, base.as_ref()))
            .and_then(|u| Url::parse(&u).ok())
        else {
            continue;
        };
        let Some(product_url) = to_product(&resolved) else {
            continue;
        };
        let name = anchor_name(a);
        if name.is_empty() || seen.contains(&product_url) {
            continue;
        }
        seen.insert(product_url.clone());
        candidates.push(Candidate {
            name,
            url: product_url,
        });
    }

    candidates
}

fn anchor_name(a: ElementRef) -> String {
    let text = element_text(a);
    if !text.is_empty() {
        return text;
    }
    if let Some(title) = a.value().attr("title") {
        return collapse_whitespace(title);
    }
    Selector::parse("img[alt]")
        .ok()
        .and_then(|sel| a.select(&sel).next())
        .and_then(|img| img.value().attr("alt"))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

/// Visible name of the product a page is about (`og:title`, else the first `h1`).
pub fn page_product_name(doc: &Html) -> Option<String> {
    let og = Selector::parse("meta[property=\"og:title\"]").ok()?;
    if let Some(content) = doc.select(&og).find_map(|m| m.value().attr("content")) {
        let name = collapse_whitespace(content);
        if !name.is_empty() {
            return Some(name);
        }
    }
    let h1 = Selector::parse("h1").ok()?;
    doc.select(&h1).map(element_text).find(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Page signatures
// ---------------------------------------------------------------------------

/// Markers of a client-rendered shell: a `<noscript>` asking for JavaScript, or
/// one of the platform's review containers present but empty.
pub fn needs_rendering(doc: &Html, containers: &[&str]) -> bool {
    if let Ok(noscript) = Selector::parse("noscript") {
        let asks_for_js = doc
            .select(&noscript)
            .any(|el| el.inner_html().to_ascii_lowercase().contains("enable javascript"));
        if asks_for_js {
            return true;
        }
    }
    parse_selectors(containers).iter().any(|sel| {
        doc.select(sel).any(|el| {
            el.children().all(|c| ElementRef::wrap(c).is_none()) && element_text(el).is_empty()
        })
    })
}

// ---------------------------------------------------------------------------
// Small helpers
// ---------------------------------------------------------------------------

pub fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn attr_or_text(el: ElementRef, attrs: &[&str]) -> Option<String> {
    attrs
        .iter()
        .find_map(|a| el.value().attr(a))
        .map(collapse_whitespace)
        .filter(|v| !v.is_empty())
        .or_else(|| Some(element_text(el)).filter(|t| !t.is_empty()))
}

fn select_first<'a>(el: ElementRef<'a>, groups: &[&[&str]]) -> Option<ElementRef<'a>> {
    groups
        .iter()
        .flat_map(|group| parse_selectors(group))
        .find_map(|sel| el.select(&sel).next())
}

/// Parse CSS selectors, dropping any that fail to parse.
pub fn parse_selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_FIELDS: FieldSelectors = FieldSelectors {
        cards: &[],
        native_id_attrs: &["data-review-id", "id"],
        permalink: &[],
        title: &[],
        body: &[],
        date: &[],
        rating: &[],
        reviewer_name: &[],
        reviewer_meta: &[],
    };

    #[test]
    fn generic_cards_use_data_review_id() {
        let html = r#"
            <div data-review-id="r-1">
              <h3>Solid tool</h3>
              <p>We have used it for two years across the whole sales team.</p>
              <span>Reviewed on January 5, 2024</span>
              <span>4.5/5</span>
            </div>
            <div data-review-id="r-2">
              <p>Too short</p>
            </div>"#;
        let doc = Html::parse_document(html);
        let reviews = extract_reviews(&doc, "https://example.com/reviews", &NO_FIELDS);
        assert_eq!(reviews.len(), 1);
        let r = &reviews[0];
        assert_eq!(r.native_id.as_deref(), Some("r-1"));
        assert_eq!(r.title.as_deref(), Some("Solid tool"));
        assert_eq!(r.body, "We have used it for two years across the whole sales team.");
        assert_eq!(r.date_text.as_deref(), Some("Reviewed on January 5, 2024"));
        assert_eq!(r.rating_text.as_deref(), Some("4.5/5"));
    }

    #[test]
    fn review_class_heuristic_skips_field_classes() {
        let html = r#"
            <div class="reviews-list">
              <div class="c-review">
                <h4 class="review-title">Good value</h4>
                <p class="review-body">Setup took a day and support answered within the hour.</p>
                <time datetime="2024-01-20">Jan 20</time>
              </div>
            </div>"#;
        let doc = Html::parse_document(html);
        let reviews = extract_reviews(&doc, "https://example.com/r", &NO_FIELDS);
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].date_text.as_deref(), Some("2024-01-20"));
        assert_eq!(reviews[0].title.as_deref(), Some("Good value"));
    }

    #[test]
    fn repeated_bodies_are_kept_once() {
        let card = r#"<article><p>The reporting module alone saves us hours every single week.</p></article>"#;
        let doc = Html::parse_document(&format!("{card}{card}"));
        assert_eq!(extract_reviews(&doc, "https://example.com/r", &NO_FIELDS).len(), 1);
    }

    #[test]
    fn star_classes_become_fractions() {
        let html = r#"<article><div class="stars stars-9"></div>
            <p>The reporting module alone saves us hours every single week.</p></article>"#;
        let fields = FieldSelectors {
            rating: &["div.stars"],
            ..NO_FIELDS
        };
        let doc = Html::parse_document(html);
        let reviews = extract_reviews(&doc, "https://example.com/r", &fields);
        assert_eq!(reviews[0].rating_text.as_deref(), Some("4.5/5"));
    }

    #[test]
    fn numeric_dom_ids_become_native_ids() {
        assert_eq!(native_from_attr("id", "survey-response-8812"), "8812");
        assert_eq!(native_from_attr("id", "review"), "review");
        assert_eq!(native_from_attr("data-review-id", "abc-12"), "abc-12");
    }

    #[test]
    fn next_link_variants() {
        let page = "https://example.com/reviews?page=1";
        let doc = Html::parse_document(r#"<link rel="next" href="/reviews?page=2">"#);
        assert_eq!(
            next_page_link(&doc, page).as_deref(),
            Some("https://example.com/reviews?page=2")
        );

        let doc = Html::parse_document(r#"<a class="next disabled" href="/x">Next</a>"#);
        assert_eq!(next_page_link(&doc, page), None);

        let doc = Html::parse_document(r#"<nav><a href="?page=3">Next ›</a></nav>"#);
        assert_eq!(
            next_page_link(&doc, page).as_deref(),
            Some("https://example.com/reviews?page=3")
        );

        let doc = Html::parse_document(r#"<a href="/next-gen-crm-features">Read about our next generation CRM</a>"#);
        assert_eq!(next_page_link(&doc, page), None, "long prose links are not pagination");
    }

    #[test]
    fn candidates_dedupe_by_product() {
        let html = r#"
            <a href="/products/acme/reviews">Acme</a>
            <a href="/products/acme">Acme CRM</a>
            <a href="/categories/crm">CRM</a>"#;
        let doc = Html::parse_document(html);
        let candidates = product_candidates(&doc, "https://www.g2.com/search?query=acme", |u| {
            let mut segs = u.path_segments()?;
            (segs.next()? == "products").then(|| format!("https://www.g2.com/products/{}", segs.next().unwrap_or("")))
        });
        assert_eq!(
            candidates,
            vec![Candidate {
                name: "Acme".into(),
                url: "https://www.g2.com/products/acme".into()
            }]
        );
    }

    #[test]
    fn rendering_markers() {
        let shell = Html::parse_document(r#"<div id="reviews"></div>"#);
        assert!(needs_rendering(&shell, &["#reviews"]));
        let filled = Html::parse_document(r#"<div id="reviews"><article>x</article></div>"#);
        assert!(!needs_rendering(&filled, &["#reviews"]));
        let noscript = Html::parse_document(
            r#"<noscript>Please enable JavaScript to view reviews</noscript>"#,
        );
        assert!(needs_rendering(&noscript, &[]));
    }
}
