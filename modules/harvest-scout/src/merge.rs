// Cross-source merge: canonical ordering and duplicate collapse.

use std::cmp::Ordering;
use std::collections::HashMap;

use harvest_common::{DedupKey, Review, Source};

/// A duplicate dropped in favour of a more complete (or earlier) variant.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedDuplicate {
    pub source_url: String,
    pub kept: Source,
    pub dropped: Source,
}

/// Date descending, then source name, then `raw_id` ascending.
pub fn canonical_order(a: &Review, b: &Review) -> Ordering {
    b.date
        .cmp(&a.date)
        .then_with(|| a.source.as_str().cmp(b.source.as_str()))
        .then_with(|| a.raw_id.cmp(&b.raw_id))
}

pub fn sort_reviews(reviews: &mut [Review]) {
    reviews.sort_by(canonical_order);
}

/// Collapse records sharing a dedup key. The variant with more populated
/// optional fields wins; ties keep the one first in canonical order. Output is
/// in canonical order and running it again changes nothing.
pub fn dedup(mut reviews: Vec<Review>) -> (Vec<Review>, Vec<MergedDuplicate>) {
    sort_reviews(&mut reviews);

    let mut index: HashMap<DedupKey, usize> = HashMap::new();
    let mut kept: Vec<Review> = Vec::with_capacity(reviews.len());
    let mut merged = Vec::new();

    for review in reviews {
        let key = review.dedup_key();
        match index.get(&key) {
            Some(&i) => {
                let existing = &mut kept[i];
                let (winner, loser) = if review.populated_fields() > existing.populated_fields() {
                    let loser = std::mem::replace(existing, review);
                    (existing.source, loser)
                } else {
                    (existing.source, review)
                };
                merged.push(MergedDuplicate {
                    source_url: loser.source_url,
                    kept: winner,
                    dropped: loser.source,
                });
            }
            None => {
                index.insert(key, kept.len());
                kept.push(review);
            }
        }
    }

    // A replacement can carry a different date than the record it displaced.
    sort_reviews(&mut kept);
    (kept, merged)
}

/// Flatten per-source batches into one canonical, de-duplicated collection.
pub fn merge(batches: Vec<Vec<Review>>) -> (Vec<Review>, Vec<MergedDuplicate>) {
    dedup(batches.into_iter().flatten().collect())
}
