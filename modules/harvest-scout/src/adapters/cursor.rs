use std::collections::HashSet;

use harvest_common::TerminationReason;

/// Where the next listing fetch goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorPosition {
    /// Company not resolved yet.
    Start,
    /// Numbered listing page (G2).
    Page { listing: String, page: u32 },
    /// URL taken from the previous page's next link.
    Next { listing: String, url: String },
}

impl CursorPosition {
    /// URL to fetch for this position; `None` before resolution.
    pub fn url(&self) -> Option<String> {
        match self {
            CursorPosition::Start => None,
            CursorPosition::Page { listing, page } => Some(page_url(listing, *page)),
            CursorPosition::Next { url, .. } => Some(url.clone()),
        }
    }

    pub fn listing(&self) -> Option<&str> {
        match self {
            CursorPosition::Start => None,
            CursorPosition::Page { listing, .. } | CursorPosition::Next { listing, .. } => Some(listing),
        }
    }
}

/// `listing` with `page=N` appended to its query string.
pub fn page_url(listing: &str, page: u32) -> String {
    match url::Url::parse(listing) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("page", &page.to_string());
            url.to_string()
        }
        Err(_) => format!("{listing}&page={page}"),
    }
}

/// Opaque pagination state for one adapter run. Never shared between adapters.
#[derive(Debug, Clone)]
pub struct PageCursor {
    position: CursorPosition,
    pages_walked: u32,
    visited: HashSet<String>,
    termination: Option<TerminationReason>,
}

impl PageCursor {
    pub fn start() -> Self {
        Self {
            position: CursorPosition::Start,
            pages_walked: 0,
            visited: HashSet::new(),
            termination: None,
        }
    }

    pub fn position(&self) -> &CursorPosition {
        &self.position
    }

    pub fn pages_walked(&self) -> u32 {
        self.pages_walked
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn has_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// First terminal reason sticks.
    pub fn terminate(&mut self, reason: TerminationReason) {
        if self.termination.is_none() {
            self.termination = Some(reason);
        }
    }

    pub(crate) fn advance_to(&mut self, position: CursorPosition) {
        self.position = position;
    }

    /// Record a fetched page under both its requested and final URLs.
    pub(crate) fn mark_visited(&mut self, requested: &str, final_url: &str) {
        self.pages_walked += 1;
        self.visited.insert(requested.to_string());
        self.visited.insert(final_url.to_string());
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_append_to_query() {
        assert_eq!(
            page_url("https://www.g2.com/products/acme/reviews?order=most_recent", 2),
            "https://www.g2.com/products/acme/reviews?order=most_recent&page=2"
        );
    }

    #[test]
    fn start_has_no_url() {
        let cursor = PageCursor::start();
        assert_eq!(cursor.position().url(), None);
        assert!(!cursor.is_terminated());
    }

    #[test]
    fn first_termination_reason_sticks() {
        let mut cursor = PageCursor::start();
        cursor.terminate(TerminationReason::PageLimit);
        cursor.terminate(TerminationReason::Cancelled);
        assert_eq!(cursor.termination(), Some(TerminationReason::PageLimit));
    }

    #[test]
    fn visited_tracks_redirect_targets() {
        let mut cursor = PageCursor::start();
        cursor.mark_visited("https://a.example/p1", "https://a.example/p1?x=1");
        assert!(cursor.has_visited("https://a.example/p1?x=1"));
        assert_eq!(cursor.pages_walked(), 1);
    }
}
