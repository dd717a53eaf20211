//! Detection of verification and block pages
//!
//! Review text is user content and may mention anything, so markers are only looked for
//! where reviewers cannot write: the page title, the attributes of forms and embedded
//! controls, and (for a site's own markers) the text outside review containers.

use crate::config::SiteConfig;
use crate::ConfigError;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

/// Text that only appears on verification or block pages, matched case-insensitively
pub const BUILTIN_CHALLENGE_MARKERS: &[&str] = &[
    "captcha",
    "robot check",
    "verify you are a human",
    "are you a robot",
    "unusual traffic from your computer",
];

/// Attributes of form controls and embedded content that can name a challenge
const CONTROL_ATTRIBUTES: &[&str] = &["action", "name", "id", "placeholder", "src", "alt"];

static TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("title").expect("BUG: hardcoded CSS selector 'title' is invalid")
});

static CONTROL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("form, input, img, iframe")
        .expect("BUG: hardcoded CSS selector 'form, input, img, iframe' is invalid")
});

/// Tells verification pages apart from review listings of one site
pub struct ChallengeDetector {
    review: Selector,
    /// Site markers, lowercased
    markers: Vec<String>,
}

impl ChallengeDetector {
    pub fn for_site(site: &SiteConfig) -> Result<Self, ConfigError> {
        let review =
            Selector::parse(&site.selectors.review).map_err(|_| ConfigError::InvalidSelector {
                site: site.name.clone(),
                selector: site.selectors.review.clone(),
            })?;
        Ok(Self::new(review, &site.challenge_markers))
    }

    /// `review` selects the review containers whose content is never inspected
    pub fn new(review: Selector, site_markers: &[String]) -> Self {
        let markers = site_markers
            .iter()
            .map(|marker| marker.trim().to_lowercase())
            .filter(|marker| !marker.is_empty())
            .collect();
        Self { review, markers }
    }

    /// Returns true if `document` is a verification page rather than a listing
    pub fn is_challenge(&self, document: &Html) -> bool {
        let structure = self.structural_text(document);
        if BUILTIN_CHALLENGE_MARKERS
            .iter()
            .any(|marker| structure.contains(marker))
        {
            return true;
        }
        if self.markers.is_empty() {
            return false;
        }

        let visible = self.text_outside_reviews(document);
        self.markers
            .iter()
            .any(|marker| structure.contains(marker.as_str()) || visible.contains(marker.as_str()))
    }

    /// Title text and control attributes, lowercased
    fn structural_text(&self, document: &Html) -> String {
        let mut text = String::new();
        for title in document.select(&TITLE_SELECTOR) {
            if self.in_review(title) {
                continue;
            }
            text.extend(title.text());
            text.push('\n');
        }

        for control in document.select(&CONTROL_SELECTOR) {
            if self.in_review(control) {
                continue;
            }
            for name in CONTROL_ATTRIBUTES {
                if let Some(value) = control.value().attr(name) {
                    text.push_str(value);
                    text.push('\n');
                }
            }
        }
        text.to_lowercase()
    }

    fn text_outside_reviews(&self, document: &Html) -> String {
        let mut text = String::new();
        for node in document.tree.nodes() {
            let Node::Text(fragment) = node.value() else {
                continue;
            };
            let in_review = node
                .parent()
                .and_then(ElementRef::wrap)
                .is_some_and(|parent| self.in_review(parent));
            if !in_review {
                text.push_str(fragment);
                text.push(' ');
            }
        }
        text.to_lowercase()
    }

    /// True if `element` is a review container or sits inside one
    fn in_review(&self, element: ElementRef<'_>) -> bool {
        self.review.matches(&element)
            || element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| self.review.matches(&ancestor))
    }
}
