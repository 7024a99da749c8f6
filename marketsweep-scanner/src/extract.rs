//! Listing extraction from results pages.
//!
//! Every logical field is read through an ordered list of CSS selectors; the
//! first selector yielding a non-empty value wins. Only the title and the link
//! are mandatory.

use crate::classify::CategoryGuesser;
use crate::error::{Result, ScanError};
use crate::listing::RawListing;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_LISTING_SELECTOR: &str = ".search-item, .b-advert, .item-card, .product-card";
pub const DEFAULT_TITLE_SELECTORS: &[&str] = &[".title", ".name", ".b-advert__title", ".search-item__title"];
pub const DEFAULT_PRICE_SELECTORS: &[&str] = &[".price", ".b-price__value", ".search-item__price"];
pub const DEFAULT_LOCATION_SELECTORS: &[&str] = &[".location", ".b-location__value", ".search-item__location"];
pub const DEFAULT_IMAGE_SELECTORS: &[&str] = &["img"];
pub const DEFAULT_LINK_SELECTORS: &[&str] = &["a[href]"];
pub const DEFAULT_DATE_SELECTORS: &[&str] = &["time[datetime]", ".date", ".b-advert__date", ".search-item__date"];
pub const DEFAULT_DESCRIPTION_SELECTORS: &[&str] = &[".search-item__description", ".b-advert__description"];
pub const DEFAULT_DETAIL_DESCRIPTION_SELECTORS: &[&str] = &[
    ".description",
    ".product-description",
    ".item-description",
    ".b-advert__description",
    ".search-item__description",
    "p",
];

const IMAGE_ATTRS: &[&str] = &["src", "data-src"];

/// Compiled selector lists for one marketplace layout.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub listing: Selector,
    pub title: Vec<Selector>,
    pub price: Vec<Selector>,
    pub location: Vec<Selector>,
    pub image: Vec<Selector>,
    pub link: Vec<Selector>,
    pub date: Vec<Selector>,
    pub description: Vec<Selector>,
    pub detail_description: Vec<Selector>,
}

pub fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ScanError::ParseError(format!("Invalid selector '{}': {:?}", css, e)))
}

fn parse_selectors(list: &[&str]) -> Result<Vec<Selector>> {
    list.iter().map(|css| parse_selector(css)).collect()
}

impl ListingSelectors {
    #[allow(clippy::too_many_arguments)]
    pub fn from_css(
        listing: &str,
        title: &[&str],
        price: &[&str],
        location: &[&str],
        image: &[&str],
        link: &[&str],
        date: &[&str],
        description: &[&str],
        detail_description: &[&str],
    ) -> Result<Self> {
        Ok(Self {
            listing: parse_selector(listing)?,
            title: parse_selectors(title)?,
            price: parse_selectors(price)?,
            location: parse_selectors(location)?,
            image: parse_selectors(image)?,
            link: parse_selectors(link)?,
            date: parse_selectors(date)?,
            description: parse_selectors(description)?,
            detail_description: parse_selectors(detail_description)?,
        })
    }
}

impl Default for ListingSelectors {
    fn default() -> Self {
        // The built-in selector strings are constants and always parse.
        Self::from_css(
            DEFAULT_LISTING_SELECTOR,
            DEFAULT_TITLE_SELECTORS,
            DEFAULT_PRICE_SELECTORS,
            DEFAULT_LOCATION_SELECTORS,
            DEFAULT_IMAGE_SELECTORS,
            DEFAULT_LINK_SELECTORS,
            DEFAULT_DATE_SELECTORS,
            DEFAULT_DESCRIPTION_SELECTORS,
            DEFAULT_DETAIL_DESCRIPTION_SELECTORS,
        )
        .expect("built-in listing selectors are valid CSS")
    }
}

/// Result of extracting one results page.
#[derive(Debug, Clone, Default)]
pub struct PageExtraction {
    /// Listing nodes matched on the page, including ones that failed extraction.
    pub node_count: usize,
    pub listings: Vec<RawListing>,
}

#[derive(Debug, Clone, Default)]
pub struct ProductExtractor {
    selectors: ListingSelectors,
    guesser: CategoryGuesser,
}

impl ProductExtractor {
    pub fn new(selectors: ListingSelectors, guesser: CategoryGuesser) -> Self {
        Self { selectors, guesser }
    }

    pub fn selectors(&self) -> &ListingSelectors {
        &self.selectors
    }

    pub fn guesser(&self) -> &CategoryGuesser {
        &self.guesser
    }

    /// Extracts every listing node of a results page.
    pub fn extract_page(&self, html: &str, page_url: &Url, now: DateTime<Utc>) -> PageExtraction {
        let document = Html::parse_document(html);
        let mut extraction = PageExtraction::default();

        for node in document.select(&self.selectors.listing) {
            extraction.node_count += 1;
            if let Some(listing) = self.extract(node, page_url, now) {
                extraction.listings.push(listing);
            }
        }

        debug!(
            url = %page_url,
            nodes = extraction.node_count,
            listings = extraction.listings.len(),
            "Extracted results page"
        );
        extraction
    }

    /// Turns one listing node into a `RawListing`, or `None` when the title or
    /// the link cannot be found.
    pub fn extract(&self, node: ElementRef<'_>, page_url: &Url, now: DateTime<Utc>) -> Option<RawListing> {
        let Some(title) = first_text(node, &self.selectors.title) else {
            warn!(url = %page_url, "Skipping listing node without a title");
            return None;
        };

        let Some(external_url) = self.extract_link(node, page_url) else {
            warn!(url = %page_url, title = %title, "Skipping listing node without a link");
            return None;
        };

        let price = first_text(node, &self.selectors.price)
            .map(|text| extract_price(&text))
            .unwrap_or(0.0);
        let location = first_text(node, &self.selectors.location).unwrap_or_default();
        let description = first_text(node, &self.selectors.description).unwrap_or_default();
        let image_url = first_resolved_attr(node, &self.selectors.image, IMAGE_ATTRS, page_url);
        let estimated_posted_at = self.extract_date(node, now);
        let category_guess = self.guesser.guess_category(&title);

        Some(RawListing {
            title,
            price,
            location,
            description,
            image_url,
            external_url,
            estimated_posted_at,
            category_guess,
        })
    }

    /// First non-empty description on a listing detail page.
    pub fn extract_description(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        self.selectors.detail_description.iter().find_map(|selector| {
            document
                .select(selector)
                .map(element_text)
                .find(|text| !text.is_empty())
        })
    }

    fn extract_link(&self, node: ElementRef<'_>, page_url: &Url) -> Option<String> {
        let own_href = (node.value().name() == "a")
            .then(|| node.value().attr("href"))
            .flatten()
            .and_then(|href| resolve_url(page_url, href));

        own_href.or_else(|| {
            first_resolved_attr(node, &self.selectors.link, &["href"], page_url)
        })
    }

    fn extract_date(&self, node: ElementRef<'_>, now: DateTime<Utc>) -> DateTime<Utc> {
        self.selectors
            .date
            .iter()
            .flat_map(|selector| node.select(selector))
            .find_map(|element| {
                let raw = element
                    .value()
                    .attr("datetime")
                    .map(str::to_string)
                    .unwrap_or_else(|| element_text(element));
                (!raw.is_empty()).then(|| estimate_posted_at(&raw, now))
            })
            .unwrap_or(now)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(node: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        node.select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// First attribute value that resolves to a usable URL. Unresolvable values
/// such as `#fav` fall through to the next candidate.
fn first_resolved_attr(
    node: ElementRef<'_>,
    selectors: &[Selector],
    attrs: &[&str],
    page_url: &Url,
) -> Option<String> {
    selectors.iter().find_map(|selector| {
        node.select(selector).find_map(|element| {
            attrs
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .find_map(|value| resolve_url(page_url, value))
        })
    })
}

/// Normalizes a displayed price such as `"₦150,000"` or `"NGN 1,234.50"`.
/// Anything that does not parse to a positive number yields `0`.
pub fn extract_price(text: &str) -> f64 {
    let digits: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match digits.parse::<f64>() {
        Ok(price) if price.is_finite() && price > 0.0 => price,
        _ => 0.0,
    }
}

/// Resolves `href` against `base`, dropping fragments. Returns `None` for
/// empty, script, mail and in-page links.
pub fn resolve_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Estimates when a listing was posted from a marketplace date label.
///
/// Understands RFC 3339 timestamps, `YYYY-MM-DD`, `just now`, `today`,
/// `yesterday` and relative forms like `3 days ago` or `an hour ago`.
/// Anything else is taken to mean `now`.
pub fn estimate_posted_at(text: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return now;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed.with_timezone(&Utc);
    }
    if let Some(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return date.and_utc();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "just now" | "now" | "today" => return now,
        "yesterday" => return now - TimeDelta::days(1),
        _ => {}
    }

    let words: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|w| !w.is_empty())
        .collect();

    words
        .windows(2)
        .find_map(|pair| {
            let amount = match pair[0] {
                "a" | "an" | "one" => 1,
                n => n.parse::<i64>().ok()?,
            };
            unit_delta(pair[1], amount)
        })
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(now)
}

fn unit_delta(unit: &str, amount: i64) -> Option<TimeDelta> {
    let unit = unit.trim_end_matches('s');
    match unit {
        "sec" | "second" => TimeDelta::try_seconds(amount),
        "min" | "minute" => TimeDelta::try_minutes(amount),
        "hr" | "hour" => TimeDelta::try_hours(amount),
        "day" => TimeDelta::try_days(amount),
        "week" => TimeDelta::try_weeks(amount),
        "month" => TimeDelta::try_days(amount.checked_mul(30)?),
        "year" => TimeDelta::try_days(amount.checked_mul(365)?),
        _ => None,
    }
}
