//! Listing page parser
//!
//! This module extracts review entries from one listing page:
//! - Item link and title (`.info h2 a`)
//! - Author and publication date from the publication line (`.pub`)
//! - Star rating from the `ratingN-t` marker class
//! - Review date (`.date`) and review text (`.comment`)
//!
//! Everything is normalized here so the store only holds canonical values.

use crate::rating::Rating;
use crate::storage::Candidate;
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// The page as a whole could not be recognized as a listing
#[derive(Debug, Error)]
pub enum PageStructureError {
    #[error("no review listing found on page")]
    MissingListing,

    #[error("invalid selector {0:?}")]
    Selector(&'static str),
}

/// A single entry could not be turned into a candidate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("entry has no item link")]
    MissingLink,

    #[error("entry link {0:?} cannot be resolved to an http(s) URL")]
    InvalidLink(String),

    #[error("entry has no title")]
    MissingTitle,
}

struct Selectors {
    listing: Selector,
    entry: Selector,
    title_link: Selector,
    pub_line: Selector,
    date: Selector,
    comment: Selector,
    rating_nums: Selector,
    classed: Selector,
}

impl Selectors {
    fn new() -> Result<Self, PageStructureError> {
        Ok(Self {
            listing: selector(".interest-list, .grid-view, .subject-list")?,
            entry: selector(".subject-item")?,
            title_link: selector(".info h2 a")?,
            pub_line: selector(".pub")?,
            date: selector(".date")?,
            comment: selector(".comment")?,
            rating_nums: selector(".rating_nums")?,
            classed: selector("[class]")?,
        })
    }
}

fn selector(css: &'static str) -> Result<Selector, PageStructureError> {
    Selector::parse(css).map_err(|_| PageStructureError::Selector(css))
}

/// Parses a listing page into candidates
///
/// Malformed entries are logged and skipped. A page without a listing
/// container is a [`PageStructureError`]; a listing with no entries is an
/// empty vector.
///
/// # Arguments
///
/// * `html` - The page body
/// * `base_url` - The base URL for resolving relative item links
pub fn parse_page(html: &str, base_url: &Url) -> Result<Vec<Candidate>, PageStructureError> {
    let document = Html::parse_document(html);
    let selectors = Selectors::new()?;

    let listing = document
        .select(&selectors.listing)
        .next()
        .ok_or(PageStructureError::MissingListing)?;

    let mut candidates = Vec::new();
    for (index, entry) in listing.select(&selectors.entry).enumerate() {
        match parse_entry(entry, &selectors, base_url) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => tracing::warn!("Skipping entry {}: {}", index + 1, e),
        }
    }

    Ok(candidates)
}

fn parse_entry(
    entry: ElementRef<'_>,
    selectors: &Selectors,
    base_url: &Url,
) -> Result<Candidate, ParseError> {
    let link = entry
        .select(&selectors.title_link)
        .next()
        .ok_or(ParseError::MissingLink)?;
    let href = link.value().attr("href").ok_or(ParseError::MissingLink)?;
    let canonical_url = canonicalize_link(href, base_url)?;

    let title = link
        .value()
        .attr("title")
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .or_else(|| Some(element_text(link)).filter(|t| !t.is_empty()))
        .ok_or(ParseError::MissingTitle)?;

    let (author, publish_date) = entry
        .select(&selectors.pub_line)
        .next()
        .map(|line| parse_pub_line(&element_text(line)))
        .unwrap_or((None, None));

    let review_date = entry
        .select(&selectors.date)
        .next()
        .and_then(|date| normalize_date(&element_text(date)));

    let review_content = entry
        .select(&selectors.comment)
        .next()
        .map(comment_text)
        .unwrap_or_default();

    Ok(Candidate {
        canonical_url,
        title,
        author,
        publish_date,
        rating: extract_rating(entry, selectors),
        review_content,
        review_date,
    })
}

/// Resolves an item link against the base URL, dropping query and fragment
pub fn canonicalize_link(href: &str, base_url: &Url) -> Result<String, ParseError> {
    let mut url = base_url
        .join(href.trim())
        .map_err(|_| ParseError::InvalidLink(href.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ParseError::InvalidLink(href.to_string()));
    }

    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Splits a publication line into author and publication date
///
/// The line reads `author / [translator /] publisher / date / price`. The
/// author is everything before the publisher that precedes the date; with
/// no date, the first segment.
pub fn parse_pub_line(line: &str) -> (Option<String>, Option<NaiveDate>) {
    let segments: Vec<&str> = line
        .split(" / ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let date_index = segments.iter().position(|s| normalize_date(s).is_some());
    let publish_date = date_index.and_then(|i| normalize_date(segments[i]));

    let author_segments = match date_index {
        Some(0) => &segments[..0],
        Some(1) => &segments[..1],
        Some(i) => &segments[..i - 1],
        None => &segments[..segments.len().min(1)],
    };

    let author = Some(author_segments.join(" / ")).filter(|a| !a.is_empty());
    (author, publish_date)
}

/// Normalizes a loosely formatted date
///
/// Accepts `YYYY-MM-DD`, `YYYY/M/D`, `YYYY.M`, `YYYY年M月D日` and a bare year,
/// with anything after the date ignored. A missing month or day becomes 1.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let mut numbers: Vec<(u32, usize)> = Vec::with_capacity(3);
    let mut digits = String::new();

    for c in raw.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            break;
        }
        numbers.push((digits.parse().ok()?, digits.len()));
        digits.clear();
        if numbers.len() == 3 || !matches!(c, '-' | '/' | '.' | '年' | '月') {
            break;
        }
    }
    if !digits.is_empty() && numbers.len() < 3 {
        numbers.push((digits.parse().ok()?, digits.len()));
    }

    let (year, year_len) = *numbers.first()?;
    if year_len != 4 {
        return None;
    }
    let month = numbers.get(1).map(|(m, _)| *m).unwrap_or(1);
    let day = numbers.get(2).map(|(d, _)| *d).unwrap_or(1);

    NaiveDate::from_ymd_opt(year as i32, month, day)
}

fn extract_rating(entry: ElementRef<'_>, selectors: &Selectors) -> Rating {
    for element in entry.select(&selectors.classed) {
        for class in element.value().classes() {
            if let Some(rating) = rating_from_class(class) {
                return rating;
            }
        }
    }

    entry
        .select(&selectors.rating_nums)
        .next()
        .and_then(|nums| Rating::normalize(&element_text(nums)))
        .unwrap_or(Rating::Unrated)
}

fn rating_from_class(class: &str) -> Option<Rating> {
    if let Some(stars) = class
        .strip_prefix("rating")
        .and_then(|rest| rest.strip_suffix("-t"))
    {
        return stars.parse().ok().and_then(Rating::from_stars);
    }

    class
        .strip_prefix("star-rating-")
        .or_else(|| class.strip_prefix("allstar"))
        .and_then(Rating::normalize)
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Review text keeps its line breaks; blank lines and indentation go
fn comment_text(comment: ElementRef<'_>) -> String {
    comment
        .text()
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
