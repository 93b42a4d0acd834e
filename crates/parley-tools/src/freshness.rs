//! Freshness classification for web-search queries.
//!
//! Two decisions are made from the same keyword sets but with different
//! precedence chains. Date-filter selection checks immediacy-or-financial
//! first; query augmentation checks financial first. Both chains are part
//! of the observed behavior and are kept as-is.

use chrono::{DateTime, Datelike, Utc};

const FINANCIAL_TERMS: &[&str] = &[
    "nifty", "sensex", "stock", "price", "index", "bse", "nse", "market",
];
const IMMEDIATE_TERMS: &[&str] = &["now", "current", "today"];
const NEWS_AUGMENT_TERMS: &[&str] = &["news", "update", "latest", "breaking"];
const RECENT_FILTER_TERMS: &[&str] = &["latest", "recent", "news", "update"];

/// Result-age restriction passed to the search provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    PastDay,
    PastWeek,
    PastMonth,
}

impl DateFilter {
    /// Provider query-parameter encoding.
    pub fn as_param(&self) -> &'static str {
        match self {
            DateFilter::PastDay => "qdr:d",
            DateFilter::PastWeek => "qdr:w",
            DateFilter::PastMonth => "qdr:m",
        }
    }
}

fn contains_any(query: &str, terms: &[&str]) -> bool {
    let lower = query.to_lowercase();
    terms.iter().any(|t| lower.contains(t))
}

/// Pick the date filter for a query.
///
/// Immediacy terms or financial terms restrict to the past day; recency
/// terms to the past week; everything else to the past month so even
/// general queries stay fresh.
pub fn select_date_filter(query: &str) -> DateFilter {
    if contains_any(query, IMMEDIATE_TERMS) || contains_any(query, FINANCIAL_TERMS) {
        DateFilter::PastDay
    } else if contains_any(query, RECENT_FILTER_TERMS) {
        DateFilter::PastWeek
    } else {
        DateFilter::PastMonth
    }
}

/// Rewrite a query with freshness terms before dispatch.
///
/// Every query gets a year-plus-recency suffix; financial, news, and
/// immediacy queries get more specific suffixes, checked in that order.
pub fn augment_query(query: &str, now: DateTime<Utc>) -> String {
    let year = now.year();
    if contains_any(query, FINANCIAL_TERMS) {
        format!("{} {} {} live current today", query, month_name(now), year)
    } else if contains_any(query, NEWS_AUGMENT_TERMS) {
        format!("{} {} today latest news", query, year)
    } else if contains_any(query, IMMEDIATE_TERMS) {
        format!("{} {} current today", query, year)
    } else {
        format!("{} {} latest recent", query, year)
    }
}

fn month_name(now: DateTime<Utc>) -> &'static str {
    match now.month() {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

// =============================================================================
// Tests
// =============================================================================
