//! Quote cache
//!
//! Last prices used to mark open positions to market. The cache is an owned
//! value with an explicit time-to-live; callers pass `now` in, so expiry is
//! deterministic and testable:
//!
//! ```text
//! fresh(entry) = now - entry.fetched_at < ttl
//! ```
//!
//! Quotes come from a [`QuoteSource`], supplied by the caller (a file of last
//! prices, a broker API client, a test stub).

pub mod valuation;

pub use valuation::{value_positions, PositionValuation};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Last traded price of a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    /// Exchange time of the price, when the source reports one
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            as_of: None,
        }
    }
}

/// Anything that can produce a quote for a symbol
pub trait QuoteSource {
    fn fetch(&self, symbol: &str) -> Result<Quote>;
}

#[derive(Debug, Clone)]
struct CachedQuote {
    quote: Quote,
    fetched_at: DateTime<Utc>,
}

/// Quotes keyed by uppercased symbol, valid for `ttl` after insertion
#[derive(Debug, Clone)]
pub struct QuoteCache {
    ttl: Duration,
    entries: HashMap<String, CachedQuote>,
}

fn cache_key(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a quote, replacing any previous one for the symbol
    pub fn insert(&mut self, quote: Quote, now: DateTime<Utc>) {
        self.entries.insert(
            cache_key(&quote.symbol),
            CachedQuote {
                quote,
                fetched_at: now,
            },
        );
    }

    /// Fresh quote for `symbol`, `None` when missing or expired
    pub fn get(&self, symbol: &str, now: DateTime<Utc>) -> Option<&Quote> {
        self.entries
            .get(&cache_key(symbol))
            .filter(|entry| now - entry.fetched_at < self.ttl)
            .map(|entry| &entry.quote)
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.fetched_at < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            log::debug!("Purged {} expired quotes", removed);
        }
        removed
    }

    /// Cached quote when fresh, otherwise fetch from `source` and cache it
    pub fn get_or_fetch(&mut self, symbol: &str, now: DateTime<Utc>, source: &dyn QuoteSource) -> Result<Quote> {
        if let Some(quote) = self.get(symbol, now) {
            return Ok(quote.clone());
        }

        log::debug!("Quote cache miss for {}, fetching", symbol);
        let quote = source.fetch(symbol)?;
        self.insert(quote.clone(), now);
        Ok(quote)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::Cell;

    struct CountingSource {
        price: f64,
        calls: Cell<usize>,
    }

    impl QuoteSource for CountingSource {
        fn fetch(&self, symbol: &str) -> Result<Quote> {
            self.calls.set(self.calls.get() + 1);
            Ok(Quote::new(symbol, self.price))
        }
    }

    struct FailingSource;

    impl QuoteSource for FailingSource {
        fn fetch(&self, symbol: &str) -> Result<Quote> {
            anyhow::bail!("no quote for {}", symbol)
        }
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_fresh_until_ttl() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        cache.insert(Quote::new("abcd3", 10.0), at(0));

        assert_eq!(cache.get("ABCD3", at(14)).map(|q| q.price), Some(10.0));
        assert!(cache.get("ABCD3", at(15)).is_none());
        assert!(cache.get("WXYZ4", at(0)).is_none());
    }

    #[test]
    fn test_insert_replaces_and_refreshes() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        cache.insert(Quote::new("ABCD3", 10.0), at(0));
        cache.insert(Quote::new("ABCD3", 11.0), at(10));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("abcd3", at(20)).map(|q| q.price), Some(11.0));
    }

    #[test]
    fn test_purge_expired() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        cache.insert(Quote::new("OLD", 1.0), at(0));
        cache.insert(Quote::new("NEW", 2.0), at(10));

        assert_eq!(cache.purge_expired(at(20)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("NEW", at(20)).is_some());
    }

    #[test]
    fn test_get_or_fetch_uses_cache() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        let source = CountingSource {
            price: 42.0,
            calls: Cell::new(0),
        };

        assert_eq!(cache.get_or_fetch("ABCD3", at(0), &source).unwrap().price, 42.0);
        assert_eq!(cache.get_or_fetch("ABCD3", at(5), &source).unwrap().price, 42.0);
        assert_eq!(source.calls.get(), 1);

        cache.get_or_fetch("ABCD3", at(30), &source).unwrap();
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn test_fetch_error_propagates_and_caches_nothing() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        assert!(cache.get_or_fetch("ABCD3", at(0), &FailingSource).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_never_fresh() {
        let mut cache = QuoteCache::new(Duration::zero());
        cache.insert(Quote::new("ABCD3", 10.0), at(0));
        assert!(cache.get("ABCD3", at(0)).is_none());
    }

    #[test]
    fn test_quote_deserializes_without_timestamp() {
        let quote: Quote = serde_json::from_str(r#"{"symbol": "ABCD3", "price": 12.5}"#).unwrap();
        assert_eq!(quote, Quote::new("ABCD3", 12.5));
    }
}
