//! Mark-to-market of open positions
//!
//! ```text
//! market_value      = last × quantity
//! unrealized (Long)  = (last - average_price) × quantity
//! unrealized (Short) = (average_price - last) × quantity
//! unrealized_percent = unrealized / (average_price × quantity) × 100   (0 if cost is 0)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::QuoteCache;
use crate::fifo::{OpenPosition, PositionSide, QUANTITY_EPSILON};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionValuation {
    pub account: String,
    pub ticker: String,
    pub side: PositionSide,
    pub quantity: f64,
    pub average_price: f64,
    /// `None` when no fresh quote was available; the P&L fields follow
    pub last_price: Option<f64>,
    pub market_value: Option<f64>,
    pub unrealized_result: Option<f64>,
    pub unrealized_percent: Option<f64>,
}

/// Value every open position against the cached quotes
pub fn value_positions(positions: &[OpenPosition], quotes: &QuoteCache, now: DateTime<Utc>) -> Vec<PositionValuation> {
    positions
        .iter()
        .map(|position| {
            let last_price = quotes.get(&position.ticker, now).map(|q| q.price);
            if last_price.is_none() {
                log::debug!("No fresh quote for {}, position left unvalued", position.ticker);
            }

            let unrealized_result = last_price.map(|last| {
                let per_unit = match position.side {
                    PositionSide::Long => last - position.average_price,
                    PositionSide::Short => position.average_price - last,
                };
                per_unit * position.quantity
            });

            let cost = position.average_price * position.quantity;
            let unrealized_percent = unrealized_result.map(|result| {
                if cost.abs() > QUANTITY_EPSILON {
                    result / cost * 100.0
                } else {
                    0.0
                }
            });

            PositionValuation {
                account: position.account.clone(),
                ticker: position.ticker.clone(),
                side: position.side,
                quantity: position.quantity,
                average_price: position.average_price,
                last_price,
                market_value: last_price.map(|last| last * position.quantity),
                unrealized_result,
                unrealized_percent,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quotes::Quote;
    use chrono::{Duration, TimeZone};

    fn position(ticker: &str, side: PositionSide, quantity: f64, average_price: f64) -> OpenPosition {
        OpenPosition {
            account: "1".to_string(),
            ticker: ticker.to_string(),
            client: String::new(),
            side,
            quantity,
            average_price,
            lots: Vec::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_long_and_short_valuation() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        cache.insert(Quote::new("ABCD3", 12.0), now());
        cache.insert(Quote::new("WXYZ4", 8.0), now());

        let positions = vec![
            position("ABCD3", PositionSide::Long, 100.0, 10.0),
            position("WXYZ4", PositionSide::Short, 50.0, 10.0),
        ];
        let valued = value_positions(&positions, &cache, now());

        assert_eq!(valued[0].market_value, Some(1200.0));
        assert_eq!(valued[0].unrealized_result, Some(200.0));
        assert_eq!(valued[0].unrealized_percent, Some(20.0));

        assert_eq!(valued[1].market_value, Some(400.0));
        assert_eq!(valued[1].unrealized_result, Some(100.0));
        assert_eq!(valued[1].unrealized_percent, Some(20.0));
    }

    #[test]
    fn test_missing_or_stale_quote_leaves_position_unvalued() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        cache.insert(Quote::new("ABCD3", 12.0), now() - Duration::hours(1));

        let valued = value_positions(&[position("ABCD3", PositionSide::Long, 100.0, 10.0)], &cache, now());
        assert_eq!(valued.len(), 1);
        assert_eq!(valued[0].last_price, None);
        assert_eq!(valued[0].unrealized_result, None);
        assert_eq!(valued[0].market_value, None);
    }

    #[test]
    fn test_zero_cost_position() {
        let mut cache = QuoteCache::new(Duration::minutes(15));
        cache.insert(Quote::new("ABCD3", 5.0), now());

        let valued = value_positions(&[position("ABCD3", PositionSide::Long, 10.0, 0.0)], &cache, now());
        assert_eq!(valued[0].unrealized_result, Some(50.0));
        assert_eq!(valued[0].unrealized_percent, Some(0.0));
    }
}
