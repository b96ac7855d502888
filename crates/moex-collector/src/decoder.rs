//! Column-indexed decoding of ISS trade responses
//!
//! ISS returns each block as a list of column names plus rows of positional,
//! loosely-typed values:
//!
//! ```text
//! {"trades": {"columns": ["TRADENO", "PRICE", ...], "data": [[123, 250.5, ...], ...]}}
//! ```
//!
//! Numbers may arrive as JSON numbers (integer or float form) or as strings
//! holding a number, so every field goes through a coercion with its own
//! outcome. Required fields fail the row; best-effort fields degrade to an
//! empty/zero value.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{DecodeError, FieldError};
use crate::trade::{exchange_timestamp, zero_timestamp, Trade, TradeId};

pub const COL_TRADENO: &str = "TRADENO";
pub const COL_TRADEDATE: &str = "TRADEDATE";
pub const COL_TRADETIME: &str = "TRADETIME";
pub const COL_BOARDID: &str = "BOARDID";
pub const COL_SECID: &str = "SECID";
pub const COL_PRICE: &str = "PRICE";
pub const COL_QUANTITY: &str = "QUANTITY";
pub const COL_VALUE: &str = "VALUE";

/// Top-level ISS trades document
#[derive(Debug, Deserialize)]
pub struct TradesResponse {
    pub trades: TradesBlock,
}

#[derive(Debug, Deserialize)]
pub struct TradesBlock {
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl TradesResponse {
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Column positions, resolved once per response
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    trade_id: usize,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    /// Fails when the trade identifier column is absent: without it nothing
    /// in the response can be deduplicated or ordered.
    pub fn resolve(columns: &[String]) -> Result<Self, DecodeError> {
        let positions: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let trade_id = *positions
            .get(COL_TRADENO)
            .ok_or(DecodeError::MissingIdColumn(COL_TRADENO))?;
        Ok(Self {
            trade_id,
            positions,
        })
    }

    fn position(&self, column: &'static str) -> Result<usize, FieldError> {
        if column == COL_TRADENO {
            return Ok(self.trade_id);
        }
        self.positions
            .get(column)
            .copied()
            .ok_or(FieldError::MissingColumn(column))
    }

    fn get<'a>(&self, row: &'a [Value], column: &'static str) -> Result<&'a Value, FieldError> {
        let index = self.position(column)?;
        row.get(index)
            .ok_or(FieldError::OutOfRange { column, index })
    }
}

/// Rows of one response decoded into trades, oldest first
#[derive(Debug, Default)]
pub struct DecodedTrades {
    pub trades: Vec<Trade>,
    /// Rows dropped because a required field failed
    pub skipped: usize,
}

fn type_error(column: &'static str, expected: &'static str, value: &Value) -> FieldError {
    FieldError::Type {
        column,
        expected,
        found: value.to_string(),
    }
}

/// String field: a JSON string, or a number rendered as text
pub fn coerce_string(value: &Value, column: &'static str) -> Result<String, FieldError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(type_error(column, "string", other)),
    }
}

/// Float field: a JSON number or a string holding one
pub fn coerce_f64(value: &Value, column: &'static str) -> Result<f64, FieldError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| type_error(column, "number", value)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| type_error(column, "number", value)),
        other => Err(type_error(column, "number", other)),
    }
}

/// Integer field: an integer, an integral float, or a string holding either
pub fn coerce_i64(value: &Value, column: &'static str) -> Result<i64, FieldError> {
    let integral = |f: f64| {
        if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
            Some(f as i64)
        } else {
            None
        }
    };

    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral))
            .ok_or_else(|| type_error(column, "integer", value)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
                .ok_or_else(|| type_error(column, "integer", value))
        }
        other => Err(type_error(column, "integer", other)),
    }
}

/// Trade identifier: a number in any JSON form or a non-empty string token
pub fn coerce_trade_id(value: &Value, column: &'static str) -> Result<TradeId, FieldError> {
    let token = match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u.to_string()
            } else if let Some(i) = n.as_i64() {
                i.to_string()
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => format!("{:.0}", f),
                    _ => n.to_string(),
                }
            }
        }
        Value::String(s) => s.clone(),
        other => return Err(type_error(column, "trade id", other)),
    };
    TradeId::new(&token).ok_or_else(|| type_error(column, "trade id", value))
}

/// Decode one row. Fails only on a required field.
pub fn decode_row(row: &[Value], columns: &ColumnIndex) -> Result<Trade, FieldError> {
    let trade_id = coerce_trade_id(columns.get(row, COL_TRADENO)?, COL_TRADENO)?;
    let price = coerce_f64(columns.get(row, COL_PRICE)?, COL_PRICE)?;
    let quantity = coerce_i64(columns.get(row, COL_QUANTITY)?, COL_QUANTITY)?;

    let best_effort_string = |column: &'static str| {
        columns
            .get(row, column)
            .and_then(|v| coerce_string(v, column))
            .unwrap_or_default()
    };

    let board_id = best_effort_string(COL_BOARDID);
    let security_id = best_effort_string(COL_SECID);
    let value = columns
        .get(row, COL_VALUE)
        .and_then(|v| coerce_f64(v, COL_VALUE))
        .unwrap_or(0.0);
    let timestamp = exchange_timestamp(
        &best_effort_string(COL_TRADEDATE),
        &best_effort_string(COL_TRADETIME),
    )
    .unwrap_or_else(zero_timestamp);

    Ok(Trade {
        trade_id,
        timestamp,
        board_id,
        security_id,
        price,
        quantity,
        value,
    })
}

/// Decode a whole response into trades ordered oldest to newest.
///
/// The provider sends rows newest-first; they are reversed and then stably
/// sorted by trade id so the order holds even if the provider does not
/// honour the requested ordering. Failing rows are logged and skipped.
pub fn decode_response(response: &TradesResponse) -> Result<DecodedTrades, DecodeError> {
    let columns = ColumnIndex::resolve(&response.trades.columns)?;
    let mut decoded = DecodedTrades::default();

    for (position, row) in response.trades.data.iter().enumerate().rev() {
        match decode_row(row, &columns) {
            Ok(trade) => decoded.trades.push(trade),
            Err(e) => {
                warn!(row = position, error = %e, "skipping undecodable trade row");
                decoded.skipped += 1;
            }
        }
    }

    decoded.trades.sort_by(|a, b| a.trade_id.cmp(&b.trade_id));
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<String> {
        [
            COL_TRADENO,
            COL_TRADEDATE,
            COL_TRADETIME,
            COL_BOARDID,
            COL_SECID,
            COL_PRICE,
            COL_QUANTITY,
            COL_VALUE,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn response(data: Vec<Vec<Value>>) -> TradesResponse {
        TradesResponse {
            trades: TradesBlock {
                columns: columns(),
                data,
            },
        }
    }

    fn row(id: Value) -> Vec<Value> {
        vec![
            id,
            json!("2024-03-01"),
            json!("10:00:05"),
            json!("TQBR"),
            json!("SBER"),
            json!(250.5),
            json!(10),
            json!(2505.0),
        ]
    }

    #[test]
    fn test_parse_iss_document() {
        let body = br#"{
            "trades": {
                "columns": ["TRADENO", "PRICE", "QUANTITY"],
                "data": [[12345, 100.5, 3]]
            }
        }"#;
        let resp = TradesResponse::from_slice(body).unwrap();
        assert_eq!(resp.trades.columns.len(), 3);
        assert_eq!(resp.trades.data.len(), 1);
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(matches!(
            TradesResponse::from_slice(b"<html>"),
            Err(DecodeError::Body(_))
        ));
        assert!(TradesResponse::from_slice(br#"{"other": {}}"#).is_err());
    }

    #[test]
    fn test_decode_full_row() {
        let decoded = decode_response(&response(vec![row(json!(101))])).unwrap();
        assert_eq!(decoded.skipped, 0);
        let trade = &decoded.trades[0];
        assert_eq!(trade.trade_id.as_str(), "101");
        assert_eq!(trade.board_id, "TQBR");
        assert_eq!(trade.security_id, "SBER");
        assert_eq!(trade.price, 250.5);
        assert_eq!(trade.quantity, 10);
        assert_eq!(trade.value, 2505.0);
        assert_eq!(trade.timestamp.to_rfc3339(), "2024-03-01T07:00:05+00:00");
    }

    #[test]
    fn test_rows_are_reversed_to_oldest_first() {
        let data = vec![row(json!(103)), row(json!(102)), row(json!(101))];
        let decoded = decode_response(&response(data)).unwrap();
        let ids: Vec<&str> = decoded.trades.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "102", "103"]);
    }

    #[test]
    fn test_out_of_order_rows_are_sorted() {
        let data = vec![row(json!("9")), row(json!("11")), row(json!("10"))];
        let decoded = decode_response(&response(data)).unwrap();
        let ids: Vec<&str> = decoded.trades.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["9", "10", "11"]);
    }

    #[test]
    fn test_missing_id_column_fails_whole_response() {
        let resp = TradesResponse {
            trades: TradesBlock {
                columns: vec!["PRICE".into(), "QUANTITY".into()],
                data: vec![vec![json!(1.0), json!(1)]],
            },
        };
        assert!(matches!(
            decode_response(&resp),
            Err(DecodeError::MissingIdColumn("TRADENO"))
        ));
    }

    #[test]
    fn test_malformed_value_is_zeroed_not_dropped() {
        let mut r = row(json!(101));
        r[7] = json!({"weird": true});
        let decoded = decode_response(&response(vec![r])).unwrap();
        assert_eq!(decoded.skipped, 0);
        assert_eq!(decoded.trades[0].value, 0.0);
    }

    #[test]
    fn test_missing_best_effort_columns_degrade() {
        let resp = TradesResponse {
            trades: TradesBlock {
                columns: vec!["TRADENO".into(), "PRICE".into(), "QUANTITY".into()],
                data: vec![vec![json!(7), json!("12.5"), json!("3")]],
            },
        };
        let decoded = decode_response(&resp).unwrap();
        let trade = &decoded.trades[0];
        assert_eq!(trade.board_id, "");
        assert_eq!(trade.security_id, "");
        assert_eq!(trade.value, 0.0);
        assert_eq!(trade.timestamp, zero_timestamp());
        assert_eq!(trade.price, 12.5);
        assert_eq!(trade.quantity, 3);
    }

    #[test]
    fn test_bad_time_gives_zero_timestamp() {
        let mut r = row(json!(101));
        r[2] = json!("not a time");
        let decoded = decode_response(&response(vec![r])).unwrap();
        assert_eq!(decoded.trades[0].timestamp, zero_timestamp());
    }

    #[test]
    fn test_bad_required_field_skips_only_that_row() {
        let mut bad = row(json!(102));
        bad[5] = json!("n/a");
        let data = vec![row(json!(103)), bad, row(json!(101))];
        let decoded = decode_response(&response(data)).unwrap();
        assert_eq!(decoded.skipped, 1);
        let ids: Vec<&str> = decoded.trades.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["101", "103"]);
    }

    #[test]
    fn test_short_row_is_row_error() {
        let decoded = decode_response(&response(vec![vec![json!(101)]])).unwrap();
        assert_eq!(decoded.skipped, 1);
        assert!(decoded.trades.is_empty());
    }

    #[test]
    fn test_coerce_numbers_in_any_encoding() {
        assert_eq!(coerce_f64(&json!(1.5), "X").unwrap(), 1.5);
        assert_eq!(coerce_f64(&json!(" 2.25 "), "X").unwrap(), 2.25);
        assert!(coerce_f64(&json!(null), "X").is_err());
        assert_eq!(coerce_i64(&json!(10.0), "X").unwrap(), 10);
        assert_eq!(coerce_i64(&json!("10"), "X").unwrap(), 10);
        assert_eq!(coerce_i64(&json!("1e3"), "X").unwrap(), 1000);
        assert!(coerce_i64(&json!(1.5), "X").is_err());
        assert!(coerce_i64(&json!(true), "X").is_err());
    }

    #[test]
    fn test_coerce_i64_rejects_values_past_range() {
        // 2^63 does not fit; casting it would saturate to i64::MAX
        assert!(coerce_i64(&json!(9_223_372_036_854_775_808u64), "X").is_err());
        assert!(coerce_i64(&json!(i64::MAX as f64), "X").is_err());
        assert!(coerce_i64(&json!("9.3e18"), "X").is_err());
        assert_eq!(coerce_i64(&json!(i64::MIN as f64), "X").unwrap(), i64::MIN);
        assert_eq!(coerce_i64(&json!(i64::MAX), "X").unwrap(), i64::MAX);
    }

    #[test]
    fn test_coerce_trade_id_forms() {
        assert_eq!(coerce_trade_id(&json!(12345), "X").unwrap().as_str(), "12345");
        assert_eq!(coerce_trade_id(&json!(1.2345e4), "X").unwrap().as_str(), "12345");
        assert_eq!(coerce_trade_id(&json!("012345"), "X").unwrap().as_str(), "12345");
        assert!(coerce_trade_id(&json!(""), "X").is_err());
        assert!(coerce_trade_id(&json!(null), "X").is_err());
    }
}
