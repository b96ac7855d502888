//! Trade record and trade identifier ordering

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};

/// Exchange local time (Moscow, no DST)
const EXCHANGE_UTC_OFFSET_SECS: i32 = 3 * 60 * 60;

/// Opaque trade identifier in canonical form.
///
/// All-digit tokens are stored without leading zeros and ordered numerically
/// regardless of length. Numeric ids sort before non-numeric ones; two
/// non-numeric ids compare bytewise. Equality is equality of the canonical
/// form, so `"0100" == "100"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradeId(String);

impl TradeId {
    /// Canonicalize a raw token. Returns `None` for an empty token.
    pub fn new(raw: &str) -> Option<Self> {
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }
        if token.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = token.trim_start_matches('0');
            let canonical = if stripped.is_empty() { "0" } else { stripped };
            return Some(Self(canonical.to_string()));
        }
        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_numeric(&self) -> bool {
        self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// Numeric value when the id is all digits and fits in a u64
    pub fn as_u64(&self) -> Option<u64> {
        if self.is_numeric() {
            self.0.parse().ok()
        } else {
            None
        }
    }
}

impl Ord for TradeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_numeric(), other.is_numeric()) {
            (true, true) => self
                .0
                .len()
                .cmp(&other.0.len())
                .then_with(|| self.0.cmp(&other.0)),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for TradeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized as a JSON number when it fits in a u64, else as a string
impl Serialize for TradeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_u64() {
            Some(n) => serializer.serialize_u64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

/// One executed trade, as published to the broker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    #[serde(rename = "tradeno")]
    pub trade_id: TradeId,
    #[serde(rename = "tradetime")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "boardid")]
    pub board_id: String,
    #[serde(rename = "secid")]
    pub security_id: String,
    pub price: f64,
    pub quantity: i64,
    pub value: f64,
}

/// Timestamp used when the source date/time cannot be combined
pub fn zero_timestamp() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Combine exchange-local `YYYY-MM-DD` and `HH:MM:SS[.fff]` into UTC
pub fn exchange_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let local = NaiveDateTime::parse_from_str(
        &format!("{} {}", date.trim(), time.trim()),
        "%Y-%m-%d %H:%M:%S%.f",
    )
    .ok()?;
    let offset = FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS)?;
    local
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TradeId {
        TradeId::new(s).unwrap()
    }

    #[test]
    fn test_leading_zeros_are_canonicalized() {
        assert_eq!(id("0100"), id("100"));
        assert_eq!(id("000").as_str(), "0");
        assert_eq!(id(" 42 ").as_str(), "42");
        assert!(TradeId::new("  ").is_none());
    }

    #[test]
    fn test_numeric_ordering_ignores_length_trap() {
        // Plain string ordering would put "9" after "10"
        assert!(id("10") > id("9"));
        assert!(id("12014398000") > id("9999999999"));
        assert!(id("101") > id("100"));
    }

    #[test]
    fn test_numeric_sorts_before_non_numeric() {
        assert!(id("999") < id("A1"));
        assert!(id("A1") < id("B0"));
    }

    #[test]
    fn test_serialize_as_number_when_it_fits() {
        assert_eq!(serde_json::to_string(&id("0123")).unwrap(), "123");
        assert_eq!(
            serde_json::to_string(&id("99999999999999999999999")).unwrap(),
            "\"99999999999999999999999\""
        );
        assert_eq!(serde_json::to_string(&id("T-1")).unwrap(), "\"T-1\"");
    }

    #[test]
    fn test_exchange_timestamp_is_moscow_time() {
        let ts = exchange_timestamp("2024-03-01", "10:00:05").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T07:00:05+00:00");
    }

    #[test]
    fn test_exchange_timestamp_rejects_garbage() {
        assert!(exchange_timestamp("2024-13-01", "10:00:05").is_none());
        assert!(exchange_timestamp("", "").is_none());
    }

    #[test]
    fn test_trade_wire_format() {
        let trade = Trade {
            trade_id: id("101"),
            timestamp: exchange_timestamp("2024-03-01", "10:00:05").unwrap(),
            board_id: "TQBR".to_string(),
            security_id: "SBER".to_string(),
            price: 250.5,
            quantity: 10,
            value: 2505.0,
        };

        let json: serde_json::Value = serde_json::to_value(&trade).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "tradeno": 101,
                "tradetime": "2024-03-01T07:00:05Z",
                "boardid": "TQBR",
                "secid": "SBER",
                "price": 250.5,
                "quantity": 10,
                "value": 2505.0
            })
        );
    }
}
