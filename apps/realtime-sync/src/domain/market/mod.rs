//! Cached Market Data
//!
//! Records held by the shared store. Field sets follow what the dashboard
//! views read; anything else the backend sends is kept verbatim so a cache
//! replacement never drops data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Trades
// =============================================================================

/// Side of a QX trade from the taker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    /// Taker hit an ask.
    Buy,
    /// Taker hit a bid.
    Sell,
}

/// A single QX trade as returned by the trades endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Issuer identity of the traded asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Asset name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_name: Option<String>,
    /// `true` when the taker bought.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<bool>,
    /// Price per share in Qu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<u64>,
    /// Number of shares traded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_shares: Option<u64>,
    /// Transaction id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    /// Taker identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taker: Option<String>,
    /// Maker identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maker: Option<String>,
    /// Tick time as reported by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_time: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trade {
    /// Trade side, if the record says.
    #[must_use]
    pub fn side(&self) -> Option<TradeSide> {
        self.bid
            .map(|bid| if bid { TradeSide::Buy } else { TradeSide::Sell })
    }

    /// Total value in Qu (`price * shares`), `None` on missing fields or overflow.
    #[must_use]
    pub fn total(&self) -> Option<u64> {
        self.price?.checked_mul(self.number_of_shares?)
    }
}

// =============================================================================
// QTREATZ Overview
// =============================================================================

/// Opaque QTREATZ dashboard snapshot.
///
/// Fields are defined by the backend and are not validated here beyond the
/// payload being a JSON object or array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QTreatzOverview(Value);

impl QTreatzOverview {
    /// Accept a push payload only if it is a JSON object or array.
    ///
    /// `null`, booleans, numbers and strings are rejected.
    #[must_use]
    pub fn from_payload(payload: Option<&Value>) -> Option<Self> {
        payload.cloned().and_then(Self::from_value)
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(_) | Value::Array(_) => Some(Self(value)),
            _ => None,
        }
    }

    /// Look up a top-level field. Always `None` for an array snapshot.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Number of top-level fields or array elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.0 {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    /// Whether the snapshot has no fields or elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QTreatzOverview {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl<'de> Deserialize<'de> for QTreatzOverview {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value)
            .ok_or_else(|| serde::de::Error::custom("expected a JSON object or array"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn trade_decodes_view_fields() {
        let trade: Trade = serde_json::from_value(json!({
            "issuer": "CFBMEMZOIDEXQAUXYYSZIURADQLAPWPMNJXQSNVQZAHYVOPYUKKJBJUCTVJL",
            "assetName": "QX",
            "bid": true,
            "price": 120,
            "numberOfShares": 5,
            "transactionHash": "abc",
            "taker": "T",
            "maker": "M",
            "tickTime": "2025-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(trade.asset_name.as_deref(), Some("QX"));
        assert_eq!(trade.side(), Some(TradeSide::Buy));
        assert_eq!(trade.total(), Some(600));
        assert!(trade.extra.is_empty());
    }

    #[test]
    fn trade_keeps_unknown_fields() {
        let raw = json!({ "id": "t1", "epoch": 150 });
        let trade: Trade = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(trade.extra.get("id"), Some(&json!("t1")));
        assert_eq!(serde_json::to_value(&trade).unwrap(), raw);
    }

    #[test]
    fn trade_total_needs_both_fields() {
        let trade = Trade {
            price: Some(10),
            ..Trade::default()
        };
        assert_eq!(trade.total(), None);
        assert_eq!(trade.side(), None);
    }

    #[test]
    fn sell_side() {
        let trade = Trade {
            bid: Some(false),
            ..Trade::default()
        };
        assert_eq!(trade.side(), Some(TradeSide::Sell));
    }

    #[test]
    fn overview_rejects_null_and_scalars() {
        assert!(QTreatzOverview::from_payload(None).is_none());
        assert!(QTreatzOverview::from_payload(Some(&Value::Null)).is_none());
        assert!(QTreatzOverview::from_payload(Some(&json!("a string"))).is_none());
        assert!(QTreatzOverview::from_payload(Some(&json!(42))).is_none());
        assert!(QTreatzOverview::from_payload(Some(&json!(true))).is_none());

        let overview = QTreatzOverview::from_payload(Some(&json!({ "totalPool": "100" }))).unwrap();
        assert_eq!(overview.get("totalPool"), Some(&json!("100")));
        assert_eq!(overview.len(), 1);
    }

    #[test]
    fn overview_keeps_arrays_verbatim() {
        let payload = json!([{ "totalPool": 1 }, 2]);
        let overview = QTreatzOverview::from_payload(Some(&payload)).unwrap();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview.get("totalPool"), None);
        assert_eq!(serde_json::to_value(&overview).unwrap(), payload);
    }

    #[test]
    fn overview_decoding_uses_the_same_rule() {
        let decoded: QTreatzOverview = serde_json::from_value(json!([])).unwrap();
        assert!(decoded.is_empty());
        assert!(serde_json::from_value::<QTreatzOverview>(json!("oops")).is_err());
        assert!(QTreatzOverview::default().is_empty());
    }

    #[test]
    fn overview_keeps_nested_fields_unvalidated() {
        let payload = json!({ "totalPool": { "oops": [null] } });
        let overview = QTreatzOverview::from_payload(Some(&payload)).unwrap();
        assert_eq!(serde_json::to_value(&overview).unwrap(), payload);
    }
}
