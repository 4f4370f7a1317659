//! Dated financial events (news items, earnings, splits, ...).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::InvalidRecord;

/// A dated event with a free-form JSON detail payload.
///
/// Identity: `event_id` alone. The id is trusted to be unique within a
/// source; two sources reusing an id would collide on upsert. Kept as-is
/// to match the store's primary key (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub event_type: String,
    pub timestamp: NaiveDateTime,
    /// Associated symbol, when the event concerns one instrument.
    pub symbol: Option<String>,
    pub details: serde_json::Value,
    pub source: String,
}

impl EventRecord {
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        if self.event_id.is_empty() {
            return Err(InvalidRecord {
                kind: "event",
                field: "event_id",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn empty_event_id_is_rejected() {
        let event = EventRecord {
            event_id: String::new(),
            event_type: "news".into(),
            timestamp: NaiveDate::from_ymd_opt(2023, 1, 15)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            symbol: Some("AAPL".into()),
            details: json!({"headline": "Earnings beat"}),
            source: "test_source".into(),
        };
        assert_eq!(event.validate().unwrap_err().field, "event_id");
    }
}
