//! Macroeconomic series observations.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::InvalidRecord;

/// One observation of a macroeconomic series (unemployment rate, bond
/// yield, GDP, ...).
///
/// Identity tuple: (indicator, timestamp, source).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroObservation {
    pub indicator: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub source: String,
    /// Release cadence tag, e.g. `"daily"`, `"Monthly"`, `"Quarterly"`.
    pub frequency: String,
}

impl MacroObservation {
    pub fn validate(&self) -> Result<(), InvalidRecord> {
        let invalid = |field| InvalidRecord {
            kind: "macro",
            field,
        };
        if self.indicator.is_empty() {
            return Err(invalid("indicator"));
        }
        if self.source.is_empty() {
            return Err(invalid("source"));
        }
        Ok(())
    }
}
