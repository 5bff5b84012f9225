use serde_json::Value;

use crate::models::AttendanceRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidatedRecords {
    pub records: Vec<AttendanceRecord>,
    pub rejected: Vec<Rejection>,
}

/// Decodes each dashboard row on its own so one bad row cannot sink the batch.
pub fn validate_records(raw: Vec<Value>) -> ValidatedRecords {
    let mut validated = ValidatedRecords::default();

    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<AttendanceRecord>(value) {
            Ok(record) => validated.records.push(record),
            Err(err) => validated.rejected.push(Rejection {
                index,
                reason: err.to_string(),
            }),
        }
    }

    if !validated.rejected.is_empty() {
        tracing::warn!(
            rejected = validated.rejected.len(),
            accepted = validated.records.len(),
            "dashboard rows failed schema validation"
        );
    }

    validated
}
