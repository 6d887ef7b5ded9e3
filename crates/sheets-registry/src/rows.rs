//! Conversion of raw sheet values into subscriber records.

use crate::range::RangeLayout;
use access_reconciler::{RowRef, SubscriberRecord, UserId};
use serde_json::Value;
use tracing::warn;

/// Cell values the active column accepts as "paying".
const ACTIVE_MARKERS: &[&str] = &["true", "yes", "y", "1", "active", "paid"];

/// Turn the value grid returned for [`RangeLayout::read_range`] into records.
///
/// Rows with a blank email are skipped. Trailing empty cells may be missing
/// from a row entirely; they read as blank.
pub fn parse_rows(values: &[Vec<Value>], layout: &RangeLayout) -> Vec<SubscriberRecord> {
    let (email_at, active_at, identity_at) = layout.offsets();

    values
        .iter()
        .enumerate()
        .filter_map(|(index, cells)| {
            let row = RowRef(layout.first_row() + index as u32);
            let cell = |at: usize| cells.get(at).map(cell_text).unwrap_or_default();

            let email = cell(email_at);
            if email.is_empty() {
                return None;
            }

            Some(SubscriberRecord {
                row,
                email,
                active: parse_active(&cell(active_at)),
                linked_identity: parse_identity(&cell(identity_at), row),
            })
        })
        .collect()
}

/// Cell content as trimmed text, whatever JSON type the API used.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Bool(flag) => (if *flag { "TRUE" } else { "FALSE" }).to_string(),
        Value::Number(number) => match (number.as_i64(), number.as_f64()) {
            (Some(int), _) => int.to_string(),
            (None, Some(float)) if float.fract() == 0.0 => format!("{}", float as i64),
            _ => number.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn parse_active(text: &str) -> bool {
    let text = text.trim().to_ascii_lowercase();
    ACTIVE_MARKERS.contains(&text.as_str())
}

fn parse_identity(text: &str, row: RowRef) -> Option<UserId> {
    if text.is_empty() {
        return None;
    }
    match text.parse::<i64>() {
        Ok(id) => Some(UserId(id)),
        Err(_) => {
            warn!(row = %row, value = %text, "Ignoring non-numeric linked identity");
            None
        }
    }
}
