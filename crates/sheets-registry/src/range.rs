//! A1-notation ranges for the configured sheet layout.

use crate::error::{SheetsError, SheetsResult};
use access_reconciler::{CellRef, RecordField};
use gatekeeper_config_and_utils::SheetLayout;

/// Resolved column positions of the subscriber table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeLayout {
    sheet: String,
    first_row: u32,
    first_column: usize,
    last_column: usize,
    email: usize,
    active: usize,
    identity: usize,
}

impl RangeLayout {
    pub fn new(layout: &SheetLayout) -> SheetsResult<Self> {
        if layout.name.trim().is_empty() {
            return Err(SheetsError::InvalidRange("sheet name is empty".to_string()));
        }
        if layout.first_row == 0 {
            return Err(SheetsError::InvalidRange(
                "first row must be at least 1".to_string(),
            ));
        }

        let email = column_index(&layout.email_column)?;
        let active = column_index(&layout.active_column)?;
        let identity = column_index(&layout.identity_column)?;
        if email == active || email == identity || active == identity {
            return Err(SheetsError::InvalidRange(format!(
                "columns must be distinct (email={}, active={}, identity={})",
                layout.email_column, layout.active_column, layout.identity_column
            )));
        }

        let first_column = email.min(active).min(identity);
        let last_column = email.max(active).max(identity);

        Ok(Self {
            sheet: layout.name.clone(),
            first_row: layout.first_row,
            first_column,
            last_column,
            email: email - first_column,
            active: active - first_column,
            identity: identity - first_column,
        })
    }

    /// Open-ended range covering every data row, e.g. `Subscribers!A2:C`.
    pub fn read_range(&self) -> String {
        format!(
            "{}!{}{}:{}",
            quote_sheet_name(&self.sheet),
            column_letters(self.first_column),
            self.first_row,
            column_letters(self.last_column)
        )
    }

    /// Single-cell range, e.g. `Subscribers!C7`.
    pub fn cell_range(&self, cell: CellRef) -> String {
        let offset = match cell.field {
            RecordField::Active => self.active,
            RecordField::LinkedIdentity => self.identity,
        };
        format!(
            "{}!{}{}",
            quote_sheet_name(&self.sheet),
            column_letters(self.first_column + offset),
            cell.row.0
        )
    }

    pub fn first_row(&self) -> u32 {
        self.first_row
    }

    /// Offsets of (email, active, identity) within a fetched row.
    pub fn offsets(&self) -> (usize, usize, usize) {
        (self.email, self.active, self.identity)
    }
}

/// Zero-based index of a column given as letters (`A` = 0, `AA` = 26).
pub fn column_index(letters: &str) -> SheetsResult<usize> {
    let letters = letters.trim();
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SheetsError::InvalidRange(format!(
            "invalid column {letters:?}"
        )));
    }

    let index = letters
        .chars()
        .map(|c| (c.to_ascii_uppercase() as u8 - b'A') as usize + 1)
        .try_fold(0usize, |acc, digit| acc.checked_mul(26)?.checked_add(digit))
        .ok_or_else(|| SheetsError::InvalidRange(format!("column {letters:?} is out of range")))?;
    Ok(index - 1)
}

pub fn column_letters(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Quote a sheet name for A1 notation when it is not a bare identifier.
fn quote_sheet_name(name: &str) -> String {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}
