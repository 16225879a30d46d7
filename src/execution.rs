//! Execution (batch) numbering and undo.
//!
//! Numbers are never renumbered: undoing an execution leaves a gap, and the next execution
//! takes one more than the highest number still present.

use crate::error::{Error, Result};
use crate::ledger::Ledger;

pub fn last_execution_id(ledger: &Ledger) -> Option<u32> {
    ledger
        .rows()
        .iter()
        .map(|row| row.execution_id)
        .filter(|id| *id > 0)
        .max()
}

pub fn next_execution_id(ledger: &Ledger) -> u32 {
    last_execution_id(ledger).unwrap_or(0) + 1
}

/// Removes every row of the given execution and returns how many were removed.
///
/// Execution 0 groups the legacy rows that carry no execution number and cannot be undone.
pub fn undo(ledger: &mut Ledger, execution_id: u32) -> Result<usize> {
    if execution_id == 0 {
        return Err(Error::ExecutionNotFound(execution_id));
    }
    let rows = ledger.rows_mut();
    let before = rows.len();
    rows.retain(|row| row.execution_id != execution_id);
    match before - rows.len() {
        0 => Err(Error::ExecutionNotFound(execution_id)),
        removed => Ok(removed),
    }
}
