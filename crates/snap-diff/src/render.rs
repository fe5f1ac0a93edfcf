//! Fixed-width text rendering of a [`DiffReport`].
//!
//! One row per block: `[start-end]` with 12-digit offsets, then one cell per
//! layer, root first:
//!
//! - `NNN` -- generation that introduced the value the layer stores
//!   (its own for a new value, the ancestor's for a redundant copy)
//! - `000` -- unmapped
//! - `xxx` -- inherited, the layer does not store the block

use std::fmt::Write;

use crate::report::{BlockClass, BlockReport, DiffReport, LayerCell};

pub const UNMAPPED_CELL: &str = "000";
pub const INHERITED_CELL: &str = "xxx";

pub fn cell(cell: &LayerCell) -> String {
    match cell.class {
        BlockClass::Unmapped => UNMAPPED_CELL.to_string(),
        BlockClass::Inherited { .. } => INHERITED_CELL.to_string(),
        BlockClass::Introduced => format!("{:03}", cell.generation),
        BlockClass::Redundant {
            duplicates_generation,
        } => format!("{duplicates_generation:03}"),
    }
}

pub fn block_row(block: &BlockReport, block_size: u64) -> String {
    let mut row = format!("[{:012}-{:012}] ", block.offset, block.offset + block_size);
    for c in &block.cells {
        row.push_str(&cell(c));
        row.push('-');
    }
    row.push('|');
    row
}

/// Every block row, newline-terminated.
pub fn rows(report: &DiffReport) -> String {
    let mut out = String::new();
    for block in &report.blocks {
        let _ = writeln!(out, "{}", block_row(block, report.block_size));
    }
    out
}

/// Per-layer totals, one line per layer.
pub fn summary(report: &DiffReport) -> String {
    let mut out = String::new();
    for s in &report.summaries {
        let _ = writeln!(
            out,
            "gen {:03} {}  owned {:>6}  new {:>6}  redundant {:>6} ({} bytes)  inherited {:>6}  unmapped {:>6}",
            s.generation,
            s.build_id,
            s.owned,
            s.introduced,
            s.redundant,
            s.redundant_bytes,
            s.inherited,
            s.unmapped
        );
    }
    out
}

pub fn failures(report: &DiffReport) -> String {
    let mut out = String::new();
    for f in &report.failures {
        let _ = writeln!(
            out,
            "[{:012}-{:012}] {}: {}",
            f.offset,
            f.offset + report.block_size,
            f.build_id,
            f.cause
        );
    }
    out
}
