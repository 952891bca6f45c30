use log::{debug, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::cell::{CellRef, Field, Side};
use crate::error::Result;
use crate::formula::{NEGATIVE_WARNING, PERCENT_WARNING, is_fraction, parse_optional};
use crate::row::{RowConfig, apply_readonly};
use crate::sheet::Sheet;
use crate::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind, invalid_target};

pub const READONLY_WARNING: &str = "This cell is read-only";

/// Validation rules of one grid.
#[derive(Debug, Clone, Copy)]
pub struct GridRules<'a> {
    pub kind: WorksheetKind,
    pub config: &'a RowConfig,
    pub allow_negative: bool,
    /// Unit price cells that hold a fraction in `[0, 1]`.
    pub percent_cells: &'a [(u32, Side)],
}

/// Validates and writes one value into a grid row, keeping the sibling
/// fields of the cell consistent. Does not run the pipeline.
pub fn edit_grid_cell(
    sheet: &mut Sheet,
    target: &EditTarget,
    row_id: usize,
    side: Side,
    field: Field,
    value: &str,
    rules: GridRules<'_>,
) -> Result<EditResult> {
    let config = rules.config;
    let Some(row) = sheet.by_id_mut(row_id) else {
        return Err(invalid_target(rules.kind, target));
    };
    let excel_row = row.excel_row;

    if row.is_comment() || row.cell(side).is_readonly(field) {
        warn!("{} edit refused, {} is read-only", rules.kind, target);
        return Ok(EditResult::rejected(READONLY_WARNING));
    }

    if field.is_numeric() {
        if let Some(number) = parse_optional(value) {
            if number < 0.0 && !rules.allow_negative {
                warn!("{} edit refused, negative value at {}", rules.kind, target);
                return Ok(EditResult::rejected(NEGATIVE_WARNING));
            }
            if field == Field::UnitPrice
                && rules.percent_cells.contains(&(excel_row, side))
                && !is_fraction(number)
            {
                warn!("{} edit refused, {} is not a fraction", rules.kind, value);
                return Ok(EditResult::rejected(PERCENT_WARNING));
            }
        }
    }

    let overridden = config.is_overridden(excel_row, side, field);
    let whole_gross = config.is_whole_number(excel_row, side, Field::Gross);
    let cell = row.cell_mut(side);
    cell.set(field, value);
    let entered = !value.trim().is_empty();

    match field {
        Field::Description if !cell.is_total && !cell.has_description() => {
            cell.clear_quantity();
            cell.clear_gross();
            cell.unit_price = cell.default_unit_price.clone();
            cell.quantity_user_entered = false;
        }
        Field::Quantity => {
            if entered && cell.unit_price.trim().is_empty() {
                cell.unit_price = cell.default_unit_price.clone();
            }
            if overridden {
                cell.quantity_user_entered = entered;
            }
        }
        Field::Size if overridden => cell.size_user_entered = entered,
        _ => {}
    }

    if matches!(field, Field::Quantity | Field::UnitPrice) {
        let gross = cell.computed_gross();
        cell.set_gross_amount(gross, whole_gross);
    }

    apply_readonly(row, config);
    Ok(EditResult::applied(Some(CellRef::new(excel_row, side, field))))
}

/// What the edit controller reports back for one edit.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Applied {
        cell: Option<CellRef>,
        total: f64,
        /// False while a snapshot is being applied, so no autosave follows.
        notify: bool,
    },
    Rejected {
        warning: String,
    },
}

/// Per-cell change handling shared by every worksheet.
#[derive(Debug)]
pub struct EditController {
    quiesce: Duration,
    editing_until: Option<Instant>,
    loading: bool,
}

impl EditController {
    pub fn new(quiesce: Duration) -> Self {
        Self {
            quiesce,
            editing_until: None,
            loading: false,
        }
    }

    /// True until `quiesce` has passed since the last edit.
    pub fn is_editing(&self) -> bool {
        self.editing_until
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Marks the user as editing, applies the edit, reruns the pipeline and
    /// publishes the new total.
    pub fn on_cell_edit(
        &mut self,
        worksheet: &mut dyn Worksheet,
        target: &EditTarget,
        value: &str,
        totals: &watch::Sender<f64>,
    ) -> Result<EditOutcome> {
        self.editing_until = Some(Instant::now() + self.quiesce);

        match worksheet.apply_edit(target, value)? {
            EditResult::Rejected { warning } => Ok(EditOutcome::Rejected { warning }),
            EditResult::Applied { last_edited } => {
                worksheet.recalculate(last_edited.as_ref());
                let total = worksheet.total();
                totals.send_replace(total);
                debug!("{} edit at {} -> total {:.2}", worksheet.kind(), target, total);

                Ok(EditOutcome::Applied {
                    cell: last_edited,
                    total,
                    notify: !self.loading,
                })
            }
        }
    }
}
