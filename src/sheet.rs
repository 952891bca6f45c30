use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::cell::{Cell, Field, Side};
use crate::row::{Row, RowConfig, RowMetadata, apply_readonly, build_row};

/// Ordered rows of one worksheet table, addressable by spreadsheet row.
///
/// Insertion order is display order and formula traversal order. Lookups by
/// `excel_row` go through an index rebuilt whenever the row set changes, so a
/// formula asking for a row the template does not have simply sees nothing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Row>", into = "Vec<Row>")]
pub struct Sheet {
    rows: Vec<Row>,
    index: HashMap<u32, usize>,
}

impl From<Vec<Row>> for Sheet {
    fn from(rows: Vec<Row>) -> Self {
        Sheet::new(rows)
    }
}

impl From<Sheet> for Vec<Row> {
    fn from(sheet: Sheet) -> Self {
        sheet.rows
    }
}

impl Sheet {
    pub fn new(rows: Vec<Row>) -> Self {
        let mut index = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            // first row wins when a template repeats an excel row
            index.entry(row.excel_row).or_insert(position);
        }
        Sheet { rows, index }
    }

    /// Builds rows from `(id, metadata)` pairs.
    pub fn from_metadata<'a>(
        items: impl IntoIterator<Item = (usize, &'a RowMetadata)>,
        config: &RowConfig,
    ) -> Self {
        Sheet::new(
            items
                .into_iter()
                .map(|(id, meta)| build_row(meta, id, config))
                .collect(),
        )
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, excel_row: u32) -> Option<&Row> {
        self.index.get(&excel_row).map(|&i| &self.rows[i])
    }

    pub fn row_mut(&mut self, excel_row: u32) -> Option<&mut Row> {
        match self.index.get(&excel_row) {
            Some(&i) => self.rows.get_mut(i),
            None => None,
        }
    }

    /// Position of `excel_row` in display order.
    pub fn position_of(&self, excel_row: u32) -> Option<usize> {
        self.index.get(&excel_row).copied()
    }

    pub fn row_at_mut(&mut self, position: usize) -> Option<&mut Row> {
        self.rows.get_mut(position)
    }

    pub fn position_of_id(&self, id: usize) -> Option<usize> {
        self.rows.iter().position(|row| row.id == id)
    }

    pub fn by_id(&self, id: usize) -> Option<&Row> {
        self.rows.iter().find(|row| row.id == id)
    }

    pub fn by_id_mut(&mut self, id: usize) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.id == id)
    }

    pub fn has_row(&self, excel_row: u32) -> bool {
        self.index.contains_key(&excel_row)
    }

    /// The cell at `excel_row`/`side` unless the row is absent or a comment.
    pub fn cell(&self, excel_row: u32, side: Side) -> Option<&Cell> {
        self.row(excel_row)
            .filter(|row| !row.is_comment())
            .map(|row| row.cell(side))
    }

    /// Runs `update` on the cell when the row exists and is not a comment row.
    pub fn with_cell(&mut self, excel_row: u32, side: Side, update: impl FnOnce(&mut Cell)) {
        if let Some(row) = self.row_mut(excel_row) {
            if !row.is_comment() {
                update(row.cell_mut(side));
            }
        }
    }

    pub fn gross(&self, excel_row: u32, side: Side) -> f64 {
        self.cell(excel_row, side).map(Cell::gross_value).unwrap_or(0.0)
    }

    pub fn quantity(&self, excel_row: u32, side: Side) -> f64 {
        self.cell(excel_row, side).map(Cell::quantity_value).unwrap_or(0.0)
    }

    pub fn unit_price(&self, excel_row: u32, side: Side) -> f64 {
        self.cell(excel_row, side).map(Cell::unit_price_value).unwrap_or(0.0)
    }

    pub fn unit_price_text(&self, excel_row: u32, side: Side) -> &str {
        self.cell(excel_row, side)
            .map(|cell| cell.unit_price.as_str())
            .unwrap_or("")
    }

    pub fn size(&self, excel_row: u32, side: Side) -> f64 {
        self.cell(excel_row, side).map(Cell::size_value).unwrap_or(0.0)
    }

    /// Σ gross of `side` over `range`; missing rows contribute nothing.
    pub fn sum_gross(&self, side: Side, range: RangeInclusive<u32>) -> f64 {
        range.map(|excel_row| self.gross(excel_row, side)).sum()
    }

    /// Σ quantity of `side` over `range`; missing rows contribute nothing.
    pub fn sum_quantity(&self, side: Side, range: RangeInclusive<u32>) -> f64 {
        range.map(|excel_row| self.quantity(excel_row, side)).sum()
    }

    /// Σ (left + right) gross over every row.
    pub fn subtotal(&self) -> f64 {
        self.rows.iter().map(Row::gross_total).sum()
    }

    pub fn apply_readonly(&mut self, config: &RowConfig) {
        for row in &mut self.rows {
            apply_readonly(row, config);
        }
    }

    /// Merges saved line items into the rows, matching by `excelRow` first and
    /// by position second. Only values present in the snapshot overwrite the
    /// template; a template description stays put.
    pub fn restore_line_items(&mut self, items: &[Value], config: &RowConfig) {
        for (position, item) in items.iter().enumerate() {
            let target = item
                .get("excelRow")
                .and_then(Value::as_u64)
                .and_then(|excel_row| u32::try_from(excel_row).ok())
                .and_then(|excel_row| self.index.get(&excel_row).copied())
                .or_else(|| (position < self.rows.len()).then_some(position));

            let Some(target) = target else { continue };
            let row = &mut self.rows[target];
            if row.is_comment() {
                continue;
            }
            let excel_row = row.excel_row;
            for side in Side::BOTH {
                if let Some(saved) = item.get(side.to_string()) {
                    restore_cell(row.cell_mut(side), saved, excel_row, side, config);
                }
            }
        }
        self.apply_readonly(config);
    }
}

/// Reads a snapshot value that may have been stored as text or as a number.
pub fn value_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Copies one saved cell into a live one.
pub fn restore_cell(cell: &mut Cell, saved: &Value, excel_row: u32, side: Side, config: &RowConfig) {
    if let Some(description) = value_text(saved.get("description")) {
        let overridden = config.is_overridden(excel_row, side, Field::Description);
        if !cell.description_locked || overridden {
            cell.description = description;
        }
    }
    if let Some(size) = value_text(saved.get("size")) {
        cell.size = size;
    }

    let raw = value_text(saved.get("quantityRaw"))
        .filter(|raw| !raw.is_empty())
        .or_else(|| value_text(saved.get("quantity")))
        .or_else(|| value_text(saved.get("amount")));
    if let Some(raw) = raw {
        if config.is_whole_number(excel_row, side, Field::Quantity) && !raw.trim().is_empty() {
            cell.set_quantity_amount(crate::formula::parse_number(&raw), true);
        } else {
            cell.quantity = raw.clone();
            cell.quantity_raw = raw;
        }
    }
    if let Some(unit_price) = value_text(saved.get("unitPrice")) {
        cell.unit_price = unit_price;
    }
    if let Some(gross) = value_text(saved.get("grossRaw"))
        .filter(|g| !g.is_empty())
        .or_else(|| value_text(saved.get("gross")))
    {
        let whole = config.is_whole_number(excel_row, side, Field::Gross);
        if whole && !gross.trim().is_empty() {
            cell.set_gross_amount(crate::formula::parse_number(&gross), true);
        } else {
            cell.gross = gross.clone();
            cell.gross_raw = gross;
        }
    }
    if let Some(flag) = saved.get("quantityUserEntered").and_then(Value::as_bool) {
        cell.quantity_user_entered = flag;
    }
    if let Some(flag) = saved.get("sizeUserEntered").and_then(Value::as_bool) {
        cell.size_user_entered = flag;
    }
}
