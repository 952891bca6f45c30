use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cell::{Cell, Field, Side};

/// What a row is for. Comment rows carry text only and are never read by a
/// formula.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    #[default]
    Data,
    Total,
    Comment,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub id: usize,
    pub excel_row: u32,
    #[serde(default)]
    pub section: u8,
    #[serde(default)]
    pub kind: RowKind,
    #[serde(default)]
    pub indent: bool,
    pub left: Cell,
    pub right: Cell,
}

impl Row {
    pub fn cell(&self, side: Side) -> &Cell {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn cell_mut(&mut self, side: Side) -> &mut Cell {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn is_total(&self) -> bool {
        self.kind == RowKind::Total
    }

    pub fn is_comment(&self) -> bool {
        self.kind == RowKind::Comment
    }

    /// Left plus right gross, the per-row contribution to a section subtotal.
    pub fn gross_total(&self) -> f64 {
        if self.is_comment() {
            return 0.0;
        }
        self.left.gross_value() + self.right.gross_value()
    }
}

/// Static description of one side of a row, as supplied by metadata.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CellMetadata {
    pub description: String,
    pub size: String,
    /// Kept as text so a rate like `0.0825` round-trips untouched.
    pub default_unit_price: String,
    pub is_readonly: bool,
    pub is_total_row: bool,
    pub is_comment_row: bool,
}

/// Static description of one row.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RowMetadata {
    pub excel_row: u32,
    pub section: u8,
    pub is_indent: bool,
    pub left: CellMetadata,
    pub right: CellMetadata,
}

impl RowMetadata {
    pub fn new(excel_row: u32) -> Self {
        Self {
            excel_row,
            ..Default::default()
        }
    }

    pub fn in_section(mut self, section: u8) -> Self {
        self.section = section;
        self
    }

    pub fn with_left(mut self, description: &str) -> Self {
        self.left.description = description.to_string();
        self
    }

    pub fn with_right(mut self, description: &str) -> Self {
        self.right.description = description.to_string();
        self
    }

    pub fn with_default_price(mut self, side: Side, price: &str) -> Self {
        match side {
            Side::Left => self.left.default_unit_price = price.to_string(),
            Side::Right => self.right.default_unit_price = price.to_string(),
        }
        self
    }

    pub fn total(mut self) -> Self {
        self.left.is_total_row = true;
        self
    }

    pub fn comment(mut self) -> Self {
        self.right.is_comment_row = true;
        self
    }

    fn kind(&self) -> RowKind {
        if self.left.is_comment_row || self.right.is_comment_row {
            RowKind::Comment
        } else if self.left.is_total_row || self.right.is_total_row {
            RowKind::Total
        } else {
            RowKind::Data
        }
    }
}

/// Fields per side of a row.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SideFields {
    pub left: Vec<Field>,
    pub right: Vec<Field>,
}

/// Per-row, per-side, per-field flags keyed by spreadsheet row.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct FieldTable(BTreeMap<u32, SideFields>);

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, excel_row: u32, side: Side, field: Field) -> Self {
        let entry = self.0.entry(excel_row).or_default();
        let fields = match side {
            Side::Left => &mut entry.left,
            Side::Right => &mut entry.right,
        };
        if !fields.contains(&field) {
            fields.push(field);
        }
        self
    }

    pub fn contains(&self, excel_row: u32, side: Side, field: Field) -> bool {
        self.0.get(&excel_row).is_some_and(|entry| match side {
            Side::Left => entry.left.contains(&field),
            Side::Right => entry.right.contains(&field),
        })
    }
}

/// Sides whose numeric cells are formula outputs, keyed by spreadsheet row.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct SideTable(BTreeMap<u32, Vec<Side>>);

impl SideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, rows: &[u32], side: Side) -> Self {
        for row in rows {
            let sides = self.0.entry(*row).or_default();
            if !sides.contains(&side) {
                sides.push(side);
            }
        }
        self
    }

    pub fn contains(&self, excel_row: u32, side: Side) -> bool {
        self.0.get(&excel_row).is_some_and(|sides| sides.contains(&side))
    }
}

/// Lookup tables that shape how rows are built and which fields users may
/// type into.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "snake_case", default)]
pub struct RowConfig {
    pub whole_number: FieldTable,
    pub editable: FieldTable,
    pub calculated: SideTable,
    /// Unit prices stay editable on data rows even without a description.
    pub unit_price_always_editable: bool,
}

impl RowConfig {
    pub fn is_whole_number(&self, excel_row: u32, side: Side, field: Field) -> bool {
        self.whole_number.contains(excel_row, side, field)
    }

    pub fn is_overridden(&self, excel_row: u32, side: Side, field: Field) -> bool {
        self.editable.contains(excel_row, side, field)
    }

    pub fn is_calculated(&self, excel_row: u32, side: Side) -> bool {
        self.calculated.contains(excel_row, side)
    }
}

/// Builds a fresh row from metadata.
pub fn build_row(metadata: &RowMetadata, index: usize, config: &RowConfig) -> Row {
    let build_cell = |meta: &CellMetadata| Cell {
        description: meta.description.clone(),
        size: meta.size.clone(),
        unit_price: meta.default_unit_price.clone(),
        default_unit_price: meta.default_unit_price.clone(),
        description_locked: !meta.description.trim().is_empty() || meta.is_readonly,
        is_total: meta.is_total_row,
        ..Cell::default()
    };

    let mut row = Row {
        id: index,
        excel_row: metadata.excel_row,
        section: metadata.section,
        kind: metadata.kind(),
        indent: metadata.is_indent,
        left: build_cell(&metadata.left),
        right: build_cell(&metadata.right),
    };
    apply_readonly(&mut row, config);
    row
}

/// Re-derives every readonly flag of `row` from its kind, its descriptions and
/// the override table.
pub fn apply_readonly(row: &mut Row, config: &RowConfig) {
    let excel_row = row.excel_row;
    let kind = row.kind;

    for side in Side::BOTH {
        let calculated = config.is_calculated(excel_row, side);
        let overridden = |field| config.is_overridden(excel_row, side, field);
        let cell = row.cell_mut(side);

        if kind == RowKind::Comment {
            cell.lock_all();
            continue;
        }

        let is_total = cell.is_total;
        let blank = !cell.has_description();

        cell.quantity_readonly = !overridden(Field::Quantity) && (is_total || calculated || blank);
        cell.unit_price_readonly = !overridden(Field::UnitPrice)
            && (is_total || calculated || (blank && !config.unit_price_always_editable));
        cell.size_readonly = !overridden(Field::Size);
        cell.description_readonly =
            !overridden(Field::Description) && (cell.description_locked || is_total);
        cell.gross_readonly = true;
    }
}
