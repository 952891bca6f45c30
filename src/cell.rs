use serde::{Deserialize, Serialize};
use std::fmt;

use crate::formula::{format_money, format_whole, parse_number, parse_optional};

/// Which half of a two-column worksheet row a cell lives in.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Column label used by the section item payloads (`"Left"` / `"Right"`).
    pub fn column_label(&self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }

    pub fn from_column_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "left" => Some(Side::Left),
            "right" => Some(Side::Right),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "left",
            Side::Right => "right",
        })
    }
}

/// Editable or computed attributes of a [`Cell`].
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Description,
    Size,
    Quantity,
    UnitPrice,
    Gross,
}

impl Field {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Field::Quantity | Field::UnitPrice)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Description => "description",
            Field::Size => "size",
            Field::Quantity => "quantity",
            Field::UnitPrice => "unitPrice",
            Field::Gross => "gross",
        })
    }
}

/// Address of one field of one cell, by spreadsheet row.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct CellRef {
    pub excel_row: u32,
    pub side: Side,
    pub field: Field,
}

impl CellRef {
    pub fn new(excel_row: u32, side: Side, field: Field) -> Self {
        Self { excel_row, side, field }
    }

    pub fn matches(&self, excel_row: u32, side: Side, field: Field) -> bool {
        self.excel_row == excel_row && self.side == side && self.field == field
    }
}

/// One side of a worksheet row.
///
/// `quantity_raw` and `gross_raw` hold the precise values every formula reads;
/// `quantity` and `gross` are what gets displayed and may be rounded to whole
/// numbers for presentation.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Cell {
    pub description: String,
    pub size: String,
    pub quantity: String,
    pub quantity_raw: String,
    pub unit_price: String,
    pub default_unit_price: String,
    pub gross: String,
    pub gross_raw: String,

    pub description_readonly: bool,
    pub size_readonly: bool,
    pub quantity_readonly: bool,
    pub unit_price_readonly: bool,
    pub gross_readonly: bool,

    /// Description came from metadata and is part of the template.
    pub description_locked: bool,
    /// This side of the row is a total line.
    pub is_total: bool,
    pub quantity_user_entered: bool,
    pub size_user_entered: bool,
}

impl Cell {
    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Description => &self.description,
            Field::Size => &self.size,
            Field::Quantity => &self.quantity,
            Field::UnitPrice => &self.unit_price,
            Field::Gross => &self.gross,
        }
    }

    /// Writes a raw user value. Quantity writes go to both representations.
    pub fn set(&mut self, field: Field, value: &str) {
        match field {
            Field::Description => self.description = value.to_string(),
            Field::Size => self.size = value.to_string(),
            Field::Quantity => {
                self.quantity = value.to_string();
                self.quantity_raw = value.to_string();
            }
            Field::UnitPrice => self.unit_price = value.to_string(),
            Field::Gross => {
                self.gross = value.to_string();
                self.gross_raw = value.to_string();
            }
        }
    }

    pub fn is_readonly(&self, field: Field) -> bool {
        match field {
            Field::Description => self.description_readonly,
            Field::Size => self.size_readonly,
            Field::Quantity => self.quantity_readonly,
            Field::UnitPrice => self.unit_price_readonly,
            Field::Gross => self.gross_readonly,
        }
    }

    pub fn set_readonly(&mut self, field: Field, readonly: bool) {
        match field {
            Field::Description => self.description_readonly = readonly,
            Field::Size => self.size_readonly = readonly,
            Field::Quantity => self.quantity_readonly = readonly,
            Field::UnitPrice => self.unit_price_readonly = readonly,
            Field::Gross => self.gross_readonly = readonly,
        }
    }

    pub fn lock_all(&mut self) {
        for field in [
            Field::Description,
            Field::Size,
            Field::Quantity,
            Field::UnitPrice,
            Field::Gross,
        ] {
            self.set_readonly(field, true);
        }
    }

    /// CSS marker for a field, derived from its readonly flag.
    pub fn field_class(&self, field: Field) -> &'static str {
        match (field, self.is_readonly(field)) {
            (Field::Description, true) => "description-cell readonly-cell",
            (Field::Description, false) => "description-cell",
            (Field::UnitPrice, true) => "col-unit readonly-cell",
            (Field::UnitPrice, false) => "col-unit",
            (_, true) => "readonly-cell",
            (_, false) => "",
        }
    }

    /// Precise quantity used in arithmetic.
    pub fn quantity_value(&self) -> f64 {
        if self.quantity_raw.trim().is_empty() {
            parse_number(&self.quantity)
        } else {
            parse_number(&self.quantity_raw)
        }
    }

    pub fn unit_price_value(&self) -> f64 {
        parse_number(&self.unit_price)
    }

    pub fn unit_price_opt(&self) -> Option<f64> {
        parse_optional(&self.unit_price)
    }

    /// Precise gross used in arithmetic.
    pub fn gross_value(&self) -> f64 {
        if self.gross_raw.trim().is_empty() {
            parse_number(&self.gross)
        } else {
            parse_number(&self.gross_raw)
        }
    }

    pub fn size_value(&self) -> f64 {
        parse_number(&self.size)
    }

    /// Stores a computed quantity; `whole` rounds only the presentation value.
    pub fn set_quantity_amount(&mut self, value: f64, whole: bool) {
        self.quantity_raw = format_money(value);
        self.quantity = if whole {
            format_whole(value)
        } else {
            self.quantity_raw.clone()
        };
    }

    /// Stores a computed gross; `whole` rounds only the presentation value.
    pub fn set_gross_amount(&mut self, value: f64, whole: bool) {
        self.gross_raw = format_money(value);
        self.gross = if whole {
            format_whole(value)
        } else {
            self.gross_raw.clone()
        };
    }

    pub fn clear_gross(&mut self) {
        self.gross.clear();
        self.gross_raw.clear();
    }

    pub fn clear_quantity(&mut self) {
        self.quantity.clear();
        self.quantity_raw.clear();
    }

    /// `quantity × unit price` for this cell, the plain gross rule.
    pub fn computed_gross(&self) -> f64 {
        self.quantity_value() * self.unit_price_value()
    }
}
