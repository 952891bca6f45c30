//! The three-section Estimate worksheet.
//!
//! Section 1 counts heads and material, Section 2 adds the second material
//! sheet, and Section 3 turns both into labor, overhead, gain and the quote.
//! Sections 1 and 2 are fully resolved before Section 3 reads them.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::cell::{Cell, CellRef, Field, Side};
use crate::editor::{GridRules, edit_grid_cell};
use crate::error::Result;
use crate::formula::{
    DefaultRate, divide, format_fixed, format_money, format_money_opt, format_whole, parse_number,
    round_to,
};
use crate::row::{FieldTable, RowConfig, RowMetadata, SideTable};
use crate::sheet::Sheet;
use crate::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind, invalid_target};

pub const TOTAL_HEADS: u32 = 22;
pub const SECTION1_SUBTOTAL: u32 = 69;
pub const SECTION2_SUBTOTAL: u32 = 125;
pub const TOTAL_MATERIAL: u32 = 133;
pub const SALES_TAX: u32 = 135;
pub const MATERIAL_EQUIPMENT: u32 = 152;
pub const FIELD_ENG_FAB: u32 = 153;
pub const GRAND_TOTAL_MATERIAL: u32 = 155;
pub const HEADCOUNT: u32 = 157;
pub const TOTAL_DIRECT_COST: u32 = 160;
pub const OVERHEAD: u32 = 161;
pub const SUBTOTAL: u32 = 163;
pub const GAIN: u32 = 164;
pub const TOTAL_QUOTE: u32 = 166;
pub const PRICE_MINUS_EQUIPMENT: u32 = 167;
pub const GROSS_MARGIN: u32 = 168;
pub const BOND_AMOUNT: u32 = 169;
pub const MATERIAL_PER_HEAD: u32 = 173;
pub const DIRECT_COST_PER_HEAD: u32 = 174;
pub const BUILDING_SQ_FOOTAGE: u32 = 175;
pub const SALES_COST_PER_HEAD: u32 = 176;
pub const COST_PER_SQUARE_FOOT: u32 = 178;
pub const MISC_LABOR: u32 = 180;
pub const TOTAL_LABOR_HOURS: u32 = 182;
pub const LABOR: u32 = 184;
pub const ENGINEERING: u32 = 185;
pub const BIM: u32 = 186;
pub const FABRICATION: u32 = 187;
pub const FIELD_ENG_FAB_TOTAL: u32 = 189;

/// Left-side grosses taken out of the quote for the "price minus" rows.
const EXCLUDED_FROM_PRICE: [u32; 5] = [144, 145, 150, 151, 152];

pub const ENGINEERING_HOURS: DefaultRate = DefaultRate::new("engineering hours", 40.0);
pub const OVERHEAD_RATE: DefaultRate = DefaultRate::new("overhead", 0.15);
pub const GAIN_RATE: DefaultRate = DefaultRate::new("gain", 0.15);
pub const BOND_MINIMUM: f64 = 100.0;

const PERCENT_CELLS: [(u32, Side); 3] = [
    (SALES_TAX, Side::Right),
    (OVERHEAD, Side::Right),
    (GAIN, Side::Right),
];

/// Row tables of the built-in Estimate template, shared by all three sections.
pub fn estimate_config() -> RowConfig {
    RowConfig {
        whole_number: FieldTable::new()
            .with(TOTAL_LABOR_HOURS, Side::Left, Field::Gross)
            .with(LABOR, Side::Left, Field::Quantity)
            .with(BIM, Side::Left, Field::Quantity),
        editable: FieldTable::new()
            .with(FIELD_ENG_FAB, Side::Left, Field::Description)
            .with(MISC_LABOR, Side::Left, Field::Description)
            .with(BIM, Side::Left, Field::Quantity)
            .with(FABRICATION, Side::Left, Field::Size)
            .with(SALES_TAX, Side::Right, Field::UnitPrice)
            .with(OVERHEAD, Side::Right, Field::UnitPrice)
            .with(GAIN, Side::Right, Field::UnitPrice)
            .with(BUILDING_SQ_FOOTAGE, Side::Right, Field::Quantity)
            .with(LABOR, Side::Left, Field::UnitPrice)
            .with(BIM, Side::Left, Field::UnitPrice),
        calculated: SideTable::new()
            .with_rows(
                &[
                    TOTAL_HEADS,
                    SECTION1_SUBTOTAL,
                    SECTION2_SUBTOTAL,
                    TOTAL_MATERIAL,
                    GRAND_TOTAL_MATERIAL,
                    HEADCOUNT,
                    TOTAL_LABOR_HOURS,
                    LABOR,
                    BIM,
                    FIELD_ENG_FAB_TOTAL,
                ],
                Side::Left,
            )
            .with_rows(
                &[
                    TOTAL_MATERIAL,
                    SALES_TAX,
                    MATERIAL_EQUIPMENT,
                    FIELD_ENG_FAB,
                    TOTAL_DIRECT_COST,
                    OVERHEAD,
                    SUBTOTAL,
                    GAIN,
                    TOTAL_QUOTE,
                    PRICE_MINUS_EQUIPMENT,
                    GROSS_MARGIN,
                    BOND_AMOUNT,
                    MATERIAL_PER_HEAD,
                    DIRECT_COST_PER_HEAD,
                    BUILDING_SQ_FOOTAGE,
                    SALES_COST_PER_HEAD,
                    COST_PER_SQUARE_FOOT,
                ],
                Side::Right,
            ),
        unit_price_always_editable: false,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimateMetadata {
    pub section1: Vec<RowMetadata>,
    pub section2: Vec<RowMetadata>,
    pub section3: Vec<RowMetadata>,
}

/// Section subtotals and the grand total, in two-decimal precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateTotals {
    pub section1_subtotal: f64,
    pub section2_subtotal: f64,
    pub section3_subtotal: f64,
    pub grand_total: f64,
}

/// `a × b` when both operands are positive, otherwise zero.
fn positive_product(a: f64, b: f64) -> f64 {
    if a > 0.0 && b > 0.0 { a * b } else { 0.0 }
}

/// `numerator / denominator` rendered with two decimals when both are
/// positive, otherwise empty.
fn positive_ratio(numerator: f64, denominator: f64) -> String {
    if numerator > 0.0 && denominator > 0.0 {
        format_money(numerator / denominator)
    } else {
        String::new()
    }
}

fn set_gross(sheet: &mut Sheet, config: &RowConfig, excel_row: u32, side: Side, value: f64) {
    let whole = config.is_whole_number(excel_row, side, Field::Gross);
    sheet.with_cell(excel_row, side, |cell| cell.set_gross_amount(value, whole));
}

fn set_gross_text(sheet: &mut Sheet, excel_row: u32, side: Side, value: String) {
    sheet.with_cell(excel_row, side, |cell| {
        cell.gross_raw = value.clone();
        cell.gross = value;
    });
}

fn set_quantity(sheet: &mut Sheet, config: &RowConfig, excel_row: u32, side: Side, value: f64) {
    let whole = config.is_whole_number(excel_row, side, Field::Quantity);
    sheet.with_cell(excel_row, side, |cell| cell.set_quantity_amount(value, whole));
}

fn set_quantity_text(sheet: &mut Sheet, excel_row: u32, side: Side, value: String) {
    sheet.with_cell(excel_row, side, |cell| {
        cell.quantity_raw = value.clone();
        cell.quantity = value;
    });
}

fn set_unit_price(sheet: &mut Sheet, excel_row: u32, side: Side, value: f64) {
    sheet.with_cell(excel_row, side, |cell| cell.unit_price = format_money(value));
}

fn set_size(sheet: &mut Sheet, excel_row: u32, side: Side, value: String) {
    sheet.with_cell(excel_row, side, |cell| cell.size = value);
}

/// Headcount and material subtotal of Section 1.
pub fn recalculate_section1(sheet: &mut Sheet, config: &RowConfig) {
    let heads = sheet.sum_quantity(Side::Left, 5..=21);
    let heads_gross = sheet.sum_gross(Side::Left, 5..=21);
    set_quantity(sheet, config, TOTAL_HEADS, Side::Left, heads);
    set_gross(sheet, config, TOTAL_HEADS, Side::Left, heads_gross);

    let subtotal =
        sheet.sum_gross(Side::Left, TOTAL_HEADS..=67) + sheet.sum_gross(Side::Right, 5..=67);
    set_gross(sheet, config, SECTION1_SUBTOTAL, Side::Left, subtotal);
}

pub fn recalculate_section2(sheet: &mut Sheet, config: &RowConfig) {
    let subtotal = sheet.sum_gross(Side::Left, 77..=123) + sheet.sum_gross(Side::Right, 77..=123);
    set_gross(sheet, config, SECTION2_SUBTOTAL, Side::Left, subtotal);
}

/// Labor hours, rates and per-head figures of Section 3, in dependency order.
///
/// `headcount` is Section 1 row 22, `material` the Section 1 and 2 subtotals
/// added together. Hybrid cells (BIM quantity, fabrication size) keep a value
/// the user typed.
pub fn recalculate_section3(
    sheet: &mut Sheet,
    config: &RowConfig,
    headcount: f64,
    material: f64,
    last_edited: Option<&CellRef>,
) {
    let left = Side::Left;
    let right = Side::Right;

    sheet.with_cell(HEADCOUNT, left, |cell| {
        cell.size = format_money(headcount);
        cell.clear_quantity();
    });

    // labor block
    let labor_hours = sheet.sum_gross(left, 159..=MISC_LABOR);
    set_gross(sheet, config, TOTAL_LABOR_HOURS, left, labor_hours);

    let hours = sheet.gross(TOTAL_LABOR_HOURS, left);
    set_quantity(sheet, config, LABOR, left, hours);
    let labor_gross = positive_product(hours, sheet.unit_price(LABOR, left));
    set_gross(sheet, config, LABOR, left, labor_gross);
    set_size(sheet, LABOR, left, positive_ratio(hours, headcount));

    if let Some(cell) = sheet.cell(ENGINEERING, left) {
        let quantity = ENGINEERING_HOURS.resolve(&cell.quantity);
        let gross = positive_product(quantity, cell.unit_price_value());
        set_gross(sheet, config, ENGINEERING, left, gross);
        set_size(sheet, ENGINEERING, left, positive_ratio(quantity, headcount));
    }

    recalculate_bim(sheet, config, headcount, last_edited);
    recalculate_fabrication(sheet, config, headcount, last_edited);

    let field_eng_fab = sheet.sum_gross(left, LABOR..=188);
    set_gross(sheet, config, FIELD_ENG_FAB_TOTAL, left, field_eng_fab);

    // material and markup
    set_gross(sheet, config, TOTAL_MATERIAL, left, material);
    let grand_material = sheet.sum_gross(left, TOTAL_MATERIAL..=FIELD_ENG_FAB);
    set_gross(sheet, config, GRAND_TOTAL_MATERIAL, left, grand_material);
    set_gross(sheet, config, TOTAL_MATERIAL, right, grand_material);

    let tax = sheet.gross(TOTAL_MATERIAL, right) * sheet.unit_price(SALES_TAX, right);
    set_gross(sheet, config, SALES_TAX, right, tax);

    let material_equipment = sheet.sum_gross(right, TOTAL_MATERIAL..=150);
    set_gross(sheet, config, MATERIAL_EQUIPMENT, right, material_equipment);
    let labor_total = sheet.gross(FIELD_ENG_FAB_TOTAL, left);
    set_gross(sheet, config, FIELD_ENG_FAB, right, labor_total);

    let direct_cost = round_to(sheet.sum_gross(right, MATERIAL_EQUIPMENT..=158), 2);
    set_gross(sheet, config, TOTAL_DIRECT_COST, right, direct_cost);

    let overhead_rate = OVERHEAD_RATE.resolve(sheet.unit_price_text(OVERHEAD, right));
    let overhead = round_to(direct_cost * overhead_rate, 2);
    set_quantity(sheet, config, OVERHEAD, right, direct_cost);
    set_gross(sheet, config, OVERHEAD, right, overhead);

    let subtotal = round_to(direct_cost + overhead, 2);
    set_gross(sheet, config, SUBTOTAL, right, subtotal);

    let gain_rate = GAIN_RATE.resolve(sheet.unit_price_text(GAIN, right));
    let gain = round_to(subtotal * gain_rate, 2);
    set_quantity(sheet, config, GAIN, right, subtotal);
    set_gross(sheet, config, GAIN, right, gain);

    let quote = round_to(subtotal + gain, 2);
    set_gross(sheet, config, TOTAL_QUOTE, right, quote);

    let excluded: f64 = EXCLUDED_FROM_PRICE
        .iter()
        .map(|&excel_row| sheet.gross(excel_row, left))
        .sum();
    let net_price = round_to(quote - excluded, 2);
    set_gross(sheet, config, PRICE_MINUS_EQUIPMENT, right, net_price);

    let margin = if quote > 0.0 {
        format_fixed((overhead + gain) / quote, 4)
    } else {
        String::new()
    };
    set_quantity_text(sheet, GROSS_MARGIN, right, margin);

    let bond = (quote / 1000.0 * 1.5).max(BOND_MINIMUM);
    set_quantity(sheet, config, BOND_AMOUNT, right, bond);
    set_gross(sheet, config, BOND_AMOUNT, right, quote / 1000.0 * 12.0);

    // per-head figures
    let material_cost = sheet.gross(GRAND_TOTAL_MATERIAL, left) - excluded;
    let per_head = |sheet: &mut Sheet, excel_row: u32, quantity: f64| {
        set_quantity(sheet, config, excel_row, right, quantity);
        set_unit_price(sheet, excel_row, right, headcount);
        set_gross_text(
            sheet,
            excel_row,
            right,
            format_money_opt(divide(quantity, headcount)),
        );
    };
    per_head(sheet, MATERIAL_PER_HEAD, material_cost);
    per_head(sheet, DIRECT_COST_PER_HEAD, direct_cost);

    set_unit_price(sheet, BUILDING_SQ_FOOTAGE, right, headcount);
    let square_feet = sheet.quantity(BUILDING_SQ_FOOTAGE, right);
    set_gross_text(
        sheet,
        BUILDING_SQ_FOOTAGE,
        right,
        positive_ratio(square_feet, headcount),
    );

    per_head(sheet, SALES_COST_PER_HEAD, net_price);

    let per_square_foot = divide(net_price, square_feet).filter(|_| square_feet > 0.0);
    set_gross_text(
        sheet,
        COST_PER_SQUARE_FOOT,
        right,
        format_money_opt(per_square_foot),
    );
}

/// BIM hours default to half the headcount unless the user owns the quantity.
fn recalculate_bim(
    sheet: &mut Sheet,
    config: &RowConfig,
    headcount: f64,
    last_edited: Option<&CellRef>,
) {
    let Some(cell) = sheet.cell(BIM, Side::Left) else {
        return;
    };
    let bim_hours = sheet.size(HEADCOUNT, Side::Left) / 2.0;
    let editing = last_edited.is_some_and(|edited| edited.matches(BIM, Side::Left, Field::Quantity));
    let keep = editing || cell.quantity_user_entered;

    if !keep {
        set_quantity(sheet, config, BIM, Side::Left, bim_hours);
    }
    let Some(cell) = sheet.cell(BIM, Side::Left) else {
        return;
    };
    let current = match cell.quantity_value() {
        q if q != 0.0 => q,
        _ => bim_hours,
    };
    let gross = positive_product(current, cell.unit_price_value());
    set_gross(sheet, config, BIM, Side::Left, gross);
    set_size(sheet, BIM, Side::Left, positive_ratio(current, headcount));
}

/// Fabrication size is hours per head unless the user typed their own.
fn recalculate_fabrication(
    sheet: &mut Sheet,
    config: &RowConfig,
    headcount: f64,
    last_edited: Option<&CellRef>,
) {
    let Some(cell) = sheet.cell(FABRICATION, Side::Left) else {
        return;
    };
    let quantity = cell.quantity_value();
    let gross = positive_product(quantity, cell.unit_price_value());
    let editing =
        last_edited.is_some_and(|edited| edited.matches(FABRICATION, Side::Left, Field::Size));
    let keep_size = editing || cell.size_user_entered;

    set_gross(sheet, config, FABRICATION, Side::Left, gross);
    if !keep_size {
        set_size(sheet, FABRICATION, Side::Left, positive_ratio(quantity, headcount));
    }
}

/// Saved line items of one section, one entry per side holding any data.
pub fn collect_section(sheet: &Sheet, section: u8) -> Vec<Value> {
    let mut items = Vec::new();
    for (index, row) in sheet.rows().iter().enumerate() {
        for side in Side::BOTH {
            let cell = row.cell(side);
            if !has_data(cell) {
                continue;
            }
            let quantity = if cell.quantity_raw.is_empty() {
                &cell.quantity
            } else {
                &cell.quantity_raw
            };
            let mut item = json!({
                "section": section,
                "rowNumber": index + 1,
                "excelRow": row.excel_row,
                "column": side.column_label(),
                "description": cell.description,
                "size": cell.size,
                "quantity": parse_number(quantity),
                "unitPrice": parse_number(&cell.unit_price),
                "gross": cell.gross_value(),
            });
            if let Some(map) = item.as_object_mut() {
                if cell.quantity_user_entered {
                    map.insert("quantityUserEntered".into(), Value::Bool(true));
                }
                if cell.size_user_entered {
                    map.insert("sizeUserEntered".into(), Value::Bool(true));
                }
            }
            items.push(item);
        }
    }
    items
}

fn has_data(cell: &Cell) -> bool {
    [
        &cell.description,
        &cell.quantity,
        &cell.unit_price,
        &cell.size,
        &cell.gross,
    ]
    .iter()
    .any(|text| !text.is_empty())
}

/// Text of a saved value where a falsy value (`0`, `""`, `null`) is empty.
fn saved_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        _ => String::new(),
    }
}

/// Merges saved items into `sheet`, matching by `excelRow` or by position.
pub fn restore_section(sheet: &mut Sheet, items: &[Value], config: &RowConfig) {
    for item in items {
        let excel_row = item
            .get("excelRow")
            .and_then(Value::as_u64)
            .and_then(|row| u32::try_from(row).ok());
        let position = item
            .get("rowNumber")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok()?.checked_sub(1));
        let Some(side) = item
            .get("column")
            .and_then(Value::as_str)
            .and_then(Side::from_column_label)
        else {
            continue;
        };

        let target = excel_row
            .and_then(|excel_row| sheet.position_of(excel_row))
            .or(position.filter(|&p| p < sheet.len()));
        let Some(row) = target.and_then(|target| sheet.row_at_mut(target)) else {
            continue;
        };
        if row.is_comment() {
            continue;
        }
        let whole = config.is_whole_number(row.excel_row, side, Field::Quantity);
        let cell = row.cell_mut(side);

        if item.get("size").is_some_and(|size| !size.is_null()) {
            cell.size = saved_text(item.get("size"));
        }
        let quantity = saved_text(item.get("quantity"));
        cell.quantity = if whole && !quantity.is_empty() {
            format_whole(parse_number(&quantity))
        } else {
            quantity.clone()
        };
        cell.quantity_raw = quantity;
        cell.unit_price = saved_text(item.get("unitPrice"));
        let gross = format_money(parse_number(&saved_text(item.get("gross"))));
        cell.gross_raw = gross.clone();
        cell.gross = gross;

        let description = saved_text(item.get("description"));
        if !cell.description_readonly && !description.is_empty() {
            cell.description = description;
        }
        cell.quantity_user_entered = item
            .get("quantityUserEntered")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        cell.size_user_entered = item
            .get("sizeUserEntered")
            .and_then(Value::as_bool)
            .unwrap_or(false);
    }
    sheet.apply_readonly(config);
}

pub struct EstimateWorksheet {
    metadata: EstimateMetadata,
    config: RowConfig,
    sections: [Sheet; 3],
    totals: EstimateTotals,
}

impl EstimateWorksheet {
    pub fn new(metadata: EstimateMetadata) -> Self {
        Self::with_config(metadata, estimate_config())
    }

    /// Worksheet over `metadata` whose rows follow `config` instead of the
    /// built-in Estimate tables.
    pub fn with_config(metadata: EstimateMetadata, config: RowConfig) -> Self {
        let mut worksheet = EstimateWorksheet {
            metadata,
            config,
            sections: Default::default(),
            totals: EstimateTotals::default(),
        };
        worksheet.reset();
        worksheet
    }

    /// Rows of section `number` (1 to 3).
    pub fn section(&self, number: u8) -> Option<&Sheet> {
        (1..=3)
            .contains(&number)
            .then(|| &self.sections[usize::from(number) - 1])
    }

    pub fn totals(&self) -> &EstimateTotals {
        &self.totals
    }
}

impl Worksheet for EstimateWorksheet {
    fn kind(&self) -> WorksheetKind {
        WorksheetKind::Estimate
    }

    fn collect(&self) -> Result<Value> {
        let t = &self.totals;
        Ok(json!({
            "section1": collect_section(&self.sections[0], 1),
            "section2": collect_section(&self.sections[1], 2),
            "section3": collect_section(&self.sections[2], 3),
            "summary": {
                "section1Subtotal": format!("{:.2}", t.section1_subtotal),
                "section2Subtotal": format!("{:.2}", t.section2_subtotal),
                "section3Subtotal": format!("{:.2}", t.section3_subtotal),
                "grandTotal": format!("{:.2}", t.grand_total),
            },
            "grandTotal": format!("{:.2}", t.grand_total),
        }))
    }

    fn restore(&mut self, body: &Value) -> Result<()> {
        for (index, key) in ["section1", "section2", "section3"].iter().enumerate() {
            if let Some(items) = body.get(*key).and_then(Value::as_array) {
                restore_section(&mut self.sections[index], items, &self.config);
            }
        }
        self.recalculate(None);
        Ok(())
    }

    fn reset(&mut self) {
        let config = &self.config;
        let build = |rows: &[RowMetadata]| Sheet::from_metadata(rows.iter().enumerate(), config);
        self.sections = [
            build(&self.metadata.section1),
            build(&self.metadata.section2),
            build(&self.metadata.section3),
        ];
        self.recalculate(None);
    }

    fn recalculate(&mut self, last_edited: Option<&CellRef>) {
        let config = &self.config;
        let [section1, section2, section3] = &mut self.sections;
        recalculate_section1(section1, config);
        recalculate_section2(section2, config);

        let headcount = section1.quantity(TOTAL_HEADS, Side::Left);
        let material = section1.gross(SECTION1_SUBTOTAL, Side::Left)
            + section2.gross(SECTION2_SUBTOTAL, Side::Left);
        recalculate_section3(section3, config, headcount, material, last_edited);

        for section in self.sections.iter_mut() {
            section.apply_readonly(config);
        }

        let s1 = round_to(self.sections[0].subtotal(), 2);
        let s2 = round_to(self.sections[1].subtotal(), 2);
        let s3 = round_to(self.sections[2].subtotal(), 2);
        self.totals = EstimateTotals {
            section1_subtotal: s1,
            section2_subtotal: s2,
            section3_subtotal: s3,
            grand_total: round_to(s1 + s2 + s3, 2),
        };
        debug!(
            "estimate recalculated: {:.2} + {:.2} + {:.2} = {:.2}",
            s1, s2, s3, self.totals.grand_total
        );
    }

    fn apply_edit(&mut self, target: &EditTarget, value: &str) -> Result<EditResult> {
        let EditTarget::Grid {
            sheet,
            row_id,
            side,
            field,
        } = target
        else {
            return Err(invalid_target(WorksheetKind::Estimate, target));
        };
        let config = &self.config;
        let index = usize::from(*sheet).checked_sub(1);
        let Some(rows) = index.and_then(|index| self.sections.get_mut(index)) else {
            return Err(invalid_target(WorksheetKind::Estimate, target));
        };

        edit_grid_cell(
            rows,
            target,
            *row_id,
            *side,
            *field,
            value,
            GridRules {
                kind: WorksheetKind::Estimate,
                config,
                allow_negative: true,
                percent_cells: &PERCENT_CELLS,
            },
        )
    }

    fn total(&self) -> f64 {
        self.totals.grand_total
    }

    fn summary(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "section1Subtotal".into(),
            Value::String(format_money(self.totals.section1_subtotal)),
        );
        map.insert(
            "section2Subtotal".into(),
            Value::String(format_money(self.totals.section2_subtotal)),
        );
        map.insert(
            "section3Subtotal".into(),
            Value::String(format_money(self.totals.section3_subtotal)),
        );
        map.insert(
            "grandTotal".into(),
            Value::String(format_money(self.totals.grand_total)),
        );
        Value::Object(map)
    }
}
