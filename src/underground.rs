//! The two-sheet Underground worksheet.
//!
//! Sheet 1 is a plain list of line items (`gross = amount × unit price`).
//! Sheet 2 carries the cost roll-up: it starts from the Sheet 1 subtotal,
//! adds material items, tax and cartage, prices the labor hours and then
//! applies assessments, overhead and gain. Every rate lives in a cell of
//! Sheet 2 and is read back from there on each pass.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::cell::{CellRef, Field, Side};
use crate::editor::{GridRules, edit_grid_cell};
use crate::error::Result;
use crate::formula::{DefaultRate, format_money, round_to};
use crate::row::{FieldTable, RowConfig, RowMetadata, SideTable};
use crate::sheet::Sheet;
use crate::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind, invalid_target};

pub const SHEET1_TOTAL: u32 = 71;
pub const SALES_TAX: u32 = 73;
pub const CARTAGE: u32 = 74;
pub const MATERIAL_EQUIP_SUBTOTAL: u32 = 90;
pub const FIELD_ENG_FAB_RIGHT: u32 = 91;
pub const GRAND_TOTAL_MATERIAL: u32 = 92;
pub const LABOR_FACTOR: u32 = 94;
pub const SUBTOTAL_BEFORE_GAIN: u32 = 96;
pub const OVERHEAD: u32 = 97;
pub const SUBTOTAL_AFTER_OVERHEAD: u32 = 99;
pub const GAIN: u32 = 100;
pub const TOTAL_PRICE: u32 = 102;
pub const COMMENTS_LABEL: u32 = 104;
pub const COMMENTS_INPUT: u32 = 105;
pub const EXCLUSIONS_LABEL: u32 = 115;
pub const TOTAL_LABOR_HOURS: u32 = 120;
pub const LABOR_COST: u32 = 122;
pub const ENGINEERING_COST: u32 = 123;
pub const FABRICATION_COST: u32 = 124;
pub const FIELD_ENG_FAB_LEFT: u32 = 126;

const MATERIAL_ITEMS: std::ops::RangeInclusive<u32> = 72..=89;
const EXTRA_RIGHT_ITEMS: std::ops::RangeInclusive<u32> = 75..=88;
const LABOR_HOURS: std::ops::RangeInclusive<u32> = 96..=119;

pub const SALES_TAX_RATE: DefaultRate = DefaultRate::new("sales tax", 0.0825);
pub const CARTAGE_RATE: DefaultRate = DefaultRate::new("cartage", 0.03);
pub const ASSESSMENTS_RATE: DefaultRate = DefaultRate::new("assessments", 0.67);
pub const LABOR_RATE: DefaultRate = DefaultRate::new("labor", 37.09);
pub const ENGINEERING_RATE: DefaultRate = DefaultRate::new("engineering", 28.0);
pub const FABRICATION_RATE: DefaultRate = DefaultRate::new("fabrication", 18.0);
pub const OVERHEAD_RATE: DefaultRate = DefaultRate::new("overhead", 0.0);
pub const GAIN_RATE: DefaultRate = DefaultRate::new("gain", 0.0);
pub const LABOR_FACTOR_DIVISOR: f64 = 8.0;

/// Rate cells of Sheet 2: address, fallback and display precision.
const RATE_CELLS: [(u32, Side, DefaultRate, usize); 8] = [
    (SALES_TAX, Side::Right, SALES_TAX_RATE, 4),
    (CARTAGE, Side::Right, CARTAGE_RATE, 4),
    (GRAND_TOTAL_MATERIAL, Side::Right, ASSESSMENTS_RATE, 2),
    (OVERHEAD, Side::Right, OVERHEAD_RATE, 4),
    (GAIN, Side::Right, GAIN_RATE, 4),
    (LABOR_COST, Side::Left, LABOR_RATE, 2),
    (ENGINEERING_COST, Side::Left, ENGINEERING_RATE, 2),
    (FABRICATION_COST, Side::Left, FABRICATION_RATE, 2),
];

const PERCENT_CELLS: [(u32, Side); 2] = [(OVERHEAD, Side::Right), (GAIN, Side::Right)];

/// Sheet 1 has no formula rows; every unit price stays open.
pub fn sheet1_config() -> RowConfig {
    RowConfig {
        unit_price_always_editable: true,
        ..RowConfig::default()
    }
}

pub fn sheet2_config() -> RowConfig {
    RowConfig {
        whole_number: FieldTable::new(),
        editable: [SALES_TAX, CARTAGE, GRAND_TOTAL_MATERIAL, OVERHEAD, GAIN, LABOR_FACTOR]
            .iter()
            .fold(FieldTable::new(), |table, &row| {
                table.with(row, Side::Right, Field::UnitPrice)
            })
            .with(LABOR_COST, Side::Left, Field::UnitPrice),
        calculated: SideTable::new()
            .with_rows(
                &[
                    SHEET1_TOTAL,
                    GRAND_TOTAL_MATERIAL,
                    LABOR_FACTOR,
                    TOTAL_LABOR_HOURS,
                    LABOR_COST,
                    FIELD_ENG_FAB_LEFT,
                ],
                Side::Left,
            )
            .with_rows(
                &[
                    SHEET1_TOTAL,
                    SALES_TAX,
                    CARTAGE,
                    MATERIAL_EQUIP_SUBTOTAL,
                    FIELD_ENG_FAB_RIGHT,
                    GRAND_TOTAL_MATERIAL,
                    LABOR_FACTOR,
                    SUBTOTAL_BEFORE_GAIN,
                    OVERHEAD,
                    SUBTOTAL_AFTER_OVERHEAD,
                    GAIN,
                    TOTAL_PRICE,
                    COMMENTS_LABEL,
                    EXCLUSIONS_LABEL,
                ],
                Side::Right,
            ),
        unit_price_always_editable: false,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UndergroundMetadata {
    pub sheet1: Vec<RowMetadata>,
    pub sheet2: Vec<RowMetadata>,
}

/// Every intermediate figure of the Sheet 2 roll-up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndergroundTotals {
    pub sheet1_subtotal: f64,
    pub grand_total_material: f64,
    pub sales_tax: f64,
    pub cartage: f64,
    pub total_labor_hours: f64,
    pub labor_cost: f64,
    pub engineering_cost: f64,
    pub fabrication_cost: f64,
    pub field_eng_fab_total: f64,
    pub assessments: f64,
    pub material_equip_subtotal: f64,
    pub labor_factor: f64,
    pub subtotal_before_gain: f64,
    pub overhead: f64,
    pub subtotal_after_overhead: f64,
    pub gain: f64,
    pub total_underground_price: f64,
}

/// Recomputes `gross = quantity × unit price` on every side that is neither a
/// total nor a formula output. Returns Σ(left + right) gross.
pub fn recalculate_line_items(sheet: &mut Sheet, config: &RowConfig) -> f64 {
    let addresses: Vec<u32> = sheet.rows().iter().map(|row| row.excel_row).collect();
    for excel_row in addresses {
        for side in Side::BOTH {
            if config.is_calculated(excel_row, side) {
                continue;
            }
            let whole = config.is_whole_number(excel_row, side, Field::Gross);
            sheet.with_cell(excel_row, side, |cell| {
                if !cell.is_total {
                    let gross = cell.computed_gross();
                    cell.set_gross_amount(gross, whole);
                }
            });
        }
    }
    round_to(sheet.subtotal(), 2)
}

/// Fills empty rate cells with their fallback so the rate in use is visible.
fn fill_rate_cells(sheet: &mut Sheet) {
    for (excel_row, side, rate, digits) in RATE_CELLS {
        sheet.with_cell(excel_row, side, |cell| {
            if cell.unit_price.trim().is_empty() {
                cell.unit_price = format!("{:.*}", digits, rate.value);
            }
        });
    }
}

fn rate(sheet: &Sheet, excel_row: u32, side: Side, default: DefaultRate) -> f64 {
    default.resolve(sheet.unit_price_text(excel_row, side))
}

/// Runs the Sheet 2 roll-up against `sheet1_subtotal`.
pub fn recalculate_sheet2(
    sheet: &mut Sheet,
    config: &RowConfig,
    sheet1_subtotal: f64,
) -> UndergroundTotals {
    let r2 = |value: f64| round_to(value, 2);

    recalculate_line_items(sheet, config);
    fill_rate_cells(sheet);

    let mut t = UndergroundTotals {
        sheet1_subtotal,
        ..Default::default()
    };
    t.grand_total_material = r2(sheet1_subtotal + sheet.sum_gross(Side::Left, MATERIAL_ITEMS));
    t.sales_tax = r2(t.grand_total_material * rate(sheet, SALES_TAX, Side::Right, SALES_TAX_RATE));
    t.cartage = r2(t.grand_total_material * rate(sheet, CARTAGE, Side::Right, CARTAGE_RATE));
    t.total_labor_hours = r2(sheet.sum_gross(Side::Left, LABOR_HOURS));

    t.labor_cost = r2(t.total_labor_hours * rate(sheet, LABOR_COST, Side::Left, LABOR_RATE));
    t.engineering_cost = r2(
        sheet.quantity(ENGINEERING_COST, Side::Left)
            * rate(sheet, ENGINEERING_COST, Side::Left, ENGINEERING_RATE),
    );
    t.fabrication_cost = r2(
        sheet.quantity(FABRICATION_COST, Side::Left)
            * rate(sheet, FABRICATION_COST, Side::Left, FABRICATION_RATE),
    );
    t.field_eng_fab_total = r2(t.labor_cost + t.engineering_cost + t.fabrication_cost);
    t.assessments = r2(
        t.field_eng_fab_total * rate(sheet, GRAND_TOTAL_MATERIAL, Side::Right, ASSESSMENTS_RATE),
    );

    t.material_equip_subtotal = r2(
        t.grand_total_material
            + t.sales_tax
            + t.cartage
            + sheet.sum_gross(Side::Right, EXTRA_RIGHT_ITEMS),
    );
    let labor_factor_amount = r2(t.total_labor_hours / LABOR_FACTOR_DIVISOR);
    t.labor_factor = r2(
        t.total_labor_hours / LABOR_FACTOR_DIVISOR * sheet.unit_price(LABOR_FACTOR, Side::Right),
    );
    t.subtotal_before_gain =
        r2(t.material_equip_subtotal + t.assessments + t.labor_factor + t.field_eng_fab_total);
    t.overhead = r2(t.subtotal_before_gain * rate(sheet, OVERHEAD, Side::Right, OVERHEAD_RATE));
    t.subtotal_after_overhead = r2(t.subtotal_before_gain + t.overhead);
    t.gain = r2(t.subtotal_after_overhead * rate(sheet, GAIN, Side::Right, GAIN_RATE));
    t.total_underground_price = r2(t.subtotal_after_overhead + t.gain);

    let set_gross = |sheet: &mut Sheet, excel_row: u32, side: Side, value: f64| {
        sheet.with_cell(excel_row, side, |cell| cell.set_gross_amount(value, false));
    };
    let set_amount = |sheet: &mut Sheet, excel_row: u32, side: Side, value: f64| {
        sheet.with_cell(excel_row, side, |cell| cell.set_quantity_amount(value, false));
    };

    set_gross(sheet, SHEET1_TOTAL, Side::Left, t.sheet1_subtotal);
    set_gross(sheet, SHEET1_TOTAL, Side::Right, t.grand_total_material);
    set_amount(sheet, SALES_TAX, Side::Right, t.grand_total_material);
    set_gross(sheet, SALES_TAX, Side::Right, t.sales_tax);
    set_amount(sheet, CARTAGE, Side::Right, t.grand_total_material);
    set_gross(sheet, CARTAGE, Side::Right, t.cartage);
    set_gross(sheet, MATERIAL_EQUIP_SUBTOTAL, Side::Right, t.material_equip_subtotal);
    set_gross(sheet, FIELD_ENG_FAB_RIGHT, Side::Right, t.field_eng_fab_total);
    set_amount(sheet, GRAND_TOTAL_MATERIAL, Side::Right, t.field_eng_fab_total);
    set_gross(sheet, GRAND_TOTAL_MATERIAL, Side::Right, t.assessments);
    set_gross(sheet, GRAND_TOTAL_MATERIAL, Side::Left, t.grand_total_material);
    set_amount(sheet, LABOR_FACTOR, Side::Right, labor_factor_amount);
    set_gross(sheet, LABOR_FACTOR, Side::Right, t.labor_factor);
    set_gross(sheet, SUBTOTAL_BEFORE_GAIN, Side::Right, t.subtotal_before_gain);
    set_amount(sheet, OVERHEAD, Side::Right, t.subtotal_before_gain);
    set_gross(sheet, OVERHEAD, Side::Right, t.overhead);
    set_gross(sheet, SUBTOTAL_AFTER_OVERHEAD, Side::Right, t.subtotal_after_overhead);
    set_amount(sheet, GAIN, Side::Right, t.subtotal_after_overhead);
    set_gross(sheet, GAIN, Side::Right, t.gain);
    set_gross(sheet, TOTAL_PRICE, Side::Right, t.total_underground_price);
    set_gross(sheet, TOTAL_LABOR_HOURS, Side::Left, t.total_labor_hours);
    set_amount(sheet, LABOR_COST, Side::Left, t.total_labor_hours);
    set_gross(sheet, LABOR_COST, Side::Left, t.labor_cost);
    set_gross(sheet, ENGINEERING_COST, Side::Left, t.engineering_cost);
    set_gross(sheet, FABRICATION_COST, Side::Left, t.fabrication_cost);
    set_gross(sheet, FIELD_ENG_FAB_LEFT, Side::Left, t.field_eng_fab_total);

    sheet.apply_readonly(config);
    t
}

pub struct UndergroundWorksheet {
    metadata: UndergroundMetadata,
    /// Row tables of Sheet 1 and Sheet 2.
    configs: [RowConfig; 2],
    sheet1: Sheet,
    sheet2: Sheet,
    totals: UndergroundTotals,
}

impl UndergroundWorksheet {
    pub fn new(metadata: UndergroundMetadata) -> Self {
        Self::with_configs(metadata, [sheet1_config(), sheet2_config()])
    }

    pub fn with_configs(metadata: UndergroundMetadata, configs: [RowConfig; 2]) -> Self {
        let mut worksheet = UndergroundWorksheet {
            configs,
            sheet1: Sheet::default(),
            sheet2: Sheet::default(),
            totals: UndergroundTotals::default(),
            metadata,
        };
        worksheet.reset();
        worksheet
    }

    pub fn sheet1(&self) -> &Sheet {
        &self.sheet1
    }

    pub fn sheet2(&self) -> &Sheet {
        &self.sheet2
    }

    pub fn totals(&self) -> &UndergroundTotals {
        &self.totals
    }

    fn sheet_mut(&mut self, number: u8) -> Option<(&mut Sheet, &RowConfig)> {
        let [sheet1_config, sheet2_config] = &self.configs;
        match number {
            1 => Some((&mut self.sheet1, sheet1_config)),
            2 => Some((&mut self.sheet2, sheet2_config)),
            _ => None,
        }
    }
}

impl Worksheet for UndergroundWorksheet {
    fn kind(&self) -> WorksheetKind {
        WorksheetKind::Underground
    }

    fn collect(&self) -> Result<Value> {
        let t = &self.totals;
        Ok(json!({
            "sheet1": {
                "sheetNumber": 1,
                "subTotal": format!("{:.2}", t.sheet1_subtotal),
                "lineItems": serde_json::to_value(self.sheet1.rows())?,
            },
            "sheet2": {
                "sheetNumber": 2,
                "sheet1Subtotal": format!("{:.2}", t.sheet1_subtotal),
                "grandTotalMaterial": format!("{:.2}", t.grand_total_material),
                "salesTax": format!("{:.2}", t.sales_tax),
                "cartage": format!("{:.2}", t.cartage),
                "totalLaborHours": format!("{:.2}", t.total_labor_hours),
                "laborCost": format!("{:.2}", t.labor_cost),
                "engineeringCost": format!("{:.2}", t.engineering_cost),
                "fabricationCost": format!("{:.2}", t.fabrication_cost),
                "fieldEngFabTotal": format!("{:.2}", t.field_eng_fab_total),
                "assessments": format!("{:.2}", t.assessments),
                "laborFactor": format!("{:.2}", t.labor_factor),
                "materialEquipSubtotal": format!("{:.2}", t.material_equip_subtotal),
                "subtotalBeforeGain": format!("{:.2}", t.subtotal_before_gain),
                "overhead": format!("{:.2}", t.overhead),
                "subtotalAfterOverhead": format!("{:.2}", t.subtotal_after_overhead),
                "gain": format!("{:.2}", t.gain),
                "totalUndergroundPrice": format!("{:.2}", t.total_underground_price),
                "lineItems": serde_json::to_value(self.sheet2.rows())?,
            },
            "summary": self.summary(),
        }))
    }

    fn restore(&mut self, body: &Value) -> Result<()> {
        let items = |sheet: &str| {
            body.get(sheet)
                .and_then(|s| s.get("lineItems"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let [sheet1_config, sheet2_config] = &self.configs;
        self.sheet1.restore_line_items(&items("sheet1"), sheet1_config);
        self.sheet2.restore_line_items(&items("sheet2"), sheet2_config);
        self.recalculate(None);
        Ok(())
    }

    fn reset(&mut self) {
        let [sheet1_config, sheet2_config] = &self.configs;
        self.sheet1 = Sheet::from_metadata(self.metadata.sheet1.iter().enumerate(), sheet1_config);
        self.sheet2 = Sheet::from_metadata(self.metadata.sheet2.iter().enumerate(), sheet2_config);
        self.recalculate(None);
    }

    fn recalculate(&mut self, _last_edited: Option<&CellRef>) {
        let [sheet1_config, sheet2_config] = &self.configs;
        let sheet1_subtotal = recalculate_line_items(&mut self.sheet1, sheet1_config);
        self.totals = recalculate_sheet2(&mut self.sheet2, sheet2_config, sheet1_subtotal);
        debug!(
            "underground recalculated: sheet1 {:.2}, total {:.2}",
            sheet1_subtotal, self.totals.total_underground_price
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
            return Err(invalid_target(WorksheetKind::Underground, target));
        };
        let percent_cells: &[(u32, Side)] = if *sheet == 2 { &PERCENT_CELLS } else { &[] };
        let Some((rows, config)) = self.sheet_mut(*sheet) else {
            return Err(invalid_target(WorksheetKind::Underground, target));
        };

        edit_grid_cell(
            rows,
            target,
            *row_id,
            *side,
            *field,
            value,
            GridRules {
                kind: WorksheetKind::Underground,
                config,
                allow_negative: false,
                percent_cells,
            },
        )
    }

    fn total(&self) -> f64 {
        self.totals.total_underground_price
    }

    fn summary(&self) -> Value {
        json!({
            "sheet1Subtotal": format_money(self.totals.sheet1_subtotal),
            "sheet2Total": format_money(self.totals.total_underground_price),
            "grandTotal": format_money(self.totals.total_underground_price),
        })
    }
}
