//! ITM (inspection, testing and maintenance) bid worksheet.
//!
//! Left columns price alarm work, right columns sprinkler work. Every side is
//! `quantity × hours`; labor hours feed the first rates row, and the quote is
//! the subtotal marked up by the gain fraction of each column.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::cell::{CellRef, Side};
use crate::editor::READONLY_WARNING;
use crate::error::{Result, WorksheetError};
use crate::formula::{parse_number, round_to};
use crate::sheet::value_text;
use crate::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind, invalid_target};

pub const DEFAULT_ALARM_GAIN: f64 = 0.2;
pub const DEFAULT_SPRINKLER_GAIN: f64 = 0.1;
/// Row whose quantity is the total labor hours instead of user input.
pub const LABOR_MIX_RATE_ROW: u32 = 41;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ItmSection {
    Labor,
    Equipment,
    Rates,
}

impl FromStr for ItmSection {
    type Err = WorksheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "labor" | "laborfactor" => Ok(ItmSection::Labor),
            "equipment" | "equipmentfactor" => Ok(ItmSection::Equipment),
            "rates" => Ok(ItmSection::Rates),
            other => Err(WorksheetError::NotFound(format!("ITM section '{}'", other))),
        }
    }
}

impl fmt::Display for ItmSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ItmSection::Labor => "labor",
            ItmSection::Equipment => "equipment",
            ItmSection::Rates => "rates",
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItmItemMetadata {
    pub id: String,
    pub row_number: u32,
    /// `"Left"` or `"Right"`.
    pub column: String,
    pub description: String,
    pub default_hours: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItmMetadata {
    pub labor_factor: Vec<ItmItemMetadata>,
    pub equipment_factor: Vec<ItmItemMetadata>,
    pub rates: Vec<ItmItemMetadata>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItmSide {
    pub id: String,
    pub description: String,
    pub quantity: f64,
    pub hours: f64,
    pub total: String,
}

impl Default for ItmSide {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: String::new(),
            quantity: 0.0,
            hours: 0.0,
            total: "0.00".to_string(),
        }
    }
}

impl ItmSide {
    fn from_metadata(item: Option<&ItmItemMetadata>) -> Self {
        match item {
            Some(item) => ItmSide {
                id: item.id.clone(),
                description: item.description.clone(),
                hours: item.default_hours,
                ..ItmSide::default()
            },
            None => ItmSide::default(),
        }
    }

    /// `quantity × hours`, shown as `"0.00"` unless positive.
    fn refresh_total(&mut self) {
        let total = self.quantity * self.hours;
        self.total = if total > 0.0 {
            format!("{:.2}", total)
        } else {
            "0.00".to_string()
        };
    }

    fn total_value(&self) -> f64 {
        parse_number(&self.total)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItmRow {
    pub row_number: u32,
    pub is_labor_mix_rate: bool,
    pub left: ItmSide,
    pub right: ItmSide,
}

impl ItmRow {
    pub fn side(&self, side: Side) -> &ItmSide {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut ItmSide {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Pairs metadata items by row number, in ascending row order.
pub fn build_rows(items: &[ItmItemMetadata]) -> Vec<ItmRow> {
    let mut grouped: BTreeMap<u32, (Option<&ItmItemMetadata>, Option<&ItmItemMetadata>)> =
        BTreeMap::new();
    for item in items {
        let entry = grouped.entry(item.row_number).or_default();
        match Side::from_column_label(&item.column) {
            Some(Side::Left) => entry.0 = Some(item),
            _ => entry.1 = Some(item),
        }
    }

    grouped
        .into_iter()
        .map(|(row_number, (left, right))| ItmRow {
            row_number,
            is_labor_mix_rate: row_number == LABOR_MIX_RATE_ROW,
            left: ItmSide::from_metadata(left),
            right: ItmSide::from_metadata(right),
        })
        .collect()
}

fn sum_column(rows: &[ItmRow], side: Side) -> f64 {
    rows.iter().map(|row| row.side(side).total_value()).sum()
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ItmTotals {
    pub alarm_labor_hours: f64,
    pub sprinkler_labor_hours: f64,
    pub alarm_equipment_cost: f64,
    pub sprinkler_equipment_cost: f64,
    pub alarm_subtotal: f64,
    pub sprinkler_subtotal: f64,
    pub alarm_total_quote: f64,
    pub sprinkler_total_quote: f64,
}

pub struct ItmWorksheet {
    metadata: ItmMetadata,
    labor_rows: Vec<ItmRow>,
    equipment_rows: Vec<ItmRow>,
    rates_rows: Vec<ItmRow>,
    alarm_gain: f64,
    sprinkler_gain: f64,
    totals: ItmTotals,
}

impl ItmWorksheet {
    pub fn new(metadata: ItmMetadata) -> Self {
        let mut worksheet = ItmWorksheet {
            metadata,
            labor_rows: Vec::new(),
            equipment_rows: Vec::new(),
            rates_rows: Vec::new(),
            alarm_gain: DEFAULT_ALARM_GAIN,
            sprinkler_gain: DEFAULT_SPRINKLER_GAIN,
            totals: ItmTotals::default(),
        };
        worksheet.reset();
        worksheet
    }

    pub fn totals(&self) -> &ItmTotals {
        &self.totals
    }

    pub fn rows(&self, section: ItmSection) -> &[ItmRow] {
        match section {
            ItmSection::Labor => &self.labor_rows,
            ItmSection::Equipment => &self.equipment_rows,
            ItmSection::Rates => &self.rates_rows,
        }
    }

    fn rows_mut(&mut self, section: ItmSection) -> &mut Vec<ItmRow> {
        match section {
            ItmSection::Labor => &mut self.labor_rows,
            ItmSection::Equipment => &mut self.equipment_rows,
            ItmSection::Rates => &mut self.rates_rows,
        }
    }

    pub fn gains(&self) -> (f64, f64) {
        (self.alarm_gain, self.sprinkler_gain)
    }
}

/// Copies saved rows into `rows` by position.
fn restore_rows(rows: &mut [ItmRow], saved: &[Value]) {
    for (row, saved_row) in rows.iter_mut().zip(saved) {
        for side in Side::BOTH {
            let Some(saved_side) = saved_row.get(side.to_string()) else {
                continue;
            };
            let target = row.side_mut(side);
            let number = |key: &str| value_text(saved_side.get(key)).map(|text| parse_number(&text));

            target.quantity = number("quantity").unwrap_or(0.0);
            if let Some(hours) = number("hours").filter(|h| *h != 0.0) {
                target.hours = hours;
            }
            target.total = value_text(saved_side.get("total"))
                .filter(|total| !total.is_empty())
                .unwrap_or_else(|| "0.00".to_string());
        }
    }
}

impl Worksheet for ItmWorksheet {
    fn kind(&self) -> WorksheetKind {
        WorksheetKind::Itm
    }

    fn collect(&self) -> Result<Value> {
        let t = &self.totals;
        Ok(json!({
            "laborFactorRows": serde_json::to_value(&self.labor_rows)?,
            "equipmentFactorRows": serde_json::to_value(&self.equipment_rows)?,
            "ratesRows": serde_json::to_value(&self.rates_rows)?,
            "alarmGainPercent": self.alarm_gain,
            "sprinklerGainPercent": self.sprinkler_gain,
            "totals": {
                "totalAlarmLaborHours": format!("{:.2}", t.alarm_labor_hours),
                "totalSprinklerLaborHours": format!("{:.2}", t.sprinkler_labor_hours),
                "totalAlarmEquipmentCost": format!("{:.2}", t.alarm_equipment_cost),
                "totalSprinklerEquipmentCost": format!("{:.2}", t.sprinkler_equipment_cost),
                "alarmSubtotal": format!("{:.2}", t.alarm_subtotal),
                "sprinklerSubtotal": format!("{:.2}", t.sprinkler_subtotal),
                "alarmTotalQuote": format!("{:.2}", t.alarm_total_quote),
                "sprinklerTotalQuote": format!("{:.2}", t.sprinkler_total_quote),
            },
        }))
    }

    fn restore(&mut self, body: &Value) -> Result<()> {
        let saved = |key: &str| body.get(key).and_then(Value::as_array);
        if let Some(rows) = saved("laborFactorRows") {
            restore_rows(&mut self.labor_rows, rows);
        }
        if let Some(rows) = saved("equipmentFactorRows") {
            restore_rows(&mut self.equipment_rows, rows);
        }
        if let Some(rows) = saved("ratesRows") {
            restore_rows(&mut self.rates_rows, rows);
        }
        if let Some(gain) = body.get("alarmGainPercent").and_then(Value::as_f64) {
            self.alarm_gain = gain;
        }
        if let Some(gain) = body.get("sprinklerGainPercent").and_then(Value::as_f64) {
            self.sprinkler_gain = gain;
        }
        self.recalculate(None);
        Ok(())
    }

    fn reset(&mut self) {
        self.labor_rows = build_rows(&self.metadata.labor_factor);
        self.equipment_rows = build_rows(&self.metadata.equipment_factor);
        self.rates_rows = build_rows(&self.metadata.rates);
        self.alarm_gain = DEFAULT_ALARM_GAIN;
        self.sprinkler_gain = DEFAULT_SPRINKLER_GAIN;
        self.recalculate(None);
    }

    fn recalculate(&mut self, _last_edited: Option<&CellRef>) {
        for rows in [
            &mut self.labor_rows,
            &mut self.equipment_rows,
            &mut self.rates_rows,
        ] {
            for row in rows.iter_mut() {
                row.left.refresh_total();
                row.right.refresh_total();
            }
        }

        let r2 = |v: f64| round_to(v, 2);
        let mut t = ItmTotals {
            alarm_labor_hours: r2(sum_column(&self.labor_rows, Side::Left)),
            sprinkler_labor_hours: r2(sum_column(&self.labor_rows, Side::Right)),
            alarm_equipment_cost: r2(sum_column(&self.equipment_rows, Side::Left)),
            sprinkler_equipment_cost: r2(sum_column(&self.equipment_rows, Side::Right)),
            ..ItmTotals::default()
        };

        if let Some(first) = self.rates_rows.first_mut() {
            for (side, hours) in [
                (Side::Left, t.alarm_labor_hours),
                (Side::Right, t.sprinkler_labor_hours),
            ] {
                let cell = first.side_mut(side);
                cell.quantity = hours;
                cell.total = format!("{:.2}", cell.quantity * cell.hours);
            }
        }

        t.alarm_subtotal = r2(t.alarm_equipment_cost + sum_column(&self.rates_rows, Side::Left));
        t.sprinkler_subtotal =
            r2(t.sprinkler_equipment_cost + sum_column(&self.rates_rows, Side::Right));
        t.alarm_total_quote = r2(t.alarm_subtotal * (1.0 + self.alarm_gain));
        t.sprinkler_total_quote = r2(t.sprinkler_subtotal * (1.0 + self.sprinkler_gain));
        self.totals = t;

        debug!(
            "itm recalculated: alarm quote {:.2}, sprinkler quote {:.2}",
            t.alarm_total_quote, t.sprinkler_total_quote
        );
    }

    fn apply_edit(&mut self, target: &EditTarget, value: &str) -> Result<EditResult> {
        let kind = WorksheetKind::Itm;
        match target {
            EditTarget::ItmCell {
                section,
                row_number,
                side,
                field,
            } => {
                let section: ItmSection = section
                    .parse()
                    .map_err(|_| invalid_target(kind, target))?;
                let is_first_rates_row = section == ItmSection::Rates
                    && self.rates_rows.first().map(|row| row.row_number) == Some(*row_number);
                let row = self
                    .rows_mut(section)
                    .iter_mut()
                    .find(|row| row.row_number == *row_number)
                    .ok_or_else(|| invalid_target(kind, target))?;
                let locked = is_first_rates_row || row.is_labor_mix_rate;
                let number = parse_number(value);
                let cell = row.side_mut(*side);
                match field.as_str() {
                    "quantity" if locked => {
                        return Ok(EditResult::rejected(READONLY_WARNING));
                    }
                    "quantity" => cell.quantity = number,
                    "hours" => cell.hours = number,
                    _ => return Err(invalid_target(kind, target)),
                }
                cell.refresh_total();
            }
            EditTarget::ItmGain { side } => {
                let gain = parse_number(value);
                match side {
                    Side::Left => self.alarm_gain = gain,
                    Side::Right => self.sprinkler_gain = gain,
                }
            }
            _ => return Err(invalid_target(kind, target)),
        }
        Ok(EditResult::applied(None))
    }

    fn total(&self) -> f64 {
        round_to(
            self.totals.alarm_total_quote + self.totals.sprinkler_total_quote,
            2,
        )
    }

    fn summary(&self) -> Value {
        let t = &self.totals;
        json!({
            "alarmTotalQuote": format!("{:.2}", t.alarm_total_quote),
            "sprinklerTotalQuote": format!("{:.2}", t.sprinkler_total_quote),
            "totalAlarmLaborHours": format!("{:.2}", t.alarm_labor_hours),
            "totalSprinklerLaborHours": format!("{:.2}", t.sprinkler_labor_hours),
        })
    }
}
