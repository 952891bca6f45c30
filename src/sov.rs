//! Schedule of Values: per-building, per-floor breakdown of the bid.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::cell::CellRef;
use crate::error::Result;
use crate::formula::{parse_optional, round_to};
use crate::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind, invalid_target};

pub const MAX_BUILDINGS: u32 = 200;

/// Summary rows whose value is the sum of the matching building categories.
pub const AUTO_CALC_LABELS: [&str; 4] = [
    "3D BIM (LUMP)",
    "PUMP MATERIAL",
    "PUMP ROUGH IN",
    "STANDPIPE AND FHV (BY FLOOR / BY BUILDING)",
];

pub const FLOOR_KEYS: [&str; 10] = [
    "ground", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

/// One amount per floor, ground floor first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FloorValues {
    pub ground: f64,
    pub second: f64,
    pub third: f64,
    pub fourth: f64,
    pub fifth: f64,
    pub sixth: f64,
    pub seventh: f64,
    pub eighth: f64,
    pub ninth: f64,
    pub tenth: f64,
}

impl FloorValues {
    fn slots(&self) -> [f64; 10] {
        [
            self.ground,
            self.second,
            self.third,
            self.fourth,
            self.fifth,
            self.sixth,
            self.seventh,
            self.eighth,
            self.ninth,
            self.tenth,
        ]
    }

    pub fn get(&self, floor: &str) -> Option<f64> {
        FLOOR_KEYS
            .iter()
            .position(|key| *key == floor)
            .map(|i| self.slots()[i])
    }

    pub fn get_mut(&mut self, floor: &str) -> Option<&mut f64> {
        match floor {
            "ground" => Some(&mut self.ground),
            "second" => Some(&mut self.second),
            "third" => Some(&mut self.third),
            "fourth" => Some(&mut self.fourth),
            "fifth" => Some(&mut self.fifth),
            "sixth" => Some(&mut self.sixth),
            "seventh" => Some(&mut self.seventh),
            "eighth" => Some(&mut self.eighth),
            "ninth" => Some(&mut self.ninth),
            "tenth" => Some(&mut self.tenth),
            _ => None,
        }
    }

    pub fn sum(&self) -> f64 {
        self.slots().iter().sum()
    }

    fn add(&mut self, other: &FloorValues) {
        for key in FLOOR_KEYS {
            if let (Some(slot), Some(value)) = (self.get_mut(key), other.get(key)) {
                *slot += value;
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryRowMetadata {
    pub id: String,
    pub label: String,
    pub mirrors_building: Option<bool>,
    pub default_value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryMetadata {
    pub id: String,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SovMetadata {
    pub summary_rows: Vec<SummaryRowMetadata>,
    /// Category rows of each building; the summary rows are used when empty.
    pub building_rows: Vec<CategoryMetadata>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryRow {
    pub id: String,
    pub label: String,
    pub mirrors_building: bool,
    pub value: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryRow {
    pub id: String,
    pub label: String,
    pub values: FloorValues,
    pub total: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Building {
    pub id: String,
    pub label: String,
    pub category_rows: Vec<CategoryRow>,
    pub total: f64,
    pub floor_totals: FloorValues,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOverview {
    pub job_name: String,
    pub number_of_buildings: u32,
    /// Any other job fields the user filled in.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for JobOverview {
    fn default() -> Self {
        Self {
            job_name: String::new(),
            number_of_buildings: 1,
            extra: Map::new(),
        }
    }
}

/// Spreadsheet-style column name: 1 → `A`, 26 → `Z`, 27 → `AA`.
pub fn column_name(index: u32) -> String {
    let mut name = Vec::new();
    let mut i = index;
    while i > 0 {
        let rem = (i - 1) % 26;
        name.push(char::from(b'A' + rem as u8));
        i = (i - 1) / 26;
    }
    name.iter().rev().collect()
}

/// Amount typed by the user; negative or unparseable input is zero.
pub fn sanitize_amount(value: &str) -> f64 {
    parse_optional(value).filter(|v| *v >= 0.0).unwrap_or(0.0)
}

/// Building count typed by the user, floored and clamped to `1..=200`.
/// Empty or unparseable input counts as one building.
pub fn clamp_building_count(value: &str) -> u32 {
    parse_optional(value).map(clamp_count).unwrap_or(1)
}

fn clamp_count(value: f64) -> u32 {
    value.floor().clamp(1.0, f64::from(MAX_BUILDINGS)) as u32
}

pub struct SovWorksheet {
    metadata: SovMetadata,
    job_overview: JobOverview,
    summary_rows: Vec<SummaryRow>,
    buildings: Vec<Building>,
    total_sov: f64,
}

impl SovWorksheet {
    pub fn new(metadata: SovMetadata) -> Self {
        let mut worksheet = SovWorksheet {
            metadata,
            job_overview: JobOverview::default(),
            summary_rows: Vec::new(),
            buildings: Vec::new(),
            total_sov: 0.0,
        };
        worksheet.reset();
        worksheet
    }

    pub fn job_overview(&self) -> &JobOverview {
        &self.job_overview
    }

    pub fn summary_rows(&self) -> &[SummaryRow] {
        &self.summary_rows
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn total_sov(&self) -> f64 {
        self.total_sov
    }

    fn new_building(&self, number: u32) -> Building {
        let categories: Vec<CategoryMetadata> = if self.metadata.building_rows.is_empty() {
            self.metadata
                .summary_rows
                .iter()
                .map(|row| CategoryMetadata {
                    id: row.id.clone(),
                    label: row.label.clone(),
                })
                .collect()
        } else {
            self.metadata.building_rows.clone()
        };

        Building {
            id: format!("building-{}", number - 1),
            label: format!("{} | {}", column_name(number), number),
            category_rows: categories
                .into_iter()
                .map(|category| CategoryRow {
                    id: category.id,
                    label: category.label,
                    ..CategoryRow::default()
                })
                .collect(),
            ..Building::default()
        }
    }

    /// Grows by appending fresh buildings or shrinks by truncating.
    pub fn set_building_count(&mut self, count: u32) {
        let count = count.clamp(1, MAX_BUILDINGS);
        self.job_overview.number_of_buildings = count;
        let current = self.buildings.len() as u32;
        if count > current {
            for number in current + 1..=count {
                let building = self.new_building(number);
                self.buildings.push(building);
            }
        } else {
            self.buildings.truncate(count as usize);
        }
    }

    fn refresh_buildings(&mut self) {
        for building in &mut self.buildings {
            let mut floor_totals = FloorValues::default();
            for row in &mut building.category_rows {
                row.total = row.values.sum();
                floor_totals.add(&row.values);
            }
            building.total = building.category_rows.iter().map(|row| row.total).sum();
            building.floor_totals = floor_totals;
        }
    }

    fn refresh_summary(&mut self) {
        let mut by_id: Vec<(&str, f64)> = Vec::new();
        let mut by_label: Vec<(&str, f64)> = Vec::new();
        for building in &self.buildings {
            for row in &building.category_rows {
                if !row.id.is_empty() {
                    add_total(&mut by_id, &row.id, row.total);
                }
                if !row.label.is_empty() {
                    add_total(&mut by_label, &row.label, row.total);
                }
            }
        }

        let updates: Vec<Option<f64>> = self
            .summary_rows
            .iter()
            .map(|row| {
                if !AUTO_CALC_LABELS.contains(&row.label.as_str()) {
                    return None;
                }
                let lookup = |table: &[(&str, f64)], key: &str| {
                    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
                };
                Some(
                    lookup(&by_id, &row.id)
                        .filter(|_| !row.id.is_empty())
                        .or_else(|| lookup(&by_label, &row.label))
                        .unwrap_or(row.value),
                )
            })
            .collect();

        for (row, update) in self.summary_rows.iter_mut().zip(updates) {
            if let Some(value) = update {
                row.value = value;
            }
        }
        self.total_sov = round_to(self.summary_rows.iter().map(|row| row.value).sum(), 2);
    }
}

fn add_total<'a>(table: &mut Vec<(&'a str, f64)>, key: &'a str, total: f64) {
    match table.iter_mut().find(|(k, _)| *k == key) {
        Some((_, sum)) => *sum += total,
        None => table.push((key, total)),
    }
}

impl Worksheet for SovWorksheet {
    fn kind(&self) -> WorksheetKind {
        WorksheetKind::ScheduleOfValues
    }

    fn collect(&self) -> Result<Value> {
        Ok(json!({
            "jobOverview": serde_json::to_value(&self.job_overview)?,
            "summaryRows": serde_json::to_value(&self.summary_rows)?,
            "buildings": serde_json::to_value(&self.buildings)?,
            "summary": { "totalSOV": format!("{:.2}", self.total_sov) },
        }))
    }

    fn restore(&mut self, body: &Value) -> Result<()> {
        if let Some(overview) = body.get("jobOverview") {
            if let Some(name) = overview.get("jobName").and_then(Value::as_str) {
                if !name.trim().is_empty() {
                    self.job_overview.job_name = name.to_string();
                }
            }
            if let Some(count) = overview.get("numberOfBuildings").and_then(Value::as_f64) {
                self.job_overview.number_of_buildings = clamp_count(count);
            }
        }

        let non_empty = |key: &str| {
            body.get(key)
                .and_then(Value::as_array)
                .filter(|items| !items.is_empty())
                .cloned()
        };
        if let Some(rows) = non_empty("summaryRows") {
            self.summary_rows = serde_json::from_value(Value::Array(rows))?;
        }
        if let Some(buildings) = non_empty("buildings") {
            self.buildings = serde_json::from_value(Value::Array(buildings))?;
        }
        let count = self.job_overview.number_of_buildings;
        self.set_building_count(count);
        self.recalculate(None);
        Ok(())
    }

    fn reset(&mut self) {
        self.job_overview = JobOverview::default();
        self.summary_rows = self
            .metadata
            .summary_rows
            .iter()
            .map(|row| SummaryRow {
                id: row.id.clone(),
                label: row.label.clone(),
                mirrors_building: row.mirrors_building.unwrap_or(true),
                value: row.default_value,
            })
            .collect();
        self.buildings.clear();
        self.set_building_count(1);
        self.recalculate(None);
    }

    fn recalculate(&mut self, _last_edited: Option<&CellRef>) {
        self.refresh_buildings();
        self.refresh_summary();
        debug!(
            "sov recalculated: {} buildings, total {:.2}",
            self.buildings.len(),
            self.total_sov
        );
    }

    fn apply_edit(&mut self, target: &EditTarget, value: &str) -> Result<EditResult> {
        let kind = WorksheetKind::ScheduleOfValues;
        match target {
            EditTarget::SovSummary { row_id } => {
                let row = self
                    .summary_rows
                    .iter_mut()
                    .find(|row| &row.id == row_id)
                    .ok_or_else(|| invalid_target(kind, target))?;
                row.value = sanitize_amount(value);
            }
            EditTarget::SovBuildingCell {
                building,
                category,
                floor,
            } => {
                let slot = self
                    .buildings
                    .iter_mut()
                    .find(|b| &b.id == building)
                    .and_then(|b| b.category_rows.iter_mut().find(|row| &row.id == category))
                    .and_then(|row| row.values.get_mut(floor))
                    .ok_or_else(|| invalid_target(kind, target))?;
                *slot = sanitize_amount(value);
            }
            EditTarget::SovBuildingCount => {
                self.set_building_count(clamp_building_count(value));
            }
            EditTarget::SovJobField { name } => match name.as_str() {
                "jobName" => self.job_overview.job_name = value.to_string(),
                "numberOfBuildings" => self.set_building_count(clamp_building_count(value)),
                other => {
                    self.job_overview
                        .extra
                        .insert(other.to_string(), Value::String(value.to_string()));
                }
            },
            _ => return Err(invalid_target(kind, target)),
        }
        Ok(EditResult::applied(None))
    }

    fn total(&self) -> f64 {
        self.total_sov
    }

    fn summary(&self) -> Value {
        json!({
            "totalSOV": format!("{:.2}", self.total_sov),
            "buildingTotal": format!(
                "{:.2}",
                self.buildings.iter().map(|b| b.total).sum::<f64>()
            ),
            "numberOfBuildings": self.buildings.len(),
        })
    }

    /// Seeds an empty job name from the Design worksheet.
    fn link(&mut self, peer: WorksheetKind, body: &Value) {
        if peer != WorksheetKind::Design || !self.job_overview.job_name.trim().is_empty() {
            return;
        }
        let name = body
            .get("formData")
            .and_then(|form| form.get("jobName"))
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty());
        if let Some(name) = name {
            debug!("sov job name taken from design worksheet");
            self.job_overview.job_name = name.to_string();
        }
    }
}
