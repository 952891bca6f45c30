//! Row templates for every worksheet kind.
//!
//! A deployment can drop `<slug>.json` files into the metadata directory to
//! replace a template; anything missing falls back to the built-in layout.

use log::{debug, info};
use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::cell::Side;
use crate::design::DesignWorksheet;
use crate::error::{Result, WorksheetError};
use crate::estimate::{EstimateMetadata, EstimateWorksheet};
use crate::itm::{ItmItemMetadata, ItmMetadata, ItmWorksheet};
use crate::row::RowMetadata;
use crate::sov::{SovMetadata, SovWorksheet, SummaryRowMetadata};
use crate::underground::{UndergroundMetadata, UndergroundWorksheet};
use crate::worksheet::{Worksheet, WorksheetKind};

/// Metadata of one worksheet, ready to build rows from.
#[derive(Clone, Debug, PartialEq)]
pub enum WorksheetMetadata {
    Underground(UndergroundMetadata),
    Estimate(EstimateMetadata),
    ScheduleOfValues(SovMetadata),
    Design,
    Itm(ItmMetadata),
}

impl WorksheetMetadata {
    pub fn kind(&self) -> WorksheetKind {
        match self {
            WorksheetMetadata::Underground(_) => WorksheetKind::Underground,
            WorksheetMetadata::Estimate(_) => WorksheetKind::Estimate,
            WorksheetMetadata::ScheduleOfValues(_) => WorksheetKind::ScheduleOfValues,
            WorksheetMetadata::Design => WorksheetKind::Design,
            WorksheetMetadata::Itm(_) => WorksheetKind::Itm,
        }
    }

    /// Builds a fresh worksheet with every pipeline already run once.
    pub fn build(self) -> Box<dyn Worksheet> {
        match self {
            WorksheetMetadata::Underground(m) => Box::new(UndergroundWorksheet::new(m)),
            WorksheetMetadata::Estimate(m) => Box::new(EstimateWorksheet::new(m)),
            WorksheetMetadata::ScheduleOfValues(m) => Box::new(SovWorksheet::new(m)),
            WorksheetMetadata::Design => Box::new(DesignWorksheet::new()),
            WorksheetMetadata::Itm(m) => Box::new(ItmWorksheet::new(m)),
        }
    }

    fn from_json(kind: WorksheetKind, value: Value) -> Result<Self> {
        let metadata = match kind {
            WorksheetKind::Underground => {
                WorksheetMetadata::Underground(serde_json::from_value(value)?)
            }
            WorksheetKind::Estimate => WorksheetMetadata::Estimate(serde_json::from_value(value)?),
            WorksheetKind::ScheduleOfValues => {
                WorksheetMetadata::ScheduleOfValues(serde_json::from_value(value)?)
            }
            WorksheetKind::Design => WorksheetMetadata::Design,
            WorksheetKind::Itm => WorksheetMetadata::Itm(serde_json::from_value(value)?),
        };
        metadata.validate()?;
        Ok(metadata)
    }

    /// Every grid row needs a spreadsheet address for the formulas to find it.
    fn validate(&self) -> Result<()> {
        let kind = self.kind();
        let grids: Vec<&[RowMetadata]> = match self {
            WorksheetMetadata::Underground(m) => vec![&m.sheet1, &m.sheet2],
            WorksheetMetadata::Estimate(m) => vec![&m.section1, &m.section2, &m.section3],
            _ => Vec::new(),
        };
        for rows in grids {
            if let Some(position) = rows.iter().position(|row| row.excel_row == 0) {
                return Err(WorksheetError::InvalidMetadata {
                    kind,
                    message: format!("row {} has no excelRow", position),
                });
            }
        }
        Ok(())
    }
}

/// Reads `<dir>/<slug>.json` when it exists, else the built-in template.
pub fn load_metadata(dir: Option<&Path>, kind: WorksheetKind) -> Result<WorksheetMetadata> {
    if let Some(dir) = dir {
        let path = dir.join(format!("{}.json", kind.slug()));
        if path.exists() {
            info!("loading {} metadata from {}", kind, path.display());
            let value: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
            return WorksheetMetadata::from_json(kind, value);
        }
        debug!("no {} metadata at {}, using built-in", kind, path.display());
    }
    Ok(builtin(kind))
}

pub fn builtin(kind: WorksheetKind) -> WorksheetMetadata {
    match kind {
        WorksheetKind::Underground => WorksheetMetadata::Underground(underground()),
        WorksheetKind::Estimate => WorksheetMetadata::Estimate(estimate()),
        WorksheetKind::ScheduleOfValues => WorksheetMetadata::ScheduleOfValues(sov()),
        WorksheetKind::Design => WorksheetMetadata::Design,
        WorksheetKind::Itm => WorksheetMetadata::Itm(itm()),
    }
}

/// Rows `range`, described from `left`/`right` where listed, blank elsewhere.
fn rows_between(
    range: std::ops::RangeInclusive<u32>,
    section: u8,
    left: &[(u32, &str, &str)],
    right: &[(u32, &str, &str)],
) -> Vec<RowMetadata> {
    range
        .map(|excel_row| {
            let mut row = RowMetadata::new(excel_row).in_section(section);
            if let Some((_, description, price)) = left.iter().find(|(r, _, _)| *r == excel_row) {
                row = row
                    .with_left(description)
                    .with_default_price(Side::Left, price);
            }
            if let Some((_, description, price)) = right.iter().find(|(r, _, _)| *r == excel_row) {
                row = row
                    .with_right(description)
                    .with_default_price(Side::Right, price);
            }
            row
        })
        .collect()
}

fn mark_totals(rows: &mut [RowMetadata], totals: &[u32]) {
    for row in rows.iter_mut() {
        if totals.contains(&row.excel_row) {
            row.left.is_total_row = true;
        }
    }
}

fn underground() -> UndergroundMetadata {
    let sheet1 = rows_between(
        5..=40,
        1,
        &[
            (5, "4\" DIP", "38.50"),
            (6, "6\" DIP", "46.00"),
            (7, "8\" DIP", "61.25"),
            (8, "10\" DIP", "78.00"),
            (9, "12\" DIP", "96.40"),
            (11, "4\" C900", "14.75"),
            (12, "6\" C900", "21.30"),
            (13, "8\" C900", "33.10"),
            (15, "FITTINGS (LBS)", "4.20"),
            (16, "MEGALUGS", "62.00"),
            (17, "THRUST BLOCKS", "145.00"),
        ],
        &[
            (5, "FIRE HYDRANT", "3850.00"),
            (6, "POST INDICATOR VALVE", "2475.00"),
            (7, "GATE VALVE 6\"", "1320.00"),
            (8, "GATE VALVE 8\"", "1890.00"),
            (9, "TAPPING SLEEVE & VALVE", "4600.00"),
            (10, "VALVE BOX", "185.00"),
            (12, "FDC FREE STANDING", "1750.00"),
            (13, "CHECK VALVE", "980.00"),
            (15, "TRACER WIRE", "0.45"),
            (16, "WARNING TAPE", "0.30"),
        ],
    );

    let mut sheet2 = rows_between(
        71..=126,
        2,
        &[
            (71, "SHEET #1 TOTAL", ""),
            (72, "BEDDING SAND (TONS)", "32.00"),
            (73, "BACKFILL (TONS)", "24.00"),
            (74, "ASPHALT PATCH (SF)", "9.50"),
            (75, "CONCRETE PATCH (SF)", "12.00"),
            (92, "GRAND TOTAL MATERIAL", ""),
            (96, "LAYOUT (HRS/EA)", "2.00"),
            (97, "TRENCHING (HRS/LF)", "0.08"),
            (98, "PIPE INSTALL (HRS/LF)", "0.12"),
            (99, "HYDRANT SET (HRS/EA)", "6.00"),
            (100, "VALVE SET (HRS/EA)", "3.00"),
            (101, "TESTING (HRS/EA)", "8.00"),
            (102, "RESTORATION (HRS/EA)", "4.00"),
            (120, "TOTAL LABOR HOURS", ""),
            (122, "LABOR", ""),
            (123, "ENGINEERING", ""),
            (124, "FABRICATION", ""),
            (126, "FIELD, ENG., FAB. TOTAL", ""),
        ],
        &[
            (71, "MATERIAL SUBTOTAL", ""),
            (73, "SALES TAX", ""),
            (74, "CARTAGE", ""),
            (75, "BACKHOE RENTAL", "650.00"),
            (76, "TRENCHER RENTAL", "425.00"),
            (77, "DUMP TRUCK", "380.00"),
            (78, "SAW CUTTING (LF)", "3.25"),
            (79, "TRAFFIC CONTROL", "950.00"),
            (80, "PERMITS", "1.00"),
            (83, "PUMP", "1.00"),
            (84, "FHV / STANDPIPE", "1.00"),
            (90, "MATERIAL & EQUIP. SUBTOTAL", ""),
            (91, "FIELD, ENG., FAB.", ""),
            (92, "ASSESSMENTS", ""),
            (94, "LABOR FACTOR", ""),
            (96, "SUBTOTAL", ""),
            (97, "OVERHEAD", ""),
            (99, "SUBTOTAL", ""),
            (100, "GAIN", ""),
            (102, "TOTAL UNDERGROUND PRICE", ""),
            (104, "COMMENTS", ""),
            (115, "EXCLUSIONS", ""),
        ],
    );
    mark_totals(&mut sheet2, &[71, 92, 120, 126]);
    for row in sheet2.iter_mut() {
        if (105..=114).contains(&row.excel_row) || (116..=119).contains(&row.excel_row) {
            row.right.is_comment_row = true;
        }
    }

    UndergroundMetadata { sheet1, sheet2 }
}

fn estimate() -> EstimateMetadata {
    let mut section1 = rows_between(
        5..=69,
        1,
        &[
            (5, "UPRIGHT", "18.50"),
            (6, "PENDENT", "19.25"),
            (7, "SIDEWALL", "27.80"),
            (8, "CONCEALED", "34.60"),
            (9, "DRY PENDENT", "96.00"),
            (10, "ATTIC", "41.00"),
            (11, "RESIDENTIAL", "16.40"),
            (22, "TOTAL HEADS", ""),
            (24, "1\" PIPE (LF)", "4.10"),
            (25, "1 1/4\" PIPE (LF)", "5.35"),
            (26, "1 1/2\" PIPE (LF)", "6.20"),
            (27, "2\" PIPE (LF)", "8.05"),
            (28, "2 1/2\" PIPE (LF)", "12.90"),
            (29, "3\" PIPE (LF)", "15.70"),
            (30, "4\" PIPE (LF)", "21.40"),
            (69, "SUB TOTAL SHT #1", ""),
        ],
        &[
            (5, "HANGERS", "6.75"),
            (6, "SEISMIC BRACING", "48.00"),
            (7, "GROOVED FITTINGS", "22.50"),
            (8, "THREADED FITTINGS", "3.80"),
            (9, "FLOW SWITCH", "215.00"),
            (10, "TAMPER SWITCH", "128.00"),
            (11, "INSPECTOR TEST", "165.00"),
            (12, "RISER ASSEMBLY", "1450.00"),
        ],
    );
    mark_totals(&mut section1, &[22, 69]);

    let mut section2 = rows_between(
        77..=125,
        2,
        &[
            (77, "CPVC 3/4\" (LF)", "2.10"),
            (78, "CPVC 1\" (LF)", "3.05"),
            (79, "CPVC FITTINGS", "1.40"),
            (80, "FLEX DROPS", "38.00"),
            (125, "SUB TOTAL SHT #2", ""),
        ],
        &[
            (77, "DRY VALVE", "2650.00"),
            (78, "AIR COMPRESSOR", "980.00"),
            (79, "ANTIFREEZE LOOP", "640.00"),
            (80, "GAUGES", "24.00"),
        ],
    );
    mark_totals(&mut section2, &[125]);

    let mut section3 = rows_between(
        133..=189,
        3,
        &[
            (133, "TOTAL MAT'L SHT #1 & 2", ""),
            (136, "SPARE HEAD CABINET", "145.00"),
            (137, "SIGNAGE", "85.00"),
            (144, "SPRINKLER PUMP", "1.00"),
            (145, "BACKFLOW", "1.00"),
            (150, "METRAFLEX", "1.00"),
            (151, "STANDPIPE", "1.00"),
            (152, "PUMP ACCESSORIES", "1.00"),
            (155, "GRAND TOTAL MATERIAL COST", ""),
            (157, "HEADCOUNT", ""),
            (159, "HEADS (HRS)", "0.75"),
            (160, "MAINS (HRS/LF)", "0.10"),
            (161, "BRANCH LINES (HRS/LF)", "0.06"),
            (162, "RISERS (HRS/EA)", "8.00"),
            (163, "TESTING (HRS)", "1.00"),
            (182, "TOTAL LABOR HRS.", ""),
            (184, "LABOR (FM+ 7TH PERIOD)", "85.00"),
            (185, "ENGINEERING HALF HOUR HEAD", "95.00"),
            (186, "BIM", "95.00"),
            (187, "FABRICATION QUARTER HOUR PER", "45.00"),
            (189, "FIELD,ENG,FAB, TOTAL", ""),
        ],
        &[
            (133, "TOTAL MATERIAL", ""),
            (135, "SALES TAX", "0.10"),
            (136, "PERMIT", "1.00"),
            (137, "LIFT RENTAL", "1.00"),
            (138, "DUMPSTER", "1.00"),
            (139, "TRUCKING", "1.00"),
            (152, "MATERIAL, PRMT., EQUIP.", ""),
            (153, "FIELD, ENGR., FAB TOTAL", ""),
            (155, "INSURANCE", "1.00"),
            (156, "WARRANTY", "1.00"),
            (160, "TOTAL DIRECT COST", ""),
            (161, "%OVERHEAD", "0.15"),
            (163, "SUBTOTAL", ""),
            (164, "%GAIN", "0.15"),
            (166, "TOTAL QUOTE PRICE", ""),
            (167, "PRICE MINUS SP, PUMP, BF, MFLEX", ""),
            (168, "GROSS MARGIN", ""),
            (169, "BOND AMOUNT", ""),
            (173, "MATERIAL PER HEAD", ""),
            (174, "DIRECT COST PER HEAD", ""),
            (175, "BUILDING SQ. FOOTAGE", ""),
            (176, "SALES COST PER HEAD", ""),
            (178, "COST PER SQUARE FOOT", ""),
        ],
    );
    mark_totals(&mut section3, &[133, 155, 182, 189]);

    EstimateMetadata {
        section1,
        section2,
        section3,
    }
}

fn sov() -> SovMetadata {
    let summary = [
        ("design", "DESIGN"),
        ("bim", "3D BIM (LUMP)"),
        ("material", "MATERIAL / FAB"),
        ("rough-in", "ROUGH IN"),
        ("drop-cut", "DROP CUT"),
        ("trim", "TRIM"),
        ("pump-material", "PUMP MATERIAL"),
        ("pump-rough-in", "PUMP ROUGH IN"),
        ("permit", "PERMIT / BACKFLOW DEVICE"),
        ("scissor", "SCISSOR LIFT / UNDERGROUND"),
        ("standpipe", "STANDPIPE AND FHV (BY FLOOR / BY BUILDING)"),
    ];
    SovMetadata {
        summary_rows: summary
            .iter()
            .map(|(id, label)| SummaryRowMetadata {
                id: id.to_string(),
                label: label.to_string(),
                mirrors_building: None,
                default_value: 0.0,
            })
            .collect(),
        building_rows: Vec::new(),
    }
}

fn itm_items(rows: &[(u32, &str, &str, f64)]) -> Vec<ItmItemMetadata> {
    rows.iter()
        .flat_map(|(row_number, alarm, sprinkler, hours)| {
            [("Left", alarm), ("Right", sprinkler)]
                .into_iter()
                .filter(|(_, description)| !description.is_empty())
                .map(move |(column, description)| ItmItemMetadata {
                    id: format!("itm-{}-{}", row_number, column.to_ascii_lowercase()),
                    row_number: *row_number,
                    column: column.to_string(),
                    description: description.to_string(),
                    default_hours: *hours,
                })
        })
        .collect()
}

fn itm() -> ItmMetadata {
    ItmMetadata {
        labor_factor: itm_items(&[
            (5, "FIRE ALARM PANEL", "WET SYSTEM RISER", 2.0),
            (6, "SMOKE DETECTORS", "DRY SYSTEM RISER", 0.25),
            (7, "PULL STATIONS", "MAIN DRAIN TEST", 0.2),
            (8, "HORN / STROBES", "FIRE PUMP ANNUAL", 0.2),
            (9, "DUCT DETECTORS", "FDC INSPECTION", 0.5),
            (10, "MONITOR MODULES", "BACKFLOW TEST", 0.2),
        ]),
        equipment_factor: itm_items(&[
            (20, "BATTERIES", "GAUGES", 45.0),
            (21, "LIFT RENTAL", "LIFT RENTAL", 350.0),
            (22, "TEST EQUIPMENT", "HYDRO TEST PUMP", 75.0),
        ]),
        rates: itm_items(&[
            (41, "LABOR MIX RATE", "LABOR MIX RATE", 95.0),
            (42, "TRAVEL (HRS)", "TRAVEL (HRS)", 95.0),
            (43, "REPORTS", "REPORTS", 65.0),
        ]),
    }
}
