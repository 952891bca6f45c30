//! Flat external-record fields pulled from a worksheet snapshot on explicit
//! save. Every function here is pure and never fails: a missing section or an
//! empty value just leaves its fields out.

use log::{debug, warn};
use serde_json::{Map, Value, json};

use crate::design::is_checked;
use crate::formula::parse_optional;
use crate::worksheet::WorksheetKind;

/// Field name to value, in the external record's vocabulary.
pub type FieldMap = Map<String, Value>;

pub const STRING_LIMIT: usize = 120;
pub const AHJ_LIMIT: usize = 1300;
pub const SCOPE_LIMIT: usize = 4099;

pub fn extract_fields(kind: WorksheetKind, payload: &Value) -> FieldMap {
    let fields = match kind {
        WorksheetKind::Underground => underground_fields(payload),
        WorksheetKind::Estimate => estimate_fields(payload),
        WorksheetKind::ScheduleOfValues => sov_fields(payload),
        WorksheetKind::Design => design_fields(payload),
        WorksheetKind::Itm => itm_fields(payload),
    };
    debug!("extracted {} fields from {}", fields.len(), kind);
    fields
}

/// A saved number that may have been written as text. Empty means absent;
/// unparseable text counts as zero.
fn decimal(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(parse_optional(s).unwrap_or(0.0)),
        _ => None,
    }
}

fn put(fields: &mut FieldMap, name: &str, value: Option<f64>) {
    if let Some(value) = value {
        fields.insert(name.to_string(), json!(value));
    }
}

// Underground

const UNDERGROUND_ROWS: [(u32, &str); 2] = [
    (83, "Pump_Direct_Cost_Total__c"),
    (84, "FHV_Standpipe_Total_Direct_Cost__c"),
];

fn underground_fields(payload: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    let items = payload
        .get("sheet2")
        .and_then(|sheet| sheet.get("lineItems"))
        .or_else(|| payload.get("lineItems"))
        .and_then(Value::as_array);
    let Some(items) = items else {
        return fields;
    };

    for (excel_row, name) in UNDERGROUND_ROWS {
        let gross = items
            .iter()
            .find(|item| item.get("excelRow").and_then(Value::as_u64) == Some(excel_row as u64))
            .and_then(|item| item.get("right"))
            .and_then(|right| right.get("gross"));
        put(&mut fields, name, decimal(gross));
    }
    fields
}

// Estimate

/// `(excelRow, column, payload field, external field)` of section 3.
const ESTIMATE_FIELDS: &[(u32, &str, &str, &str)] = &[
    (155, "Left", "gross", "GRAND_TOTAL_MATERIAL_COST__c"),
    (157, "Left", "size", "Head_Count__c"),
    (184, "Left", "quantity", "LABOR_FM_7TH_PERIOD_QUANTITY__c"),
    (184, "Left", "unitPrice", "LABOR_FM_7TH_PERIOD_UNIT__c"),
    (184, "Left", "gross", "LABOR_FM_7TH_PERIOD_GROSS__c"),
    (185, "Left", "quantity", "ENGINEERING_HALF_HOUR_HEAD_QUANTITY__c"),
    (185, "Left", "unitPrice", "ENGINEERING_HALF_HOUR_HEAD_UNIT__c"),
    (185, "Left", "gross", "ENGINEERING_HALF_HOUR_HEAD_GROSS__c"),
    (186, "Left", "quantity", "BIM_QUANTITY__c"),
    (186, "Left", "unitPrice", "BIM_UNIT__c"),
    (186, "Left", "gross", "BIM_GROSS__c"),
    (187, "Left", "quantity", "FABRICATION_QUARTER_HOUR_PER_QUANTITY__c"),
    (187, "Left", "unitPrice", "FABRICATION_QUARTER_HOUR_PER_UNIT__c"),
    (187, "Left", "gross", "FABRICATION_QUARTER_HOUR_PER_GROSS__c"),
    (160, "Right", "gross", "TOTAL_DIRECT_COST_GROSS__c"),
    (161, "Right", "quantity", "OVERHEAD_QUANTITY__c"),
    (161, "Right", "unitPrice", "OVERHEAD_UNIT__c"),
    (161, "Right", "gross", "OVERHEAD_GROSS__c"),
    (163, "Right", "gross", "SUBTOTAL_GROSS__c"),
    (164, "Right", "quantity", "GAIN_QUANTITY__c"),
    (164, "Right", "unitPrice", "GAIN_UNIT__c"),
    (164, "Right", "gross", "GAIN_GROSS__c"),
    (166, "Right", "gross", "TOTAL_QUOTE_PRICE__c"),
    (167, "Right", "gross", "PRICE_MINUS_SP_PUMP_BF_MFLEX_DON_T_C__c"),
    (168, "Right", "quantity", "GROSS_MARGIN__c"),
    (169, "Right", "quantity", "BOND_AMOUNT__c"),
    (173, "Right", "quantity", "MATERIAL_PER_HEAD_QUANTITY__c"),
    (173, "Right", "unitPrice", "MATERIAL_PER_HEAD_UNIT__c"),
    (173, "Right", "gross", "MATERIAL_PER_HEAD_GROSS__c"),
    (174, "Right", "quantity", "DIRECT_COST_PER_HEAD_QUANTITY__c"),
    (174, "Right", "unitPrice", "DIRECT_COST_PER_HEAD_UNIT__c"),
    (174, "Right", "gross", "DIRECT_COST_PER_HEAD_GROSS__c"),
    (175, "Right", "unitPrice", "BUILDING_SQ_FOOTAGE_UNIT__c"),
    (175, "Right", "gross", "BUILDING_SQ_FOOTAGE_GROSS__c"),
    (176, "Right", "quantity", "SALES_COST_PER_HEAD_QUANTITY__c"),
    (176, "Right", "unitPrice", "SALES_COST_PER_HEAD_UNIT__c"),
    (176, "Right", "gross", "SALES_COST_PER_HEAD_GROSS__c"),
    (178, "Right", "gross", "COST_PER_SQUARE_FOOT__c"),
];

fn estimate_fields(payload: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    let Some(items) = payload.get("section3").and_then(Value::as_array) else {
        return fields;
    };

    let find = |excel_row: u32, column: &str| {
        items.iter().find(|item| {
            item.get("excelRow").and_then(Value::as_u64) == Some(excel_row as u64)
                && item.get("column").and_then(Value::as_str) == Some(column)
        })
    };

    for (excel_row, column, field, name) in ESTIMATE_FIELDS {
        let value = find(*excel_row, *column).and_then(|item| decimal(item.get(*field)));
        put(&mut fields, name, value);
    }
    fields
}

// Schedule of Values

const SOV_LABELS: [(&str, &str); 11] = [
    ("design", "Design_Total__c"),
    ("3d bim", "X3D_BIM_Total__c"),
    ("material", "Material_FAB_Total__c"),
    ("rough in", "Rough_In_Total__c"),
    ("drop cut", "Drop_Cut_Total__c"),
    ("trim", "Trim_Total__c"),
    ("pump material", "Pump_Material_Total__c"),
    ("pump rough in", "Pump_Rough_In_Total__c"),
    ("permit", "Backflow_Device_Total__c"),
    ("scissor", "Underground_Work_Total__c"),
    ("standpipe", "Standpipe_and_VHF_Total__c"),
];

/// Finds the one summary row whose label matches `search`. Labels match when
/// either contains the other, ignoring case; among several matches an exact
/// label wins, then a single label starting with the search text.
pub fn find_row_by_label<'a>(rows: &'a [Value], search: &str) -> Option<&'a Value> {
    fn label_of(row: &Value) -> String {
        row.get("label")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_lowercase()
    }

    let search = search.trim().to_lowercase();

    let candidates: Vec<&Value> = rows
        .iter()
        .filter(|row| {
            let label = label_of(row);
            !label.is_empty() && (label.contains(&search) || search.contains(&label))
        })
        .collect();

    match candidates.as_slice() {
        [] => None,
        [only] => Some(*only),
        _ => {
            if let Some(exact) = candidates.iter().find(|row| label_of(row) == search) {
                return Some(*exact);
            }
            let leading: Vec<&&Value> = candidates
                .iter()
                .filter(|row| label_of(row).starts_with(&search))
                .collect();
            match leading.as_slice() {
                [only] => Some(**only),
                _ => {
                    warn!(
                        "summary label '{}' matches {} rows, field left out",
                        search,
                        candidates.len()
                    );
                    None
                }
            }
        }
    }
}

fn sov_fields(payload: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    let Some(rows) = payload.get("summaryRows").and_then(Value::as_array) else {
        return fields;
    };

    for (search, name) in SOV_LABELS {
        if let Some(row) = find_row_by_label(rows, search) {
            put(&mut fields, name, Some(decimal(row.get("value")).unwrap_or(0.0)));
        }
    }
    if let Some(summary) = payload.get("summary") {
        put(
            &mut fields,
            "Building_Total__c",
            Some(decimal(summary.get("totalSOV")).unwrap_or(0.0)),
        );
    }
    fields
}

// Design

fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn add_string(fields: &mut FieldMap, name: &str, value: Option<&Value>, max: usize) {
    if let Some(text) = text_of(value) {
        let text = text.trim();
        if !text.is_empty() {
            let truncated: String = text.chars().take(max).collect();
            fields.insert(name.to_string(), Value::String(truncated));
        }
    }
}

fn add_number(fields: &mut FieldMap, name: &str, value: Option<&Value>) {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_optional(s),
        _ => None,
    };
    put(fields, name, number);
}

/// Picklists are `Yes`/`No`. Booleans are read as-is, `"true"`/`"false"` as
/// text, and any other non-empty value counts as yes.
fn add_picklist(fields: &mut FieldMap, name: &str, value: Option<&Value>) {
    let yes = match value {
        None | Some(Value::Null) => return,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(_) => true,
    };
    let answer = if yes { "Yes" } else { "No" };
    fields.insert(name.to_string(), Value::String(answer.to_string()));
}

fn add_date(fields: &mut FieldMap, name: &str, value: Option<&Value>) {
    if let Some(text) = text_of(value) {
        if !text.trim().is_empty() {
            fields.insert(name.to_string(), Value::String(text));
        }
    }
}

enum DesignField {
    Text(usize),
    Number,
    Picklist,
    Date,
}

/// `(form field, external field, kind)` for the one-to-one mappings.
const DESIGN_FIELDS: &[(&str, &str, DesignField)] = &[
    ("description", "Design_Description__c", DesignField::Text(STRING_LIMIT)),
    ("numberOfFloors", "Floors__c", DesignField::Number),
    ("penthouse", "Penthouse__c", DesignField::Text(STRING_LIMIT)),
    ("bidPlanDate", "Bid_Plan_Date__c", DesignField::Date),
    ("residentialRates", "Residential_Rates__c", DesignField::Picklist),
    ("localHire", "Local_Hire__c", DesignField::Picklist),
    ("apprenticePercent", "Apprentice__c", DesignField::Picklist),
    ("textura", "Textura__c", DesignField::Picklist),
    ("certifiedPayroll", "Certified_Payroll__c", DesignField::Picklist),
    ("ocipDeduct", "OCIP_Deduct_or_Add_Later__c", DesignField::Picklist),
    ("ocupAmount", "OCIP_Deduct_or_Add_Later_Amount__c", DesignField::Number),
    ("marketRecovery", "Market_Recovery__c", DesignField::Picklist),
    ("bimRequired", "BIM_Required__c", DesignField::Picklist),
    ("permitFeesIncluded", "Permit_Fees__c", DesignField::Picklist),
    ("permitAmount", "Permit_Fees_Amount__c", DesignField::Number),
    ("ammr", "AMMR__c", DesignField::Text(STRING_LIMIT)),
    ("preApp", "Pre_App__c", DesignField::Text(STRING_LIMIT)),
    ("fpeRequired", "FPE_Required__c", DesignField::Text(STRING_LIMIT)),
    ("ahj", "AHJ_Account__c", DesignField::Text(AHJ_LIMIT)),
    ("hazardClassification", "Hazard_Classification__c", DesignField::Text(STRING_LIMIT)),
    ("densityRequired", "Hazard_Classification_Density_Required__c", DesignField::Picklist),
    ("atticSprinklersRequired", "Attic_Sprinklers_Req__c", DesignField::Picklist),
    ("headTypesAttic", "Attic_Head_Type__c", DesignField::Text(STRING_LIMIT)),
    ("headTypesCeiling", "Ceiling_Head_Type__c", DesignField::Text(STRING_LIMIT)),
    ("standpipeQty", "Sandpipe_Qty_and_Hose_Valves__c", DesignField::Text(STRING_LIMIT)),
    ("tempSpRequired", "Temp_SP_Required__c", DesignField::Picklist),
    ("buyAmerican", "Buy_American__c", DesignField::Picklist),
    ("steelPipe", "Steel_Pipe__c", DesignField::Picklist),
    ("importPipe", "Import_Pipe__c", DesignField::Picklist),
    ("dynaflow", "Dynaflow_Dynathread_OK__c", DesignField::Picklist),
    ("cpvc", "CPVC__c", DesignField::Picklist),
    ("ceilingHeads", "Ceiling_Heads__c", DesignField::Number),
    ("headTypeColorCeiling", "Color_of_Ceiling_Heads__c", DesignField::Text(STRING_LIMIT)),
    ("atticHeads", "Attic_Heads__c", DesignField::Number),
    ("headTypeColorAttic", "Color_of_Attic_Heads__c", DesignField::Text(STRING_LIMIT)),
    ("fdcCount", "of_FDC__c", DesignField::Text(STRING_LIMIT)),
    ("metraflexLoops", "Metraflex_Loops__c", DesignField::Picklist),
    ("metraflexQty", "Metraflex_Loops_Qty__c", DesignField::Number),
    ("metraflexSize", "Metraflex_Loops_Size__c", DesignField::Text(STRING_LIMIT)),
    ("flexheads", "Flexheads__c", DesignField::Picklist),
    ("flexheadsQty", "Flexheads_Qty__c", DesignField::Number),
    ("scissorLifts", "Scissor_Lifts__c", DesignField::Picklist),
    ("scissorLiftsMonths", "Scissor_Lifts_Months__c", DesignField::Number),
    ("scissorLiftsSize", "Scissor_Lifts_Size__c", DesignField::Text(STRING_LIMIT)),
    ("boomLifts", "Boom_Lifts__c", DesignField::Picklist),
    ("boomLiftsMonths", "Boom_Lifts_Months__c", DesignField::Number),
    ("boomLiftsSize", "Boom_Lifts_Size__c", DesignField::Text(STRING_LIMIT)),
    ("forklift", "Forklift__c", DesignField::Picklist),
    ("forkliftMonths", "Forklift_Months__c", DesignField::Number),
    ("forkliftSize", "Forklift_Size__c", DesignField::Text(STRING_LIMIT)),
    ("designHours", "Design_Hours_Inc_BIM__c", DesignField::Number),
    ("fieldHours", "Field_Hours__c", DesignField::Number),
    ("fab", "FAB__c", DesignField::Number),
    ("fm200", "FM_200__c", DesignField::Number),
    ("comments", "Comments__c", DesignField::Text(STRING_LIMIT)),
];

const FIRE_PUMP_PARTS: [(&str, &str); 4] = [
    ("firePumpGpm", "GPM"),
    ("firePumpPsi", "PSI"),
    ("firePumpVoltage", "Voltage"),
    ("firePumpTransferSwitch", "Transfer Switch"),
];

/// Checked FDC types in priority order; the first one wins.
const FDC_TYPE_NAMES: [(&str, &str); 8] = [
    ("fdcType_FreeStanding", "Free Standing"),
    ("fdcType_2Way", "2 Way"),
    ("fdcType_3Way", "3 Way"),
    ("fdcType_4Way", "4 Way"),
    ("fdcType_SP", "SP"),
    ("fdcType_Flush", "Flush"),
    ("fdcType_CH", "CH"),
    ("fdcType_PolBR", "POL BR"),
];

const UNDERGROUND_SCOPE: [(&str, &str); 5] = [
    ("trenching", "Trenching"),
    ("sawcut", "Sawcut"),
    ("import", "Import"),
    ("export", "Export"),
    ("pave", "Pave"),
];

fn design_fields(payload: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    let Some(form) = payload.get("formData").and_then(Value::as_object) else {
        return fields;
    };

    for (source, name, kind) in DESIGN_FIELDS {
        let value = form.get(*source);
        match kind {
            DesignField::Text(max) => add_string(&mut fields, name, value, *max),
            DesignField::Number => add_number(&mut fields, name, value),
            DesignField::Picklist => add_picklist(&mut fields, name, value),
            DesignField::Date => add_date(&mut fields, name, value),
        }
    }

    // Fire pump parts only count when stored as a real boolean.
    let fire_pump: Vec<&str> = FIRE_PUMP_PARTS
        .iter()
        .filter(|(source, _)| form.get(*source) == Some(&Value::Bool(true)))
        .map(|(_, label)| *label)
        .collect();
    if !fire_pump.is_empty() {
        let joined = Value::String(fire_pump.join(", "));
        add_string(&mut fields, "Fire_Pump__c", Some(&joined), STRING_LIMIT);
    }

    if let Some((_, label)) = FDC_TYPE_NAMES
        .iter()
        .find(|(source, _)| is_checked(form.get(*source)))
    {
        fields.insert("Type_FDC__c".to_string(), Value::String(label.to_string()));
    }

    let scope: Vec<&str> = UNDERGROUND_SCOPE
        .iter()
        .filter(|(source, _)| is_checked(form.get(*source)))
        .map(|(_, label)| *label)
        .collect();
    if !scope.is_empty() {
        let joined: String = scope.join(";").chars().take(SCOPE_LIMIT).collect();
        fields.insert("Underground_Scope__c".to_string(), Value::String(joined));
    }

    match form.get("backflowDDCV") {
        None | Some(Value::Null) => {}
        Some(value) => {
            let backflow = if is_checked(Some(value)) {
                "DDCV"
            } else {
                "Reduced Pressure"
            };
            fields.insert("Backflow__c".to_string(), Value::String(backflow.to_string()));
        }
    }
    fields
}

// ITM

const ITM_TOTALS: [(&str, &str); 6] = [
    ("totalAlarmLaborHours", "Total_Alarm_Labor_Hours__c"),
    ("totalSprinklerLaborHours", "Total_Sprinkler_Labor_Hours__c"),
    ("totalAlarmEquipmentCost", "Total_Alarm_Cost__c"),
    ("totalSprinklerEquipmentCost", "Total_Sprinkler_Cost__c"),
    ("alarmTotalQuote", "TOTAL_Alarm_QUOTE_PRICE__c"),
    ("sprinklerTotalQuote", "TOTAL_Sprinkler_QUOTE_PRICE__c"),
];

fn itm_fields(payload: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    let Some(totals) = payload.get("totals") else {
        return fields;
    };
    for (source, name) in ITM_TOTALS {
        put(&mut fields, name, decimal(totals.get(source)));
    }
    fields
}
