//! Design worksheet: a free-form job questionnaire with no formulas.

use log::{debug, warn};
use serde_json::{Map, Value, json};

use crate::cell::CellRef;
use crate::error::Result;
use crate::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind, invalid_target};

pub const FDC_TYPE_WARNING: &str = "Only one FDC type can be selected";

/// Default of a form field: free text or a checkbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldDefault {
    Text,
    Flag,
}

use FieldDefault::{Flag, Text};

/// Every field of the questionnaire with its empty value, in form order.
pub const DESIGN_FIELDS: &[(&str, FieldDefault)] = &[
    ("jobName", Text),
    ("jobAddress", Text),
    ("description", Text),
    ("serviceTerritory_SC", Flag),
    ("serviceTerritory_NC", Flag),
    ("numberOfFloors", Text),
    ("penthouse", Text),
    ("bidPlanDate", Text),
    ("residentialRates", Flag),
    ("localHire", Flag),
    ("apprenticePercent", Flag),
    ("textura", Flag),
    ("certifiedPayroll", Flag),
    ("bond", Flag),
    ("ocipDeduct", Flag),
    ("ocupAmount", Text),
    ("marketRecovery", Flag),
    ("bimRequired", Flag),
    ("permitFeesIncluded", Flag),
    ("permitAmount", Text),
    ("ammr", Text),
    ("preApp", Text),
    ("fpeRequired", Text),
    ("ahj", Text),
    ("hazardClassification", Text),
    ("densityRequired", Flag),
    ("atticSprinklersRequired", Flag),
    ("headTypesAttic", Text),
    ("headTypesCeiling", Text),
    ("standpipeQty", Text),
    ("tempSpRequired", Flag),
    ("firePumpGpm", Flag),
    ("firePumpPsi", Flag),
    ("firePumpVoltage", Flag),
    ("firePumpTransferSwitch", Flag),
    ("buyAmerican", Flag),
    ("steelPipe", Flag),
    ("importPipe", Flag),
    ("dynaflow", Flag),
    ("cpvc", Flag),
    ("ceilingHeads", Text),
    ("atticHeads", Text),
    ("headTypeColorCeiling", Text),
    ("headTypeColorAttic", Text),
    ("metraflexLoops", Flag),
    ("metraflexSize", Text),
    ("metraflexQty", Text),
    ("flexheads", Flag),
    ("flexheadsQty", Text),
    ("fdcCount", Text),
    ("fdcType_FreeStanding", Flag),
    ("fdcType_2Way", Flag),
    ("fdcType_3Way", Flag),
    ("fdcType_4Way", Flag),
    ("fdcType_SP", Flag),
    ("fdcType_Flush", Flag),
    ("fdcType_CH", Flag),
    ("fdcType_PolBR", Flag),
    ("trenching", Flag),
    ("sawcut", Flag),
    ("import", Flag),
    ("export", Flag),
    ("pave", Flag),
    ("backflowDDCV", Flag),
    ("scissorLifts", Flag),
    ("scissorLiftsMonths", Text),
    ("scissorLiftsSize", Text),
    ("boomLifts", Flag),
    ("boomLiftsMonths", Text),
    ("boomLiftsSize", Text),
    ("forklift", Flag),
    ("forkliftMonths", Text),
    ("forkliftSize", Text),
    ("designHours", Text),
    ("fieldHours", Text),
    ("fab", Text),
    ("fm200", Text),
    ("comments", Text),
];

/// FDC type checkboxes; at most one may be checked.
pub const FDC_TYPES: [&str; 8] = [
    "fdcType_FreeStanding",
    "fdcType_2Way",
    "fdcType_3Way",
    "fdcType_4Way",
    "fdcType_SP",
    "fdcType_Flush",
    "fdcType_CH",
    "fdcType_PolBR",
];

pub fn default_form() -> Map<String, Value> {
    DESIGN_FIELDS
        .iter()
        .map(|(name, default)| {
            let value = match default {
                Text => Value::String(String::new()),
                Flag => Value::Bool(false),
            };
            (name.to_string(), value)
        })
        .collect()
}

fn field_default(name: &str) -> Option<FieldDefault> {
    DESIGN_FIELDS
        .iter()
        .find(|(field, _)| *field == name)
        .map(|(_, default)| *default)
}

/// Loose checkbox reading used for form values.
pub fn is_checked(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct DesignWorksheet {
    form: Map<String, Value>,
}

impl Default for DesignWorksheet {
    fn default() -> Self {
        Self::new()
    }
}

impl DesignWorksheet {
    pub fn new() -> Self {
        Self {
            form: default_form(),
        }
    }

    pub fn form(&self) -> &Map<String, Value> {
        &self.form
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.form.get(name)
    }

    pub fn job_name(&self) -> &str {
        self.form
            .get("jobName")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    fn selected_fdc_type(&self) -> Option<&'static str> {
        FDC_TYPES
            .iter()
            .copied()
            .find(|name| is_checked(self.form.get(*name)))
    }
}

impl Worksheet for DesignWorksheet {
    fn kind(&self) -> WorksheetKind {
        WorksheetKind::Design
    }

    fn collect(&self) -> Result<Value> {
        Ok(json!({ "formData": Value::Object(self.form.clone()) }))
    }

    fn restore(&mut self, body: &Value) -> Result<()> {
        if let Some(saved) = body.get("formData").and_then(Value::as_object) {
            for (name, value) in saved {
                self.form.insert(name.clone(), value.clone());
            }
            debug!("design form restored with {} saved fields", saved.len());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.form = default_form();
    }

    fn recalculate(&mut self, _last_edited: Option<&CellRef>) {}

    fn apply_edit(&mut self, target: &EditTarget, value: &str) -> Result<EditResult> {
        let EditTarget::DesignField { name } = target else {
            return Err(invalid_target(WorksheetKind::Design, target));
        };
        if name.trim().is_empty() {
            return Err(invalid_target(WorksheetKind::Design, target));
        }

        let value = match field_default(name) {
            Some(Flag) => Value::Bool(value.trim().eq_ignore_ascii_case("true")),
            _ => Value::String(value.to_string()),
        };

        if FDC_TYPES.contains(&name.as_str()) && value == Value::Bool(true) {
            if let Some(selected) = self.selected_fdc_type() {
                if selected != name {
                    warn!("design edit refused, {} already selected", selected);
                    return Ok(EditResult::rejected(FDC_TYPE_WARNING));
                }
            }
        }

        self.form.insert(name.clone(), value);
        Ok(EditResult::applied(None))
    }

    fn total(&self) -> f64 {
        0.0
    }

    fn summary(&self) -> Value {
        json!({
            "jobName": self.job_name(),
            "fields": self.form.len(),
        })
    }
}
