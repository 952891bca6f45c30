use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::cell::{CellRef, Field, Side};
use crate::error::{Result, WorksheetError};

/// The worksheet families of a bid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorksheetKind {
    Underground,
    Estimate,
    ScheduleOfValues,
    Design,
    #[serde(rename = "ITM")]
    Itm,
}

impl WorksheetKind {
    pub const ALL: [WorksheetKind; 5] = [
        WorksheetKind::Underground,
        WorksheetKind::Estimate,
        WorksheetKind::ScheduleOfValues,
        WorksheetKind::Design,
        WorksheetKind::Itm,
    ];

    /// `worksheetType` written into every snapshot envelope.
    pub fn payload_type(&self) -> &'static str {
        match self {
            WorksheetKind::Underground => "Underground",
            WorksheetKind::Estimate => "Estimate",
            WorksheetKind::ScheduleOfValues => "ScheduleOfValues",
            WorksheetKind::Design => "Design",
            WorksheetKind::Itm => "ITM",
        }
    }

    /// Title of explicitly saved versions in the store.
    pub fn title(&self) -> &'static str {
        match self {
            WorksheetKind::Underground => "UndergroundBid",
            WorksheetKind::Estimate => "BidWorksheet_Estimate",
            WorksheetKind::ScheduleOfValues => "BidWorksheet_SOV",
            WorksheetKind::Design => "DesignWorksheet",
            WorksheetKind::Itm => "ITMBidWorksheet",
        }
    }

    /// Title of the single rolling autosave slot.
    pub fn autosave_title(&self) -> String {
        format!("{}_AutoSave", self.title())
    }

    /// Short name used in URLs, archive names and metadata files.
    pub fn slug(&self) -> &'static str {
        match self {
            WorksheetKind::Underground => "underground",
            WorksheetKind::Estimate => "estimate",
            WorksheetKind::ScheduleOfValues => "sov",
            WorksheetKind::Design => "design",
            WorksheetKind::Itm => "itm",
        }
    }
}

impl fmt::Display for WorksheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.payload_type())
    }
}

impl FromStr for WorksheetKind {
    type Err = WorksheetError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        WorksheetKind::ALL
            .into_iter()
            .find(|kind| {
                kind.slug().eq_ignore_ascii_case(wanted)
                    || kind.payload_type().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| WorksheetError::NotFound(format!("worksheet kind '{}'", wanted)))
    }
}

/// What a user edit points at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum EditTarget {
    /// A field of a two-column grid row. `sheet` is the Underground sheet
    /// number or the Estimate section number.
    #[serde(rename_all = "camelCase")]
    Grid {
        sheet: u8,
        row_id: usize,
        side: Side,
        field: Field,
    },
    #[serde(rename_all = "camelCase")]
    SovSummary { row_id: String },
    #[serde(rename_all = "camelCase")]
    SovBuildingCell {
        building: String,
        category: String,
        floor: String,
    },
    SovBuildingCount,
    SovJobField { name: String },
    #[serde(rename_all = "camelCase")]
    ItmCell {
        section: String,
        row_number: u32,
        side: Side,
        field: String,
    },
    ItmGain { side: Side },
    DesignField { name: String },
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditTarget::Grid {
                sheet,
                row_id,
                side,
                field,
            } => write!(f, "sheet {} row {} {}.{}", sheet, row_id, side, field),
            EditTarget::SovSummary { row_id } => write!(f, "summary row {}", row_id),
            EditTarget::SovBuildingCell {
                building,
                category,
                floor,
            } => write!(f, "{} / {} / {}", building, category, floor),
            EditTarget::SovBuildingCount => f.write_str("numberOfBuildings"),
            EditTarget::SovJobField { name } => write!(f, "jobOverview.{}", name),
            EditTarget::ItmCell {
                section,
                row_number,
                side,
                field,
            } => write!(f, "{} row {} {}.{}", section, row_number, side, field),
            EditTarget::ItmGain { side } => write!(f, "{} gain", side),
            EditTarget::DesignField { name } => write!(f, "formData.{}", name),
        }
    }
}

/// Result of applying one edit to a worksheet model.
#[derive(Clone, Debug, PartialEq)]
pub enum EditResult {
    /// The value was written. `last_edited` names the grid cell the pipeline
    /// must leave alone on this pass, if any.
    Applied { last_edited: Option<CellRef> },
    /// The value was refused and the model is untouched.
    Rejected { warning: String },
}

impl EditResult {
    pub fn applied(last_edited: Option<CellRef>) -> Self {
        EditResult::Applied { last_edited }
    }

    pub fn rejected(warning: &str) -> Self {
        EditResult::Rejected {
            warning: warning.to_string(),
        }
    }
}

/// One worksheet's model plus its formula pipeline.
///
/// Implementations are plain synchronous state; the coordinator wraps them
/// in a mutex and never holds it across an await.
pub trait Worksheet: Send {
    fn kind(&self) -> WorksheetKind;

    /// Snapshot body (without the envelope) built from the current state.
    fn collect(&self) -> Result<Value>;

    /// Merges a decoded snapshot body into the current rows and recalculates.
    fn restore(&mut self, body: &Value) -> Result<()>;

    /// Rebuilds the worksheet from its metadata, discarding all user input.
    fn reset(&mut self);

    /// Runs the formula pipeline. `last_edited` is skipped by hybrid rows.
    fn recalculate(&mut self, last_edited: Option<&CellRef>);

    /// Validates and writes one user value without recalculating.
    fn apply_edit(&mut self, target: &EditTarget, value: &str) -> Result<EditResult>;

    /// The headline figure published to listeners.
    fn total(&self) -> f64;

    /// Aggregates for display and the inspection tool.
    fn summary(&self) -> Value;

    /// Takes whatever this worksheet needs from a peer worksheet's snapshot.
    fn link(&mut self, _peer: WorksheetKind, _body: &Value) {}
}

pub(crate) fn invalid_target(kind: WorksheetKind, target: &EditTarget) -> WorksheetError {
    WorksheetError::InvalidTarget {
        kind,
        target: target.to_string(),
    }
}
