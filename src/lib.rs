/*!
# Bid Worksheets

Spreadsheet replicas of the cost worksheets used to price a fire-protection bid,
with the workbook formulas reimplemented as fixed Rust pipelines.

## Overview

A bid carries five worksheets. Users type quantities, unit prices and
descriptions; every edit reruns the worksheet's formula pipeline, the totals
are republished, and a debounced autosave writes a snapshot. Explicit saves
create numbered versions and push a flat set of fields to the bid's external
record.

## Architecture

### Row Model
- **cell**: one side of a row, with display and precise values plus readonly flags
- **row**: two-column rows, row metadata and the `RowConfig` lookup tables
- **sheet**: ordered rows with an `excelRow` index, range sums and snapshot merging

### Formula Engine
- **formula**: parsing, rounding and money formatting shared by every pipeline
- **underground**: Sheet 1 line items feeding the Sheet 2 cost roll-up
- **estimate**: three sections ending in overhead, gain, bond and per-head figures
- **sov**: Schedule of Values buildings, floors and summary rows
- **itm**: inspection/testing/maintenance labor, equipment and quote totals
- **design**: the job questionnaire (no formulas)

### Editing and Persistence
- **editor**: validation and write-through of single cell edits
- **codec**: snapshot envelope and its base64 blob
- **persistence**: the `WorksheetStore` trait and the gzip+bincode `FileStore`
- **coordinator**: draft/version state machine with debounced autosave
- **extract**: external-record field maps built at explicit save
- **template**: built-in row templates and metadata loading

### Ambient
- **config**: timing knobs, directories and bind address
- **error**: the `WorksheetError` type
- **app**: axum JSON API (feature `web`)

## REST API Endpoints

- `GET /api/worksheets/{record}/{kind}` - worksheet state, totals and versions
- `POST /api/worksheets/{record}/{kind}/edit` - applies one cell edit
- `POST /api/worksheets/{record}/{kind}/save` - stores a numbered version
- `POST /api/worksheets/{record}/{kind}/select/{version}` - switches draft/version
- `GET /api/worksheets/{record}/{kind}/fields` - previews extracted fields
*/

pub mod cell;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod design;
pub mod editor;
pub mod error;
pub mod estimate;
pub mod extract;
pub mod formula;
pub mod itm;
pub mod persistence;
pub mod row;
pub mod sheet;
pub mod sov;
pub mod template;
pub mod underground;
pub mod worksheet;

#[cfg(feature = "web")]
pub mod app;

pub use cell::{Cell, CellRef, Field, Side};
pub use codec::Envelope;
pub use config::{Config, CoordinatorConfig};
pub use coordinator::{AutoSaveStatus, Coordinator, SaveReport, Selection, VersionOption};
pub use editor::{EditController, EditOutcome};
pub use error::{Result, WorksheetError};
pub use extract::{FieldMap, extract_fields};
pub use persistence::{FileStore, VersionInfo, WorksheetStore};
pub use row::{Row, RowConfig, RowKind, RowMetadata};
pub use sheet::Sheet;
pub use template::{WorksheetMetadata, load_metadata};
pub use worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind};
