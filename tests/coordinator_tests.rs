use async_trait::async_trait;
use bidsheet::cell::{Field, Side};
use bidsheet::codec::Envelope;
use bidsheet::config::CoordinatorConfig;
use bidsheet::coordinator::{AutoSaveStatus, Coordinator, Selection};
use bidsheet::editor::EditOutcome;
use bidsheet::error::{Result, WorksheetError};
use bidsheet::extract::FieldMap;
use bidsheet::persistence::{VersionInfo, WorksheetStore};
use bidsheet::template::builtin;
use bidsheet::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const RECORD: &str = "OPP-1";

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    latest: Option<String>,
    versions: Vec<VersionInfo>,
    blobs: HashMap<String, String>,
    autosaves: usize,
    fail_autosave: bool,
    autosave_delay: Option<Duration>,
    fail_record: bool,
    record: FieldMap,
}

/// In-memory store that records every call in order.
#[derive(Default)]
struct MockStore {
    state: Mutex<MockState>,
}

impl MockStore {
    fn with<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    fn autosaves(&self) -> usize {
        self.with(|s| s.autosaves)
    }

    fn add_version(&self, id: &str, blob: String) {
        self.with(|s| {
            let number = s.versions.len() as u32 + 1;
            s.versions.insert(
                0,
                VersionInfo {
                    id: id.to_string(),
                    version_number: number,
                    title: "BidWorksheet_Underground".to_string(),
                    created_date: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap(),
                    created_by: "estimator".to_string(),
                },
            );
            s.blobs.insert(id.to_string(), blob);
        });
    }
}

#[async_trait]
impl WorksheetStore for MockStore {
    async fn load_latest(&self, _kind: WorksheetKind, _record_id: &str) -> Result<Option<String>> {
        self.with(|s| {
            s.calls.push("load_latest".to_string());
            Ok(s.latest.clone())
        })
    }

    async fn load_version(
        &self,
        _kind: WorksheetKind,
        _record_id: &str,
        version_id: &str,
    ) -> Result<Option<String>> {
        self.with(|s| {
            s.calls.push(format!("load_version:{}", version_id));
            match s.blobs.get(version_id) {
                Some(blob) => Ok(Some(blob.clone())),
                None => Err(WorksheetError::NotFound(version_id.to_string())),
            }
        })
    }

    async fn save(&self, kind: WorksheetKind, _record_id: &str, blob: &str) -> Result<VersionInfo> {
        let id = self.with(|s| {
            s.calls.push("save".to_string());
            format!("v{}", s.versions.len() + 1)
        });
        self.add_version(&id, blob.to_string());
        self.with(|s| {
            s.latest = Some(blob.to_string());
            let mut info = s.versions[0].clone();
            info.title = format!("BidWorksheet_{}", kind);
            Ok(info)
        })
    }

    async fn autosave(&self, _kind: WorksheetKind, _record_id: &str, blob: &str) -> Result<()> {
        let delay = self.with(|s| {
            s.calls.push("autosave".to_string());
            s.autosaves += 1;
            s.autosave_delay
        });
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.with(|s| {
            if s.fail_autosave {
                return Err(WorksheetError::Store("disk full".to_string()));
            }
            s.latest = Some(blob.to_string());
            Ok(())
        })
    }

    async fn list_versions(
        &self,
        _kind: WorksheetKind,
        _record_id: &str,
    ) -> Result<Vec<VersionInfo>> {
        self.with(|s| Ok(s.versions.clone()))
    }

    async fn next_version_number(&self, _kind: WorksheetKind, _record_id: &str) -> Result<u32> {
        self.with(|s| Ok(s.versions.len() as u32 + 1))
    }

    async fn update_external_record(&self, _record_id: &str, fields: &FieldMap) -> Result<()> {
        self.with(|s| {
            s.calls.push("update_external_record".to_string());
            if s.fail_record {
                return Err(WorksheetError::Store("record is locked".to_string()));
            }
            s.record.extend(fields.clone());
            Ok(())
        })
    }
}

fn quantity(sheet: u8, row_id: usize, side: Side) -> EditTarget {
    EditTarget::Grid {
        sheet,
        row_id,
        side,
        field: Field::Quantity,
    }
}

/// Sheet 2 row 83, the pump line, which also feeds an external field.
fn pump_quantity() -> EditTarget {
    quantity(2, (83 - 71) as usize, Side::Right)
}

fn underground_coordinator(store: &Arc<MockStore>) -> Coordinator {
    let store: Arc<dyn WorksheetStore> = store.clone();
    Coordinator::new(
        RECORD,
        builtin(WorksheetKind::Underground).build(),
        store,
        CoordinatorConfig::default(),
    )
}

/// Blob of an underground worksheet with `quantity` on sheet 1 row 5, and
/// the total it carries.
fn underground_blob(quantity_value: &str) -> (String, f64) {
    let mut worksheet = builtin(WorksheetKind::Underground).build();
    let result = worksheet
        .apply_edit(&quantity(1, 0, Side::Left), quantity_value)
        .unwrap();
    if let EditResult::Applied { last_edited } = result {
        worksheet.recalculate(last_edited.as_ref());
    }
    let body = worksheet.collect().unwrap();
    let blob = Envelope::new(WorksheetKind::Underground, RECORD, body)
        .encode()
        .unwrap();
    (blob, worksheet.total())
}

#[tokio::test(start_paused = true)]
async fn test_autosave_is_debounced() {
    let store = Arc::new(MockStore::default());
    let coordinator = underground_coordinator(&store);

    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "10")
        .unwrap();
    assert!(coordinator.has_pending_autosave());

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.autosaves(), 0, "Still inside the debounce window");

    // A second edit restarts the timer
    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "12")
        .unwrap();
    sleep(Duration::from_millis(1000)).await;
    assert_eq!(store.autosaves(), 0, "First timer was replaced");

    sleep(Duration::from_millis(1100)).await;
    assert_eq!(store.autosaves(), 1, "One autosave after the quiet period");
    assert!(!coordinator.has_pending_autosave());
    assert_eq!(coordinator.status(), AutoSaveStatus::Saved);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(coordinator.status(), AutoSaveStatus::Idle, "Saved decays to idle");
    assert_eq!(store.autosaves(), 1);
    println!("✓ Burst of edits produces a single autosave");
}

#[tokio::test(start_paused = true)]
async fn test_version_switch_flushes_pending_draft_first() {
    let store = Arc::new(MockStore::default());
    let (version_blob, version_total) = underground_blob("2");
    store.add_version("v1", version_blob);
    let coordinator = underground_coordinator(&store);

    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "10")
        .unwrap();
    assert_eq!(coordinator.total(), 428.31);
    assert!(coordinator.has_pending_autosave());

    coordinator.select_version("v1").await.unwrap();
    assert_eq!(store.calls(), vec!["autosave", "load_version:v1"]);
    assert_eq!(coordinator.selection(), Selection::Version("v1".to_string()));
    assert_eq!(coordinator.total(), version_total);
    assert!(!coordinator.has_pending_autosave());

    // Edits made while viewing a version are not autosaved
    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "7")
        .unwrap();
    assert!(!coordinator.has_pending_autosave());
    sleep(Duration::from_secs(10)).await;
    assert_eq!(store.autosaves(), 1, "No stale timer saved over the draft");

    // Back on the draft the autosaved work returns
    coordinator.select_version("draft").await.unwrap();
    assert_eq!(coordinator.selection(), Selection::Draft);
    assert_eq!(coordinator.total(), 428.31);
    println!("✓ Pending draft edits are saved before a version loads");
}

#[tokio::test(start_paused = true)]
async fn test_missing_snapshots_are_silent() {
    let store = Arc::new(MockStore::default());
    let coordinator = underground_coordinator(&store);

    coordinator.initialize().await.unwrap();
    assert!(!coordinator.load_latest().await.unwrap());
    assert_eq!(coordinator.total(), 0.0);
    assert_eq!(coordinator.selection(), Selection::Draft);
    println!("✓ Nothing saved yet is not an error");
}

#[tokio::test(start_paused = true)]
async fn test_missing_version_keeps_the_draft() {
    let store = Arc::new(MockStore::default());
    let coordinator = underground_coordinator(&store);
    coordinator.initialize().await.unwrap();

    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "10")
        .unwrap();
    assert!(!coordinator.select_version("v404").await.unwrap());
    assert!(store.calls().contains(&"load_version:v404".to_string()));
    assert_eq!(coordinator.selection(), Selection::Draft, "Still on the draft");
    assert_eq!(coordinator.total(), 428.31, "Draft content stays on screen");
    assert_eq!(store.autosaves(), 1, "Pending draft edit was flushed");

    // Typing afterwards is still autosaved
    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "12")
        .unwrap();
    assert!(coordinator.has_pending_autosave());
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.autosaves(), 2);
    println!("✓ A missing version does not strand draft edits");
}

#[tokio::test(start_paused = true)]
async fn test_autosave_failure_resets_status() {
    let store = Arc::new(MockStore::default());
    store.with(|s| s.fail_autosave = true);
    let coordinator = underground_coordinator(&store);
    let status = coordinator.subscribe_status();

    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "10")
        .unwrap();
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(store.autosaves(), 1);
    assert_eq!(*status.borrow(), AutoSaveStatus::Idle);

    assert!(coordinator.autosave_now().await.is_err());
    assert_eq!(coordinator.status(), AutoSaveStatus::Idle);
    assert_eq!(coordinator.total(), 428.31, "The edit itself stands");
    println!("✓ Failed autosaves fall back to idle");
}

#[tokio::test(start_paused = true)]
async fn test_version_options() {
    let store = Arc::new(MockStore::default());
    let coordinator = underground_coordinator(&store);

    let options = coordinator.refresh_versions().await;
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].value, "draft");
    assert_eq!(options[0].label, "Draft - Version 1");

    let (blob, _) = underground_blob("1");
    store.add_version("v1", blob);
    let options = coordinator.refresh_versions().await;
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].label, "Draft - Version 2");
    assert_eq!(options[1].value, "v1");
    assert_eq!(options[1].label, "Version 1 - Mar 5, 2024, 2:07 PM - estimator");
    assert_eq!(coordinator.version_options(), options);
    println!("✓ Version picker lists the draft first");
}

#[tokio::test(start_paused = true)]
async fn test_save_creates_version_and_pushes_fields() {
    let store = Arc::new(MockStore::default());
    let coordinator = underground_coordinator(&store);

    let outcome = coordinator.on_cell_edit(&pump_quantity(), "1200").unwrap();
    assert!(matches!(outcome, EditOutcome::Applied { .. }));

    let report = coordinator.save().await.unwrap();
    assert_eq!(report.version.version_number, 1);
    assert_eq!(report.version.title, "BidWorksheet_Underground");
    assert!(report.warnings.is_empty());
    assert_eq!(report.fields["Pump_Direct_Cost_Total__c"], serde_json::json!(1200.0));
    assert_eq!(
        store.with(|s| s.record["Pump_Direct_Cost_Total__c"].clone()),
        serde_json::json!(1200.0)
    );
    assert_eq!(coordinator.version_options()[0].label, "Draft - Version 2");

    // The explicit save replaces the pending autosave
    assert!(!coordinator.has_pending_autosave());
    sleep(Duration::from_secs(5)).await;
    assert_eq!(store.autosaves(), 0);
    println!("✓ Save stores a version and updates the record");
}

#[tokio::test(start_paused = true)]
async fn test_record_update_failure_is_a_warning() {
    let store = Arc::new(MockStore::default());
    store.with(|s| s.fail_record = true);
    let coordinator = underground_coordinator(&store);

    coordinator.on_cell_edit(&pump_quantity(), "1200").unwrap();
    let report = coordinator.save().await.expect("version is still stored");
    assert_eq!(report.warnings.len(), 1);
    assert!(
        report.warnings[0].starts_with("Saved, but the record fields were not updated"),
        "unexpected warning: {}",
        report.warnings[0]
    );
    assert_eq!(store.with(|s| s.versions.len()), 1);

    // No fields, no record update
    let empty = underground_coordinator(&store);
    let report = empty.save().await.unwrap();
    assert!(report.fields.is_empty());
    assert!(report.warnings.is_empty());
    let updates = store
        .calls()
        .iter()
        .filter(|call| *call == "update_external_record")
        .count();
    assert_eq!(updates, 1);
    println!("✓ Record update problems do not fail the save");
}

#[tokio::test(start_paused = true)]
async fn test_save_from_a_version_returns_to_the_draft() {
    let store = Arc::new(MockStore::default());
    let (blob, _) = underground_blob("2");
    store.add_version("v1", blob);
    let coordinator = underground_coordinator(&store);

    assert!(coordinator.select_version("v1").await.unwrap());
    assert_eq!(coordinator.selection(), Selection::Version("v1".to_string()));

    let report = coordinator.save().await.unwrap();
    assert_eq!(report.version.version_number, 2);
    assert_eq!(coordinator.selection(), Selection::Draft);

    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "5")
        .unwrap();
    assert!(coordinator.has_pending_autosave());
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(store.autosaves(), 1, "Edits after the save are autosaved");
    println!("✓ Explicit save lands back on the draft");
}

#[tokio::test(start_paused = true)]
async fn test_external_version_reload_guard() {
    let store = Arc::new(MockStore::default());
    let (latest_blob, latest_total) = underground_blob("4");
    let (version_blob, version_total) = underground_blob("2");
    store.with(|s| s.latest = Some(latest_blob));
    store.add_version("v1", version_blob);
    let coordinator = underground_coordinator(&store);

    // First push loads the pushed version itself
    assert!(coordinator.on_external_version(Some("v1")).await.unwrap());
    assert_eq!(store.calls(), vec!["load_version:v1"]);
    assert_eq!(coordinator.total(), version_total);
    assert_eq!(coordinator.selection(), Selection::Version("v1".to_string()));

    // Same id again is ignored
    assert!(!coordinator.on_external_version(Some("v1")).await.unwrap());

    // Draft or blank means the latest snapshot
    assert!(coordinator.on_external_version(Some("draft")).await.unwrap());
    assert_eq!(store.calls().last().map(String::as_str), Some("load_latest"));
    assert_eq!(coordinator.total(), latest_total);
    assert_eq!(coordinator.selection(), Selection::Draft);
    assert!(!coordinator.on_external_version(None).await.unwrap());

    // A push while the user is typing is skipped
    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Right), "1")
        .unwrap();
    assert!(coordinator.is_editing());
    assert!(!coordinator.on_external_version(Some("v1")).await.unwrap());
    assert_eq!(coordinator.selection(), Selection::Draft);

    // ...and taken once the typing has stopped
    sleep(Duration::from_secs(3)).await;
    assert!(!coordinator.is_editing());
    assert!(coordinator.on_external_version(Some("v1")).await.unwrap());
    assert_eq!(coordinator.total(), version_total);
    assert_eq!(coordinator.selection(), Selection::Version("v1".to_string()));

    let version_loads = store
        .calls()
        .iter()
        .filter(|call| *call == "load_version:v1")
        .count();
    assert_eq!(version_loads, 2);
    println!("✓ Pushed versions reload only when new and idle");
}

#[tokio::test(start_paused = true)]
async fn test_external_version_waits_for_running_save() {
    let store = Arc::new(MockStore::default());
    let (blob, version_total) = underground_blob("2");
    store.add_version("v1", blob);
    store.with(|s| s.autosave_delay = Some(Duration::from_secs(1)));
    let coordinator = underground_coordinator(&store);

    coordinator
        .on_cell_edit(&quantity(1, 0, Side::Left), "10")
        .unwrap();
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(coordinator.status(), AutoSaveStatus::Saving);

    assert!(!coordinator.on_external_version(Some("v1")).await.unwrap());
    assert!(!store.calls().contains(&"load_version:v1".to_string()));
    assert_eq!(coordinator.total(), 428.31);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(coordinator.status(), AutoSaveStatus::Saved);
    assert!(coordinator.on_external_version(Some("v1")).await.unwrap());
    assert_eq!(coordinator.total(), version_total);
    println!("✓ No reload while an autosave is being written");
}
