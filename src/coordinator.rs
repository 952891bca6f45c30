//! Draft/version state machine around one worksheet.
//!
//! Edits land in the draft and schedule a debounced autosave. Selecting a saved
//! version first makes sure nothing typed into the draft is lost: an in-flight
//! save is awaited and a pending one is flushed before the version is loaded.
//! The worksheet itself sits behind a `std::sync::Mutex` that is only held for
//! synchronous work; store calls happen with the lock released.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout};

use crate::codec::Envelope;
use crate::config::CoordinatorConfig;
use crate::editor::{EditController, EditOutcome};
use crate::error::Result;
use crate::extract::{FieldMap, extract_fields};
use crate::persistence::{VersionInfo, WorksheetStore};
use crate::worksheet::{EditTarget, Worksheet, WorksheetKind};

pub const DRAFT_ID: &str = "draft";

/// Visible autosave indicator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AutoSaveStatus {
    #[serde(rename = "")]
    Idle,
    #[serde(rename = "saving")]
    Saving,
    #[serde(rename = "saved")]
    Saved,
}

impl AutoSaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoSaveStatus::Idle => "",
            AutoSaveStatus::Saving => "saving",
            AutoSaveStatus::Saved => "saved",
        }
    }
}

impl fmt::Display for AutoSaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user is looking at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Draft,
    Version(String),
}

impl Selection {
    /// `"draft"`, blank or missing all mean the draft.
    pub fn parse(id: Option<&str>) -> Self {
        match id.map(str::trim) {
            None | Some("") => Selection::Draft,
            Some(id) if id.eq_ignore_ascii_case(DRAFT_ID) => Selection::Draft,
            Some(id) => Selection::Version(id.to_string()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Selection::Draft => DRAFT_ID,
            Selection::Version(id) => id,
        }
    }
}

/// One entry of the version picker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VersionOption {
    pub value: String,
    pub label: String,
}

pub fn draft_label(next_version_number: u32) -> String {
    format!("Draft - Version {}", next_version_number)
}

pub fn version_label(version_number: u32, created: DateTime<Utc>, created_by: &str) -> String {
    format!(
        "Version {} - {} - {}",
        version_number,
        created.format("%b %-d, %Y, %-I:%M %p"),
        created_by
    )
}

/// Draft first, then saved versions in the order given.
pub fn version_options(next_version_number: u32, versions: &[VersionInfo]) -> Vec<VersionOption> {
    let mut options = vec![VersionOption {
        value: DRAFT_ID.to_string(),
        label: draft_label(next_version_number),
    }];
    options.extend(versions.iter().map(|v| VersionOption {
        value: v.id.clone(),
        label: version_label(v.version_number, v.created_date, &v.created_by),
    }));
    options
}

/// Outcome of an explicit save. Extraction and record-update problems are
/// warnings; the version itself was stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub version: VersionInfo,
    pub fields: FieldMap,
    pub warnings: Vec<String>,
}

struct PendingAutosave {
    generation: u64,
    handle: AbortHandle,
}

struct State {
    worksheet: Box<dyn Worksheet>,
    editor: EditController,
    selection: Selection,
    next_version_number: u32,
    versions: Vec<VersionInfo>,
    has_loaded: bool,
    last_pushed_id: Option<String>,
    last_loaded_id: Option<String>,
    generation: u64,
    pending: Option<PendingAutosave>,
}

impl State {
    /// Drops a scheduled autosave. The generation bump keeps a timer that
    /// already woke up from saving.
    fn cancel_pending(&mut self) -> bool {
        self.generation += 1;
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }
}

struct Shared {
    kind: WorksheetKind,
    record_id: String,
    store: Arc<dyn WorksheetStore>,
    config: CoordinatorConfig,
    state: Mutex<State>,
    status: watch::Sender<AutoSaveStatus>,
    totals: watch::Sender<f64>,
}

/// Cheap-to-clone handle; every clone drives the same worksheet.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    pub fn new(
        record_id: &str,
        worksheet: Box<dyn Worksheet>,
        store: Arc<dyn WorksheetStore>,
        config: CoordinatorConfig,
    ) -> Self {
        let kind = worksheet.kind();
        let total = worksheet.total();
        let (status, _) = watch::channel(AutoSaveStatus::Idle);
        let (totals, _) = watch::channel(total);

        let state = State {
            worksheet,
            editor: EditController::new(config.editing_quiesce),
            selection: Selection::Draft,
            next_version_number: 1,
            versions: Vec::new(),
            has_loaded: false,
            last_pushed_id: None,
            last_loaded_id: None,
            generation: 0,
            pending: None,
        };

        Coordinator {
            shared: Arc::new(Shared {
                kind,
                record_id: record_id.to_string(),
                store,
                config,
                state: Mutex::new(state),
                status,
                totals,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn kind(&self) -> WorksheetKind {
        self.shared.kind
    }

    pub fn record_id(&self) -> &str {
        &self.shared.record_id
    }

    pub fn status(&self) -> AutoSaveStatus {
        *self.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<AutoSaveStatus> {
        self.shared.status.subscribe()
    }

    /// Receives the worksheet total after every recalculation.
    pub fn subscribe_totals(&self) -> watch::Receiver<f64> {
        self.shared.totals.subscribe()
    }

    pub fn selection(&self) -> Selection {
        self.state().selection.clone()
    }

    pub fn has_pending_autosave(&self) -> bool {
        self.state().pending.is_some()
    }

    pub fn is_editing(&self) -> bool {
        self.state().editor.is_editing()
    }

    pub fn total(&self) -> f64 {
        self.state().worksheet.total()
    }

    pub fn summary(&self) -> Value {
        self.state().worksheet.summary()
    }

    /// Runs `read` against the worksheet under the lock.
    pub fn with_worksheet<T>(&self, read: impl FnOnce(&dyn Worksheet) -> T) -> T {
        let state = self.state();
        read(state.worksheet.as_ref())
    }

    /// Current snapshot wrapped in its envelope.
    pub fn save_sheet(&self) -> Result<Envelope> {
        let body = self.state().worksheet.collect()?;
        Ok(Envelope::new(self.shared.kind, &self.shared.record_id, body))
    }

    pub fn version_options(&self) -> Vec<VersionOption> {
        let state = self.state();
        version_options(state.next_version_number, &state.versions)
    }

    /// Refreshes the version list, then loads the latest snapshot once.
    pub async fn initialize(&self) -> Result<()> {
        self.refresh_versions().await;
        self.load_latest().await?;
        Ok(())
    }

    /// Re-reads the saved versions and the next version number. A failing
    /// store leaves only the draft entry.
    pub async fn refresh_versions(&self) -> Vec<VersionOption> {
        let store = &self.shared.store;
        let (kind, record) = (self.shared.kind, self.shared.record_id.as_str());

        let listed = match store.list_versions(kind, record).await {
            Ok(versions) => versions,
            Err(e) => {
                warn!("listing {} versions failed: {}", kind, e);
                Vec::new()
            }
        };
        let next = match store.next_version_number(kind, record).await {
            Ok(next) => next,
            Err(e) => {
                warn!("next {} version number unavailable: {}", kind, e);
                listed.iter().map(|v| v.version_number).max().unwrap_or(0) + 1
            }
        };

        let mut state = self.state();
        state.versions = listed;
        state.next_version_number = next;
        version_options(next, &state.versions)
    }

    /// Loads the newest snapshot into the worksheet. Nothing saved yet is not
    /// an error; the template stays in place.
    pub async fn load_latest(&self) -> Result<bool> {
        let loaded = self
            .shared
            .store
            .load_latest(self.shared.kind, &self.shared.record_id)
            .await;
        self.apply_loaded(loaded, None)
    }

    fn apply_loaded(&self, loaded: Result<Option<String>>, id: Option<&str>) -> Result<bool> {
        let blob = match loaded {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                debug!("no saved {} for {}", self.shared.kind, self.shared.record_id);
                self.state().has_loaded = true;
                return Ok(false);
            }
            Err(e) if e.is_not_found() => {
                debug!("{} not found: {}", self.shared.kind, e);
                self.state().has_loaded = true;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let envelope = Envelope::decode(&blob)?;
        let body = envelope.body_value();

        let mut state = self.state();
        state.editor.set_loading(true);
        let restored = state.worksheet.restore(&body);
        state.editor.set_loading(false);
        restored?;

        state.has_loaded = true;
        if let Some(id) = id {
            state.last_loaded_id = Some(id.to_string());
        }
        let total = state.worksheet.total();
        drop(state);

        self.shared.totals.send_replace(total);
        info!(
            "{} loaded for {} (saved {}), total {:.2}",
            self.shared.kind, self.shared.record_id, envelope.saved_date, total
        );
        Ok(true)
    }

    /// Applies one user edit and, in the draft, restarts the autosave timer.
    pub fn on_cell_edit(&self, target: &EditTarget, value: &str) -> Result<EditOutcome> {
        let mut state = self.state();
        let state = &mut *state;
        let outcome = state.editor.on_cell_edit(
            state.worksheet.as_mut(),
            target,
            value,
            &self.shared.totals,
        )?;

        if let EditOutcome::Applied { notify: true, .. } = outcome {
            if state.selection == Selection::Draft {
                self.schedule_autosave(state);
            }
        }
        Ok(outcome)
    }

    /// Hands a peer worksheet's snapshot to this one (SOV takes the Design
    /// job name, for example).
    pub fn link_peer(&self, peer: WorksheetKind, body: &Value) {
        let mut state = self.state();
        state.worksheet.link(peer, body);
        let total = state.worksheet.total();
        drop(state);
        self.shared.totals.send_replace(total);
    }

    fn schedule_autosave(&self, state: &mut State) {
        state.cancel_pending();
        let generation = state.generation;
        let debounce = self.shared.config.autosave_debounce;
        let this = self.clone();

        let task = tokio::spawn(async move {
            sleep(debounce).await;
            this.fire_autosave(generation).await;
        });
        state.pending = Some(PendingAutosave {
            generation,
            handle: task.abort_handle(),
        });
        debug!("{} autosave scheduled (generation {})", self.shared.kind, generation);
    }

    async fn fire_autosave(&self, generation: u64) {
        {
            let mut state = self.state();
            let current = state.pending.as_ref().map(|p| p.generation);
            if current != Some(generation) || state.generation != generation {
                debug!("stale autosave timer {} ignored", generation);
                return;
            }
            state.pending = None;
        }
        if let Err(e) = self.autosave_now().await {
            error!("autosave of {} failed: {}", self.shared.kind, e);
        }
    }

    /// Collects the current state and writes it to the autosave slot.
    pub async fn autosave_now(&self) -> Result<()> {
        let blob = self.save_sheet()?.encode()?;
        self.shared.status.send_replace(AutoSaveStatus::Saving);

        let result = self
            .shared
            .store
            .autosave(self.shared.kind, &self.shared.record_id, &blob)
            .await;

        match result {
            Ok(()) => {
                self.shared.status.send_replace(AutoSaveStatus::Saved);
                self.decay_saved_status();
                debug!("{} autosaved for {}", self.shared.kind, self.shared.record_id);
                Ok(())
            }
            Err(e) => {
                self.shared.status.send_replace(AutoSaveStatus::Idle);
                Err(e)
            }
        }
    }

    fn decay_saved_status(&self) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            sleep(shared.config.saved_status).await;
            shared.status.send_if_modified(|status| {
                if *status == AutoSaveStatus::Saved {
                    *status = AutoSaveStatus::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }

    /// Switches between the draft and a saved version. The selection only
    /// moves once the target has actually been loaded; a missing version
    /// leaves the user where they were. Returns whether anything was loaded.
    pub async fn select_version(&self, id: &str) -> Result<bool> {
        let target = Selection::parse(Some(id));

        if let Selection::Version(_) = &target {
            if self.state().selection == Selection::Draft {
                self.flush_draft().await?;
            }
        }
        let loaded = self.load_selection(target).await?;
        info!(
            "{} now on {} (loaded: {})",
            self.shared.kind,
            self.selection().id(),
            loaded
        );
        Ok(loaded)
    }

    /// Loads the draft's latest snapshot or one saved version and commits the
    /// selection. Moving to a version drops any autosave still scheduled from
    /// the draft.
    async fn load_selection(&self, target: Selection) -> Result<bool> {
        let store = &self.shared.store;
        let (kind, record) = (self.shared.kind, self.shared.record_id.as_str());

        let loaded = match &target {
            Selection::Version(version_id) => store.load_version(kind, record, version_id).await,
            Selection::Draft => store.load_latest(kind, record).await,
        };
        let applied = self.apply_loaded(loaded, Some(target.id()))?;

        if applied || target == Selection::Draft {
            let mut state = self.state();
            if let Selection::Version(_) = target {
                state.cancel_pending();
            }
            state.selection = target;
        }
        Ok(applied)
    }

    /// Waits out an in-flight save, then saves a pending one immediately.
    async fn flush_draft(&self) -> Result<()> {
        let mut status = self.subscribe_status();
        let wait = status.wait_for(|s| *s != AutoSaveStatus::Saving);
        if timeout(self.shared.config.save_wait, wait).await.is_err() {
            warn!(
                "{} save still running after {:?}, switching anyway",
                self.shared.kind, self.shared.config.save_wait
            );
        }

        let had_pending = self.state().cancel_pending();
        if had_pending {
            debug!("{} flushing pending autosave before switch", self.shared.kind);
            self.autosave_now().await?;
        }
        Ok(())
    }

    /// Reacts to a version id pushed from outside. `"draft"` or blank means
    /// the latest snapshot, anything else a saved version. Loads on the first
    /// push, or when the id is new and not what was last loaded. Nothing is
    /// loaded while a save is running or, after the first load, while the
    /// user is typing; a skipped push is not remembered so it can be retried.
    pub async fn on_external_version(&self, pushed: Option<&str>) -> Result<bool> {
        let target = Selection::parse(pushed);
        let pushed_id = Some(target.id().to_string());

        let (reload, from_draft) = {
            let mut state = self.state();
            let saving = self.status() == AutoSaveStatus::Saving;
            let reload = if saving {
                debug!("{} reload deferred, save in progress", self.shared.kind);
                false
            } else if state.has_loaded && state.editor.is_editing() {
                debug!("{} reload skipped while editing", self.shared.kind);
                false
            } else {
                let changed =
                    pushed_id != state.last_pushed_id && pushed_id != state.last_loaded_id;
                let first = !state.has_loaded;
                state.last_pushed_id = pushed_id;
                first || changed
            };
            (reload, state.selection == Selection::Draft)
        };
        if !reload {
            return Ok(false);
        }

        if from_draft && target != Selection::Draft {
            self.flush_draft().await?;
        }
        self.load_selection(target).await
    }

    /// Stores a numbered version, refreshes the list and pushes extracted
    /// fields to the external record. Saving always lands back on the draft.
    pub async fn save(&self) -> Result<SaveReport> {
        let (envelope, body) = {
            let mut state = self.state();
            state.cancel_pending();
            let body = state.worksheet.collect()?;
            (
                Envelope::new(self.shared.kind, &self.shared.record_id, body.clone()),
                body,
            )
        };
        let blob = envelope.encode()?;

        let version = self
            .shared
            .store
            .save(self.shared.kind, &self.shared.record_id, &blob)
            .await?;
        self.state().selection = Selection::Draft;
        info!(
            "{} saved as version {} ({})",
            self.shared.kind, version.version_number, version.id
        );
        self.refresh_versions().await;

        let mut warnings = Vec::new();
        let fields = extract_fields(self.shared.kind, &body);
        if fields.is_empty() {
            warn!("{} produced no external fields", self.shared.kind);
        } else if let Err(e) = self
            .shared
            .store
            .update_external_record(&self.shared.record_id, &fields)
            .await
        {
            warn!("updating record {} failed: {}", self.shared.record_id, e);
            warnings.push(format!("Saved, but the record fields were not updated: {}", e));
        }

        Ok(SaveReport {
            version,
            fields,
            warnings,
        })
    }
}
