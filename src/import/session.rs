use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use super::dedup::deduplicate;
use super::columns::ParseOptions;
use super::error::ImportError;
use super::mapper::to_persisted;
use super::notifier::{Notification, NotificationLevel, Notifier};
use super::parser::parse_file;
use super::timestamps::now_iso;
use crate::auth::AuthProvider;
use crate::models::{
    FileId, FileImportState, FileStatus, ImportSettings, IncomingFile, ParsedTrade, PersistedTrade, RawFile, Transition,
};
use crate::store::TradeStore;

/// Outcome of handing files to the session
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub accepted: Vec<FileId>,
    pub rejected: Vec<String>,
}

/// Outcome of a successful import
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub files: usize,
    pub submitted: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub batch_id: Option<String>,
}

/// File counts per lifecycle status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub pending: usize,
    pub parsing: usize,
    pub parsed: usize,
    pub error: usize,
    pub importing: usize,
    pub imported: usize,
    pub trades: usize,
}

struct SessionState {
    // Replaced as a whole; readers keep the snapshot they were handed
    files: Arc<Vec<FileImportState>>,
    transitions: Vec<Transition>,
}

impl SessionState {
    fn record(&mut self, file_id: FileId, from: Option<FileStatus>, to: FileStatus) {
        self.transitions.push(Transition {
            file_id,
            from,
            to,
            at: Utc::now(),
        });
    }

    /// Move one file to `to`, letting `apply` attach trades or an error.
    fn transition<F>(&mut self, file_id: FileId, to: FileStatus, apply: F) -> Result<(), ImportError>
    where
        F: FnOnce(&mut FileImportState),
    {
        let idx = self
            .files
            .iter()
            .position(|f| f.id == file_id)
            .ok_or(ImportError::UnknownFile(file_id))?;

        let from = self.files[idx].status;
        if !from.can_transition_to(to) {
            return Err(ImportError::InvalidTransition { file_id, from, to });
        }

        let files = Arc::make_mut(&mut self.files);
        files[idx].status = to;
        apply(&mut files[idx]);

        self.record(file_id, Some(from), to);
        Ok(())
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    settings: ImportSettings,
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn TradeStore>,
    notifier: Arc<dyn Notifier>,
}

/// In-memory import session: the selected files, their parse results and
/// the import action. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ImportSession {
    inner: Arc<SessionInner>,
}

impl ImportSession {
    pub fn new(
        settings: ImportSettings,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn TradeStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    files: Arc::new(Vec::new()),
                    transitions: Vec::new(),
                }),
                tasks: Mutex::new(Vec::new()),
                settings,
                auth,
                store,
                notifier,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, level: NotificationLevel, title: &str, message: impl Into<String>) {
        self.inner.notifier.notify(Notification::new(level, title, message));
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.inner.settings
    }

    /// Snapshot of the file list
    pub fn files(&self) -> Arc<Vec<FileImportState>> {
        Arc::clone(&self.state().files)
    }

    pub fn file(&self, file_id: FileId) -> Option<FileImportState> {
        self.state().files.iter().find(|f| f.id == file_id).cloned()
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.state().transitions.clone()
    }

    /// Accept the supported files and start parsing each one in the
    /// background. Must be called from within a Tokio runtime.
    pub fn ingest(&self, incoming: Vec<IncomingFile>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut accepted = Vec::new();

        for file in incoming {
            let name = file.name.clone();
            match RawFile::classify(file) {
                Some(raw) => accepted.push(raw),
                None => {
                    log::warn!("Skipping unsupported file: {}", name);
                    report.rejected.push(name);
                }
            }
        }

        if accepted.is_empty() {
            self.notify(
                NotificationLevel::Warning,
                "Invalid files",
                "Please select CSV or Excel files (.csv, .xlsx, .xls)",
            );
            return report;
        }

        let mut jobs = Vec::with_capacity(accepted.len());
        {
            let mut state = self.state();
            for raw in accepted {
                let entry = FileImportState::new(raw.clone());
                let id = entry.id;
                Arc::make_mut(&mut state.files).push(entry);
                state.record(id, None, FileStatus::Pending);
                report.accepted.push(id);
                jobs.push((id, raw));
            }
        }

        let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|handle| !handle.is_finished());
        for (id, raw) in jobs {
            let session = self.clone();
            tasks.push(tokio::spawn(async move { session.parse_one(id, raw).await }));
        }

        log::info!(
            "Ingested {} file(s), rejected {}",
            report.accepted.len(),
            report.rejected.len()
        );
        report
    }

    async fn parse_one(&self, file_id: FileId, raw: RawFile) {
        if self.state().transition(file_id, FileStatus::Parsing, |_| {}).is_err() {
            log::debug!("File {} removed before parsing started", file_id);
            return;
        }

        let name = raw.name.clone();
        let options = ParseOptions::from_settings(&self.inner.settings, now_iso());
        let result = tokio::task::spawn_blocking(move || parse_file(&raw, &options))
            .await
            .map_err(ImportError::from)
            .and_then(|parsed| parsed);

        match result {
            Ok(trades) => {
                let count = trades.len();
                let trades = Arc::new(trades);
                let applied = self.state().transition(file_id, FileStatus::Parsed, |f| {
                    f.trades = Some(trades);
                    f.error = None;
                });
                if applied.is_err() {
                    log::debug!("Discarding parse result for removed file {}", file_id);
                    return;
                }
                log::info!("Parsed {}: {} trades", name, count);
                self.notify(
                    NotificationLevel::Success,
                    "File parsed",
                    format!("Found {} trades in {}", count, name),
                );
            }
            Err(e) => {
                let message = e.to_string();
                let applied = self.state().transition(file_id, FileStatus::Error, |f| {
                    f.error = Some(message.clone());
                    f.trades = None;
                });
                if applied.is_err() {
                    log::debug!("Discarding parse failure for removed file {}", file_id);
                    return;
                }
                log::error!("Failed to parse {}: {}", name, message);
                self.notify(
                    NotificationLevel::Error,
                    "Parse failed",
                    format!("Failed to parse {}: {}", name, message),
                );
            }
        }
    }

    /// Wait for every parse task started so far
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tasks = self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                tasks.drain(..).collect()
            };
            if handles.is_empty() {
                break;
            }
            for joined in futures::future::join_all(handles).await {
                if let Err(e) = joined {
                    log::error!("Parse task panicked: {}", e);
                }
            }
        }
    }

    pub fn remove(&self, file_id: FileId) -> Result<(), ImportError> {
        let mut state = self.state();
        let idx = state
            .files
            .iter()
            .position(|f| f.id == file_id)
            .ok_or(ImportError::UnknownFile(file_id))?;
        let removed = Arc::make_mut(&mut state.files).remove(idx);
        log::debug!("Removed {} from session", removed.file.name);
        Ok(())
    }

    /// Drop every file and start a fresh transition log
    pub fn clear(&self) {
        let mut state = self.state();
        state.files = Arc::new(Vec::new());
        state.transitions.clear();
    }

    /// Trades an import would submit right now, before mapping
    pub fn deduplicated_trades(&self) -> Vec<ParsedTrade> {
        let files = self.files();
        deduplicate(
            files
                .iter()
                .filter(|f| f.status == FileStatus::Parsed)
                .filter_map(|f| f.trades.as_ref())
                .flat_map(|trades| trades.iter().cloned()),
        )
    }

    pub fn summary(&self) -> SessionSummary {
        let files = self.files();
        let mut summary = SessionSummary::default();
        for file in files.iter() {
            match file.status {
                FileStatus::Pending => summary.pending += 1,
                FileStatus::Parsing => summary.parsing += 1,
                FileStatus::Parsed => summary.parsed += 1,
                FileStatus::Error => summary.error += 1,
                FileStatus::Importing => summary.importing += 1,
                FileStatus::Imported => summary.imported += 1,
            }
            summary.trades += file.trade_count();
        }
        summary
    }

    /// Submit every parsed file's trades as one deduplicated batch.
    ///
    /// On success the files become `imported`; on any failure they go back
    /// to `parsed` so the import can be retried.
    pub async fn import_trades(&self) -> Result<ImportSummary, ImportError> {
        let Some(user) = self.inner.auth.current_user().await else {
            self.notify(NotificationLevel::Error, "Import failed", "Please sign in to import trades");
            return Err(ImportError::NotAuthenticated);
        };

        let (file_ids, trades) = match self.begin_import() {
            Ok(batch) => batch,
            Err(e) => {
                self.notify(NotificationLevel::Error, "Import failed", e.to_string());
                return Err(e);
            }
        };

        let unique = deduplicate(trades.iter().flat_map(|t| t.iter().cloned()));
        let records: Vec<PersistedTrade> = unique
            .iter()
            .map(|t| to_persisted(t, &user.user_id, &self.inner.settings.asset_type))
            .collect();

        log::info!(
            "Submitting {} trades from {} file(s) for {}",
            records.len(),
            file_ids.len(),
            user.user_id
        );

        let failure = match self.inner.store.submit_batch(&user.user_id, &records).await {
            Ok(outcome) if outcome.success => {
                self.finish_import(&file_ids, FileStatus::Imported);
                self.notify(
                    NotificationLevel::Success,
                    "Import complete",
                    format!(
                        "Imported {} trades ({} duplicates skipped)",
                        outcome.count, outcome.duplicates
                    ),
                );
                return Ok(ImportSummary {
                    files: file_ids.len(),
                    submitted: records.len(),
                    imported: outcome.count,
                    duplicates: outcome.duplicates,
                    batch_id: outcome.batch_id,
                });
            }
            Ok(outcome) => outcome
                .error
                .unwrap_or_else(|| "Trade store rejected the batch".to_string()),
            Err(e) => e.to_string(),
        };

        self.finish_import(&file_ids, FileStatus::Parsed);
        log::error!("Import failed: {}", failure);
        self.notify(NotificationLevel::Error, "Import failed", failure.clone());
        Err(ImportError::ImportFailed(failure))
    }

    /// Check preconditions and mark every parsed file `importing` under one
    /// lock, so two imports can never claim the same files.
    #[allow(clippy::type_complexity)]
    fn begin_import(&self) -> Result<(Vec<FileId>, Vec<Arc<Vec<ParsedTrade>>>), ImportError> {
        let mut state = self.state();

        if state.files.iter().any(|f| f.status == FileStatus::Importing) {
            return Err(ImportError::ImportInProgress);
        }

        let ready: Vec<(FileId, Arc<Vec<ParsedTrade>>)> = state
            .files
            .iter()
            .filter(|f| f.status == FileStatus::Parsed)
            .map(|f| (f.id, f.trades.clone().unwrap_or_default()))
            .collect();

        if ready.is_empty() {
            return Err(ImportError::NothingToImport);
        }

        let mut file_ids = Vec::with_capacity(ready.len());
        let mut trades = Vec::with_capacity(ready.len());
        for (id, file_trades) in ready {
            state.transition(id, FileStatus::Importing, |_| {})?;
            file_ids.push(id);
            trades.push(file_trades);
        }

        Ok((file_ids, trades))
    }

    fn finish_import(&self, file_ids: &[FileId], to: FileStatus) {
        let mut state = self.state();
        for &id in file_ids {
            // Files removed mid-import are simply gone
            if let Err(e) = state.transition(id, to, |_| {}) {
                log::debug!("Skipping status update: {}", e);
            }
        }
    }
}
