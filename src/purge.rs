//! Retention and cleanup run after every task.
//!
//! The purge has two independent phases. History cleaning removes old
//! analyses and closed issues. The structural purge removes rows that belong
//! to disabled components and analyses that never completed. A failing phase
//! is logged and never prevents the other from running, nor does it change the
//! outcome of the task that triggered it.

use crate::clock::{Clock, DAY_MILLIS};
use crate::component::ComponentType;
use crate::config::{
    Settings, DELETE_CLOSED_ISSUES_DAYS_KEY, KEEP_HISTORY_DAYS_KEY, PURGE_PROFILING_KEY,
};
use crate::errors::{CeError, Result};
use crate::queue::TaskStatus;
use crate::observability::Profiler;
use crate::storage::{SnapshotRow, Storage};
use std::sync::Arc;
use tracing::{debug, error, info, info_span};

const DEFAULT_KEEP_HISTORY_DAYS: i64 = 365;
const DEFAULT_DELETE_CLOSED_ISSUES_DAYS: i64 = 30;

/// Options resolved from the settings of the purged component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOptions {
    pub keep_history_days: i64,
    pub delete_closed_issues_after_days: i64,
    pub profiling: bool,
}

impl PurgeOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            keep_history_days: settings
                .get_i64(KEEP_HISTORY_DAYS_KEY)?
                .unwrap_or(DEFAULT_KEEP_HISTORY_DAYS),
            delete_closed_issues_after_days: settings
                .get_i64(DELETE_CLOSED_ISSUES_DAYS_KEY)?
                .unwrap_or(DEFAULT_DELETE_CLOSED_ISSUES_DAYS),
            profiling: settings.get_bool(PURGE_PROFILING_KEY)?.unwrap_or(false),
        })
    }
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            keep_history_days: DEFAULT_KEEP_HISTORY_DAYS,
            delete_closed_issues_after_days: DEFAULT_DELETE_CLOSED_ISSUES_DAYS,
            profiling: false,
        }
    }
}

/// Which phases completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub skipped: bool,
    pub history_cleaned: bool,
    pub structure_purged: bool,
}

pub struct PurgeTask {
    storage: Arc<dyn Storage>,
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
}

impl PurgeTask {
    pub fn new(storage: Arc<dyn Storage>, settings: Arc<Settings>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            settings,
            clock,
        }
    }

    /// Purge a project. Views are left alone. Never fails: errors are logged.
    pub fn purge(&self, component_uuid: &str, component_type: ComponentType) -> PurgeOutcome {
        let _span = info_span!("purge", component = component_uuid).entered();
        if component_type.is_view_type() {
            debug!(%component_type, "Purge skipped for views");
            return PurgeOutcome {
                skipped: true,
                ..PurgeOutcome::default()
            };
        }

        let component_key = self.component_key(component_uuid);
        let options = self.options(component_key.as_deref());
        let profiler = Profiler::new();

        let history_cleaned = match self.clean_history(component_uuid, &options, &profiler) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to clean history of component");
                false
            }
        };
        let structure_purged = match self.purge_structure(component_uuid, component_key.as_deref(), &profiler) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to purge disabled data of component");
                false
            }
        };

        if options.profiling {
            info!("Purge profiling\n{}", profiler.report().to_summary());
        }

        PurgeOutcome {
            skipped: false,
            history_cleaned,
            structure_purged,
        }
    }

    /// Purge the component stored under `component_key`, if any.
    pub fn purge_by_key(&self, component_key: &str) -> PurgeOutcome {
        match self.storage.components().select_by_key(component_key) {
            Ok(Some(row)) => self.purge(&row.uuid, row.component_type),
            Ok(None) => {
                debug!(component = component_key, "Nothing to purge, component unknown");
                PurgeOutcome {
                    skipped: true,
                    ..PurgeOutcome::default()
                }
            }
            Err(e) => {
                error!(component = component_key, error = %e, "Failed to load component to purge");
                PurgeOutcome::default()
            }
        }
    }

    /// Key of the purged component, when it is stored.
    fn component_key(&self, component_uuid: &str) -> Option<String> {
        match self.storage.components().select_by_root(component_uuid) {
            Ok(rows) => rows
                .into_iter()
                .find(|r| r.uuid == component_uuid)
                .map(|r| r.key),
            Err(e) => {
                error!(error = %e, "Failed to load component to purge");
                None
            }
        }
    }

    /// Settings of the project when its key is known, global ones otherwise.
    fn options(&self, component_key: Option<&str>) -> PurgeOptions {
        let settings = match component_key {
            Some(key) => self.settings.for_component(key),
            None => (*self.settings).clone(),
        };
        PurgeOptions::from_settings(&settings).unwrap_or_else(|e| {
            error!(error = %e, "Invalid purge settings, using defaults");
            PurgeOptions::default()
        })
    }

    fn clean_history(
        &self,
        component_uuid: &str,
        options: &PurgeOptions,
        profiler: &Profiler,
    ) -> Result<()> {
        let now = self.clock.now_millis();
        let snapshots = self.storage.snapshots();

        let history_limit = days_before(now, options.keep_history_days, KEEP_HISTORY_DAYS_KEY)?;
        let old: Vec<String> = snapshots
            .select_by_component(component_uuid)?
            .into_iter()
            .filter(|s| s.is_processed() && !s.last && s.created_at < history_limit)
            .map(|s| s.uuid)
            .collect();
        if !old.is_empty() {
            self.delete_analyses(&old, "history", profiler)?;
        }

        let closed_limit = days_before(
            now,
            options.delete_closed_issues_after_days,
            DELETE_CLOSED_ISSUES_DAYS_KEY,
        )?;
        let mut span = profiler.span("purge.closed_issues");
        let deleted = self
            .storage
            .issues()
            .delete_closed_before(component_uuid, closed_limit)?;
        span.rows(deleted);
        debug!(analyses = old.len(), issues = deleted, "History cleaned");
        Ok(())
    }

    fn purge_structure(
        &self,
        component_uuid: &str,
        component_key: Option<&str>,
        profiler: &Profiler,
    ) -> Result<()> {
        let disabled: Vec<String> = self
            .storage
            .components()
            .select_by_root(component_uuid)?
            .into_iter()
            .filter(|c| !c.enabled)
            .map(|c| c.uuid)
            .collect();

        if !disabled.is_empty() {
            let mut span = profiler.span("purge.disabled.measures");
            span.rows(self.storage.measures().delete_by_components(&disabled)?);
            drop(span);

            let mut span = profiler.span("purge.disabled.line_hashes");
            span.rows(self.storage.line_hashes().delete_referencing(&disabled)?);
            drop(span);

            let mut span = profiler.span("purge.disabled.dependencies");
            span.rows(self.storage.dependencies().delete_referencing(&disabled)?);
        }

        let unprocessed = self.unprocessed_analyses(component_uuid)?;
        let unprocessed = if unprocessed.is_empty() {
            unprocessed
        } else if self.has_task_in_progress(component_uuid, component_key)? {
            debug!(
                count = unprocessed.len(),
                "Unprocessed analyses kept while a task of the component is in progress"
            );
            Vec::new()
        } else {
            // Analyses enabled since the first read belong to a task that just finished.
            let still_unprocessed = self.unprocessed_analyses(component_uuid)?;
            unprocessed
                .into_iter()
                .filter(|uuid| still_unprocessed.contains(uuid))
                .collect()
        };
        if !unprocessed.is_empty() {
            self.delete_analyses(&unprocessed, "unprocessed", profiler)?;
        }
        debug!(
            disabled = disabled.len(),
            unprocessed = unprocessed.len(),
            "Disabled data purged"
        );
        Ok(())
    }

    fn unprocessed_analyses(&self, component_uuid: &str) -> Result<Vec<String>> {
        Ok(self
            .storage
            .snapshots()
            .select_by_component(component_uuid)?
            .into_iter()
            .filter(|s: &SnapshotRow| !s.is_processed())
            .map(|s| s.uuid)
            .collect())
    }

    fn has_task_in_progress(
        &self,
        component_uuid: &str,
        component_key: Option<&str>,
    ) -> Result<bool> {
        Ok(self.storage.queue().select_tasks()?.iter().any(|t| {
            t.status == TaskStatus::InProgress
                && (t.component_uuid.as_deref() == Some(component_uuid)
                    || Some(t.component_key.as_str()) == component_key)
        }))
    }

    fn delete_analyses(&self, uuids: &[String], kind: &str, profiler: &Profiler) -> Result<()> {
        let mut span = profiler.span(&format!("purge.{}.measures", kind));
        span.rows(self.storage.measures().delete_by_analyses(uuids)?);
        drop(span);

        let mut span = profiler.span(&format!("purge.{}.analyses", kind));
        span.rows(self.storage.snapshots().delete(uuids)?);
        Ok(())
    }
}

/// `now` minus `days` days, or a configuration error when out of range.
fn days_before(now: i64, days: i64, setting: &str) -> Result<i64> {
    days.checked_mul(DAY_MILLIS)
        .and_then(|span| now.checked_sub(span))
        .ok_or_else(|| CeError::config(format!("{} is out of range: {}", setting, days)))
}
