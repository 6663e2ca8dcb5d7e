//! Differential period ("new code") resolution.
//!
//! The `ce.newCode.period` setting selects the baseline analysis the current
//! analysis is compared with. At most one period is resolved per task; when
//! nothing resolves, differential measures are simply not computed.

use crate::clock::DAY_MILLIS;
use crate::component::ComponentType;
use crate::errors::{CeError, Result};
use crate::storage::SnapshotRow;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub const PERIOD_SETTING_KEY: &str = "ce.newCode.period";
pub const DEFAULT_PERIOD: &str = "previous_version";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodMode {
    Date,
    Days,
    PreviousAnalysis,
    PreviousVersion,
    Version,
}

impl PeriodMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Days => "days",
            Self::PreviousAnalysis => "previous_analysis",
            Self::PreviousVersion => "previous_version",
            Self::Version => "version",
        }
    }
}

impl fmt::Display for PeriodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Baseline of the differential computations. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub mode: PeriodMode,
    pub mode_parameter: Option<String>,
    /// Creation date of the baseline analysis
    pub snapshot_date: i64,
    pub analysis_uuid: String,
}

impl Period {
    fn of(mode: PeriodMode, mode_parameter: Option<String>, snapshot: &SnapshotRow) -> Self {
        Self {
            mode,
            mode_parameter,
            snapshot_date: snapshot.created_at,
            analysis_uuid: snapshot.uuid.clone(),
        }
    }
}

/// Holds the period of the current task. Can be set exactly once.
#[derive(Debug, Default)]
pub struct PeriodHolder {
    period: OnceCell<Option<Period>>,
}

impl PeriodHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, period: Option<Period>) -> Result<()> {
        self.period
            .set(period)
            .map_err(|_| CeError::state("Period can only be set once"))
    }

    /// The resolved period; fails if resolution has not run yet.
    pub fn period(&self) -> Result<Option<&Period>> {
        self.period
            .get()
            .map(Option::as_ref)
            .ok_or_else(|| CeError::state("Period has not been initialized yet"))
    }

    pub fn has_period(&self) -> bool {
        matches!(self.period.get(), Some(Some(_)))
    }

    pub fn is_initialized(&self) -> bool {
        self.period.get().is_some()
    }
}

/// Resolves the configured period against the analyses of the root component.
pub struct PeriodResolver<'a> {
    /// Processed analyses, oldest first
    history: Vec<&'a SnapshotRow>,
    analysis_date: i64,
    current_version: Option<&'a str>,
    root_type: ComponentType,
}

impl<'a> PeriodResolver<'a> {
    pub fn new(
        snapshots: &'a [SnapshotRow],
        root_type: ComponentType,
        analysis_date: i64,
        current_version: Option<&'a str>,
    ) -> Self {
        let mut history: Vec<&SnapshotRow> = snapshots.iter().filter(|s| s.is_processed()).collect();
        history.sort_by_key(|s| s.created_at);
        Self {
            history,
            analysis_date,
            current_version,
            root_type,
        }
    }

    pub fn resolve(&self, setting: Option<&str>) -> Option<Period> {
        let setting = setting.map(str::trim).filter(|s| !s.is_empty())?;
        if self.history.is_empty() {
            debug!("First analysis, no differential period");
            return None;
        }

        if let Ok(date) = NaiveDate::parse_from_str(setting, "%Y-%m-%d") {
            return self.resolve_by_date(date, setting);
        }
        if let Ok(days) = setting.parse::<i64>() {
            return self.resolve_by_days(days);
        }
        match setting {
            "previous_analysis" => self.resolve_by_previous_analysis(),
            "previous_version" => self.resolve_by_previous_version(),
            label => self.resolve_by_version(label),
        }
    }

    fn resolve_by_date(&self, date: NaiveDate, setting: &str) -> Option<Period> {
        let target = date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis();
        if target > self.analysis_date {
            debug!(date = setting, "Period date is in the future");
            return None;
        }
        let snapshot = self.first_at_or_after(target)?;
        debug!(
            "Compare to date {} (analysis of {})",
            setting,
            format_date(snapshot.created_at)
        );
        Some(Period::of(PeriodMode::Date, Some(setting.to_string()), snapshot))
    }

    fn resolve_by_days(&self, days: i64) -> Option<Period> {
        if days <= 0 {
            debug!(days, "Period day count must be positive");
            return None;
        }
        let Some(target) = days
            .checked_mul(DAY_MILLIS)
            .and_then(|span| self.analysis_date.checked_sub(span))
        else {
            debug!(days, "Period day count is out of range");
            return None;
        };
        let snapshot = self.first_at_or_after(target)?;
        debug!(
            "Compare over {} days ({}, analysis of {})",
            days,
            format_date(target),
            format_date(snapshot.created_at)
        );
        Some(Period::of(PeriodMode::Days, Some(days.to_string()), snapshot))
    }

    fn resolve_by_previous_analysis(&self) -> Option<Period> {
        let snapshot = self.history.last()?;
        debug!("Compare to previous analysis ({})", format_date(snapshot.created_at));
        Some(Period::of(PeriodMode::PreviousAnalysis, None, snapshot))
    }

    fn resolve_by_previous_version(&self) -> Option<Period> {
        if self.root_type.is_view_type() {
            debug!("Previous version period is not supported on views");
            return None;
        }
        let previous = self
            .version_starts()
            .into_iter()
            .rev()
            .find(|s| s.version.as_deref() != self.current_version);
        match previous {
            Some(snapshot) => {
                debug!("Compare to previous version ({})", format_date(snapshot.created_at));
                Some(Period::of(PeriodMode::PreviousVersion, snapshot.version.clone(), snapshot))
            }
            None => {
                let first = self.history.first()?;
                debug!("Compare to previous version ({})", format_date(first.created_at));
                Some(Period::of(PeriodMode::PreviousVersion, None, first))
            }
        }
    }

    fn resolve_by_version(&self, label: &str) -> Option<Period> {
        let snapshot = self
            .version_starts()
            .into_iter()
            .rev()
            .find(|s| s.version.as_deref() == Some(label))?;
        debug!(
            "Compare to version ({}) ({})",
            label,
            format_date(snapshot.created_at)
        );
        Some(Period::of(PeriodMode::Version, Some(label.to_string()), snapshot))
    }

    /// Oldest analysis created at or after `target`.
    fn first_at_or_after(&self, target: i64) -> Option<&'a SnapshotRow> {
        self.history.iter().copied().find(|s| s.created_at >= target)
    }

    /// Analyses where a new version label first appears, oldest first.
    fn version_starts(&self) -> Vec<&'a SnapshotRow> {
        let mut previous: Option<&str> = None;
        let mut starts = Vec::new();
        for snapshot in &self.history {
            let version = snapshot.version.as_deref();
            if version.is_some() && version != previous {
                starts.push(*snapshot);
            }
            previous = version;
        }
        starts
    }
}

fn format_date(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| millis.to_string())
}
