use crate::errors::Result;
use crate::period::{PeriodResolver, DEFAULT_PERIOD, PERIOD_SETTING_KEY};
use crate::pipeline::{ComputationStep, TaskContext};
use tracing::info;

/// Resolves the differential period of the root component.
pub struct LoadPeriodStep;

impl ComputationStep for LoadPeriodStep {
    fn description(&self) -> &'static str {
        "Load differential period"
    }

    fn execute(&self, ctx: &mut TaskContext) -> Result<()> {
        let root = ctx.tree.get()?.root();
        // An explicitly blank setting disables the period
        let setting = if ctx.settings.contains_key(PERIOD_SETTING_KEY) {
            ctx.settings.get_string(PERIOD_SETTING_KEY)
        } else {
            Some(DEFAULT_PERIOD)
        };

        let snapshots = ctx.storage().snapshots().select_by_component(&root.uuid)?;
        let period = PeriodResolver::new(
            &snapshots,
            root.component_type,
            ctx.analysis.date,
            ctx.analysis.version.as_deref(),
        )
        .resolve(setting);

        if let Some(period) = &period {
            info!(mode = %period.mode, baseline = %period.analysis_uuid, "Differential period resolved");
        }
        ctx.period.set(period)
    }
}
