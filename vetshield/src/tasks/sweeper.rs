use anyhow::Context;
use tracing::{debug, instrument};

use crate::app_state::{AppState, SharedAppState};

/// What a single sweep removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub rate_records: usize,
    pub reset_tokens: usize,
}

/// Drop expired rate limit records and reset tokens.
#[instrument(skip(app_state))]
pub fn sweep(app_state: &AppState) -> SweepReport {
    let report = SweepReport {
        rate_records: app_state.monitor.limiter().purge_expired(),
        reset_tokens: app_state.reset_tokens.purge_expired(),
    };
    debug!(
        rate_records = report.rate_records,
        reset_tokens = report.reset_tokens,
        tracked_keys = app_state.monitor.limiter().tracked_keys(),
        "Sweep finished"
    );
    report
}

pub async fn setup_sweeper(
    app_state: SharedAppState,
) -> anyhow::Result<tokio::task::JoinHandle<anyhow::Result<()>>> {
    let interval = u32::try_from(app_state.settings.security.sweep_interval_seconds)
        .context("security.sweep_interval_seconds is out of range")?;

    let stop_flag = app_state.stop_flag.clone();
    let mut scheduler = clokwerk::AsyncScheduler::new();
    {
        let app_state = app_state.clone();
        scheduler
            .every(clokwerk::Interval::Seconds(interval))
            .run(move || {
                let app_state = app_state.clone();
                async move {
                    sweep(&app_state);
                }
            });
    }

    let handle = tokio::spawn(async move {
        while !stop_flag.is_stopped() {
            scheduler.run_pending().await;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        debug!("Sweeper stopped");

        Ok(())
    });

    Ok(handle)
}
