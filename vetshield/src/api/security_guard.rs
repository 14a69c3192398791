use tracing::debug;
use vetshield_core::security_monitor::SecurityContext;

use crate::api::error::AppError;
use crate::app_state::AppState;

/// Run the security rules for `ctx` before any business logic.
pub fn enforce(state: &AppState, ctx: &SecurityContext) -> Result<(), AppError> {
    let decision = state.monitor.check_security_rules(ctx);
    if decision.allow {
        return Ok(());
    }

    debug!(
        ip = %ctx.ip,
        action = %ctx.action,
        reason = ?decision.reason,
        "Request denied by security rules"
    );
    Err(decision.into())
}
