//! Structured logging configuration.
//!
//! Request correlation, ledger audit lines and security events all go through
//! `tracing` with named fields so they can be filtered and indexed.

use rust_decimal::Decimal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Levels are configurable via the `RUST_LOG` env var; the default keeps
/// `sqlx` and `hyper` at `warn`.
///
/// # Example
///
/// ```no_run
/// use bz_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// # Example
///
/// ```
/// use bz_server::logging::log_security_event;
///
/// log_security_event(
///     "failed_login",
///     Some(123),
///     Some("192.168.1.1"),
///     "Invalid password attempt"
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    user_id: Option<i64>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}

/// Audit line for a committed balance movement
///
/// `event` is `bet_placed` or `bet_cancelled`; `amount` is the stake moved.
pub fn log_ledger_event(
    event: &str,
    user_id: i64,
    bet_id: i64,
    amount: Decimal,
    balance: Option<Decimal>,
) {
    tracing::info!(
        event = event,
        user_id = user_id,
        bet_id = bet_id,
        amount = %amount,
        balance = balance.map(tracing::field::display),
        "LEDGER: {}",
        event
    );
}

/// Log API request/response
pub fn log_api_request(
    request_id: &str,
    method: &str,
    path: &str,
    status_code: u16,
    duration_ms: u64,
) {
    if duration_ms > 1000 {
        tracing::warn!(
            request_id = request_id,
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            "Slow API request"
        );
    } else {
        tracing::info!(
            request_id = request_id,
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            "API request completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_security_event() {
        // Just ensure it doesn't panic
        log_security_event("test_event", Some(1), Some("127.0.0.1"), "Test message");
    }

    #[test]
    fn test_log_ledger_event() {
        log_ledger_event("bet_placed", 1, 7, Decimal::new(2000, 2), None);
        log_ledger_event("bet_cancelled", 1, 7, Decimal::new(2000, 2), Some(Decimal::new(10000, 2)));
    }

    #[test]
    fn test_log_api_request() {
        log_api_request("req-1", "GET", "/api/v1/bets", 200, 45);
        log_api_request("req-2", "POST", "/api/v1/auth/login", 401, 1200);
    }
}
