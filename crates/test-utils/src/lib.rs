pub mod builders;
pub mod fake_board;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Default bound for [`with_timeout`].
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialise tracing for tests, once per test binary.
///
/// Logs are captured per test and only shown for failures (or with
/// `-- --nocapture`). The filter comes from `TASKWARDEN_LOG`, then
/// `RUST_LOG`, and defaults to `warn` so lease and recovery chatter stays
/// out of the way.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var(taskwarden::logging::LOG_ENV_VAR)
            .ok()
            .and_then(|v| EnvFilter::try_new(v).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn"));

        // Another harness in the same binary may have installed one already.
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Run a future, failing the test if it takes longer than [`TEST_TIMEOUT`].
///
/// Under `start_paused` runtimes the bound is in virtual time.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("test future did not finish within {TEST_TIMEOUT:?}"))
}
