//! Runner defaults and fixed file names

// =============================================================================
// TIMING
// =============================================================================

/// Timeout applied to coroutine tests without an explicit override
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Advance calls allowed within one frame before a body is treated as stuck
/// (a body that never reaches a suspension point would otherwise spin forever)
pub const MAX_STEPS_PER_FRAME: usize = 10_000;

// =============================================================================
// FILES
// =============================================================================

/// Runner configuration file
pub const SETTINGS_FILE: &str = "config/test_runner.json";

/// Default selected-tests asset
pub const SELECTION_FILE: &str = "config/selected_tests.json";

/// Default permitted-error registry
pub const PERMITTED_ERRORS_FILE: &str = "config/permitted_errors.toml";

/// Run log written into the output directory
pub const RUN_LOG_FILE: &str = "test_run.log";

/// Results summary written into the output directory
pub const RESULTS_FILE: &str = "test_results.json";

/// Subdirectory of the platform data dir used when no output dir is configured
pub const DATA_DIR_NAME: &str = "playtest";

// =============================================================================
// SOURCE LOOKUP
// =============================================================================

/// Token that marks a suspension point in test sources
pub const SUSPENSION_KEYWORD: &str = ".await";

/// Fallback resolution for methods whose constraints match nothing
pub const DEFAULT_RESOLUTION: (u32, u32) = (1920, 1080);
