use std::time::Duration;

use crate::bus::ObjectPath;

/// Set to `""` or `"1"` to validate events without sending them.
pub const DISABLE_SUBMISSION_ENV: &str = "METRICS_DISABLE_SUBMISSION";
/// Older name of [`DISABLE_SUBMISSION_ENV`], still honored.
pub const LEGACY_DISABLE_SUBMISSION_ENV: &str = "EOS_DISABLE_METRICS";
pub const CALL_TIMEOUT_ENV: &str = "METRICS_CALL_TIMEOUT_MS";

pub const DEFAULT_OBJECT_PATH: &str = "/com/endlessm/Metrics";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(25);

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub submission_enabled: bool,
    /// How long sync calls wait for the collector.
    pub call_timeout: Duration,
    /// Where the recorder methods live.
    pub object_path: ObjectPath,
    /// Actor used when a call does not name one. `None` means the process uid.
    pub default_actor: Option<u32>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            submission_enabled: true,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            object_path: ObjectPath::new(DEFAULT_OBJECT_PATH),
            default_actor: None,
        }
    }
}

impl RecorderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let disabled = [DISABLE_SUBMISSION_ENV, LEGACY_DISABLE_SUBMISSION_ENV]
            .into_iter()
            .filter_map(&lookup)
            .any(|value| value.is_empty() || value == "1");
        if disabled {
            config.submission_enabled = false;
        }

        // Unparseable values keep the default rather than failing startup.
        if let Some(ms) = lookup(CALL_TIMEOUT_ENV).and_then(|v| v.trim().parse::<u64>().ok()) {
            config.call_timeout = Duration::from_millis(ms);
        }

        config
    }

    pub fn actor(&self) -> u32 {
        self.default_actor.unwrap_or_else(current_uid)
    }
}

/// Numeric identity of the user running this process.
pub fn current_uid() -> u32 {
    #[cfg(unix)]
    {
        // SAFETY: getuid has no preconditions and cannot fail.
        unsafe { libc::getuid() }
    }
    #[cfg(not(unix))]
    {
        0
    }
}
