use std::env;
use std::sync::OnceLock;

/// Environment variable that disables every retry sleep when set to a truthy value.
pub const DISABLE_SLEEP_ENV: &str = "RETRY_HELPER_DISABLE_SLEEP";

/// Process-level switches consulted by a [`RetryExecutor`](crate::RetryExecutor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Skip all retry sleeps, whatever delay was computed. Intended for test and CI runs.
    pub disable_sleep: bool,
}

impl Settings {
    /// Settings for this process, read from the environment on first use.
    pub fn global() -> Settings {
        static GLOBAL: OnceLock<Settings> = OnceLock::new();
        *GLOBAL.get_or_init(Settings::from_env)
    }

    /// Read settings from the environment without caching them.
    ///
    /// `1`, `true`, `yes` and `on` (case-insensitive) disable sleeps; anything else,
    /// including an unset variable, leaves them enabled.
    pub fn from_env() -> Settings {
        let disable_sleep = env::var(DISABLE_SLEEP_ENV)
            .map(|value| is_truthy(&value))
            .unwrap_or(false);
        Settings { disable_sleep }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
