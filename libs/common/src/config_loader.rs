//! Configuration source helpers
//! Resolve scalar settings with priority: explicit value > environment > default

use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, warn};

/// Get configuration value with priority: explicit > ENV > default
///
/// # Arguments
/// * `explicit` - Value given directly (CLI flag, config file)
/// * `env_var` - Environment variable name to check
/// * `default` - Default value to use as fallback
pub fn get_config_value<T>(explicit: Option<T>, env_var: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(val) = explicit {
        debug!("Using explicit {}", env_var);
        return val;
    }

    if let Ok(env_str) = std::env::var(env_var) {
        match env_str.parse::<T>() {
            Ok(val) => {
                debug!("Using {} from environment: {}", env_var, env_str);
                return val;
            },
            Err(e) => {
                warn!("Failed to parse {} from environment: {}", env_var, e);
            },
        }
    }

    debug!("Using default value for {}", env_var);
    default
}

/// Get an optional string with priority: explicit (non-empty) > ENV (non-empty)
pub fn get_optional_string(explicit: Option<String>, env_var: &str) -> Option<String> {
    if let Some(val) = explicit.filter(|v| !v.is_empty()) {
        return Some(val);
    }

    std::env::var(env_var).ok().filter(|v| !v.is_empty())
}
