//! Environment variable loading helpers.
//!
//! Keeps the fallback chains in one place so business code never calls
//! `std::env::var` directly.

use std::env;

use zeroize::Zeroizing;

/// Secret text that is wiped from memory when dropped.
pub type SecretString = Zeroizing<String>;

/// Read the primary variable or the first set alias, falling back to `default`.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(default)
}

/// Read the primary variable or an alias; empty values count as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
        .and_then(|s| {
            let s = s.trim().to_string();
            if s.is_empty() {
                None
            } else {
                Some(s)
            }
        })
}

/// Boolean variable: 0/false/no/off are false, anything else set is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    let v = env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()));
    match v.as_deref() {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Numeric variable; unparseable values fall back to `default` with a warning.
pub fn env_u64(primary: &str, default: u64) -> u64 {
    match env_optional(primary, &[]) {
        Some(s) => s.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {:?}, using default ({})", primary, s, default);
            default
        }),
        None => default,
    }
}

/// Remove a single environment variable.
///
/// Call before any worker threads are started.
pub fn remove_env_var(key: &str) {
    env::remove_var(key);
}

/// Read a secret-bearing variable and clear it from the process environment.
///
/// The returned value is zeroed when dropped. Unset and empty both yield `None`.
pub fn take_secret(key: &str) -> Option<SecretString> {
    let value = env::var_os(key);
    remove_env_var(key);
    let value = Zeroizing::new(value?.into_string().ok()?);
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
