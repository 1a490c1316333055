//! Environment variable helpers
//!
//! Every knob in `PoolConfig` can be overridden at runtime through a
//! `REARM_*` variable. Unset or unparsable values fall back to the
//! compiled-in default instead of failing startup.
//!
//! ```ignore
//! use rearm_core::env::{env_get, env_get_bool};
//!
//! let pool_size: usize = env_get("REARM_POOL_SIZE", 1);
//! let drain: bool = env_get_bool("REARM_WAIT_ON_SHUTDOWN", false);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default` when unset or malformed
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Read `key` as a boolean flag
///
/// "1", "true", "yes" and "on" (any case) are true, anything else is
/// false. Unset returns `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(
            val.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

/// Parse `key` as `T`, `None` when unset or malformed
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read `key` as a string, `None` when unset or empty
#[inline]
pub fn env_get_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_falls_back() {
        let val: usize = env_get("__REARM_TEST_UNSET__", 7);
        assert_eq!(val, 7);
        assert!(env_get_bool("__REARM_TEST_UNSET__", true));
        assert!(env_get_opt::<u64>("__REARM_TEST_UNSET__").is_none());
        assert!(env_get_str("__REARM_TEST_UNSET__").is_none());
    }

    #[test]
    fn test_parse_with_whitespace() {
        std::env::set_var("__REARM_TEST_NUM__", " 42 ");
        let val: usize = env_get("__REARM_TEST_NUM__", 0);
        assert_eq!(val, 42);
        std::env::remove_var("__REARM_TEST_NUM__");
    }

    #[test]
    fn test_malformed_falls_back() {
        std::env::set_var("__REARM_TEST_BAD__", "eleven");
        let val: usize = env_get("__REARM_TEST_BAD__", 11);
        assert_eq!(val, 11);
        std::env::remove_var("__REARM_TEST_BAD__");
    }

    #[test]
    fn test_bool_variants() {
        for truthy in ["1", "true", "YES", "On"] {
            std::env::set_var("__REARM_TEST_BOOL__", truthy);
            assert!(env_get_bool("__REARM_TEST_BOOL__", false), "{}", truthy);
        }
        for falsy in ["0", "false", "nope"] {
            std::env::set_var("__REARM_TEST_BOOL__", falsy);
            assert!(!env_get_bool("__REARM_TEST_BOOL__", true), "{}", falsy);
        }
        std::env::remove_var("__REARM_TEST_BOOL__");
    }

    #[test]
    fn test_empty_string_is_unset() {
        std::env::set_var("__REARM_TEST_STR__", "");
        assert!(env_get_str("__REARM_TEST_STR__").is_none());
        std::env::set_var("__REARM_TEST_STR__", "billing");
        assert_eq!(env_get_str("__REARM_TEST_STR__").as_deref(), Some("billing"));
        std::env::remove_var("__REARM_TEST_STR__");
    }
}
