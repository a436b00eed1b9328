//! Environment variable helpers.
//!
//! Configuration takes library defaults and lets `KTUNP_*` variables
//! override them. A variable that is unset or fails to parse falls back to
//! the default rather than failing startup.
//!
//! ```ignore
//! use ktunp_core::env::{env_get, env_get_list};
//!
//! let waiters: usize = env_get("KTUNP_MAX_WAITERS", 16);
//! let namespaces: Vec<u32> = env_get_list("KTUNP_NAMESPACES", vec![0]);
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, or return `default`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// `Some(T)` only if `key` is set and parses.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Comma-separated list. Any element that fails to parse discards the
/// whole value in favour of `default`.
pub fn env_get_list<T>(key: &str, default: Vec<T>) -> Vec<T>
where
    T: FromStr,
{
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<Vec<T>>>()
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_env::{with_var, with_var_unset};

    #[test]
    fn test_unset_uses_default() {
        with_var_unset("__KTUNP_TEST_UNSET__", || {
            let val: usize = env_get("__KTUNP_TEST_UNSET__", 42);
            assert_eq!(val, 42);
            assert!(env_get_opt::<u32>("__KTUNP_TEST_UNSET__").is_none());
            assert_eq!(env_get_list("__KTUNP_TEST_UNSET__", vec![0u32]), vec![0]);
        });
    }

    #[test]
    fn test_parse_and_fallback() {
        with_var("__KTUNP_TEST_NUM__", Some(" 123 "), || {
            assert_eq!(env_get::<usize>("__KTUNP_TEST_NUM__", 0), 123);
        });
        with_var("__KTUNP_TEST_NUM__", Some("many"), || {
            assert_eq!(env_get::<usize>("__KTUNP_TEST_NUM__", 99), 99);
        });
    }

    #[test]
    fn test_list() {
        with_var("__KTUNP_TEST_LIST__", Some("0, 3,7"), || {
            assert_eq!(env_get_list("__KTUNP_TEST_LIST__", vec![9u32]), vec![0, 3, 7]);
        });
        with_var("__KTUNP_TEST_LIST__", Some("1,x"), || {
            assert_eq!(env_get_list("__KTUNP_TEST_LIST__", vec![9u32]), vec![9]);
        });
        with_var("__KTUNP_TEST_LIST__", Some(" , "), || {
            assert_eq!(env_get_list("__KTUNP_TEST_LIST__", vec![9u32]), vec![9]);
        });
    }
}
