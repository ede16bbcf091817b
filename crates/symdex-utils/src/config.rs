//! # Index Settings
//!
//! Resolves where the index cache lives, whether it is used at all, and how
//! many worker threads index a binary.
//!
//! Sources in priority order: command line overrides, `SYMDEX_*` environment
//! variables, built-in defaults.
//!
//! | setting        | flag            | environment           | default |
//! |----------------|-----------------|-----------------------|---------|
//! | cache dir      | `--cache-dir`   | `SYMDEX_CACHE_DIR`    | `<user cache dir>/symdex`, else `~/.symdex/cache`, else `<tmp>/symdex-cache` |
//! | cache enabled  | `--no-cache`    | `SYMDEX_ENABLE_CACHE` | enabled |
//! | worker threads | `--threads`     | `SYMDEX_THREADS`      | available parallelism |

use std::env;
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Environment variable overriding the cache directory
pub const CACHE_DIR_ENV: &str = "SYMDEX_CACHE_DIR";

/// Environment variable enabling or disabling the cache (`0`/`false`/`no`/`off` disable)
pub const ENABLE_CACHE_ENV: &str = "SYMDEX_ENABLE_CACHE";

/// Environment variable setting the worker count
pub const THREADS_ENV: &str = "SYMDEX_THREADS";

/// Invalid configuration value
#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    /// A variable holds something that does not parse
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue
    {
        /// Variable or flag name
        name: &'static str,
        /// Raw value as given
        value: String,
        /// What was expected
        reason: &'static str,
    },
}

/// Effective settings for one `symdex` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings
{
    /// Directory holding cache entries
    pub cache_dir: PathBuf,
    /// Whether built indexes are loaded from and saved to `cache_dir`
    pub cache_enabled: bool,
    /// Worker threads for the indexing pool
    pub threads: NonZeroUsize,
}

impl IndexSettings
{
    /// Resolve settings from the process environment.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `SYMDEX_THREADS` or
    /// `SYMDEX_ENABLE_CACHE` holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError>
    {
        Self::from_lookup(|name| env::var(name).ok().filter(|v| !v.is_empty()))
    }

    /// Resolve settings from an arbitrary variable source.
    ///
    /// ## Errors
    ///
    /// Same as [`IndexSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError>
    {
        let cache_dir = lookup(CACHE_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cache_dir(dirs::cache_dir(), dirs::home_dir()));

        let cache_enabled = match lookup(ENABLE_CACHE_ENV) {
            Some(value) => parse_bool(ENABLE_CACHE_ENV, &value)?,
            None => true,
        };

        let threads = match lookup(THREADS_ENV) {
            Some(value) => parse_threads(THREADS_ENV, &value)?,
            None => default_threads(),
        };

        Ok(IndexSettings {
            cache_dir,
            cache_enabled,
            threads,
        })
    }

    /// Override the cache directory (`--cache-dir`).
    #[must_use]
    pub fn with_cache_dir(mut self, dir: Option<PathBuf>) -> Self
    {
        if let Some(dir) = dir {
            self.cache_dir = dir;
        }
        self
    }

    /// Disable the cache when `--no-cache` was given.
    #[must_use]
    pub fn with_cache_disabled(mut self, disabled: bool) -> Self
    {
        if disabled {
            self.cache_enabled = false;
        }
        self
    }

    /// Override the worker count (`--threads`). Zero keeps the current value.
    #[must_use]
    pub fn with_threads(mut self, threads: Option<usize>) -> Self
    {
        if let Some(n) = threads.and_then(NonZeroUsize::new) {
            self.threads = n;
        }
        self
    }
}

/// The platform cache directory (`XDG_CACHE_HOME`, `~/Library/Caches`,
/// `%LOCALAPPDATA%`), then `~/.symdex/cache`, then the system temp dir.
fn default_cache_dir(cache: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf
{
    if let Some(cache) = cache {
        return cache.join("symdex");
    }
    match home {
        Some(home) => home.join(".symdex").join("cache"),
        None => env::temp_dir().join("symdex-cache"),
    }
}

fn default_threads() -> NonZeroUsize
{
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError>
{
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected a boolean",
        }),
    }
}

fn parse_threads(name: &'static str, value: &str) -> Result<NonZeroUsize, ConfigError>
{
    value.trim().parse::<NonZeroUsize>().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: "expected a positive integer",
    })
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<IndexSettings, ConfigError>
    {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        IndexSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_use_platform_dirs()
    {
        let s = settings(&[]).unwrap();
        assert_eq!(s.cache_dir, default_cache_dir(dirs::cache_dir(), dirs::home_dir()));
        assert!(s.cache_enabled);
        assert!(s.threads.get() >= 1);
    }

    #[test]
    fn test_default_cache_dir_fallbacks()
    {
        assert_eq!(
            default_cache_dir(Some(PathBuf::from("/home/dev/.cache")), Some(PathBuf::from("/home/dev"))),
            PathBuf::from("/home/dev/.cache/symdex")
        );
        assert_eq!(
            default_cache_dir(None, Some(PathBuf::from("/home/dev"))),
            PathBuf::from("/home/dev/.symdex/cache")
        );
        assert_eq!(default_cache_dir(None, None), env::temp_dir().join("symdex-cache"));
    }

    #[test]
    fn test_environment_overrides()
    {
        let s = settings(&[
            (CACHE_DIR_ENV, "/var/cache/symdex"),
            (ENABLE_CACHE_ENV, "off"),
            (THREADS_ENV, "3"),
        ])
        .unwrap();
        assert_eq!(s.cache_dir, PathBuf::from("/var/cache/symdex"));
        assert!(!s.cache_enabled);
        assert_eq!(s.threads.get(), 3);
    }

    #[test]
    fn test_flags_win_over_environment()
    {
        let s = settings(&[(CACHE_DIR_ENV, "/from/env"), (THREADS_ENV, "8")])
            .unwrap()
            .with_cache_dir(Some(PathBuf::from("/from/flag")))
            .with_threads(Some(2))
            .with_cache_disabled(true);
        assert_eq!(s.cache_dir, PathBuf::from("/from/flag"));
        assert_eq!(s.threads.get(), 2);
        assert!(!s.cache_enabled);
    }

    #[test]
    fn test_absent_flags_keep_values()
    {
        let s = settings(&[(THREADS_ENV, "4")])
            .unwrap()
            .with_cache_dir(None)
            .with_threads(Some(0))
            .with_cache_disabled(false);
        assert_eq!(s.threads.get(), 4);
        assert!(s.cache_enabled);
    }

    #[test]
    fn test_invalid_values()
    {
        assert!(matches!(
            settings(&[(THREADS_ENV, "0")]),
            Err(ConfigError::InvalidValue { name: THREADS_ENV, .. })
        ));
        assert!(matches!(
            settings(&[(THREADS_ENV, "many")]),
            Err(ConfigError::InvalidValue { name: THREADS_ENV, .. })
        ));
        assert!(matches!(
            settings(&[(ENABLE_CACHE_ENV, "maybe")]),
            Err(ConfigError::InvalidValue {
                name: ENABLE_CACHE_ENV,
                ..
            })
        ));
    }
}
