pub mod generate;
pub mod parse;
pub mod types;

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

pub use parse::{load_config, ConfigError};
pub use types::{CollectorConfig, Config, ProcessorConfig, ReadStart, RouteConfig};

const USER_CONFIG: &str = ".config/logrelay/config.yml";
const SYSTEM_CONFIG: &str = "/etc/logrelay/config.yml";

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is valid")
});

/// Replaces `$env{NAME}` with the variable's value. Unset variables are left
/// untouched so validation can report them.
pub fn expand_env_vars(text: &str) -> String {
    ENV_VAR
        .replace_all(text, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Names of `$env{NAME}` references still present in `text`, sorted and
/// deduplicated. Full-line YAML comments are ignored.
pub fn unexpanded_env_vars(text: &str) -> Vec<String> {
    let mut names: Vec<String> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| ENV_VAR.captures_iter(line))
        .map(|caps| caps[1].to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Picks the config file to load: the explicit path if given, otherwise the
/// first of `~/.config/logrelay/config.yml` and `/etc/logrelay/config.yml`
/// that exists. `None` means built-in defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    let user = dirs::home_dir().map(|home| home.join(USER_CONFIG));
    user.into_iter()
        .chain(std::iter::once(PathBuf::from(SYSTEM_CONFIG)))
        .find(|candidate| candidate.exists())
}
