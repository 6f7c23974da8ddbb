use std::fmt;
use std::str::FromStr;

use once_cell::sync::OnceCell;

pub const ENV_ENTRY_MODE: &str = "JARIFY_ENTRY_MODE";
pub const ENV_RTS_OPTS: &str = "JARIFY_RTS_OPTS";
pub const ENV_TRACE: &str = "JARIFY_TRACE";

/// How `invokeMain` reaches the program's entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Supervised when the main closure is present, direct otherwise.
    #[default]
    Auto,
    Supervised,
    Direct,
}

impl EntryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryMode::Auto => "auto",
            EntryMode::Supervised => "supervised",
            EntryMode::Direct => "direct",
        }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct EntryModeParseError {
    value: String,
}

impl fmt::Display for EntryModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid entry mode {:?} (expected one of: auto, supervised, direct)",
            self.value
        )
    }
}

impl std::error::Error for EntryModeParseError {}

impl FromStr for EntryMode {
    type Err = EntryModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "auto" | "" => Ok(EntryMode::Auto),
            "supervised" | "closure" => Ok(EntryMode::Supervised),
            "direct" => Ok(EntryMode::Direct),
            _ => Err(EntryModeParseError { value: s }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub entry_mode: EntryMode,
    /// Extra flags passed to the runtime between `+RTS` and `-RTS`.
    pub rts_flags: Vec<String>,
    pub trace: bool,
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable lookup. Unparseable
    /// values fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let entry_mode = match lookup(ENV_ENTRY_MODE) {
            None => EntryMode::Auto,
            Some(raw) => raw.parse().unwrap_or_else(|err: EntryModeParseError| {
                crate::diag::warn(format_args!("{ENV_ENTRY_MODE}: {err}; using auto"));
                EntryMode::Auto
            }),
        };

        let rts_flags = lookup(ENV_RTS_OPTS)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let trace = lookup(ENV_TRACE)
            .and_then(|v| parse_bool(&v))
            .unwrap_or(false);

        BridgeConfig {
            entry_mode,
            rts_flags,
            trace,
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

static CONFIG: OnceCell<BridgeConfig> = OnceCell::new();

/// Process configuration, read from the environment on first use.
pub fn config() -> &'static BridgeConfig {
    CONFIG.get_or_init(BridgeConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = BridgeConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn reads_mode_flags_and_trace() {
        let cfg = BridgeConfig::from_lookup(lookup(&[
            (ENV_ENTRY_MODE, " Direct "),
            (ENV_RTS_OPTS, "-N4   -A16m"),
            (ENV_TRACE, "yes"),
        ]));
        assert_eq!(cfg.entry_mode, EntryMode::Direct);
        assert_eq!(cfg.rts_flags, vec!["-N4", "-A16m"]);
        assert!(cfg.trace);
    }

    #[test]
    fn invalid_mode_falls_back_to_auto() {
        let cfg = BridgeConfig::from_lookup(lookup(&[(ENV_ENTRY_MODE, "sideways")]));
        assert_eq!(cfg.entry_mode, EntryMode::Auto);
    }

    #[test]
    fn entry_mode_round_trips_through_display() {
        for mode in [EntryMode::Auto, EntryMode::Supervised, EntryMode::Direct] {
            assert_eq!(mode.to_string().parse::<EntryMode>().ok(), Some(mode));
        }
        assert!("nope".parse::<EntryMode>().is_err());
    }
}
