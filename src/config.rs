use std::env;
use std::path::PathBuf;

pub const DEFAULT_LEDGER_FILE: &str = "attendance.xlsx";
pub const LEDGER_FILE_VAR: &str = "ATTENDANCE_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub ledger_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let ledger_path = lookup(LEDGER_FILE_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_FILE));

        Self { ledger_path }
    }

    /// Command-line flags take precedence over the environment.
    pub fn with_overrides(mut self, ledger_path: Option<PathBuf>) -> Self {
        if let Some(path) = ledger_path {
            self.ledger_path = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_attendance_workbook() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.ledger_path, PathBuf::from("attendance.xlsx"));
    }

    #[test]
    fn reads_path_from_environment() {
        let config = AppConfig::from_lookup(|key| {
            (key == LEDGER_FILE_VAR).then(|| " /srv/lectures.xlsx ".to_string())
        });
        assert_eq!(config.ledger_path, PathBuf::from("/srv/lectures.xlsx"));
    }

    #[test]
    fn blank_environment_value_falls_back_to_default() {
        let config = AppConfig::from_lookup(|_| Some("   ".to_string()));
        assert_eq!(config.ledger_path, PathBuf::from(DEFAULT_LEDGER_FILE));
    }

    #[test]
    fn flag_overrides_environment() {
        let config = AppConfig::from_lookup(|_| Some("env.xlsx".to_string()))
            .with_overrides(Some(PathBuf::from("flag.xlsx")));
        assert_eq!(config.ledger_path, PathBuf::from("flag.xlsx"));

        let config = AppConfig::from_lookup(|_| Some("env.xlsx".to_string())).with_overrides(None);
        assert_eq!(config.ledger_path, PathBuf::from("env.xlsx"));
    }
}
