use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::{Number, Value};
use tracing::{info, warn};

use crate::errors::ConfigError;

lazy_static! {
    static ref DEFAULT_CONFIG_LOCATIONS: Vec<PathBuf> = vec![
        PathBuf::from("config.yaml"),
        PathBuf::from("config/gateway.yaml"),
    ];
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub max_request_bytes: usize,
    /// Directory the analysis tool runs in.
    pub working_directory: PathBuf,
    pub executable_path: PathBuf,
    pub input_directory: PathBuf,
    pub output_directory: PathBuf,
    pub library_path: LibraryPathConfig,
    pub invocation: InvocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_address: "0.0.0.0:8080".to_string(),
            max_request_bytes: 16 * 1024 * 1024,
            working_directory: PathBuf::from("mjai-reviewer"),
            executable_path: PathBuf::from("mjai-reviewer/target/release/mjai-reviewer"),
            input_directory: PathBuf::from("data/input"),
            output_directory: PathBuf::from("data/output"),
            library_path: LibraryPathConfig::default(),
            invocation: InvocationConfig::default(),
        }
    }
}

/// The one environment variable layered over the inherited environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibraryPathConfig {
    pub variable: String,
    /// Defaults to `<working_directory>/akochan`.
    pub value: Option<PathBuf>,
}

impl Default for LibraryPathConfig {
    fn default() -> Self {
        LibraryPathConfig {
            variable: "LD_LIBRARY_PATH".to_string(),
            value: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentStyle {
    Short,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadDelivery {
    /// Payload is passed as an input-file argument.
    File,
    /// Payload is piped to the tool's standard input.
    Stdin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PtElement {
    Integer,
    Float,
}

impl PtElement {
    /// Integer-mode values must fit the tool's native `int`.
    pub const INTEGER_RANGE: std::ops::RangeInclusive<f64> = (i32::MIN as f64)..=(i32::MAX as f64);

    /// Checks one parameter value; `Err` carries the reason.
    pub fn check(self, pt: f64) -> Result<(), String> {
        if !pt.is_finite() {
            return Err("is not a finite number".to_string());
        }
        if self == PtElement::Integer {
            if pt.fract() != 0.0 {
                return Err(format!("must be an integer, got {}", pt));
            }
            if !Self::INTEGER_RANGE.contains(&pt) {
                return Err(format!("{} is out of range for an integer parameter", pt));
            }
        }
        Ok(())
    }

    /// Formats a checked value for the command line.
    pub fn format(self, pt: f64) -> String {
        match self {
            PtElement::Integer => format!("{}", pt as i32),
            PtElement::Float => format!("{}", pt),
        }
    }

    /// JSON form of a checked value, integers stay integers.
    pub fn to_json(self, pt: f64) -> Value {
        match self {
            PtElement::Integer => Value::Number(Number::from(pt as i32)),
            // NaN never gets here, requests are validated first
            PtElement::Float => Number::from_f64(pt).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PtListConfig {
    pub element: PtElement,
    pub pass_as_argument: bool,
    pub delimiter: String,
}

impl Default for PtListConfig {
    fn default() -> Self {
        PtListConfig {
            element: PtElement::Integer,
            pass_as_argument: false,
            delimiter: ",".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TacticsConfig {
    pub base_path: PathBuf,
    pub output_path: PathBuf,
    pub section: String,
    pub field: String,
}

impl Default for TacticsConfig {
    fn default() -> Self {
        TacticsConfig {
            base_path: PathBuf::from("mjai-reviewer/akochan/tactics.json"),
            output_path: PathBuf::from("mjai-reviewer/akochan/tactics-mod.json"),
            section: "tactics".to_string(),
            field: "jun_pt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    pub engine: String,
    pub argument_style: ArgumentStyle,
    pub payload_delivery: PayloadDelivery,
    pub pass_output_path: bool,
    pub lang: Option<String>,
    /// Non-interactive mode flags appended after every other argument.
    pub flags: Vec<String>,
    pub pt_list: PtListConfig,
    pub tactics: Option<TacticsConfig>,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        InvocationConfig {
            engine: "akochan".to_string(),
            argument_style: ArgumentStyle::Short,
            payload_delivery: PayloadDelivery::File,
            pass_output_path: true,
            lang: None,
            flags: vec!["--show-rating".to_string(), "--no-open".to_string()],
            pt_list: PtListConfig::default(),
            tactics: None,
        }
    }
}

impl Config {
    pub fn library_path_value(&self) -> PathBuf {
        match &self.library_path.value {
            Some(value) => value.clone(),
            None => self.working_directory.join("akochan"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executable_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("executable_path must be set".to_string()));
        }
        if self.invocation.engine.trim().is_empty() {
            return Err(ConfigError::Invalid("invocation.engine must not be empty".to_string()));
        }
        if self.invocation.pt_list.delimiter.is_empty() {
            return Err(ConfigError::Invalid("invocation.pt_list.delimiter must not be empty".to_string()));
        }
        if self.library_path.variable.is_empty() || self.library_path.variable.contains('=') {
            return Err(ConfigError::Invalid(format!(
                "library_path.variable {:?} is not a valid environment variable name",
                self.library_path.variable
            )));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Invalid("max_request_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

pub fn parse_config(path: &Path, content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads the gateway configuration.
///
/// An explicit path must exist and parse. Without one, the default locations
/// are tried in order and the built-in defaults are used when none exists.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded config");
        return parse_config(path, &content);
    }

    for path in DEFAULT_CONFIG_LOCATIONS.iter() {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                info!(path = %path.display(), "loaded config");
                return parse_config(path, &content);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                });
            }
        }
    }

    warn!("no config file found, using defaults");
    let config = Config::default();
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reviewer_layout() {
        let config = Config::default();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.library_path.variable, "LD_LIBRARY_PATH");
        assert_eq!(config.library_path_value(), PathBuf::from("mjai-reviewer/akochan"));
        assert_eq!(config.invocation.payload_delivery, PayloadDelivery::File);
        assert_eq!(config.invocation.pt_list.element, PtElement::Integer);
        assert!(!config.invocation.pt_list.pass_as_argument);
        assert!(config.invocation.tactics.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
working_directory: /srv/reviewer
executable_path: /srv/reviewer/bin/reviewer
invocation:
  payload_delivery: stdin
  argument_style: long
  pt_list:
    element: float
    pass_as_argument: true
  tactics:
    base_path: /srv/reviewer/tactics.json
    output_path: /srv/reviewer/tactics-mod.json
"#;
        let config = parse_config(Path::new("inline.yaml"), yaml).unwrap();
        assert_eq!(config.working_directory, PathBuf::from("/srv/reviewer"));
        assert_eq!(config.library_path_value(), PathBuf::from("/srv/reviewer/akochan"));
        assert_eq!(config.invocation.payload_delivery, PayloadDelivery::Stdin);
        assert_eq!(config.invocation.argument_style, ArgumentStyle::Long);
        assert_eq!(config.invocation.pt_list.element, PtElement::Float);
        assert_eq!(config.invocation.pt_list.delimiter, ",");
        let tactics = config.invocation.tactics.unwrap();
        assert_eq!(tactics.section, "tactics");
        assert_eq!(tactics.field, "jun_pt");
        // untouched sections keep their defaults
        assert_eq!(config.invocation.flags, vec!["--show-rating", "--no-open"]);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let yaml = "invocation:\n  pt_list:\n    delimiter: \"\"\n";
        let err = parse_config(Path::new("inline.yaml"), yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = parse_config(Path::new("inline.yaml"), "invocation: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let present = dir.path().join("gateway.yaml");
        std::fs::write(&present, "bind_address: 127.0.0.1:9000\n").unwrap();
        let config = load_config(Some(&present)).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_pt_element_check_and_format() {
        assert!(PtElement::Integer.check(2147483647.0).is_ok());
        assert!(PtElement::Integer.check(2147483648.0).is_err());
        assert!(PtElement::Integer.check(1e20).is_err());
        assert!(PtElement::Float.check(1e20).is_ok());
        assert!(PtElement::Float.check(f64::INFINITY).is_err());

        assert_eq!(PtElement::Integer.format(-135.0), "-135");
        assert_eq!(PtElement::Float.format(22.5), "22.5");
        assert_eq!(PtElement::Integer.to_json(90.0), serde_json::json!(90));
    }
}
