//! Suite file loader
//!
//! Loading pipeline:
//! 1. Size check
//! 2. BOM strip
//! 3. Environment variable expansion (on raw text)
//! 4. YAML parsing
//! 5. Deserialization to [`SuiteConfig`]
//! 6. Validation
//! 7. Freeze with `Arc`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::schema::SuiteConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

// ============================================================================
// Public API
// ============================================================================

/// Limits on suite size to prevent resource exhaustion.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum number of phases.
    pub max_phases: usize,

    /// Maximum number of flow catalog entries.
    pub max_flows: usize,

    /// Maximum number of requests in one declarative HTTP flow.
    pub max_http_steps: usize,

    /// Maximum length of a single phase, in seconds.
    pub max_phase_duration: u64,

    /// Maximum suite file size in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_phases: env_or("FLOWGEN_MAX_PHASES", 100),
            max_flows: env_or("FLOWGEN_MAX_FLOWS", 1000),
            max_http_steps: env_or("FLOWGEN_MAX_HTTP_STEPS", 100),
            max_phase_duration: env_or("FLOWGEN_MAX_PHASE_DURATION", 7 * 24 * 3600),
            max_config_size: env_or("FLOWGEN_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// Result of loading a suite file.
#[derive(Debug)]
pub struct LoadResult {
    /// The loaded and validated suite.
    pub config: Arc<SuiteConfig>,

    /// Warnings encountered during loading.
    pub warnings: Vec<LoadWarning>,
}

/// Warning during suite loading.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// Location where the warning occurred.
    pub location: Option<String>,
}

impl std::fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({location})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Suite file loader.
#[derive(Debug, Default)]
pub struct SuiteLoader {
    limits: ConfigLimits,
}

impl SuiteLoader {
    /// Creates a loader with the given limits.
    #[must_use]
    pub const fn new(limits: ConfigLimits) -> Self {
        Self { limits }
    }

    /// Loads, validates, and freezes a suite file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is too large, a
    /// required environment variable is unset, YAML parsing fails, or
    /// validation finds errors.
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > self.limits.max_config_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {} bytes", self.limits.max_config_size),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw, path)
    }

    /// Runs the pipeline on already-read file content.
    ///
    /// `path` is used for error messages only.
    ///
    /// # Errors
    ///
    /// See [`SuiteLoader::load`].
    pub fn load_str(&self, raw: &str, path: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();

        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::new(path);
        let substituted = env_sub.substitute(raw)?;
        warnings.extend(env_sub.warnings);

        let value: serde_yaml::Value =
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        if value.is_null() {
            return Err(ConfigError::ParseError {
                path: path.to_path_buf(),
                line: None,
                message: "suite file is empty".to_string(),
            });
        }

        let config: SuiteConfig =
            serde_yaml::from_value(value).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: format!("invalid suite: {e}"),
            })?;

        let result = Validator::new().validate(&config, &self.limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: result.errors,
            });
        }

        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable substitution.
///
/// Runs on raw YAML text before parsing so that substituted numbers keep
/// their YAML type.
struct EnvSubstitution {
    path: PathBuf,
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            warnings: Vec::new(),
        }
    }

    /// Expands variable references in `raw`.
    ///
    /// Supports:
    /// - `${VAR}`: value, or empty string with a warning if unset
    /// - `${VAR:-default}`: `default` if unset
    /// - `${VAR:?message}`: error if unset
    /// - `$$`: literal `$`
    fn substitute(&mut self, raw: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(raw.len());
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('{') => {
                    chars.next();
                    let reference = self.read_reference(&mut chars)?;
                    self.expand(reference, &mut out)?;
                }
                _ => out.push('$'),
            }
        }

        Ok(out)
    }

    fn expand(&mut self, reference: VarRef, out: &mut String) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var(&reference.name) {
            out.push_str(&value);
            return Ok(());
        }

        match reference.fallback {
            Fallback::Default(default) => out.push_str(&default),
            Fallback::Required(message) => {
                return Err(ConfigError::EnvVarNotSet {
                    var: reference.name,
                    location: message,
                });
            }
            Fallback::None => self.warnings.push(LoadWarning {
                message: format!(
                    "environment variable '{}' is not set, using empty string",
                    reference.name
                ),
                location: Some(self.path.display().to_string()),
            }),
        }
        Ok(())
    }

    /// Reads the inside of `${...}`; the opening brace is already consumed.
    fn read_reference(
        &self,
        chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    ) -> Result<VarRef, ConfigError> {
        let mut name = String::new();

        while let Some(c) = chars.next() {
            match c {
                '}' => {
                    return Ok(VarRef {
                        name,
                        fallback: Fallback::None,
                    });
                }
                ':' if matches!(chars.peek(), Some('-' | '?')) => {
                    let required = chars.next() == Some('?');
                    let text = self.read_until_close(chars, &name)?;
                    let fallback = if required {
                        Fallback::Required(text)
                    } else {
                        Fallback::Default(text)
                    };
                    return Ok(VarRef { name, fallback });
                }
                _ => name.push(c),
            }
        }

        Err(self.unclosed(&name))
    }

    /// Reads up to the matching `}`, allowing nested braces in the text.
    fn read_until_close(
        &self,
        chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
        name: &str,
    ) -> Result<String, ConfigError> {
        let mut text = String::new();
        let mut depth = 1;

        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(text);
                    }
                }
                _ => {}
            }
            text.push(c);
        }

        Err(self.unclosed(name))
    }

    fn unclosed(&self, name: &str) -> ConfigError {
        ConfigError::ParseError {
            path: self.path.clone(),
            line: None,
            message: format!("unclosed environment variable reference: ${{{name}"),
        }
    }
}

struct VarRef {
    name: String,
    fallback: Fallback,
}

enum Fallback {
    None,
    Default(String),
    Required(String),
}

/// Reads a limit from the environment, falling back to `default`.
fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
