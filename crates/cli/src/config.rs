//! Configuration file loading.
//!
//! The file is parsed and validated in one go. Everything the run needs comes
//! out as a [`LoadedConfig`]; a run never starts from a file that fails here.
//! Relative paths are resolved against the working directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use orchestrator::RetryConfig;
use pipeline::{
    AssignmentPrefix, FailurePolicy, OrgName, Permission, PipelineError, RepoName, RepositoryId,
    RunSettings, SecretName, SecretSpec, SecretValue, StepToggles, TemplateSettings,
    DEFAULT_PARALLELISM,
};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const DEFAULT_ROSTER_PATH: &str = ".classfleet/roster.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Invalid(#[from] PipelineError),
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(PipelineError::ConfigurationError {
        message: message.into(),
    })
}

// ---------------------------------------------------------------------------
// File shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    organization: String,
    assignment_prefix: String,
    #[serde(default = "default_roster_path")]
    roster_path: PathBuf,
    #[serde(default = "default_token_env")]
    token_env: String,
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_parallelism")]
    parallelism: usize,
    #[serde(default)]
    failure_policy: FailurePolicy,
    step_sync_template: Option<bool>,
    step_discover: Option<bool>,
    step_sync_roster: Option<bool>,
    step_secrets: Option<bool>,
    step_assist: Option<bool>,
    step_cycle: Option<bool>,
    template: Option<TemplateSection>,
    #[serde(default)]
    secrets: Vec<SecretSection>,
    #[serde(default)]
    retry: RetrySection,
    #[serde(default)]
    cycle: CycleSection,
    #[serde(default)]
    exclude_repositories: Vec<String>,
}

fn default_roster_path() -> PathBuf {
    PathBuf::from(DEFAULT_ROSTER_PATH)
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

fn default_api_base_url() -> String {
    github::DEFAULT_API_URL.to_string()
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateSection {
    /// `owner/name` of the repository the assignment is authored in.
    source: String,
    /// `owner/name` of the classroom's copy.
    classroom: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretSection {
    name: String,
    value_env: Option<String>,
    value_file: Option<PathBuf>,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetrySection {
    max_attempts: u32,
    base_delay_ms: u64,
    max_backoff_ms: u64,
    jitter: f64,
    rate_limit_ceiling_secs: u64,
    attempt_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            jitter: defaults.jitter,
            rate_limit_ceiling_secs: defaults.rate_limit_ceiling.as_secs(),
            attempt_timeout_secs: defaults.attempt_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CycleSection {
    permission: Permission,
}

// ---------------------------------------------------------------------------
// Validated result
// ---------------------------------------------------------------------------

/// A validated configuration with secret values resolved.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: RunSettings,
    pub retry: RetryConfig,
    pub roster_path: PathBuf,
    /// Environment variable holding the GitHub token.
    pub token_env: String,
    pub api_base_url: String,
}

/// Reads, parses, and validates the configuration file at `path`.
///
/// Secret values named by `value_env` are read from the process environment.
///
/// # Errors
///
/// [`ConfigError`] if the file is unreadable, malformed, or invalid.
pub fn load(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text, path, |name| std::env::var(name).ok())
}

/// Parses and validates configuration text. `env` looks up environment
/// variables.
pub fn parse(
    text: &str,
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LoadedConfig, ConfigError> {
    let file: FileConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.validate(&env)
}

impl FileConfig {
    fn validate(self, env: &dyn Fn(&str) -> Option<String>) -> Result<LoadedConfig, ConfigError> {
        let organization = OrgName::new(self.organization.trim())
            .ok_or_else(|| invalid("organization must not be empty"))?;
        let assignment_prefix = AssignmentPrefix::new(self.assignment_prefix.trim())
            .ok_or_else(|| invalid("assignment_prefix must not be empty"))?;

        if self.token_env.trim().is_empty() {
            return Err(invalid("token_env must name an environment variable"));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(invalid(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }

        let template = self.template.map(TemplateSection::validate).transpose()?;
        let secrets = resolve_secrets(self.secrets, env)?;
        let retry = self.retry.validate()?;

        let exclude_repositories = self
            .exclude_repositories
            .iter()
            .map(|name| {
                RepoName::new(name.trim())
                    .ok_or_else(|| invalid("exclude_repositories contains an empty name"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = StepToggles::default();
        let toggles = StepToggles {
            sync_template: self.step_sync_template.unwrap_or(defaults.sync_template),
            discover: self.step_discover.unwrap_or(defaults.discover),
            sync_roster: self.step_sync_roster.unwrap_or(defaults.sync_roster),
            secrets: self.step_secrets.unwrap_or(defaults.secrets),
            assist: self.step_assist.unwrap_or(defaults.assist),
            cycle: self.step_cycle.unwrap_or(defaults.cycle),
        };

        let mut settings = RunSettings::new(organization, assignment_prefix);
        settings.template = template;
        settings.secrets = secrets;
        settings.parallelism = self.parallelism;
        settings.cycle_permission = self.cycle.permission;
        settings.exclude_repositories = exclude_repositories;
        settings.failure_policy = self.failure_policy;
        settings.toggles = toggles;

        if settings.effective_parallelism() != self.parallelism {
            tracing::warn!(
                configured = self.parallelism,
                effective = settings.effective_parallelism(),
                "parallelism clamped"
            );
        }

        Ok(LoadedConfig {
            settings,
            retry,
            roster_path: self.roster_path,
            token_env: self.token_env,
            api_base_url: self.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl TemplateSection {
    fn validate(self) -> Result<TemplateSettings, ConfigError> {
        let parse = |field: &str, value: &str| {
            RepositoryId::parse(value.trim()).ok_or_else(|| {
                invalid(format!("template.{field} must be 'owner/name', got '{value}'"))
            })
        };
        let source = parse("source", &self.source)?;
        let classroom = parse("classroom", &self.classroom)?;
        if source == classroom {
            return Err(invalid("template.source and template.classroom are the same repository"));
        }
        Ok(TemplateSettings { source, classroom })
    }
}

impl RetrySection {
    fn validate(self) -> Result<RetryConfig, ConfigError> {
        if self.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(invalid("retry.jitter must be between 0.0 and 1.0"));
        }
        if self.max_backoff_ms < self.base_delay_ms {
            return Err(invalid("retry.max_backoff_ms must not be below retry.base_delay_ms"));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(invalid("retry.attempt_timeout_secs must be at least 1"));
        }
        Ok(RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            jitter: self.jitter,
            rate_limit_ceiling: Duration::from_secs(self.rate_limit_ceiling_secs),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
        })
    }
}

fn resolve_secrets(
    sections: Vec<SecretSection>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<SecretSpec>, ConfigError> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(sections.len());
    for section in sections {
        let name = SecretName::new(section.name.trim())
            .ok_or_else(|| invalid("secrets entry with an empty name"))?;
        if !seen.insert(name.clone()) {
            return Err(invalid(format!("secret '{name}' is configured more than once")));
        }

        let value = match (&section.value_env, &section.value_file) {
            (Some(var), None) => env(var).ok_or_else(|| {
                invalid(format!("secret '{name}': environment variable {var} is not set"))
            })?,
            (None, Some(file)) => std::fs::read_to_string(file)
                .map_err(|e| {
                    invalid(format!("secret '{name}': cannot read {}: {e}", file.display()))
                })?
                .trim_end_matches(['\r', '\n'])
                .to_string(),
            _ => {
                return Err(invalid(format!(
                    "secret '{name}' needs exactly one of value_env or value_file"
                )))
            }
        };
        if value.is_empty() {
            return Err(invalid(format!("secret '{name}' has an empty value")));
        }

        specs.push(SecretSpec {
            name,
            value: SecretValue::new(value),
            overwrite: section.overwrite,
        });
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::StepName;
    use std::io::Write;

    const MINIMAL: &str = r#"
organization = "cs101"
assignment_prefix = "hw1"
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse_str(text: &str) -> Result<LoadedConfig, ConfigError> {
        parse(text, Path::new("config.toml"), no_env)
    }

    fn message(err: ConfigError) -> String {
        match err {
            ConfigError::Invalid(PipelineError::ConfigurationError { message }) => message,
            other => panic!("expected a configuration error, got {other:?}"),
        }
    }

    #[test]
    fn minimal_file_uses_defaults() {
        let config = parse_str(MINIMAL).unwrap();
        assert_eq!(config.settings.organization.as_str(), "cs101");
        assert_eq!(config.settings.parallelism, DEFAULT_PARALLELISM);
        assert_eq!(config.settings.failure_policy, FailurePolicy::ContinueOnError);
        assert_eq!(config.settings.cycle_permission, Permission::Push);
        assert_eq!(config.settings.toggles, StepToggles::default());
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.token_env, DEFAULT_TOKEN_ENV);
        assert_eq!(config.roster_path, PathBuf::from(DEFAULT_ROSTER_PATH));
        assert_eq!(config.api_base_url, github::DEFAULT_API_URL);
    }

    #[test]
    fn full_file_is_loaded() {
        let text = r#"
organization = "cs101"
assignment_prefix = "hw1"
roster_path = "data/roster.json"
token_env = "CLASSROOM_TOKEN"
api_base_url = "https://ghe.example.edu/api/v3/"
parallelism = 8
failure_policy = "stop_on_failure"
step_sync_template = true
step_secrets = false
step_cycle = true
exclude_repositories = ["hw1-solutions"]

[template]
source = "prof/hw1-template"
classroom = "cs101/hw1-starter"

[[secrets]]
name = "GRADER_TOKEN"
value_env = "GRADER"
overwrite = true

[retry]
max_attempts = 5
base_delay_ms = 250
jitter = 0.0

[cycle]
permission = "maintain"
"#;
        let config = parse(text, Path::new("config.toml"), |name| {
            (name == "GRADER").then(|| "s3cret".to_string())
        })
        .unwrap();

        let settings = &config.settings;
        assert_eq!(settings.failure_policy, FailurePolicy::StopOnFailure);
        assert_eq!(settings.parallelism, 8);
        assert_eq!(settings.cycle_permission, Permission::Maintain);
        assert!(settings.toggles.is_enabled(StepName::SyncTemplate));
        assert!(!settings.toggles.is_enabled(StepName::Secrets));
        assert!(settings.toggles.is_enabled(StepName::Discover));
        assert_eq!(
            settings.template.as_ref().unwrap().classroom,
            RepositoryId::parse("cs101/hw1-starter").unwrap()
        );
        assert_eq!(settings.secrets.len(), 1);
        assert_eq!(settings.secrets[0].value.expose(), "s3cret");
        assert!(settings.secrets[0].overwrite);
        assert_eq!(settings.exclude_repositories[0].as_str(), "hw1-solutions");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.retry.max_backoff, RetryConfig::default().max_backoff);
        assert_eq!(config.api_base_url, "https://ghe.example.edu/api/v3");
        assert_eq!(config.token_env, "CLASSROOM_TOKEN");
    }

    #[test]
    fn secret_value_is_read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-file").unwrap();
        let text = format!(
            "{MINIMAL}\n[[secrets]]\nname = \"API_KEY\"\nvalue_file = {:?}\n",
            file.path().display().to_string()
        );

        let config = parse_str(&text).unwrap();
        assert_eq!(config.settings.secrets[0].value.expose(), "from-file");
    }

    #[test]
    fn load_reads_the_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        assert_eq!(
            load(&path).unwrap().settings.assignment_prefix.as_str(),
            "hw1"
        );

        let missing = dir.path().join("absent.toml");
        assert!(matches!(load(&missing), Err(ConfigError::Read { .. })));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let text = format!("{MINIMAL}\nparalelism = 4\n");
        assert!(matches!(parse_str(&text), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn blank_organization_is_rejected() {
        let err = parse_str("organization = \" \"\nassignment_prefix = \"hw1\"\n").unwrap_err();
        assert!(message(err).contains("organization"));
    }

    #[test]
    fn secret_needs_exactly_one_source() {
        let text = format!("{MINIMAL}\n[[secrets]]\nname = \"X\"\n");
        assert!(message(parse_str(&text).unwrap_err()).contains("exactly one"));

        let text = format!(
            "{MINIMAL}\n[[secrets]]\nname = \"X\"\nvalue_env = \"A\"\nvalue_file = \"b\"\n"
        );
        assert!(message(parse_str(&text).unwrap_err()).contains("exactly one"));
    }

    #[test]
    fn missing_secret_variable_is_rejected() {
        let text = format!("{MINIMAL}\n[[secrets]]\nname = \"X\"\nvalue_env = \"NOPE\"\n");
        assert!(message(parse_str(&text).unwrap_err()).contains("NOPE"));
    }

    #[test]
    fn duplicate_secret_names_are_rejected() {
        let text = format!(
            "{MINIMAL}\n[[secrets]]\nname = \"X\"\nvalue_env = \"A\"\n[[secrets]]\nname = \"X\"\nvalue_env = \"A\"\n"
        );
        let err = parse(&text, Path::new("c.toml"), |_| Some("v".into())).unwrap_err();
        assert!(message(err).contains("more than once"));
    }

    #[test]
    fn invalid_retry_settings_are_rejected() {
        let text = format!("{MINIMAL}\n[retry]\nmax_attempts = 0\n");
        assert!(message(parse_str(&text).unwrap_err()).contains("max_attempts"));

        let text = format!("{MINIMAL}\n[retry]\njitter = 1.5\n");
        assert!(message(parse_str(&text).unwrap_err()).contains("jitter"));

        let text = format!("{MINIMAL}\n[retry]\nbase_delay_ms = 5000\nmax_backoff_ms = 100\n");
        assert!(message(parse_str(&text).unwrap_err()).contains("max_backoff_ms"));
    }

    #[test]
    fn malformed_template_is_rejected() {
        let text = format!("{MINIMAL}\n[template]\nsource = \"no-slash\"\nclassroom = \"cs101/x\"\n");
        assert!(message(parse_str(&text).unwrap_err()).contains("template.source"));
    }

    #[test]
    fn out_of_range_parallelism_is_clamped_not_rejected() {
        let text = format!("{MINIMAL}\nparallelism = 100\n");
        let config = parse_str(&text).unwrap();
        assert_eq!(config.settings.effective_parallelism(), pipeline::MAX_PARALLELISM);
    }
}
