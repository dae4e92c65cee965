use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use hrdesk_core::config::DEFAULT_TOP_K;
use hrdesk_core::retrieval::knowledge_base::DEFAULT_API_VERSION;
use hrdesk_core::{
    AmbiguityPolicy, ClassifierKind, ConfigurationError, RouterConfig, SettingsRequest,
    Specialization, VariantTable,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Shipped default config, also used when no config file exists yet
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrdeskConfig {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub router: RouterCliConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub index_name: Option<String>,
    /// Variant name -> knowledge base name on the retrieval service
    #[serde(default)]
    pub knowledge_bases: BTreeMap<String, String>,
}

impl std::fmt::Debug for KnowledgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeConfig")
            .field("variant", &self.variant)
            .field("endpoint", &self.endpoint)
            .field("api_key", &mask_secret(&self.api_key))
            .field("api_version", &self.api_version)
            .field("index_name", &self.index_name)
            .field("knowledge_bases", &self.knowledge_bases)
            .finish()
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            endpoint: String::new(),
            api_key: String::new(),
            api_version: default_search_api_version(),
            index_name: None,
            knowledge_bases: BTreeMap::new(),
        }
    }
}

fn default_variant() -> String {
    "base".to_string()
}
fn default_search_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            reasoning_effort: None,
            top_k: default_top_k(),
        }
    }
}

fn default_mode() -> String {
    "agentic".to_string()
}
fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmProviderKind {
    #[serde(rename = "azure-openai")]
    AzureOpenAi,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: LlmProviderKind,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Deployment name for Azure OpenAI
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_api_version")]
    pub api_version: String,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("api_version", &self.api_version)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            model: default_llm_model(),
            api_version: default_llm_api_version(),
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Endpoint with the public OpenAI API filled in when unset
    pub fn effective_endpoint(&self) -> String {
        match (self.provider, self.endpoint.is_empty()) {
            (LlmProviderKind::OpenAi, true) => "https://api.openai.com".to_string(),
            _ => self.endpoint.clone(),
        }
    }

    /// An unset `${AZURE_OPENAI_DEPLOYMENT}` expands to nothing
    pub fn effective_model(&self) -> String {
        if self.model.trim().is_empty() {
            default_llm_model()
        } else {
            self.model.clone()
        }
    }
}

fn default_llm_provider() -> LlmProviderKind {
    LlmProviderKind::AzureOpenAi
}
fn default_llm_model() -> String {
    "gpt-4o".to_string()
}
fn default_llm_api_version() -> String {
    "2024-10-21".to_string()
}
fn default_llm_max_tokens() -> u32 {
    2048
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterCliConfig {
    #[serde(default)]
    pub classifier: ClassifierKind,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// "fallback" or "strict"
    #[serde(default = "default_on_ambiguous")]
    pub on_ambiguous: String,
    #[serde(default = "default_agent")]
    pub default_agent: String,
}

impl Default for RouterCliConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierKind::default(),
            threshold: default_threshold(),
            on_ambiguous: default_on_ambiguous(),
            default_agent: default_agent(),
        }
    }
}

fn default_threshold() -> f32 {
    hrdesk_core::router::DEFAULT_CONFIDENCE_THRESHOLD
}
fn default_on_ambiguous() -> String {
    "fallback".to_string()
}
fn default_agent() -> String {
    "benefits".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Applied separately to retrieval and to the completion call
    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,
    /// Prior turns kept by `chat`
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_query_timeout(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_query_timeout() -> u64 {
    60
}
fn default_max_history_turns() -> usize {
    10
}

/// Variant/mode/effort names supplied outside the config file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub variant: Option<String>,
    pub mode: Option<String>,
    pub reasoning_effort: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            variant: var("KNOWLEDGE_BASE_VARIANT"),
            mode: var("RETRIEVAL_MODE"),
            reasoning_effort: var("RETRIEVAL_REASONING_EFFORT"),
        }
    }
}

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hrdesk")
}

impl HrdeskConfig {
    /// Load from `custom_path`, or `~/.hrdesk/config.toml`.
    ///
    /// A missing default file falls back to the shipped defaults, so a
    /// purely environment-driven setup works without `hrdesk init`. A missing
    /// `-c` path is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.clone(),
            None => {
                let default_path = config_dir().join("config.toml");
                if !default_path.exists() {
                    debug!(
                        "No config at {}, using built-in defaults",
                        default_path.display()
                    );
                    return Self::parse(DEFAULT_CONFIG);
                }
                default_path
            }
        };
        Self::load_file(&path)
    }

    fn load_file(path: &Path) -> Result<Self> {
        // Refuse group/world readable config files on Unix; they may hold keys
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `hrdesk init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        // Check for hardcoded API keys
        for line in content.lines() {
            let Some(value) = line
                .trim()
                .strip_prefix("api_key")
                .and_then(|rest| rest.trim_start().strip_prefix('='))
            else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && !value.contains("${") {
                warn!(
                    "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{AZURE_OPENAI_API_KEY}}\""
                );
            }
        }

        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());
        toml::from_str(&expanded).context("Invalid config TOML")
    }

    /// Apply environment overrides, then flag overrides on top
    pub fn apply_overrides(&mut self, env: &Overrides, flags: &Overrides) {
        for o in [env, flags] {
            if let Some(v) = &o.variant {
                self.knowledge.variant = v.clone();
            }
            if let Some(m) = &o.mode {
                self.retrieval.mode = m.clone();
            }
            if let Some(e) = &o.reasoning_effort {
                self.retrieval.reasoning_effort = Some(e.clone());
            }
        }
    }

    /// Names to hand to `Settings::resolve`. Knowledge base overrides keyed by
    /// an unknown variant name are rejected here.
    pub fn to_settings_request(&self) -> Result<SettingsRequest, ConfigurationError> {
        let mut variants = VariantTable::new();
        for (name, knowledge_base) in &self.knowledge.knowledge_bases {
            let variant = VariantTable::new().resolve_variant(name)?.variant;
            variants = variants.with_knowledge_base(variant, knowledge_base.clone());
        }
        if let Some(index) = &self.knowledge.index_name {
            variants = variants.with_index_name(index.clone());
        }

        Ok(SettingsRequest {
            variant: self.knowledge.variant.clone(),
            mode: self.retrieval.mode.clone(),
            reasoning_effort: self.retrieval.reasoning_effort.clone(),
            top_k: self.retrieval.top_k,
            variants,
        })
    }

    pub fn router_config(&self) -> Result<RouterConfig> {
        let on_ambiguous = match self.router.on_ambiguous.trim().to_lowercase().as_str() {
            "strict" => AmbiguityPolicy::Strict,
            "fallback" => {
                let agent: Specialization = self
                    .router
                    .default_agent
                    .parse()
                    .map_err(|e: String| anyhow!("[router] default_agent: {}", e))?;
                AmbiguityPolicy::Fallback(agent)
            }
            other => bail!(
                "[router] on_ambiguous must be 'fallback' or 'strict', got '{}'",
                other
            ),
        };

        let config = RouterConfig {
            classifier: self.router.classifier,
            threshold: self.router.threshold,
            on_ambiguous,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query.timeout_secs.max(1))
    }

    /// Problems with the configured service endpoints, empty when both are usable
    pub fn endpoint_problems(&self) -> Vec<ConfigurationError> {
        [
            ("knowledge.endpoint (AZURE_SEARCH_ENDPOINT)", self.knowledge.endpoint.clone()),
            ("llm.endpoint (AZURE_OPENAI_ENDPOINT)", self.llm.effective_endpoint()),
        ]
        .into_iter()
        .filter_map(|(label, endpoint)| check_endpoint(label, &endpoint).err())
        .collect()
    }

    /// Copy with every secret masked, for display
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.knowledge.api_key = mask_secret(&copy.knowledge.api_key);
        copy.llm.api_key = mask_secret(&copy.llm.api_key);
        copy
    }
}

fn check_endpoint(label: &str, endpoint: &str) -> Result<(), ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidEndpoint {
        endpoint: if endpoint.is_empty() {
            label.to_string()
        } else {
            endpoint.to_string()
        },
        reason,
    };

    if endpoint.trim().is_empty() {
        return Err(invalid("not set".to_string()));
    }
    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Allowlist of environment variable names that may be expanded in config files.
/// This prevents an attacker who can modify the config from reading arbitrary env vars.
const ALLOWED_ENV_VARS: &[&str] = &[
    "AZURE_SEARCH_ENDPOINT",
    "AZURE_SEARCH_API_KEY",
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_DEPLOYMENT",
    "OPENAI_API_KEY",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    s.split_inclusive('\n')
        .map(|line| {
            if line.trim_start().starts_with('#') {
                line.to_string()
            } else {
                expand_line(line, &lookup)
            }
        })
        .collect()
}

fn expand_line(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrdesk_core::{DataSource, KnowledgeBaseVariant, RetrievalMode, Settings};
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        // NamedTempFile is created 0600, which passes the permission check
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_parses() {
        let config: HrdeskConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.knowledge.variant, "base");
        assert_eq!(config.retrieval.mode, "agentic");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.llm.provider, LlmProviderKind::AzureOpenAi);
        assert_eq!(config.router.classifier, ClassifierKind::Keyword);
        assert_eq!(config.query.max_history_turns, 10);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = HrdeskConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.knowledge.variant, "base");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.router.threshold, 0.6);
    }

    #[test]
    fn test_load_file_sections() {
        let file = write_config(
            r#"
[knowledge]
variant = "with-web"
endpoint = "https://search.example.net"

[knowledge.knowledge_bases]
with-web = "hr-kb-web"

[retrieval]
mode = "semantic"
top_k = 3

[router]
classifier = "model-assisted"
on_ambiguous = "strict"
"#,
        );
        let config = HrdeskConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.router.classifier, ClassifierKind::ModelAssisted);

        let settings = Settings::resolve(&config.to_settings_request().unwrap()).unwrap();
        assert_eq!(settings.sources.variant, KnowledgeBaseVariant::WithWeb);
        assert_eq!(settings.sources.knowledge_base, "hr-kb-web");
        assert!(settings.sources.includes(DataSource::Web));
        assert_eq!(settings.retrieval.mode, RetrievalMode::SinglePassHybrid);
        assert_eq!(settings.retrieval.top_k, 3);

        assert_eq!(config.router_config().unwrap().on_ambiguous, AmbiguityPolicy::Strict);
    }

    #[test]
    fn test_missing_custom_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = HrdeskConfig::load(&Some(missing)).unwrap_err();
        assert!(err.to_string().contains("hrdesk init"));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_world_readable_config() {
        use std::os::unix::fs::PermissionsExt;
        let file = write_config("");
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(HrdeskConfig::load(&Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_expand_allowlisted_vars_only() {
        let lookup = |name: &str| match name {
            "AZURE_SEARCH_ENDPOINT" => Some("https://search.example.net".to_string()),
            "SECRET_THING" => Some("leaked".to_string()),
            _ => None,
        };
        let out = expand_env_vars(
            "a = \"${AZURE_SEARCH_ENDPOINT}\"\nb = \"${SECRET_THING}\"\nc = \"${AZURE_OPENAI_API_KEY}\"",
            lookup,
        );
        assert!(out.contains("a = \"https://search.example.net\""));
        assert!(out.contains("b = \"${SECRET_THING}\""));
        assert!(out.contains("c = \"\""));
        assert!(!out.contains("leaked"));
    }

    #[test]
    fn test_default_config_expands_cleanly() {
        let out = expand_env_vars(DEFAULT_CONFIG, |_| None);
        let unexpanded: Vec<&str> = out.lines().filter(|l| l.contains("${")).collect();
        assert!(unexpanded.is_empty(), "left unexpanded: {:?}", unexpanded);
    }

    #[test]
    fn test_comment_lines_are_not_expanded() {
        let lookup = |_: &str| Some("value".to_string());
        let out = expand_env_vars(
            "# see ${AZURE_SEARCH_ENDPOINT}\n  # ${VAR}\nendpoint = \"${AZURE_SEARCH_ENDPOINT}\"\n",
            lookup,
        );
        assert_eq!(
            out,
            "# see ${AZURE_SEARCH_ENDPOINT}\n  # ${VAR}\nendpoint = \"value\"\n"
        );
    }

    #[test]
    fn test_expand_unterminated_reference() {
        assert_eq!(expand_env_vars("x = \"${HOME\"", |_| None), "x = \"${HOME\"");
    }

    #[test]
    fn test_flags_override_env_override_file() {
        let mut config: HrdeskConfig = toml::from_str("").unwrap();
        let env = Overrides {
            variant: Some("with-sharepoint".to_string()),
            mode: Some("semantic".to_string()),
            reasoning_effort: None,
        };
        let flags = Overrides {
            variant: Some("with-web".to_string()),
            ..Overrides::default()
        };
        config.apply_overrides(&env, &flags);
        assert_eq!(config.knowledge.variant, "with-web");
        assert_eq!(config.retrieval.mode, "semantic");
    }

    #[test]
    fn test_unknown_override_name_fails_resolution() {
        let mut config: HrdeskConfig = toml::from_str("").unwrap();
        config.apply_overrides(
            &Overrides::default(),
            &Overrides {
                variant: Some("with-everything".to_string()),
                ..Overrides::default()
            },
        );
        let err = Settings::resolve(&config.to_settings_request().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownVariant { .. }));
    }

    #[test]
    fn test_unknown_knowledge_base_override_key() {
        let config: HrdeskConfig =
            toml::from_str("[knowledge.knowledge_bases]\nwith-fax = \"x\"").unwrap();
        assert!(config.to_settings_request().is_err());
    }

    #[test]
    fn test_router_config_validation() {
        let mut config: HrdeskConfig = toml::from_str("").unwrap();
        assert_eq!(
            config.router_config().unwrap().on_ambiguous,
            AmbiguityPolicy::Fallback(Specialization::Benefits)
        );

        config.router.default_agent = "perks".to_string();
        assert_eq!(
            config.router_config().unwrap().on_ambiguous,
            AmbiguityPolicy::Fallback(Specialization::Perks)
        );

        config.router.default_agent = "roles".to_string();
        assert!(config.router_config().is_err());

        config.router.default_agent = "benefits".to_string();
        config.router.on_ambiguous = "guess".to_string();
        assert!(config.router_config().is_err());

        config.router.on_ambiguous = "strict".to_string();
        config.router.threshold = 1.2;
        assert!(config.router_config().is_err());
    }

    #[test]
    fn test_endpoint_problems() {
        let mut config: HrdeskConfig = toml::from_str("").unwrap();
        assert_eq!(config.endpoint_problems().len(), 2);

        config.knowledge.endpoint = "https://search.example.net".to_string();
        config.llm.endpoint = "${NOT_ALLOWED}".to_string();
        let problems = config.endpoint_problems();
        assert_eq!(problems.len(), 1);
        assert!(matches!(
            &problems[0],
            ConfigurationError::InvalidEndpoint { endpoint, .. } if endpoint == "${NOT_ALLOWED}"
        ));

        config.llm.endpoint = "https://my-openai.openai.azure.com/".to_string();
        assert!(config.endpoint_problems().is_empty());
    }

    #[test]
    fn test_openai_provider_has_default_endpoint() {
        let config: HrdeskConfig = toml::from_str("[llm]\nprovider = \"openai\"").unwrap();
        assert_eq!(config.llm.effective_endpoint(), "https://api.openai.com");
    }

    #[test]
    fn test_empty_deployment_falls_back_to_default_model() {
        let config: HrdeskConfig = toml::from_str("[llm]\nmodel = \"\"").unwrap();
        assert_eq!(config.llm.effective_model(), "gpt-4o");
    }

    #[test]
    fn test_secrets_are_masked() {
        let mut config: HrdeskConfig = toml::from_str("").unwrap();
        config.llm.api_key = "sk-abcdefghijklmnop".to_string();
        config.knowledge.api_key = "short".to_string();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-abcdefghijklmnop"));
        assert!(debug.contains("sk-...mnop"));

        let masked = config.masked();
        assert_eq!(masked.knowledge.api_key, "***");
        let printed = toml::to_string_pretty(&masked).unwrap();
        assert!(!printed.contains("abcdefghijklmnop"));
    }

    #[test]
    fn test_mask_secret_multibyte() {
        assert_eq!(mask_secret(""), "(empty)");
        assert_eq!(mask_secret("ключ-секрет-123"), "клю...-123");
    }
}
