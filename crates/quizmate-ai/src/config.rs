//! AI provider configuration and its persistence

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::KeyValueStore;
use crate::types::{DisclosurePolicy, Provider};

/// Storage key of the configuration record
pub const CONFIG_KEY: &str = "ai_config";

/// Model used until the user picks one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Active provider configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: Provider,
    /// API key sent as a bearer token
    pub credential: String,
    /// Base URL override; required for `Provider::Custom`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    pub disclosure_policy: DisclosurePolicy,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            credential: String::new(),
            endpoint: None,
            model: DEFAULT_MODEL.to_string(),
            disclosure_policy: DisclosurePolicy::default(),
        }
    }
}

impl ProviderConfig {
    /// Base URL requests for this configuration go to
    pub fn base_url(&self) -> String {
        resolve_endpoint(self.provider, self.endpoint.as_deref())
    }
}

/// Partially filled configuration, as edited in a settings form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDraft {
    pub provider: Option<Provider>,
    pub credential: Option<String>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

impl From<&ProviderConfig> for ConfigDraft {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            provider: Some(config.provider),
            credential: Some(config.credential.clone()),
            endpoint: config.endpoint.clone(),
            model: Some(config.model.clone()),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Resolve the base URL for a provider. A non-blank override always wins;
/// `Provider::Custom` without one yields an empty string.
pub fn resolve_endpoint(provider: Provider, endpoint: Option<&str>) -> String {
    match endpoint {
        Some(url) if !url.trim().is_empty() => url.to_string(),
        _ => provider.base_url().to_string(),
    }
}

/// Check a draft configuration, reporting every problem at once.
/// Returns an empty list iff the draft is usable.
pub fn validate(draft: &ConfigDraft) -> Vec<String> {
    let mut errors = Vec::new();

    if draft.provider.is_none() {
        errors.push("Choose an AI provider".to_string());
    }
    if is_blank(draft.credential.as_deref()) {
        errors.push("Enter an API key".to_string());
    }
    if is_blank(draft.model.as_deref()) {
        errors.push("Choose a model".to_string());
    }
    if draft.provider == Some(Provider::Custom) && is_blank(draft.endpoint.as_deref()) {
        errors.push("A custom provider needs an API endpoint".to_string());
    }

    errors
}

/// Reads and writes the persisted `ProviderConfig`
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the configuration merged over defaults. Never fails: missing or
    /// unreadable records fall back to the defaults.
    pub fn get(&self) -> ProviderConfig {
        self.load().config
    }

    fn load(&self) -> StoredConfig {
        let raw = match self.store.get(CONFIG_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoredConfig::default(),
            Err(e) => {
                tracing::warn!("Failed to load AI config: {}", e);
                return StoredConfig::default();
            }
        };

        match serde_json::from_str::<Map<String, Value>>(&raw) {
            Ok(record) => merge_record(record),
            Err(e) => {
                tracing::warn!("Ignoring corrupt AI config: {}", e);
                StoredConfig::default()
            }
        }
    }

    /// Persist the full configuration
    pub fn set(&self, config: &ProviderConfig) -> Result<()> {
        let raw = serde_json::to_string(config)?;
        self.store.set(CONFIG_KEY, &raw).inspect_err(|e| {
            tracing::error!("Failed to save AI config: {}", e);
        })
    }

    /// Whether a credential has been configured
    pub fn is_configured(&self) -> bool {
        !self.get().credential.is_empty()
    }

    /// Load the configuration a call can be made with. Fails without touching
    /// the network if no credential is set, the stored provider is unknown, or
    /// the record does not pass [`validate`].
    pub fn require(&self) -> Result<ProviderConfig> {
        let StoredConfig {
            config,
            unknown_provider,
        } = self.load();

        if config.credential.is_empty() {
            return Err(Error::NotConfigured);
        }
        if let Some(name) = unknown_provider {
            return Err(Error::UnsupportedProvider(name));
        }

        let errors = validate(&ConfigDraft::from(&config));
        if !errors.is_empty() {
            return Err(Error::InvalidConfig(errors.join("; ")));
        }
        Ok(config)
    }
}

/// A loaded record, plus a provider name this build does not know
#[derive(Debug, Default)]
struct StoredConfig {
    config: ProviderConfig,
    unknown_provider: Option<String>,
}

/// Overlay each stored field on the defaults. A field that does not parse
/// keeps its default and leaves the others alone.
fn merge_record(mut record: Map<String, Value>) -> StoredConfig {
    let mut stored = StoredConfig::default();
    let config = &mut stored.config;

    if let Some(value) = record.remove("provider") {
        match value {
            Value::String(name) => match name.parse() {
                Ok(provider) => config.provider = provider,
                Err(e) => {
                    tracing::warn!("Stored AI config names an unknown provider: {}", e);
                    stored.unknown_provider = Some(name);
                }
            },
            other => tracing::warn!("Ignoring AI config field provider: {}", other),
        }
    }

    merge_field(&mut record, "credential", &mut config.credential);
    merge_field(&mut record, "endpoint", &mut config.endpoint);
    merge_field(&mut record, "model", &mut config.model);
    merge_field(&mut record, "disclosurePolicy", &mut config.disclosure_policy);

    stored
}

fn merge_field<T: DeserializeOwned>(record: &mut Map<String, Value>, key: &str, target: &mut T) {
    let Some(value) = record.remove(key) else {
        return;
    };
    match serde_json::from_value(value) {
        Ok(parsed) => *target = parsed,
        Err(e) => tracing::warn!("Ignoring AI config field {}: {}", key, e),
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Persistence("quota exceeded".into()))
        }
    }

    fn memory_config_store() -> (Arc<MemoryStore>, ConfigStore) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), ConfigStore::new(store))
    }

    #[test]
    fn test_get_defaults_when_absent() {
        let (_, config) = memory_config_store();
        let c = config.get();
        assert_eq!(c.provider, Provider::OpenAI);
        assert_eq!(c.credential, "");
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.endpoint, None);
        assert_eq!(c.disclosure_policy, DisclosurePolicy::AfterSubmit);
        assert!(!config.is_configured());
    }

    #[test]
    fn test_get_merges_partial_record_over_defaults() {
        let (store, config) = memory_config_store();
        store
            .set(CONFIG_KEY, r#"{"provider":"qwen","credential":"sk-1"}"#)
            .unwrap();
        let c = config.get();
        assert_eq!(c.provider, Provider::Qwen);
        assert_eq!(c.credential, "sk-1");
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.disclosure_policy, DisclosurePolicy::AfterSubmit);
        assert!(config.is_configured());
    }

    #[test]
    fn test_get_bad_field_keeps_the_others() {
        let (store, config) = memory_config_store();
        store
            .set(
                CONFIG_KEY,
                r#"{"provider":"deepseek","credential":"sk-1","model":"deepseek-chat","disclosurePolicy":"sometimes"}"#,
            )
            .unwrap();
        let c = config.get();
        assert_eq!(c.provider, Provider::DeepSeek);
        assert_eq!(c.credential, "sk-1");
        assert_eq!(c.model, "deepseek-chat");
        assert_eq!(c.disclosure_policy, DisclosurePolicy::AfterSubmit);
        assert!(config.require().is_ok());
    }

    #[test]
    fn test_unknown_stored_provider_is_unsupported() {
        let (store, config) = memory_config_store();
        store
            .set(CONFIG_KEY, r#"{"provider":"anthropic","credential":"sk-1"}"#)
            .unwrap();

        let c = config.get();
        assert_eq!(c.provider, Provider::OpenAI);
        assert_eq!(c.credential, "sk-1");

        let err = config.require().unwrap_err();
        assert!(matches!(err, Error::UnsupportedProvider(ref name) if name == "anthropic"));
    }

    #[test]
    fn test_require_rejects_incomplete_record() {
        let (store, config) = memory_config_store();
        store
            .set(CONFIG_KEY, r#"{"provider":"custom","credential":"k","model":""}"#)
            .unwrap();

        match config.require().unwrap_err() {
            Error::InvalidConfig(message) => {
                assert_eq!(
                    message,
                    "Choose a model; A custom provider needs an API endpoint"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_get_non_object_record_yields_defaults() {
        let (store, config) = memory_config_store();
        store.set(CONFIG_KEY, "[1, 2]").unwrap();
        assert_eq!(config.get(), ProviderConfig::default());
    }

    #[test]
    fn test_get_corrupt_record_yields_defaults() {
        let (store, config) = memory_config_store();
        store.set(CONFIG_KEY, "{broken").unwrap();
        assert_eq!(config.get(), ProviderConfig::default());
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let (store, config) = memory_config_store();
        let c = ProviderConfig {
            provider: Provider::Custom,
            credential: "k".into(),
            endpoint: Some("http://localhost:8080/v1".into()),
            model: "llama3".into(),
            disclosure_policy: DisclosurePolicy::Never,
        };
        config.set(&c).unwrap();
        assert_eq!(config.get(), c);

        let raw = store.get(CONFIG_KEY).unwrap().unwrap();
        assert!(raw.contains("\"disclosurePolicy\":\"never\""));
    }

    #[test]
    fn test_set_propagates_storage_failure() {
        let config = ConfigStore::new(Arc::new(FailingStore));
        let err = config.set(&ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn test_require_not_configured() {
        let (_, config) = memory_config_store();
        assert!(config.require().unwrap_err().is_not_configured());
    }

    #[test]
    fn test_resolve_endpoint_defaults_are_stable() {
        for provider in Provider::ALL {
            assert_eq!(
                resolve_endpoint(provider, None),
                resolve_endpoint(provider, None)
            );
        }
        assert_eq!(
            resolve_endpoint(Provider::OpenAI, None),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            resolve_endpoint(Provider::DeepSeek, None),
            "https://api.deepseek.com/v1"
        );
        assert_eq!(
            resolve_endpoint(Provider::Qwen, None),
            "https://dashscope.aliyuncs.com/api/v1"
        );
        assert_eq!(resolve_endpoint(Provider::Custom, None), "");
    }

    #[test]
    fn test_resolve_endpoint_override_wins() {
        for provider in Provider::ALL {
            assert_eq!(resolve_endpoint(provider, Some("https://x")), "https://x");
        }
    }

    #[test]
    fn test_resolve_endpoint_blank_override_ignored() {
        assert_eq!(
            resolve_endpoint(Provider::OpenAI, Some("  ")),
            "https://api.openai.com/v1"
        );
    }

    #[test]
    fn test_validate_valid_config() {
        let draft = ConfigDraft::from(&ProviderConfig {
            credential: "k".into(),
            ..Default::default()
        });
        assert!(validate(&draft).is_empty());
    }

    #[test]
    fn test_validate_reports_all_errors() {
        let errors = validate(&ConfigDraft::default());
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_validate_blank_strings() {
        let draft = ConfigDraft {
            provider: Some(Provider::OpenAI),
            credential: Some("   ".into()),
            endpoint: None,
            model: Some("".into()),
        };
        assert_eq!(validate(&draft).len(), 2);
    }

    #[test]
    fn test_validate_custom_requires_endpoint() {
        let mut draft = ConfigDraft {
            provider: Some(Provider::Custom),
            credential: Some("k".into()),
            endpoint: None,
            model: Some("m".into()),
        };
        assert_eq!(
            validate(&draft),
            vec!["A custom provider needs an API endpoint".to_string()]
        );

        draft.endpoint = Some("http://localhost:11434/v1".into());
        assert!(validate(&draft).is_empty());
    }

    #[test]
    fn test_validate_endpoint_only_checked_for_custom() {
        let draft = ConfigDraft {
            provider: Some(Provider::Qwen),
            credential: Some("k".into()),
            endpoint: None,
            model: Some("qwen-plus".into()),
        };
        assert!(validate(&draft).is_empty());
    }
}
