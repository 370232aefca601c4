//! Engine registry.
//!
//! Constructs and holds all configured engine-adapter instances. At startup
//! the registry reads the [`EngineConfig`], instantiates the adapter
//! appropriate for each entry's [`EngineKind`], and always registers the
//! native `"lemon"` engine regardless of configuration so the core never
//! boots with zero usable engines.

use std::collections::HashMap;
use std::sync::Arc;

use orc_domain::config::engine::{EngineConfig, EngineDef, EngineKind};
use orc_domain::error::{Error, Result};

use crate::cli_subprocess::CliSubprocessEngine;
use crate::native::NativeEngine;
use crate::remote_api::RemoteApiEngine;
use crate::traits::EngineAdapter;

/// Records an engine that failed to initialize.
#[derive(Debug, Clone)]
pub struct EngineInitError {
    pub engine_id: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message before it reaches logs or the health endpoint.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

/// Holds all instantiated engine adapters, keyed by [`EngineAdapter::id`].
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn EngineAdapter>>,
    default_engine: String,
    init_errors: Vec<EngineInitError>,
    model_engines: HashMap<String, String>,
}

fn build_adapter(def: &EngineDef) -> Result<Arc<dyn EngineAdapter>> {
    match def.kind {
        EngineKind::Native => Ok(Arc::new(NativeEngine::new(def.id.clone()))),
        EngineKind::CliSubprocess => {
            CliSubprocessEngine::from_def(def).map(|a| Arc::new(a) as Arc<dyn EngineAdapter>)
        }
        EngineKind::RemoteApi => {
            RemoteApiEngine::from_def(def).map(|a| Arc::new(a) as Arc<dyn EngineAdapter>)
        }
    }
}

impl EngineRegistry {
    /// Build the registry from the application's [`EngineConfig`]. The
    /// native `"lemon"` engine is always present; configured entries that
    /// fail to initialize are logged and skipped rather than aborting
    /// startup.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut engines: HashMap<String, Arc<dyn EngineAdapter>> = HashMap::new();
        let mut init_errors = Vec::new();
        let mut model_engines: HashMap<String, String> = HashMap::new();

        engines.insert(
            "lemon".to_string(),
            Arc::new(NativeEngine::new("lemon")) as Arc<dyn EngineAdapter>,
        );

        for def in &config.engines {
            if def.id == "lemon" && matches!(def.kind, EngineKind::Native) {
                continue;
            }
            match build_adapter(def) {
                Ok(adapter) => {
                    tracing::info!(engine_id = %def.id, kind = ?def.kind, "registered engine adapter");
                    for model in &def.models {
                        model_engines.insert(model.clone(), def.id.clone());
                    }
                    engines.insert(def.id.clone(), adapter);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        engine_id = %def.id,
                        kind = ?def.kind,
                        error = %safe_error,
                        "failed to initialize engine adapter, skipping"
                    );
                    init_errors.push(EngineInitError {
                        engine_id: def.id.clone(),
                        kind: format!("{:?}", def.kind),
                        error: safe_error,
                    });
                }
            }
        }

        if !engines.contains_key(&config.default_engine) {
            return Err(Error::UnknownEngine(config.default_engine.clone()));
        }

        Ok(Self { engines, default_engine: config.default_engine.clone(), init_errors, model_engines })
    }

    /// Look up an engine adapter by id.
    pub fn get(&self, engine_id: &str) -> Option<Arc<dyn EngineAdapter>> {
        self.engines.get(engine_id).cloned()
    }

    /// The engine id configured to serve `model`, if any `EngineDef` names
    /// it in its `models` list. Backs the orchestrator's model-implied
    /// engine-resolution tier.
    pub fn engine_for_model(&self, model: &str) -> Option<&str> {
        self.model_engines.get(model).map(String::as_str)
    }

    /// The configured default engine, always resolvable.
    pub fn default_engine(&self) -> Arc<dyn EngineAdapter> {
        self.engines
            .get(&self.default_engine)
            .cloned()
            .expect("default_engine validated present in from_config")
    }

    pub fn default_engine_id(&self) -> &str {
        &self.default_engine
    }

    /// List all registered engine ids (sorted).
    pub fn list_engines(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.engines.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Engine initialization errors (empty if all configured entries
    /// succeeded). Surfaced in the health endpoint's `checks`.
    pub fn init_errors(&self) -> &[EngineInitError] {
        &self.init_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_registers_lemon_only() {
        let config = EngineConfig::default();
        let registry = EngineRegistry::from_config(&config).unwrap();
        assert_eq!(registry.list_engines(), vec!["lemon".to_string()]);
        assert_eq!(registry.default_engine().id(), "lemon");
    }

    #[test]
    fn unknown_default_engine_fails() {
        let config = EngineConfig { default_engine: "missing".into(), ..Default::default() };
        let err = EngineRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::UnknownEngine(_)));
    }

    #[test]
    fn engine_for_model_resolves_a_configured_model() {
        let config = EngineConfig {
            engines: vec![EngineDef {
                id: "remote-1".into(),
                kind: EngineKind::RemoteApi,
                command: None,
                args: Vec::new(),
                base_url: Some("https://example.com".into()),
                auth: None,
                models: vec!["gpt-remote".into()],
            }],
            ..Default::default()
        };
        let registry = EngineRegistry::from_config(&config).unwrap();
        assert_eq!(registry.engine_for_model("gpt-remote"), Some("remote-1"));
        assert_eq!(registry.engine_for_model("unlisted"), None);
    }

    #[test]
    fn cli_subprocess_missing_command_is_skipped_not_fatal() {
        let config = EngineConfig {
            engines: vec![EngineDef {
                id: "broken-cli".into(),
                kind: EngineKind::CliSubprocess,
                command: None,
                args: Vec::new(),
                base_url: None,
                auth: None,
                models: vec![],
            }],
            ..Default::default()
        };
        let registry = EngineRegistry::from_config(&config).unwrap();
        assert_eq!(registry.list_engines(), vec!["lemon".to_string()]);
        assert_eq!(registry.init_errors().len(), 1);
    }
}
