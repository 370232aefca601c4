pub mod agents;
pub mod compaction;
pub mod engine;
pub mod observability;
pub mod retry;
pub mod run_supervisor;
pub mod scheduler;
pub mod server;
pub mod sessions;
pub mod state;
pub mod stream_coalescer;
pub mod tool_status;
pub mod watchdog;

pub use agents::*;
pub use compaction::*;
pub use engine::*;
pub use observability::*;
pub use retry::*;
pub use run_supervisor::*;
pub use scheduler::*;
pub use server::*;
pub use sessions::*;
pub use state::*;
pub use stream_coalescer::*;
pub use tool_status::*;
pub use watchdog::*;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stream_coalescer: StreamCoalescerConfig,
    #[serde(default)]
    pub tool_status: ToolStatusConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub run_supervisor: RunSupervisorConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub state: StateConfig,
    /// Agent profile table, keyed by agent id.
    #[serde(default)]
    pub agents: HashMap<String, AgentConfig>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*" {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }
        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        if self.scheduler.max_concurrent_runs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.max_concurrent_runs".into(),
                message: "max_concurrent_runs must be greater than 0".into(),
            });
        }

        if self.stream_coalescer.min_chars == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "stream_coalescer.min_chars".into(),
                message: "min_chars of 0 flushes on every delta".into(),
            });
        }
        if self.stream_coalescer.max_full_text == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "stream_coalescer.max_full_text".into(),
                message: "max_full_text must be greater than 0".into(),
            });
        }

        if self.tool_status.max_actions == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "tool_status.max_actions".into(),
                message: "max_actions must be greater than 0".into(),
            });
        }

        if self.watchdog.idle_limit_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "watchdog.idle_limit_secs".into(),
                message: "idle_limit_secs must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.compaction.preemptive_ratio) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "compaction.preemptive_ratio".into(),
                message: format!(
                    "preemptive_ratio must be between 0.0 and 1.0 (got {})",
                    self.compaction.preemptive_ratio
                ),
            });
        }

        if self.engine.kill_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "engine.kill_timeout_secs".into(),
                message: "kill_timeout_secs must be greater than 0".into(),
            });
        }
        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (i, def) in self.engine.engines.iter().enumerate() {
            if def.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("engine.engines[{i}].id"),
                    message: "engine id must not be empty".into(),
                });
            }
            if !def.id.is_empty() && !seen_ids.insert(&def.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("engine.engines[{i}].id"),
                    message: format!("duplicate engine id \"{}\" — later entry shadows earlier one", def.id),
                });
            }
            match def.kind {
                engine::EngineKind::CliSubprocess => {
                    if def.command.as_ref().map_or(true, |c| c.is_empty()) {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("engine.engines[{i}].command"),
                            message: "cli_subprocess engine requires a non-empty command".into(),
                        });
                    }
                }
                engine::EngineKind::RemoteApi => {
                    let base_url = def.base_url.as_deref().unwrap_or("");
                    if base_url.is_empty() {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("engine.engines[{i}].base_url"),
                            message: "remote_api engine requires a non-empty base_url".into(),
                        });
                    } else if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                        errors.push(ConfigError {
                            severity: ConfigSeverity::Error,
                            field: format!("engine.engines[{i}].base_url"),
                            message: format!("base_url must start with http:// or https:// (got \"{base_url}\")"),
                        });
                    }
                }
                engine::EngineKind::Native => {}
            }
        }

        if self.run_supervisor.max_children == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "run_supervisor.max_children".into(),
                message: "max_children must be greater than 0".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample_rate must be between 0.0 and 1.0".into(),
            });
        }

        for (agent_id, agent) in &self.agents {
            if let Some(engine_id) = &agent.default_engine {
                if !self.engine.engines.iter().any(|e| &e.id == engine_id) && engine_id != "lemon" {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Warning,
                        field: format!("agents.{agent_id}.default_engine"),
                        message: format!("references unconfigured engine \"{engine_id}\""),
                    });
                }
            }
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig { port: 3210, host: "127.0.0.1".into(), ..ServerConfig::default() },
            engine: EngineConfig {
                engines: vec![engine::EngineDef {
                    id: "remote-1".into(),
                    kind: engine::EngineKind::RemoteApi,
                    command: None,
                    args: vec![],
                    base_url: Some("https://engines.example.com".into()),
                    auth: None,
                    models: vec![],
                }],
                ..EngineConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "server.port").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn server_host_empty_is_error() {
        let mut cfg = valid_config();
        cfg.server.host = String::new();
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "server.host").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "server.cors.allowed_origins").unwrap().severity, ConfigSeverity::Warning);
    }

    #[test]
    fn rate_limit_zero_rps_is_error() {
        let mut cfg = valid_config();
        cfg.server.rate_limit = Some(server::RateLimitConfig { requests_per_second: 0, burst_size: 100 });
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "server.rate_limit.requests_per_second").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn max_concurrent_runs_zero_is_error() {
        let mut cfg = valid_config();
        cfg.scheduler.max_concurrent_runs = 0;
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "scheduler.max_concurrent_runs").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn preemptive_ratio_out_of_range_is_error() {
        let mut cfg = valid_config();
        cfg.compaction.preemptive_ratio = 1.5;
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "compaction.preemptive_ratio").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn cli_subprocess_engine_without_command_is_error() {
        let mut cfg = valid_config();
        cfg.engine.engines.push(engine::EngineDef {
            id: "cli-1".into(),
            kind: engine::EngineKind::CliSubprocess,
            command: None,
            args: vec![],
            base_url: None,
            auth: None,
            models: vec![],
        });
        let issues = cfg.validate();
        let issue = find_issue(&issues, "engine.engines[1].command").expect("expected command error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn remote_api_engine_bad_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.engine.engines[0].base_url = Some("ftp://engines.example.com".into());
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "engine.engines[0].base_url").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn duplicate_engine_ids_is_warning() {
        let mut cfg = valid_config();
        let dup = cfg.engine.engines[0].clone();
        cfg.engine.engines.push(dup);
        let issues = cfg.validate();
        let dups: Vec<_> = issues.iter().filter(|e| e.message.contains("duplicate engine id")).collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn run_supervisor_max_children_zero_is_error() {
        let mut cfg = valid_config();
        cfg.run_supervisor.max_children = 0;
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "run_supervisor.max_children").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn agent_unconfigured_engine_is_warning() {
        let mut cfg = valid_config();
        cfg.agents.insert(
            "assistant".into(),
            AgentConfig { default_engine: Some("ghost".into()), ..Default::default() },
        );
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "agents.assistant.default_engine").unwrap().severity,
            ConfigSeverity::Warning
        );
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
