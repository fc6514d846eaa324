use super::schema::ServerSettings;
use crate::error::{ConfigError, FrameworkError, Result};
use crate::security::SecretHash;
use figment::{
    providers::{Env, Format, Json, Toml, Yaml},
    Figment,
};
use regex::Regex;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "CONNECTOR_SERVER_";

fn env_provider() -> Env {
    // CONNECTOR_SERVER_SERVER__PORT=9000 -> server.port
    Env::prefixed(ENV_PREFIX).split("__")
}

pub fn load_from_env_or_file() -> Result<ServerSettings> {
    let settings: ServerSettings = Figment::new()
        .merge(Toml::file("connector-server.toml"))
        .merge(Json::file("connector-server.json"))
        .merge(Yaml::file("connector-server.yaml"))
        .merge(Yaml::file("connector-server.yml"))
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    finish(settings)
}

pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<ServerSettings> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ConfigError::Parse(format!("Config file not found: {}", path.display())).into());
    }

    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Figment::new().merge(Toml::file(path)),
        Some("json") => Figment::new().merge(Json::file(path)),
        Some("yaml") | Some("yml") => Figment::new().merge(Yaml::file(path)),
        _ => {
            return Err(ConfigError::Parse(
                "Unsupported config file format. Use .toml, .json, .yaml, or .yml".into(),
            )
            .into())
        }
    };

    let settings: ServerSettings = figment
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    finish(settings)
}

fn finish(settings: ServerSettings) -> Result<ServerSettings> {
    let settings = apply_env_substitutions(settings)?;
    validate(&settings)?;
    Ok(settings)
}

pub fn validate(settings: &ServerSettings) -> Result<()> {
    if settings.server.max_connections == 0 {
        return Err(invalid("server maxConnections must be greater than 0"));
    }
    if settings.server.handshake_timeout_ms == 0 {
        return Err(invalid("server handshakeTimeoutMs must be greater than 0"));
    }
    if let Some(address) = &settings.server.metrics_address {
        if let Err(e) = address.parse::<SocketAddr>() {
            return Err(invalid(&format!("server metricsAddress is invalid: {e}")));
        }
    }
    if settings.server.key_hash.trim().is_empty() {
        return Err(ConfigError::Validation(
            "server keyHash is required; generate one with `connector-host hash-secret`".into(),
        )
        .into());
    }
    settings
        .server
        .key_hash
        .parse::<SecretHash>()
        .map_err(|e| ConfigError::Validation(format!("server keyHash is invalid: {e}")))?;

    if settings.operation_timeout_ms == Some(0) {
        return Err(invalid("operationTimeoutMs must be greater than 0"));
    }
    if settings.pool.eviction_interval_ms == 0 {
        return Err(invalid("pool evictionIntervalMs must be greater than 0"));
    }

    settings.pool.to_pool_config().validate()?;
    Ok(())
}

fn invalid(message: &str) -> FrameworkError {
    ConfigError::Validation(message.to_string()).into()
}

fn apply_env_substitutions(mut settings: ServerSettings) -> Result<ServerSettings> {
    settings.server.key_hash = substitute_env_vars(&settings.server.key_hash)?;
    settings.bundles.paths = settings
        .bundles
        .paths
        .iter()
        .map(|path| substitute_env_vars(&path.to_string_lossy()).map(PathBuf::from))
        .collect::<Result<Vec<_>>>()?;
    Ok(settings)
}

pub(crate) fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let pattern =
        Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::Parse(e.to_string()))?;

    for cap in pattern.captures_iter(input) {
        let expression = &cap[1];
        let (name, default) = match expression.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expression, None),
        };
        let value = match (std::env::var(name), default) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.to_string(),
            (Err(_), None) => {
                return Err(ConfigError::EnvVar(format!(
                    "Environment variable '{}' not found",
                    name
                ))
                .into())
            }
        };
        result = result.replace(&cap[0], &value);
    }

    Ok(result)
}
