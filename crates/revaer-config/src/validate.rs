//! Parsing helpers shared by the environment loader.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

pub(crate) fn parse_socket_addr(name: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse::<SocketAddr>()
        .map_err(|err| ConfigError::InvalidValue {
            name,
            reason: err.to_string(),
        })
}

pub(crate) fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.parse().map_err(|_err| ConfigError::InvalidValue {
        name,
        reason: "must be a non-negative integer number of seconds".to_string(),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be positive".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

pub(crate) fn parse_usize(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    let parsed: usize = value.parse().map_err(|_err| ConfigError::InvalidValue {
        name,
        reason: "must be a non-negative integer".to_string(),
    })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(parsed)
}

pub(crate) fn parse_bool(name: &'static str, value: &str, default: bool) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            name,
            reason: format!("unrecognized boolean value '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_interval() {
        let err = parse_seconds("JOB_HEALTH_CHECK_INTERVAL", "0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn parses_bool_defaults() {
        assert!(parse_bool("JOB_UPLOAD_TORRENT_FILES", "", true).unwrap());
        assert!(!parse_bool("JOB_UPLOAD_TORRENT_FILES", "false", true).unwrap());
    }
}
