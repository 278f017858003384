//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::time::Duration;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_listen(&mut errors, "rest.listen", &config.rest.listen);
    check_timeout(&mut errors, "rest.read_header_timeout", config.rest.read_header_timeout);
    check_timeout(&mut errors, "rest.read_timeout", config.rest.read_timeout);
    check_timeout(&mut errors, "rest.write_timeout", config.rest.write_timeout);

    check_listen(&mut errors, "rpc.listen", &config.rpc.listen);

    if config.bus.host.trim().is_empty() {
        errors.push(ValidationError::new("bus.host", "must not be empty"));
    }
    if config.bus.port == 0 {
        errors.push(ValidationError::new("bus.port", "must be greater than 0"));
    }

    check_timeout(&mut errors, "shutdown.grace_period", config.shutdown.grace_period);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_listen(errors: &mut Vec<ValidationError>, field: &'static str, listen: &str) {
    let listen = listen.trim();
    if listen.is_empty() {
        errors.push(ValidationError::new(field, "must not be empty"));
        return;
    }
    match listen.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => {}
        _ => errors.push(ValidationError::new(
            field,
            format!("{listen:?} is not a host:port address"),
        )),
    }
}

fn check_timeout(errors: &mut Vec<ValidationError>, field: &'static str, timeout: Duration) {
    if timeout.is_zero() {
        errors.push(ValidationError::new(field, "must be greater than 0"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ServiceConfig::default()), Ok(()));
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = ServiceConfig::default();
        config.rest.listen = String::new();
        config.rest.write_timeout = Duration::ZERO;
        config.rpc.listen = "localhost".to_string();
        config.bus.port = 0;
        config.shutdown.grace_period = Duration::ZERO;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "rest.listen",
                "rest.write_timeout",
                "rpc.listen",
                "bus.port",
                "shutdown.grace_period",
            ]
        );
    }

    #[test]
    fn test_listen_forms() {
        let mut config = ServiceConfig::default();
        for listen in [":8080", "0.0.0.0:8080", "localhost:0", "[::1]:9000"] {
            config.rest.listen = listen.to_string();
            assert_eq!(validate_config(&config), Ok(()), "{listen}");
        }
    }
}
