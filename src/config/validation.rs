//! Configuration validation.

use crate::config::schema::GatewayConfig;
use url::Url;

/// A single validation failure, with enough context to fix the config.
#[derive(Debug)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration before serving begins.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.is_empty() {
        errors.push(ValidationError {
            field: "listener.bind_address",
            message: "must not be empty".to_string(),
        });
    }

    match Url::parse(&config.backend.auth_backend) {
        Ok(url) if url.host_str().is_none() => errors.push(ValidationError {
            field: "backend.auth_backend",
            message: "must include a host".to_string(),
        }),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError {
            field: "backend.auth_backend",
            message: format!("invalid URL: {}", e),
        }),
    }

    if config.static_files.document_root.as_os_str().is_empty() {
        errors.push(ValidationError {
            field: "static_files.document_root",
            message: "must not be empty".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
