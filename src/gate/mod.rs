//! The access gate: decides per request whether to admit it or send the
//! caller to the login entry point.

mod decision;
mod middleware;
mod routes;

pub use decision::{decide, Decision};
pub use middleware::access_gate;
pub use routes::{RouteTable, Visibility};

use url::form_urlencoded;

use crate::auth::CredentialState;
use crate::config::GateConfig;

pub struct Gate {
    routes: RouteTable,
    login_path: String,
}

impl Gate {
    pub fn new(config: &GateConfig) -> Result<Self, String> {
        Ok(Gate {
            routes: RouteTable::new(&config.login_path, &config.public_prefixes)?,
            login_path: config.login_path.clone(),
        })
    }

    pub fn classify(&self, path: &str) -> Visibility {
        self.routes.classify(path)
    }

    /// `(path, credential state) -> decision`, with no side effects.
    pub fn evaluate(&self, path: &str, credential: &CredentialState) -> Decision {
        decide(self.classify(path), credential)
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Login URL that returns the caller to `return_to` after signing in.
    pub fn login_redirect(&self, return_to: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("callbackUrl", return_to)
            .finish();
        format!("{}?{}", self.login_path, query)
    }

    /// Login URL carrying a failure code for the login page to display.
    pub fn login_error(&self, code: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("error", code)
            .finish();
        format!("{}?{}", self.login_path, query)
    }
}

/// Only same-origin relative paths are accepted as post-login destinations.
pub fn safe_return_path(candidate: Option<&str>) -> String {
    match candidate {
        Some(path)
            if path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\") =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}
