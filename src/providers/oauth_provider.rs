use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::providers::{AuthFailure, LoginInput, Provider, ProviderConfig, ProviderKind};
use crate::models::{Identity, ProviderTag};

/// Fully resolved endpoints for one OAuth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoints {
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
    scopes: Vec<String>,
}

fn defaults_for(kind: ProviderKind) -> Option<Endpoints> {
    match kind {
        ProviderKind::Google => Some(Endpoints {
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
        }),
        ProviderKind::Github => Some(Endpoints {
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            userinfo_url: "https://api.github.com/user".to_string(),
            scopes: vec!["read:user".into(), "user:email".into()],
        }),
        ProviderKind::Oauth => None,
    }
}

/// Authorization-code login against an external identity provider.
///
/// The code is exchanged at the provider's token endpoint, the resulting access
/// token is used once against the userinfo endpoint, and the profile is mapped
/// to an `Identity`. The provider's own tokens are not kept.
pub struct OAuthProvider {
    id: String,
    name: String,
    kind: ProviderKind,
    client_id: String,
    client_secret: String,
    endpoints: Endpoints,
    http: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(id: &str, config: &ProviderConfig, http: reqwest::Client) -> Result<Self, String> {
        let kind = config.resolved_kind(id);
        let defaults = defaults_for(kind);
        let pick = |explicit: &Option<String>, default: Option<&String>, field: &str| {
            explicit
                .clone()
                .or_else(|| default.cloned())
                .ok_or_else(|| format!("Provider '{}' is missing '{}'", id, field))
        };

        let endpoints = Endpoints {
            authorize_url: pick(
                &config.authorize_url,
                defaults.as_ref().map(|d| &d.authorize_url),
                "authorize_url",
            )?,
            token_url: pick(
                &config.token_url,
                defaults.as_ref().map(|d| &d.token_url),
                "token_url",
            )?,
            userinfo_url: pick(
                &config.userinfo_url,
                defaults.as_ref().map(|d| &d.userinfo_url),
                "userinfo_url",
            )?,
            scopes: config
                .scopes
                .clone()
                .or_else(|| defaults.as_ref().map(|d| d.scopes.clone()))
                .unwrap_or_default(),
        };

        let name = config.name.clone().unwrap_or_else(|| match kind {
            ProviderKind::Google => "Google".to_string(),
            ProviderKind::Github => "GitHub".to_string(),
            ProviderKind::Oauth => id.to_string(),
        });

        info!("Creating OAuth provider '{}' ({:?})", id, kind);
        Ok(Self {
            id: id.to_string(),
            name,
            kind,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            endpoints,
            http,
        })
    }

    /// Exchanges the authorization code for the provider's access token.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, AuthFailure> {
        debug!("Exchanging authorization code at provider '{}'", self.id);
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let resp = self
            .http
            .post(&self.endpoints.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| exchange_failed(format!("token endpoint unreachable: {}", e)))?;

        let status = resp.status();
        let body = resp
            .json::<Value>()
            .await
            .map_err(|e| exchange_failed(format!("failed to parse token response: {}", e)))?;

        // GitHub reports exchange errors with a 200 and an "error" field.
        if let Some(error) = body.get("error").and_then(Value::as_str) {
            return Err(exchange_failed(format!("token endpoint returned '{}'", error)));
        }
        if !status.is_success() {
            return Err(exchange_failed(format!("token endpoint returned {}", status)));
        }

        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| exchange_failed("no access_token in token response".to_string()))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Value, AuthFailure> {
        let resp = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| exchange_failed(format!("userinfo endpoint unreachable: {}", e)))?;

        if !resp.status().is_success() {
            return Err(exchange_failed(format!(
                "userinfo endpoint returned {}",
                resp.status()
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| exchange_failed(format!("failed to parse userinfo: {}", e)))
    }

    fn tag(&self) -> ProviderTag {
        match self.kind {
            ProviderKind::Google => ProviderTag::Google,
            ProviderKind::Github => ProviderTag::Github,
            ProviderKind::Oauth => ProviderTag::Other(self.id.clone()),
        }
    }
}

fn exchange_failed(reason: String) -> AuthFailure {
    warn!("OAuth exchange failed: {}", reason);
    AuthFailure::ProviderExchangeFailed(reason)
}

/// Reads the first present field as a string; numbers are rendered (GitHub ids are numeric).
fn first_string(profile: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match profile.get(*field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Maps a provider profile to an identity. Google uses OpenID claims, GitHub its
/// REST user object; generic providers are tried against both shapes.
fn identity_from_profile(kind: ProviderKind, tag: ProviderTag, profile: &Value) -> Result<Identity, AuthFailure> {
    let (subject_fields, name_fields): (&[&str], &[&str]) = match kind {
        ProviderKind::Google => (&["sub"], &["name", "email"]),
        ProviderKind::Github => (&["id"], &["name", "login"]),
        ProviderKind::Oauth => (
            &["sub", "id"],
            &["name", "preferred_username", "login", "email"],
        ),
    };

    let subject = first_string(profile, subject_fields)
        .ok_or_else(|| exchange_failed("profile carries no subject".to_string()))?;
    let email = first_string(profile, &["email"]).unwrap_or_default();
    let name = first_string(profile, name_fields).unwrap_or_else(|| subject.clone());

    Ok(Identity {
        subject,
        name,
        email,
        provider: tag,
    })
}

#[async_trait::async_trait]
impl Provider for OAuthProvider {
    fn get_id(&self) -> &str {
        &self.id
    }

    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_type(&self) -> &str {
        "oauth"
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Option<String> {
        let scope = self.endpoints.scopes.join(" ");
        Url::parse_with_params(
            &self.endpoints.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map(String::from)
        .map_err(|e| warn!("Bad authorize_url for provider '{}': {}", self.id, e))
        .ok()
    }

    async fn authenticate(&self, input: &LoginInput) -> Result<Identity, AuthFailure> {
        let LoginInput::Callback {
            code,
            error,
            redirect_uri,
        } = input
        else {
            return Err(AuthFailure::UnsupportedInput);
        };

        match error.as_deref() {
            Some("access_denied") => return Err(AuthFailure::ProviderDenied),
            Some(other) => {
                return Err(exchange_failed(format!("provider returned '{}'", other)));
            }
            None => {}
        }

        let code = code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| exchange_failed("callback carries no code".to_string()))?;

        let access_token = self.exchange_code(code, redirect_uri).await?;
        let profile = self.fetch_profile(&access_token).await?;
        identity_from_profile(self.kind, self.tag(), &profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn config(server_url: &str) -> ProviderConfig {
        ProviderConfig {
            kind: None,
            name: None,
            client_id: "client".to_string(),
            client_secret: "shh".to_string(),
            authorize_url: Some(format!("{}/authorize", server_url)),
            token_url: Some(format!("{}/token", server_url)),
            userinfo_url: Some(format!("{}/userinfo", server_url)),
            scopes: None,
        }
    }

    fn callback(code: Option<&str>, error: Option<&str>) -> LoginInput {
        LoginInput::Callback {
            code: code.map(str::to_string),
            error: error.map(str::to_string),
            redirect_uri: "http://localhost:3000/api/auth/callback/github".to_string(),
        }
    }

    #[tokio::test]
    async fn test_code_exchange_maps_github_profile() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "the-code".into()),
                Matcher::UrlEncoded("client_id".into(), "client".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "gho_123", "token_type": "bearer"}"#)
            .create_async()
            .await;
        let userinfo = server
            .mock("GET", "/userinfo")
            .match_header("authorization", "Bearer gho_123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 4242, "login": "octocat", "name": null, "email": "octo@example.com"}"#)
            .create_async()
            .await;

        let provider =
            OAuthProvider::new("github", &config(&server.url()), reqwest::Client::new()).unwrap();
        let identity = provider
            .authenticate(&callback(Some("the-code"), None))
            .await
            .unwrap();

        token.assert_async().await;
        userinfo.assert_async().await;
        assert_eq!(identity.subject, "4242");
        assert_eq!(identity.name, "octocat");
        assert_eq!(identity.email, "octo@example.com");
        assert_eq!(identity.provider, ProviderTag::Github);
    }

    #[tokio::test]
    async fn test_access_denied_is_provider_denied() {
        let provider =
            OAuthProvider::new("google", &config("http://unused"), reqwest::Client::new())
                .unwrap();
        let result = provider
            .authenticate(&callback(None, Some("access_denied")))
            .await;
        assert_eq!(result, Err(AuthFailure::ProviderDenied));
    }

    #[tokio::test]
    async fn test_token_endpoint_error_is_exchange_failure() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "bad_verification_code"}"#)
            .create_async()
            .await;

        let provider =
            OAuthProvider::new("github", &config(&server.url()), reqwest::Client::new()).unwrap();
        let result = provider.authenticate(&callback(Some("stale"), None)).await;
        token.assert_async().await;
        assert!(matches!(result, Err(AuthFailure::ProviderExchangeFailed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_exchange_failure() {
        let provider = OAuthProvider::new(
            "google",
            &config("http://127.0.0.1:9"),
            reqwest::Client::new(),
        )
        .unwrap();
        let result = provider.authenticate(&callback(Some("code"), None)).await;
        assert!(matches!(result, Err(AuthFailure::ProviderExchangeFailed(_))));
    }

    #[test]
    fn test_authorize_url_carries_state_and_redirect() {
        let mut cfg = config("http://idp.test");
        cfg.authorize_url = None;
        let provider = OAuthProvider::new("google", &cfg, reqwest::Client::new()).unwrap();
        let url = provider
            .authorize_url("http://localhost:3000/api/auth/callback/google", "st4te")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("accounts.google.com"));
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["state"], "st4te");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(
            pairs["redirect_uri"],
            "http://localhost:3000/api/auth/callback/google"
        );
    }

    #[test]
    fn test_google_profile_mapping() {
        let identity = identity_from_profile(
            ProviderKind::Google,
            ProviderTag::Google,
            &json!({"sub": "1090", "name": "Ada", "email": "ada@example.com"}),
        )
        .unwrap();
        assert_eq!(identity.subject, "1090");
        assert_eq!(identity.name, "Ada");
    }

    #[test]
    fn test_profile_without_subject_is_rejected() {
        let result = identity_from_profile(
            ProviderKind::Oauth,
            ProviderTag::Other("acme".into()),
            &json!({"name": "Nobody"}),
        );
        assert!(matches!(result, Err(AuthFailure::ProviderExchangeFailed(_))));
    }
}
