//! Normalized token claims
//!
//! Upstream servers shape role claims differently. Keycloak access tokens
//! put realm roles under `realm_access.roles`, while tokens minted by
//! protocol mappers or other issuers often carry a flat `roles` claim, which
//! may even be a single string. [`extract_roles`] reconciles these into one
//! list by trying a fixed sequence of strategies; the first one that
//! recognizes its field wins and nothing is merged.

use crate::error::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

type RoleStrategy = fn(&Value) -> Option<Vec<String>>;

const ROLE_STRATEGIES: &[RoleStrategy] = &[top_level_roles, realm_access_roles];

/// Extract role names from raw claims
///
/// Never fails: a token without any recognizable roles field has no roles.
///
/// # Example
///
/// ```rust
/// use keygate_auth::jwt::extract_roles;
/// use serde_json::json;
///
/// let flat = extract_roles(&json!({"roles": ["A", "B"]}));
/// let nested = extract_roles(&json!({"realm_access": {"roles": ["A", "B"]}}));
/// assert_eq!(flat, nested);
/// ```
pub fn extract_roles(raw_claims: &Value) -> Vec<String> {
    ROLE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(raw_claims))
        .unwrap_or_default()
}

fn top_level_roles(claims: &Value) -> Option<Vec<String>> {
    claims.get("roles").and_then(string_list)
}

fn realm_access_roles(claims: &Value) -> Option<Vec<String>> {
    claims
        .get("realm_access")
        .and_then(|access| access.get("roles"))
        .and_then(string_list)
}

/// A string is a one-element list; non-string array items are dropped.
fn string_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(role) => Some(vec![role.clone()]),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
        ),
        _ => None,
    }
}

/// Claims of a validated token
///
/// Built once per successful validation; holds no reference to the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    /// Subject (`sub`)
    pub subject: Option<String>,
    /// Realm name, taken from the issuer URL (`.../realms/{realm}`)
    pub realm: Option<String>,
    /// Role names, in token order
    pub roles: Vec<String>,
    /// Audience (`aud`), always a list
    pub audience: Vec<String>,
    /// Issuer (`iss`)
    pub issuer: Option<String>,
    /// Expiration time (`exp`)
    pub expires_at: DateTime<Utc>,
    /// Issued-at time (`iat`)
    pub issued_at: Option<DateTime<Utc>>,
    /// Not-before time (`nbf`)
    pub not_before: Option<DateTime<Utc>>,
    /// Token identifier (`jti`)
    pub token_id: Option<String>,
    /// Token type (`typ`), e.g. `Bearer`
    pub token_type: Option<String>,
    /// Client the token was issued to (`azp`, falling back to `client_id`)
    pub client_id: Option<String>,
}

impl TokenClaims {
    /// Build normalized claims from a verified payload
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] when `exp` is missing or not a
    /// representable timestamp.
    pub fn from_raw(raw: &Value) -> AuthResult<Self> {
        let expires_at = timestamp(raw, "exp")
            .ok_or_else(|| AuthError::invalid("missing or invalid exp claim"))?;
        let issuer = string_claim(raw, "iss");

        Ok(Self {
            subject: string_claim(raw, "sub"),
            realm: issuer.as_deref().and_then(realm_from_issuer),
            roles: extract_roles(raw),
            audience: raw.get("aud").and_then(string_list).unwrap_or_default(),
            issuer,
            expires_at,
            issued_at: timestamp(raw, "iat"),
            not_before: timestamp(raw, "nbf"),
            token_id: string_claim(raw, "jti"),
            token_type: string_claim(raw, "typ"),
            client_id: string_claim(raw, "azp").or_else(|| string_claim(raw, "client_id")),
        })
    }

    /// Check if the token carries a role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the token carries at least one of `roles`
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    /// Check if the token was issued for `audience`
    pub fn is_for_audience(&self, audience: &str) -> bool {
        self.audience.iter().any(|a| a == audience)
    }
}

/// Realm segment of a Keycloak issuer URL
pub fn realm_from_issuer(issuer: &str) -> Option<String> {
    let path = match url::Url::parse(issuer) {
        Ok(url) => url.path().to_string(),
        Err(_) => issuer.to_string(),
    };

    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments
        .by_ref()
        .find(|segment| *segment == "realms")
        .and_then(|_| segments.next())
        .map(str::to_owned)
}

fn string_claim(raw: &Value, name: &str) -> Option<String> {
    raw.get(name).and_then(Value::as_str).map(str::to_owned)
}

fn timestamp(raw: &Value, name: &str) -> Option<DateTime<Utc>> {
    let value = raw.get(name)?;
    let secs = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))?;
    DateTime::<Utc>::from_timestamp(secs, 0)
}
