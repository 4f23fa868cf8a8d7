//! Request identity
//!
//! Authentication happens in front of the daemon. The proxy forwards the
//! signed in user as `X-Gauge-Org-Id`, `X-Gauge-Role` and `X-Gauge-Login`.

use super::error::ApiError;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use gauge_backend::PluginUser;
use std::fmt;
use std::str::FromStr;

pub const ORG_ID_HEADER: &str = "x-gauge-org-id";
pub const ROLE_HEADER: &str = "x-gauge-role";
pub const LOGIN_HEADER: &str = "x-gauge-login";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    #[default]
    Viewer,
    Editor,
    Admin,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Viewer => "Viewer",
            Role::Editor => "Editor",
            Role::Admin => "Admin",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub org_id: i64,
    pub role: Role,
    pub login: String,
}

impl Default for SignedInUser {
    fn default() -> Self {
        Self {
            org_id: 1,
            role: Role::Viewer,
            login: String::new(),
        }
    }
}

impl SignedInUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn to_plugin_user(&self) -> PluginUser {
        PluginUser {
            login: self.login.clone(),
            name: self.login.clone(),
            email: String::new(),
            role: self.role.to_string(),
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SignedInUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut user = SignedInUser::default();
        if let Some(org) = header(parts, ORG_ID_HEADER)? {
            user.org_id = org
                .parse()
                .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid org id"))?;
        }
        if let Some(role) = header(parts, ROLE_HEADER)? {
            user.role = role
                .parse()
                .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "Invalid role"))?;
        }
        if let Some(login) = header(parts, LOGIN_HEADER)? {
            user.login = login.to_string();
        }
        Ok(user)
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(v) => v.to_str().map(|s| Some(s.trim())).map_err(|_| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid {} header", name))
        }),
    }
}
