use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use serde::{Deserialize, Serialize};

use crate::{config::UserConfig, http::ApiError};

/// Ordered so that a higher role includes everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Reader,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Reader => "reader",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role >= role {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("{} role or higher required", role.as_str())))
        }
    }
}

/// Bearer tokens from the `[[users]]` config entries.
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_token: HashMap<String, User>,
}

impl UserDirectory {
    pub fn from_config(users: &[UserConfig]) -> Self {
        let mut by_token = HashMap::with_capacity(users.len());
        for u in users {
            let user = User {
                id: u.id.clone(),
                role: u.role,
            };
            if by_token.insert(u.token.clone(), user).is_some() {
                tracing::warn!(user = %u.id, "token shared by several users, keeping the last one");
            }
        }
        Self { by_token }
    }

    pub fn authenticate(&self, token: &str) -> Option<&User> {
        self.by_token.get(token)
    }
}

/// The caller, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<UserDirectory>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        let users = Arc::<UserDirectory>::from_ref(state);
        users
            .authenticate(token)
            .cloned()
            .map(AuthUser)
            .ok_or(ApiError::Unauthenticated)
    }
}
