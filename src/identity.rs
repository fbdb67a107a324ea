use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::model::UserId;
use crate::{Error, Result};

/// Maps an incoming request to the user acting on it.
#[async_trait]
pub trait IdentityResolver<R: ?Sized + Sync>: Send + Sync {
    async fn resolve(&self, request: &R) -> Result<UserId>;
}

/// Opaque session tokens held in memory.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, UserId>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session for `user` and returns its token.
    pub fn open(&self, user: UserId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.write().insert(token.clone(), user);
        token
    }

    pub fn close(&self, token: &str) -> bool {
        self.sessions.write().remove(token).is_some()
    }
}

#[async_trait]
impl IdentityResolver<str> for SessionTable {
    async fn resolve(&self, token: &str) -> Result<UserId> {
        self.sessions
            .read()
            .get(token)
            .copied()
            .ok_or(Error::Unauthenticated)
    }
}
