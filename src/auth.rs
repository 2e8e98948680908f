use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub email: Option<String>,
}

/// Supplies the identity imported trades are attributed to
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// `None` when nobody is signed in
    async fn current_user(&self) -> Option<UserContext>;
}

/// Fixed identity, used by the CLI and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<UserContext>,
}

impl StaticAuth {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            user: Some(UserContext {
                user_id: user_id.into(),
                email: None,
            }),
        }
    }

    pub fn signed_out() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<UserContext> {
        self.user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_auth() {
        let user = StaticAuth::signed_in("trader-7").current_user().await.unwrap();
        assert_eq!(user.user_id, "trader-7");
        assert!(StaticAuth::signed_out().current_user().await.is_none());
    }
}
