use crate::core::config::SessionConfig;

/// Signed-in identity as handed over by the authentication backend. Only
/// the user id matters here: it scopes vendor calls and namespaces local
/// connector state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

pub const USER_ENV: &str = "CREATORFLOW_USER_ID";

impl Session {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            email: None,
            display_name: None,
        }
    }

    /// `CREATORFLOW_USER_ID` wins over `[session] user_id`. A blank id means
    /// nobody is signed in.
    pub fn resolve(config: &SessionConfig) -> Option<Self> {
        let user_id = std::env::var(USER_ENV)
            .ok()
            .or_else(|| config.user_id.clone())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())?;
        Some(Self {
            user_id,
            email: config.email.clone(),
            display_name: config.display_name.clone(),
        })
    }

    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}
