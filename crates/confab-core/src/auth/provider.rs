use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{info, warn};

/// The external identity collaborator.
///
/// The transport reads the token synchronously per request; a 401 response
/// makes the orchestrator invoke `logout`. Protocol details (redirects,
/// refresh, PKCE) belong to the implementing provider, not this crate.
pub trait AuthProvider: Send + Sync {
    /// Current bearer token, if one is available.
    fn token(&self) -> Option<String>;

    fn is_authenticated(&self) -> bool;

    fn login(&self);

    fn logout(&self);

    fn has_role(&self, role: &str) -> bool;
}

/// Token-holder provider for processes that receive a bearer token out of
/// band (flag, environment). Stands in for a browser identity-provider
/// session.
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
    roles: Vec<String>,
    authenticated: AtomicBool,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>, roles: Vec<String>) -> Self {
        let authenticated = token.is_some();
        Self {
            token: RwLock::new(token),
            roles,
            authenticated: AtomicBool::new(authenticated),
        }
    }

    /// A provider with no credentials, for anonymous endpoints.
    pub fn anonymous() -> Self {
        Self::new(None, Vec::new())
    }
}

impl AuthProvider for StaticTokenProvider {
    fn token(&self) -> Option<String> {
        if !self.authenticated.load(Ordering::Relaxed) {
            return None;
        }
        self.token.read().clone()
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    fn login(&self) {
        if self.token.read().is_some() {
            info!("auth session restored");
            self.authenticated.store(true, Ordering::Relaxed);
        } else {
            warn!("login requested but no token is configured");
        }
    }

    fn logout(&self) {
        warn!("auth session ended");
        self.authenticated.store(false, Ordering::Relaxed);
    }

    fn has_role(&self, role: &str) -> bool {
        self.is_authenticated() && self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_present_means_authenticated() {
        let provider = StaticTokenProvider::new(Some("tok".to_string()), vec![]);
        assert!(provider.is_authenticated());
        assert_eq!(provider.token().as_deref(), Some("tok"));
    }

    #[test]
    fn test_logout_drops_token_access() {
        let provider = StaticTokenProvider::new(Some("tok".to_string()), vec![]);
        provider.logout();
        assert!(!provider.is_authenticated());
        assert!(provider.token().is_none());

        provider.login();
        assert!(provider.is_authenticated());
    }

    #[test]
    fn test_roles_require_authentication() {
        let provider =
            StaticTokenProvider::new(Some("tok".to_string()), vec!["admin".to_string()]);
        assert!(provider.has_role("admin"));
        assert!(!provider.has_role("auditor"));

        provider.logout();
        assert!(!provider.has_role("admin"));
    }

    #[test]
    fn test_anonymous_provider() {
        let provider = StaticTokenProvider::anonymous();
        assert!(!provider.is_authenticated());
        assert!(provider.token().is_none());
    }
}
