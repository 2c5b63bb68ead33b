//! Authentication hook for resolving who opened a connection.
//!
//! lobbywire doesn't implement authentication itself. The server hands
//! the WebSocket upgrade request (path, query, headers) to an
//! [`Authenticator`], which answers with a [`UserId`] or refuses the
//! connection. Cookie sessions, OAuth bearer tokens and signed query
//! strings all fit behind the same trait.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use lobbywire_transport::UpgradeRequest;

use crate::SessionError;

/// The account a connection belongs to.
///
/// One user may hold several connections at once (two browser tabs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

/// Resolves the identity behind an upgrade request.
///
/// # Trait bounds
///
/// - `Send + Sync` → one authenticator is shared by every accept.
/// - `'static` → it lives as long as the server.
///
/// # Example
///
/// ```rust
/// use lobbywire_channel::{Authenticator, SessionError, UserId};
/// use lobbywire_transport::UpgradeRequest;
///
/// /// Trusts an `x-user` header set by a reverse proxy.
/// struct ProxyHeader;
///
/// impl Authenticator for ProxyHeader {
///     async fn authenticate(
///         &self,
///         request: &UpgradeRequest,
///     ) -> Result<UserId, SessionError> {
///         let raw = request
///             .header("x-user")
///             .ok_or_else(|| SessionError::AuthFailed("missing x-user".into()))?;
///         raw.parse()
///             .map(UserId)
///             .map_err(|_| SessionError::AuthFailed("x-user must be a number".into()))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Returns the user behind `request`.
    ///
    /// # Returns
    /// - `Ok(UserId)` — the connection may proceed
    /// - `Err(SessionError::AuthFailed)` — the connection is closed before
    ///   any channel sees it
    fn authenticate(
        &self,
        request: &UpgradeRequest,
    ) -> impl Future<Output = Result<UserId, SessionError>> + Send;
}

/// Development authenticator: reads the user id from a numeric `user`
/// query parameter (`ws://host/lobby?user=42`).
///
/// Anyone can claim any id. Never use this in production.
#[derive(Debug, Clone, Default)]
pub struct QueryTokenAuthenticator;

impl Authenticator for QueryTokenAuthenticator {
    async fn authenticate(
        &self,
        request: &UpgradeRequest,
    ) -> Result<UserId, SessionError> {
        let raw = request.query_param("user").ok_or_else(|| {
            SessionError::AuthFailed("missing `user` query parameter".into())
        })?;
        raw.parse().map(UserId).map_err(|_| {
            SessionError::AuthFailed(format!("`user` must be a number, got {raw:?}"))
        })
    }
}

/// Gives every connection a fresh user id, counting up from 1.
#[derive(Debug, Default)]
pub struct AnonymousAuthenticator {
    next: AtomicU64,
}

impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(
        &self,
        _request: &UpgradeRequest,
    ) -> Result<UserId, SessionError> {
        Ok(UserId(self.next.fetch_add(1, Ordering::Relaxed) + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_query_token_reads_user_param() {
        let req = UpgradeRequest::new("/lobby").with_query("user=42");
        let user = QueryTokenAuthenticator.authenticate(&req).await.unwrap();
        assert_eq!(user, UserId(42));
    }

    #[tokio::test]
    async fn test_query_token_rejects_missing_param() {
        let req = UpgradeRequest::new("/lobby");
        let err = QueryTokenAuthenticator.authenticate(&req).await.unwrap_err();
        assert!(matches!(err, SessionError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn test_query_token_rejects_non_numeric() {
        let req = UpgradeRequest::new("/lobby").with_query("user=alice");
        let err = QueryTokenAuthenticator.authenticate(&req).await.unwrap_err();
        assert!(err.to_string().contains("alice"));
    }

    #[tokio::test]
    async fn test_anonymous_ids_are_distinct() {
        let auth = AnonymousAuthenticator::default();
        let req = UpgradeRequest::new("/");
        let a = auth.authenticate(&req).await.unwrap();
        let b = auth.authenticate(&req).await.unwrap();
        assert_eq!(a, UserId(1));
        assert_eq!(b, UserId(2));
    }

    #[test]
    fn test_user_id_display() {
        assert_eq!(UserId(9).to_string(), "user-9");
    }
}
