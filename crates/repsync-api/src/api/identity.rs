//! Request identity resolution.
//!
//! Credential verification is an upstream concern; by the time a request
//! reaches these handlers its identity has been established and stamped onto
//! headers. This module only reads that stamp.

use actix_web::HttpRequest;
use uuid::Uuid;

use repsync_core::Identity;

/// Header carrying an authenticated user id.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header carrying a device-scoped anonymous user id.
pub const ANONYMOUS_USER_ID_HEADER: &str = "X-Anonymous-User-Id";

/// Resolves the identity a request should be attributed to.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, request: &HttpRequest) -> Option<Identity>;
}

/// Reads the identity stamped onto request headers by the upstream
/// authentication layer.
pub struct HeaderIdentityProvider;

impl HeaderIdentityProvider {
    fn header_uuid(request: &HttpRequest, name: &str) -> Option<Uuid> {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
    }
}

impl IdentityProvider for HeaderIdentityProvider {
    fn resolve(&self, request: &HttpRequest) -> Option<Identity> {
        if let Some(user_id) = Self::header_uuid(request, USER_ID_HEADER) {
            return Some(Identity::Authenticated(user_id));
        }
        Self::header_uuid(request, ANONYMOUS_USER_ID_HEADER).map(Identity::Anonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn authenticated_header_wins() {
        let user_id = Uuid::new_v4();
        let request = TestRequest::default()
            .insert_header((USER_ID_HEADER, user_id.to_string()))
            .insert_header((ANONYMOUS_USER_ID_HEADER, Uuid::new_v4().to_string()))
            .to_http_request();

        let identity = HeaderIdentityProvider.resolve(&request).unwrap();
        assert_eq!(identity, Identity::Authenticated(user_id));
    }

    #[test]
    fn anonymous_header_falls_back() {
        let anon = Uuid::new_v4();
        let request = TestRequest::default()
            .insert_header((ANONYMOUS_USER_ID_HEADER, anon.to_string()))
            .to_http_request();

        let identity = HeaderIdentityProvider.resolve(&request).unwrap();
        assert_eq!(identity, Identity::Anonymous(anon));
    }

    #[test]
    fn malformed_header_resolves_to_none() {
        let request = TestRequest::default()
            .insert_header((USER_ID_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(HeaderIdentityProvider.resolve(&request).is_none());
    }
}
