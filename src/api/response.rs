//! Business response codes and the service-error mapping.
//!
//! Business outcomes travel as success-status responses with a nonzero
//! `code` in the body, so the gateway forwards them uniformly. Transport
//! status codes are reserved for the middleware (401) and panic recovery
//! (500).

use crate::service::ServiceError;

pub const CODE_SUCCESS: i32 = 0;
pub const CODE_INVALID_PARAMS: i32 = 40001;
pub const CODE_INVALID_CREDENTIALS: i32 = 40002;
pub const CODE_UNAUTHORIZED: i32 = 40003;
pub const CODE_USER_NOT_FOUND: i32 = 40004;
pub const CODE_TOO_MANY_REQUESTS: i32 = 42901;
pub const CODE_INTERNAL: i32 = 50001;

/// Map a service error to its business code and client-facing message.
/// Internal detail stays in the logs.
pub fn map_service_error(error: &ServiceError) -> (i32, String) {
    match error {
        ServiceError::InvalidParams(v) => (CODE_INVALID_PARAMS, v.to_string()),
        ServiceError::InvalidCredentials => {
            (CODE_INVALID_CREDENTIALS, "invalid username or password".to_string())
        }
        ServiceError::LoginLimitExceeded => (
            CODE_TOO_MANY_REQUESTS,
            "too many failed login attempts, try again later".to_string(),
        ),
        ServiceError::InvalidToken => {
            (CODE_UNAUTHORIZED, "token is invalid or expired".to_string())
        }
        ServiceError::UserNotFound => (CODE_USER_NOT_FOUND, "user not found".to_string()),
        ServiceError::SessionCreateFailed
        | ServiceError::Store(_)
        | ServiceError::Kv(_) => (CODE_INTERNAL, "internal error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ValidationError;

    #[test]
    fn codes_are_bit_exact() {
        assert_eq!(
            map_service_error(&ServiceError::InvalidParams(ValidationError::Nickname)).0,
            40001
        );
        assert_eq!(map_service_error(&ServiceError::InvalidCredentials).0, 40002);
        assert_eq!(map_service_error(&ServiceError::InvalidToken).0, 40003);
        assert_eq!(map_service_error(&ServiceError::UserNotFound).0, 40004);
        assert_eq!(map_service_error(&ServiceError::LoginLimitExceeded).0, 42901);
        assert_eq!(map_service_error(&ServiceError::SessionCreateFailed).0, 50001);
    }

    #[test]
    fn internal_errors_never_leak_detail() {
        let (code, message) = map_service_error(&ServiceError::Store(
            crate::storage::StoreError::NotFound,
        ));
        assert_eq!(code, 50001);
        assert_eq!(message, "internal error");
    }
}
