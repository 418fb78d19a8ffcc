//! 上游错误分类：把提供商的 HTTP 状态归一为有限的错误类别，并给出可重试语义。
//!
//! Upstream error classes.
//!
//! Every provider failure is reduced to one [`ErrorClass`]. The class alone
//! decides whether the failover router may try another provider.
//!
//! | Code  | Class               | Retryable |
//! |-------|---------------------|-----------|
//! | E1001 | `invalid_request`   | no        |
//! | E1002 | `authentication`    | no        |
//! | E1003 | `permission_denied` | no        |
//! | E1004 | `not_found`         | no        |
//! | E1005 | `request_too_large` | no        |
//! | E2001 | `rate_limited`      | yes       |
//! | E3001 | `server_error`      | yes       |
//! | E3003 | `timeout`           | yes       |
//! | E3004 | `connection`        | yes       |
//! | E9999 | `other`             | no        |
//!
//! ## Example
//!
//! ```rust
//! use llm_gateway::error_code::ErrorClass;
//!
//! let class = ErrorClass::from_http_status(503);
//! assert_eq!(class, ErrorClass::ServerError);
//! assert!(class.is_retryable());
//! assert!(!ErrorClass::from_http_status(400).is_retryable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed request or invalid parameters
    InvalidRequest,
    /// Invalid, expired, or missing provider key
    Authentication,
    /// Valid key without access to the resource
    PermissionDenied,
    /// Unknown model or endpoint
    NotFound,
    /// Payload exceeds the provider's limits
    RequestTooLarge,
    /// Provider-side throttling
    RateLimited,
    /// Any 5xx
    ServerError,
    /// Upstream or client-side timeout
    Timeout,
    /// Connection could not be established or was reset
    Connection,
    Other,
}

impl ErrorClass {
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::Authentication => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::RequestTooLarge => "E1005",
            Self::RateLimited => "E2001",
            Self::ServerError => "E3001",
            Self::Timeout => "E3003",
            Self::Connection => "E3004",
            Self::Other => "E9999",
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Other => "other",
        }
    }

    /// Transient failures another provider may not share.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::Timeout | Self::Connection
        )
    }

    /// Maps an upstream HTTP status to its class.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 | 504 => Self::Timeout,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
