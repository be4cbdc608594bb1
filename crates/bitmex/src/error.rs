// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Unified error handling for the BitMEX hub.
//!
//! This module provides the error taxonomy shared by the transport, the REST
//! client and the order placement path, with classifiers for HTTP statuses,
//! rate-limit headers and authentication failure reasons.

use reqwest::{StatusCode, header::HeaderMap};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Maximum number of body bytes attached to a classified HTTP error.
const BODY_SNIPPET_MAX: usize = 256;

/// Classified reason for an authentication failure.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq, AsRefStr)]
pub enum BitmexAuthReason {
    /// Signature, key or permission problem; credentials must change.
    BadCredentials,
    /// The signed expiry was rejected; local clock is off.
    ClockSkew,
    /// No auth response arrived within the configured window.
    Timeout,
    /// The connection was already authenticated; treated as success.
    AlreadyAuthed,
    /// Socket error or close during the attempt, or unclassified failure.
    Network,
}

/// The error type for all hub operations.
#[derive(Clone, Debug, Error)]
pub enum BitmexError {
    /// Transport-level failure (connect reset, DNS, abort, socket loss).
    #[error("Network error: {message}")]
    Network { message: String },

    /// Authentication failure with a classified reason.
    #[error("Authentication error ({reason}): {message}")]
    Auth {
        reason: BitmexAuthReason,
        message: String,
    },

    /// HTTP 429 with the server's retry hint, when one was provided.
    #[error("Rate limit exceeded (retry after {retry_after_ms:?} ms): {message}")]
    RateLimit {
        retry_after_ms: Option<u64>,
        message: String,
    },

    /// Invalid caller input or a 4xx the venue attributes to the request.
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// The venue refused the order (HTTP 409/422).
    #[error("Order rejected: {message}")]
    OrderRejected { message: String },

    /// The venue is unavailable (HTTP 5xx).
    #[error("Exchange unavailable (status {status:?}): {message}")]
    ExchangeDown {
        status: Option<u16>,
        message: String,
    },

    /// A bounded wait elapsed (request timeout, pong deadline, auth window).
    #[error("Timed out: {message}")]
    Timeout { message: String },

    /// Anything that defies the categories above.
    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl BitmexError {
    /// Returns `true` for categories worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::RateLimit { .. }
                | Self::ExchangeDown { .. }
                | Self::Timeout { .. }
        )
    }

    /// Gets the suggested retry delay in milliseconds, if the server sent one.
    #[must_use]
    pub const fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Builds a network error from any displayable source.
    pub fn network(message: impl std::fmt::Display) -> Self {
        Self::Network {
            message: message.to_string(),
        }
    }

    /// Builds a validation error from any displayable source.
    pub fn validation(message: impl std::fmt::Display) -> Self {
        Self::Validation {
            message: message.to_string(),
        }
    }

    /// Builds a timeout error from any displayable source.
    pub fn timeout(message: impl std::fmt::Display) -> Self {
        Self::Timeout {
            message: message.to_string(),
        }
    }

    /// Classifies a non-2xx HTTP response.
    ///
    /// Attaches a bounded body snippet and the request id (from
    /// `x-request-id`/`x-correlation-id`) to the message.
    #[must_use]
    pub fn from_http_response(status: StatusCode, body: &str, headers: &HeaderMap) -> Self {
        let message = http_error_message(status, body, headers);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth {
                reason: classify_auth_reason(body),
                message,
            },
            StatusCode::REQUEST_TIMEOUT => Self::Timeout { message },
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Self::OrderRejected { message }
            }
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimit {
                retry_after_ms: parse_retry_after_ms(headers),
                message,
            },
            s if s.is_client_error() => Self::Validation { message },
            s if s.is_server_error() => Self::ExchangeDown {
                status: Some(s.as_u16()),
                message,
            },
            _ => Self::Unknown { message },
        }
    }
}

fn http_error_message(status: StatusCode, body: &str, headers: &HeaderMap) -> String {
    let snippet: String = body.chars().take(BODY_SNIPPET_MAX).collect();
    let request_id = headers
        .get("x-request-id")
        .or_else(|| headers.get("x-correlation-id"))
        .and_then(|v| v.to_str().ok());

    match request_id {
        Some(id) => format!("HTTP {status} [request-id {id}]: {snippet}"),
        None => format!("HTTP {status}: {snippet}"),
    }
}

/// Parses the server's retry hint into milliseconds.
///
/// Recognized headers, in order: `Retry-After` (relative seconds),
/// `Retry-After-Ms`/`X-Retry-After-Ms` (relative milliseconds), and
/// `X-Rate-Limit-Reset` (absolute epoch in milliseconds or seconds, or a
/// relative second count).
#[must_use]
pub fn parse_retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    };

    if let Some(secs) = header_u64("retry-after") {
        return Some(secs * 1_000);
    }
    if let Some(ms) = header_u64("retry-after-ms").or_else(|| header_u64("x-retry-after-ms")) {
        return Some(ms);
    }
    if let Some(reset) = header_u64("x-rate-limit-reset") {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        // Epoch milliseconds, epoch seconds, or a relative second count
        if reset > 1_000_000_000_000 {
            return Some(reset.saturating_sub(now_ms));
        }
        if reset > 1_000_000_000 {
            return Some((reset * 1_000).saturating_sub(now_ms));
        }
        return Some(reset * 1_000);
    }
    None
}

const ALREADY_AUTHED_PHRASES: &[&str] = &["already"];
const BAD_CREDENTIAL_PHRASES: &[&str] = &[
    "signature",
    "key",
    "permission",
    "authorization",
    "forbidden",
];
const CLOCK_SKEW_PHRASES: &[&str] = &["timestamp", "expired", "clock"];

/// Classifies a server-provided authentication failure reason.
///
/// Matching is case-insensitive substring search; unmatched reasons fall back
/// to [`BitmexAuthReason::Network`].
#[must_use]
pub fn classify_auth_reason(reason: &str) -> BitmexAuthReason {
    let lowered = reason.to_ascii_lowercase();
    let contains_any = |phrases: &[&str]| phrases.iter().any(|p| lowered.contains(p));

    if contains_any(ALREADY_AUTHED_PHRASES) {
        BitmexAuthReason::AlreadyAuthed
    } else if contains_any(BAD_CREDENTIAL_PHRASES) {
        BitmexAuthReason::BadCredentials
    } else if contains_any(CLOCK_SKEW_PHRASES) {
        BitmexAuthReason::ClockSkew
    } else {
        BitmexAuthReason::Network
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[rstest]
    fn test_retryable_categories() {
        assert!(BitmexError::network("reset").is_retryable());
        assert!(
            BitmexError::RateLimit {
                retry_after_ms: None,
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(
            BitmexError::ExchangeDown {
                status: Some(503),
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(BitmexError::timeout("slow").is_retryable());

        assert!(!BitmexError::validation("bad size").is_retryable());
        assert!(
            !BitmexError::OrderRejected {
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(
            !BitmexError::Auth {
                reason: BitmexAuthReason::BadCredentials,
                message: String::new(),
            }
            .is_retryable()
        );
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED)]
    #[case(StatusCode::FORBIDDEN)]
    fn test_auth_statuses(#[case] status: StatusCode) {
        let err = BitmexError::from_http_response(status, "Invalid API Key.", &HeaderMap::new());
        assert!(matches!(
            err,
            BitmexError::Auth {
                reason: BitmexAuthReason::BadCredentials,
                ..
            }
        ));
    }

    #[rstest]
    fn test_classification_by_status() {
        let empty = HeaderMap::new();
        assert!(matches!(
            BitmexError::from_http_response(StatusCode::REQUEST_TIMEOUT, "", &empty),
            BitmexError::Timeout { .. }
        ));
        assert!(matches!(
            BitmexError::from_http_response(StatusCode::UNPROCESSABLE_ENTITY, "", &empty),
            BitmexError::OrderRejected { .. }
        ));
        assert!(matches!(
            BitmexError::from_http_response(StatusCode::CONFLICT, "", &empty),
            BitmexError::OrderRejected { .. }
        ));
        assert!(matches!(
            BitmexError::from_http_response(StatusCode::BAD_REQUEST, "", &empty),
            BitmexError::Validation { .. }
        ));
        assert!(matches!(
            BitmexError::from_http_response(StatusCode::SERVICE_UNAVAILABLE, "", &empty),
            BitmexError::ExchangeDown {
                status: Some(503),
                ..
            }
        ));
    }

    #[rstest]
    fn test_rate_limit_retry_after_seconds() {
        let err = BitmexError::from_http_response(
            StatusCode::TOO_MANY_REQUESTS,
            "",
            &headers(&[("retry-after", "1")]),
        );
        assert_eq!(err.retry_after_ms(), Some(1_000));
    }

    #[rstest]
    fn test_rate_limit_retry_after_ms_headers() {
        assert_eq!(
            parse_retry_after_ms(&headers(&[("retry-after-ms", "250")])),
            Some(250)
        );
        assert_eq!(
            parse_retry_after_ms(&headers(&[("x-retry-after-ms", "750")])),
            Some(750)
        );
    }

    #[rstest]
    fn test_rate_limit_reset_relative_seconds() {
        assert_eq!(
            parse_retry_after_ms(&headers(&[("x-rate-limit-reset", "5")])),
            Some(5_000)
        );
    }

    #[rstest]
    fn test_rate_limit_reset_epoch_seconds() {
        let reset = (chrono::Utc::now().timestamp() + 30) as u64;
        let ms = parse_retry_after_ms(&headers(&[("x-rate-limit-reset", &reset.to_string())]))
            .unwrap();
        assert!(ms > 28_000 && ms <= 30_000, "unexpected hint: {ms}");
    }

    #[rstest]
    fn test_rate_limit_reset_epoch_millis() {
        let reset = (chrono::Utc::now().timestamp_millis() + 30_000) as u64;
        let ms = parse_retry_after_ms(&headers(&[("x-rate-limit-reset", &reset.to_string())]))
            .unwrap();
        assert!(ms > 28_000 && ms <= 30_000, "unexpected hint: {ms}");
    }

    #[rstest]
    fn test_request_id_attached() {
        let err = BitmexError::from_http_response(
            StatusCode::BAD_REQUEST,
            "bad",
            &headers(&[("x-request-id", "req-123")]),
        );
        assert!(err.to_string().contains("req-123"));
    }

    #[rstest]
    #[case("Signature not valid.", BitmexAuthReason::BadCredentials)]
    #[case("Invalid API KEY", BitmexAuthReason::BadCredentials)]
    #[case("Missing permission for this action", BitmexAuthReason::BadCredentials)]
    #[case("Authorization required", BitmexAuthReason::BadCredentials)]
    #[case("Forbidden", BitmexAuthReason::BadCredentials)]
    #[case("Timestamp is out of bounds", BitmexAuthReason::ClockSkew)]
    #[case("Request has expired", BitmexAuthReason::ClockSkew)]
    #[case("clock drift too large", BitmexAuthReason::ClockSkew)]
    #[case("Already authenticated", BitmexAuthReason::AlreadyAuthed)]
    #[case("connection dropped", BitmexAuthReason::Network)]
    fn test_classify_auth_reason(#[case] reason: &str, #[case] expected: BitmexAuthReason) {
        assert_eq!(classify_auth_reason(reason), expected);
    }
}
