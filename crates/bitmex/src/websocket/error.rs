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

//! Error definitions for the BitMEX WebSocket client.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::error::{BitmexAuthReason, BitmexError};

/// A typed error enumeration for the BitMEX WebSocket client.
#[derive(Debug, Error)]
pub enum BitmexWsError {
    /// Client error.
    #[error("Client error: {0}")]
    ClientError(String),
    /// Failure during JSON serialization/deserialization.
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Authentication error with a classified reason.
    #[error("Authentication error ({reason}): {message}")]
    AuthenticationError {
        reason: BitmexAuthReason,
        message: String,
    },
    /// An authentication attempt was already in flight.
    #[error("Authentication already in progress")]
    AuthenticationInProgress,
    /// Subscription error.
    #[error("Subscription error: {0}")]
    SubscriptionError(String),
    /// The outbound send buffer is full.
    #[error("Send buffer full (limit {limit})")]
    SendBufferFull { limit: usize },
    /// The connection attempt was canceled by a manual disconnect.
    #[error("Connect canceled: {0}")]
    ConnectCanceled(String),
    /// Reconnection gave up after exhausting its attempts.
    #[error("Reconnect exhausted after {attempts} attempts: {message}")]
    ReconnectExhausted { attempts: u32, message: String },
    /// WebSocket transport error.
    #[error("Tungstenite error: {0}")]
    TungsteniteError(#[from] tungstenite::Error),
    /// Missing credentials for authenticated operation.
    #[error("Missing credentials: API authentication required for this operation")]
    MissingCredentials,
}

impl From<serde_json::Error> for BitmexWsError {
    fn from(error: serde_json::Error) -> Self {
        Self::JsonError(error.to_string())
    }
}

impl From<BitmexWsError> for BitmexError {
    fn from(error: BitmexWsError) -> Self {
        match error {
            BitmexWsError::AuthenticationError { reason, message } => {
                Self::Auth { reason, message }
            }
            BitmexWsError::AuthenticationInProgress => Self::Validation {
                message: error.to_string(),
            },
            BitmexWsError::SendBufferFull { .. } => Self::Validation {
                message: error.to_string(),
            },
            BitmexWsError::TungsteniteError(e) => Self::Network {
                message: e.to_string(),
            },
            BitmexWsError::ClientError(message)
            | BitmexWsError::ConnectCanceled(message) => Self::Network { message },
            BitmexWsError::ReconnectExhausted { .. } => Self::Network {
                message: error.to_string(),
            },
            other => Self::Unknown {
                message: other.to_string(),
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_display() {
        let error = BitmexWsError::SendBufferFull { limit: 1000 };
        assert_eq!(error.to_string(), "Send buffer full (limit 1000)");

        let error = BitmexWsError::AuthenticationError {
            reason: BitmexAuthReason::ClockSkew,
            message: "Timestamp out of bounds".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication error (ClockSkew): Timestamp out of bounds"
        );
    }

    #[rstest]
    fn test_buffer_full_maps_to_validation() {
        let err: BitmexError = BitmexWsError::SendBufferFull { limit: 10 }.into();
        assert!(matches!(err, BitmexError::Validation { .. }));
        assert!(!err.is_retryable());
    }

    #[rstest]
    fn test_auth_error_preserves_reason() {
        let err: BitmexError = BitmexWsError::AuthenticationError {
            reason: BitmexAuthReason::Timeout,
            message: "no response".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            BitmexError::Auth {
                reason: BitmexAuthReason::Timeout,
                ..
            }
        ));
    }
}
