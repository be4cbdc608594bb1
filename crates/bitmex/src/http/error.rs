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

//! Error structures and enumerations for the BitMEX HTTP client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{BitmexAuthReason, BitmexError};

/// Build error for request parameter validation.
#[derive(Debug, Clone, Error)]
pub enum BitmexBuildError {
    /// Missing required symbol.
    #[error("Missing required symbol")]
    MissingSymbol,
    /// Both orderID and clOrdID specified.
    #[error("Cannot specify both 'orderID' and 'clOrdID'")]
    BothOrderIds,
    /// Missing required order identifier.
    #[error("Missing required order identifier (orderID or clOrdID)")]
    MissingOrderId,
    /// Invalid count value.
    #[error("Invalid count: must be between 1 and 500")]
    InvalidCount,
}

/// Represents the JSON structure of an error response returned by the BitMEX API.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BitmexErrorResponse {
    /// The top-level error object included in the BitMEX error response.
    pub error: BitmexErrorMessage,
}

/// Contains the specific error details provided by the BitMEX API.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BitmexErrorMessage {
    /// A human-readable explanation of the error condition.
    pub message: String,
    /// A short identifier or category for the error, as returned by BitMEX.
    pub name: String,
}

/// A typed error enumeration for the BitMEX HTTP client.
#[derive(Debug, Clone, Error)]
pub enum BitmexHttpError {
    /// Error variant when credentials are missing but the request is authenticated.
    #[error("Missing credentials for authenticated request")]
    MissingCredentials,
    /// Build error for request parameters.
    #[error("Build error: {0}")]
    BuildError(#[from] BitmexBuildError),
    /// Failure during JSON serialization/deserialization.
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Transport-level failure before a response was received.
    #[error("Transport error (timed out: {timed_out}): {message}")]
    Transport { message: String, timed_out: bool },
    /// A non-2xx response classified into the shared taxonomy.
    #[error("{error}")]
    Api {
        /// Classified error carrying the body snippet and request id.
        error: BitmexError,
        /// The venue's error name, when the body carried one.
        error_name: Option<String>,
    },
}

impl BitmexHttpError {
    /// Returns `true` for failures the placement path retries once:
    /// network errors, HTTP 5xx and HTTP 408.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Api { error, .. } => matches!(
                error,
                BitmexError::ExchangeDown { .. } | BitmexError::Timeout { .. }
            ),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for BitmexHttpError {
    fn from(error: serde_json::Error) -> Self {
        Self::JsonError(error.to_string())
    }
}

impl From<reqwest::Error> for BitmexHttpError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport {
            message: error.to_string(),
            timed_out: error.is_timeout(),
        }
    }
}

impl From<BitmexHttpError> for BitmexError {
    fn from(error: BitmexHttpError) -> Self {
        match error {
            BitmexHttpError::MissingCredentials => Self::Auth {
                reason: BitmexAuthReason::BadCredentials,
                message: "Missing credentials for authenticated request".to_string(),
            },
            BitmexHttpError::BuildError(e) => Self::Validation {
                message: e.to_string(),
            },
            BitmexHttpError::JsonError(message) => Self::Unknown { message },
            BitmexHttpError::Transport { message, timed_out } => {
                if timed_out {
                    Self::Timeout { message }
                } else {
                    Self::Network { message }
                }
            }
            BitmexHttpError::Api { error, .. } => error,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
