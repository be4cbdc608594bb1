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

//! HTTP client for the [BitMEX](https://bitmex.com) REST API.
//!
//! Handles request signing (when credentials are provided), per-request
//! timeouts, a single retry for transient failures, and classification of
//! non-2xx responses into the shared error taxonomy.

use reqwest::Method;
use serde::de::DeserializeOwned;

use super::{
    error::{BitmexErrorResponse, BitmexHttpError},
    models::{BitmexHttpInstrument, BitmexHttpOrder},
    query::{DeleteOrderParams, GetOrderParams, PostOrderParams, PutOrderParams},
};
use crate::{
    common::{consts::BITMEX_API_PREFIX, credential::Credential},
    config::BitmexClientConfig,
    error::BitmexError,
};

/// Provides an HTTP client for the [BitMEX](https://bitmex.com) REST API.
#[derive(Clone, Debug)]
pub struct BitmexHttpClient {
    base_url: String,
    client: reqwest::Client,
    credential: Option<Credential>,
    expires_skew_secs: i64,
}

impl BitmexHttpClient {
    /// Creates a new [`BitmexHttpClient`] instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built or if
    /// only one of `api_key`/`api_secret` is configured.
    pub fn new(config: &BitmexClientConfig) -> anyhow::Result<Self> {
        let credential = match (&config.api_key, &config.api_secret) {
            (Some(key), Some(secret)) => Some(Credential::new(key.clone(), secret.clone())),
            (None, None) => None,
            _ => anyhow::bail!("Both `api_key` and `api_secret` must be provided together"),
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.http_base_url(),
            client,
            credential,
            expires_skew_secs: config.auth_expires_skew_secs,
        })
    }

    /// Returns `true` if signing credentials are configured.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credential.is_some()
    }

    fn sign_headers(
        &self,
        method: &Method,
        endpoint: &str,
        body: &str,
    ) -> Result<Vec<(String, String)>, BitmexHttpError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(BitmexHttpError::MissingCredentials)?;

        let expires = chrono::Utc::now().timestamp() + self.expires_skew_secs;
        let signed_path = format!("{BITMEX_API_PREFIX}{endpoint}");
        let signature = credential.sign(method.as_str(), &signed_path, expires, body);

        Ok(vec![
            ("api-key".to_string(), credential.api_key.to_string()),
            ("api-expires".to_string(), expires.to_string()),
            ("api-signature".to_string(), signature),
        ])
    }

    async fn send_request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&str>,
        authenticate: bool,
    ) -> Result<T, BitmexHttpError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let body_str = body.unwrap_or_default();

        let mut request = self.client.request(method.clone(), &url);
        if authenticate {
            for (name, value) in self.sign_headers(&method, endpoint, body_str)? {
                request = request.header(name, value);
            }
        }
        if body.is_some() {
            request = request
                .header("content-type", "application/json")
                .body(body_str.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(Into::into);
        }

        let error_name = serde_json::from_str::<BitmexErrorResponse>(&text)
            .ok()
            .map(|resp| resp.error.name);
        Err(BitmexHttpError::Api {
            error: BitmexError::from_http_response(status, &text, &headers),
            error_name,
        })
    }

    /// Sends a request, retrying exactly once on transient failures
    /// (network errors, HTTP 5xx, HTTP 408).
    async fn send_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&str>,
        authenticate: bool,
    ) -> Result<T, BitmexHttpError> {
        match self
            .send_request(method.clone(), endpoint, body, authenticate)
            .await
        {
            Ok(value) => Ok(value),
            Err(e) if e.is_transient() => {
                tracing::warn!(%method, endpoint, error = %e, "Transient failure; retrying once");
                self.send_request(method, endpoint, body, authenticate).await
            }
            Err(e) => Err(e),
        }
    }

    /// Places a new order via `POST /order`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; transient failures are retried once.
    pub async fn place_order(
        &self,
        params: &PostOrderParams,
    ) -> Result<BitmexHttpOrder, BitmexHttpError> {
        let body = serde_json::to_string(params)?;
        self.send_with_retry(Method::POST, "/order", Some(&body), true)
            .await
    }

    /// Amends an existing order via `PUT /order`.
    ///
    /// # Errors
    ///
    /// Returns a build error when the identifier pair is invalid, otherwise
    /// the classified failure.
    pub async fn amend_order(
        &self,
        params: &PutOrderParams,
    ) -> Result<BitmexHttpOrder, BitmexHttpError> {
        params.validate()?;
        let body = serde_json::to_string(params)?;
        self.send_with_retry(Method::PUT, "/order", Some(&body), true)
            .await
    }

    /// Cancels orders via `DELETE /order`.
    ///
    /// # Errors
    ///
    /// Returns a build error when no identifier is given, otherwise the
    /// classified failure.
    pub async fn cancel_orders(
        &self,
        params: &DeleteOrderParams,
    ) -> Result<Vec<BitmexHttpOrder>, BitmexHttpError> {
        params.validate()?;
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| BitmexHttpError::JsonError(e.to_string()))?;
        let endpoint = format!("/order?{query}");
        self.send_with_retry(Method::DELETE, &endpoint, None, true)
            .await
    }

    /// Queries orders via `GET /order`.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; transient failures are retried once.
    pub async fn get_orders(
        &self,
        params: &GetOrderParams,
    ) -> Result<Vec<BitmexHttpOrder>, BitmexHttpError> {
        params.validate()?;
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| BitmexHttpError::JsonError(e.to_string()))?;
        let endpoint = if query.is_empty() {
            "/order".to_string()
        } else {
            format!("/order?{query}")
        };
        self.send_with_retry(Method::GET, &endpoint, None, true).await
    }

    /// Queries a single order by client order id, for reconciliation.
    ///
    /// This request is sent exactly once with no retry.
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn get_order_by_cl_ord_id(
        &self,
        cl_ord_id: &str,
    ) -> Result<Option<BitmexHttpOrder>, BitmexHttpError> {
        let query = serde_urlencoded::to_string([("clOrdID", cl_ord_id)])
            .map_err(|e| BitmexHttpError::JsonError(e.to_string()))?;
        let endpoint = format!("/order?{query}");
        let mut rows: Vec<BitmexHttpOrder> = self
            .send_request(Method::GET, &endpoint, None, true)
            .await?;
        Ok(rows.pop())
    }

    /// Fetches instruments via `GET /instrument` for registry bootstrap.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; transient failures are retried once.
    pub async fn get_instruments(
        &self,
        active_only: bool,
    ) -> Result<Vec<BitmexHttpInstrument>, BitmexHttpError> {
        let endpoint = if active_only {
            "/instrument/active"
        } else {
            "/instrument"
        };
        self.send_with_retry(Method::GET, endpoint, None, false)
            .await
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn client_with_credentials() -> BitmexHttpClient {
        let config = BitmexClientConfig {
            api_key: Some("LAqUlngMIQkIUjXMUreyu3qn".to_string()),
            api_secret: Some("chNOOS4KvNXR_Xq4k4c9qsfoKWvnDecLATCRlcBwyKDYnWgO".to_string()),
            ..Default::default()
        };
        BitmexHttpClient::new(&config).unwrap()
    }

    #[rstest]
    fn test_sign_headers_shape() {
        let client = client_with_credentials();
        let headers = client
            .sign_headers(&Method::GET, "/order?clOrdID=client-1", "")
            .unwrap();

        let names: Vec<&str> = headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["api-key", "api-expires", "api-signature"]);

        let expires: i64 = headers[1].1.parse().unwrap();
        assert!(expires > chrono::Utc::now().timestamp());
        assert_eq!(headers[2].1.len(), 64);
    }

    #[rstest]
    fn test_sign_headers_require_credentials() {
        let client = BitmexHttpClient::new(&BitmexClientConfig::default()).unwrap();
        let err = client.sign_headers(&Method::GET, "/order", "").unwrap_err();
        assert!(matches!(err, BitmexHttpError::MissingCredentials));
    }

    #[rstest]
    fn test_new_requires_paired_credentials() {
        let config = BitmexClientConfig {
            api_secret: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(BitmexHttpClient::new(&config).is_err());
    }
}
