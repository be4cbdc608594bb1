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

//! Place-input validation and client order id generation.
//!
//! Normalization is a fixed point: feeding a normalized input back through
//! validation yields the same result.

use std::sync::atomic::{AtomicU64, Ordering};

use ustr::Ustr;

use crate::{
    common::enums::{BitmexOrderType, BitmexSide, BitmexTimeInForce},
    error::BitmexError,
};

/// Default client order id prefix when the caller seed is unusable.
const DEFAULT_ID_PREFIX: &str = "hub";

/// Optional parameters of a place request.
#[derive(Clone, Debug, Default)]
pub struct PlaceOptions {
    /// Limit price for a stop-limit order; upgrades a `Stop` to `StopLimit`.
    pub stop_limit_price: Option<f64>,
    /// Post-only (maker-only); valid for `Limit` orders.
    pub post_only: bool,
    /// Never increase a position.
    pub reduce_only: bool,
    /// Time in force, short (`GTC`) or long (`GoodTillCancel`) form.
    pub time_in_force: Option<String>,
    /// Caller-supplied idempotency key.
    pub cl_ord_id: Option<String>,
    /// Seed for generated client order ids.
    pub cl_ord_id_seed: Option<String>,
    /// Free-form order annotation.
    pub text: Option<String>,
}

/// A raw place request as submitted by the caller.
#[derive(Clone, Debug)]
pub struct PlaceRequest {
    pub symbol: String,
    pub side: BitmexSide,
    pub size: f64,
    /// `Limit`: the limit price. `Stop`/`StopLimit`: the trigger price.
    pub price: Option<f64>,
    pub order_type: BitmexOrderType,
    pub opts: PlaceOptions,
    /// Best ask, for the buy-stop cross-check when known.
    pub best_ask: Option<f64>,
    /// Best bid, for the sell-stop cross-check when known.
    pub best_bid: Option<f64>,
}

/// A validated, normalized place input.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedPlaceInput {
    pub symbol: Ustr,
    pub side: BitmexSide,
    pub size: f64,
    pub order_type: BitmexOrderType,
    /// Limit price (`Limit`, `StopLimit`).
    pub price: Option<f64>,
    /// Trigger price (`Stop`, `StopLimit`).
    pub stop_price: Option<f64>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub time_in_force: Option<BitmexTimeInForce>,
    pub cl_ord_id: Ustr,
    pub text: Option<String>,
}

impl NormalizedPlaceInput {
    /// Rebuilds the raw request shape; `validate_place_input` over the result
    /// reproduces this normalized input unchanged.
    #[must_use]
    pub fn to_request(&self) -> PlaceRequest {
        let (price, stop_limit_price) = match self.order_type {
            BitmexOrderType::StopLimit => (self.stop_price, self.price),
            BitmexOrderType::Stop => (self.stop_price, None),
            _ => (self.price, None),
        };
        PlaceRequest {
            symbol: self.symbol.to_string(),
            side: self.side,
            size: self.size,
            price,
            order_type: self.order_type,
            opts: PlaceOptions {
                stop_limit_price,
                post_only: self.post_only,
                reduce_only: self.reduce_only,
                time_in_force: self.time_in_force.map(|tif| tif.to_string()),
                cl_ord_id: Some(self.cl_ord_id.to_string()),
                cl_ord_id_seed: None,
                text: self.text.clone(),
            },
            best_ask: None,
            best_bid: None,
        }
    }
}

fn finite_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Validates and normalizes a place request.
///
/// # Errors
///
/// Returns a validation error naming the offending field.
pub fn validate_place_input(request: &PlaceRequest) -> Result<NormalizedPlaceInput, BitmexError> {
    let symbol = request.symbol.trim();
    if symbol.is_empty() {
        return Err(BitmexError::validation("symbol must be a non-empty string"));
    }
    if !finite_positive(request.size) {
        return Err(BitmexError::validation(format!(
            "size must be a finite positive number, got {}",
            request.size
        )));
    }

    // A stop with a stop-limit price is really a stop-limit
    let order_type = match (request.order_type, request.opts.stop_limit_price) {
        (BitmexOrderType::Stop, Some(_)) => BitmexOrderType::StopLimit,
        (other, _) => other,
    };

    let (price, stop_price) = match order_type {
        BitmexOrderType::Market => {
            if request.price.is_some() {
                return Err(BitmexError::validation("market orders take no price"));
            }
            if request.opts.stop_limit_price.is_some() {
                return Err(BitmexError::validation(
                    "market orders take no stopLimitPrice",
                ));
            }
            (None, None)
        }
        BitmexOrderType::Limit => {
            let price = request
                .price
                .ok_or_else(|| BitmexError::validation("limit orders require a price"))?;
            if !finite_positive(price) {
                return Err(BitmexError::validation(format!(
                    "limit price must be finite and positive, got {price}"
                )));
            }
            if request.opts.stop_limit_price.is_some() {
                return Err(BitmexError::validation(
                    "limit orders take no stopLimitPrice",
                ));
            }
            (Some(price), None)
        }
        BitmexOrderType::Stop => {
            let stop = request
                .price
                .ok_or_else(|| BitmexError::validation("stop orders require a stop price"))?;
            if !finite_positive(stop) {
                return Err(BitmexError::validation(format!(
                    "stop price must be finite and positive, got {stop}"
                )));
            }
            (None, Some(stop))
        }
        BitmexOrderType::StopLimit => {
            let stop = request.price.ok_or_else(|| {
                BitmexError::validation("stop-limit orders require a stop price")
            })?;
            let limit = request.opts.stop_limit_price.ok_or_else(|| {
                BitmexError::validation("stop-limit orders require a stopLimitPrice")
            })?;
            if !finite_positive(stop) || !finite_positive(limit) {
                return Err(BitmexError::validation(
                    "stop-limit prices must be finite and positive",
                ));
            }
            (Some(limit), Some(stop))
        }
        other => {
            return Err(BitmexError::validation(format!(
                "unsupported order type: {other}"
            )));
        }
    };

    // Top-of-book cross-check: a stop must be on the far side of the spread
    if let Some(stop) = stop_price {
        match request.side {
            BitmexSide::Buy => {
                if let Some(ask) = request.best_ask
                    && stop < ask
                {
                    return Err(BitmexError::validation(format!(
                        "buy stop {stop} below best ask {ask}"
                    )));
                }
            }
            BitmexSide::Sell => {
                if let Some(bid) = request.best_bid
                    && stop > bid
                {
                    return Err(BitmexError::validation(format!(
                        "sell stop {stop} above best bid {bid}"
                    )));
                }
            }
        }
    }

    if request.opts.post_only && order_type != BitmexOrderType::Limit {
        return Err(BitmexError::validation(
            "postOnly is only valid for limit orders",
        ));
    }

    let time_in_force = match &request.opts.time_in_force {
        None => None,
        Some(raw) => Some(BitmexTimeInForce::from_short_form(raw).ok_or_else(|| {
            BitmexError::validation(format!("unknown timeInForce: {raw}"))
        })?),
    };

    let cl_ord_id = match &request.opts.cl_ord_id {
        Some(given) => {
            let trimmed = given.trim();
            if trimmed.is_empty() {
                return Err(BitmexError::validation("clOrdID must not be blank"));
            }
            Ustr::from(trimmed)
        }
        None => Ustr::from(&generate_cl_ord_id(request.opts.cl_ord_id_seed.as_deref())),
    };

    Ok(NormalizedPlaceInput {
        symbol: Ustr::from(symbol),
        side: request.side,
        size: request.size,
        order_type,
        price,
        stop_price,
        post_only: request.opts.post_only,
        reduce_only: request.opts.reduce_only,
        time_in_force,
        cl_ord_id,
        text: request.opts.text.clone(),
    })
}

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generates a client order id: `<prefix>-<base36 millis>-<base36 counter><2 random bytes hex>`.
///
/// The prefix is the seed sanitized to `[a-z0-9]+`, or a default.
#[must_use]
pub fn generate_cl_ord_id(seed: Option<&str>) -> String {
    let prefix: String = seed
        .unwrap_or_default()
        .chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            c.is_ascii_alphanumeric().then_some(c)
        })
        .collect();
    let prefix = if prefix.is_empty() {
        DEFAULT_ID_PREFIX.to_string()
    } else {
        prefix
    };

    let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) % 36_u64.pow(4);
    let entropy: [u8; 2] = rand::random();

    format!(
        "{prefix}-{}-{}{}",
        to_base36(now_ms),
        to_base36_padded(counter, 4),
        hex::encode(entropy),
    )
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ASCII")
}

fn to_base36_padded(value: u64, width: usize) -> String {
    let raw = to_base36(value);
    format!("{raw:0>width$}")
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
