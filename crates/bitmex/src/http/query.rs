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

//! Request parameter types for the BitMEX `/order` and `/instrument` endpoints.
//!
//! Bodies for POST/PUT/DELETE are JSON; GET parameters serialize to a query
//! string. Optional fields are omitted entirely when unset.

use derive_builder::Builder;
use serde::Serialize;
use ustr::Ustr;

use super::error::BitmexBuildError;
use crate::common::enums::{BitmexOrderType, BitmexSide, BitmexTimeInForce};

/// Body for `POST /order`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostOrderParams {
    /// Instrument symbol.
    pub symbol: Ustr,
    /// Order side.
    pub side: BitmexSide,
    /// Order quantity in contracts.
    pub order_qty: f64,
    /// Order type.
    pub ord_type: BitmexOrderType,
    /// Client order id; the idempotency key for placement.
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Ustr,
    /// Limit price; required for Limit and StopLimit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Trigger price; required for Stop and StopLimit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_px: Option<f64>,
    /// Comma-joined execution instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_inst: Option<String>,
    /// Time in force.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<BitmexTimeInForce>,
    /// Free-form order annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body for `PUT /order` (amend).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutOrderParams {
    /// Server-assigned order id.
    #[serde(rename = "orderID", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Ustr>,
    /// Client order id of the order being amended.
    #[serde(rename = "origClOrdID", skip_serializing_if = "Option::is_none")]
    pub orig_cl_ord_id: Option<Ustr>,
    /// New quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_qty: Option<f64>,
    /// New limit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// New trigger price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_px: Option<f64>,
    /// Free-form annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl PutOrderParams {
    /// Validates that exactly one order identifier is present.
    ///
    /// # Errors
    ///
    /// Returns a build error when neither or both identifiers are set.
    pub fn validate(&self) -> Result<(), BitmexBuildError> {
        match (&self.order_id, &self.orig_cl_ord_id) {
            (None, None) => Err(BitmexBuildError::MissingOrderId),
            (Some(_), Some(_)) => Err(BitmexBuildError::BothOrderIds),
            _ => Ok(()),
        }
    }
}

/// Query for `DELETE /order` (cancel).
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOrderParams {
    /// Server-assigned order id(s), comma-joined.
    #[serde(rename = "orderID", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Ustr>,
    /// Client order id(s), comma-joined.
    #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<Ustr>,
    /// Free-form cancellation annotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl DeleteOrderParams {
    /// Validates that at least one order identifier is present.
    ///
    /// # Errors
    ///
    /// Returns a build error when neither identifier is set.
    pub fn validate(&self) -> Result<(), BitmexBuildError> {
        if self.order_id.is_none() && self.cl_ord_id.is_none() {
            return Err(BitmexBuildError::MissingOrderId);
        }
        Ok(())
    }
}

/// Query for `GET /order`.
#[derive(Clone, Debug, Default, Serialize, Builder)]
#[builder(default)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderParams {
    /// Filter by client order id.
    #[serde(rename = "clOrdID", skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<Ustr>,
    /// Filter by symbol.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Ustr>,
    /// JSON filter, e.g. `{"open": true}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    /// Maximum rows to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Return newest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
}

impl GetOrderParams {
    /// Validates the row count bound.
    ///
    /// # Errors
    ///
    /// Returns a build error when `count` is out of range.
    pub fn validate(&self) -> Result<(), BitmexBuildError> {
        if let Some(count) = self.count
            && !(1..=500).contains(&count)
        {
            return Err(BitmexBuildError::InvalidCount);
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
