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

//! Data models for BitMEX REST responses.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use ustr::Ustr;

use crate::common::enums::{
    BitmexInstrumentState, BitmexOrderStatus, BitmexOrderType, BitmexSide, BitmexTimeInForce,
};

/// An order row as returned by the `/order` endpoints.
///
/// Acks from POST/PUT carry the full row; GET responses are identical in
/// shape. The wire shape matches the WebSocket order table rows.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexHttpOrder {
    #[serde(rename = "orderID")]
    pub order_id: Ustr,
    #[serde(rename = "clOrdID")]
    pub cl_ord_id: Option<Ustr>,
    pub account: Option<i64>,
    pub symbol: Option<Ustr>,
    pub side: Option<BitmexSide>,
    pub order_qty: Option<f64>,
    pub price: Option<f64>,
    pub stop_px: Option<f64>,
    pub ord_type: Option<BitmexOrderType>,
    pub time_in_force: Option<BitmexTimeInForce>,
    pub exec_inst: Option<Ustr>,
    pub ord_status: Option<BitmexOrderStatus>,
    pub exec_type: Option<Ustr>,
    pub leaves_qty: Option<f64>,
    pub cum_qty: Option<f64>,
    pub avg_px: Option<f64>,
    pub ord_rej_reason: Option<Ustr>,
    pub text: Option<Ustr>,
    pub transact_time: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// An instrument row as returned by the `/instrument` endpoints.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitmexHttpInstrument {
    pub symbol: Ustr,
    pub state: Option<BitmexInstrumentState>,
    pub typ: Option<Ustr>,
    pub underlying: Option<Ustr>,
    pub quote_currency: Option<Ustr>,
    pub lot_size: Option<f64>,
    pub tick_size: Option<f64>,
    pub multiplier: Option<f64>,
    pub mark_price: Option<f64>,
    pub indicative_settle_price: Option<f64>,
    pub last_price: Option<f64>,
    pub last_change_pcnt: Option<f64>,
    pub funding_rate: Option<f64>,
    pub funding_timestamp: Option<DateTime<Utc>>,
    pub funding_interval: Option<DateTime<Utc>>,
    pub expiry: Option<DateTime<Utc>>,
    pub volume24h: Option<f64>,
    pub turnover24h: Option<f64>,
    pub open_interest: Option<f64>,
    pub limit_up_price: Option<f64>,
    pub limit_down_price: Option<f64>,
    pub max_price: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_order_ack_parsing() {
        let json = r#"{
            "orderID": "ord-1",
            "clOrdID": "client-1",
            "account": 100001,
            "symbol": "XBTUSD",
            "side": "Buy",
            "orderQty": 100,
            "ordType": "Market",
            "ordStatus": "New",
            "execType": "New",
            "leavesQty": 100,
            "cumQty": 0,
            "timestamp": "2024-01-05T00:01:20.000Z"
        }"#;

        let order: BitmexHttpOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.order_id, Ustr::from("ord-1"));
        assert_eq!(order.cl_ord_id, Some(Ustr::from("client-1")));
        assert_eq!(order.ord_status, Some(BitmexOrderStatus::New));
        assert_eq!(order.leaves_qty, Some(100.0));
        assert_eq!(order.cum_qty, Some(0.0));
        assert!(order.price.is_none());
    }

    #[rstest]
    fn test_instrument_parsing() {
        let json = r#"{
            "symbol": "XBTUSD",
            "state": "open",
            "typ": "FFWCSX",
            "underlying": "XBT",
            "quoteCurrency": "USD",
            "lotSize": 100,
            "tickSize": 0.5,
            "multiplier": -100000000,
            "markPrice": 60123.45,
            "lastPrice": 60120,
            "fundingRate": 0.0001,
            "volume24h": 125000000,
            "openInterest": 540000000,
            "limitUpPrice": 66000,
            "limitDownPrice": 54000,
            "timestamp": "2024-01-05T00:01:20.000Z"
        }"#;

        let instrument: BitmexHttpInstrument = serde_json::from_str(json).unwrap();
        assert_eq!(instrument.symbol, Ustr::from("XBTUSD"));
        assert_eq!(instrument.state, Some(BitmexInstrumentState::Open));
        assert_eq!(instrument.tick_size, Some(0.5));
        assert_eq!(instrument.limit_up_price, Some(66_000.0));
    }
}
