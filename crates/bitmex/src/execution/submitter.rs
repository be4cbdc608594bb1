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

//! Order placement with idempotency and reconciliation.
//!
//! At most one placement request is in flight per client order id; duplicate
//! submissions coalesce onto the same shared future. A placement timeout
//! triggers a reconcile query by client order id, which is idempotent with
//! respect to WebSocket-delivered updates (terminal protection plus execution
//! dedup make the merges commutative).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;
use ustr::Ustr;

use crate::{
    common::{
        enums::{BitmexExecInstruction, BitmexOrderStatus, BitmexOrderType, BitmexTimeInForce},
        metrics::{self, MetricsSink, NoopMetrics},
    },
    config::BitmexClientConfig,
    error::BitmexError,
    events::UpdateReason,
    execution::validate::NormalizedPlaceInput,
    http::{
        client::BitmexHttpClient,
        error::BitmexHttpError,
        query::{DeleteOrderParams, PostOrderParams, PutOrderParams},
    },
    state::{BitmexState, order::Order, order::OrderPatch},
};

/// Places, amends and cancels orders against the REST surface, merging
/// acknowledgements into the shared state.
#[derive(Clone)]
pub struct OrderSubmitter {
    http: BitmexHttpClient,
    state: Arc<Mutex<BitmexState>>,
    metrics: Arc<dyn MetricsSink>,
    order_timeout: Duration,
}

impl std::fmt::Debug for OrderSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(OrderSubmitter))
            .field("order_timeout", &self.order_timeout)
            .finish()
    }
}

impl OrderSubmitter {
    /// Creates a new [`OrderSubmitter`] instance.
    #[must_use]
    pub fn new(
        http: BitmexHttpClient,
        state: Arc<Mutex<BitmexState>>,
        config: &BitmexClientConfig,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            http,
            state,
            metrics: metrics.unwrap_or_else(|| Arc::new(NoopMetrics)),
            order_timeout: Duration::from_millis(config.order_timeout_ms),
        }
    }

    /// Submits a validated placement, coalescing duplicates by client order id.
    ///
    /// # Errors
    ///
    /// Returns the classified failure; a timeout is surfaced only after the
    /// reconcile query found no trace of the order.
    pub async fn submit(&self, input: NormalizedPlaceInput) -> Result<Order, BitmexError> {
        let cl_ord_id = input.cl_ord_id;

        // Coalesce onto an existing in-flight request
        let existing = {
            let state = self.state.lock().expect("state lock poisoned");
            state.orders.get_inflight(cl_ord_id.as_str())
        };
        if let Some(shared) = existing {
            tracing::debug!(%cl_ord_id, "Coalescing duplicate submission");
            return shared.await.map_err(|e| (*e).clone());
        }

        let this = self.clone();
        let task_input = input.clone();
        let shared = async move { this.place_once(task_input).await.map_err(Arc::new) }
            .boxed()
            .shared();

        {
            let mut state = self.state.lock().expect("state lock poisoned");
            state
                .orders
                .insert_inflight(cl_ord_id.as_str(), shared.clone());
        }

        let result = shared.await;

        {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.orders.remove_inflight(cl_ord_id.as_str());
        }

        result.map_err(|e| (*e).clone())
    }

    async fn place_once(&self, input: NormalizedPlaceInput) -> Result<Order, BitmexError> {
        let params = build_post_params(&input);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.order_timeout, self.http.place_order(&params)).await;

        match outcome {
            Ok(Ok(row)) => {
                self.metrics.observe_histogram(
                    metrics::CREATE_ORDER_LATENCY_MS,
                    started.elapsed().as_secs_f64() * 1_000.0,
                    &[],
                );
                let patch = OrderPatch::from(&row);
                self.merge(&patch, UpdateReason::RestAck).ok_or_else(|| {
                    BitmexError::Unknown {
                        message: "placement ack carried no order id".to_string(),
                    }
                })
            }
            Ok(Err(BitmexHttpError::Transport {
                message,
                timed_out: true,
            })) => {
                tracing::warn!(cl_ord_id = %input.cl_ord_id, "Placement timed out; reconciling");
                self.reconcile(input.cl_ord_id, BitmexError::Timeout { message })
                    .await
            }
            Ok(Err(e)) => {
                self.metrics
                    .increment_counter(metrics::CREATE_ORDER_ERRORS_TOTAL, 1, &[]);
                Err(e.into())
            }
            Err(_elapsed) => {
                tracing::warn!(cl_ord_id = %input.cl_ord_id, "Placement deadline elapsed; reconciling");
                self.reconcile(
                    input.cl_ord_id,
                    BitmexError::timeout(format!(
                        "no placement ack within {} ms",
                        self.order_timeout.as_millis()
                    )),
                )
                .await
            }
        }
    }

    /// Queries the order by client order id once; WS-delivered state counts
    /// as an observation.
    async fn reconcile(
        &self,
        cl_ord_id: Ustr,
        original: BitmexError,
    ) -> Result<Order, BitmexError> {
        let reconcile_timeout = (self.order_timeout / 2).max(Duration::from_secs(2));
        let outcome = tokio::time::timeout(
            reconcile_timeout,
            self.http.get_order_by_cl_ord_id(cl_ord_id.as_str()),
        )
        .await;

        match outcome {
            Ok(Ok(Some(row))) => {
                tracing::info!(%cl_ord_id, "Reconcile found the order");
                let patch = OrderPatch::from(&row);
                self.merge(&patch, UpdateReason::Reconcile).ok_or(original)
            }
            Ok(Ok(None)) => self.known_order(cl_ord_id).ok_or_else(|| {
                self.metrics
                    .increment_counter(metrics::CREATE_ORDER_ERRORS_TOTAL, 1, &[]);
                original
            }),
            Ok(Err(e)) => {
                tracing::warn!(%cl_ord_id, error = %e, "Reconcile query failed");
                self.known_order(cl_ord_id).ok_or_else(|| {
                    self.metrics
                        .increment_counter(metrics::CREATE_ORDER_ERRORS_TOTAL, 1, &[]);
                    original
                })
            }
            Err(_) => {
                tracing::warn!(%cl_ord_id, "Reconcile query timed out");
                self.known_order(cl_ord_id).ok_or_else(|| {
                    self.metrics
                        .increment_counter(metrics::CREATE_ORDER_ERRORS_TOTAL, 1, &[]);
                    original
                })
            }
        }
    }

    fn known_order(&self, cl_ord_id: Ustr) -> Option<Order> {
        let state = self.state.lock().expect("state lock poisoned");
        state.orders.get_by_cl_ord_id(cl_ord_id.as_str()).cloned()
    }

    fn merge(&self, patch: &OrderPatch, reason: UpdateReason) -> Option<Order> {
        let mut state = self.state.lock().expect("state lock poisoned");
        state.merge_order_patch(patch, reason)
    }

    /// Cancels orders by server id or client order id.
    ///
    /// The local order is optimistically marked canceling; the response rows
    /// merge through the normal path.
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn cancel(
        &self,
        order_id: Option<Ustr>,
        cl_ord_id: Option<Ustr>,
        text: Option<String>,
    ) -> Result<Vec<Order>, BitmexError> {
        // Optimistic local transition; terminal protection keeps this safe
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            let target = order_id.or_else(|| {
                cl_ord_id.and_then(|cl| {
                    state
                        .orders
                        .get_by_cl_ord_id(cl.as_str())
                        .map(|order| order.order_id)
                })
            });
            if let Some(order_id) = target {
                state.merge_order_patch(
                    &OrderPatch {
                        order_id,
                        ord_status: Some(BitmexOrderStatus::PendingCancel),
                        ..Default::default()
                    },
                    UpdateReason::Update,
                );
            }
        }

        let params = DeleteOrderParams {
            order_id,
            cl_ord_id,
            text,
        };
        let rows = self.http.cancel_orders(&params).await.map_err(BitmexError::from)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(order) = self.merge(&OrderPatch::from(row), UpdateReason::RestAck) {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Amends an order's price, stop price or quantity.
    ///
    /// # Errors
    ///
    /// Returns the classified failure.
    pub async fn amend(&self, params: &PutOrderParams) -> Result<Order, BitmexError> {
        let row = self.http.amend_order(params).await.map_err(BitmexError::from)?;
        self.merge(&OrderPatch::from(&row), UpdateReason::RestAck)
            .ok_or(BitmexError::Unknown {
                message: "amend ack carried no order id".to_string(),
            })
    }
}

/// Maps a normalized place input onto the venue's POST body.
#[must_use]
pub fn build_post_params(input: &NormalizedPlaceInput) -> PostOrderParams {
    let mut exec_inst = Vec::new();
    if input.post_only {
        exec_inst.push(BitmexExecInstruction::ParticipateDoNotInitiate.to_string());
    }
    if input.reduce_only {
        exec_inst.push(BitmexExecInstruction::ReduceOnly.to_string());
    }

    // Resting order types default to good-till-cancel
    let time_in_force = input.time_in_force.or(match input.order_type {
        BitmexOrderType::Limit | BitmexOrderType::StopLimit => {
            Some(BitmexTimeInForce::GoodTillCancel)
        }
        _ => None,
    });

    PostOrderParams {
        symbol: input.symbol,
        side: input.side,
        order_qty: input.size,
        ord_type: input.order_type,
        cl_ord_id: input.cl_ord_id,
        price: input.price,
        stop_px: input.stop_price,
        exec_inst: if exec_inst.is_empty() {
            None
        } else {
            Some(exec_inst.join(","))
        },
        time_in_force,
        text: input.text.clone(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::common::enums::BitmexSide;

    fn input(order_type: BitmexOrderType) -> NormalizedPlaceInput {
        NormalizedPlaceInput {
            symbol: Ustr::from("XBTUSD"),
            side: BitmexSide::Buy,
            size: 100.0,
            order_type,
            price: None,
            stop_price: None,
            post_only: false,
            reduce_only: false,
            time_in_force: None,
            cl_ord_id: Ustr::from("client-1"),
            text: None,
        }
    }

    #[rstest]
    fn test_market_body_minimal() {
        let params = build_post_params(&input(BitmexOrderType::Market));
        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "symbol": "XBTUSD",
                "side": "Buy",
                "orderQty": 100.0,
                "ordType": "Market",
                "clOrdID": "client-1"
            })
        );
    }

    #[rstest]
    fn test_post_only_reduce_only_exec_inst() {
        let mut place = input(BitmexOrderType::Limit);
        place.price = Some(60_500.0);
        place.post_only = true;
        place.reduce_only = true;

        let params = build_post_params(&place);
        assert_eq!(
            params.exec_inst.as_deref(),
            Some("ParticipateDoNotInitiate,ReduceOnly")
        );
        assert_eq!(params.time_in_force, Some(BitmexTimeInForce::GoodTillCancel));
        assert_eq!(params.price, Some(60_500.0));
    }

    #[rstest]
    fn test_stop_limit_body_carries_both_prices() {
        let mut place = input(BitmexOrderType::StopLimit);
        place.price = Some(61_100.0);
        place.stop_price = Some(61_000.0);

        let params = build_post_params(&place);
        assert_eq!(params.price, Some(61_100.0));
        assert_eq!(params.stop_px, Some(61_000.0));
    }

    #[rstest]
    fn test_explicit_tif_not_overridden() {
        let mut place = input(BitmexOrderType::Limit);
        place.price = Some(60_500.0);
        place.time_in_force = Some(BitmexTimeInForce::ImmediateOrCancel);

        let params = build_post_params(&place);
        assert_eq!(
            params.time_in_force,
            Some(BitmexTimeInForce::ImmediateOrCancel)
        );
    }

    #[rstest]
    fn test_market_has_no_tif_default() {
        let params = build_post_params(&input(BitmexOrderType::Market));
        assert!(params.time_in_force.is_none());
    }
}
