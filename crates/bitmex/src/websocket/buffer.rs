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

//! Outbound send buffer with private-channel gating and subscription tracking.
//!
//! Every outgoing frame passes through [`OutboundBuffer::prepare`], which
//! decides between immediate dispatch and buffering. Frames addressing private
//! channels are additionally gated on authentication, deduplicated by raw
//! payload while buffered, and their topics tracked so the private
//! subscription set can be replayed after a reconnect.

use std::collections::VecDeque;

use ahash::AHashSet;
use indexmap::IndexSet;
use serde_json::Value;
use ustr::Ustr;

use super::error::BitmexWsError;
use crate::common::consts::is_private_topic;

/// A frame awaiting dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingFrame {
    /// Raw JSON payload.
    pub raw: String,
    /// Whether dispatch is gated on authentication.
    pub requires_auth: bool,
}

/// Outcome of preparing a frame for dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The caller should write the frame to the socket now.
    Send(PendingFrame),
    /// The frame was enqueued until the socket opens and/or auth completes.
    Buffered,
    /// A byte-identical private frame is already queued; dropped silently.
    DroppedDuplicate,
}

/// Bounded outbound buffer with private subscription tracking.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    limit: usize,
    frames: VecDeque<PendingFrame>,
    queued_auth_payloads: AHashSet<String>,
    private_subscriptions: IndexSet<Ustr>,
}

impl OutboundBuffer {
    /// Creates a new [`OutboundBuffer`] instance with the given capacity.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            frames: VecDeque::new(),
            queued_auth_payloads: AHashSet::new(),
            private_subscriptions: IndexSet::new(),
        }
    }

    /// Number of buffered frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frames are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Currently tracked private subscription topics, in subscribe order.
    #[must_use]
    pub fn private_subscriptions(&self) -> Vec<Ustr> {
        self.private_subscriptions.iter().copied().collect()
    }

    /// Inspects a frame and either hands it back for immediate dispatch or
    /// buffers it.
    ///
    /// A frame is dispatched immediately only while the socket is open and,
    /// for frames addressing private channels, authentication has completed.
    ///
    /// # Errors
    ///
    /// Returns [`BitmexWsError::SendBufferFull`] when buffering would exceed
    /// the configured limit.
    pub fn prepare(
        &mut self,
        raw: String,
        socket_open: bool,
        authed: bool,
    ) -> Result<Dispatch, BitmexWsError> {
        let requires_auth = self.inspect(&raw);

        if socket_open && (!requires_auth || authed) {
            return Ok(Dispatch::Send(PendingFrame { raw, requires_auth }));
        }

        if requires_auth && self.queued_auth_payloads.contains(&raw) {
            tracing::debug!(payload = raw, "Dropping duplicate private frame");
            return Ok(Dispatch::DroppedDuplicate);
        }

        if self.frames.len() >= self.limit {
            return Err(BitmexWsError::SendBufferFull { limit: self.limit });
        }

        if requires_auth {
            self.queued_auth_payloads.insert(raw.clone());
        }
        self.frames.push_back(PendingFrame { raw, requires_auth });
        Ok(Dispatch::Buffered)
    }

    /// Pops the oldest buffered frame for a flush pass.
    pub fn pop_front(&mut self) -> Option<PendingFrame> {
        self.frames.pop_front()
    }

    /// Re-appends a frame still gated on authentication, preserving order
    /// relative to other deferred frames.
    pub fn requeue_back(&mut self, frame: PendingFrame) {
        self.frames.push_back(frame);
    }

    /// Puts a frame back at the head after a failed send.
    pub fn requeue_front(&mut self, frame: PendingFrame) {
        self.frames.push_front(frame);
    }

    /// Releases dedup bookkeeping once a frame left the buffer for good.
    pub fn mark_sent(&mut self, frame: &PendingFrame) {
        if frame.requires_auth {
            self.queued_auth_payloads.remove(&frame.raw);
        }
    }

    /// Updates the tracked private subscription set from a frame and returns
    /// whether the frame requires authentication.
    fn inspect(&mut self, raw: &str) -> bool {
        let Ok(value) = serde_json::from_str::<Value>(raw) else {
            return false;
        };
        let Some(op) = value.get("op").and_then(Value::as_str) else {
            return false;
        };
        if op != "subscribe" && op != "unsubscribe" {
            return false;
        }
        let Some(args) = value.get("args").and_then(Value::as_array) else {
            return false;
        };

        let mut requires_auth = false;
        for arg in args {
            let Some(topic) = arg.as_str() else { continue };
            if !is_private_topic(topic) {
                continue;
            }
            requires_auth = true;
            if op == "subscribe" {
                self.private_subscriptions.insert(Ustr::from(topic));
            } else {
                self.private_subscriptions.shift_remove(&Ustr::from(topic));
            }
        }
        requires_auth
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn subscribe(topics: &[&str]) -> String {
        serde_json::json!({"op": "subscribe", "args": topics}).to_string()
    }

    fn unsubscribe(topics: &[&str]) -> String {
        serde_json::json!({"op": "unsubscribe", "args": topics}).to_string()
    }

    #[rstest]
    fn test_public_frame_sends_when_open() {
        let mut buffer = OutboundBuffer::new(10);
        let raw = subscribe(&["orderBookL2:XBTUSD"]);

        let dispatch = buffer.prepare(raw.clone(), true, false).unwrap();
        assert_eq!(
            dispatch,
            Dispatch::Send(PendingFrame {
                raw,
                requires_auth: false
            })
        );
        assert!(buffer.is_empty());
    }

    #[rstest]
    fn test_public_frame_buffers_when_closed() {
        let mut buffer = OutboundBuffer::new(10);
        let dispatch = buffer
            .prepare(subscribe(&["trade:XBTUSD"]), false, false)
            .unwrap();
        assert_eq!(dispatch, Dispatch::Buffered);
        assert_eq!(buffer.len(), 1);
    }

    #[rstest]
    fn test_private_frame_gated_until_authed() {
        let mut buffer = OutboundBuffer::new(10);

        let dispatch = buffer.prepare(subscribe(&["position"]), true, false).unwrap();
        assert_eq!(dispatch, Dispatch::Buffered);

        let dispatch = buffer.prepare(subscribe(&["wallet"]), true, true).unwrap();
        assert!(matches!(dispatch, Dispatch::Send(f) if f.requires_auth));
    }

    #[rstest]
    fn test_duplicate_private_frame_dropped() {
        let mut buffer = OutboundBuffer::new(10);
        let raw = subscribe(&["order"]);

        assert_eq!(
            buffer.prepare(raw.clone(), false, false).unwrap(),
            Dispatch::Buffered
        );
        assert_eq!(
            buffer.prepare(raw, false, false).unwrap(),
            Dispatch::DroppedDuplicate
        );
        assert_eq!(buffer.len(), 1);
    }

    #[rstest]
    fn test_duplicate_public_frames_kept() {
        let mut buffer = OutboundBuffer::new(10);
        let raw = subscribe(&["trade:XBTUSD"]);

        buffer.prepare(raw.clone(), false, false).unwrap();
        buffer.prepare(raw, false, false).unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[rstest]
    fn test_overflow_fails() {
        let mut buffer = OutboundBuffer::new(2);
        buffer.prepare(subscribe(&["a:1"]), false, false).unwrap();
        buffer.prepare(subscribe(&["a:2"]), false, false).unwrap();

        let err = buffer.prepare(subscribe(&["a:3"]), false, false).unwrap_err();
        assert!(matches!(err, BitmexWsError::SendBufferFull { limit: 2 }));
    }

    #[rstest]
    fn test_private_subscription_tracking() {
        let mut buffer = OutboundBuffer::new(10);

        buffer
            .prepare(subscribe(&["position", "wallet", "trade:XBTUSD"]), true, true)
            .unwrap();
        assert_eq!(
            buffer.private_subscriptions(),
            vec![Ustr::from("position"), Ustr::from("wallet")]
        );

        buffer.prepare(unsubscribe(&["position"]), true, true).unwrap();
        assert_eq!(buffer.private_subscriptions(), vec![Ustr::from("wallet")]);
    }

    #[rstest]
    fn test_symbol_suffix_does_not_make_public_channel_private() {
        let mut buffer = OutboundBuffer::new(10);

        let dispatch = buffer
            .prepare(subscribe(&["orderBookL2:XBTUSD"]), true, false)
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Send(f) if !f.requires_auth));

        let dispatch = buffer
            .prepare(subscribe(&["execution:XBTUSD"]), true, false)
            .unwrap();
        assert_eq!(dispatch, Dispatch::Buffered);
    }

    #[rstest]
    fn test_dedup_released_after_send() {
        let mut buffer = OutboundBuffer::new(10);
        let raw = subscribe(&["margin"]);

        buffer.prepare(raw.clone(), false, false).unwrap();
        let frame = buffer.pop_front().unwrap();
        buffer.mark_sent(&frame);

        // Same payload may be buffered again once the original left the queue
        assert_eq!(
            buffer.prepare(raw, false, false).unwrap(),
            Dispatch::Buffered
        );
    }
}
