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

//! Authentication coordination for the BitMEX WebSocket client.
//!
//! [`AuthTracker`] keeps the in-flight auth attempt, classifies failures and
//! latches the re-login policy so the reconnect loop can proceed
//! deterministically.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use tokio::sync::Notify;

use super::enums::AuthSource;
use super::error::BitmexWsError;
use crate::error::BitmexAuthReason;

/// Authentication sub-state while the socket is open.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    /// No authentication has completed on this connection.
    Unauthed,
    /// An `authKeyExpires` request is in flight.
    Authing,
    /// The connection is authenticated.
    Authed,
}

impl AuthState {
    const fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Authed,
            1 => Self::Authing,
            _ => Self::Unauthed,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            Self::Unauthed => 0,
            Self::Authing => 1,
            Self::Authed => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AuthTracker {
    state: Arc<AtomicU8>,
    source: Arc<Mutex<Option<AuthSource>>>,
    should_relogin: Arc<AtomicBool>,
    notify: Arc<Notify>,
    last_failure: Arc<Mutex<Option<(BitmexAuthReason, String)>>>,
    retry_attempts: Arc<AtomicU32>,
    started_at: Arc<Mutex<Option<Instant>>>,
}

impl AuthTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(AuthState::Unauthed.as_u8())),
            source: Arc::new(Mutex::new(None)),
            should_relogin: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            last_failure: Arc::new(Mutex::new(None)),
            retry_attempts: Arc::new(AtomicU32::new(0)),
            started_at: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn state(&self) -> AuthState {
        AuthState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn is_authed(&self) -> bool {
        self.state() == AuthState::Authed
    }

    /// Starts an attempt; exactly one may be in flight.
    ///
    /// # Errors
    ///
    /// Returns [`BitmexWsError::AuthenticationInProgress`] if an attempt is
    /// already in flight.
    pub(crate) fn begin(&self, source: AuthSource) -> Result<(), BitmexWsError> {
        let previous = self.state.compare_exchange(
            AuthState::Unauthed.as_u8(),
            AuthState::Authing.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        match previous {
            Ok(_) => {}
            Err(current) if current == AuthState::Authing.as_u8() => {
                return Err(BitmexWsError::AuthenticationInProgress);
            }
            Err(_) => {
                // Re-login over an authed connection restarts the attempt
                self.state
                    .store(AuthState::Authing.as_u8(), Ordering::SeqCst);
            }
        }

        if let Ok(mut guard) = self.last_failure.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.source.lock() {
            *guard = Some(source);
        }
        if let Ok(mut guard) = self.started_at.lock() {
            *guard = Some(Instant::now());
        }
        Ok(())
    }

    pub(crate) fn source(&self) -> Option<AuthSource> {
        self.source.lock().ok().and_then(|guard| *guard)
    }

    /// Milliseconds since the attempt started, for latency metrics.
    pub(crate) fn elapsed_ms(&self) -> Option<f64> {
        self.started_at
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .map(|started| started.elapsed().as_secs_f64() * 1_000.0)
    }

    pub(crate) fn succeed(&self) {
        self.state.store(AuthState::Authed.as_u8(), Ordering::SeqCst);
        self.should_relogin.store(true, Ordering::SeqCst);
        self.retry_attempts.store(0, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Records a classified failure.
    ///
    /// Hard failures latch off automatic re-login until the caller supplies
    /// new credentials via a fresh `login`.
    pub(crate) fn fail(&self, reason: BitmexAuthReason, message: impl Into<String>) {
        if matches!(
            reason,
            BitmexAuthReason::BadCredentials | BitmexAuthReason::ClockSkew
        ) {
            self.should_relogin.store(false, Ordering::SeqCst);
        }
        if let Ok(mut guard) = self.last_failure.lock() {
            *guard = Some((reason, message.into()));
        }
        self.state
            .store(AuthState::Unauthed.as_u8(), Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Drops back to unauthed on socket loss; an in-flight attempt fails with
    /// a network reason.
    pub(crate) fn on_socket_loss(&self) {
        if self.state() == AuthState::Authing {
            self.fail(BitmexAuthReason::Network, "socket closed during attempt");
        } else {
            self.state
                .store(AuthState::Unauthed.as_u8(), Ordering::SeqCst);
        }
    }

    pub(crate) fn should_relogin(&self) -> bool {
        self.should_relogin.load(Ordering::SeqCst)
    }

    /// Next delay of the auth retry schedule; counted independently from the
    /// socket reconnect schedule.
    pub(crate) fn next_retry_delay(&self, base_ms: u64, max_ms: u64) -> Duration {
        let attempt = self.retry_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = base_ms
            .saturating_mul(1_u64 << attempt.min(16))
            .min(max_ms);
        Duration::from_millis(delay)
    }

    /// Awaits completion of the in-flight attempt.
    ///
    /// # Errors
    ///
    /// Returns the classified failure, or a timeout error when `timeout`
    /// elapses first.
    pub(crate) async fn wait_for_result(&self, timeout: Duration) -> Result<(), BitmexWsError> {
        let wait_future = async {
            loop {
                // Register the waiter before reading state so a completion
                // between the two cannot be missed
                let notified = self.notify.notified();
                match self.state() {
                    AuthState::Authed => return Ok(()),
                    AuthState::Authing => {
                        notified.await;
                    }
                    AuthState::Unauthed => {
                        let (reason, message) = self
                            .last_failure
                            .lock()
                            .ok()
                            .and_then(|guard| guard.clone())
                            .unwrap_or((
                                BitmexAuthReason::Network,
                                "Authentication failed".to_string(),
                            ));
                        return Err(BitmexWsError::AuthenticationError { reason, message });
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait_future).await {
            Ok(result) => result,
            Err(_) => {
                self.fail(BitmexAuthReason::Timeout, "Authentication timed out");
                Err(BitmexWsError::AuthenticationError {
                    reason: BitmexAuthReason::Timeout,
                    message: "Authentication timed out".to_string(),
                })
            }
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
    fn test_single_attempt_in_flight() {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Manual).unwrap();

        let err = tracker.begin(AuthSource::Manual).unwrap_err();
        assert!(matches!(err, BitmexWsError::AuthenticationInProgress));
    }

    #[rstest]
    fn test_success_enables_relogin_and_resets_retries() {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Manual).unwrap();
        // Burn a retry slot so the reset is observable
        let _ = tracker.next_retry_delay(1_000, 10_000);

        tracker.succeed();

        assert!(tracker.is_authed());
        assert!(tracker.should_relogin());
        assert_eq!(
            tracker.next_retry_delay(1_000, 10_000),
            Duration::from_millis(1_000)
        );
    }

    #[rstest]
    #[case(BitmexAuthReason::BadCredentials, false)]
    #[case(BitmexAuthReason::ClockSkew, false)]
    #[case(BitmexAuthReason::Timeout, true)]
    #[case(BitmexAuthReason::Network, true)]
    fn test_relogin_latch(#[case] reason: BitmexAuthReason, #[case] relogin: bool) {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Manual).unwrap();
        tracker.succeed();

        tracker.begin(AuthSource::Reconnect).unwrap();
        tracker.fail(reason, "server says no");

        assert_eq!(tracker.should_relogin(), relogin);
        assert_eq!(tracker.state(), AuthState::Unauthed);
    }

    #[rstest]
    fn test_socket_loss_fails_inflight_attempt() {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Reconnect).unwrap();

        tracker.on_socket_loss();

        assert_eq!(tracker.state(), AuthState::Unauthed);
        let failure = tracker.last_failure.lock().unwrap().clone().unwrap();
        assert_eq!(failure.0, BitmexAuthReason::Network);
    }

    #[rstest]
    fn test_socket_loss_drops_authed_state() {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Manual).unwrap();
        tracker.succeed();

        tracker.on_socket_loss();

        assert_eq!(tracker.state(), AuthState::Unauthed);
        assert!(tracker.should_relogin());
    }

    #[rstest]
    fn test_retry_schedule_doubles_and_caps() {
        let tracker = AuthTracker::new();
        assert_eq!(
            tracker.next_retry_delay(1_000, 10_000),
            Duration::from_millis(1_000)
        );
        assert_eq!(
            tracker.next_retry_delay(1_000, 10_000),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            tracker.next_retry_delay(1_000, 10_000),
            Duration::from_millis(4_000)
        );
        assert_eq!(
            tracker.next_retry_delay(1_000, 10_000),
            Duration::from_millis(8_000)
        );
        assert_eq!(
            tracker.next_retry_delay(1_000, 10_000),
            Duration::from_millis(10_000)
        );
    }

    #[tokio::test]
    async fn test_wait_for_result_times_out() {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Manual).unwrap();

        let err = tracker
            .wait_for_result(Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BitmexWsError::AuthenticationError {
                reason: BitmexAuthReason::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_wait_for_result_sees_success() {
        let tracker = AuthTracker::new();
        tracker.begin(AuthSource::Manual).unwrap();

        let waiter = tracker.clone();
        let handle =
            tokio::spawn(
                async move { waiter.wait_for_result(Duration::from_secs(1)).await },
            );
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.succeed();

        handle.await.unwrap().unwrap();
    }
}
