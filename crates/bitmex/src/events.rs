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

//! Typed per-entity publishers.
//!
//! Every entity mutation emits an [`UpdateEvent`] carrying the post-mutation
//! snapshot, the previous snapshot, the shallowly-compared changed field names
//! and the reason for the mutation. Emissions occur in causal order with
//! respect to the mutations that produced them (single-writer registries).

use strum::Display;

/// Why an entity changed.
#[derive(Copy, Clone, Debug, Display, PartialEq, Eq)]
pub enum UpdateReason {
    /// A `partial` snapshot reset or confirmed the entity.
    Snapshot,
    /// An `insert` row created the entity.
    Insert,
    /// An `update` row mutated the entity.
    Update,
    /// A `delete` row removed the entity.
    Delete,
    /// The entity was pruned or re-applied while resyncing a snapshot.
    Resync,
    /// A REST acknowledgement merged into the entity.
    RestAck,
    /// A reconcile query merged into the entity.
    Reconcile,
}

/// A single entity mutation.
#[derive(Clone, Debug)]
pub struct UpdateEvent<T> {
    /// Entity state before the mutation; `None` on creation.
    pub prev: Option<T>,
    /// Entity state after the mutation.
    pub snapshot: T,
    /// Field names whose values differ between `prev` and `snapshot`.
    pub changed: Vec<&'static str>,
    /// What produced the mutation.
    pub reason: UpdateReason,
}

type Subscriber<T> = Box<dyn Fn(&UpdateEvent<T>) + Send + Sync>;

/// Fan-out of [`UpdateEvent`]s to registered subscribers.
pub struct Publisher<T> {
    subscribers: Vec<Subscriber<T>>,
}

impl<T> std::fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<T> Publisher<T> {
    /// Creates a new [`Publisher`] instance with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber callback.
    pub fn subscribe(&mut self, subscriber: impl Fn(&UpdateEvent<T>) + Send + Sync + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Delivers an event to every subscriber, in registration order.
    pub fn emit(&self, event: &UpdateEvent<T>) {
        for subscriber in &self.subscribers {
            subscriber(event);
        }
    }

    /// Builds and delivers an event in one call.
    pub fn publish(
        &self,
        prev: Option<T>,
        snapshot: T,
        changed: Vec<&'static str>,
        reason: UpdateReason,
    ) {
        self.emit(&UpdateEvent {
            prev,
            snapshot,
            changed,
            reason,
        });
    }
}

/// Collects the names of fields whose values differ between two snapshots.
macro_rules! diff_fields {
    ($prev:expr, $next:expr, [$($field:ident),+ $(,)?]) => {{
        let mut changed: Vec<&'static str> = Vec::new();
        $(
            if $prev.$field != $next.$field {
                changed.push(stringify!($field));
            }
        )+
        changed
    }};
}
pub(crate) use diff_fields;

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
