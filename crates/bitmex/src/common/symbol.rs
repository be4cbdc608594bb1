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

//! Symbol alias mapping between native BitMEX symbols and unified symbols.

use ahash::AHashMap;
use ustr::Ustr;

/// Maps native venue symbols onto unified lowercase symbols and back.
///
/// The mapping is treated as a pure function by the rest of the crate; a
/// disabled mapper passes the native symbol through (lowercased on the
/// unified side).
pub trait SymbolMapper: Send + Sync {
    /// Returns the unified symbol for a native symbol.
    fn unify(&self, native: &str) -> Ustr;

    /// Returns the alias set for a native symbol (unified symbol included).
    fn aliases(&self, native: &str) -> Vec<Ustr>;

    /// Returns the native symbol for a unified symbol, if known.
    fn native(&self, unified: &str) -> Option<Ustr>;
}

/// Static alias table for the common BitMEX perpetual contracts.
#[derive(Debug)]
pub struct BitmexSymbolMap {
    enabled: bool,
    to_unified: AHashMap<Ustr, Ustr>,
    to_native: AHashMap<Ustr, Ustr>,
}

const ALIASES: &[(&str, &str)] = &[
    ("XBTUSD", "btcusdt"),
    ("ETHUSD", "ethusdt"),
    ("SOLUSD", "solusdt"),
    ("XRPUSD", "xrpusdt"),
    ("ADAUSD", "adausdt"),
    ("LTCUSD", "ltcusdt"),
];

impl BitmexSymbolMap {
    /// Creates a new [`BitmexSymbolMap`] instance.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let mut to_unified = AHashMap::with_capacity(ALIASES.len());
        let mut to_native = AHashMap::with_capacity(ALIASES.len() * 2);

        for (native, unified) in ALIASES {
            let native = Ustr::from(native);
            let unified = Ustr::from(unified);
            to_unified.insert(native, unified);
            to_native.insert(unified, native);
            to_native.insert(Ustr::from(&format!("{unified}.perp")), native);
        }

        Self {
            enabled,
            to_unified,
            to_native,
        }
    }
}

impl Default for BitmexSymbolMap {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SymbolMapper for BitmexSymbolMap {
    fn unify(&self, native: &str) -> Ustr {
        if self.enabled
            && let Some(unified) = self.to_unified.get(&Ustr::from(native))
        {
            return *unified;
        }
        Ustr::from(&native.to_ascii_lowercase())
    }

    fn aliases(&self, native: &str) -> Vec<Ustr> {
        let unified = self.unify(native);
        if self.enabled && self.to_unified.contains_key(&Ustr::from(native)) {
            vec![unified, Ustr::from(&format!("{unified}.perp"))]
        } else {
            vec![unified]
        }
    }

    fn native(&self, unified: &str) -> Option<Ustr> {
        if self.enabled {
            self.to_native.get(&Ustr::from(unified)).copied()
        } else {
            Some(Ustr::from(&unified.to_ascii_uppercase()))
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Tests
////////////////////////////////////////////////////////////////////////////////
