// Copyright 2018 Parity Technologies (UK) Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
// OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Node-local storage. Two backings share one capability set: a plain TTL map
//! ([`ForgetfulStorage`]) and an adaptive-replacement variant ([`ArcStorage`]). Callers depend
//! only on the [`Storage`] trait; nothing outside test diagnostics depends on which concrete
//! backing is in use.

mod arc;
mod forgetful;

pub use arc::ArcStorage;
pub use forgetful::ForgetfulStorage;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The closed set of value types a record may hold. Resolves the source's conflation of `bool`
/// and `int` into distinct round-tripping variants (see DESIGN.md).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

/// Key type for node-local storage: a 160-bit digest, same space as [`crate::key::NodeId`].
pub type Key = [u8; crate::key::ID_LEN];

/// Common contract shared by both storage backings. `set` is last-writer-wins; `get` never
/// raises, it just reports absence.
pub trait Storage: Send {
    /// Insert or overwrite `key`, resetting its birthday to now.
    fn set(&mut self, key: Key, value: Value);

    /// Look up `key`, touching recency bookkeeping (ARC) as a side effect of a hit.
    fn get(&mut self, key: &Key) -> Option<Value>;

    /// All (key, value) pairs, oldest-stored-first, with expired/evicted entries already culled.
    fn iter(&mut self) -> Vec<(Key, Value)>;

    /// (key, value) pairs whose birthday is at least `older_than` in the past.
    fn iter_older_than(&mut self, older_than: Duration) -> Vec<(Key, Value)>;
}
