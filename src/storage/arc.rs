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

//! Adaptive Replacement Cache storage (Megiddo & Modha). Four insertion-ordered lists — `T1`
//! (recent), `T2` (frequent), `B1`/`B2` (ghost entries of each) — and an adaptive split point
//! `p` that tracks which list is under more pressure.
//!
//! The source this was distilled from divides by `|B1|`/`|B2|` without guarding the
//! zero case; here both adjustments go through `ratio_at_least_one`, matching the spec's
//! explicit `max(.., 1)` form with an empty-ghost guard (see DESIGN.md).

use super::{Key, Storage, Value};
use fnv::FnvHashMap;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// An LRU-ordered list of live entries: oldest (LRU) at the front, newest (MRU) at the back.
#[derive(Default)]
struct Resident {
    order: VecDeque<Key>,
    values: FnvHashMap<Key, (Instant, Value)>,
}

impl Resident {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn contains(&self, key: &Key) -> bool {
        self.values.contains_key(key)
    }

    fn touch_mru(&mut self, key: &Key) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos).unwrap();
            self.order.push_back(k);
        }
    }

    fn insert_mru(&mut self, key: Key, value: Value) {
        if self.order.iter().any(|k| k == &key) {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
        self.values.insert(key, (Instant::now(), value));
    }

    fn remove(&mut self, key: &Key) -> Option<(Instant, Value)> {
        self.order.retain(|k| k != key);
        self.values.remove(key)
    }

    fn pop_lru(&mut self) -> Option<Key> {
        let key = self.order.pop_front()?;
        self.values.remove(&key);
        Some(key)
    }

    fn get(&self, key: &Key) -> Option<&(Instant, Value)> {
        self.values.get(key)
    }
}

/// A ghost list: tracks recently-evicted keys (no values) for the adaptation heuristic.
#[derive(Default)]
struct Ghost {
    order: VecDeque<Key>,
}

impl Ghost {
    fn len(&self) -> usize {
        self.order.len()
    }

    fn contains(&self, key: &Key) -> bool {
        self.order.contains(key)
    }

    fn push_mru(&mut self, key: Key) {
        self.order.push_back(key);
    }

    fn remove(&mut self, key: &Key) {
        self.order.retain(|k| k != key);
    }

    fn pop_lru(&mut self) -> Option<Key> {
        self.order.pop_front()
    }
}

pub struct ArcStorage {
    capacity: usize,
    p: usize,
    t1: Resident,
    t2: Resident,
    b1: Ghost,
    b2: Ghost,
}

/// `max(numerator / denominator, 1)`, guarding the case where `denominator == 0` (the source's
/// unguarded division here would panic / divide-by-zero).
fn ratio_at_least_one(numerator: usize, denominator: usize) -> usize {
    if denominator == 0 {
        1
    } else {
        std::cmp::max(numerator / denominator, 1)
    }
}

impl ArcStorage {
    pub fn new(capacity: usize) -> Self {
        ArcStorage {
            capacity,
            p: 0,
            t1: Resident::default(),
            t2: Resident::default(),
            b1: Ghost::default(),
            b2: Ghost::default(),
        }
    }

    /// Default capacity mirrors [`super::ForgetfulStorage`]'s bucket sizing expectations: a
    /// few hundred records per node is a reasonable node-local cache.
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    fn resident_len(&self) -> usize {
        self.t1.len() + self.t2.len()
    }

    fn evict_resident(&mut self) {
        if self.t1.len() > self.p.min(self.capacity) && self.t1.len() > 0 {
            if let Some(key) = self.t1.pop_lru() {
                self.b1.push_mru(key);
            }
        } else if let Some(key) = self.t2.pop_lru() {
            self.b2.push_mru(key);
        } else if let Some(key) = self.t1.pop_lru() {
            self.b1.push_mru(key);
        }
    }

    fn cap_ghosts(&mut self) {
        while self.t1.len() + self.b1.len() > self.capacity {
            if self.b1.pop_lru().is_none() {
                break;
            }
        }
        while self.t1.len() + self.t2.len() + self.b1.len() + self.b2.len() > 2 * self.capacity {
            if self.b2.pop_lru().is_none() {
                break;
            }
        }
    }

    #[cfg(test)]
    fn invariants_hold(&self) -> bool {
        self.t1.len() + self.t2.len() <= self.capacity
            && self.t1.len() + self.b1.len() <= self.capacity
            && self.t1.len() + self.t2.len() + self.b1.len() + self.b2.len() <= 2 * self.capacity
    }
}

impl Storage for ArcStorage {
    fn set(&mut self, key: Key, value: Value) {
        if self.t1.contains(&key) {
            self.t1.remove(&key);
            self.t2.insert_mru(key, value);
            return;
        }
        if self.t2.contains(&key) {
            self.t2.insert_mru(key, value);
            return;
        }

        if self.b1.contains(&key) {
            let delta = ratio_at_least_one(self.b2.len(), self.b1.len());
            self.p = std::cmp::min(self.capacity, self.p + delta);
            self.b1.remove(&key);
            self.t2.insert_mru(key, value);
        } else if self.b2.contains(&key) {
            let delta = ratio_at_least_one(self.b1.len(), self.b2.len());
            self.p = self.p.saturating_sub(delta);
            self.b2.remove(&key);
            self.t2.insert_mru(key, value);
        } else {
            self.t1.insert_mru(key, value);
        }

        if self.resident_len() > self.capacity {
            self.evict_resident();
        }
        self.cap_ghosts();
    }

    fn get(&mut self, key: &Key) -> Option<Value> {
        if let Some((_, value)) = self.t1.remove(key) {
            self.t2.insert_mru(*key, value.clone());
            return Some(value);
        }
        if self.t2.contains(key) {
            self.t2.touch_mru(key);
            return self.t2.get(key).map(|(_, v)| v.clone());
        }
        None
    }

    fn iter(&mut self) -> Vec<(Key, Value)> {
        self.t1
            .order
            .iter()
            .chain(self.t2.order.iter())
            .filter_map(|k| {
                self.t1
                    .get(k)
                    .or_else(|| self.t2.get(k))
                    .map(|(_, v)| (*k, v.clone()))
            })
            .collect()
    }

    fn iter_older_than(&mut self, older_than: Duration) -> Vec<(Key, Value)> {
        let now = Instant::now();
        self.iter()
            .into_iter()
            .filter(|(k, _)| {
                self.t1
                    .get(k)
                    .or_else(|| self.t2.get(k))
                    .map(|(birthday, _)| now.saturating_duration_since(*birthday) >= older_than)
                    .unwrap_or(false)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Key {
        let mut k = [0u8; 20];
        k[0] = b;
        k
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut s = ArcStorage::new(4);
        s.set(key(1), Value::Text("world".into()));
        assert_eq!(s.get(&key(1)), Some(Value::Text("world".into())));
    }

    #[test]
    fn hit_in_t1_promotes_to_t2() {
        let mut s = ArcStorage::new(4);
        s.set(key(1), Value::Int(1));
        assert_eq!(s.t1.len(), 1);
        s.get(&key(1));
        assert_eq!(s.t1.len(), 0);
        assert_eq!(s.t2.len(), 1);
    }

    #[test]
    fn invariants_hold_under_churn() {
        let mut s = ArcStorage::new(8);
        for i in 0..200u8 {
            let k = key(i % 20);
            s.set(k, Value::Int(i as i64));
            if i % 3 == 0 {
                s.get(&k);
            }
            assert!(s.invariants_hold(), "invariants violated at i={}", i);
        }
    }

    #[test]
    fn empty_ghost_lists_do_not_panic_on_ratio() {
        assert_eq!(ratio_at_least_one(5, 0), 1);
        assert_eq!(ratio_at_least_one(0, 0), 1);
        assert_eq!(ratio_at_least_one(10, 2), 5);
    }

    use quickcheck::quickcheck;

    quickcheck! {
        /// A cache of capacity 8 driven by an arbitrary sequence of `(key, is_get)` ops never
        /// violates the ARC size invariants, regardless of the access pattern.
        fn invariants_hold_for_any_access_pattern(ops: Vec<(u8, bool)>) -> bool {
            let mut s = ArcStorage::new(8);
            for (byte, is_get) in ops {
                let k = key(byte % 20);
                if is_get {
                    s.get(&k);
                } else {
                    s.set(k, Value::Int(byte as i64));
                }
                if !s.invariants_hold() {
                    return false;
                }
            }
            true
        }
    }
}
