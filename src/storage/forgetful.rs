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

use super::{Key, Storage, Value};
use fnv::FnvHashMap;
use std::time::{Duration, Instant};

/// Insertion-ordered key/value map with a time-to-live. Default TTL matches the original
/// 7-day default (`604800` seconds).
pub struct ForgetfulStorage {
    ttl: Duration,
    order: Vec<Key>,
    entries: FnvHashMap<Key, (Instant, Value)>,
}

impl Default for ForgetfulStorage {
    fn default() -> Self {
        Self::new(Duration::from_secs(604_800))
    }
}

impl ForgetfulStorage {
    pub fn new(ttl: Duration) -> Self {
        ForgetfulStorage {
            ttl,
            order: Vec::new(),
            entries: FnvHashMap::default(),
        }
    }

    /// Remove entries older than the TTL, oldest-first, stopping at the first entry still
    /// within the TTL (insertion order means everything after it is also still fresh).
    fn cull(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut cut = 0;
        for key in &self.order {
            match self.entries.get(key) {
                Some((birthday, _)) if now.saturating_duration_since(*birthday) >= ttl => {
                    self.entries.remove(key);
                    cut += 1;
                }
                _ => break,
            }
        }
        self.order.drain(0..cut);
    }
}

impl Storage for ForgetfulStorage {
    fn set(&mut self, key: Key, value: Value) {
        if self.entries.remove(&key).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push(key);
        self.entries.insert(key, (Instant::now(), value));
    }

    fn get(&mut self, key: &Key) -> Option<Value> {
        self.cull();
        self.entries.get(key).map(|(_, v)| v.clone())
    }

    fn iter(&mut self) -> Vec<(Key, Value)> {
        self.cull();
        self.order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|(_, v)| (*k, v.clone())))
            .collect()
    }

    fn iter_older_than(&mut self, older_than: Duration) -> Vec<(Key, Value)> {
        self.cull();
        let now = Instant::now();
        self.order
            .iter()
            .filter_map(|k| {
                self.entries.get(k).and_then(|(birthday, v)| {
                    if now.saturating_duration_since(*birthday) >= older_than {
                        Some((*k, v.clone()))
                    } else {
                        None
                    }
                })
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
        let mut s = ForgetfulStorage::default();
        s.set(key(1), Value::Text("world".into()));
        assert_eq!(s.get(&key(1)), Some(Value::Text("world".into())));
    }

    #[test]
    fn overwrite_is_last_writer_wins() {
        let mut s = ForgetfulStorage::default();
        s.set(key(1), Value::Int(1));
        s.set(key(1), Value::Int(2));
        assert_eq!(s.get(&key(1)), Some(Value::Int(2)));
        assert_eq!(s.iter().len(), 1);
    }

    #[test]
    fn entries_older_than_ttl_are_culled() {
        let mut s = ForgetfulStorage::new(Duration::from_millis(1));
        s.set(key(1), Value::Bool(true));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(s.get(&key(1)), None);
        assert!(s.iter().is_empty());
    }

    #[test]
    fn iter_older_than_selects_by_age() {
        let mut s = ForgetfulStorage::default();
        s.set(key(1), Value::Int(1));
        std::thread::sleep(Duration::from_millis(5));
        s.set(key(2), Value::Int(2));
        let old = s.iter_older_than(Duration::from_millis(2));
        assert_eq!(old.len(), 1);
        assert_eq!(old[0].0, key(1));
    }

    #[test]
    fn all_five_value_variants_round_trip_distinctly() {
        let mut s = ForgetfulStorage::default();
        s.set(key(1), Value::Int(42));
        s.set(key(2), Value::Float(3.5));
        s.set(key(3), Value::Bool(true));
        s.set(key(4), Value::Text("hi".into()));
        s.set(key(5), Value::Bytes(vec![1, 2, 3]));
        assert_eq!(s.get(&key(1)), Some(Value::Int(42)));
        assert_eq!(s.get(&key(2)), Some(Value::Float(3.5)));
        assert_eq!(s.get(&key(3)), Some(Value::Bool(true)));
        assert_eq!(s.get(&key(4)), Some(Value::Text("hi".into())));
        assert_eq!(s.get(&key(5)), Some(Value::Bytes(vec![1, 2, 3])));
    }
}
