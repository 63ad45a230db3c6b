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

//! The lookup frontier: a bounded min-heap of candidates ordered by distance to the target,
//! plus the set of ids already contacted during the current spider run.

use crate::contact::Contact;
use crate::key::{Distance, NodeId};
use std::collections::BinaryHeap;
use std::cmp::Reverse;
use std::collections::HashSet;

pub struct NodeHeap {
    target: NodeId,
    heap: BinaryHeap<Reverse<(Distance, ContactOrd)>>,
    contacted: HashSet<NodeId>,
    maxsize: usize,
}

/// Wraps [`Contact`] so it can ride along in the heap's tuple while only `Distance` drives
/// ordering (ties are impossible between distinct ids per the XOR metric, but we still need
/// `Ord` on the tuple).
#[derive(Clone, Copy, PartialEq, Eq)]
struct ContactOrd(Contact);

impl PartialOrd for ContactOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ContactOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

impl NodeHeap {
    pub fn new(target: NodeId, maxsize: usize) -> Self {
        NodeHeap {
            target,
            heap: BinaryHeap::new(),
            contacted: HashSet::new(),
            maxsize,
        }
    }

    /// Inserts `contacts` not already present, keyed by distance to the target.
    pub fn push(&mut self, contacts: impl IntoIterator<Item = Contact>) {
        let existing: HashSet<NodeId> = self.iter_all().map(|c| c.id).collect();
        for c in contacts {
            if !existing.contains(&c.id) {
                let d = c.id.distance(&self.target);
                self.heap.push(Reverse((d, ContactOrd(c))));
            }
        }
    }

    pub fn mark_contacted(&mut self, id: &NodeId) {
        self.contacted.insert(*id);
    }

    /// Removes `ids` from the frontier entirely (used when an RPC to them fails).
    pub fn remove(&mut self, ids: &[NodeId]) {
        if ids.is_empty() {
            return;
        }
        let remaining: Vec<(Distance, Contact)> = self
            .drain_sorted()
            .into_iter()
            .filter(|(_, c)| !ids.contains(&c.id))
            .collect();
        for (d, c) in remaining {
            self.heap.push(Reverse((d, ContactOrd(c))));
        }
    }

    fn drain_sorted(&mut self) -> Vec<(Distance, Contact)> {
        let mut out = Vec::new();
        while let Some(Reverse((d, c))) = self.heap.pop() {
            out.push((d, c.0));
        }
        out
    }

    /// All contacts currently in the heap, nearest first, without truncating to `maxsize`.
    fn iter_all(&self) -> impl Iterator<Item = Contact> + '_ {
        self.heap.iter().map(|Reverse((_, c))| c.0)
    }

    /// The top `maxsize` contacts by distance, nearest first.
    pub fn top(&self) -> Vec<Contact> {
        let mut all: Vec<(Distance, Contact)> =
            self.heap.iter().map(|Reverse((d, c))| (*d, c.0)).collect();
        all.sort_by_key(|(d, _)| *d);
        all.truncate(self.maxsize);
        all.into_iter().map(|(_, c)| c).collect()
    }

    /// Up to `alpha` nearest contacts from the top-k that have not yet been contacted.
    pub fn uncontacted_frontier(&self, alpha: usize) -> Vec<Contact> {
        self.top()
            .into_iter()
            .filter(|c| !self.contacted.contains(&c.id))
            .take(alpha)
            .collect()
    }

    pub fn have_contacted_all(&self) -> bool {
        self.top().iter().all(|c| self.contacted.contains(&c.id))
    }

    pub fn get(&self, id: &NodeId) -> Option<Contact> {
        self.iter_all().find(|c| c.id == *id)
    }

    pub fn len(&self) -> usize {
        self.top().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn contact(id: NodeId) -> Contact {
        Contact::new(id, IpAddr::V4(Ipv4Addr::LOCALHOST), 9000)
    }

    #[test]
    fn top_returns_nearest_first_bounded_to_maxsize() {
        let target = NodeId::random();
        let mut heap = NodeHeap::new(target, 2);
        heap.push(vec![contact(NodeId::random()), contact(NodeId::random()), contact(NodeId::random())]);
        assert_eq!(heap.top().len(), 2);
    }

    #[test]
    fn contacted_nodes_are_excluded_from_frontier() {
        let target = NodeId::random();
        let mut heap = NodeHeap::new(target, 20);
        let a = contact(NodeId::random());
        heap.push(vec![a]);
        heap.mark_contacted(&a.id);
        assert!(heap.have_contacted_all());
        assert!(heap.uncontacted_frontier(3).is_empty());
    }

    #[test]
    fn remove_drops_failed_contacts() {
        let target = NodeId::random();
        let mut heap = NodeHeap::new(target, 20);
        let a = contact(NodeId::random());
        heap.push(vec![a]);
        heap.remove(&[a.id]);
        assert!(heap.is_empty());
    }
}
