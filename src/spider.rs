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

//! Iterative lookups ("spider crawls"). One round fans out to up to `alpha` uncontacted,
//! nearest-known peers concurrently; the crawl ends once a round adds no one closer than what's
//! already known. Grounded on `network.py`'s `SpiderCrawl`/`NodeSpiderCrawl`/`ValueSpiderCrawl`,
//! with the round body's RPC fan-out and the sequential state update it feeds into split apart
//! to satisfy the borrow checker: concurrent futures only touch the cloned `RpcLayer` handle,
//! never the routing table directly.

use crate::contact::Contact;
use crate::heap::NodeHeap;
use crate::key::NodeId;
use crate::protocol::{raw_find_node, raw_find_value, raw_store, FindValueOutcome};
use crate::server::ActorState;
use crate::storage::Value;
use futures::future::join_all;
use log::debug;

/// Runs an iterative `FIND_NODE` lookup for `target`, returning up to `k` of the closest live
/// contacts found.
pub async fn find_node(state: &mut ActorState, target: NodeId, seed: Vec<Contact>) -> Vec<Contact> {
    let mut heap = NodeHeap::new(target, state.ksize);
    heap.push(seed);

    loop {
        let frontier = heap.uncontacted_frontier(state.alpha);
        if frontier.is_empty() {
            break;
        }
        for c in &frontier {
            heap.mark_contacted(&c.id);
        }

        let rpc = state.rpc.clone();
        let home = state.home;
        let results = join_all(frontier.iter().map(|&to| {
            let rpc = rpc.clone();
            async move { (to, raw_find_node(&rpc, to, home, target).await) }
        }))
        .await;

        let mut failed = Vec::new();
        for (contact, (ok, nodes)) in results {
            state.handle_call_response(contact, ok).await;
            if ok {
                heap.push(nodes);
            } else {
                failed.push(contact.id);
            }
        }
        heap.remove(&failed);

        if heap.have_contacted_all() {
            break;
        }
    }
    heap.top()
}

/// Runs an iterative `FIND_VALUE` lookup for `key`. On success, also stores the value at the
/// nearest contact seen that did not already have it (Kademlia's "cache at closest failing
/// node" optimization), mirroring `network.py`'s `ValueSpiderCrawl._nodes_found`.
pub async fn find_value(state: &mut ActorState, key: [u8; 20], seed: Vec<Contact>) -> Option<Value> {
    let target = NodeId::from(key);
    let mut heap = NodeHeap::new(target, state.ksize);
    heap.push(seed);
    let mut nearest_missing: Option<Contact> = None;

    loop {
        let frontier = heap.uncontacted_frontier(state.alpha);
        if frontier.is_empty() {
            break;
        }
        for c in &frontier {
            heap.mark_contacted(&c.id);
        }

        let rpc = state.rpc.clone();
        let home = state.home;
        let results = join_all(frontier.iter().map(|&to| {
            let rpc = rpc.clone();
            async move { (to, raw_find_value(&rpc, to, home, key).await) }
        }))
        .await;

        let mut failed = Vec::new();
        for (contact, (ok, outcome)) in results {
            state.handle_call_response(contact, ok).await;
            match outcome {
                Some(FindValueOutcome::Value(value)) => {
                    if let Some(holder) = nearest_missing {
                        debug!("caching found value at {:?}, the nearest node without it", holder);
                        raw_store(&state.rpc, holder, state.home, key, value.clone()).await;
                    }
                    return Some(value);
                }
                Some(FindValueOutcome::CloserNodes(nodes)) => {
                    if nearest_missing.is_none() {
                        nearest_missing = Some(contact);
                    }
                    heap.push(nodes);
                }
                None => failed.push(contact.id),
            }
        }
        heap.remove(&failed);

        if heap.have_contacted_all() {
            break;
        }
    }
    None
}
