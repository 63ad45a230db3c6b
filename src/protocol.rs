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

//! Protocol handlers (`PING`/`STORE`/`FIND_NODE`/`FIND_VALUE`/`STUN`) and the welcome/refresh
//! side effects that keep the routing table and storage warm. One-to-one with `protocol.py`'s
//! `rpc_*`/`call_*`/`welcome_if_new` split: handlers answer inbound requests, `call_*` issue
//! outbound ones, and every successfully parsed request runs `welcome_if_new` first.

use crate::contact::Contact;
use crate::key::NodeId;
use crate::rpc::{Args, IncomingRequest, Method, RpcLayer, WireContact};
use crate::server::ActorState;
use crate::storage::Value;
use log::{debug, info, warn};
use rand::Rng;
use std::net::SocketAddr;

/// Outcome of a `FIND_VALUE` call: either the value itself, or the same payload a `FIND_NODE`
/// would have returned (closer peers to keep searching).
pub enum FindValueOutcome {
    Value(Value),
    CloserNodes(Vec<Contact>),
}

/// Dispatches one inbound request to the matching handler, running `welcome_if_new` first as
/// the spec mandates for every successfully parsed request.
pub async fn handle_incoming(state: &mut ActorState, req: IncomingRequest) {
    let sender_addr = req.sender;
    match req.args {
        Args::Ping { sender_id } => {
            let source = Contact::new(sender_id, sender_addr.ip(), sender_addr.port());
            state.welcome_if_new(source).await;
            req.respond(Args::PongId(state.home)).await;
        }
        Args::Store { sender_id, key, value } => {
            let source = Contact::new(sender_id, sender_addr.ip(), sender_addr.port());
            state.welcome_if_new(source).await;
            debug!("got a store request from {}, storing {:02x?}", sender_addr, key);
            state.storage.set(key, value);
            req.respond(Args::StoreAck(true)).await;
        }
        Args::FindNode { sender_id, target } => {
            let source = Contact::new(sender_id, sender_addr.ip(), sender_addr.port());
            state.welcome_if_new(source).await;
            info!("finding neighbors of {:?} in local table", target);
            let neighbors = state.router.find_neighbors(&target, state.ksize, &[source.id]);
            req.respond(Args::Nodes(neighbors.into_iter().map(WireContact::from).collect())).await;
        }
        Args::FindValue { sender_id, key } => {
            let source = Contact::new(sender_id, sender_addr.ip(), sender_addr.port());
            state.welcome_if_new(source).await;
            match state.storage.get(&key) {
                Some(value) => req.respond(Args::FoundValue(value)).await,
                None => {
                    let target = NodeId::from(key);
                    let neighbors = state.router.find_neighbors(&target, state.ksize, &[source.id]);
                    req.respond(Args::Nodes(neighbors.into_iter().map(WireContact::from).collect())).await;
                }
            }
        }
        Args::Stun => {
            req.respond(Args::StunAddr(sender_addr)).await;
        }
        other => {
            warn!("ignoring reply-shaped args arriving as a request: {:?}", other);
        }
    }
}

/// Ids (one per lonely bucket) to target with a refresh-lookup: a random id in each stale
/// bucket's range.
///
/// Draws one integer uniformly over the whole `[lo, hi]` range, matching `network.py`'s
/// `random.randint(*bucket.range)` — sampling each byte independently would not be uniform
/// over a range whose bounds aren't byte-aligned (e.g. `lo=0x10ff..`, `hi=0x1100..` spans a
/// carry between the first two bytes that per-byte sampling can't express).
pub fn get_refresh_ids(state: &ActorState) -> Vec<NodeId> {
    let mut rng = rand::thread_rng();
    state
        .router
        .lonely_buckets()
        .into_iter()
        .map(|bucket| NodeId::from(random_in_range(&mut rng, bucket.range.lo, bucket.range.hi)))
        .collect()
}

/// Uniformly samples a 160-bit big-endian integer in `[lo, hi]` by rejection sampling: draw a
/// uniform offset in `[0, hi - lo]` by masking to that span's bit length and retrying on
/// overshoot, then add it back to `lo`.
fn random_in_range(rng: &mut impl Rng, lo: [u8; crate::key::ID_LEN], hi: [u8; crate::key::ID_LEN]) -> [u8; crate::key::ID_LEN] {
    if lo >= hi {
        return lo;
    }
    let span = subtract(hi, lo);
    let bits = significant_bits(&span);
    loop {
        let mut candidate = [0u8; crate::key::ID_LEN];
        rng.fill(&mut candidate[..]);
        mask_to_bits(&mut candidate, bits);
        if candidate <= span {
            return add(lo, candidate);
        }
    }
}

/// Number of bits needed to represent `bytes` as an unsigned big-endian integer (0 for all-zero).
fn significant_bits(bytes: &[u8; crate::key::ID_LEN]) -> u32 {
    for (i, byte) in bytes.iter().enumerate() {
        if *byte != 0 {
            return ((crate::key::ID_LEN - i) as u32) * 8 - byte.leading_zeros();
        }
    }
    0
}

/// Zeroes every bit above the low `bits` bits of a big-endian byte array in place.
fn mask_to_bits(bytes: &mut [u8; crate::key::ID_LEN], bits: u32) {
    let total_bits = (crate::key::ID_LEN as u32) * 8;
    let mut to_clear = total_bits.saturating_sub(bits);
    for byte in bytes.iter_mut() {
        if to_clear >= 8 {
            *byte = 0;
            to_clear -= 8;
        } else if to_clear > 0 {
            *byte &= 0xffu8 >> to_clear;
            to_clear = 0;
        } else {
            break;
        }
    }
}

/// `a - b` over big-endian byte arrays, assuming `a >= b`.
fn subtract(a: [u8; crate::key::ID_LEN], b: [u8; crate::key::ID_LEN]) -> [u8; crate::key::ID_LEN] {
    let mut out = [0u8; crate::key::ID_LEN];
    let mut borrow = 0i16;
    for i in (0..crate::key::ID_LEN).rev() {
        let diff = a[i] as i16 - b[i] as i16 - borrow;
        if diff < 0 {
            out[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            out[i] = diff as u8;
            borrow = 0;
        }
    }
    out
}

/// `a + b` over big-endian byte arrays, wrapping on overflow (unreachable here since `a + b <=
/// hi <= Distance::max()`).
fn add(a: [u8; crate::key::ID_LEN], b: [u8; crate::key::ID_LEN]) -> [u8; crate::key::ID_LEN] {
    let mut out = [0u8; crate::key::ID_LEN];
    let mut carry = 0u16;
    for i in (0..crate::key::ID_LEN).rev() {
        let sum = a[i] as u16 + b[i] as u16 + carry;
        out[i] = sum as u8;
        carry = sum >> 8;
    }
    out
}

impl ActorState {
    /// If `contact` is new, push our closer-than-current-holders keys to it, then add it to the
    /// routing table. Mirrors `protocol.py`'s `welcome_if_new` including its exact closeness
    /// test (both: the newcomer closer than the current farthest of the k nearest, *and* we
    /// ourselves closer than the current nearest).
    pub async fn welcome_if_new(&mut self, contact: Contact) {
        if contact.id == self.home {
            return;
        }
        if !self.router.is_new_node(&contact) {
            self.router.add_contact(contact);
            return;
        }

        info!("never seen {:?} before, adding to router", contact);
        for (key, value) in self.storage.iter() {
            let key_node = NodeId::from(key);
            let neighbors = self.router.find_neighbors(&key_node, self.ksize, &[]);
            let should_push = match (neighbors.first(), neighbors.last()) {
                (Some(nearest), Some(farthest)) => {
                    let new_node_closer = contact.distance_to(&key_node) < farthest.distance_to(&key_node);
                    let we_are_closest = self.home.distance(&key_node) < nearest.distance_to(&key_node);
                    new_node_closer && we_are_closest
                }
                _ => true, // no neighbors on record yet: nothing to compare against, push anyway
            };
            if should_push {
                raw_store(&self.rpc, contact, self.home, key, value).await;
            }
        }
        self.router.add_contact(contact);
    }

    /// After any outbound call: on failure, evict the contact; on success, welcome it if new.
    pub async fn handle_call_response(&mut self, contact: Contact, success: bool) {
        if !success {
            warn!("no response from {:?}, removing from router", contact);
            self.router.remove_contact(&contact);
        } else {
            self.welcome_if_new(contact).await;
        }
    }
}

pub async fn raw_ping(rpc: &RpcLayer, to: SocketAddr, home: NodeId) -> (bool, Option<NodeId>) {
    let (ok, args) = rpc.call(to, Method::Ping, Args::Ping { sender_id: home }).await;
    match (ok, args) {
        (true, Some(Args::PongId(id))) => (true, Some(id)),
        _ => (false, None),
    }
}

pub async fn raw_find_node(rpc: &RpcLayer, to: Contact, home: NodeId, target: NodeId) -> (bool, Vec<Contact>) {
    let (ok, args) = rpc
        .call(to.addr(), Method::FindNode, Args::FindNode { sender_id: home, target })
        .await;
    match (ok, args) {
        (true, Some(Args::Nodes(nodes))) => (true, nodes.into_iter().map(Contact::from).collect()),
        _ => (false, Vec::new()),
    }
}

pub async fn raw_find_value(rpc: &RpcLayer, to: Contact, home: NodeId, key: [u8; 20]) -> (bool, Option<FindValueOutcome>) {
    let (ok, args) = rpc
        .call(to.addr(), Method::FindValue, Args::FindValue { sender_id: home, key })
        .await;
    match (ok, args) {
        (true, Some(Args::FoundValue(v))) => (true, Some(FindValueOutcome::Value(v))),
        (true, Some(Args::Nodes(nodes))) => {
            (true, Some(FindValueOutcome::CloserNodes(nodes.into_iter().map(Contact::from).collect())))
        }
        _ => (false, None),
    }
}

pub async fn raw_store(rpc: &RpcLayer, to: Contact, home: NodeId, key: [u8; 20], value: Value) -> bool {
    let (ok, args) = rpc
        .call(to.addr(), Method::Store, Args::Store { sender_id: home, key, value })
        .await;
    matches!((ok, args), (true, Some(Args::StoreAck(true))))
}
