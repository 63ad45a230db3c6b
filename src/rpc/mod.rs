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

//! Wire framing for the request/response RPC layer. Each datagram carries
//! `(kind, correlation_id, method_name, args)`, self-describing and serialized with MessagePack
//! (`rmp-serde`) — the closest crates.io analogue of the original `rpcudp`/`umsgpack` framing
//! this protocol is meant to interoperate with at the byte level (see SPEC_FULL.md §4.3).

pub mod transport;

pub use transport::{IncomingRequest, PendingTable, RpcLayer};

use crate::contact::Contact;
use crate::key::NodeId;
use crate::storage::Value;
use serde::{Deserialize, Serialize};

/// Maximum datagram size, matching the typical path MTU assumed by the spec. Oversize
/// datagrams are dropped rather than fragmented.
pub const MAX_DATAGRAM_SIZE: usize = 8192;

/// Default RPC deadline.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub type CorrelationId = [u8; 20];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Kind {
    Request,
    Reply,
}

/// One peer contact as carried over the wire (no id-only forms; `FIND_NODE`/`FIND_VALUE`
/// responses always include an address to dial).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireContact {
    pub id: NodeId,
    pub ip: std::net::IpAddr,
    pub port: u16,
}

impl From<Contact> for WireContact {
    fn from(c: Contact) -> Self {
        WireContact { id: c.id, ip: c.ip, port: c.port }
    }
}
impl From<WireContact> for Contact {
    fn from(w: WireContact) -> Self {
        Contact::new(w.id, w.ip, w.port)
    }
}

/// The RPC method name, carried on the wire as the lowercase ASCII strings the spec names
/// (`ping|store|find_node|find_value|stun`). Kept as an enum rather than a bare `&str` so it can
/// round-trip through `serde`/`rmp-serde` without borrowing from the decode buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Ping,
    Store,
    FindNode,
    FindValue,
    Stun,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Ping => "ping",
            Method::Store => "store",
            Method::FindNode => "find_node",
            Method::FindValue => "find_value",
            Method::Stun => "stun",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positional method arguments, one variant per §4.3 handler plus their return payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Args {
    Ping { sender_id: NodeId },
    Store { sender_id: NodeId, key: [u8; 20], value: Value },
    FindNode { sender_id: NodeId, target: NodeId },
    FindValue { sender_id: NodeId, key: [u8; 20] },
    Stun,

    PongId(NodeId),
    StoreAck(bool),
    Nodes(Vec<WireContact>),
    FoundValue(Value),
    StunAddr(std::net::SocketAddr),
}

/// A full datagram: `(kind, correlation_id, method_name, args)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub kind: Kind,
    pub correlation_id: CorrelationId,
    pub method: Method,
    pub args: Args,
}

impl Message {
    pub fn request(correlation_id: CorrelationId, method: Method, args: Args) -> Self {
        Message { kind: Kind::Request, correlation_id, method, args }
    }

    pub fn reply(correlation_id: CorrelationId, method: Method, args: Args) -> Self {
        Message { kind: Kind::Reply, correlation_id, method, args }
    }

    pub fn encode(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

pub fn random_correlation_id() -> CorrelationId {
    use rand::RngCore;
    let mut id = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut id);
    id
}
