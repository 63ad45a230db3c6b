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

//! Error taxonomy for the DHT core. Nothing here is fatal to a running node; these are surfaced
//! to callers or logged, never panicked on, for conditions a peer may hit indefinitely during
//! normal operation (timeouts, bad peers, malformed datagrams).

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KadError {
    /// No reply arrived for a pending RPC within its deadline.
    #[error("request to {addr} timed out after {elapsed_ms}ms")]
    TransportTimeout { addr: std::net::SocketAddr, elapsed_ms: u64 },

    /// A probed stale k-bucket head failed to answer.
    #[error("peer {0:?} did not respond to probe and was evicted")]
    PeerGone(crate::key::NodeId),

    /// `set` was called with a value outside the supported type set.
    #[error("unsupported value type for storage")]
    BadValueType,

    /// A lookup was started with an empty routing table.
    #[error("no known neighbors to route through")]
    NoKnownNeighbors,

    /// An inbound datagram failed to decode.
    #[error("failed to deserialize inbound datagram: {0}")]
    DeserializationError(String),

    /// The bootstrap cache file was missing, unreadable, or malformed.
    #[error("failed to load state from {path}: {source}")]
    StateLoadError {
        path: std::path::PathBuf,
        #[source]
        source: StateLoadCause,
    },

    /// The underlying UDP socket failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// The server's actor task has already exited; its command channel is closed.
    #[error("server has stopped")]
    ServerStopped,
}

#[derive(Debug, Error)]
pub enum StateLoadCause {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("malformed bootstrap cache: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub type Result<T> = std::result::Result<T, KadError>;
