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

//! Datagram transport: correlates requests with replies and enforces per-request deadlines.
//! Adapted from the mpsc/oneshot correlation shape in `kad/src/kad_server.rs`'s
//! `KademliaServerController` (there built on futures 0.1 channels over a single TCP-muxed
//! stream; here over async/await and a UDP socket, since this protocol is inherently
//! connectionless).

use super::{random_correlation_id, Args, CorrelationId, Kind, Message, Method, MAX_DATAGRAM_SIZE};
use crate::error::{KadError, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};

/// An inbound request, forwarded from the receive loop to whatever owns protocol state (the
/// `Server` actor). `respond` sends the reply datagram back to the original sender.
pub struct IncomingRequest {
    pub sender: SocketAddr,
    pub args: Args,
    pub method: Method,
    correlation_id: CorrelationId,
    rpc: RpcLayer,
}

impl IncomingRequest {
    pub async fn respond(self, reply_args: Args) {
        let msg = Message::reply(self.correlation_id, self.method, reply_args);
        if let Err(e) = self.rpc.send_datagram(self.sender, &msg).await {
            warn!("failed to send reply to {}: {:?}", self.sender, e);
        }
    }
}

struct Pending {
    deadline_tx: oneshot::Sender<Message>,
}

#[derive(Default)]
pub struct PendingTable {
    inner: Mutex<HashMap<CorrelationId, Pending>>,
}

impl PendingTable {
    fn register(&self, id: CorrelationId, tx: oneshot::Sender<Message>) {
        self.inner.lock().unwrap().insert(id, Pending { deadline_tx: tx });
    }

    fn resolve(&self, id: &CorrelationId, msg: Message) -> bool {
        if let Some(pending) = self.inner.lock().unwrap().remove(id) {
            let _ = pending.deadline_tx.send(msg);
            true
        } else {
            false
        }
    }

    fn purge(&self, id: &CorrelationId) {
        self.inner.lock().unwrap().remove(id);
    }
}

/// Thin, cloneable handle to the bound UDP socket and pending-request table. Sending and
/// receiving may both proceed concurrently through the same handle (mirrors how
/// `tokio::net::UdpSocket` is meant to be shared: wrapped in an `Arc` rather than split).
#[derive(Clone)]
pub struct RpcLayer {
    socket: Arc<UdpSocket>,
    pending: Arc<PendingTable>,
    timeout: Duration,
}

impl RpcLayer {
    /// Binds a UDP socket and spawns the receive loop. Returns the layer handle plus a channel
    /// of inbound requests for the caller (the `Server` actor) to dispatch and answer.
    pub async fn bind(addr: SocketAddr, timeout: Duration) -> Result<(Self, mpsc::Receiver<IncomingRequest>)> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let pending = Arc::new(PendingTable::default());
        let layer = RpcLayer { socket, pending, timeout };

        let (tx, rx) = mpsc::channel(256);
        let recv_layer = layer.clone();
        tokio::spawn(async move { recv_layer.recv_loop(tx).await });

        Ok((layer, rx))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send_datagram(&self, addr: SocketAddr, msg: &Message) -> Result<()> {
        let bytes = msg
            .encode()
            .map_err(|e| KadError::DeserializationError(e.to_string()))?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            warn!("dropping oversize outbound datagram to {} ({} bytes)", addr, bytes.len());
            return Ok(());
        }
        self.socket.send_to(&bytes, addr).await?;
        Ok(())
    }

    /// Sends `method(args)` to `addr` and awaits a matching reply or the configured deadline.
    /// Returns `(true, payload)` on a timely reply, `(false, None)` on timeout — mirroring the
    /// original `rpcudp` call convention rather than raising on timeout, since a missing peer is
    /// routine, not exceptional.
    pub async fn call(&self, addr: SocketAddr, method: Method, args: Args) -> (bool, Option<Args>) {
        let correlation_id = random_correlation_id();
        let (tx, rx) = oneshot::channel();
        self.pending.register(correlation_id, tx);

        let request = Message::request(correlation_id, method, args);
        if let Err(e) = self.send_datagram(addr, &request).await {
            warn!("failed to send {} to {}: {:?}", method, addr, e);
            self.pending.purge(&correlation_id);
            return (false, None);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => (true, Some(reply.args)),
            Ok(Err(_)) => (false, None), // sender dropped, e.g. during shutdown
            Err(_) => {
                self.pending.purge(&correlation_id);
                (false, None)
            }
        }
    }

    async fn recv_loop(self, requests: mpsc::Sender<IncomingRequest>) {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            let (len, sender) = match self.socket.recv_from(&mut buf).await {
                Ok(v) => v,
                Err(e) => {
                    warn!("UDP recv error, receive loop exiting: {:?}", e);
                    return;
                }
            };
            let msg = match Message::decode(&buf[..len]) {
                Ok(m) => m,
                Err(e) => {
                    debug!("dropping malformed datagram from {}: {:?}", sender, e);
                    continue;
                }
            };
            match msg.kind {
                Kind::Reply => {
                    let correlation_id = msg.correlation_id;
                    if !self.pending.resolve(&correlation_id, msg) {
                        debug!("dropping spurious reply from {} (no matching request)", sender);
                    }
                }
                Kind::Request => {
                    let req = IncomingRequest {
                        sender,
                        args: msg.args,
                        method: msg.method,
                        correlation_id: msg.correlation_id,
                        rpc: self.clone(),
                    };
                    if requests.send(req).await.is_err() {
                        return; // server shut down
                    }
                }
            }
        }
    }
}
