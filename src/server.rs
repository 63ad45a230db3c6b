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

//! The public `Server` handle and the single actor task behind it.
//!
//! Everything that touches the routing table or local storage — inbound requests, outbound
//! lookups, refresh/republish ticks — runs on one task, processed one at a time from a
//! `tokio::select!` loop. Public `Server` methods are thin: they package a [`Command`], send it
//! down an `mpsc` channel, and await the `oneshot` reply. This is the same correlation shape
//! `kad/src/kad_server.rs`'s `KademliaServerController` uses to talk to its background task,
//! adapted from futures-0.1 channels to async/await; the effect is the single-threaded
//! cooperative-multitasking model `network.py`'s `Server` gets for free from asyncio.

use crate::contact::Contact;
use crate::error::{KadError, Result};
use crate::key::{NodeId, ID_LEN};
use crate::kbucket::RoutingTable;
use crate::protocol::{self, raw_ping, raw_store};
use crate::quorum::DynamicQuorum;
use crate::rpc::{IncomingRequest, RpcLayer, DEFAULT_TIMEOUT};
use crate::spider;
use crate::storage::{ForgetfulStorage, Storage, Value};
use futures::future::join_all;
use log::{info, warn};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Tuning knobs for a [`Server`], mirroring the shape of `libp2p_kad::high_level::KademliaConfig`
/// with the transport/peerstore generics it carried dropped — this protocol owns its own UDP
/// socket and routing table rather than plugging into a libp2p `Swarm`.
pub struct ServerConfig {
    pub ksize: usize,
    pub alpha: usize,
    pub node_id: Option<NodeId>,
    pub storage: Option<Box<dyn Storage>>,
    pub rpc_timeout: Duration,
    pub refresh_interval: Duration,
    pub republish_interval: Duration,
    /// If set, the actor periodically writes its bootstrap cache here (`save_state_regularly`).
    pub autosave_path: Option<PathBuf>,
    pub autosave_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            ksize: crate::kbucket::DEFAULT_K,
            alpha: 3,
            node_id: None,
            storage: None,
            rpc_timeout: DEFAULT_TIMEOUT,
            refresh_interval: Duration::from_secs(3600),
            republish_interval: Duration::from_secs(3600),
            autosave_path: None,
            autosave_interval: Duration::from_secs(600),
        }
    }
}

/// State owned exclusively by the actor task: the routing table, storage, RPC handle and quorum
/// controller. Never shared or locked; every method that touches it runs inside the one task.
pub struct ActorState {
    pub home: NodeId,
    pub rpc: RpcLayer,
    pub router: RoutingTable,
    pub storage: Box<dyn Storage>,
    pub ksize: usize,
    pub alpha: usize,
    pub quorum: DynamicQuorum,
}

enum Command {
    Get { key: [u8; ID_LEN], reply: oneshot::Sender<Option<Value>> },
    SetDigest { key: [u8; ID_LEN], value: Value, reply: oneshot::Sender<bool> },
    Bootstrap { addrs: Vec<SocketAddr>, reply: oneshot::Sender<Vec<Contact>> },
    SaveState { path: PathBuf, reply: oneshot::Sender<Result<()>> },
    Stop,
}

/// A running DHT node. Cheap to clone; every clone talks to the same background actor.
#[derive(Clone)]
pub struct Server {
    cmd_tx: mpsc::Sender<Command>,
    node_id: NodeId,
    local_addr: SocketAddr,
}

impl Server {
    /// Binds a UDP socket at `addr` and spawns the actor task. The returned `Server` has an
    /// empty routing table; call [`Server::bootstrap`] to join an existing network.
    pub async fn listen(addr: SocketAddr, config: ServerConfig) -> Result<Self> {
        let home = config.node_id.unwrap_or_else(NodeId::random);
        let storage = config.storage.unwrap_or_else(|| Box::new(ForgetfulStorage::default()) as Box<dyn Storage>);
        let (rpc, incoming) = RpcLayer::bind(addr, config.rpc_timeout).await?;
        let local_addr = rpc.local_addr()?;
        let router = RoutingTable::with_params(home, config.ksize, crate::kbucket::DEFAULT_REPLACEMENT_FACTOR);

        let state = ActorState {
            home,
            rpc,
            router,
            storage,
            ksize: config.ksize,
            alpha: config.alpha,
            quorum: DynamicQuorum::new(),
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(run(
            state,
            incoming,
            cmd_rx,
            config.refresh_interval,
            config.republish_interval,
            config.autosave_path,
            config.autosave_interval,
        ));

        info!("listening on {} as {:?}", local_addr, home);
        Ok(Server { cmd_tx, node_id: home, local_addr })
    }

    /// Binds and restores routing-table state saved by a previous run, then bootstraps from the
    /// cached neighbor addresses. Mirrors `network.py`'s `load_state` followed by `bootstrap`.
    pub async fn listen_with_state(addr: SocketAddr, mut config: ServerConfig, cache_path: &std::path::Path) -> Result<(Self, Vec<Contact>)> {
        let cache = crate::state::load(cache_path)?;
        config.node_id = Some(cache.node_id);
        config.ksize = cache.ksize;
        config.alpha = cache.alpha;
        let server = Self::listen(addr, config).await?;
        let neighbors = server.bootstrap(cache.neighbor_addrs()).await;
        Ok((server, neighbors))
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Pings each address, keeps the ones that answer, then runs a `FIND_NODE` lookup for our
    /// own id to fill out the routing table. Mirrors `network.py`'s `bootstrap`.
    pub async fn bootstrap(&self, addrs: Vec<SocketAddr>) -> Vec<Contact> {
        self.call(|reply| Command::Bootstrap { addrs, reply }).await.unwrap_or_default()
    }

    /// Looks up `key` (hashed to a digest first): local storage, then a `FIND_VALUE` spider
    /// crawl if absent.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_digest(*NodeId::digest(key).as_bytes()).await
    }

    pub async fn get_digest(&self, key: [u8; ID_LEN]) -> Option<Value> {
        self.call(|reply| Command::Get { key, reply }).await.flatten()
    }

    /// Stores `value` under `digest(key)` at the nodes closest to it (and locally, if the
    /// routing table doesn't yet know of anyone closer). Mirrors `network.py`'s `set`.
    pub async fn set(&self, key: &str, value: Value) -> bool {
        self.set_digest(*NodeId::digest(key).as_bytes(), value).await
    }

    pub async fn set_digest(&self, key: [u8; ID_LEN], value: Value) -> bool {
        self.call(|reply| Command::SetDigest { key, value, reply }).await.unwrap_or(false)
    }

    /// Writes the current routing table to `path` for a later [`Server::listen_with_state`].
    pub async fn save_state(&self, path: PathBuf) -> Result<()> {
        self.call(|reply| Command::SaveState { path, reply }).await.unwrap_or(Err(KadError::ServerStopped))
    }

    /// Signals the actor task to exit. Idempotent from the caller's perspective: a `Server`
    /// whose actor has already stopped simply has every subsequent call return a default/`None`.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(make(tx)).await.is_err() {
            return None;
        }
        rx.await.ok()
    }
}

async fn handle_get(state: &mut ActorState, key: [u8; ID_LEN]) -> Option<Value> {
    if let Some(v) = state.storage.get(&key) {
        return Some(v);
    }
    let target = NodeId::from(key);
    let seed = state.router.find_neighbors(&target, state.alpha, &[]);
    if seed.is_empty() {
        return None;
    }

    let start = Instant::now();
    let result = spider::find_value(state, key, seed).await;
    state.quorum.record(start.elapsed(), result.is_some());
    result
}

/// Fans `STORE` out to every candidate concurrently (mirroring `spider.rs`'s per-round
/// fan-out and `network.py`'s `set_digest`'s `asyncio.gather`) and reports whether any ack'd.
async fn set_digest(state: &mut ActorState, key: [u8; ID_LEN], value: Value) -> bool {
    let target = NodeId::from(key);
    let seed = state.router.find_neighbors(&target, state.alpha, &[]);
    if seed.is_empty() {
        warn!("no known neighbors, storing {:02x?} locally only", key);
        state.storage.set(key, value);
        return true;
    }

    let nearest = spider::find_node(state, target, seed).await;

    // write locally if we are strictly closer to the digest than the farthest of the k closest
    // nodes found; then fan the STORE out to all k concurrently regardless.
    if let Some(farthest) = nearest.last() {
        if state.home.distance(&target) < farthest.distance_to(&target) {
            state.storage.set(key, value.clone());
        }
    } else {
        state.storage.set(key, value.clone());
    }

    let stores = nearest
        .iter()
        .map(|contact| raw_store(&state.rpc, *contact, state.home, key, value.clone()));
    let results = join_all(stores).await;
    results.into_iter().any(|ok| ok)
}

/// Public `set`: measures whole-operation latency around [`set_digest`] and notifies the
/// quorum controller exactly once, per spec §4.7 / `network.py`'s `set`.
async fn handle_set(state: &mut ActorState, key: [u8; ID_LEN], value: Value) -> bool {
    let start = Instant::now();
    let success = set_digest(state, key, value).await;
    state.quorum.record(start.elapsed(), success);
    success
}

async fn handle_bootstrap(state: &mut ActorState, addrs: Vec<SocketAddr>) -> Vec<Contact> {
    let mut seed = Vec::new();
    for addr in addrs {
        let (ok, id) = raw_ping(&state.rpc, addr, state.home).await;
        if let (true, Some(id)) = (ok, id) {
            let contact = Contact::new(id, addr.ip(), addr.port());
            state.handle_call_response(contact, true).await;
            seed.push(contact);
        }
    }
    if seed.is_empty() {
        return Vec::new();
    }
    let home = state.home;
    spider::find_node(state, home, seed).await
}

async fn refresh(state: &mut ActorState) {
    for id in protocol::get_refresh_ids(state) {
        let seed = state.router.find_neighbors(&id, state.alpha, &[]);
        if !seed.is_empty() {
            spider::find_node(state, id, seed).await;
        }
    }
}

async fn republish(state: &mut ActorState, max_age: Duration) {
    for (key, value) in state.storage.iter_older_than(max_age) {
        handle_set(state, key, value).await;
    }
}

async fn handle_command(state: &mut ActorState, cmd: Command) -> bool {
    match cmd {
        Command::Get { key, reply } => {
            let _ = reply.send(handle_get(state, key).await);
            false
        }
        Command::SetDigest { key, value, reply } => {
            let _ = reply.send(handle_set(state, key, value).await);
            false
        }
        Command::Bootstrap { addrs, reply } => {
            let _ = reply.send(handle_bootstrap(state, addrs).await);
            false
        }
        Command::SaveState { path, reply } => {
            let _ = reply.send(crate::state::save(&path, state));
            false
        }
        Command::Stop => true,
    }
}

async fn run(
    mut state: ActorState,
    mut incoming: mpsc::Receiver<IncomingRequest>,
    mut commands: mpsc::Receiver<Command>,
    refresh_interval: Duration,
    republish_interval: Duration,
    autosave_path: Option<PathBuf>,
    autosave_interval: Duration,
) {
    let mut refresh_timer = tokio::time::interval(refresh_interval);
    let mut republish_timer = tokio::time::interval(republish_interval);
    let mut autosave_timer = tokio::time::interval(autosave_path.is_some().then(|| autosave_interval).unwrap_or(Duration::from_secs(u64::MAX / 2)));

    loop {
        tokio::select! {
            Some(req) = incoming.recv() => {
                protocol::handle_incoming(&mut state, req).await;
            }
            Some(cmd) = commands.recv() => {
                if handle_command(&mut state, cmd).await {
                    break;
                }
            }
            _ = refresh_timer.tick() => {
                refresh(&mut state).await;
            }
            _ = republish_timer.tick() => {
                republish(&mut state, republish_interval).await;
            }
            _ = autosave_timer.tick(), if autosave_path.is_some() => {
                if let Some(path) = &autosave_path {
                    if let Err(e) = crate::state::save(path, &state) {
                        warn!("autosave to {:?} failed: {:?}", path, e);
                    }
                }
            }
            else => break,
        }
    }
    info!("server for {:?} stopped", state.home);
}
