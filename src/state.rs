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

//! Bootstrap cache persistence: save enough of a running node's routing table to disk that a
//! restart can rejoin the network without a fresh set of bootstrap addresses. Grounded on
//! `network.py`'s `save_state`/`load_state`/`save_state_regularly`. Written atomically
//! (write-to-temp, then rename) so a crash mid-write never corrupts the last good snapshot.

use crate::error::{KadError, Result, StateLoadCause};
use crate::key::NodeId;
use crate::server::ActorState;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

#[derive(Serialize, Deserialize)]
pub struct BootstrapCache {
    pub ksize: usize,
    pub alpha: usize,
    pub node_id: NodeId,
    pub neighbors: Vec<(NodeId, IpAddr, u16)>,
}

impl BootstrapCache {
    pub fn neighbor_addrs(&self) -> Vec<SocketAddr> {
        self.neighbors.iter().map(|(_, ip, port)| SocketAddr::new(*ip, *port)).collect()
    }
}

pub fn load(path: &Path) -> Result<BootstrapCache> {
    let bytes = std::fs::read(path)
        .map_err(|e| KadError::StateLoadError { path: path.to_owned(), source: StateLoadCause::Io(e) })?;
    rmp_serde::from_slice(&bytes)
        .map_err(|e| KadError::StateLoadError { path: path.to_owned(), source: StateLoadCause::Decode(e) })
}

pub fn save(path: &Path, state: &ActorState) -> Result<()> {
    let cache = BootstrapCache {
        ksize: state.ksize,
        alpha: state.alpha,
        node_id: state.home,
        neighbors: state
            .router
            .buckets()
            .iter()
            .flat_map(|b| b.live().iter())
            .map(|c| (c.id, c.ip, c.port))
            .collect(),
    };
    let bytes = rmp_serde::to_vec_named(&cache).map_err(|e| KadError::DeserializationError(e.to_string()))?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
