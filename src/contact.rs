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

use crate::key::{Distance, NodeId};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// A peer on the network: its id plus the address we reach it at.
///
/// Two contacts are "same home" iff their `(ip, port)` match; identity for routing-table
/// purposes is by [`NodeId`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub id: NodeId,
    pub ip: IpAddr,
    pub port: u16,
}

impl Contact {
    pub fn new(id: NodeId, ip: IpAddr, port: u16) -> Self {
        Contact { id, ip, port }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn same_home(&self, other: &Contact) -> bool {
        self.ip == other.ip && self.port == other.port
    }

    pub fn distance_to(&self, id: &NodeId) -> Distance {
        self.id.distance(id)
    }
}

impl std::fmt::Debug for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Contact({:?}, {})", self.id, self.addr())
    }
}

impl std::fmt::Display for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn same_home_ignores_id() {
        let a = Contact::new(NodeId::random(), IpAddr::V4(Ipv4Addr::LOCALHOST), 8468);
        let b = Contact::new(NodeId::random(), IpAddr::V4(Ipv4Addr::LOCALHOST), 8468);
        assert!(a.same_home(&b));
    }
}
