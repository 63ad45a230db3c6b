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

//! A Kademlia distributed hash table node: routing table, RPC transport, iterative lookups and
//! a UDP-based server loop, independent of any particular network transport abstraction.
//!
//! ```no_run
//! use kad_dht::{Server, ServerConfig, Value};
//!
//! # async fn run() -> kad_dht::error::Result<()> {
//! let server = Server::listen("0.0.0.0:8468".parse().unwrap(), ServerConfig::default()).await?;
//! server.bootstrap(vec!["1.2.3.4:8468".parse().unwrap()]).await;
//! server.set("greeting", Value::Text("hello".into())).await;
//! let value = server.get("greeting").await;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod contact;
pub mod error;
mod heap;
mod kbucket;
pub mod key;
mod protocol;
mod quorum;
mod rpc;
mod server;
mod spider;
mod state;
pub mod storage;

pub use contact::Contact;
pub use error::{KadError, Result};
pub use key::NodeId;
pub use server::{Server, ServerConfig};
pub use storage::{ArcStorage, ForgetfulStorage, Storage, Value};
