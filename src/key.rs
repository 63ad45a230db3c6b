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

//! 160-bit node identifiers and the XOR distance metric.

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Number of bytes in a [`NodeId`]. Kademlia as specified here fixes the key space at 160 bits,
/// the size of a SHA-1 digest.
pub const ID_LEN: usize = 20;

/// A 160-bit opaque identifier, compared as an unsigned big-endian integer.
///
/// Ids are derived by hashing an application key with SHA-1, or generated uniformly at random
/// for node identities.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde(with = "serde_bytes_20")] pub [u8; ID_LEN]);

impl NodeId {
    /// Derives an id by hashing an arbitrary byte string with SHA-1.
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data.as_ref());
        let digest = hasher.finalize();
        let mut bytes = [0u8; ID_LEN];
        bytes.copy_from_slice(&digest);
        NodeId(bytes)
    }

    /// Generates a node id uniformly at random, for a fresh node identity.
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LEN];
        rand::thread_rng().fill(&mut bytes);
        NodeId(bytes)
    }

    /// XOR distance between two ids. Distance is symmetric and `distance(a, a) == 0`.
    pub fn distance(&self, other: &NodeId) -> Distance {
        let mut out = [0u8; ID_LEN];
        for i in 0..ID_LEN {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Length, in bits, of the shared prefix between this id and `other`.
    pub fn shared_prefix_len(&self, other: &NodeId) -> u32 {
        self.distance(other).leading_zeros()
    }
}

impl From<[u8; ID_LEN]> for NodeId {
    fn from(bytes: [u8; ID_LEN]) -> Self {
        NodeId(bytes)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// XOR distance between two [`NodeId`]s, ordered as an unsigned big-endian integer.
///
/// Equal distance between two *distinct* ids is impossible: if `distance(a, x) == distance(b,
/// x)` then `a == b`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(pub [u8; ID_LEN]);

impl Distance {
    /// Number of leading zero bits, i.e. the length of the shared ID prefix this distance
    /// implies. Used to pick a k-bucket's "depth" for the splitting decision in
    /// [`crate::kbucket::RoutingTable::add_contact`].
    pub fn leading_zeros(&self) -> u32 {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return (i as u32) * 8 + byte.leading_zeros();
            }
        }
        (ID_LEN as u32) * 8
    }

    /// The maximum possible distance, `2^160 - 1`.
    pub fn max() -> Self {
        Distance([0xff; ID_LEN])
    }

    /// The minimum possible distance, `0`.
    pub fn zero() -> Self {
        Distance([0u8; ID_LEN])
    }
}

impl fmt::Debug for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

mod serde_bytes_20 {
    use serde::de::Error;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        if v.len() != 20 {
            return Err(D::Error::custom("expected 20 bytes for a NodeId"));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&v);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_symmetric() {
        let a = NodeId::random();
        let b = NodeId::random();
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = NodeId::random();
        assert_eq!(a.distance(&a), Distance::zero());
    }

    #[test]
    fn distinct_ids_cannot_tie_distance_to_a_third() {
        let a = NodeId::digest("A");
        let b = NodeId::digest("B");
        let x = NodeId::digest("X");
        if a != b {
            assert_ne!(a.distance(&x), b.distance(&x));
        }
    }

    #[test]
    fn sha1_of_known_input_matches_reference_digest() {
        // SHA1("A") = 6dcd4ce23d88e2ee9568ba546c007c63d9131c1b
        let id = NodeId::digest("A");
        assert_eq!(
            format!("{:?}", id),
            "6dcd4ce23d88e2ee9568ba546c007c63d9131c1b"
        );
    }

    use quickcheck::quickcheck;

    fn id_of(n: u64) -> NodeId {
        NodeId::digest(n.to_le_bytes())
    }

    quickcheck! {
        fn distance_is_symmetric_prop(a: u64, b: u64) -> bool {
            let (a, b) = (id_of(a), id_of(b));
            a.distance(&b) == b.distance(&a)
        }

        fn distance_to_self_is_zero_prop(a: u64) -> bool {
            id_of(a).distance(&id_of(a)) == Distance::zero()
        }

        fn distinct_ids_cannot_tie_distance_to_a_third_prop(a: u64, b: u64, x: u64) -> bool {
            let (a, b, x) = (id_of(a), id_of(b), id_of(x));
            a == b || a.distance(&x) != b.distance(&x)
        }
    }
}
