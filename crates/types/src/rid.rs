//! Block and node identifiers.
//!
//! [`BlockRid`] is the fixed 32-byte identifier of a block that validators
//! converge on. [`NodeRid`] is the variable-length public key that identifies a
//! validator on the network. Both serialize as `0x`-prefixed hex strings.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of a block identifier in bytes
pub const RID_SIZE: usize = 32;

/// A 32-byte block identifier.
///
/// The length invariant holds by construction: every constructor either takes
/// a `[u8; 32]` or checks the input length.
///
/// ```rust
/// use ebft_types::BlockRid;
///
/// let rid = BlockRid::sha256(b"candidate");
/// let parsed: BlockRid = rid.to_hex().parse().unwrap();
/// assert_eq!(rid, parsed);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BlockRid([u8; RID_SIZE]);

impl BlockRid {
    /// Creates a block identifier from a 32-byte array.
    #[inline]
    pub const fn new(bytes: [u8; RID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a block identifier from a slice.
    ///
    /// Returns an error if the slice length is not exactly 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != RID_SIZE {
            return Err(Error::InvalidLength {
                expected: RID_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; RID_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// SHA-256 of the given data as a block identifier.
    pub fn sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; RID_SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Returns the identifier as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parses a hex identifier, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Returns the hex representation with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for BlockRid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockRid(0x{})", hex::encode(self.0))
    }
}

impl fmt::Display for BlockRid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for BlockRid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; RID_SIZE]> for BlockRid {
    fn from(bytes: [u8; RID_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for BlockRid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for BlockRid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockRid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A validator's network identity (public key bytes).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRid(Vec<u8>);

impl NodeRid {
    /// Wraps public key bytes. Empty identities are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::EmptyNodeRid);
        }
        Ok(Self(bytes))
    }

    /// Parses a hex identity, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        Self::new(hex::decode(s)?)
    }

    /// Returns the identity bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the hex representation with 0x prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }
}

impl fmt::Debug for NodeRid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRid({})", self.to_hex())
    }
}

impl fmt::Display for NodeRid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for NodeRid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for NodeRid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for NodeRid {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeRid {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
