// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! 128-bit host and group identifiers derived from names.

use std::fmt;

use md5::{Digest, Md5};

/// A 128-bit identifier derived deterministically from a name.
///
/// Equality of hash implies equality of name within a constellation, which
/// is what lets the 42-byte beacon carry fixed-size identities instead of
/// variable-length strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Md5Hash([u8; 16]);

impl Md5Hash {
    /// Hash a group or host name.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(name.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl From<[u8; 16]> for Md5Hash {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}
