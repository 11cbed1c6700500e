// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deterministic data-plane object identifiers.
//!
//! Identifiers are derived only from identifying source fields, so translating
//! the same input twice always addresses the same admin API object. The admin
//! API accepts `[a-zA-Z0-9-_.]` up to 64 characters; a truncated SHA-256 hex
//! digest satisfies that for arbitrarily long Kubernetes names.

use crate::cache::ObjectKey;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Field separator that cannot appear in Kubernetes names.
const SEPARATOR: char = '\u{1f}';

/// Hash identifying parts into a 32 character hex identifier.
#[must_use]
pub fn object_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            let mut buf = [0u8; 4];
            hasher.update(SEPARATOR.encode_utf8(&mut buf).as_bytes());
        }
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    let mut id = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

/// Identifier of something produced by one root object, qualified by `parts`.
#[must_use]
pub fn root_scoped_id(root: &ObjectKey, parts: &[&str]) -> String {
    let mut all = vec![root.kind.as_str(), root.namespace.as_str(), root.name.as_str()];
    all.extend_from_slice(parts);
    object_id(&all)
}

/// Consumer usernames are readable: `{namespace}_{name}` with dashes replaced.
#[must_use]
pub fn consumer_username(namespace: &str, name: &str) -> String {
    format!("{namespace}_{name}").replace('-', "_")
}
