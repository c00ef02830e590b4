//! Function set diffing
//!
//! Decides whether a freshly fetched function list differs from the last
//! recorded one. Lists are compared as multisets of identity keys, so order
//! never matters but duplicates do.

use crate::model::Function;
use std::collections::HashMap;

/// Anything with a composite identity used for diffing
pub trait Identity {
    fn identity(&self) -> String;
}

impl Identity for Function {
    fn identity(&self) -> String {
        self.name.clone()
    }
}

/// Returns true when the multisets of identity keys differ
pub fn changed<L: Identity, R: Identity>(previous: &[L], next: &[R]) -> bool {
    if previous.len() != next.len() {
        return true;
    }

    let mut counts: HashMap<String, usize> = HashMap::with_capacity(previous.len());
    for item in previous {
        *counts.entry(item.identity()).or_default() += 1;
    }

    for item in next {
        match counts.get_mut(&item.identity()) {
            Some(n) if *n > 0 => *n -= 1,
            _ => return true,
        }
    }

    false
}
