//! Namespace registry.
//!
//! Tracks which wire namespaces are in use, the origin namespace each one was
//! first registered for, and the prefix it is written with. Entries accumulate
//! while types are registered; prefixes are assigned once, after registration
//! and before the first write.

use std::collections::HashMap;

use crate::utils::{self, SYSTEM_ORIGIN, SYSTEM_PREFIX};

/// One wire namespace and its assigned prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub wire_namespace: String,
    pub origin_namespace: String,
    pub prefix: Option<String>,
}

/// Bidirectional wire-namespace ↔ prefix map.
#[derive(Debug, Clone, Default)]
pub struct NamespaceRegistry {
    entries: Vec<NamespaceEntry>,
    by_wire: HashMap<String, usize>,
    by_prefix: HashMap<String, usize>,
    assigned: bool,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a wire namespace. Returns false if it is already known.
    pub fn try_add(&mut self, wire_namespace: &str, origin_namespace: &str) -> bool {
        if self.by_wire.contains_key(wire_namespace) {
            return false;
        }
        self.by_wire
            .insert(wire_namespace.to_string(), self.entries.len());
        self.entries.push(NamespaceEntry {
            wire_namespace: wire_namespace.to_string(),
            origin_namespace: origin_namespace.to_string(),
            prefix: None,
        });
        true
    }

    /// Records a wire namespace with a preferred prefix. The preference is
    /// honored during assignment unless another namespace already holds it.
    pub fn add_with_prefix(&mut self, wire_namespace: &str, origin_namespace: &str, prefix: &str) {
        self.try_add(wire_namespace, origin_namespace);
        if let Some(&idx) = self.by_wire.get(wire_namespace) {
            if self.entries[idx].prefix.is_none() {
                self.entries[idx].prefix = Some(prefix.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[NamespaceEntry] {
        &self.entries
    }

    pub fn contains(&self, wire_namespace: &str) -> bool {
        self.by_wire.contains_key(wire_namespace)
    }

    /// Prefix of a wire namespace; `Some("")` for the default namespace.
    pub fn prefix_of(&self, wire_namespace: &str) -> Option<&str> {
        self.by_wire
            .get(wire_namespace)
            .and_then(|&idx| self.entries[idx].prefix.as_deref())
    }

    /// Wire namespace bound to a prefix.
    pub fn namespace_of(&self, prefix: &str) -> Option<&str> {
        self.by_prefix
            .get(prefix)
            .map(|&idx| self.entries[idx].wire_namespace.as_str())
    }

    /// Origin namespace a wire namespace was first registered for.
    pub fn origin_of(&self, wire_namespace: &str) -> Option<&str> {
        self.by_wire
            .get(wire_namespace)
            .map(|&idx| self.entries[idx].origin_namespace.as_str())
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        for entry in self.entries.drain(len.min(self.entries.len())..) {
            self.by_wire.remove(&entry.wire_namespace);
        }
    }

    /// Assigns a unique prefix to every entry. Runs once; later calls are
    /// no-ops.
    ///
    /// The default namespace gets the empty prefix. Preferred prefixes are
    /// kept when free. Every other entry derives a candidate from the
    /// capitalized initials of its origin namespace (`Acme.Shapes` -> `as`)
    /// and appends 1, 2, ... until the candidate is unused.
    pub fn assign_prefixes(&mut self, default_namespace: Option<&str>) {
        if self.assigned {
            return;
        }
        self.assigned = true;
        self.by_prefix.clear();

        let mut pending = Vec::new();
        for idx in 0..self.entries.len() {
            let entry = &self.entries[idx];
            let wanted = if Some(entry.wire_namespace.as_str()) == default_namespace {
                Some(String::new())
            } else {
                entry.prefix.clone()
            };
            match wanted {
                Some(prefix) if !self.by_prefix.contains_key(&prefix) => {
                    self.by_prefix.insert(prefix.clone(), idx);
                    self.entries[idx].prefix = Some(prefix);
                }
                _ => pending.push(idx),
            }
        }

        for idx in pending {
            let base = candidate_prefix(&self.entries[idx].origin_namespace);
            let mut prefix = base.clone();
            let mut counter = 0usize;
            while self.by_prefix.contains_key(&prefix) {
                counter += 1;
                prefix = format!("{}{}", base, counter);
            }
            tracing::debug!(
                namespace = %self.entries[idx].wire_namespace,
                prefix = %prefix,
                "assigned namespace prefix"
            );
            self.by_prefix.insert(prefix.clone(), idx);
            self.entries[idx].prefix = Some(prefix);
        }
    }
}

/// Derives the starting prefix for an origin namespace.
fn candidate_prefix(origin: &str) -> String {
    if origin == SYSTEM_ORIGIN || origin.starts_with("System.") {
        return SYSTEM_PREFIX.to_string();
    }
    let initials: String = origin
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if initials.is_empty() || utils::is_reserved_prefix(&initials) {
        "ns".to_string()
    } else {
        initials
    }
}
