//! Per-run deduplication state.
//!
//! Handles and SKUs must be unique across one import file. The sets live
//! here, owned by the run, so two runs over the same input never observe
//! each other's claims.

use std::collections::{HashMap, HashSet};

/// Handles issued so far in this run.
#[derive(Debug, Clone, Default)]
pub struct HandleRegistry {
    issued: HashSet<String>,
}

impl HandleRegistry {
    /// First free handle for `base`: `base`, then `base-2`, `base-3`, ….
    ///
    /// Nothing is reserved. An empty base stays empty.
    pub fn peek(&self, base: &str) -> String {
        if base.is_empty() || !self.issued.contains(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}-{}", base, n);
            if !self.issued.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Mark a handle as issued. Empty handles are ignored.
    pub fn reserve(&mut self, handle: &str) {
        if !handle.is_empty() {
            self.issued.insert(handle.to_string());
        }
    }

    /// [`peek`](Self::peek) and [`reserve`](Self::reserve) in one step.
    pub fn claim(&mut self, base: &str) -> String {
        let handle = self.peek(base);
        self.reserve(&handle);
        handle
    }

    pub fn contains(&self, handle: &str) -> bool {
        self.issued.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

/// SKUs accepted so far, with the source row that first used each.
#[derive(Debug, Clone, Default)]
pub struct SkuRegistry {
    first_use: HashMap<String, usize>,
}

impl SkuRegistry {
    /// Source row that already claimed `sku`, if any.
    pub fn owner(&self, sku: &str) -> Option<usize> {
        self.first_use.get(sku).copied()
    }

    /// Claim `sku` for `row`. Returns the previous owner on conflict.
    pub fn claim(&mut self, sku: &str, row: usize) -> Result<(), usize> {
        match self.owner(sku) {
            Some(previous) => Err(previous),
            None => {
                self.first_use.insert(sku.to_string(), row);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.first_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_use.is_empty()
    }
}

/// Everything a run accumulates across groups.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub handles: HandleRegistry,
    pub skus: SkuRegistry,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_suffixes() {
        let mut handles = HandleRegistry::default();
        assert_eq!(handles.claim("shirt"), "shirt");
        assert_eq!(handles.claim("shirt"), "shirt-2");
        assert_eq!(handles.claim("shirt-2"), "shirt-2-2");
        assert_eq!(handles.claim("shirt"), "shirt-3");
        assert_eq!(handles.len(), 4);
    }

    #[test]
    fn test_peek_does_not_reserve() {
        let mut handles = HandleRegistry::default();
        handles.reserve("boot");
        assert_eq!(handles.peek("boot"), "boot-2");
        assert_eq!(handles.peek("boot"), "boot-2");
        assert!(!handles.contains("boot-2"));
    }

    #[test]
    fn test_empty_handle_never_reserved() {
        let mut handles = HandleRegistry::default();
        assert_eq!(handles.claim(""), "");
        assert_eq!(handles.claim(""), "");
        assert!(handles.is_empty());
    }

    #[test]
    fn test_sku_claims() {
        let mut skus = SkuRegistry::default();
        assert_eq!(skus.claim("A-1", 1), Ok(()));
        assert_eq!(skus.claim("A-1", 5), Err(1));
        assert_eq!(skus.owner("A-1"), Some(1));
        assert_eq!(skus.owner("B-1"), None);
    }

    #[test]
    fn test_fresh_contexts_are_independent() {
        let mut first = RunContext::new();
        first.handles.claim("shirt");
        let mut second = RunContext::new();
        assert_eq!(second.handles.claim("shirt"), "shirt");
    }
}
