//! Recursion Guard
//!
//! A unit of work owns the set of (definition, parent) pairs it has already
//! processed. Writing a parent can re-enter the engine (the host fires its
//! change handlers); the guard makes that re-entry a no-op. The state lives
//! only as long as the unit of work and is passed explicitly as `&mut`.

use std::collections::HashSet;

use rollup_core_types::RequestContext;

#[derive(Debug, Default)]
pub struct UnitOfWork {
    context: RequestContext,
    processed: HashSet<(String, String)>,
    skipped: usize,
}

impl UnitOfWork {
    pub fn new(context: RequestContext) -> Self {
        Self {
            context,
            processed: HashSet::new(),
            skipped: 0,
        }
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// Claim a pair for processing
    ///
    /// Returns `false` (and counts a skip) when the pair was already claimed
    /// in this unit of work.
    pub fn claim(&mut self, definition_key: &str, parent_id: &str) -> bool {
        let fresh = self
            .processed
            .insert((definition_key.to_string(), parent_id.to_string()));
        if !fresh {
            self.skipped += 1;
            tracing::debug!(
                definition = definition_key,
                parent_id,
                "skipping pair already processed in this unit of work"
            );
        }
        fresh
    }

    pub fn is_processed(&self, definition_key: &str, parent_id: &str) -> bool {
        self.processed
            .contains(&(definition_key.to_string(), parent_id.to_string()))
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Pairs short-circuited so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_rejected() {
        let mut uow = UnitOfWork::new(RequestContext::new());
        assert!(uow.claim("r1", "acc-1"));
        assert!(!uow.claim("r1", "acc-1"));
        assert!(uow.claim("r1", "acc-2"));
        assert!(uow.claim("r2", "acc-1"));
        assert_eq!(uow.processed_count(), 3);
        assert_eq!(uow.skipped(), 1);
        assert!(uow.is_processed("r2", "acc-1"));
    }

    #[test]
    fn test_fresh_unit_has_no_memory() {
        let mut first = UnitOfWork::new(RequestContext::new());
        first.claim("r1", "acc-1");
        let mut second = UnitOfWork::new(RequestContext::new());
        assert!(second.claim("r1", "acc-1"));
    }
}
