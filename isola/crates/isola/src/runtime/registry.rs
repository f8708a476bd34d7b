//! Context Registry - the published set of live contexts
//!
//! A `ContextSet` is never mutated once published. Membership changes build
//! a new set and publish it through the runtime's
//! [`VersionedPtr`](super::VersionedPtr).

use std::sync::Arc;

use crate::context::{Context, ContextId};

/// Immutable snapshot of registered contexts, in creation order
#[derive(Debug, Clone, Default)]
pub struct ContextSet {
    contexts: Vec<Arc<Context>>,
}

impl ContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Context>> {
        self.contexts.iter()
    }

    pub fn get(&self, id: ContextId) -> Option<&Arc<Context>> {
        self.contexts.iter().find(|c| c.id() == id)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|c| c.id()).collect()
    }

    /// Copy of this set with `context` appended
    pub(crate) fn with(&self, context: Arc<Context>) -> Self {
        let mut contexts = Vec::with_capacity(self.contexts.len() + 1);
        contexts.extend(self.contexts.iter().cloned());
        contexts.push(context);
        Self { contexts }
    }

    /// Copy of this set without `id`
    pub(crate) fn without(&self, id: ContextId) -> Self {
        Self {
            contexts: self
                .contexts
                .iter()
                .filter(|c| c.id() != id)
                .cloned()
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ContextSet {
    type Item = &'a Arc<Context>;
    type IntoIter = std::slice::Iter<'a, Arc<Context>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::GlobalRef;

    fn context(id: ContextId) -> Arc<Context> {
        Arc::new(Context::new(id, GlobalRef(id as u32)))
    }

    #[test]
    fn test_with_and_without_leave_original_untouched() {
        let empty = ContextSet::new();
        let one = empty.with(context(1));
        let two = one.with(context(2));
        assert!(empty.is_empty());
        assert_eq!(one.ids(), vec![1]);
        assert_eq!(two.ids(), vec![1, 2]);

        let back = two.without(1);
        assert_eq!(back.ids(), vec![2]);
        assert_eq!(two.len(), 2);
        assert!(back.contains(2) && !back.contains(1));
        assert_eq!(back.get(2).map(|c| c.id()), Some(2));
    }
}
