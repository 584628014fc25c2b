use std::collections::HashMap;

use crate::error::Result;

/// Stored child of an inverse relation, as `(concrete type, id)`
pub type ChildKey = (String, i64);

/// Lists the children currently stored for an inverse attribute
///
/// The persistence manager is synchronous; children are fetched ahead of
/// time and served from here when an inverse list is reconciled.
pub trait ChildLoader {
    fn existing_children(
        &self,
        holder: &str,
        id: i64,
        attribute: &str,
    ) -> Result<Vec<ChildKey>>;
}

/// Prefetched children keyed by owner and inverse attribute
#[derive(Debug, Clone, Default)]
pub struct ExistingChildren {
    children: HashMap<(String, i64, String), Vec<ChildKey>>,
}

impl ExistingChildren {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        holder: impl Into<String>,
        id: i64,
        attribute: impl Into<String>,
        children: Vec<ChildKey>,
    ) {
        self.children
            .insert((holder.into(), id, attribute.into()), children);
    }

    pub fn contains(&self, holder: &str, id: i64, attribute: &str) -> bool {
        self.children
            .contains_key(&(holder.to_string(), id, attribute.to_string()))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl ChildLoader for ExistingChildren {
    fn existing_children(&self, holder: &str, id: i64, attribute: &str) -> Result<Vec<ChildKey>> {
        Ok(self
            .children
            .get(&(holder.to_string(), id, attribute.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
