//! Scope nodes
//!
//! Named, parented lifetime boundaries. Each node points weakly back at the
//! provider opened for it so ownership always flows provider -> node.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::di::{ProviderInner, ServiceProvider};

/// The fixed set of named lifetimes, outermost first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeLevel {
    Collection,
    Class,
    Method,
    Case,
}

impl ScopeLevel {
    pub fn name(&self) -> &'static str {
        match self {
            ScopeLevel::Collection => "Collection",
            ScopeLevel::Class => "Class",
            ScopeLevel::Method => "Method",
            ScopeLevel::Case => "Case",
        }
    }

    pub fn all() -> [ScopeLevel; 4] {
        [
            ScopeLevel::Collection,
            ScopeLevel::Class,
            ScopeLevel::Method,
            ScopeLevel::Case,
        ]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "collection" => Some(ScopeLevel::Collection),
            "class" => Some(ScopeLevel::Class),
            "method" => Some(ScopeLevel::Method),
            "case" | "testcase" => Some(ScopeLevel::Case),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One instance of a named lifetime boundary.
pub struct ScopeNode {
    level: ScopeLevel,
    parent: Option<Arc<ScopeNode>>,
    provider: Weak<ProviderInner>,
}

impl ScopeNode {
    pub(crate) fn new(
        level: ScopeLevel,
        parent: Option<Arc<ScopeNode>>,
        provider: Weak<ProviderInner>,
    ) -> Self {
        Self {
            level,
            parent,
            provider,
        }
    }

    pub fn level(&self) -> ScopeLevel {
        self.level
    }

    pub fn parent(&self) -> Option<&Arc<ScopeNode>> {
        self.parent.as_ref()
    }

    /// The provider this node was opened for, unless it has been dropped.
    pub fn provider(&self) -> Option<ServiceProvider> {
        ServiceProvider::from_weak(&self.provider)
    }

    /// This node followed by its ancestors, innermost first.
    pub fn lineage(self: &Arc<Self>) -> Vec<Arc<ScopeNode>> {
        let mut chain = vec![self.clone()];
        let mut current = self.parent.clone();
        while let Some(node) = current {
            current = node.parent.clone();
            chain.push(node);
        }
        chain
    }

    /// Nearest node in the lineage (this node included) with `level`.
    pub fn find(self: &Arc<Self>, level: ScopeLevel) -> Option<Arc<ScopeNode>> {
        self.lineage().into_iter().find(|node| node.level == level)
    }

    /// Scope path from the outermost ancestor, e.g. `Collection/Class/Method`.
    pub fn path(self: &Arc<Self>) -> String {
        let mut names: Vec<&'static str> = self.lineage().iter().map(|n| n.level.name()).collect();
        names.reverse();
        names.join("/")
    }
}

impl fmt::Debug for ScopeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeNode")
            .field("level", &self.level)
            .field("parent", &self.parent.as_ref().map(|p| p.level))
            .field("alive", &(self.provider.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_str() {
        assert_eq!(ScopeLevel::from_str("class"), Some(ScopeLevel::Class));
        assert_eq!(ScopeLevel::from_str("TestCase"), Some(ScopeLevel::Case));
        assert_eq!(ScopeLevel::from_str("assembly"), None);
    }

    #[test]
    fn test_levels_nest_outermost_first() {
        let all = ScopeLevel::all();
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ScopeLevel::Method.to_string(), "Method");
    }

    #[test]
    fn test_lineage_and_find() {
        let collection = Arc::new(ScopeNode::new(ScopeLevel::Collection, None, Weak::new()));
        let class = Arc::new(ScopeNode::new(
            ScopeLevel::Class,
            Some(collection.clone()),
            Weak::new(),
        ));
        let method = Arc::new(ScopeNode::new(ScopeLevel::Method, Some(class.clone()), Weak::new()));

        assert_eq!(method.lineage().len(), 3);
        assert!(Arc::ptr_eq(&method.find(ScopeLevel::Class).unwrap(), &class));
        assert!(method.find(ScopeLevel::Case).is_none());
        assert_eq!(method.path(), "Collection/Class/Method");
        assert!(method.provider().is_none());
    }
}
