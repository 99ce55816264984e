//! Reverse key lookup for the action menu
//!
//! Mappings are configured forward (key -> action) per context type, with a
//! "global" table shared by every context. The menu needs the opposite
//! direction: for each action identifier, the key the user can press instead
//! of opening the menu.

use crate::actions::registry::ContextType;
use crate::config::{ModeMappings, GLOBAL_MAPPINGS};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Keys bound to one action identifier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundKeys {
    pub normal: Option<String>,
    pub visual: Option<String>,
}

impl BoundKeys {
    /// Key shown in the menu title; visual mode wins over normal mode
    pub fn display_key(&self) -> &str {
        self.visual
            .as_deref()
            .or(self.normal.as_deref())
            .unwrap_or("")
    }
}

/// Action identifier -> bound keys, for one context type
pub type ReverseKeyMap = HashMap<String, BoundKeys>;

/// Builds [`ReverseKeyMap`]s from the configured forward mappings
#[derive(Debug, Clone, Default)]
pub struct KeyMappingResolver {
    global: ModeMappings,
    by_context: HashMap<String, ModeMappings>,
}

impl KeyMappingResolver {
    pub fn new(mappings: &HashMap<String, ModeMappings>) -> Self {
        let mut by_context = mappings.clone();
        let global = by_context.remove(GLOBAL_MAPPINGS).unwrap_or_default();
        Self { global, by_context }
    }

    /// Forward maps in effect for a context type, global entries overridden
    /// by the context's own. A key mapped to null is unbound.
    pub fn effective(&self, context_type: &ContextType) -> ModeMappings {
        let mut normal = self.global.normal.clone();
        let mut visual = self.global.visual.clone();
        if let Some(own) = self.by_context.get(context_type.as_str()) {
            normal.extend(own.normal.clone());
            visual.extend(own.visual.clone());
        }
        ModeMappings { normal, visual }
    }

    /// Reverse mapping for a context type.
    ///
    /// Recomputed on every call. When several keys map to one identifier the
    /// shortest key is kept, ties broken lexicographically.
    pub fn resolve(&self, context_type: &ContextType) -> ReverseKeyMap {
        let effective = self.effective(context_type);
        let mut reverse = ReverseKeyMap::new();

        for (key, action) in invert(&effective.normal) {
            reverse.entry(action).or_default().normal = Some(key);
        }
        for (key, action) in invert(&effective.visual) {
            reverse.entry(action).or_default().visual = Some(key);
        }

        tracing::trace!(
            "Resolved {} bound identifiers for context '{}'",
            reverse.len(),
            context_type
        );
        reverse
    }
}

/// Best key per action, as (key, action) pairs
fn invert(forward: &BTreeMap<String, Option<String>>) -> Vec<(String, String)> {
    let mut best: HashMap<&str, &str> = HashMap::new();
    for (key, action) in forward {
        let Some(action) = action else { continue };
        best.entry(action.as_str())
            .and_modify(|current| {
                if key_preference(key, current) == Ordering::Less {
                    *current = key.as_str();
                }
            })
            .or_insert(key.as_str());
    }
    best.into_iter()
        .map(|(action, key)| (key.to_string(), action.to_string()))
        .collect()
}

fn key_preference(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
