//! Action menu composition
//!
//! Turns the actions of the current source into a flat, ranked list of menu
//! entries. Every action gets one entry, plus one per declared sub-menu with
//! the composite identifier `<action>:<label>`. Entries are ranked by how
//! recently their identifier was dispatched; entries with equal rank keep
//! alphabetical action order, then sub-menu declaration order.

use crate::actions::dispatcher::DispatchRequest;
use crate::actions::registry::{ActionSet, ArgsProducer};
use crate::input::keybindings::{KeyMappingResolver, ReverseKeyMap};
use crate::services::recency::RecencyStore;
use crate::view::floating::Highlight;
use std::sync::Arc;

/// Action that opens the menu itself; never offered as an entry
pub const ACTION_MENU: &str = "actionMenu";

/// One selectable menu line
#[derive(Debug)]
pub struct MenuEntry {
    pub title: String,
    pub identifier: String,
    /// Command that executes the entry, `<namespace>.doCodeAction`
    pub command: String,
    pub request: DispatchRequest,
    pub score: i32,
}

/// Rank of an identifier in a most-recent-first list.
///
/// `len - index` when present, so the most recent entry scores highest and
/// every present identifier scores at least 1; absent identifiers score -1.
pub fn score(recency: &[String], identifier: &str) -> i32 {
    match recency.iter().position(|id| id == identifier) {
        Some(index) => i32::try_from(recency.len() - index).unwrap_or(i32::MAX),
        None => -1,
    }
}

pub struct MenuComposer {
    keymap: Arc<KeyMappingResolver>,
    recency: Arc<dyn RecencyStore>,
    command: String,
}

impl MenuComposer {
    pub fn new(
        keymap: Arc<KeyMappingResolver>,
        recency: Arc<dyn RecencyStore>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            keymap,
            recency,
            command: command.into(),
        }
    }

    /// Entries for the current source; no source means an empty menu.
    ///
    /// Argument producers are not called here.
    pub async fn compose(&self, actions: Option<&dyn ActionSet>) -> Vec<MenuEntry> {
        let Some(actions) = actions else {
            return Vec::new();
        };

        let reverse = self.keymap.resolve(actions.context_type());
        let recency = self.recency.load_or_empty().await;

        let mut named = actions.menu_actions();
        named.retain(|(name, _)| *name != ACTION_MENU);
        named.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut entries = Vec::new();
        for (name, menus) in named {
            entries.push(self.entry(&reverse, &recency, name.to_string(), name, ArgsProducer::none()));
            for menu in menus {
                let identifier = format!("{}:{}", name, menu.args_label);
                entries.push(self.entry(&reverse, &recency, identifier, name, menu.args_producer()));
            }
        }

        // Stable: equal scores keep the order built above
        entries.sort_by(|a, b| b.score.cmp(&a.score));

        tracing::debug!(
            "Composed {} menu entries for '{}'",
            entries.len(),
            actions.context_type()
        );
        entries
    }

    fn entry(
        &self,
        reverse: &ReverseKeyMap,
        recency: &[String],
        identifier: String,
        action_name: &str,
        args: ArgsProducer,
    ) -> MenuEntry {
        let key = reverse
            .get(&identifier)
            .map(|keys| keys.display_key())
            .unwrap_or("");
        MenuEntry {
            title: format!("{} [{}]", identifier, key),
            score: score(recency, &identifier),
            command: self.command.clone(),
            request: DispatchRequest::with_args(identifier.clone(), action_name, args),
            identifier,
        }
    }
}

pub const HL_TITLE: &str = "CanopyActionMenuTitle";
pub const HL_KEY: &str = "CanopyActionMenuKey";

/// Lines and highlights for showing entries in a floating window
pub fn render_menu(entries: &[MenuEntry]) -> (Vec<String>, Vec<Highlight>) {
    let mut lines = Vec::with_capacity(entries.len());
    let mut highlights = Vec::new();

    for (line, entry) in entries.iter().enumerate() {
        let split = entry.identifier.len();
        highlights.push(Highlight {
            group: HL_TITLE.to_string(),
            line,
            col_start: 0,
            col_end: split,
        });
        if entry.title.len() > split + 3 {
            highlights.push(Highlight {
                group: HL_KEY.to_string(),
                line,
                col_start: split + 1,
                col_end: entry.title.len(),
            });
        }
        lines.push(entry.title.clone());
    }

    (lines, highlights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::registry::{ActionOptions, ActionRegistry, MenuSpec};
    use crate::config::ModeMappings;
    use crate::services::recency::InMemoryRecencyStore;
    use std::collections::HashMap;

    fn composer(recency: &[&str], mappings: serde_json::Value) -> MenuComposer {
        let mappings: HashMap<String, ModeMappings> = serde_json::from_value(mappings).unwrap();
        MenuComposer::new(
            Arc::new(KeyMappingResolver::new(&mappings)),
            Arc::new(InMemoryRecencyStore::with_entries(recency.iter().copied())),
            "explorer.doCodeAction",
        )
    }

    fn registry() -> ActionRegistry<u32> {
        let mut registry = ActionRegistry::new("buffer");
        for name in ["expand", "actionMenu"] {
            registry
                .register_root(name, "", ActionOptions::default(), |_| async { anyhow::Ok(()) })
                .unwrap();
        }
        registry
            .register_node(
                "open",
                "",
                ActionOptions::default()
                    .with_menus(vec![MenuSpec::fixed("split"), MenuSpec::fixed("tab")]),
                |_, _| async { anyhow::Ok(()) },
            )
            .unwrap();
        registry
            .register_node("delete", "", ActionOptions::reload(), |_, _| async {
                anyhow::Ok(())
            })
            .unwrap();
        registry
    }

    fn identifiers(entries: &[MenuEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.identifier.as_str()).collect()
    }

    #[test]
    fn test_score() {
        let recency: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(score(&recency, "a"), 3);
        assert_eq!(score(&recency, "c"), 1);
        assert_eq!(score(&recency, "z"), -1);
        assert_eq!(score(&[], "a"), -1);
    }

    #[tokio::test]
    async fn test_no_source_is_empty() {
        let composer = composer(&["open"], serde_json::json!({}));
        assert!(composer.compose(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_alphabetical_without_history() {
        let registry = registry();
        let entries = composer(&[], serde_json::json!({})).compose(Some(&registry)).await;
        assert_eq!(
            identifiers(&entries),
            vec!["delete", "expand", "open", "open:split", "open:tab"]
        );
        assert!(entries.iter().all(|e| e.score == -1));
    }

    #[tokio::test]
    async fn test_recent_entries_first() {
        let registry = registry();
        let entries = composer(&["open:tab", "expand"], serde_json::json!({}))
            .compose(Some(&registry))
            .await;
        assert_eq!(
            identifiers(&entries),
            vec!["open:tab", "expand", "delete", "open", "open:split"]
        );
        assert_eq!(entries[0].score, 2);
        assert_eq!(entries[1].score, 1);
    }

    #[tokio::test]
    async fn test_titles_show_keys() {
        let registry = registry();
        let entries = composer(
            &[],
            serde_json::json!({
                "global": { "normal": { "o": "open", "s": "open:split" } },
                "buffer": { "normal": { "d": "delete" }, "visual": { "D": "delete" } }
            }),
        )
        .compose(Some(&registry))
        .await;

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "delete [D]",
                "expand []",
                "open [o]",
                "open:split [s]",
                "open:tab []"
            ]
        );
    }

    #[tokio::test]
    async fn test_entries_carry_dispatch_payload() {
        let registry = registry();
        let entries = composer(&[], serde_json::json!({})).compose(Some(&registry)).await;
        let split = entries.iter().find(|e| e.identifier == "open:split").unwrap();
        assert_eq!(split.command, "explorer.doCodeAction");
        assert_eq!(split.request.identifier, "open:split");
        assert_eq!(split.request.action_name, "open");
        assert!(!split.request.args.is_none());

        let open = entries.iter().find(|e| e.identifier == "open").unwrap();
        assert!(open.request.args.is_none());
    }

    #[tokio::test]
    async fn test_render_menu() {
        let registry = registry();
        let entries = composer(&[], serde_json::json!({ "global": { "normal": { "o": "open" } } }))
            .compose(Some(&registry))
            .await;
        let (lines, highlights) = render_menu(&entries);

        assert_eq!(lines.len(), entries.len());
        assert_eq!(lines[2], "open [o]");
        let key_hl: Vec<_> = highlights.iter().filter(|h| h.group == HL_KEY).collect();
        assert_eq!(key_hl.len(), 1);
        assert_eq!(key_hl[0].line, 2);
        assert_eq!(&lines[2][key_hl[0].col_start..key_hl[0].col_end], "[o]");
    }
}
