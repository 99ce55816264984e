//! The explorer panel: its sources, the current context and the
//! `<namespace>.doCodeAction` command surface.

use crate::actions::dispatcher::{ActionDispatcher, DispatchRequest, PanelRefresher};
use crate::actions::error::ActionError;
use crate::actions::menu::{render_menu, MenuComposer, MenuEntry};
use crate::actions::registry::{ActionSet, ContextType};
use crate::config::Config;
use crate::events::{BufferId, FocusEventGate, FocusSubscription};
use crate::input::keybindings::KeyMappingResolver;
use crate::services::recency::RecencyStore;
use crate::view::floating::{FloatingOpenOptions, FloatingSurface, FloatingWindow};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A tree/data source shown in the panel
#[async_trait]
pub trait ExplorerSource: PanelRefresher {
    fn context_type(&self) -> &ContextType;

    fn action_set(&self) -> &dyn ActionSet;

    /// Run an action against the source's current selection
    async fn do_action(
        &self,
        dispatcher: &ActionDispatcher,
        request: DispatchRequest,
    ) -> Result<(), ActionError>;

    /// Called with throttled, admitted focus changes
    async fn on_focus(&self, _bufnr: BufferId) -> anyhow::Result<()> {
        Ok(())
    }
}

type SourceTable = BTreeMap<ContextType, Arc<dyn ExplorerSource>>;

pub struct Explorer {
    command: String,
    /// Shared with focus subscriptions, so sources added later still see events
    sources: Arc<RwLock<SourceTable>>,
    current: Option<ContextType>,
    composer: MenuComposer,
    dispatcher: ActionDispatcher,
    gate: Arc<FocusEventGate>,
    throttle: Duration,
    close_delay: Duration,
}

impl Explorer {
    pub fn new(config: &Config, recency: Arc<dyn RecencyStore>, gate: Arc<FocusEventGate>) -> Self {
        let command = format!("{}.doCodeAction", config.namespace);
        let keymap = Arc::new(KeyMappingResolver::new(&config.mappings));
        gate.set_debug(config.focus.debug);

        Self {
            composer: MenuComposer::new(keymap, Arc::clone(&recency), command.clone()),
            dispatcher: ActionDispatcher::new(recency, Arc::clone(&gate)),
            command,
            sources: Arc::default(),
            current: None,
            gate,
            throttle: Duration::from_millis(config.focus.throttle_ms),
            close_delay: Duration::from_millis(config.floating.close_delay_ms),
        }
    }

    /// Add a source; the first one added becomes current
    pub fn add_source(&mut self, source: Arc<dyn ExplorerSource>) {
        let context_type = source.context_type().clone();
        tracing::debug!("Added source '{}'", context_type);
        if self.current.is_none() {
            self.current = Some(context_type.clone());
        }
        self.sources_mut().insert(context_type, source);
    }

    /// Make `context_type` current; returns false for unknown sources
    pub fn set_current(&mut self, context_type: &ContextType) -> bool {
        if !self.sources().contains_key(context_type) {
            return false;
        }
        self.current = Some(context_type.clone());
        true
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn current_source(&self) -> Option<Arc<dyn ExplorerSource>> {
        self.current.as_ref().and_then(|ct| self.source(ct))
    }

    pub fn source(&self, context_type: &ContextType) -> Option<Arc<dyn ExplorerSource>> {
        self.sources().get(context_type).cloned()
    }

    /// Name of the command that executes menu entries
    pub fn command_name(&self) -> &str {
        &self.command
    }

    pub fn gate(&self) -> &Arc<FocusEventGate> {
        &self.gate
    }

    /// How long the action menu stays up after one of its entries ran
    pub fn close_delay(&self) -> Duration {
        self.close_delay
    }

    /// Menu entries for the current source, empty without one
    pub async fn provide_code_actions(&self) -> Vec<MenuEntry> {
        let source = self.current_source();
        let actions = source.as_deref().map(|source| source.action_set());
        self.composer.compose(actions).await
    }

    /// Execute a menu entry's payload against the current source
    pub async fn do_code_action(&self, request: DispatchRequest) -> Result<(), ActionError> {
        let Some(source) = self.current_source() else {
            return Err(ActionError::NoActiveSource {
                name: request.action_name,
            });
        };
        source.do_action(&self.dispatcher, request).await
    }

    /// Show the composed menu in a floating window and return its entries,
    /// in the order they are shown.
    pub async fn show_action_menu<S: FloatingSurface>(
        &self,
        window: &FloatingWindow<S>,
        options: FloatingOpenOptions,
    ) -> anyhow::Result<Vec<MenuEntry>> {
        let entries = self.provide_code_actions().await;
        let (lines, highlights) = render_menu(&entries);

        let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        let options = FloatingOpenOptions {
            width: options.width.max(u32::try_from(width).unwrap_or(u32::MAX)),
            height: options
                .height
                .max(u32::try_from(lines.len()).unwrap_or(u32::MAX)),
            focus_line_index: options.focus_line_index.or(Some(1)),
            ..options
        };
        window.open(&lines, &highlights, &options).await?;
        Ok(entries)
    }

    /// Run an entry picked from the menu shown in `window`, then let the
    /// window close after `floating.close_delay_ms`. The close is scheduled
    /// whether or not the action succeeded.
    pub async fn run_menu_entry<S: FloatingSurface>(
        &self,
        window: &FloatingWindow<S>,
        request: DispatchRequest,
    ) -> Result<(), ActionError> {
        let result = self.do_code_action(request).await;
        window.close_delay(self.close_delay);
        result
    }

    /// Forward throttled focus changes to every source, including sources
    /// added after the subscription was made
    pub fn watch_focus(&self) -> FocusSubscription {
        let table = Arc::clone(&self.sources);
        self.gate.on_focus_change(self.throttle, move |bufnr| {
            let sources: Vec<Arc<dyn ExplorerSource>> = table
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .values()
                .cloned()
                .collect();
            async move {
                for source in sources {
                    source.on_focus(bufnr).await?;
                }
                anyhow::Ok(())
            }
        })
    }

    fn sources(&self) -> RwLockReadGuard<'_, SourceTable> {
        self.sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sources_mut(&self) -> RwLockWriteGuard<'_, SourceTable> {
        self.sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
