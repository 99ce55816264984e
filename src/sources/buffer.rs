//! Buffer list source
//!
//! Lists the editor's buffers and offers the usual open/split/delete actions
//! on them. The node set an action runs against is the current selection, or
//! the node under the cursor when nothing is selected.

use crate::actions::dispatcher::{ActionContext, ActionDispatcher, DispatchRequest, PanelRefresher};
use crate::actions::error::ActionError;
use crate::actions::registry::{ActionOptions, ActionRegistry, ActionSet, ContextType, MenuSpec};
use crate::config::{BufferSourceConfig, PanelPosition};
use crate::events::BufferId;
use crate::explorer::ExplorerSource;
use crate::host::{BufferInfo, Host};
use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const BUFFER_CONTEXT: &str = "buffer";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferNode {
    pub bufnr: u32,
    pub name: String,
    pub hidden: bool,
}

impl From<BufferInfo> for BufferNode {
    fn from(info: BufferInfo) -> Self {
        Self {
            bufnr: info.bufnr,
            name: info.name,
            hidden: info.hidden,
        }
    }
}

#[derive(Default)]
struct View {
    nodes: Vec<BufferNode>,
    selection: Vec<u32>,
    cursor: Option<u32>,
}

/// State shared between the source and its action handlers
struct BufferState {
    host: Arc<dyn Host>,
    config: BufferSourceConfig,
    expanded: AtomicBool,
    view: Mutex<View>,
}

impl BufferState {
    fn view(&self) -> std::sync::MutexGuard<'_, View> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn quit_on_open(&self, ctx: &ActionContext) -> anyhow::Result<()> {
        if self.config.quit_on_open {
            ctx.suppressed(self.host.call("canopy#explorer#quit", Vec::new()))
                .await?;
        }
        Ok(())
    }

    /// Move the explorer's vsplit back to its side of the screen
    fn vsplit_fixup(&self) -> Option<&'static str> {
        match self.config.position {
            PanelPosition::Left | PanelPosition::Tab => Some("wincmd L"),
            PanelPosition::Right => Some("wincmd H"),
            PanelPosition::Floating => None,
        }
    }

    async fn open(&self, ctx: &ActionContext, node: &BufferNode) -> anyhow::Result<()> {
        let host = &self.host;
        match ctx.arg(0) {
            None => {
                ctx.suppressed(async {
                    host.command("wincmd p").await?;
                    host.command(&format!("buffer {}", node.bufnr)).await
                })
                .await?;
            }
            Some("split") => {
                ctx.suppressed(host.command(&format!("sbuffer {}", node.bufnr)))
                    .await?;
            }
            Some("vsplit") => self.open_vsplit(ctx, node).await?,
            Some("tab") => {
                ctx.suppressed(host.command(&format!("tab sbuffer {}", node.bufnr)))
                    .await?;
            }
            Some(other) => anyhow::bail!("unknown open target '{}'", other),
        }
        self.quit_on_open(ctx).await
    }

    async fn open_vsplit(&self, ctx: &ActionContext, node: &BufferNode) -> anyhow::Result<()> {
        let host = &self.host;
        let fixup = self.vsplit_fixup();
        ctx.suppressed(async {
            host.command(&format!("vertical sbuffer {}", node.bufnr))
                .await?;
            if let Some(fixup) = fixup {
                host.command(fixup).await?;
            }
            anyhow::Ok(())
        })
        .await
    }

    async fn open_drop(&self, ctx: &ActionContext, node: &BufferNode) -> anyhow::Result<()> {
        let window = if node.hidden {
            None
        } else {
            let info = self
                .host
                .call("getbufinfo", vec![Value::from(node.bufnr)])
                .await?;
            let info: Vec<BufferInfo> =
                serde_json::from_value(info).context("unexpected getbufinfo reply")?;
            info.first().and_then(|b| b.windows.first().copied())
        };

        match window {
            Some(winid) => {
                ctx.suppressed(self.host.call("win_gotoid", vec![Value::from(winid)]))
                    .await?;
            }
            None => {
                ctx.suppressed(self.host.command(&format!("buffer {}", node.bufnr)))
                    .await?;
            }
        }
        self.quit_on_open(ctx).await
    }

    async fn load(&self) -> anyhow::Result<()> {
        let info = self.host.call("getbufinfo", Vec::new()).await?;
        let buffers: Vec<BufferInfo> =
            serde_json::from_value(info).context("unexpected getbufinfo reply")?;

        let mut view = self.view();
        view.nodes = buffers.into_iter().map(BufferNode::from).collect();
        let View {
            nodes,
            selection,
            cursor,
        } = &mut *view;
        selection.retain(|bufnr| nodes.iter().any(|n| n.bufnr == *bufnr));
        if cursor.is_some_and(|c| !nodes.iter().any(|n| n.bufnr == c)) {
            *cursor = None;
        }
        tracing::debug!("Loaded {} buffers", nodes.len());
        Ok(())
    }
}

pub struct BufferSource {
    registry: ActionRegistry<BufferNode>,
    state: Arc<BufferState>,
}

impl BufferSource {
    pub fn new(host: Arc<dyn Host>, config: BufferSourceConfig) -> Result<Self, ActionError> {
        let state = Arc::new(BufferState {
            host,
            config,
            expanded: AtomicBool::new(true),
            view: Mutex::new(View::default()),
        });
        let registry = actions(&state)?;
        Ok(Self { registry, state })
    }

    pub fn registry(&self) -> &ActionRegistry<BufferNode> {
        &self.registry
    }

    pub fn is_expanded(&self) -> bool {
        self.state.expanded.load(Ordering::SeqCst)
    }

    /// Nodes shown under the root; none while collapsed
    pub fn visible_nodes(&self) -> Vec<BufferNode> {
        if !self.is_expanded() {
            return Vec::new();
        }
        self.state.view().nodes.clone()
    }

    pub fn select(&self, bufnrs: impl IntoIterator<Item = u32>) {
        let mut view = self.state.view();
        view.selection = bufnrs.into_iter().collect();
    }

    pub fn clear_selection(&self) {
        self.state.view().selection.clear();
    }

    pub fn set_cursor(&self, bufnr: Option<u32>) {
        self.state.view().cursor = bufnr;
    }

    pub fn cursor(&self) -> Option<u32> {
        self.state.view().cursor
    }

    /// Nodes an action runs against
    pub fn target_nodes(&self) -> Vec<BufferNode> {
        let view = self.state.view();
        let wanted: Vec<u32> = if view.selection.is_empty() {
            view.cursor.into_iter().collect()
        } else {
            view.selection.clone()
        };
        wanted
            .iter()
            .filter_map(|bufnr| view.nodes.iter().find(|n| n.bufnr == *bufnr).cloned())
            .collect()
    }
}

#[async_trait]
impl PanelRefresher for BufferSource {
    async fn reload(&self, _context_type: &ContextType) -> anyhow::Result<()> {
        self.state.load().await
    }
}

#[async_trait]
impl ExplorerSource for BufferSource {
    fn context_type(&self) -> &ContextType {
        self.registry.context_type()
    }

    fn action_set(&self) -> &dyn ActionSet {
        &self.registry
    }

    async fn do_action(
        &self,
        dispatcher: &ActionDispatcher,
        request: DispatchRequest,
    ) -> Result<(), ActionError> {
        let nodes = self.target_nodes();
        let result = dispatcher
            .dispatch(&self.registry, request, nodes, self)
            .await;
        if result.is_ok() {
            self.clear_selection();
        }
        result
    }

    /// Follow the editor: put the cursor on the focused buffer
    async fn on_focus(&self, bufnr: BufferId) -> anyhow::Result<()> {
        let mut view = self.state.view();
        if view.nodes.iter().any(|n| n.bufnr == bufnr.0) {
            view.cursor = Some(bufnr.0);
        }
        Ok(())
    }
}

fn actions(state: &Arc<BufferState>) -> Result<ActionRegistry<BufferNode>, ActionError> {
    let mut registry = ActionRegistry::new(BUFFER_CONTEXT);

    let s = Arc::clone(state);
    registry.register_root("collapse", "collapse root node", ActionOptions::reload(), move |_| {
        let s = Arc::clone(&s);
        async move {
            s.expanded.store(false, Ordering::SeqCst);
            s.view().cursor = None;
            anyhow::Ok(())
        }
    })?;

    let s = Arc::clone(state);
    registry.register_root("expand", "expand root node", ActionOptions::reload(), move |_| {
        let s = Arc::clone(&s);
        async move {
            s.expanded.store(true, Ordering::SeqCst);
            anyhow::Ok(())
        }
    })?;

    let s = Arc::clone(state);
    registry.register_node(
        "open",
        "open buffer",
        ActionOptions::default().with_menus(vec![
            MenuSpec::fixed("split").with_description("open in a horizontal split"),
            MenuSpec::fixed("vsplit").with_description("open in a vertical split"),
            MenuSpec::fixed("tab").with_description("open in a new tab"),
        ]),
        move |ctx, node| {
            let s = Arc::clone(&s);
            async move { s.open(&ctx, &node).await }
        },
    )?;

    let s = Arc::clone(state);
    registry.register_node(
        "drop",
        "open buffer via drop command",
        ActionOptions::default(),
        move |ctx, node| {
            let s = Arc::clone(&s);
            async move { s.open_drop(&ctx, &node).await }
        },
    )?;

    let s = Arc::clone(state);
    registry.register_each_node(
        "openInTab",
        "open buffer via tab",
        ActionOptions::default(),
        move |ctx, node| {
            let s = Arc::clone(&s);
            async move {
                s.quit_on_open(&ctx).await?;
                let escaped = s
                    .host
                    .call("fnameescape", vec![Value::from(node.name.clone())])
                    .await?;
                let escaped = escaped.as_str().unwrap_or(&node.name).to_string();
                ctx.suppressed(s.host.command(&format!("tabe {}", escaped)))
                    .await
            }
        },
    )?;

    let s = Arc::clone(state);
    registry.register_each_node(
        "openInSplit",
        "open buffer via split command",
        ActionOptions::default(),
        move |ctx, node| {
            let s = Arc::clone(&s);
            async move {
                ctx.suppressed(s.host.command(&format!("sbuffer {}", node.bufnr)))
                    .await?;
                s.quit_on_open(&ctx).await
            }
        },
    )?;

    let s = Arc::clone(state);
    registry.register_each_node(
        "openInVsplit",
        "open buffer via vsplit command",
        ActionOptions::default(),
        move |ctx, node| {
            let s = Arc::clone(&s);
            async move {
                s.open_vsplit(&ctx, &node).await?;
                s.quit_on_open(&ctx).await
            }
        },
    )?;

    let s = Arc::clone(state);
    registry.register_each_node(
        "delete",
        "delete buffer",
        ActionOptions::reload(),
        move |_, node| {
            let s = Arc::clone(&s);
            async move { s.host.command(&format!("bdelete {}", node.bufnr)).await }
        },
    )?;

    let s = Arc::clone(state);
    registry.register_each_node(
        "deleteForever",
        "bwipeout buffer",
        ActionOptions::reload(),
        move |_, node| {
            let s = Arc::clone(&s);
            async move { s.host.command(&format!("bwipeout {}", node.bufnr)).await }
        },
    )?;

    Ok(registry)
}
