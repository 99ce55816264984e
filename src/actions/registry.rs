//! Per-source action tables
//!
//! Every UI-context type (file tree, buffer list, bookmarks, ...) owns one
//! [`ActionRegistry`]. Actions are registered once while the source is set up
//! and never change afterwards. The handler flavour decides how many nodes an
//! action takes, so a node action can never be registered as a root action by
//! accident.

use crate::actions::dispatcher::ActionContext;
use crate::actions::error::ActionError;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handlers and argument producers
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future produced by an action handler
pub type ActionFuture = BoxFuture<'static, anyhow::Result<()>>;

type NodeFn<N> = Arc<dyn Fn(ActionContext, N) -> ActionFuture + Send + Sync>;
type NodesFn<N> = Arc<dyn Fn(ActionContext, Vec<N>) -> ActionFuture + Send + Sync>;
type RootFn = Arc<dyn Fn(ActionContext) -> ActionFuture + Send + Sync>;
type ProducerFn = Arc<dyn Fn() -> BoxFuture<'static, Vec<String>> + Send + Sync>;

/// Category of tree/data source active in the panel (e.g. "file", "buffer")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextType(String);

impl ContextType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// How many target nodes a handler expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// Exactly one node
    SingleNode,
    /// One or more nodes
    MultiNode,
    /// The node set is ignored, the handler acts on the whole context
    ContextRoot,
}

impl Multiplicity {
    /// Check a node count against this multiplicity
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Self::SingleNode => count == 1,
            Self::MultiNode => count >= 1,
            Self::ContextRoot => true,
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleNode => f.write_str("exactly one node"),
            Self::MultiNode => f.write_str("one or more nodes"),
            Self::ContextRoot => f.write_str("the context root"),
        }
    }
}

/// Handler variants, one per multiplicity
pub enum ActionHandler<N> {
    Node(NodeFn<N>),
    Nodes(NodesFn<N>),
    Root(RootFn),
}

impl<N> ActionHandler<N> {
    pub fn multiplicity(&self) -> Multiplicity {
        match self {
            Self::Node(_) => Multiplicity::SingleNode,
            Self::Nodes(_) => Multiplicity::MultiNode,
            Self::Root(_) => Multiplicity::ContextRoot,
        }
    }
}

impl<N> Clone for ActionHandler<N> {
    fn clone(&self) -> Self {
        match self {
            Self::Node(f) => Self::Node(Arc::clone(f)),
            Self::Nodes(f) => Self::Nodes(Arc::clone(f)),
            Self::Root(f) => Self::Root(Arc::clone(f)),
        }
    }
}

/// Lazily produces the concrete argument list of a sub-menu.
///
/// The producer is only called when the selected entry is dispatched, and
/// `produce` consumes the value so one menu entry can resolve its arguments
/// at most once.
pub struct ArgsProducer(Option<ProducerFn>);

impl ArgsProducer {
    /// Producer for plain entries: no arguments
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<String>> + Send + 'static,
    {
        Self(Some(Arc::new(move || -> BoxFuture<'static, Vec<String>> {
            Box::pin(producer())
        })))
    }

    fn from_shared(producer: ProducerFn) -> Self {
        Self(Some(producer))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub async fn produce(self) -> Vec<String> {
        match self.0 {
            Some(producer) => producer().await,
            None => Vec::new(),
        }
    }
}

impl fmt::Debug for ArgsProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("ArgsProducer(<deferred>)"),
            None => f.write_str("ArgsProducer(none)"),
        }
    }
}

/// A named sub-menu attached to an action
#[derive(Clone)]
pub struct MenuSpec {
    /// Label used to build the composite identifier `<action>:<args_label>`
    pub args_label: String,
    pub description: Option<String>,
    producer: ProducerFn,
}

impl MenuSpec {
    /// Sub-menu whose arguments are the label split on `:`
    pub fn fixed(args_label: impl Into<String>) -> Self {
        let args_label = args_label.into();
        let args: Vec<String> = args_label.split(':').map(str::to_string).collect();
        Self {
            args_label,
            description: None,
            producer: Arc::new(move || -> BoxFuture<'static, Vec<String>> {
                let args = args.clone();
                Box::pin(async move { args })
            }),
        }
    }

    /// Sub-menu whose arguments are enumerated each time it is dispatched
    pub fn dynamic<F, Fut>(args_label: impl Into<String>, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<String>> + Send + 'static,
    {
        Self {
            args_label: args_label.into(),
            description: None,
            producer: Arc::new(move || -> BoxFuture<'static, Vec<String>> {
                Box::pin(producer())
            }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Fresh handle on the producer; nothing runs until it is produced
    pub fn args_producer(&self) -> ArgsProducer {
        ArgsProducer::from_shared(Arc::clone(&self.producer))
    }
}

impl fmt::Debug for MenuSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuSpec")
            .field("args_label", &self.args_label)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Registration options
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    /// Refresh the panel after a successful invocation
    pub reload: bool,
    pub menus: Vec<MenuSpec>,
}

impl ActionOptions {
    pub fn reload() -> Self {
        Self {
            reload: true,
            menus: Vec::new(),
        }
    }

    pub fn with_menus(mut self, menus: Vec<MenuSpec>) -> Self {
        self.menus = menus;
        self
    }
}

/// A registered action
pub struct Action<N> {
    pub name: String,
    pub description: String,
    pub reload: bool,
    pub menus: Vec<MenuSpec>,
    pub handler: ActionHandler<N>,
}

impl<N> Action<N> {
    pub fn multiplicity(&self) -> Multiplicity {
        self.handler.multiplicity()
    }
}

impl<N> fmt::Debug for Action<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("multiplicity", &self.multiplicity())
            .field("reload", &self.reload)
            .field("menus", &self.menus)
            .finish()
    }
}

/// Read-only view of a registry used to build menus.
///
/// Object safe, so the menu composer does not need to know the node type.
pub trait ActionSet: Send + Sync {
    fn context_type(&self) -> &ContextType;

    /// Every registered action name with its declared sub-menus
    fn menu_actions(&self) -> Vec<(&str, &[MenuSpec])>;
}

/// Table of named actions for one UI-context type
pub struct ActionRegistry<N> {
    context_type: ContextType,
    actions: HashMap<String, Action<N>>,
}

impl<N: Send + 'static> ActionRegistry<N> {
    pub fn new(context_type: impl Into<ContextType>) -> Self {
        Self {
            context_type: context_type.into(),
            actions: HashMap::new(),
        }
    }

    pub fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    /// Register an action; names are unique per context type
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: ActionHandler<N>,
        description: impl Into<String>,
        options: ActionOptions,
    ) -> Result<(), ActionError> {
        let name = name.into();
        if self.actions.contains_key(&name) {
            return Err(ActionError::DuplicateAction {
                name,
                context_type: self.context_type.clone(),
            });
        }

        tracing::trace!(
            "Registered action {}.{} ({})",
            self.context_type,
            name,
            handler.multiplicity()
        );
        self.actions.insert(
            name.clone(),
            Action {
                name,
                description: description.into(),
                reload: options.reload,
                menus: options.menus,
                handler,
            },
        );
        Ok(())
    }

    /// Register an action that takes exactly one node
    pub fn register_node<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        options: ActionOptions,
        handler: F,
    ) -> Result<(), ActionError>
    where
        F: Fn(ActionContext, N) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: NodeFn<N> = Arc::new(move |ctx: ActionContext, node: N| -> ActionFuture {
            Box::pin(handler(ctx, node))
        });
        let handler = ActionHandler::Node(handler);
        self.register(name, handler, description, options)
    }

    /// Register an action that receives the whole selection at once
    pub fn register_nodes<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        options: ActionOptions,
        handler: F,
    ) -> Result<(), ActionError>
    where
        F: Fn(ActionContext, Vec<N>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: NodesFn<N> =
            Arc::new(move |ctx: ActionContext, nodes: Vec<N>| -> ActionFuture {
                Box::pin(handler(ctx, nodes))
            });
        let handler = ActionHandler::Nodes(handler);
        self.register(name, handler, description, options)
    }

    /// Register a multi-node action whose handler runs once per node, in order.
    /// The first failing node stops the remaining ones.
    pub fn register_each_node<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        options: ActionOptions,
        handler: F,
    ) -> Result<(), ActionError>
    where
        F: Fn(ActionContext, N) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let each = move |ctx: ActionContext, nodes: Vec<N>| {
            let handler = Arc::clone(&handler);
            async move {
                for node in nodes {
                    (*handler)(ctx.clone(), node).await?;
                }
                anyhow::Ok(())
            }
        };
        self.register_nodes(name, description, options, each)
    }

    /// Register an action on the context root; the node set is ignored
    pub fn register_root<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        options: ActionOptions,
        handler: F,
    ) -> Result<(), ActionError>
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: RootFn = Arc::new(move |ctx: ActionContext| -> ActionFuture {
            Box::pin(handler(ctx))
        });
        let handler = ActionHandler::Root(handler);
        self.register(name, handler, description, options)
    }

    pub fn lookup(&self, name: &str) -> Option<&Action<N>> {
        self.actions.get(name)
    }

    /// All actions by name. Iteration order is unspecified.
    pub fn list_all(&self) -> &HashMap<String, Action<N>> {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl<N: Send + 'static> ActionSet for ActionRegistry<N> {
    fn context_type(&self) -> &ContextType {
        &self.context_type
    }

    fn menu_actions(&self) -> Vec<(&str, &[MenuSpec])> {
        self.actions
            .values()
            .map(|action| (action.name.as_str(), action.menus.as_slice()))
            .collect()
    }
}
