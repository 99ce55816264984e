//! Executes a selected action against a node set
//!
//! Order of a dispatch:
//! 1. look the action up in the source's registry
//! 2. check the node count against the handler's multiplicity
//! 3. resolve the menu arguments (the producer runs exactly once here)
//! 4. run the handler
//! 5. record the identifier in the recency store
//! 6. refresh the panel if the action asked for it
//!
//! Steps 5 and 6 only happen after the handler succeeded. A failed handler
//! leaves its partial side effects in place and the history untouched.

use crate::actions::error::ActionError;
use crate::actions::registry::{ActionHandler, ActionRegistry, ArgsProducer, ContextType};
use crate::events::FocusEventGate;
use crate::services::recency::RecencyStore;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

/// What a handler gets besides its nodes
#[derive(Clone)]
pub struct ActionContext {
    /// Menu identifier that triggered the action ("open" or "open:split")
    pub identifier: String,
    pub action_name: String,
    /// Arguments resolved from the sub-menu, empty for plain entries
    pub args: Vec<String>,
    pub gate: Arc<FocusEventGate>,
}

impl ActionContext {
    /// Run a host call with focus events suppressed.
    ///
    /// Every host call that may switch windows or buffers goes through here.
    pub async fn suppressed<F: Future>(&self, fut: F) -> F::Output {
        self.gate.run_suppressed(fut).await
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("identifier", &self.identifier)
            .field("action_name", &self.action_name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Payload of the `<namespace>.doCodeAction` command
#[derive(Debug)]
pub struct DispatchRequest {
    pub identifier: String,
    pub action_name: String,
    pub args: ArgsProducer,
}

impl DispatchRequest {
    /// Request for a plain entry, identifier and action name are the same
    pub fn new(action_name: impl Into<String>) -> Self {
        let action_name = action_name.into();
        Self {
            identifier: action_name.clone(),
            action_name,
            args: ArgsProducer::none(),
        }
    }

    pub fn with_args(
        identifier: impl Into<String>,
        action_name: impl Into<String>,
        args: ArgsProducer,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            action_name: action_name.into(),
            args,
        }
    }
}

/// Refreshes the panel contents of a context after an action
#[async_trait]
pub trait PanelRefresher: Send + Sync {
    async fn reload(&self, context_type: &ContextType) -> anyhow::Result<()>;
}

pub struct ActionDispatcher {
    recency: Arc<dyn RecencyStore>,
    gate: Arc<FocusEventGate>,
}

impl ActionDispatcher {
    pub fn new(recency: Arc<dyn RecencyStore>, gate: Arc<FocusEventGate>) -> Self {
        Self { recency, gate }
    }

    pub fn gate(&self) -> &Arc<FocusEventGate> {
        &self.gate
    }

    pub fn recency(&self) -> &Arc<dyn RecencyStore> {
        &self.recency
    }

    pub async fn dispatch<N: Send + 'static>(
        &self,
        registry: &ActionRegistry<N>,
        request: DispatchRequest,
        nodes: Vec<N>,
        refresher: &dyn PanelRefresher,
    ) -> Result<(), ActionError> {
        let span = tracing::debug_span!(
            "dispatch",
            context = %registry.context_type(),
            identifier = %request.identifier,
            nodes = nodes.len(),
        );
        self.dispatch_inner(registry, request, nodes, refresher)
            .instrument(span)
            .await
    }

    async fn dispatch_inner<N: Send + 'static>(
        &self,
        registry: &ActionRegistry<N>,
        request: DispatchRequest,
        nodes: Vec<N>,
        refresher: &dyn PanelRefresher,
    ) -> Result<(), ActionError> {
        let DispatchRequest {
            identifier,
            action_name,
            args,
        } = request;

        let action = registry
            .lookup(&action_name)
            .ok_or_else(|| ActionError::UnknownAction {
                name: action_name.clone(),
                context_type: registry.context_type().clone(),
            })?;

        let multiplicity = action.multiplicity();
        if !multiplicity.accepts(nodes.len()) {
            return Err(ActionError::Multiplicity {
                name: action_name,
                expected: multiplicity,
                got: nodes.len(),
            });
        }

        let ctx = ActionContext {
            identifier,
            action_name,
            args: args.produce().await,
            gate: Arc::clone(&self.gate),
        };
        tracing::debug!("Running {} with args {:?}", ctx.action_name, ctx.args);

        let result = match &action.handler {
            ActionHandler::Node(handler) => match nodes.into_iter().next() {
                Some(node) => (**handler)(ctx.clone(), node).await,
                None => {
                    return Err(ActionError::Multiplicity {
                        name: ctx.action_name,
                        expected: multiplicity,
                        got: 0,
                    })
                }
            },
            ActionHandler::Nodes(handler) => (**handler)(ctx.clone(), nodes).await,
            ActionHandler::Root(handler) => (**handler)(ctx.clone()).await,
        };
        result.map_err(|source| ActionError::Execution {
            name: ctx.action_name.clone(),
            source,
        })?;

        if let Err(e) = self.recency.record(&ctx.identifier).await {
            tracing::warn!("Failed to record '{}' in action history: {}", ctx.identifier, e);
        }

        if action.reload {
            let context_type = registry.context_type();
            refresher
                .reload(context_type)
                .await
                .map_err(|source| ActionError::Reload {
                    name: ctx.action_name.clone(),
                    context_type: context_type.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::registry::{ActionOptions, MenuSpec};
    use crate::services::recency::InMemoryRecencyStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingRefresher {
        reloads: AtomicUsize,
    }

    #[async_trait]
    impl PanelRefresher for CountingRefresher {
        async fn reload(&self, _context_type: &ContextType) -> anyhow::Result<()> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingRefresher;

    #[async_trait]
    impl PanelRefresher for FailingRefresher {
        async fn reload(&self, _context_type: &ContextType) -> anyhow::Result<()> {
            anyhow::bail!("panel is gone")
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn registry(log: &Log) -> ActionRegistry<u32> {
        let mut registry = ActionRegistry::new("buffer");

        let sink = Arc::clone(log);
        registry
            .register_node(
                "open",
                "open buffer",
                ActionOptions::default().with_menus(vec![MenuSpec::fixed("split")]),
                move |ctx, node| {
                    let sink = Arc::clone(&sink);
                    async move {
                        sink.lock()
                            .unwrap()
                            .push(format!("open {} {:?}", node, ctx.args));
                        anyhow::Ok(())
                    }
                },
            )
            .unwrap();

        let sink = Arc::clone(log);
        registry
            .register_each_node("delete", "delete buffer", ActionOptions::reload(), move |_, node| {
                let sink = Arc::clone(&sink);
                async move {
                    if node == 13 {
                        anyhow::bail!("buffer {} is modified", node);
                    }
                    sink.lock().unwrap().push(format!("delete {}", node));
                    anyhow::Ok(())
                }
            })
            .unwrap();

        registry
            .register_root("collapse", "collapse", ActionOptions::reload(), |ctx| async move {
                assert!(ctx.args.is_empty());
                anyhow::Ok(())
            })
            .unwrap();

        registry
    }

    fn dispatcher(recency: &Arc<InMemoryRecencyStore>) -> ActionDispatcher {
        ActionDispatcher::new(recency.clone(), Arc::new(FocusEventGate::new()))
    }

    #[tokio::test]
    async fn test_dispatch_records_recency_and_reloads() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));
        let refresher = CountingRefresher::default();

        dispatcher(&recency)
            .dispatch(&registry, DispatchRequest::new("delete"), vec![1, 2], &refresher)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["delete 1", "delete 2"]);
        assert_eq!(recency.snapshot(), vec!["delete"]);
        assert_eq!(refresher.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_menu_args_reach_handler() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));
        let refresher = CountingRefresher::default();

        let menu = &registry.lookup("open").unwrap().menus[0];
        let request = DispatchRequest::with_args("open:split", "open", menu.args_producer());
        dispatcher(&recency)
            .dispatch(&registry, request, vec![4], &refresher)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["open 4 [\"split\"]"]);
        assert_eq!(recency.snapshot(), vec!["open:split"]);
        // "open" does not reload
        assert_eq!(refresher.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_node_rejects_two_nodes() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::with_entries(["delete"]));
        let refresher = CountingRefresher::default();

        let err = dispatcher(&recency)
            .dispatch(&registry, DispatchRequest::new("open"), vec![1, 2], &refresher)
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Multiplicity { got: 2, .. }));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(recency.snapshot(), vec!["delete"]);
    }

    #[tokio::test]
    async fn test_multi_node_rejects_empty_selection() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));

        let err = dispatcher(&recency)
            .dispatch(
                &registry,
                DispatchRequest::new("delete"),
                vec![],
                &CountingRefresher::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Multiplicity { got: 0, .. }));
    }

    #[tokio::test]
    async fn test_root_ignores_nodes() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));

        dispatcher(&recency)
            .dispatch(
                &registry,
                DispatchRequest::new("collapse"),
                vec![1, 2, 3],
                &CountingRefresher::default(),
            )
            .await
            .unwrap();
        assert_eq!(recency.snapshot(), vec!["collapse"]);
    }

    #[tokio::test]
    async fn test_failed_handler_keeps_partial_effects() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));
        let refresher = CountingRefresher::default();

        let err = dispatcher(&recency)
            .dispatch(
                &registry,
                DispatchRequest::new("delete"),
                vec![1, 13, 2],
                &refresher,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Execution { ref name, .. } if name == "delete"));
        assert_eq!(err.to_string(), "action 'delete' failed");
        assert_eq!(
            std::error::Error::source(&err).unwrap().to_string(),
            "buffer 13 is modified"
        );
        // Node 1 was deleted before the failure, node 2 never ran
        assert_eq!(*log.lock().unwrap(), vec!["delete 1"]);
        assert!(recency.snapshot().is_empty());
        assert_eq!(refresher.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));

        let err = dispatcher(&recency)
            .dispatch(
                &registry,
                DispatchRequest::new("rename"),
                vec![1],
                &CountingRefresher::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction { .. }));
    }

    #[tokio::test]
    async fn test_reload_failure_after_success() {
        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));

        let err = dispatcher(&recency)
            .dispatch(&registry, DispatchRequest::new("delete"), vec![5], &FailingRefresher)
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::Reload { .. }));
        assert_eq!(recency.snapshot(), vec!["delete"]);
    }

    #[tokio::test]
    async fn test_multiplicity_checked_before_producer_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let producer = ArgsProducer::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { vec!["tab".to_string()] }
        });

        let log: Log = Arc::default();
        let registry = registry(&log);
        let recency = Arc::new(InMemoryRecencyStore::new(10));
        let request = DispatchRequest::with_args("open:tab", "open", producer);

        let result = dispatcher(&recency)
            .dispatch(&registry, request, vec![1, 2], &CountingRefresher::default())
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
