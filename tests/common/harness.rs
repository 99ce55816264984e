// MenuTestHarness - in-process action registry, menu and dispatcher for integration tests

use async_trait::async_trait;
use canopy::actions::dispatcher::{ActionDispatcher, DispatchRequest, PanelRefresher};
use canopy::actions::error::ActionError;
use canopy::actions::menu::{MenuComposer, MenuEntry};
use canopy::actions::registry::{ActionOptions, ActionRegistry, ContextType};
use canopy::config::ModeMappings;
use canopy::events::FocusEventGate;
use canopy::input::keybindings::KeyMappingResolver;
use canopy::services::recency::{InMemoryRecencyStore, RecencyStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Handler invocations, in order
pub type CallLog = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct CountingRefresher {
    pub reloads: AtomicUsize,
}

#[async_trait]
impl PanelRefresher for CountingRefresher {
    async fn reload(&self, _context_type: &ContextType) -> anyhow::Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MenuTestHarness {
    pub registry: ActionRegistry<u32>,
    pub recency: Arc<dyn RecencyStore>,
    pub gate: Arc<FocusEventGate>,
    pub composer: MenuComposer,
    pub dispatcher: ActionDispatcher,
    pub refresher: CountingRefresher,
    pub log: CallLog,
}

impl MenuTestHarness {
    /// Harness over `registry` with an in-memory history, most recent first
    pub fn new(registry: ActionRegistry<u32>, recency: &[&str], mappings: serde_json::Value) -> Self {
        let store: Arc<dyn RecencyStore> =
            Arc::new(InMemoryRecencyStore::with_entries(recency.iter().copied()));
        Self::with_store(registry, store, mappings)
    }

    pub fn with_store(
        registry: ActionRegistry<u32>,
        recency: Arc<dyn RecencyStore>,
        mappings: serde_json::Value,
    ) -> Self {
        let mappings: HashMap<String, ModeMappings> =
            serde_json::from_value(mappings).expect("valid mappings");
        let gate = Arc::new(FocusEventGate::new());
        Self {
            composer: MenuComposer::new(
                Arc::new(KeyMappingResolver::new(&mappings)),
                Arc::clone(&recency),
                "explorer.doCodeAction",
            ),
            dispatcher: ActionDispatcher::new(Arc::clone(&recency), Arc::clone(&gate)),
            registry,
            recency,
            gate,
            refresher: CountingRefresher::default(),
            log: CallLog::default(),
        }
    }

    /// The three-action registry of [`scenario_registry`]
    pub fn scenario(recency: &[&str]) -> Self {
        let log = CallLog::default();
        let registry = scenario_registry(&log);
        let mut harness = Self::new(registry, recency, serde_json::json!({}));
        harness.log = log;
        harness
    }

    pub async fn menu(&self) -> Vec<MenuEntry> {
        self.composer.compose(Some(&self.registry)).await
    }

    pub async fn dispatch(&self, request: DispatchRequest, nodes: Vec<u32>) -> Result<(), ActionError> {
        self.dispatcher
            .dispatch(&self.registry, request, nodes, &self.refresher)
            .await
    }

    pub async fn history(&self) -> Vec<String> {
        self.recency.load().await.expect("history loads")
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

/// `expand` (multi-node), `open` (single node) and `delete` (single node, reloads),
/// each appending "<action> <node>" to `log`
pub fn scenario_registry(log: &CallLog) -> ActionRegistry<u32> {
    let mut registry = ActionRegistry::new("buffer");

    let sink = Arc::clone(log);
    registry
        .register_each_node("expand", "expand node", ActionOptions::default(), move |_, node| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(format!("expand {}", node));
                anyhow::Ok(())
            }
        })
        .unwrap();

    let sink = Arc::clone(log);
    registry
        .register_node("open", "open node", ActionOptions::default(), move |_, node| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(format!("open {}", node));
                anyhow::Ok(())
            }
        })
        .unwrap();

    let sink = Arc::clone(log);
    registry
        .register_node("delete", "delete node", ActionOptions::reload(), move |_, node| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(format!("delete {}", node));
                anyhow::Ok(())
            }
        })
        .unwrap();

    registry
}

pub fn identifiers(entries: &[MenuEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.identifier.as_str()).collect()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
