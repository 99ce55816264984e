//! Contextual actions: registration, menu composition and dispatch

pub mod dispatcher;
pub mod error;
pub mod menu;
pub mod registry;

pub use dispatcher::{ActionContext, ActionDispatcher, DispatchRequest, PanelRefresher};
pub use error::ActionError;
pub use menu::{MenuComposer, MenuEntry, ACTION_MENU};
pub use registry::{
    Action, ActionHandler, ActionOptions, ActionRegistry, ActionSet, ArgsProducer, ContextType,
    MenuSpec, Multiplicity,
};
