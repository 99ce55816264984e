use crate::actions::registry::{ContextType, Multiplicity};

/// Errors raised while registering or dispatching actions
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Same name registered twice for one context type; a setup bug
    #[error("action '{name}' is already registered for '{context_type}'")]
    DuplicateAction {
        name: String,
        context_type: ContextType,
    },

    #[error("action '{name}' is not registered for '{context_type}'")]
    UnknownAction {
        name: String,
        context_type: ContextType,
    },

    #[error("no active source to run '{name}' against")]
    NoActiveSource { name: String },

    /// Wrong number of target nodes selected
    #[error("action '{name}' expects {expected}, but {got} node(s) were selected")]
    Multiplicity {
        name: String,
        expected: Multiplicity,
        got: usize,
    },

    /// The handler failed; its side effects are not rolled back
    #[error("action '{name}' failed")]
    Execution {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("reloading '{context_type}' after '{name}' failed")]
    Reload {
        name: String,
        context_type: ContextType,
        #[source]
        source: anyhow::Error,
    },
}

impl ActionError {
    /// Errors caused by the user's selection rather than by a bug or the host
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Multiplicity { .. } | Self::NoActiveSource { .. } | Self::Execution { .. }
        )
    }
}
