//! Floating overlay window
//!
//! Wraps a host-side floating surface. The only state kept here is the
//! auto-close timer: opening the window again, closing it or disposing it
//! cancels a pending auto-close.

use crate::host::Host;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Highlight of a column range on one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub group: String,
    pub line: usize,
    pub col_start: usize,
    pub col_end: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FloatingCreateOptions {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FloatingOpenOptions {
    pub top: u32,
    pub left: u32,
    pub width: u32,
    pub height: u32,
    /// Line to put the cursor on, 1-based
    pub focus_line_index: Option<usize>,
    pub filetype: Option<String>,
    /// Used to detect the filetype when `filetype` is not set
    pub filepath: Option<String>,
}

/// Host side of a floating window
#[async_trait]
pub trait FloatingSurface: Send + Sync + 'static {
    async fn open(
        &self,
        lines: &[String],
        highlights: &[Highlight],
        options: &FloatingOpenOptions,
    ) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;

    fn dispose(&self);
}

pub struct FloatingWindow<S: FloatingSurface> {
    surface: Arc<S>,
    name: Option<String>,
    close_timer: Mutex<Option<JoinHandle<()>>>,
}

impl<S: FloatingSurface> FloatingWindow<S> {
    pub fn create(surface: S, options: FloatingCreateOptions) -> Self {
        Self {
            surface: Arc::new(surface),
            name: options.name,
            close_timer: Mutex::new(None),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn has_pending_close(&self) -> bool {
        self.timer().as_ref().is_some_and(|task| !task.is_finished())
    }

    pub async fn open(
        &self,
        lines: &[String],
        highlights: &[Highlight],
        options: &FloatingOpenOptions,
    ) -> anyhow::Result<()> {
        self.cancel_close();
        self.surface.open(lines, highlights, options).await
    }

    /// Close the window after `delay`, replacing any pending auto-close.
    ///
    /// Must be called from within a tokio runtime.
    pub fn close_delay(&self, delay: Duration) {
        let surface = Arc::clone(&self.surface);
        let name = self.name.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = surface.close().await {
                tracing::error!("Failed to close floating window {:?}: {:#}", name, e);
            }
        });

        if let Some(previous) = self.timer().replace(task) {
            previous.abort();
        }
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.cancel_close();
        self.surface.close().await
    }

    pub fn dispose(&self) {
        self.cancel_close();
        self.surface.dispose();
    }

    fn cancel_close(&self) {
        if let Some(task) = self.timer().take() {
            task.abort();
        }
    }

    fn timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.close_timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: FloatingSurface> Drop for FloatingWindow<S> {
    fn drop(&mut self) {
        self.cancel_close();
    }
}

/// Floating surface drawn by the editor through host calls
pub struct HostSurface {
    host: Arc<dyn Host>,
    name: String,
}

impl HostSurface {
    pub fn new(host: Arc<dyn Host>, name: impl Into<String>) -> Self {
        Self {
            host,
            name: name.into(),
        }
    }
}

#[async_trait]
impl FloatingSurface for HostSurface {
    async fn open(
        &self,
        lines: &[String],
        highlights: &[Highlight],
        options: &FloatingOpenOptions,
    ) -> anyhow::Result<()> {
        let args = vec![
            serde_json::Value::String(self.name.clone()),
            serde_json::to_value(lines)?,
            serde_json::to_value(highlights)?,
            serde_json::to_value(options)?,
        ];
        self.host.call("canopy#floating#open", args).await?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        let args = vec![serde_json::Value::String(self.name.clone())];
        self.host.call("canopy#floating#close", args).await?;
        Ok(())
    }

    fn dispose(&self) {
        tracing::trace!("Disposed floating surface {}", self.name);
    }
}
