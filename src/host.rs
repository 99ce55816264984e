//! Editor host boundary
//!
//! Sources talk to the editor through [`Host`]: ex commands and function
//! calls. [`RecordingHost`] is an in-process host that keeps a log of what it
//! was asked to do; the CLI and the tests run against it.

use crate::events::{BufferId, FocusEventGate};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait Host: Send + Sync {
    /// Execute an ex command
    async fn command(&self, cmd: &str) -> anyhow::Result<()>;

    /// Call an editor function
    async fn call(&self, func: &str, args: Vec<Value>) -> anyhow::Result<Value>;
}

/// One buffer as reported by `getbufinfo`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BufferInfo {
    pub bufnr: u32,
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub windows: Vec<u32>,
}

#[derive(Default)]
struct HostState {
    commands: Vec<String>,
    calls: Vec<(String, Vec<Value>)>,
    replies: HashMap<String, Value>,
    buffers: Vec<BufferInfo>,
    /// Command prefixes that fail
    failing: Vec<String>,
    current: Option<BufferId>,
}

impl HostState {
    fn buffer_named(&self, name: &str) -> Option<BufferId> {
        self.buffers
            .iter()
            .find(|b| b.name == name)
            .map(|b| BufferId(b.bufnr))
    }

    fn buffer_in_window(&self, winid: u64) -> Option<BufferId> {
        self.buffers
            .iter()
            .find(|b| b.windows.iter().any(|id| u64::from(*id) == winid))
            .map(|b| BufferId(b.bufnr))
    }
}

/// Host that records commands and answers calls from canned replies.
///
/// When connected to a [`FocusEventGate`], buffer-switching commands and
/// `win_gotoid` fire a focus event the way a real editor would.
#[derive(Default)]
pub struct RecordingHost {
    state: Mutex<HostState>,
    gate: Option<Arc<FocusEventGate>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gate(gate: Arc<FocusEventGate>) -> Self {
        Self {
            state: Mutex::default(),
            gate: Some(gate),
        }
    }

    pub fn with_buffers(self, buffers: Vec<BufferInfo>) -> Self {
        self.state().buffers = buffers;
        self
    }

    /// Answer calls to `func` with `reply`
    pub fn reply(&self, func: impl Into<String>, reply: Value) {
        self.state().replies.insert(func.into(), reply);
    }

    /// Make every command starting with `prefix` fail
    pub fn fail_commands(&self, prefix: impl Into<String>) {
        self.state().failing.push(prefix.into());
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.state().calls.clone()
    }

    pub fn buffers(&self) -> Vec<BufferInfo> {
        self.state().buffers.clone()
    }

    pub fn current_buffer(&self) -> Option<BufferId> {
        self.state().current
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fire_focus(&self, bufnr: Option<BufferId>) {
        if let (Some(gate), Some(bufnr)) = (&self.gate, bufnr) {
            gate.fire(bufnr);
        }
    }
}

/// Buffer a command switches to, if it switches at all
fn switched_buffer(cmd: &str) -> Option<u32> {
    let mut words = cmd.split_whitespace();
    let verb = match words.next()? {
        "vertical" | "tab" => words.next()?,
        verb => verb,
    };
    match verb {
        "buffer" | "sbuffer" => words.next()?.parse().ok(),
        _ => None,
    }
}

/// File a `tabe` command opens, unescaped
fn tab_edit_target(cmd: &str) -> Option<String> {
    let name = cmd.strip_prefix("tabe ")?.trim();
    Some(name.replace("\\ ", " "))
}

/// `N wincmd w` style commands move focus without naming a buffer
fn is_window_switch(cmd: &str) -> bool {
    cmd.split_whitespace()
        .next()
        .is_some_and(|word| word.trim_start_matches(|c: char| c.is_ascii_digit()) == "wincmd")
}

#[async_trait]
impl Host for RecordingHost {
    async fn command(&self, cmd: &str) -> anyhow::Result<()> {
        let focus = {
            let mut state = self.state();
            state.commands.push(cmd.to_string());
            if state.failing.iter().any(|prefix| cmd.starts_with(prefix)) {
                anyhow::bail!("command failed: {}", cmd);
            }

            if let Some(bufnr) = switched_buffer(cmd) {
                state.current = Some(BufferId(bufnr));
                state.current
            } else if let Some(bufnr) = cmd
                .strip_prefix("bdelete ")
                .or_else(|| cmd.strip_prefix("bwipeout "))
                .and_then(|n| n.trim().parse::<u32>().ok())
            {
                state.buffers.retain(|b| b.bufnr != bufnr);
                None
            } else if let Some(name) = tab_edit_target(cmd) {
                if let Some(bufnr) = state.buffer_named(&name) {
                    state.current = Some(bufnr);
                }
                state.current
            } else if is_window_switch(cmd) {
                state.current
            } else {
                None
            }
        };

        tracing::trace!("host command: {}", cmd);
        self.fire_focus(focus);
        Ok(())
    }

    async fn call(&self, func: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let (reply, focus) = {
            let mut state = self.state();
            state.calls.push((func.to_string(), args.clone()));

            if let Some(reply) = state.replies.get(func) {
                return Ok(reply.clone());
            }

            match func {
                "getbufinfo" => {
                    let wanted = args.first().and_then(Value::as_u64);
                    let buffers: Vec<&BufferInfo> = state
                        .buffers
                        .iter()
                        .filter(|b| wanted.map_or(true, |n| u64::from(b.bufnr) == n))
                        .collect();
                    (serde_json::to_value(buffers)?, None)
                }
                "fnameescape" => {
                    let name = args.first().and_then(Value::as_str).unwrap_or_default();
                    (Value::String(name.replace(' ', "\\ ")), None)
                }
                // Returns 1 when the window exists, like the editor does
                "win_gotoid" => {
                    let target = args
                        .first()
                        .and_then(Value::as_u64)
                        .and_then(|winid| state.buffer_in_window(winid));
                    if target.is_some() {
                        state.current = target;
                    }
                    (Value::from(u8::from(target.is_some())), target)
                }
                _ => (Value::Null, None),
            }
        };

        tracing::trace!("host call: {}", func);
        self.fire_focus(focus);
        Ok(reply)
    }
}
