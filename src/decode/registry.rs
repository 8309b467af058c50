use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use super::{LuaInterpreter, PacketInterpreter, Utf8Interpreter};

/// Owns the single active semantic interpreter and performs atomic swaps.
///
/// All transports read through [`current`](Self::current); the registry is
/// the sole mutator. A decode call in flight at swap time completes against
/// the instance it started with: swapping replaces the shared `Arc`, never
/// fields of a live interpreter.
pub struct InterpreterRegistry {
    active: RwLock<Arc<dyn PacketInterpreter>>,
}

impl InterpreterRegistry {
    /// A registry starting with the built-in UTF-8 passthrough interpreter.
    pub fn new() -> Self {
        Self::with_interpreter(Arc::new(Utf8Interpreter))
    }

    pub fn with_interpreter(interpreter: Arc<dyn PacketInterpreter>) -> Self {
        Self {
            active: RwLock::new(interpreter),
        }
    }

    /// The interpreter to use for one decode call.
    pub fn current(&self) -> Arc<dyn PacketInterpreter> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Atomically replace the active interpreter.
    pub fn install(&self, interpreter: Arc<dyn PacketInterpreter>) {
        *self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = interpreter;
        log::info!("Installed new packet interpreter");
    }

    /// Rebuild the interpreter from the current content of a script file.
    ///
    /// On failure the previous interpreter stays active and the error is
    /// logged; reload problems never propagate into the transports.
    pub fn reload_from_file(&self, path: &Path) {
        match LuaInterpreter::from_file(path) {
            Ok(interpreter) => {
                self.install(Arc::new(interpreter));
                log::info!("Reloaded packet interpreter from {}", path.display());
            }
            Err(e) => {
                log::error!("Interpreter reload failed, keeping previous: {e}");
            }
        }
    }

    /// Consume reload signals until the sending side is dropped.
    ///
    /// Each signal names the script file to rebuild from; the sender is the
    /// reload trigger, either a [`ScriptWatcher`](super::ScriptWatcher) or
    /// the embedding application directly.
    pub fn spawn_reload_task(
        self: Arc<Self>,
        mut signals: mpsc::UnboundedReceiver<PathBuf>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(path) = signals.recv().await {
                self.reload_from_file(&path);
            }
            log::debug!("Reload channel closed; reload task exiting");
        })
    }
}

impl Default for InterpreterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
