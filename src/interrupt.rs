// Ctrl-C handling for the blocking client.
//
// One process-wide handler flips a shared flag. The stream reader checks
// it between lines and the session loop checks it after every turn, so a
// Ctrl-C during a request ends the session with a farewell instead of
// killing the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the process Ctrl-C handler. Can only be done once per process.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let flag = Self::new();
        let handler_flag = flag.clone();
        ctrlc::set_handler(move || handler_flag.trigger())?;
        Ok(flag)
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Read and reset the flag.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
