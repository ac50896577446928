//! The text target of the in-flight search.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Accumulates the result text of one action at a time.
///
/// Writes that mutate the text on behalf of an action carry that action's
/// cancellation token and are refused once it has fired. The check happens
/// under the buffer's lock, so after the token is cancelled and the buffer
/// cleared nothing from the old action can land.
#[derive(Clone)]
pub struct ResultBuffer {
    text: Arc<watch::Sender<String>>,
}

impl ResultBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(String::new());
        Self { text: Arc::new(tx) }
    }

    /// Empty the buffer.
    pub fn clear(&self) {
        self.text.send_if_modified(|text| {
            let changed = !text.is_empty();
            text.clear();
            changed
        });
    }

    /// Append a fragment unless `cancel` has fired. Returns whether it landed.
    pub fn append(&self, cancel: &CancellationToken, fragment: &str) -> bool {
        let mut landed = false;
        self.text.send_if_modified(|text| {
            if cancel.is_cancelled() || fragment.is_empty() {
                return false;
            }
            text.push_str(fragment);
            landed = true;
            true
        });
        landed
    }

    /// Replace the whole text unless `cancel` has fired.
    pub fn replace(&self, cancel: &CancellationToken, content: &str) -> bool {
        let mut landed = false;
        self.text.send_if_modified(|text| {
            if cancel.is_cancelled() {
                return false;
            }
            text.clear();
            text.push_str(content);
            landed = true;
            true
        });
        landed
    }

    /// Copy of the current text.
    pub fn snapshot(&self) -> String {
        self.text.borrow().clone()
    }

    /// Watch the text; every successful write notifies.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.text.subscribe()
    }
}

impl Default for ResultBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultBuffer")
            .field("len", &self.text.borrow().len())
            .finish()
    }
}
