//! Integer handles for [`Completion`]s held by a chooser that lives outside
//! of Rust (such as the Java activity).

use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, warn};

use crate::error::SelectionError;
use crate::rendezvous::Completion;

#[derive(Debug)]
struct TokenTable {
    next: i64,
    pending: HashMap<i64, Completion>,
    closed: bool,
}

/// Parks completions behind non-zero tokens until the chooser hands them back.
///
/// Each token resolves at most once: taking a token that was already taken
/// (or never issued) yields `None`. Closing the table dismisses every
/// completion still parked and rejects new ones, so a chooser that goes away
/// can't leave a caller blocked.
#[derive(Debug)]
pub struct CompletionTokens {
    table: Mutex<TokenTable>,
}

impl Default for CompletionTokens {
    fn default() -> Self {
        Self {
            table: Mutex::new(TokenTable {
                next: 1,
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }
}

impl CompletionTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `completion` and returns the token that identifies it.
    ///
    /// # Errors
    ///
    /// [`SelectionError::DispatcherUnavailable`] once the table is closed
    pub fn park(&self, completion: Completion) -> Result<i64, SelectionError> {
        let mut table = self.table.lock().unwrap();
        if table.closed {
            return Err(SelectionError::DispatcherUnavailable(
                "file chooser host is gone".to_string(),
            ));
        }
        let token = table.next;
        table.next = table.next.checked_add(1).unwrap_or(1);
        table.pending.insert(token, completion);
        Ok(token)
    }

    /// Takes back the completion for `token`, if it is still outstanding
    pub fn take(&self, token: i64) -> Option<Completion> {
        let completion = self.table.lock().unwrap().pending.remove(&token);
        if completion.is_none() {
            warn!("Ignoring unknown or already used chooser token {token}");
        }
        completion
    }

    /// Number of completions still waiting for their chooser
    pub fn outstanding(&self) -> usize {
        self.table.lock().unwrap().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.table.lock().unwrap().closed
    }

    /// Rejects further tokens and dismisses every outstanding completion.
    ///
    /// Returns how many completions were dismissed.
    pub fn close(&self) -> usize {
        let pending: Vec<Completion> = {
            let mut table = self.table.lock().unwrap();
            table.closed = true;
            table.pending.drain().map(|(_, completion)| completion).collect()
        };
        let dismissed = pending.len();
        for completion in pending {
            completion.dismiss();
        }
        if dismissed > 0 {
            debug!("Dismissed {dismissed} outstanding file chooser(s)");
        }
        dismissed
    }
}
