//! Human-readable progress messages for the UI shell.
//!
//! Sinks are fire-and-forget. Anything that looks like an internal error is
//! replaced with a generic line before it reaches the sink; the full error is
//! logged and returned to the caller instead.

use std::sync::Arc;

use crate::error::WalletError;

/// Callback receiving status lines.
pub type StatusSink = Arc<dyn Fn(&str) + Send + Sync>;

const ERROR_MARKERS: [&str; 2] = ["error:", "failed:"];

pub const TRANSACTION_FAILED: &str = "Transaction failed";
pub const SIGN_IN_FAILED: &str = "Sign-in failed";

/// Rewrite a status line that leaks error detail.
pub fn scrub_status(message: &str) -> &str {
    scrub_with(message, TRANSACTION_FAILED)
}

fn scrub_with<'a>(message: &'a str, replacement: &'a str) -> &'a str {
    let lower = message.to_ascii_lowercase();
    if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        replacement
    } else {
        message
    }
}

/// Emits scrubbed status lines to an optional sink.
#[derive(Clone)]
pub struct StatusNarrator {
    sink: Option<StatusSink>,
    failure_text: &'static str,
}

impl StatusNarrator {
    pub fn for_transactions(sink: Option<StatusSink>) -> Self {
        Self {
            sink,
            failure_text: TRANSACTION_FAILED,
        }
    }

    pub fn for_login(sink: Option<StatusSink>) -> Self {
        Self {
            sink,
            failure_text: SIGN_IN_FAILED,
        }
    }

    pub fn emit(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink(scrub_with(message, self.failure_text));
        }
    }

    /// Log `err` in full and narrate a scrubbed failure line.
    pub fn fail(&self, err: &WalletError) {
        tracing::error!(error = %err, "operation failed");
        self.emit(&format!("Error: {err}"));
    }
}
