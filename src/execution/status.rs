//! Continuously updated, human-readable run status.

use parking_lot::RwLock;
use std::sync::Arc;

/// Prefix marking a status line as an error.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Shared status string. The worker writes progress, the completion summary or
/// error text; any thread may read it at any time.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    message: Arc<RwLock<String>>,
}

impl StatusBoard {
    /// Board showing `"Idle"`.
    pub fn new() -> Self {
        Self {
            message: Arc::new(RwLock::new("Idle".to_string())),
        }
    }

    /// Replace the message.
    pub fn set(&self, message: impl Into<String>) {
        *self.message.write() = message.into();
    }

    /// Replace the message with an error line.
    pub fn set_error(&self, message: impl AsRef<str>) {
        *self.message.write() = format!("{ERROR_PREFIX}{}", message.as_ref());
    }

    /// Current message.
    pub fn get(&self) -> String {
        self.message.read().clone()
    }

    /// Whether the current message is an error line.
    pub fn is_error(&self) -> bool {
        self.message.read().starts_with(ERROR_PREFIX)
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_lines_are_marked() {
        let board = StatusBoard::new();
        assert_eq!(board.get(), "Idle");
        let reader = board.clone();
        board.set_error("set_voltage failed");
        assert!(reader.is_error());
        assert_eq!(reader.get(), "ERROR: set_voltage failed");
        board.set("Running");
        assert!(!reader.is_error());
    }
}
