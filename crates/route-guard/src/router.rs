//! Router abstraction and an in-memory implementation.

use parking_lot::Mutex;
use std::fmt;

/// The part of a client-side router the guard needs.
pub trait Router: Send + Sync {
    /// Full current path, including any query string.
    fn current_path(&self) -> String;

    /// Navigate to `to`, replacing the current history entry.
    fn replace(&self, to: &str);
}

/// How a navigation changed the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    Push,
    Replace,
}

/// A navigation performed on a [`MemoryRouter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub kind: NavigationKind,
    pub from: String,
    pub to: String,
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            NavigationKind::Push => "push",
            NavigationKind::Replace => "replace",
        };
        write!(f, "{} {} -> {}", verb, self.from, self.to)
    }
}

struct History {
    entries: Vec<String>,
    log: Vec<Navigation>,
}

impl History {
    fn current(&self) -> &str {
        self.entries.last().map(String::as_str).unwrap_or("/")
    }
}

/// History stack kept in memory.
pub struct MemoryRouter {
    history: Mutex<History>,
}

impl MemoryRouter {
    pub fn new(initial_path: impl Into<String>) -> Self {
        Self {
            history: Mutex::new(History {
                entries: vec![initial_path.into()],
                log: Vec::new(),
            }),
        }
    }

    /// Navigate to `to`, adding a history entry.
    pub fn push(&self, to: &str) {
        let mut history = self.history.lock();
        let from = history.current().to_string();
        history.entries.push(to.to_string());
        history.log.push(Navigation {
            kind: NavigationKind::Push,
            from,
            to: to.to_string(),
        });
    }

    /// Number of history entries.
    pub fn history_len(&self) -> usize {
        self.history.lock().entries.len()
    }

    /// Every navigation so far, oldest first.
    pub fn navigations(&self) -> Vec<Navigation> {
        self.history.lock().log.clone()
    }

    /// Only the replace navigations.
    pub fn replacements(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .log
            .iter()
            .filter(|n| n.kind == NavigationKind::Replace)
            .cloned()
            .collect()
    }
}

impl Default for MemoryRouter {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Router for MemoryRouter {
    fn current_path(&self) -> String {
        self.history.lock().current().to_string()
    }

    fn replace(&self, to: &str) {
        let mut history = self.history.lock();
        let from = history.current().to_string();
        history.entries.pop();
        history.entries.push(to.to_string());
        history.log.push(Navigation {
            kind: NavigationKind::Replace,
            from,
            to: to.to_string(),
        });
    }
}
