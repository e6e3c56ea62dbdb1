// Host cleanup closures registered by sub-demo pre-actions.
// Each runs exactly once, newest first, when the owning run tears down.

use std::fmt;

pub type CleanupFn = Box<dyn FnOnce()>;

#[derive(Default)]
pub struct CleanupRegistry {
    pending: Vec<(String, CleanupFn)>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, label: impl Into<String>, cleanup: CleanupFn) {
        self.pending.push((label.into(), cleanup));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Invoke and forget every registered cleanup. Returns how many ran.
    pub fn run_all(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        for (label, cleanup) in pending.into_iter().rev() {
            tracing::debug!(%label, "running cleanup");
            cleanup();
        }
        count
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.pending.iter().map(|(label, _)| label))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn runs_each_cleanup_once_newest_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CleanupRegistry::new();
        for name in ["open-panel", "select-row"] {
            let log = Rc::clone(&log);
            registry.register(name, Box::new(move || log.borrow_mut().push(name)));
        }
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.run_all(), 2);
        assert_eq!(registry.run_all(), 0);
        assert!(registry.is_empty());
        assert_eq!(*log.borrow(), vec!["select-row", "open-panel"]);
    }
}
