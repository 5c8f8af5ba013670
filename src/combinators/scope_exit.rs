/// Runs an action when dropped, unless [`dismiss`](ScopeExit::dismiss) was
/// called first (§4.10, "glue combinators"). Useful for releasing a
/// resource acquired just before a fallible `.await` without duplicating
/// the cleanup on every early-return path.
pub struct ScopeExit<F: FnOnce()> {
    action: Option<F>,
}

/// Schedule `action` to run when the returned guard is dropped.
pub fn scope_exit<F: FnOnce()>(action: F) -> ScopeExit<F> {
    ScopeExit { action: Some(action) }
}

impl<F: FnOnce()> ScopeExit<F> {
    /// Cancel the scheduled action; dropping the guard afterwards does
    /// nothing.
    pub fn dismiss(mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Drop for ScopeExit<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn runs_on_drop() {
        let ran = Cell::new(false);
        {
            let _guard = scope_exit(|| ran.set(true));
        }
        assert!(ran.get());
    }

    #[test]
    fn dismiss_suppresses_the_action() {
        let ran = Cell::new(false);
        {
            let guard = scope_exit(|| ran.set(true));
            guard.dismiss();
        }
        assert!(!ran.get());
    }
}
