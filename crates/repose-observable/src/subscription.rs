/// RAII guard for a handler registered on a [`ChangeSignal`](crate::ChangeSignal).
///
/// Dropping the guard unsubscribes. The teardown closure runs at most once.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription(Option<Box<dyn FnOnce()>>);

impl Subscription {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(teardown)))
    }

    /// A guard that owns nothing.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Unsubscribes now instead of on drop.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    /// Keeps the handler registered for the lifetime of the signal.
    pub fn forget(mut self) {
        self.0.take();
    }

    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    fn run(&mut self) {
        if let Some(f) = self.0.take() {
            f()
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Subscription").field(&self.is_active()).finish()
    }
}
