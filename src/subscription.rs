use std::mem::take;


/// Handle of a registered completion listener.
///
/// Dropping the handle detaches the listener: a callback that has not run yet will never run.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }

    /// Combines two handles into one that detaches both.
    pub fn join(self, other: Subscription) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Subscription::from_fn(move || {
            drop(self);
            drop(other);
        })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.0, RawSubscription::Empty)
    }
}
impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
}
