use std::{cell::Cell, error::Error, fmt, rc::Rc};

use parse_display::Display;

use crate::{Computation, Subscription};


/// Failure of a [`Cancelable`] observable.
///
/// `Canceled` is not a real error: it means the observation was abandoned and must not
/// be displayed or forwarded to an error handler.
#[derive(Clone, Debug, PartialEq, Eq, Display)]
pub enum Interrupted<E> {
    #[display("canceled")]
    Canceled,
    #[display("{0}")]
    Rejected(E),
}

impl<E> Interrupted<E> {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Interrupted::Canceled)
    }

    /// Returns the error of the wrapped computation, or `None` if canceled.
    pub fn into_rejection(self) -> Option<E> {
        match self {
            Interrupted::Canceled => None,
            Interrupted::Rejected(error) => Some(error),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> Error for Interrupted<E> {}

/// Set-once cancellation flag.
#[derive(Debug, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as canceled.
    ///
    /// Returns `true` on the first call only.
    pub fn cancel(&self) -> bool {
        !self.0.replace(true)
    }
    pub fn is_canceled(&self) -> bool {
        self.0.get()
    }
}

/// A computation wrapper whose outcome can be replaced by [`Interrupted::Canceled`].
///
/// The observable settles when the wrapped computation does. If [`cancel`](Self::cancel)
/// was called before that, it rejects with [`Interrupted::Canceled`] whatever the real
/// outcome was. Cancellation does not stop the wrapped computation.
///
/// Dropping the wrapper detaches it from the wrapped computation; the observable then
/// never settles.
pub struct Cancelable<T, E> {
    observable: Computation<T, Interrupted<E>>,
    token: CancelToken,
    _source: Subscription,
}

impl<T, E> Cancelable<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn wrap(computation: &Computation<T, E>) -> Self {
        let token = CancelToken::new();
        let (observable, settler) = Computation::pending();
        let canceled = token.0.clone();
        let source = computation.on_settle(move |outcome| {
            let outcome = if canceled.get() {
                Err(Interrupted::Canceled)
            } else {
                outcome.map_err(Interrupted::Rejected)
            };
            settler.settle(outcome);
        });
        Self {
            observable,
            token,
            _source: source,
        }
    }
}

impl<T, E> Cancelable<T, E> {
    pub fn observable(&self) -> &Computation<T, Interrupted<E>> {
        &self.observable
    }

    /// Cancels the observation. Calling it more than once has no further effect.
    ///
    /// Returns `true` on the first call only.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }
    pub fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}
