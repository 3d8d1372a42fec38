use std::{cell::RefCell, rc::Rc};

use derive_ex::derive_ex;


/// Intercepts errors raised by the render passes of the views mounted in it.
///
/// The first error is recorded and reported to the handler. From then on the views
/// mounted in the boundary stop rendering until [`reset`](Self::reset) is called.
#[derive_ex(Clone(bound()))]
pub struct ErrorBoundary<E>(Rc<BoundaryNode<E>>);

struct BoundaryNode<E> {
    caught: RefCell<Option<E>>,
    on_error: RefCell<Box<dyn FnMut(&E)>>,
}

impl<E: Clone + 'static> ErrorBoundary<E> {
    pub fn new(on_error: impl FnMut(&E) + 'static) -> Self {
        Self(Rc::new(BoundaryNode {
            caught: RefCell::new(None),
            on_error: RefCell::new(Box::new(on_error)),
        }))
    }

    /// Records `error` and reports it to the handler.
    ///
    /// Returns `false` without reporting if the boundary has already caught an error.
    pub fn capture(&self, error: E) -> bool {
        {
            let mut caught = self.0.caught.borrow_mut();
            if caught.is_some() {
                return false;
            }
            *caught = Some(error.clone());
        }
        (self.0.on_error.borrow_mut())(&error);
        true
    }

    pub fn has_caught(&self) -> bool {
        self.0.caught.borrow().is_some()
    }
    pub fn caught(&self) -> Option<E> {
        self.0.caught.borrow().clone()
    }

    /// Clears the caught error so that the views mounted in the boundary render again
    /// on their next render pass.
    pub fn reset(&self) -> Option<E> {
        self.0.caught.borrow_mut().take()
    }
}

impl<E: Clone + 'static> Default for ErrorBoundary<E> {
    fn default() -> Self {
        Self::new(|_| {})
    }
}
