//! Render output that follows the state of asynchronous computations.
//!
//! An [`AsyncView`] observes an [`Awaitable`] value and calls its render function with
//! `None` while the value is pending, and with the value once it has resolved. Errors are
//! mapped by `catch` or raised to an [`ErrorBoundary`].
//!
//! ```
//! use await_view::{core::Runtime, AsyncView, AsyncViewProps, Computation};
//!
//! let mut rt = Runtime::new();
//! let (c, settler) = Computation::<i32, String>::pending();
//! let view = AsyncView::mount(AsyncViewProps::new(c, |v: Option<i32>| v.unwrap_or(-1)));
//! assert_eq!(view.take_output(), Some(Ok(-1)));
//!
//! settler.resolve(5);
//! rt.flush();
//! assert_eq!(view.take_output(), Some(Ok(5)));
//! ```
pub mod core;

mod boundary;
mod cache;
mod cancelable;
mod computation;
mod loader;
mod state;
mod subscription;
mod view;

pub use boundary::*;
pub use cache::*;
pub use cancelable::*;
pub use computation::*;
pub use loader::*;
pub use state::*;
pub use subscription::*;
pub use view::*;

#[cfg(test)]
mod test_helpers;
