use parse_display::Display;


/// Settle state of an asynchronous computation.
///
/// Exactly one of value or error is present, determined by the variant.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum AsyncState<T, E> {
    /// No outcome yet.
    #[default]
    Pending,

    /// Settled with a value.
    Resolved(T),

    /// Settled with an error.
    Rejected(E),
}

impl<T, E> AsyncState<T, E> {
    pub fn status(&self) -> Status {
        match self {
            AsyncState::Pending => Status::Pending,
            AsyncState::Resolved(_) => Status::Resolved,
            AsyncState::Rejected(_) => Status::Rejected,
        }
    }
    pub fn is_pending(&self) -> bool {
        matches!(self, AsyncState::Pending)
    }
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    /// Returns the value, if resolved.
    pub fn value(&self) -> Option<&T> {
        match self {
            AsyncState::Resolved(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the error, if rejected.
    pub fn error(&self) -> Option<&E> {
        match self {
            AsyncState::Rejected(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> AsyncState<&T, &E> {
        match self {
            AsyncState::Pending => AsyncState::Pending,
            AsyncState::Resolved(value) => AsyncState::Resolved(value),
            AsyncState::Rejected(error) => AsyncState::Rejected(error),
        }
    }

    /// Converts a settled state into its outcome.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            AsyncState::Pending => None,
            AsyncState::Resolved(value) => Some(Ok(value)),
            AsyncState::Rejected(error) => Some(Err(error)),
        }
    }
}

impl<T, E> From<Result<T, E>> for AsyncState<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => AsyncState::Resolved(value),
            Err(error) => AsyncState::Rejected(error),
        }
    }
}

impl<T, E> From<Option<Result<T, E>>> for AsyncState<T, E> {
    fn from(outcome: Option<Result<T, E>>) -> Self {
        outcome.map_or(AsyncState::Pending, AsyncState::from)
    }
}

/// Payload-free tag of an [`AsyncState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display(style = "snake_case")]
pub enum Status {
    Pending,
    Resolved,
    Rejected,
}
