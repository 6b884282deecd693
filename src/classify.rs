use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;

/// Declares which kinds an error belongs to.
///
/// `is_a` must return true for the error's own kind and for every broader kind it
/// belongs to, so that retrying on a broad kind also covers its narrower members,
/// and excluding a broad kind also excludes them.
///
/// # Example
///
/// ```rust
/// use retry_helper::ErrorClass;
///
/// #[derive(PartialEq)]
/// enum Kind {
///     Network,
///     Timeout,
/// }
///
/// enum FetchError {
///     Timeout,
///     Refused,
/// }
///
/// impl ErrorClass<Kind> for FetchError {
///     fn is_a(&self, kind: &Kind) -> bool {
///         match self {
///             FetchError::Timeout => matches!(kind, Kind::Timeout | Kind::Network),
///             FetchError::Refused => *kind == Kind::Network,
///         }
///     }
/// }
///
/// assert!(FetchError::Timeout.is_a(&Kind::Network));
/// assert!(!FetchError::Refused.is_a(&Kind::Timeout));
/// ```
pub trait ErrorClass<K> {
    fn is_a(&self, kind: &K) -> bool;

    /// Class reported in retry events. `matched` is the first listed kind the error
    /// belongs to, when there is one.
    fn class_name(&self, matched: Option<&K>) -> &'static str {
        let _ = matched;
        type_name::<Self>()
    }
}

/// Matches an [`anyhow::Error`] holding a concrete error type.
///
/// The error matches when it, or any error in its context and source chain, is a `T`.
#[derive(Clone, Copy)]
pub struct ErrorType {
    name: &'static str,
    matches: fn(&anyhow::Error) -> bool,
}

impl ErrorType {
    pub fn of<T>() -> Self
    where
        T: StdError + 'static,
    {
        Self {
            name: type_name::<T>(),
            matches: chain_contains::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ErrorType").field(&self.name).finish()
    }
}

impl ErrorClass<ErrorType> for anyhow::Error {
    fn is_a(&self, kind: &ErrorType) -> bool {
        (kind.matches)(self)
    }

    fn class_name(&self, matched: Option<&ErrorType>) -> &'static str {
        matched.map_or(type_name::<Self>(), ErrorType::name)
    }
}

fn chain_contains<T: StdError + 'static>(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<T>())
}
