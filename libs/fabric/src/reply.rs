use crate::error::{Error, Result};

/// Outcome of a remote call, allowing a value and an error at the same time
///
/// A method may return a partial result together with a business error;
/// both travel back to the caller. On the client `error` also carries
/// transport and context failures.
#[derive(Debug)]
pub struct Reply<T> {
    pub value: Option<T>,
    pub error: Option<Error>,
}

impl<T> Reply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    pub fn err(error: Error) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    /// A value that is still worth returning alongside an error
    pub fn partial(value: T, error: Error) -> Self {
        Self {
            value: Some(value),
            error: Some(error),
        }
    }

    /// Neither a value nor an error
    pub fn empty() -> Self {
        Self {
            value: None,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Collapse into a `Result`, letting the error win over a partial value
    pub fn into_result(self) -> Result<Option<T>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

impl<T> From<Result<T>> for Reply<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(error) => Self::err(error),
        }
    }
}
