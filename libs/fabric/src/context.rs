//! Per-call options and the call context threaded through both sides.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

use crate::error::Error;
use courier_core::Request;

/// Explicit per-call options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Send the request and do not wait for a response
    pub oneway: bool,
    /// Absolute point in time after which the caller stops waiting
    pub deadline: Option<SystemTime>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    pub fn deadline(mut self, at: SystemTime) -> Self {
        self.deadline = Some(at);
        self
    }

    pub fn timeout(self, after: Duration) -> Self {
        self.deadline(SystemTime::now() + after)
    }
}

/// Cancellation signal observed by a [`CallContext`]
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. Never resolves if the handle is dropped first.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Owner side of a [`CancellationToken`]
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Carrier of a call's options and cancellation signal
///
/// On the client it bounds how long the caller waits; on the server it is
/// rebuilt from the request meta and handed to the method.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    options: CallOptions,
    cancel: Option<CancellationToken>,
}

impl CallContext {
    pub fn new(options: CallOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    /// No deadline, not oneway, never cancelled
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(after: Duration) -> Self {
        Self::new(CallOptions::new().timeout(after))
    }

    pub fn oneway() -> Self {
        Self::new(CallOptions::new().oneway())
    }

    /// Rebuild the context a client attached to `request`
    pub fn from_request(request: &Request) -> Self {
        Self::new(CallOptions {
            oneway: request.is_oneway(),
            deadline: request.deadline(),
        })
    }

    /// Attach a cancellation token, returning the handle that fires it
    pub fn with_cancellation(mut self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        self.cancel = Some(CancellationToken { rx });
        (self, CancelHandle { tx: Arc::new(tx) })
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    pub fn deadline(&self) -> Option<SystemTime> {
        self.options.deadline
    }

    pub fn is_oneway(&self) -> bool {
        self.options.oneway
    }

    /// Why the context has already finished, if it has
    pub fn err(&self) -> Option<Error> {
        if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Some(Error::Cancelled);
        }
        match self.options.deadline {
            Some(at) if at <= SystemTime::now() => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves with the reason once the deadline passes or the call is
    /// cancelled. Pending forever for a background context.
    pub async fn done(&self) -> Error {
        let deadline = async {
            match self.options.deadline {
                Some(at) => {
                    let remaining = at
                        .duration_since(SystemTime::now())
                        .unwrap_or(Duration::ZERO);
                    tokio::time::sleep(remaining).await;
                    Error::DeadlineExceeded
                }
                None => std::future::pending().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => {
                    token.cancelled().await;
                    Error::Cancelled
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            err = cancelled => err,
            err = deadline => err,
        }
    }
}
