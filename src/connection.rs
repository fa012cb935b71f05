//! Pluggable transports carrying raw calls across a boundary.
//!
//! A [`Connection`] owns the linear memory shared with its peer and
//! dispatches raw calls by function-table index. [`InProcessConnection`]
//! is the reference transport: both sides live in one process and exports
//! are invoked directly. Remote transports implement the same trait over
//! their own framing.

use crate::abi::{LinearMemory, WireValue};
use crate::bind::{BindError, CallContext, RawFn};
use crate::logging;
use crate::resource::{ResourceTables, TeardownReport};

#[cfg(feature = "async")]
use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;
#[cfg(feature = "async")]
use std::task::{Context, Poll};

/// A transport to a peer instantiation.
pub trait Connection {
    /// The linear memory shared with the peer for this boundary.
    fn memory(&mut self) -> &mut LinearMemory;

    /// Invoke the peer's exported function at `index` with raw arguments,
    /// blocking until it completes.
    fn call_raw(&mut self, index: u32, args: &[WireValue]) -> crate::Result<Vec<WireValue>>;

    /// Read bytes out of the shared linear memory.
    fn read_memory(&mut self, ptr: u32, len: u32) -> crate::Result<Vec<u8>> {
        Ok(self.memory().read(ptr, len)?.to_vec())
    }

    /// Write bytes into the shared linear memory.
    fn write_memory(&mut self, ptr: u32, bytes: &[u8]) {
        self.memory().write(ptr, bytes);
    }

    /// Begin a raw call whose completion arrives later. The default
    /// completes synchronously; remote transports override this to return
    /// a pending [`Deferred`] resolved when the response frame arrives.
    #[cfg(feature = "async")]
    fn call_raw_deferred(
        &mut self,
        index: u32,
        args: &[WireValue],
    ) -> crate::Result<Deferred<Vec<WireValue>>> {
        Ok(Deferred::ready(self.call_raw(index, args)))
    }
}

/// The eventual outcome of a deferred raw call.
#[cfg(feature = "async")]
pub struct Deferred<T> {
    rx: tokio::sync::oneshot::Receiver<crate::Result<T>>,
}

/// Completion side of a [`Deferred`], held by the transport until the
/// response arrives. Dropping it unresolved fails the call with
/// [`BindError::ConnectionClosed`].
#[cfg(feature = "async")]
pub struct DeferredCompletion<T> {
    tx: tokio::sync::oneshot::Sender<crate::Result<T>>,
}

#[cfg(feature = "async")]
impl<T> Deferred<T> {
    /// A pending deferred plus the handle that resolves it.
    pub fn pending() -> (DeferredCompletion<T>, Self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        (DeferredCompletion { tx }, Self { rx })
    }

    /// A deferred that is already resolved.
    pub fn ready(outcome: crate::Result<T>) -> Self {
        let (completion, deferred) = Self::pending();
        completion.resolve(outcome);
        deferred
    }
}

#[cfg(feature = "async")]
impl<T> DeferredCompletion<T> {
    pub fn resolve(self, outcome: crate::Result<T>) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.tx.send(outcome);
    }
}

#[cfg(feature = "async")]
impl<T> Future for Deferred<T> {
    type Output = crate::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx).poll(cx).map(|received| {
            match received {
                Ok(outcome) => outcome,
                Err(_) => Err(BindError::ConnectionClosed.into()),
            }
        })
    }
}

/// Both sides in one process: raw calls dispatch straight into a bound
/// export table over a shared memory and shared handle tables.
#[derive(Default)]
pub struct InProcessConnection {
    memory: LinearMemory,
    functions: Vec<RawFn>,
    tables: ResourceTables,
}

impl InProcessConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the peer's export table, usually from
    /// [`bind_host`](crate::bind::bind_host).
    pub fn install(&mut self, functions: Vec<RawFn>) {
        self.functions = functions;
    }

    /// The handle tables of this instantiation.
    pub fn tables(&self) -> &ResourceTables {
        &self.tables
    }

    /// Tear down the instantiation's handle tables.
    pub fn close(&mut self) -> TeardownReport {
        let report = self.tables.close_all();
        logging::debug!(
            forced_drops = report.forced_drops,
            leaked_borrows = report.leaked_borrows,
            "connection closed"
        );
        report
    }
}

impl Connection for InProcessConnection {
    fn memory(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }

    fn call_raw(&mut self, index: u32, args: &[WireValue]) -> crate::Result<Vec<WireValue>> {
        let function = self
            .functions
            .get(index as usize)
            .cloned()
            .ok_or(BindError::UnknownFunction { index })?;
        logging::trace!(index, args = args.len(), "dispatching raw call");
        let mut ctx = CallContext {
            memory: &mut self.memory,
            tables: &self.tables,
        };
        function(&mut ctx, args)
    }
}
