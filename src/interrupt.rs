//! Interrupt handling
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) stop the host the same way a closed
//! stdin does: the loop stops taking requests, logs its shutdown and returns,
//! so the log sink gets flushed on the way out. A conversion in flight has its
//! child killed and is answered as failed.
//!
//! [`Interrupt`] is the shared stop flag. Async code awaits
//! [`Interrupt::triggered`]; the blocking host loop selects on a
//! [`Interrupt::wake_channel`].

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::watch;

/// Shared stop flag, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: watch::Sender<bool>,
    wakers: Mutex<Vec<Sender<()>>>,
}

impl Default for Inner {
    fn default() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            wakers: Mutex::new(Vec::new()),
        }
    }
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Idempotent.
    pub fn trigger(&self) {
        let was_set = self.inner.state.send_replace(true);
        if was_set {
            return;
        }
        let wakers = self.inner.wakers.lock().unwrap_or_else(PoisonError::into_inner);
        for waker in wakers.iter() {
            let _ = waker.try_send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Resolves once the flag is raised.
    pub async fn triggered(&self) {
        let mut state = self.inner.state.subscribe();
        // The sender lives in `self`, so this only returns once the flag is set
        let _ = state.wait_for(|raised| *raised).await;
    }

    /// A channel that becomes ready once the flag is raised.
    pub fn wake_channel(&self) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        let mut wakers = self.inner.wakers.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_triggered() {
            let _ = tx.try_send(());
        }
        wakers.push(tx);
        rx
    }
}

/// Raise `interrupt` when the process receives SIGINT or SIGTERM.
///
/// Handlers are registered before this returns, so from then on those
/// signals no longer terminate the process. Waiting happens on a dedicated
/// thread that logs through the caller's current dispatcher.
pub fn listen_for_signals(interrupt: Interrupt) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;
    let signals = {
        let _entered = runtime.enter();
        Signals::register()?
    };
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());

    thread::Builder::new()
        .name("signal-listener".to_string())
        .spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                let name = runtime.block_on(signals.recv());
                tracing::info!(signal = name, "Received signal");
                interrupt.trigger();
            })
        })?;
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct Signals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(not(unix))]
impl Signals {
    fn register() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    async fn recv(mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "CTRL_C"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // TEST260: A fresh flag is down and raising it is visible to every clone
    #[test]
    fn test260_trigger_is_shared() {
        let interrupt = Interrupt::new();
        let other = interrupt.clone();
        assert!(!other.is_triggered());

        interrupt.trigger();
        interrupt.trigger();

        assert!(other.is_triggered());
    }

    // TEST261: Wake channels fire on trigger, including ones opened afterwards
    #[test]
    fn test261_wake_channels() {
        let interrupt = Interrupt::new();
        let early = interrupt.wake_channel();
        assert!(early.try_recv().is_err());

        let trigger = interrupt.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        early
            .recv_timeout(Duration::from_secs(5))
            .expect("wake channel should fire");
        handle.join().unwrap();

        let late = interrupt.wake_channel();
        assert!(late.try_recv().is_ok());
    }

    // TEST262: triggered() resolves once the flag is raised from another thread
    #[test]
    fn test262_async_wait() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let interrupt = Interrupt::new();

        let trigger = interrupt.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });

        let waited = runtime.block_on(async { tokio::time::timeout(Duration::from_secs(5), interrupt.triggered()).await });
        assert!(waited.is_ok(), "triggered() never resolved");

        // Already raised: resolves immediately
        runtime.block_on(interrupt.triggered());
    }
}
