//! OS signal translation.

use std::io;

use tokio::sync::mpsc;

/// Shutdown request delivered to [`super::serve_with_signals`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT or SIGTERM: stop accepting and drain, bounded by the grace period.
    Interrupt,
    /// SIGQUIT: stop without waiting for in-flight requests.
    Quit,
}

/// Forward process signals into a channel.
///
/// Must be called from inside a Tokio runtime.
pub fn listen() -> io::Result<mpsc::UnboundedReceiver<ShutdownSignal>> {
    let (tx, rx) = mpsc::unbounded_channel();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut quit = signal(SignalKind::quit())?;

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
                    Some(()) = terminate.recv() => ShutdownSignal::Interrupt,
                    Some(()) = quit.recv() => ShutdownSignal::Quit,
                    else => break,
                };
                if tx.send(received).is_err() {
                    break;
                }
            }
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(ShutdownSignal::Interrupt).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

/// Next signal; pends forever once the sender is gone.
pub(super) async fn next(signals: &mut mpsc::UnboundedReceiver<ShutdownSignal>) -> ShutdownSignal {
    match signals.recv().await {
        Some(signal) => signal,
        None => std::future::pending().await,
    }
}
