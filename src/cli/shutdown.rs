//! Translates SIGINT/SIGTERM into a cancelled stop token.
//!
//! The poll loop and page tasks observe the token at their suspension points;
//! nothing is aborted mid-request. A second signal after the stop exits at once.

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Exit code used when a second signal forces the process down.
pub const EXIT_INTERRUPTED: u8 = 130;

pub fn stop_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let signal = relay_signals(token, wait_for_signal).await;
        tracing::warn!(signal, "Second stop request, exiting without waiting for in-flight pages");
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    });
}

/// Cancel `token` on the first signal, then return the name of the next one.
///
/// A token cancelled by the run itself counts as the first stop.
pub async fn relay_signals<F, Fut>(token: CancellationToken, mut next_signal: F) -> &'static str
where
    F: FnMut() -> Fut,
    Fut: Future<Output = &'static str>,
{
    tokio::select! {
        signal = next_signal() => {
            tracing::info!(signal, "Stop requested, finishing in-flight pages. Repeat to exit now");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }

    next_signal().await
}

async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
