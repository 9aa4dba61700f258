//! Cooperative cancellation on process signals. The first signal cancels the
//! run token so the pipeline stops admitting assets and drains what is in
//! flight; a second signal gives up on draining and exits with code 130.

use tokio_util::sync::CancellationToken;

/// Spawn the signal watcher and hand back the token the pipeline observes.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn(watch_signals(token.clone()));
    token
}

async fn watch_signals(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {e}");
                return;
            }
        };
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Cannot listen for SIGHUP: {e}");
                return;
            }
        };

        let mut draining = false;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
                _ = sighup.recv() => {}
            }
            handle_signal(&token, &mut draining);
        }
    }

    #[cfg(not(unix))]
    {
        let mut draining = false;
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::error!("Cannot listen for Ctrl+C");
                return;
            }
            handle_signal(&token, &mut draining);
        }
    }
}

fn handle_signal(token: &CancellationToken, draining: &mut bool) {
    if *draining {
        tracing::warn!("Second signal, exiting without draining");
        std::process::exit(130);
    }
    *draining = true;
    tracing::info!("Shutdown requested; draining in-flight assets (signal again to exit now)");
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn installed_token_starts_uncancelled() {
        // Real signal delivery would hit every test in the binary; only the
        // token wiring is checked here.
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn first_signal_cancels_second_would_exit() {
        let token = CancellationToken::new();
        let mut draining = false;
        handle_signal(&token, &mut draining);
        assert!(token.is_cancelled());
        assert!(draining);
    }

    #[test]
    fn pipeline_handle_observes_the_cancel() {
        let token = CancellationToken::new();
        let handle = token.clone();
        let mut draining = false;
        handle_signal(&token, &mut draining);
        assert!(handle.is_cancelled());
    }
}
