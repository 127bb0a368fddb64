use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// When `watch_stdin` is set the token is also cancelled once stdin reaches
/// EOF; supervised workers are stopped this way by their parent.
pub fn install_shutdown_handler(watch_stdin: bool) -> CancellationToken {
    let token = CancellationToken::new();

    tokio::spawn(wait_for_signal(token.clone()));
    if watch_stdin {
        tokio::spawn(wait_for_stdin_eof(token.clone()));
    }

    token
}

async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, finishing current job before exit");
        }
        () = terminate => {
            info!("Received terminate signal, finishing current job before exit");
        }
        () = token.cancelled() => return,
    }

    token.cancel();
}

async fn wait_for_stdin_eof(token: CancellationToken) {
    let mut stdin = tokio::io::stdin();
    let mut buf = [0u8; 64];

    loop {
        match stdin.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }

    if !token.is_cancelled() {
        info!("Supervisor closed stdin, finishing current job before exit");
        token.cancel();
    }
}
