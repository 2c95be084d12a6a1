use tokio::signal::unix::{signal, SignalKind};

/// Shutdown event handler.
pub struct Shutdown {}

impl Shutdown {
    /// Wait until the process receives a shutdown signal: INT or TERM.
    pub async fn wait() -> SignalKind {
        let mut term = signal(SignalKind::terminate()).expect("to listen on SIGTERM");
        let mut int = signal(SignalKind::interrupt()).expect("to listen on SIGINT");
        tokio::select! {
            _ = term.recv() => SignalKind::terminate(),
            _ = int.recv() => SignalKind::interrupt(),
        }
    }
}
