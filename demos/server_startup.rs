//! Wait for a freshly started server to answer, giving up at once if its process dies.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use waitready::prelude::*;
use waitready::telemetry::LogSink;

#[derive(Debug, thiserror::Error)]
enum ConnectError {
    #[error("connection refused on port {0}")]
    Refused(u16),
}

/// Pretend supervisor + server: refuses twice, then answers with its info document.
#[derive(Clone, Default)]
struct FakeServer {
    polls: Arc<AtomicUsize>,
}

impl FakeServer {
    async fn state(&self) -> ProcessState {
        ProcessState::with_status("running").port(9090).cmdline(["server", "--port", "9090"])
    }

    async fn info(&self, port: u16) -> Result<String, ConnectError> {
        if self.polls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(ConnectError::Refused(port))
        } else {
            Ok(format!("{{\"port\": {}, \"version\": \"1.4.0\"}}", port))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), WaitError<ConnectError>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let waiter = Waiter::builder()
        .budget(RetryBudget::from_millis(2_000, 10).expect("valid budget"))
        .label("fetch_server_info")
        .with_sink(LogSink)
        .build()
        .expect("valid waiter");

    let server = FakeServer::default();
    let info = waiter
        .wait_until_ready(|| {
            let server = server.clone();
            async move {
                let state = server.state().await;
                state.check::<ConnectError>()?;
                server.info(state.port.unwrap_or(9090)).await.transient()
            }
        })
        .await?;

    println!("server ready: {}", info);
    Ok(())
}
