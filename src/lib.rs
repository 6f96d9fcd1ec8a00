pub mod client;
pub mod config;
pub mod observer;
pub mod retry;
pub mod server;

use config::{ClientConfig, ServerConfig};

/// In order to let the integration tests use the fileapp crate and start
/// the directory server directly, a function is opened to replace the
/// main function.
///
/// The dispatcher runs until the process is interrupted; ctrl-c closes
/// the socket and returns cleanly.
pub async fn server_main(config: ServerConfig) -> anyhow::Result<()> {
    let server = server::Server::bind(&config).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("server socket closed.");
            Ok(())
        }
    }
}

/// Register with the directory server and run the interactive client
/// until `exit`, a fatal socket error, or an unanswered deregistration.
pub async fn client_main(config: ClientConfig) -> anyhow::Result<()> {
    client::run(config).await
}
