#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use fileapp::config::{Config, Mode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    simple_logger::init_with_level(config.log_level.as_level())?;

    match config.mode {
        Mode::Server(server) => fileapp::server_main(server).await,
        Mode::Client(client) => fileapp::client_main(client).await,
    }
}
