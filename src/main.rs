use std::sync::Arc;

use todotron::config::{load_config, print_schema};
use todotron::startup;
use todotron::utils::logger::init_logging;

#[tokio::main]
async fn main() {
    if std::env::args().skip(1).any(|arg| arg == "--schema") {
        print_schema();
        return;
    }

    let config = load_config();
    init_logging(&config.logging);

    if let Err(e) = startup::run(Arc::new(config)).await {
        tracing::error!("Server terminated: {}", e);
        std::process::exit(1);
    }
}
