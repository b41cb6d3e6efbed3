use cors_static_server::config::Config;
use cors_static_server::logger;
use cors_static_server::server::{signal, Server, Shutdown};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load()?;
    logger::init(&cfg)?;

    // Build the Tokio runtime, sized by the workers setting when present
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let server = match Server::bind(cfg.clone()) {
        Ok(s) => s,
        Err(e) => {
            logger::log_error(&format!(
                "Failed to bind {}:{}: {e}",
                cfg.server.host, cfg.server.port
            ));
            return Err(e.into());
        }
    };
    let addr = server.local_addr();

    println!("Starting server at http://localhost:{}", addr.port());
    println!("Serving at http://{addr}/");
    println!("Press Ctrl+C to stop the server");
    logger::log_server_start(&addr, &cfg);

    let shutdown = Shutdown::new();
    signal::start_signal_handler(shutdown.clone());
    server.run(shutdown).await;

    println!("Server stopped.");
    Ok(())
}
