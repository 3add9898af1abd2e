mod cli;

use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn report(err: anyhow::Error) -> ! {
    eprintln!("\u{001b}[31merror:\u{001b}[0m {err:?}");
    std::process::exit(1);
}

#[cfg(feature = "server")]
#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = cli::dispatch().await {
        report(err);
    }
}

#[cfg(not(feature = "server"))]
fn main() {
    init_tracing();
    if let Err(err) = cli::dispatch_sync() {
        report(err);
    }
}
