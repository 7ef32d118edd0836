use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use cascade::server::{self, ServerConfig, ServerContext};

fn usage() -> ! {
    eprintln!(
        "usage: cascade [options]\n\
         \n\
         options:\n\
           --docroot <dir>       document root for media and pages\n\
           --port-offset <n>     shift every listener port by n\n\
           --admin               enable the admin console\n\
           --single-threaded     run connections inline (debugging)\n\
           --testing             testing mode\n\
           -v, --verbose         more logging (repeatable)\n\
           -h, --help            this text"
    );
    std::process::exit(1);
}

fn parse_args() -> (ServerConfig, u8) {
    let mut config = ServerConfig::new();
    let mut verbosity = 0u8;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--docroot" => match args.next() {
                Some(dir) => config = config.with_docroot(dir),
                None => usage(),
            },
            "--port-offset" => match args.next().and_then(|v| v.parse().ok()) {
                Some(offset) => config = config.with_port_offset(offset),
                None => usage(),
            },
            "--admin" => config = config.with_admin(true),
            "--single-threaded" => config = config.with_single_threaded(true),
            "--testing" => config = config.with_testing(true),
            "-v" | "--verbose" => verbosity += 1,
            "-h" | "--help" => usage(),
            other => {
                eprintln!("unknown option: {other}");
                usage();
            }
        }
    }
    (config, verbosity)
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "cascade=info",
        1 => "cascade=debug",
        _ => "cascade=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on SIGINT or SIGHUP, whichever lands first
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(error = %err, "signal handler failed");
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "signal handler failed");
            } else {
                tracing::info!("interrupt, shutting down");
            }
        }
        _ = hangup.recv() => {
            tracing::info!("hangup, shutting down");
        }
    }
}

#[tokio::main]
async fn main() {
    let (config, verbosity) = parse_args();
    init_logging(verbosity);

    tracing::info!(
        docroot = %config.docroot.display(),
        rtmp = %config.rtmp_addr(),
        http = %config.http_addr(),
        "starting"
    );

    let ctx = Arc::new(ServerContext::new(config));
    let (stop_tx, stop_rx) = watch::channel(false);

    let server_ctx = Arc::clone(&ctx);
    let serving = tokio::spawn(async move { server::run(server_ctx, stop_rx).await });

    shutdown_signal().await;
    let _ = stop_tx.send(true);

    match serving.await {
        Ok(Ok(())) => tracing::info!("stopped"),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "server failed");
            std::process::exit(1);
        }
        Err(err) => {
            tracing::error!(error = %err, "server task panicked");
            std::process::exit(1);
        }
    }
}
