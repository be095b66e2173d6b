use std::process;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use opd_engine::transport::{ServerConfig, serve};
use opd_engine::{AllocationService, EngineConfig};

struct Args {
    server: ServerConfig,
    engine: EngineConfig,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: opd-server [--host <addr>] [--port <port>] [--timeout-ms <ms>]");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --host <addr>                Bind address [env: OPD_HOST] [default: 0.0.0.0]");
            eprintln!("  --port <port>                Bind port [env: OPD_PORT] [default: 5000]");
            eprintln!(
                "  --timeout-ms <ms>            Lock wait per operation, 0 waits forever [env: OPD_TIMEOUT_MS] [default: 5000]"
            );
            eprintln!("  --await-explicit-shutdown    Ignore SIGTERM, stop only on /shutdown or SIGINT");
            process::exit(2);
        }
    };

    init_tracing();

    let service = Arc::new(
        AllocationService::in_memory(args.engine).with_server_version(env!("CARGO_PKG_VERSION")),
    );

    if let Err(e) = serve(args.server, service).await {
        tracing::error!(error = %e, "Server exited with error");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut server = ServerConfig::default();
    let mut timeout_ms: Option<String> = None;

    if let Ok(host) = std::env::var("OPD_HOST") {
        server.host = host;
    }
    if let Ok(port) = std::env::var("OPD_PORT") {
        server.port = parse_port(&port)?;
    }
    if let Ok(ms) = std::env::var("OPD_TIMEOUT_MS") {
        timeout_ms = Some(ms);
    }

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                server.host = args.get(i).ok_or("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                server.port = parse_port(args.get(i).ok_or("--port requires a value")?)?;
            }
            "--timeout-ms" => {
                i += 1;
                timeout_ms = Some(args.get(i).ok_or("--timeout-ms requires a value")?.clone());
            }
            "--await-explicit-shutdown" => server.await_explicit_shutdown = true,
            "--help" | "-h" => return Err("".to_string()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    let engine = match timeout_ms {
        Some(ms) => EngineConfig::default().with_timeout(parse_timeout(&ms)?),
        None => EngineConfig::default(),
    };

    Ok(Args { server, engine })
}

fn parse_port(value: &str) -> Result<u16, String> {
    value
        .parse()
        .map_err(|_| format!("invalid port '{value}'"))
}

/// `0` disables the lock timeout.
fn parse_timeout(value: &str) -> Result<Option<Duration>, String> {
    let ms: u64 = value
        .parse()
        .map_err(|_| format!("invalid timeout '{value}', expected milliseconds"))?;
    Ok((ms > 0).then(|| Duration::from_millis(ms)))
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("OPD_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("trace") => "trace",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("opd_engine={level},opd_server={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
