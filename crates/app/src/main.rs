// CLI modules
mod args;
mod op;
mod ops;
mod state;

use std::sync::Arc;

use args::Args;
use clap::{Parser, Subcommand};
use common::build_info;
use common::crypto::{SecureRandom, DEFAULT_RESEED_PERIOD};
use op::Op;
use ops::{Decrypt, Encrypt, Init, Key, Version};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, Layer};

command_enum! {
    (Init, Init),
    (Key, Key),
    (Encrypt, Encrypt),
    (Decrypt, Decrypt),
    (Version, Version),
}

/// Logs go to stderr so stdout stays clean for op output.
/// The returned guard must outlive every log call.
fn init_logging(level: tracing::Level) -> tracing_appender::non_blocking::WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(writer)
        .with_filter(env_filter);
    tracing_subscriber::registry().with(layer).init();

    register_panic_logger();
    let build = build_info!();
    tracing::debug!(
        build_profile = build.build_profile,
        features = build.build_features,
        version = build.version,
        "grendel starting up"
    );

    guard
}

/// Registers a panic hook that logs panics using the `tracing` crate
fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // before init there's no config; fall back to the default level
    let level = state::AppState::load(args.config_path.clone())
        .map(|state| state.config.log_level())
        .unwrap_or(tracing::Level::INFO);
    let guard = init_logging(level);

    let random = match SecureRandom::new() {
        Ok(random) => Arc::new(random),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let reseeder = random.spawn_reseeder(DEFAULT_RESEED_PERIOD);

    let ctx = op::OpContext::new(args.config_path, random);
    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!(error = ?e, "op failed");
            eprintln!("Error: {}", e);
            1
        }
    };

    reseeder.abort();
    drop(guard);
    std::process::exit(code);
}
