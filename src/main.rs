//! `wavebind` - expose a local method to the wavebind orchestration service
//!
//! Thin CLI entry point: configures a session from flags and environment,
//! registers a small demonstration method, and keeps the polling client
//! connected until interrupted.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use console::Style;

use wavebind_core::contract::{ParamDescriptor, ParamKind, UiAnnotation};
use wavebind_core::registry::MethodHandler;
use wavebind_core::runner::Invocation;
use wavebind_core::{PollingController, Session, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "wavebind",
    version,
    about = "Expose a local method to the wavebind orchestration service"
)]
struct Cli {
    /// Account token the connection identity is derived from
    #[arg(long, env = "WAVEBIND_TOKEN")]
    token: Option<String>,

    /// Display name shown in the remote UI
    #[arg(long, default_value = "Wavebind Template")]
    name: String,

    /// Description shown in the remote UI
    #[arg(long, default_value = "Starting point for custom wavebind methods.")]
    description: String,

    /// Author credited in the method contract
    #[arg(long, default_value = "Wavebind")]
    author: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let blue = Style::new().blue();
    println!(
        "{} v{} ({})",
        blue.apply_to("wavebind"),
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let session = Session::new(Settings::from_env());
    if let Some(token) = &cli.token {
        session.set_master_token(token)?;
    }
    session.set_author(&cli.author);
    session.set_name(&cli.name);
    session.set_description(&cli.description);

    session.set_input_format("wav")?;
    session.set_input_channels(2)?;
    session.set_input_sample_rate(44100)?;
    session.set_input_bit_depth(16)?;

    session.set_output_format("wav")?;
    session.set_output_channels(2)?;
    session.set_output_sample_rate(44100)?;
    session.set_output_bit_depth(16)?;

    session
        .register_method(
            "passthrough",
            vec![
                ParamDescriptor::new("level", ParamKind::Int).with_default(5),
                ParamDescriptor::new("clip", ParamKind::File),
                ParamDescriptor::new("notify", ParamKind::Bool),
            ],
            HashMap::from([(
                "level".to_string(),
                UiAnnotation::slider(0.0, 10.0, 1.0, 5),
            )]),
            demo_handler(),
        )
        .await?;

    let controller = PollingController::new(session.clone());
    tokio::select! {
        result = controller.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            session.request_shutdown();
            println!("shutting down");
        }
    }

    Ok(())
}

/// Demonstration method: echoes its inputs and hands any supplied clip
/// straight back through the results pipeline.
fn demo_handler() -> MethodHandler {
    Arc::new(|invocation: Invocation| {
        Box::pin(async move {
            let level = invocation.arg_i64("level").unwrap_or(0);
            println!("level: {}", level);

            if let Some(clip) = invocation.arg_file("clip") {
                let clip = clip.to_string();
                println!("clip: {}", clip);
                invocation.add_file(Path::new(&clip)).await;
            }

            if invocation.arg_bool("notify").unwrap_or(false) {
                invocation.add_message("passthrough complete").await;
            }

            Ok(())
        })
    })
}
