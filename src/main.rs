use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use recommend_tuner::{app::ComponentRegistry, config::Config, report::render_text};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        let message = panic_info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| {
                panic_info
                    .payload()
                    .downcast_ref::<String>()
                    .map(|s| s.as_str())
            })
            .unwrap_or("unknown panic payload");

        if let Some(location) = panic_info.location() {
            error!(
                thread = thread_name,
                file = location.file(),
                line = location.line(),
                message,
                "panic occurred"
            );
        } else {
            error!(thread = thread_name, message, "panic occurred");
        }
    }));

    dotenv::dotenv().ok();

    // Tracing initialization is handled by Telemetry::new()
    let config = Config::from_env().context("failed to load configuration")?;
    let registry = ComponentRegistry::build(config).context("failed to build component registry")?;

    let run_id = Uuid::now_v7();
    let started_at = Utc::now();
    info!(%run_id, generator = registry.generator_name(), "optimization run started");

    let reports = tokio::select! {
        reports = registry.run() => reports,
        _ = tokio::signal::ctrl_c() => {
            warn!(%run_id, "interrupted; no report written");
            return Ok(());
        }
    };

    print!("{}", render_text(&reports));

    if let Some(path) = registry.persist(run_id, started_at, &reports)? {
        println!("History written to {}", path.display());
    }

    Ok(())
}
