//! amf: session-scoped module server.

use amf_app::app::App;
use amf_app::cli::Cli;
use amf_app::modules;
use amf_core::logging;
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let _ = logging::init(&settings.logging.level, settings.logging.json);

    let catalog = modules::catalog()?;
    let app = App::boot(settings, &catalog).await?;
    app.run_until_shutdown().await
}
