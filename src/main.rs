use anyhow::Result;
use clap::Parser;
use console::style;
use glimpse::api::{CompletionClient, ImageSearchClient};
use glimpse::app::App;
use glimpse::config::Config;
use glimpse::onboarding::OnboardingClient;
use glimpse::session::ChatSession;
use glimpse::speech::CommandTranscriber;
use glimpse::storage::Storage;
use glimpse::utils::logger;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "glimpse")]
#[command(about = "Terminal AI chat with visual search", long_about = None)]
#[command(version)]
struct Cli {
    /// Data directory for conversations and config
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the configured model
    #[arg(short, long)]
    model: Option<String>,

    /// Print startup details (data dir, endpoints, model)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(Storage::default_dir);

    logger::init_global_logger(&data_dir);
    logger::info("glimpse starting");

    let config = Config::load_or_default(&data_dir);
    let model = cli.model.unwrap_or_else(|| config.model.clone());

    if cli.verbose {
        eprintln!("data dir:  {}", data_dir.display());
        eprintln!("model:     {}", model);
        eprintln!("chat api:  {}", config.completion_endpoint);
        eprintln!("image api: {}", config.image_endpoint);
        eprintln!("log file:  {}", data_dir.join("logs/latest.log").display());
    }

    let completion_key = config.completion_api_key().unwrap_or_default();
    if completion_key.is_empty() {
        eprintln!(
            "{}",
            style("Warning: no OpenRouter API key set (config openrouter_api_key or OPENROUTER_API_KEY); chat requests will fail.")
                .yellow()
        );
    }
    let image_key = config.image_api_key().unwrap_or_default();
    if image_key.is_empty() {
        eprintln!(
            "{}",
            style("Warning: no Pexels API key set (config pexels_api_key or PEXELS_API_KEY); image search will fail.")
                .yellow()
        );
    }

    let completion = CompletionClient::new(config.completion_endpoint.clone(), completion_key);
    let images = ImageSearchClient::new(config.image_endpoint.clone(), image_key);
    let session = ChatSession::new(completion, images, Storage::new(&data_dir), model);

    let onboarding = OnboardingClient::new(config.onboarding_endpoint.clone());
    let transcriber = CommandTranscriber::from_config(config.transcribe_command())
        .map(|t| Box::new(t) as Box<dyn glimpse::speech::Transcriber>);

    let mut app = App::new(session, Storage::new(&data_dir), onboarding, transcriber);
    app.run().await
}
