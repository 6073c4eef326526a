use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fitcoach_core::assistant::{CoachChat, PollPolicy, ScriptedAssistant, ThreadRegistry};
use fitcoach_core::auth::{AuthCoordinator, FileTokenStore, InMemoryAuthBackend, TokenStore};
use fitcoach_core::store::ThreadMapStore;
use fitcoach_core::{telemetry, CoachSettings};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SMOKE_EMAIL: &str = "smoke@fitcoach.dev";
const SMOKE_REPLY: &str = "Olá! Como posso ajudar?";

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Fitcoach")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in, chat, and sign out against in-memory services.
    Smoke,
    /// Resolve fitcoach.yaml plus environment and print the result (secrets masked).
    Config,
}

fn main() -> Result<()> {
    telemetry::init_tracing(telemetry::default_filter())?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
        Commands::Config => show_config(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    runtime.block_on(async {
        let tokens: Arc<dyn TokenStore> =
            Arc::new(FileTokenStore::new(temp_dir.path().join("secure-store"))?);
        tokens.set("sb-smoke-auth-token", "{}")?;

        let backend = Arc::new(InMemoryAuthBackend::new().with_account(SMOKE_EMAIL, "smoke"));
        let (auth, subscription) = AuthCoordinator::start(backend, vec![tokens.clone()]).await;
        auth.sign_in(SMOKE_EMAIL, "smoke").await?;
        tokio::time::timeout(
            Duration::from_secs(5),
            auth.wait_for(|state| state.is_authenticated()),
        )
        .await
        .context("sign-in never reached the auth state")?;

        let api = Arc::new(ScriptedAssistant::replying(SMOKE_REPLY));
        let threads = ThreadRegistry::with_store(
            api.clone(),
            ThreadMapStore::new(temp_dir.path().join("threads.json")),
        )?;
        let chat = CoachChat::with_registry(
            api.clone(),
            threads,
            "asst_smoke",
            PollPolicy::fixed(Duration::from_millis(10), 20),
        );
        let reply = chat
            .chat_with_cancel("c1", "oi", &CancellationToken::new())
            .await?;
        if reply != SMOKE_REPLY {
            bail!("unexpected coach reply: {reply}");
        }
        info!(
            threads = api.threads_created(),
            status_checks = api.status_checks(),
            "smoke chat completed"
        );

        let report = auth.sign_out().await;
        if auth.state().is_authenticated() {
            bail!("still authenticated after sign-out");
        }
        if !tokens.keys()?.is_empty() {
            bail!("auth tokens survived sign-out");
        }
        info!(clean = report.is_clean(), "smoke sign-out completed");
        subscription.unsubscribe();
        Ok::<_, anyhow::Error>(())
    })
}

fn show_config() -> Result<()> {
    let settings = CoachSettings::load().map_err(|err| anyhow::anyhow!(err.user_message()))?;
    println!("supabase.url        {}", settings.supabase.url);
    println!("supabase.anon_key   {}", mask(&settings.supabase.anon_key));
    println!("openai.base_url     {}", settings.openai.base_url);
    println!("openai.api_key      {}", mask(&settings.openai.api_key));
    println!("openai.assistant_id {}", settings.openai.assistant_id);
    println!(
        "polling             every {:?} (x{}, max {:?}), {} attempts, timeout {:?}",
        settings.polling.interval,
        settings.polling.multiplier,
        settings.polling.max_interval,
        settings.polling.max_attempts,
        settings.polling.timeout
    );
    match &settings.thread_map_path {
        Some(path) => println!("storage.thread_map  {}", path.display()),
        None => println!("storage.thread_map  (in memory)"),
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}…")
}
