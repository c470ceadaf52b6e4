use std::sync::Arc;

use anyhow::Context;

use todo_sync::config::TodoConfig;
use todo_sync::todos::{FileMirror, HttpTodoApi, Mirror, TodoApi, TodoStore};
use todo_sync::view::TerminalView;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is the rendered list
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = TodoConfig::from_env();
    config.validate()?;

    eprintln!("📝 todo-sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}/todos", config.api_base);
    eprintln!("   Data: {}", config.data_dir.display());
    eprintln!("   Type `help` for commands.\n");

    let api: Arc<dyn TodoApi> = Arc::new(
        HttpTodoApi::new(config.api_base.clone(), config.http_timeout)
            .context("failed to build HTTP client")?,
    );
    let mirror: Arc<dyn Mirror> = Arc::new(FileMirror::new(&config.data_dir));

    let store = TodoStore::load(api, mirror)
        .await
        .with_context(|| format!("failed to read mirror in {}", config.data_dir.display()))?;

    // Initial sync; on failure the mirrored items stay on screen
    {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            if let Err(e) = store.fetch_all().await {
                tracing::warn!(error = %e, "Initial fetch failed, showing mirrored todos");
            }
        });
    }

    TerminalView::new(store, config.user_id).run().await;

    Ok(())
}
