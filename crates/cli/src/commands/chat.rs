//! `chatloom chat` - Interactive or single-message chat mode.

use std::sync::Arc;

use chatloom_checkpoint::{InMemoryStore, SqliteStore};
use chatloom_config::AppConfig;
use chatloom_core::message::ThreadId;
use chatloom_core::{CheckpointStore, Provider};
use chatloom_providers::OpenAiCompatProvider;
use chatloom_turn::TurnRunner;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    message: Option<String>,
    thread: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early and give a clear error
    let Some(api_key) = config.api_key.clone() else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export GROQ_API_KEY='gsk_...'       (recommended)");
        eprintln!("    export CHATLOOM_API_KEY='...'       (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };

    let provider: Arc<dyn Provider> =
        Arc::new(OpenAiCompatProvider::new("groq", &config.api_url, api_key)?);

    let store: Arc<dyn CheckpointStore> = match config.checkpoint.backend.as_str() {
        "memory" => Arc::new(InMemoryStore::new()),
        _ => Arc::new(SqliteStore::new(&config.checkpoint.db_path).await?),
    };

    let tools = Arc::new(chatloom_tools::builtin_registry(&config, provider.clone())?);
    let tool_names = tools.names().join(", ");

    let mut runner = TurnRunner::new(
        provider,
        config.model.clone(),
        config.temperature,
        tools,
        store,
    );
    if let Some(max_tokens) = config.max_tokens {
        runner = runner.with_max_tokens(max_tokens);
    }

    let thread_id = thread
        .map(|t| ThreadId::from(&t))
        .unwrap_or_default();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let reply = runner.run(&thread_id, &msg).await?;
        eprint!("\r              \r");
        println!("{}", reply.content);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  Chatloom - interactive mode");
    println!();
    println!("  Model:   {}", config.model);
    println!("  Tools:   {tool_names}");
    println!("  Thread:  {thread_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print_prompt()?;
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            print_prompt()?;
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        eprint!("  ...");
        match runner.run(&thread_id, text).await {
            Ok(reply) => {
                eprint!("\r     \r");
                println!();
                for line in reply.content.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        print_prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

fn print_prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("  You > ");
    std::io::stdout().flush()
}
