use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use llamadeck_services::{
    validate_model_name, CatalogEntry, LlamaDeckConfig, ModelDescriptor, ModelManager, PullEvent,
    StartScreen, Transcript, LIBRARY_URL,
};
use std::io::{self, BufRead, Write};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llamadeck")]
#[command(about = "LlamaDeck - manage and chat with local Ollama models", long_about = None)]
struct Cli {
    /// Ollama host URL (overrides OLLAMA_HOST)
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List installed models
    Models,

    /// Show well-known models available for download
    Catalog,

    /// Download a model
    Pull {
        /// Model identifier, e.g. `phi3` or `llama3:70b`
        name: String,
    },

    /// Remove an installed model
    Delete {
        name: String,

        /// Retype the model name to confirm
        #[arg(long)]
        confirm: String,
    },

    /// Create a custom model from a base model and a system directive
    Create {
        /// Installed model to build on
        #[arg(short, long)]
        base: String,

        /// Name of the new model (letters and numbers only)
        #[arg(short, long)]
        name: String,

        /// System directive, e.g. "you are Mario from Super Mario"
        #[arg(short, long)]
        system: String,
    },

    /// Chat with a model
    Chat {
        /// Model name or index from `models`
        #[arg(short, long)]
        model: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let mut config = LlamaDeckConfig::from_env()?;
    if let Some(host) = cli.host.as_deref() {
        config = config.with_host(host);
    }
    let manager = ModelManager::new(&config)?;
    debug!(host = manager.host(), "Using Ollama host");

    match cli.command {
        Some(Commands::Models) => cmd_models(&manager),
        Some(Commands::Catalog) => {
            display_catalog(manager.catalog());
            Ok(())
        }
        Some(Commands::Pull { name }) => cmd_pull(&manager, &name).map(|_| ()),
        Some(Commands::Delete { name, confirm }) => cmd_delete(&manager, &name, &confirm),
        Some(Commands::Create { base, name, system }) => cmd_create(&manager, &base, &name, &system),
        Some(Commands::Chat { model }) => cmd_chat(&manager, model.as_deref()),
        None => run_start(&manager),
    }
}

/// First-run routing: setup when nothing is installed, chat otherwise.
fn run_start(manager: &ModelManager) -> Result<()> {
    match manager.start_screen() {
        StartScreen::Chat { models } => {
            let model = select_model(&models)?;
            run_chat(manager, model)
        }
        StartScreen::Setup => run_setup(manager),
    }
}

fn run_setup(manager: &ModelManager) -> Result<()> {
    println!();
    println!("  No models found at {}.", manager.host());
    println!("  Make sure Ollama is running, then pick a model to download.");
    display_catalog(manager.catalog());

    let Some(choice) = prompt("Pull which model? (# or identifier, empty to quit): ")? else {
        return Ok(());
    };
    if choice.is_empty() {
        return Ok(());
    }

    let identifier = match choice.parse::<usize>() {
        Ok(index) => match index.checked_sub(1).and_then(|i| manager.catalog().get(i)) {
            Some(entry) => entry.pull_identifier.to_string(),
            None => bail!("Invalid catalog index: {}. Use 1-{}", index, manager.catalog().len()),
        },
        Err(_) => choice,
    };

    match cmd_pull(manager, &identifier)? {
        true => run_chat(manager, identifier),
        false => Ok(()),
    }
}

fn cmd_models(manager: &ModelManager) -> Result<()> {
    let models = manager.list_models();

    println!();
    if models.is_empty() {
        println!("  No models installed (or Ollama is not reachable at {}).", manager.host());
        println!("  Run `llamadeck catalog` to see models you can pull.");
        println!();
        return Ok(());
    }

    display_models(&models);
    println!("  Use: llamadeck chat --model <#|name>");
    println!();
    Ok(())
}

fn display_models(models: &[ModelDescriptor]) {
    println!("Installed Models:");
    println!("{:-<65}", "");
    println!("  {:<4} {:<30} {}", "#", "Name", "Model");
    println!("{:-<65}", "");
    for (i, m) in models.iter().enumerate() {
        println!("  {:<4} {:<30} {}", i + 1, m.name, m.identifier);
    }
    println!();
}

fn display_catalog(catalog: &[CatalogEntry]) {
    println!();
    println!("Available Models:");
    println!("{:-<72}", "");
    println!("  {:<4} {:<22} {:<12} {:<10} {}", "#", "Model", "Parameters", "Size", "Pull");
    println!("{:-<72}", "");
    for (i, e) in catalog.iter().enumerate() {
        println!(
            "  {:<4} {:<22} {:<12} {:<10} {}",
            i + 1,
            e.display_name,
            e.parameter_count,
            e.size_on_disk,
            e.pull_identifier
        );
    }
    println!();
    println!("  More models: {}", LIBRARY_URL);
    println!();
}

/// Returns whether the pull completed.
fn cmd_pull(manager: &ModelManager, name: &str) -> Result<bool> {
    let mut stdout = io::stdout();
    let mut stream = manager.pull_model(name);

    match CatalogEntry::find_by_identifier(name) {
        Some(entry) => println!(
            "Pulling {} {} ({}, {})...",
            entry.display_name, entry.parameter_count, name, entry.size_on_disk
        ),
        None => println!("Pulling {}...", name),
    }

    while let Some(event) = stream.blocking_recv() {
        match event {
            PullEvent::Progress { fraction, status } => {
                let status = status.as_deref().unwrap_or("downloading");
                print!("\r\x1B[2K  {:<40} {:>5.1}%", status, fraction * 100.0);
                stdout.flush()?;
            }
            PullEvent::Success => {
                println!();
                println!("  Pulled {}", name);
                return Ok(true);
            }
            PullEvent::Failed { error } => {
                println!();
                println!("  Pull failed: {}", error);
                println!("  Check the model name at {}", LIBRARY_URL);
                return Ok(false);
            }
            PullEvent::Cancelled => {
                println!();
                println!("  Pull cancelled");
                return Ok(false);
            }
        }
    }

    Ok(false)
}

fn cmd_delete(manager: &ModelManager, name: &str, confirm: &str) -> Result<()> {
    if confirm != name {
        bail!("Confirmation '{}' does not match '{}'; nothing deleted", confirm, name);
    }

    match manager.delete_model(name) {
        true => println!("Deleted {}", name),
        false => bail!("Could not delete {}", name),
    }
    Ok(())
}

fn cmd_create(manager: &ModelManager, base: &str, name: &str, system: &str) -> Result<()> {
    validate_model_name(name)?;
    if system.trim().is_empty() {
        bail!("System directive cannot be empty");
    }

    println!("Creating {} from {}...", name, base);
    match manager.create_custom_model(base, name, system) {
        true => println!("Created {}. Chat with it: llamadeck chat --model {}", name, name),
        false => bail!("Could not create {}; is {} installed?", name, base),
    }
    Ok(())
}

fn cmd_chat(manager: &ModelManager, model: Option<&str>) -> Result<()> {
    let models = manager.list_models();
    let model = match model {
        Some(input) => resolve_model(&models, input)?,
        None if models.is_empty() => {
            println!("No models installed. Run `llamadeck catalog` and `llamadeck pull <name>` first.");
            println!("More models: {}", LIBRARY_URL);
            return Ok(());
        }
        None => select_model(&models)?,
    };
    run_chat(manager, model)
}

fn select_model(models: &[ModelDescriptor]) -> Result<String> {
    println!();
    display_models(models);

    match prompt("Chat with which model? (# or name, empty for #1): ")? {
        Some(input) if !input.is_empty() => resolve_model(models, &input),
        _ => Ok(models[0].name.clone()),
    }
}

/// Accept a 1-based index into `models` or a literal model name.
fn resolve_model(models: &[ModelDescriptor], input: &str) -> Result<String> {
    let Ok(index) = input.parse::<usize>() else {
        return Ok(input.to_string());
    };
    if index == 0 || index > models.len() {
        bail!("Invalid model index: {}. Use 1-{}", index, models.len());
    }
    Ok(models[index - 1].name.clone())
}

fn run_chat(manager: &ModelManager, mut model: String) -> Result<()> {
    let mut transcript = Transcript::new();
    let mut stdout = io::stdout();

    println!();
    println!("  Chatting with {}. Type /help for commands.", model);
    println!();

    loop {
        let Some(line) = prompt(&format!("{}> ", model))? else {
            break; // EOF
        };
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('/') {
            let mut parts = command.split_whitespace();
            match parts.next().unwrap_or("") {
                "exit" | "quit" | "q" => break,
                "reset" => {
                    manager.reset_context();
                    transcript.clear();
                    println!("  Conversation cleared");
                }
                "models" => cmd_models(manager)?,
                "model" => match parts.next() {
                    Some(input) => match resolve_model(&manager.list_models(), input) {
                        Ok(name) => {
                            model = name;
                            println!("  Now chatting with {}", model);
                        }
                        Err(e) => println!("  Error: {}", e),
                    },
                    None => println!("  Usage: /model <#|name>"),
                },
                "help" | "h" | "?" => display_chat_help(),
                other => println!("  Unknown command: /{}. Type /help for commands.", other),
            }
            continue;
        }

        transcript.push_user(line.as_str());

        let mut reply = String::new();
        let mut stream = manager.generate(&model, &line);
        while let Some(chunk) = stream.blocking_recv() {
            match chunk {
                Ok(text) => {
                    print!("{}", text);
                    stdout.flush()?;
                    reply.push_str(&text);
                }
                Err(e) => {
                    println!();
                    println!("  Error: {}", e);
                    break;
                }
            }
        }
        println!();
        println!();

        if !reply.is_empty() {
            transcript.push_assistant(reply);
        }
    }

    println!("  Goodbye! ({} messages this session)", transcript.messages().len());
    Ok(())
}

fn display_chat_help() {
    println!();
    println!("Chat Commands:");
    println!("  /reset           Forget the conversation so far");
    println!("  /models          List installed models");
    println!("  /model <#|name>  Switch model (context is kept)");
    println!("  /help            Show this help message");
    println!("  /exit            Leave the chat");
    println!();
}

/// Print `label` and read one trimmed line; `None` on EOF.
fn prompt(label: &str) -> Result<Option<String>> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
