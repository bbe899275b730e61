use std::fs;
use std::io::{self, ErrorKind, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use lumina_contracts::chat::{parse_command, CHAT_HELP_COMMANDS};
use lumina_contracts::errors::DesignResult;
use lumina_contracts::events::{EventKind, EventWriter};
use lumina_contracts::images::ImagePayload;
use lumina_contracts::styles::{StyleCatalog, StyleDescriptor};
use lumina_contracts::transcript::{ChatRole, ChatTurn, Transcript};
use lumina_engine::{
    ChatOutcome, DesignStudio, DryrunBackend, GeminiClient, GeminiConfig, ImageEditAdapter,
    ImageGenerationAdapter, ModelBackend, StudioPhase, StyleOutcome,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "lumina", version, about = "Room redesign studio")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Use the offline backend; no API key needed.
    #[arg(long, global = true)]
    dryrun: bool,
    #[arg(long, global = true)]
    json_logs: bool,
    /// JSON array of `{id, name, prompt, thumbnail}` replacing the built-in styles.
    #[arg(long, global = true)]
    styles: Option<PathBuf>,
    #[arg(long, global = true)]
    image_model: Option<String>,
    #[arg(long, global = true)]
    chat_model: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<f64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    Styles,
    Redesign(RedesignArgs),
    Edit(EditArgs),
    Chat(ChatArgs),
}

#[derive(Debug, Parser)]
struct RedesignArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    style: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lumina error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.global.json_logs);
    let catalog = load_catalog(cli.global.styles.as_deref())?;
    match cli.command {
        Command::Styles => {
            for style in catalog.list() {
                println!("{:<12} {:<14} {}", style.id, style.name, style.prompt);
            }
            Ok(0)
        }
        Command::Redesign(args) => run_redesign(&cli.global, &catalog, args),
        Command::Edit(args) => run_edit(&cli.global, args),
        Command::Chat(args) => {
            run_chat(&cli.global, catalog, args)?;
            Ok(0)
        }
    }
}

fn init_logging(json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lumina=info"));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_ansi(io::stderr().is_terminal())
                    .with_target(false),
            )
            .try_init()
            .ok();
    }
}

fn load_catalog(path: Option<&Path>) -> Result<StyleCatalog> {
    match path {
        Some(path) => StyleCatalog::load(path),
        None => Ok(StyleCatalog::default()),
    }
}

fn build_backend(global: &GlobalArgs) -> Result<Arc<dyn ModelBackend>> {
    if global.dryrun {
        tracing::info!("using offline dryrun backend");
        return Ok(Arc::new(DryrunBackend));
    }
    let config = GeminiConfig::from_env()?
        .with_image_model(global.image_model.clone())
        .with_chat_model(global.chat_model.clone())
        .with_timeout_secs(global.timeout);
    tracing::info!(
        image_model = %config.image_model,
        chat_model = %config.chat_model,
        timeout_s = config.request_timeout.as_secs_f64(),
        "using Gemini backend"
    );
    Ok(Arc::new(GeminiClient::new(config)?))
}

fn resolve_style<'a>(catalog: &'a StyleCatalog, key: &str) -> Result<&'a StyleDescriptor> {
    catalog.find(key).ok_or_else(|| {
        let known = catalog
            .list()
            .map(|style| style.id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow!("unknown style '{}' (known: {known})", key.trim())
    })
}

fn run_redesign(global: &GlobalArgs, catalog: &StyleCatalog, args: RedesignArgs) -> Result<i32> {
    let style = resolve_style(catalog, &args.style)?;
    let source = ImagePayload::from_file(&args.image)?;
    let adapter = ImageGenerationAdapter::new(build_backend(global)?);
    let result = adapter.generate(&source, &style.prompt)?;
    write_image(&args.out, &result)?;
    println!("{} -> {}", style.name, args.out.display());
    Ok(0)
}

fn run_edit(global: &GlobalArgs, args: EditArgs) -> Result<i32> {
    let source = ImagePayload::from_file(&args.image)?;
    let adapter = ImageEditAdapter::new(build_backend(global)?);
    let result = adapter.edit(&source, &args.prompt)?;
    write_image(&args.out, &result)?;
    println!("Edited -> {}", args.out.display());
    Ok(0)
}

fn run_chat(global: &GlobalArgs, catalog: StyleCatalog, args: ChatArgs) -> Result<()> {
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let events = EventWriter::new(events_path, Uuid::new_v4().to_string());
    let studio =
        Arc::new(DesignStudio::from_backend(build_backend(global)?).with_events(events.clone()));
    let out_dir = args.out.clone();

    if let Some(path) = args.image.as_deref() {
        upload(&studio, path);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    let mut renders: Vec<JoinHandle<()>> = Vec::new();

    println!("Lumina design studio. Type /help for commands.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let command = parse_command(line.trim_end_matches(['\n', '\r']));
        renders.retain(|handle| !handle.is_finished());

        match command.action.as_str() {
            "noop" => {}
            "help" => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            "quit" => break,
            "upload" => match command.arg_str("path") {
                Some(path) => upload(&studio, Path::new(path)),
                None => println!("/upload requires a path"),
            },
            "list_styles" => {
                for style in catalog.list() {
                    println!("  {:<12} {}", style.id, style.name);
                }
            }
            "select_style" => {
                let Some(key) = command.arg_str("style") else {
                    println!("/style requires a style id or name (see /styles)");
                    continue;
                };
                let style = match resolve_style(&catalog, key) {
                    Ok(style) => style.clone(),
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                if studio.is_rendering() {
                    println!("A design is still rendering; ignoring /style {}.", style.id);
                    continue;
                }
                println!("Rendering {} style...", style.name);
                let studio = Arc::clone(&studio);
                let out_dir = out_dir.clone();
                renders.push(thread::spawn(move || {
                    report_style(&out_dir, &style, studio.select_style(&style));
                }));
            }
            "show_transcript" => {
                for turn in studio.transcript().turns() {
                    println!("{}", format_turn(turn));
                }
            }
            "status" => print_status(&studio),
            "save" => match save_project(&out_dir, &studio) {
                Ok(written) => {
                    for path in written {
                        println!("Saved {}", path.display());
                    }
                }
                Err(err) => println!("Save failed: {err:#}"),
            },
            "reset" => {
                studio.reset();
                println!("Project closed. /upload a new room photo to start again.");
            }
            "chat" => {
                let Some(message) = command.message.as_deref() else {
                    continue;
                };
                report_chat(&out_dir, studio.send_chat(message));
            }
            "unknown" => {
                println!(
                    "Unknown command /{} (try /help)",
                    command.arg_str("command").unwrap_or_default()
                );
            }
            other => tracing::debug!(action = other, "unhandled chat action"),
        }
    }

    for handle in renders {
        if handle.join().is_err() {
            tracing::warn!("style render thread panicked");
        }
    }
    let transcript_path = write_transcript(&out_dir, &studio.transcript())?;
    let mut payload = Map::new();
    payload.insert(
        "transcript_path".to_string(),
        Value::String(transcript_path.to_string_lossy().to_string()),
    );
    payload.insert("turns".to_string(), json!(studio.transcript().len()));
    if let Err(err) = events.emit(EventKind::SessionFinished, payload) {
        tracing::warn!(error = %err, "failed to write event");
    }
    Ok(())
}

fn upload(studio: &DesignStudio, path: &Path) {
    let payload = match ImagePayload::from_file(path) {
        Ok(payload) => payload,
        Err(err) => {
            println!("Upload failed: {err}");
            return;
        }
    };
    match studio.open_project(payload) {
        Ok(()) => println!(
            "Room photo loaded from {}. Pick a style with /style or just start chatting.",
            path.display()
        ),
        Err(err) => println!("{err}"),
    }
}

fn report_style(out_dir: &Path, style: &StyleDescriptor, outcome: DesignResult<StyleOutcome>) {
    match outcome {
        Ok(StyleOutcome::Applied { image, turn, .. }) => {
            save_snapshot(out_dir, &image);
            println!("\n{}", format_turn(&turn));
        }
        Ok(StyleOutcome::Suppressed) => {
            println!("\nA design is still rendering; /style {} was ignored.", style.id)
        }
        Ok(StyleOutcome::NotReady) => println!("\nUpload a room photo first: /upload <path>"),
        Ok(StyleOutcome::Discarded) => {
            println!("\nThe {} render finished after a reset and was dropped.", style.name)
        }
        Err(err) => println!("\nCould not apply the {} style: {err}. Try again.", style.name),
    }
}

fn report_chat(out_dir: &Path, outcome: ChatOutcome) {
    match outcome {
        ChatOutcome::Answered { turn }
        | ChatOutcome::EditFailed { turn, .. }
        | ChatOutcome::EditSkipped { turn, .. } => println!("{}", format_turn(&turn)),
        ChatOutcome::Edited { image, turn, .. } => {
            save_snapshot(out_dir, &image);
            println!("{}", format_turn(&turn));
        }
        ChatOutcome::NotReady => println!("Upload a room photo first: /upload <path>"),
        ChatOutcome::Suppressed => println!("Still working on your last message."),
        ChatOutcome::Discarded => println!("The project was reset; that reply was dropped."),
        ChatOutcome::Ignored => {}
    }
}

fn print_status(studio: &DesignStudio) {
    let phase = match studio.phase() {
        StudioPhase::Upload => "upload",
        StudioPhase::Editing => "editing",
    };
    println!("Phase: {phase}");
    if let Some(original) = studio.original_image() {
        println!("Original: {} ({})", original.fingerprint(), original.mime.as_mime());
    }
    if let Some(current) = studio.current_image() {
        println!("Current: {}", current.fingerprint());
    }
    if let Some(style) = studio.selected_style() {
        println!("Style: {style}");
    }
    println!("Turns: {}", studio.transcript().len());
    if studio.is_rendering() {
        println!("Rendering: yes");
    }
}

fn format_turn(turn: &ChatTurn) -> String {
    let speaker = match turn.role {
        ChatRole::User => "you",
        ChatRole::Assistant if turn.is_error => "lumina (error)",
        ChatRole::Assistant => "lumina",
    };
    let mut out = format!("{speaker}: {}", turn.text);
    for (idx, citation) in turn.citations.iter().enumerate() {
        out.push_str(&format!("\n  [{}] {} <{}>", idx + 1, citation.title, citation.url));
    }
    out
}

fn save_snapshot(out_dir: &Path, image: &ImagePayload) {
    let path = out_dir.join(snapshot_file_name(now_millis()));
    match write_image(&path, image) {
        Ok(()) => println!("(image written to {})", path.display()),
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to write image"),
    }
}

fn snapshot_file_name(millis: u128) -> String {
    format!("current-{millis}.jpg")
}

fn save_project(out_dir: &Path, studio: &DesignStudio) -> Result<Vec<PathBuf>> {
    let Some(original) = studio.original_image() else {
        bail!("no project is open");
    };
    let mut written = Vec::new();
    let original_path = out_dir.join(format!("original.{}", original.mime.extension()));
    write_image(&original_path, &original)?;
    written.push(original_path);
    if let Some(current) = studio.current_image() {
        let current_path = out_dir.join("current.jpg");
        write_image(&current_path, &current)?;
        written.push(current_path);
    }
    written.push(write_transcript(out_dir, &studio.transcript())?);
    Ok(written)
}

fn write_image(path: &Path, image: &ImagePayload) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let bytes = image.decode()?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn write_transcript(out_dir: &Path, transcript: &Transcript) -> Result<PathBuf> {
    let path = out_dir.join("transcript.json");
    let body = serde_json::to_string_pretty(transcript).context("failed to encode transcript")?;
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
