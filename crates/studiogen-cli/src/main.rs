use std::collections::HashMap;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};
use studiogen_contracts::chat::{help_text, parse_command, ChatCommand};
use studiogen_contracts::events::{now_utc_iso, EventWriter};
use studiogen_contracts::product::{ProductAttributes, ReferenceImage};
use studiogen_contracts::runs::summary::{write_summary, RunSummary, SlotSummary};
use studiogen_contracts::tasks::{SlotStatus, TaskSlot};
use studiogen_engine::encoder::decode_data_url;
use studiogen_engine::{
    BoardSnapshot, DryrunModel, EngineConfig, GeminiModel, ImageModel, Pipeline, PipelineSession,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "studiogen",
    version,
    about = "Studio product renderings from reference photos"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Run(RunArgs),
    Chat(ChatArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelChoice {
    Gemini,
    Dryrun,
}

#[derive(Debug, Parser)]
struct EngineArgs {
    #[arg(long, value_enum, default_value = "gemini")]
    model: ModelChoice,
    #[arg(long)]
    api_base: Option<String>,
    #[arg(long)]
    retries: Option<u32>,
    #[arg(long)]
    retry_base_ms: Option<u64>,
    #[arg(long)]
    pacing_ms: Option<u64>,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long)]
    material: Option<String>,
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    weight: Option<String>,
    #[arg(long)]
    price: Option<String>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[command(flatten)]
    engine: EngineArgs,
}

const QC_CHECKLIST: &[&str] = &[
    "Shape matches",
    "Color matches",
    "Size accurate",
    "Realistic",
];

const MAX_RETRIES_CAP: u32 = 8;
const MAX_DELAY_MS: u64 = 60_000;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studiogen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_generate(args),
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
    }
}

impl EngineArgs {
    fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(api_base) = self.api_base.as_deref().map(str::trim) {
            if !api_base.is_empty() {
                config.api_base = api_base.trim_end_matches('/').to_string();
            }
        }
        if let Some(retries) = self.retries {
            config.retry.max_retries = retries.min(MAX_RETRIES_CAP);
        }
        if let Some(base_ms) = self.retry_base_ms {
            config.retry.base_delay = Duration::from_millis(base_ms.min(MAX_DELAY_MS));
        }
        if let Some(pacing_ms) = self.pacing_ms {
            config.pacing = Duration::from_millis(pacing_ms.min(MAX_DELAY_MS));
        }
    }

    fn build_pipeline(&self, events: EventWriter) -> Result<Pipeline> {
        let mut config = EngineConfig::from_env();
        self.apply_overrides(&mut config);
        let model: Arc<dyn ImageModel> = match self.model {
            ModelChoice::Gemini => {
                config.require_api_key()?;
                Arc::new(GeminiModel::new(&config))
            }
            ModelChoice::Dryrun => Arc::new(DryrunModel::default()),
        };
        Ok(Pipeline::new(model, &config).with_events(events))
    }
}

fn open_events(out: &Path, events: Option<&Path>) -> Result<EventWriter> {
    fs::create_dir_all(out)
        .with_context(|| format!("failed to create output directory {}", out.display()))?;
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out.join("events.jsonl"));
    Ok(EventWriter::new(events_path, Uuid::new_v4().to_string()))
}

fn run_generate(args: RunArgs) -> Result<i32> {
    let images = args
        .images
        .iter()
        .map(|path| {
            ReferenceImage::from_path(path)
                .with_context(|| format!("cannot use {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let attributes = ProductAttributes {
        material: non_empty(args.material.as_deref()),
        size: non_empty(args.size.as_deref()),
        weight: non_empty(args.weight.as_deref()),
        price: non_empty(args.price.as_deref()),
    };

    let events = open_events(&args.out, args.events.as_deref())?;
    let started_at = now_utc_iso();
    let mut session = PipelineSession::start(args.engine.build_pipeline(events.clone())?)?;
    let updates = session.subscribe();
    println!(
        "Generating 5 renderings from {} image(s) with {}.",
        images.len(),
        session.model_name()
    );
    if !session.submit_generate_all(&images, &attributes)? {
        bail!("generation was not started");
    }

    let mut progress = ProgressPrinter::default();
    loop {
        match updates.recv_timeout(Duration::from_millis(200)) {
            Ok(snapshot) => progress.observe(&snapshot),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !session.is_busy() {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    session.stop();
    for snapshot in updates.try_iter() {
        progress.observe(&snapshot);
    }

    let snapshot = session.snapshot();
    let slots = save_slot_images(&snapshot, &args.out)?;
    let summary = RunSummary {
        session_id: events.session_id().to_string(),
        started_at,
        finished_at: now_utc_iso(),
        slots,
    };
    let summary_path = args.out.join("summary.json");
    write_summary(&summary_path, &summary, Some(&summary_extra(&session, &events)))?;
    println!(
        "Done: {} ready, {} failed. Summary: {}",
        summary.succeeded(),
        summary.failed(),
        summary_path.display()
    );
    Ok(exit_code(&summary))
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let events = open_events(&args.out, args.events.as_deref())?;
    let started_at = now_utc_iso();
    let mut session = PipelineSession::start(args.engine.build_pipeline(events.clone())?)?;
    let printer = BoardPrinter::spawn(session.subscribe())?;

    let stdin = io::stdin();
    let mut line = String::new();
    let mut images: Vec<ReferenceImage> = Vec::new();
    let mut attributes = ProductAttributes::default();

    println!(
        "StudioGen chat started ({}). Type /help for commands.",
        session.model_name()
    );

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

        let input = line.trim_end_matches(['\n', '\r']);
        match parse_command(input) {
            ChatCommand::Noop => continue,
            ChatCommand::Help => {
                println!("Commands:\n{}", help_text());
                continue;
            }
            ChatCommand::Quit => break,
            ChatCommand::AddImages(paths) => {
                if paths.is_empty() {
                    println!("/image requires at least one path");
                }
                for path in paths {
                    match ReferenceImage::from_path(&path) {
                        Ok(image) => {
                            println!("Added {}", image.label());
                            images.push(image);
                        }
                        Err(err) => println!("Skipped {path}: {err:#}"),
                    }
                }
            }
            ChatCommand::ClearImages => {
                images.clear();
                println!("Reference images cleared.");
            }
            ChatCommand::SetAttribute { field, value } => {
                field.apply(&mut attributes, &value);
                if value.trim().is_empty() {
                    println!("{} cleared", field.label());
                } else {
                    println!("{} set to {}", field.label(), value.trim());
                }
            }
            ChatCommand::Generate => {
                if images.is_empty() {
                    println!("Add at least one product photo with /image first.");
                } else if session.submit_generate_all(&images, &attributes)? {
                    println!("Generating 5 renderings. Use /cancel to stop early.");
                } else {
                    println!("Generation already in progress.");
                }
            }
            ChatCommand::Regenerate(id) => {
                if id.is_empty() {
                    println!("/regenerate requires a slot id (1-5)");
                } else if images.is_empty() {
                    println!("Add at least one product photo with /image first.");
                } else {
                    match session.submit_regenerate(&id, &images, &attributes) {
                        Ok(true) => println!("Regenerating slot {id}."),
                        Ok(false) => println!("Slot {id} is still loading."),
                        Err(err) => println!("{err}"),
                    }
                }
            }
            ChatCommand::Cancel => {
                if session.is_busy() {
                    session.cancel();
                    println!("Cancelling after the current step.");
                } else {
                    println!("Nothing to cancel.");
                }
            }
            ChatCommand::Status => {
                print_status(&session.snapshot(), &images, &attributes);
                continue;
            }
            ChatCommand::Save(dir) => {
                let dir = dir.map(PathBuf::from).unwrap_or_else(|| args.out.clone());
                println!("{}", save_report(&session.snapshot(), &dir));
            }
            ChatCommand::Unknown { command, .. } => {
                println!("Unknown command: /{command}. Type /help for commands.");
                continue;
            }
            ChatCommand::Text(_) => {
                println!(
                    "Describe the product with /material, /size, /weight or /price, then /generate."
                );
                continue;
            }
        }
        print_board(&session.snapshot());
    }

    if session.is_busy() {
        session.cancel();
    }
    session.stop();
    printer.stop();

    let slots = save_slot_images(&session.snapshot(), &args.out)?;
    let summary = RunSummary {
        session_id: events.session_id().to_string(),
        started_at,
        finished_at: now_utc_iso(),
        slots,
    };
    write_summary(
        &args.out.join("summary.json"),
        &summary,
        Some(&summary_extra(&session, &events)),
    )?;
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn summary_extra(session: &PipelineSession, events: &EventWriter) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("model".to_string(), json!(session.model_name()));
    extra.insert(
        "events_path".to_string(),
        json!(events.path().to_string_lossy()),
    );
    extra
}

fn exit_code(summary: &RunSummary) -> i32 {
    if summary.all_succeeded() {
        0
    } else {
        2
    }
}

fn slot_file_name(slot: &TaskSlot) -> String {
    format!("{}-{}.png", slot.id, slot.kind.slug())
}

/// Writes every slot that holds an image to `dir` and reports all five slots.
fn save_slot_images(snapshot: &BoardSnapshot, dir: &Path) -> Result<Vec<SlotSummary>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let mut rows = Vec::with_capacity(snapshot.slots.len());
    for slot in snapshot.slots.iter() {
        let Some(url) = slot.url.as_deref() else {
            rows.push(SlotSummary::from_slot(slot, None));
            continue;
        };
        let (_, bytes) = decode_data_url(url)
            .with_context(|| format!("slot {} holds an unreadable image", slot.id))?;
        let path = dir.join(slot_file_name(slot));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        rows.push(SlotSummary::from_slot(slot, Some(&path)));
    }
    Ok(rows)
}

/// `/save` outcome as one line; failures leave the session running.
fn save_report(snapshot: &BoardSnapshot, dir: &Path) -> String {
    match save_slot_images(snapshot, dir) {
        Ok(saved) => {
            let count = saved.iter().filter(|slot| slot.path.is_some()).count();
            format!("Saved {count} image(s) to {}", dir.display())
        }
        Err(err) => format!("Save failed: {err:#}"),
    }
}

fn format_slot_line(slot: &TaskSlot) -> String {
    let status = slot.status();
    let mut line = format!("[{}] {:<16} {}", slot.id, slot.kind.label(), status.as_str());
    if let (SlotStatus::Failed, Some(error)) = (status, slot.error.as_deref()) {
        line.push_str(": ");
        line.push_str(error);
    }
    line
}

fn print_board(snapshot: &BoardSnapshot) {
    for slot in snapshot.slots.iter() {
        println!("  {}", format_slot_line(slot));
    }
}

fn qc_lines(slot: &TaskSlot) -> Vec<String> {
    if slot.url.is_none() || slot.loading {
        return Vec::new();
    }
    QC_CHECKLIST
        .iter()
        .map(|item| format!("      [ ] {item}"))
        .collect()
}

fn print_status(snapshot: &BoardSnapshot, images: &[ReferenceImage], attributes: &ProductAttributes) {
    println!(
        "Images: {}",
        if images.is_empty() {
            "none".to_string()
        } else {
            images
                .iter()
                .map(ReferenceImage::label)
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    println!(
        "Material: {} | Size: {} | Weight: {} | Price: {}",
        attributes.material(),
        attributes.size(),
        attributes.weight(),
        attributes.price()
    );
    println!(
        "Generating: {}",
        if snapshot.is_generating { "yes" } else { "no" }
    );
    for slot in snapshot.slots.iter() {
        println!("  {}", format_slot_line(slot));
        for line in qc_lines(slot) {
            println!("{line}");
        }
    }
}

/// Prints a line whenever a slot changes status.
#[derive(Default)]
struct ProgressPrinter {
    last: HashMap<String, SlotStatus>,
}

impl ProgressPrinter {
    fn changes(&mut self, snapshot: &BoardSnapshot) -> Vec<String> {
        let mut lines = Vec::new();
        for slot in snapshot.slots.iter() {
            let status = slot.status();
            if self.last.get(&slot.id) == Some(&status) {
                continue;
            }
            self.last.insert(slot.id.clone(), status);
            lines.push(format!(
                "{} {}",
                chrono::Local::now().format("%H:%M:%S"),
                format_slot_line(slot)
            ));
        }
        lines
    }

    fn observe(&mut self, snapshot: &BoardSnapshot) {
        for line in self.changes(snapshot) {
            println!("{line}");
        }
    }
}

/// Background thread that echoes slot changes while the chat prompt waits.
struct BoardPrinter {
    stop_flag: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl BoardPrinter {
    fn spawn(updates: mpsc::Receiver<BoardSnapshot>) -> Result<Self> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop_flag);
        let handle = thread::Builder::new()
            .name("studiogen-board".to_string())
            .spawn(move || {
                let mut progress = ProgressPrinter::default();
                while !flag.load(Ordering::SeqCst) {
                    match updates.recv_timeout(Duration::from_millis(200)) {
                        Ok(snapshot) => progress.observe(&snapshot),
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .context("board printer thread spawn failed")?;
        Ok(Self { stop_flag, handle })
    }

    fn stop(self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}
