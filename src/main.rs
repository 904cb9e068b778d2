use std::io::BufRead;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use treewatch::{
    cli::{Cli, OutputFormat},
    AppEvent, Callbacks, FileEvent, FileEventKind, SeedFile, WatchContext,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = cli.validate() {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    cli.setup_logging();

    let config = cli.resolve_config()?;
    let context = WatchContext::new(config);

    let watch_path = cli.get_watch_path();
    tracing::info!("Starting treewatch on: {}", watch_path.display());

    run(&cli, &context, &watch_path)
}

fn run(cli: &Cli, context: &WatchContext, watch_path: &Path) -> Result<()> {
    let seeds = match &context.config().seeds.file {
        Some(path) => {
            let seeds = context.open_seed_file(path)?;
            tracing::info!("Tracking {} seeds from {}", seeds.len(), seeds.path().display());
            Some(seeds)
        }
        None => None,
    };

    let (tx, rx) = mpsc::channel();
    let watcher = context
        .start_watcher(watch_path, reporting_callbacks(&tx, seeds.clone()))
        .with_context(|| format!("Failed to watch {}", watch_path.display()))?;

    let quit = tx.clone();
    ctrlc::set_handler(move || {
        let _ = quit.send(AppEvent::Quit);
    })?;

    if cli.output == OutputFormat::Text {
        println!("Watching: {}", watcher.root().display());
        if seeds.is_some() {
            println!("Commands: next, list, quit");
        }
        println!("Press Ctrl+C to quit");
        println!("---");
        spawn_command_reader(tx.clone())?;
    }
    drop(tx);

    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(AppEvent::FileChanged(event)) => print_event(&event, cli)?,
            Ok(AppEvent::SeedsReloaded { count, skipped }) => {
                if cli.output == OutputFormat::Text {
                    println!("Reloaded seed list: {} seeds, {} lines skipped", count, skipped);
                }
            }
            Ok(AppEvent::Command(command)) => {
                if !run_command(&command, seeds.as_deref())? {
                    break;
                }
            }
            Ok(AppEvent::Quit) => break,
            Err(RecvTimeoutError::Timeout) => {
                if watcher.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    watcher.close();
    watcher.join().context("File watcher stopped with an error")?;
    Ok(())
}

/// Callbacks forwarding every delivered change to the main loop, reloading
/// the seed list first when it is the file that changed.
fn reporting_callbacks(tx: &Sender<AppEvent>, seeds: Option<Arc<SeedFile>>) -> Callbacks {
    let reload = move |tx: &Sender<AppEvent>, path: &Path| {
        if let Some(report) = seeds.as_ref().and_then(|seeds| seeds.reload_if_tracked(path)) {
            let _ = tx.send(AppEvent::SeedsReloaded {
                count: report.values.len(),
                skipped: report.skipped.len(),
            });
        }
    };
    let reload_modified = reload.clone();

    let (created, modified, deleted, new_dir, deleted_dir) =
        (tx.clone(), tx.clone(), tx.clone(), tx.clone(), tx.clone());

    Callbacks::new()
        .on_new_file(move |path| {
            reload(&created, path);
            let _ = created.send(AppEvent::FileChanged(FileEvent::new(path, FileEventKind::Created)));
        })
        .on_modify_file(move |path| {
            reload_modified(&modified, path);
            let _ = modified.send(AppEvent::FileChanged(FileEvent::new(path, FileEventKind::Modified)));
        })
        .on_delete_file(move |path| {
            let _ = deleted.send(AppEvent::FileChanged(FileEvent::new(path, FileEventKind::Deleted)));
        })
        .on_new_directory(move |path| {
            let _ = new_dir.send(AppEvent::FileChanged(FileEvent::new(path, FileEventKind::DirectoryCreated)));
        })
        .on_delete_directory(move |path| {
            let _ = deleted_dir.send(AppEvent::FileChanged(FileEvent::new(path, FileEventKind::DirectoryDeleted)));
        })
}

fn spawn_command_reader(tx: Sender<AppEvent>) -> Result<()> {
    std::thread::Builder::new()
        .name("command-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let command = line.trim();
                if command.is_empty() {
                    continue;
                }
                if tx.send(AppEvent::Command(command.to_string())).is_err() {
                    break;
                }
            }
        })
        .context("Failed to start command reader")?;
    Ok(())
}

/// Handles one stdin command. Returns false when the program should stop.
fn run_command(command: &str, seeds: Option<&SeedFile>) -> Result<bool> {
    match (command, seeds) {
        ("quit" | "exit", _) => return Ok(false),
        ("next", Some(seeds)) => match seeds.next_seed()? {
            Some(seed) => println!("Next seed: {} ({} left)", seed, seeds.len()),
            None => println!("Seed list is empty"),
        },
        ("list", Some(seeds)) => {
            let list = seeds.seeds();
            println!("{} seeds in {}", list.len(), seeds.path().display());
            for seed in list {
                println!("  {}", seed);
            }
        }
        ("next" | "list", None) => println!("No seed file is tracked"),
        (other, _) => println!("Unknown command: {}", other),
    }
    Ok(true)
}

fn print_event(event: &FileEvent, cli: &Cli) -> Result<()> {
    match cli.output {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Compact => println!("{} {}", event.kind.short(), event.path.display()),
        OutputFormat::Text => print_text_event(event, cli),
    }
    Ok(())
}

fn print_text_event(event: &FileEvent, cli: &Cli) {
    let time_str = event.timestamp.format("%H:%M:%S");
    let event_type = event.kind.label();

    if cli.no_color {
        println!("[{}] {} {}", time_str, event_type, event.path.display());
    } else {
        let color = match event.kind {
            FileEventKind::Created => "\x1b[32m",          // Green
            FileEventKind::Modified => "\x1b[33m",         // Yellow
            FileEventKind::Deleted => "\x1b[31m",          // Red
            FileEventKind::DirectoryCreated => "\x1b[36m", // Cyan
            FileEventKind::DirectoryDeleted => "\x1b[35m", // Magenta
        };
        println!("[{}] {}{}\x1b[0m {}", time_str, color, event_type, event.path.display());
    }
}
