//! Takebook - a voice memo recorder for Linux
//!
//! This is the command-line entry point.

mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Command, ConfigCommand, GroupCommand, TakeCommand, Toggle};
use log::info;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use takebook::audio::{default_input, default_output, LevelStream};
use takebook::{
    settings, AssetId, ConsolePrompt, Library, PermissionGate, Settings, StorageLocator,
};
use tokio_stream::StreamExt;

const METER_WIDTH: usize = 40;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting Takebook");

    let mut settings = Settings::load();
    if let Some(dir) = &args.data_dir {
        settings = settings.with_data_dir(dir);
    }

    let gate = PermissionGate::new(Arc::new(ConsolePrompt));
    let library = Library::open(settings, gate, default_input(), default_output())
        .context("Failed to open library")?;

    match args.command {
        Command::Group(cmd) => group(&library, cmd).await,
        Command::Record {
            group,
            title,
            seconds,
        } => record(&library, &group, title.as_deref(), seconds).await,
        Command::Import { group, path, title } => {
            import(&library, &group, &path, title.as_deref()).await
        }
        Command::Play { id } => play(&library, id).await,
        Command::Take(cmd) => take(&library, cmd).await,
        Command::Locate { id } => locate(&library, id),
        Command::Config(cmd) => configure(library.settings(), cmd),
    }
}

async fn group(library: &Library, cmd: GroupCommand) -> Result<()> {
    let store = library.store();
    match cmd {
        GroupCommand::Add { title } => {
            let group = store.create_group(&title)?;
            println!("{}\t{}", group.id, group.title);
        }
        GroupCommand::List { search } => {
            for group in store.groups(search.as_deref()) {
                println!(
                    "{}\t{}\t{} takes\t{}",
                    group.id,
                    group.created_at.format("%Y-%m-%d %H:%M"),
                    store.assets_in(&group.id).len(),
                    group.title
                );
            }
        }
        GroupCommand::Rm { group } => {
            let group = store.find_group(&group)?;
            let removed = library.delete_group(&group.id).await?;
            println!("Deleted {} and {} takes", group.title, removed);
        }
    }
    Ok(())
}

async fn record(
    library: &Library,
    group: &str,
    title: Option<&str>,
    seconds: Option<f64>,
) -> Result<()> {
    let group = library.store().find_group(group)?;
    let limit = match seconds {
        Some(s) if s.is_finite() && s > 0.0 => Some(Duration::from_secs_f64(s)),
        Some(s) => bail!("Invalid recording length: {}", s),
        None => None,
    };

    let mut session = library.capture_session();
    let target = session.start().await?;
    eprintln!("Recording into {} ({})", group.title, target.path.display());

    let meter = session.levels().map(|levels| tokio::spawn(draw_levels(levels)));

    match limit {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            eprintln!("Press Enter to stop");
            tokio::select! {
                _ = cli::wait_for_line(std::io::BufReader::new(std::io::stdin())) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }

    let take = session.stop().await?;
    if let Some(meter) = meter {
        let _ = meter.await;
    }
    eprintln!();

    let asset = library.save_recording(take, title, &group.id).await?;
    println!("{}\t{:.1}s\t{}", asset.id, asset.duration, asset.title);
    Ok(())
}

/// Redraw a level bar until the session stops metering
async fn draw_levels(mut levels: LevelStream) {
    let mut stderr = std::io::stderr();
    while let Some(level) = levels.next().await {
        let filled = ((level * METER_WIDTH as f32).round() as usize).min(METER_WIDTH);
        let _ = write!(
            stderr,
            "\r[{}{}]",
            "#".repeat(filled),
            " ".repeat(METER_WIDTH - filled)
        );
        let _ = stderr.flush();
    }
}

async fn import(library: &Library, group: &str, path: &Path, title: Option<&str>) -> Result<()> {
    let group = library.store().find_group(group)?;
    let asset = library
        .import_take(path, title, &group.id)
        .await
        .with_context(|| format!("Failed to import {}", path.display()))?;
    println!("{}\t{:.1}s\t{}", asset.id, asset.duration, asset.title);
    Ok(())
}

async fn play(library: &Library, id: AssetId) -> Result<()> {
    let player = library.player();
    let mut errors = player.errors();

    library.play(&id).await?;
    eprintln!("Playing {} (Ctrl-C to stop)", id);

    tokio::select! {
        _ = player.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => player.stop().await,
    }

    if let Ok(failure) = errors.try_recv() {
        bail!("Playback of {} stopped: {}", failure.asset, failure.error);
    }
    Ok(())
}

async fn take(library: &Library, cmd: TakeCommand) -> Result<()> {
    let store = library.store();
    match cmd {
        TakeCommand::List { group } => {
            let group = store.find_group(&group)?;
            for asset in store.assets_in(&group.id) {
                println!(
                    "{}\t{}\t{:>7.1}s\t{:<8}\t{}",
                    asset.id,
                    asset.created_at.format("%Y-%m-%d %H:%M"),
                    asset.duration,
                    asset.status.as_str(),
                    asset.title
                );
            }
        }
        TakeCommand::Rename { id, title } => store.rename_asset(&id, &title)?,
        TakeCommand::Status { id, status } => store.set_status(&id, status)?,
        TakeCommand::Embed { id } => store.embed_audio(&id)?,
        TakeCommand::Rm { id } => {
            let asset = library.delete_take(&id).await?;
            println!("Deleted {}", asset.title);
        }
    }
    Ok(())
}

fn locate(library: &Library, id: AssetId) -> Result<()> {
    match library.store().locate(&id) {
        Some(StorageLocator::LocalFile(path)) => println!("{}", path.display()),
        Some(StorageLocator::Embedded) => println!("embedded (restored on next play)"),
        None if library.store().asset(&id).is_some() => bail!("Take {} has no audio left", id),
        None => bail!("Unknown take {}", id),
    }
    Ok(())
}

fn configure(current: &Settings, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            println!("data-dir\t{}", current.data_dir.display());
            println!("storage-dir\t{}", current.storage_dir.display());
            println!("meter-interval-ms\t{}", current.meter_interval.as_millis());
            println!("sample-rate\t{}", current.sample_rate);
            println!("embed-audio\t{}", current.embed_audio);
        }
        ConfigCommand::EmbedAudio { value } => settings::set_embed_audio(value == Toggle::On),
    }
    Ok(())
}
