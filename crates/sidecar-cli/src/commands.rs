use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use sidecar_sdk::{Archive, InitOutcome, Sidecar, WorkspaceLayout};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let layout = WorkspaceLayout::new(cli.directory);
    match cli.command {
        Command::Init(args) => cmd_init(&layout, args),
        Command::Ls => cmd_ls(layout),
        Command::Add(args) => cmd_add(layout, args),
        Command::Status(args) => cmd_status(layout, args).await,
        Command::Push(args) => cmd_push(layout, args).await,
        Command::Pull(args) => cmd_pull(layout, args).await,
    }
}

fn cmd_init(layout: &WorkspaceLayout, args: InitArgs) -> anyhow::Result<()> {
    match Sidecar::init(layout, &args.url)? {
        InitOutcome::Created => {
            println!(
                "{} Initialized sidecar in {} (archive: {})",
                "✓".green().bold(),
                layout.root().display(),
                args.url.cyan()
            );
        }
        InitOutcome::AlreadyInitialized => println!("sidecar is already initialized."),
    }
    Ok(())
}

fn cmd_ls(layout: WorkspaceLayout) -> anyhow::Result<()> {
    let sidecar = Sidecar::open(layout)?;
    for path in sidecar.ls() {
        println!("{path}");
    }
    Ok(())
}

fn cmd_add(layout: WorkspaceLayout, args: AddArgs) -> anyhow::Result<()> {
    let mut sidecar = Sidecar::open(layout)?;
    let reports = sidecar.add(args.paths.as_slice()).context("Problem saving index")?;
    let mut failed = 0;
    for report in &reports {
        println!("{report}");
        if report.is_failure() {
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} paths could not be added", reports.len());
    }
    Ok(())
}

fn open_archive(sidecar: &Sidecar, args: &SyncArgs) -> anyhow::Result<Arc<Archive>> {
    let url = sidecar.archive_url(args.url.as_deref())?;
    let archive = Archive::open(url).with_context(|| format!("Problem accessing archive {url:?}"))?;
    Ok(Arc::new(archive))
}

async fn cmd_status(layout: WorkspaceLayout, args: SyncArgs) -> anyhow::Result<()> {
    let sidecar = Sidecar::open(layout)?;
    let archive = open_archive(&sidecar, &args)?;
    sidecar
        .status(archive, args.jobs, |report| println!("{report}"))
        .await?;
    Ok(())
}

async fn cmd_push(layout: WorkspaceLayout, args: SyncArgs) -> anyhow::Result<()> {
    let sidecar = Sidecar::open(layout)?;
    let archive = open_archive(&sidecar, &args)?;
    let (mut total, mut failed) = (0, 0);
    sidecar
        .push(archive, args.jobs, |report| {
            println!("{report}");
            total += 1;
            if report.result.is_err() {
                failed += 1;
            }
        })
        .await?;
    if failed > 0 {
        bail!("{failed} of {total} files could not be pushed");
    }
    Ok(())
}

async fn cmd_pull(layout: WorkspaceLayout, args: SyncArgs) -> anyhow::Result<()> {
    let sidecar = Sidecar::open(layout)?;
    let archive = open_archive(&sidecar, &args)?;
    let (mut total, mut failed) = (0, 0);
    sidecar
        .pull(archive, args.jobs, |report| {
            println!("{report}");
            total += 1;
            if report.result.is_err() {
                failed += 1;
            }
        })
        .await?;
    if failed > 0 {
        bail!("{failed} of {total} files could not be pulled");
    }
    Ok(())
}
