use anyhow::Context;
use clap::Parser;
use idf_hal::{LinuxHal, ToolHal};
use idf_workflow::{
    BuildCoordinator, CancelToken, FlashType, LogNotifier, SizeTask, TaskStatus, Workspace,
};
use std::sync::Arc;

pub mod cli;
mod interrupt;
mod logging;

pub fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    logging::init_with(cli.log_file.clone());

    let root = std::fs::canonicalize(&cli.workspace)
        .with_context(|| format!("Workspace {} not found", cli.workspace.display()))?;
    let workspace = Workspace::open(root, cli.config.as_deref())?;
    let hal: Arc<dyn ToolHal> = Arc::new(LinuxHal::new());

    match cli.command {
        cli::Command::Build {
            flash_type,
            reconfigure,
        } => build(&workspace, hal, flash_type.into(), reconfigure),
        cli::Command::Size => size(&workspace, hal.as_ref()),
    }
}

fn build(
    workspace: &Workspace,
    hal: Arc<dyn ToolHal>,
    flash_type: FlashType,
    reconfigure: bool,
) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    interrupt::install(&cancel)?;

    let coordinator =
        BuildCoordinator::new(hal, Arc::new(LogNotifier)).with_reconfigure(reconfigure);
    coordinator.tasks().add_listener(|event| match &event.status {
        TaskStatus::Started => {}
        TaskStatus::Finished => log::info!("✅ {}", event.label),
        TaskStatus::Failed(err) => log::error!("❌ {}: {}", event.label, err),
    });

    let outcome = coordinator.build_command(workspace, &cancel, flash_type);
    if !outcome.continue_flag() {
        anyhow::bail!("Build did not complete: {:?}", outcome);
    }
    Ok(())
}

fn size(workspace: &Workspace, hal: &dyn ToolHal) -> anyhow::Result<()> {
    log::info!("📏 Reading size information...");
    let report = SizeTask::new(workspace, hal)
        .size_info(&CancelToken::new())
        .context("Failed to compute size information")?;
    println!("{}", report);
    Ok(())
}
