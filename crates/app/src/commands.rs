use std::io::{IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use dialoguer::Confirm;
use tracing::debug;

use learnpath_core::model::{ChapterId, ModuleId, PhaseId, ProgressKey};
use services::{AppConfig, AppServices, AppServicesError, Clock, ToggleOutcome};

use crate::cli::{Cli, Commands, ExportArgs, ShowArgs, ToggleTarget};
use crate::render;

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.app_config();
        let mut app = open_with_retry(&config).await?;

        match self.command {
            Commands::Show(args) => show(&app, &args),
            Commands::Toggle(target) => toggle(&mut app, target).await,
            Commands::Stats => {
                print!("{}", render::stats(&app.checklist().stats()));
                Ok(())
            }
            Commands::Export(args) => export(&app, &args),
            Commands::Import { file } => import(&mut app, &file).await,
            Commands::Reset { yes } => {
                if !confirm(
                    "Reset all progress? A backup will be created automatically.",
                    yes,
                )? {
                    println!("Cancelled.");
                    return Ok(());
                }
                app.checklist_mut()
                    .reset()
                    .await
                    .context("reset failed")?;
                println!("{}", "Progress reset. Backup created.".green());
                Ok(())
            }
            Commands::Restore { yes } => {
                if !confirm(
                    "Restore from backup? This overwrites your current progress.",
                    yes,
                )? {
                    println!("Cancelled.");
                    return Ok(());
                }
                let count = app
                    .checklist_mut()
                    .restore_from_backup()
                    .await
                    .context("restore failed")?;
                println!("{}", format!("Restored {count} entries from backup.").green());
                Ok(())
            }
            Commands::Backup => {
                app.checklist()
                    .create_backup()
                    .await
                    .context("backup failed")?;
                println!("{}", "Backup saved.".green());
                Ok(())
            }
            Commands::Optional => {
                print!(
                    "{}",
                    render::optional_modules(&app.checklist().path().optional_modules)
                );
                Ok(())
            }
            Commands::Doctor => {
                print!("{}", render::diagnostics(&app.diagnostics().await));
                Ok(())
            }
        }
    }
}

/// Open services, offering to retry when the curriculum cannot be loaded.
async fn open_with_retry(config: &AppConfig) -> Result<AppServices> {
    loop {
        match AppServices::open(config, Clock::system()).await {
            Ok(app) => return Ok(app),
            Err(AppServicesError::Content(err)) if std::io::stdin().is_terminal() => {
                eprintln!("{} {err}", "Failed to load learning path:".red());
                let again = Confirm::new()
                    .with_prompt("Try again?")
                    .default(true)
                    .interact()?;
                if !again {
                    bail!("learning path not loaded");
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        bail!("refusing to continue without --yes when not attached to a terminal");
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

fn show(app: &AppServices, args: &ShowArgs) -> Result<()> {
    let outline = app.checklist().outline();
    let Some(phase) = args.phase.as_deref() else {
        print!("{}", render::outline(&outline, args.expand));
        return Ok(());
    };

    let id: PhaseId = phase.parse()?;
    let node = outline
        .phases
        .iter()
        .find(|p| p.id == id)
        .with_context(|| format!("unknown phase `{id}`"))?;
    print!("{}", render::phase(node, args.expand));
    Ok(())
}

async fn toggle(app: &mut AppServices, target: ToggleTarget) -> Result<()> {
    let checklist = app.checklist_mut();
    let outcome = match target {
        ToggleTarget::Chapter { module, chapter } => {
            let module: ModuleId = module.parse()?;
            let chapter: ChapterId = chapter.parse()?;
            checklist.toggle_chapter(&module, &chapter).await?
        }
        ToggleTarget::Exercise {
            module,
            chapter,
            index,
        } => {
            let module: ModuleId = module.parse()?;
            let chapter: ChapterId = chapter.parse()?;
            checklist.toggle_exercise(&module, &chapter, index).await?
        }
        ToggleTarget::Key { key } => {
            let key: ProgressKey = key.parse()?;
            checklist.toggle_key(key).await
        }
    };
    print_toggle(&outcome);

    let overall = app.checklist().overall();
    println!("Overall {}", render::progress_bar(overall));
    Ok(())
}

fn print_toggle(outcome: &ToggleOutcome) {
    let state = if outcome.completed {
        "done".green()
    } else {
        "not done".yellow()
    };
    println!("{} is now {state}", outcome.key);
    if let Some(chapter) = &outcome.auto_completed_chapter {
        println!("{} {chapter}", "All exercises done, completed chapter".green());
    }
}

fn export(app: &AppServices, args: &ExportArgs) -> Result<()> {
    let store = app.checklist().store();
    let data = store.export()?;
    if args.stdout {
        println!("{data}");
        return Ok(());
    }

    let path = args
        .out
        .clone()
        .unwrap_or_else(|| store.export_file_name().into());
    std::fs::write(&path, data)
        .with_context(|| format!("cannot write {}", path.display()))?;
    println!("{} {}", "Progress exported to".green(), path.display());
    Ok(())
}

async fn import(app: &mut AppServices, file: &Path) -> Result<()> {
    let raw = if file == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        raw
    } else {
        std::fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))?
    };
    if raw.trim().is_empty() {
        bail!("no progress data to import");
    }
    debug!(bytes = raw.len(), "importing progress");

    let count = app
        .checklist_mut()
        .import(&raw)
        .await
        .context("invalid progress data")?;
    println!("{}", format!("Imported {count} entries.").green());
    Ok(())
}
