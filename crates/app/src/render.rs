//! Text rendering of the outline and reports.

use std::fmt::Write as _;

use colored::{ColoredString, Colorize};

use learnpath_core::aggregate::{CompletionStats, Tally};
use learnpath_core::model::OptionalModule;
use services::{ChapterNode, Diagnostics, ModuleNode, Outline, PhaseNode};

const BAR_WIDTH: usize = 20;

pub fn progress_bar(tally: Tally) -> String {
    let filled = usize::from(tally.percent()) * BAR_WIDTH / 100;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        tally.percent()
    )
}

fn checkbox(completed: bool) -> ColoredString {
    if completed {
        "[x]".green()
    } else {
        "[ ]".dimmed()
    }
}

fn colored_bar(tally: Tally) -> ColoredString {
    let bar = progress_bar(tally);
    if tally.is_complete() {
        bar.green()
    } else if tally.completed > 0 {
        bar.yellow()
    } else {
        bar.normal()
    }
}

pub fn outline(outline: &Outline, expand: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}  {}/{} items",
        "Overall".bold(),
        colored_bar(outline.tally),
        outline.tally.completed,
        outline.tally.total
    );
    for node in &outline.phases {
        out.push('\n');
        out.push_str(&phase(node, expand));
    }
    out
}

pub fn phase(node: &PhaseNode, expand: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}  {}",
        node.name.cyan().bold(),
        format!("({})", node.id).dimmed(),
        colored_bar(node.tally)
    );
    if expand && !node.description.is_empty() {
        let _ = writeln!(out, "  {}", node.description.italic());
    }
    for module in &node.modules {
        out.push_str(&module_block(module, expand));
    }
    out
}

fn module_block(node: &ModuleNode, expand: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {} {}  {}",
        node.name.bold(),
        format!("({})", node.id).dimmed(),
        colored_bar(node.tally)
    );
    if !expand {
        return out;
    }
    for chapter in &node.chapters {
        out.push_str(&chapter_block(chapter));
    }
    for additional in &node.additionals {
        let _ = writeln!(out, "      + {} {}", additional.name, additional.url.dimmed());
    }
    out
}

fn chapter_block(node: &ChapterNode) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "    {} {} {}  {}/{}",
        checkbox(node.completed),
        node.name,
        format!("[{}]", node.key).dimmed(),
        node.tally.completed,
        node.tally.total
    );
    let _ = writeln!(out, "        {}", node.url.dimmed());
    for exercise in &node.exercises {
        let _ = writeln!(
            out,
            "        {} {}. {}",
            checkbox(exercise.completed),
            exercise.index,
            exercise.name
        );
    }
    out
}

pub fn optional_modules(modules: &[OptionalModule]) -> String {
    if modules.is_empty() {
        return "No optional modules.\n".to_owned();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Optional modules".bold());
    for module in modules {
        let _ = writeln!(out, "  {} {}", module.name.cyan(), module.url.dimmed());
        if !module.description.is_empty() {
            let _ = writeln!(out, "    {}", module.description);
        }
    }
    out
}

pub fn stats(stats: &CompletionStats) -> String {
    let mut out = String::new();
    for (label, tally) in [
        ("Overall", stats.overall),
        ("Chapters", stats.chapters),
        ("Exercises", stats.exercises),
    ] {
        let _ = writeln!(
            out,
            "{:<10} {:>3}%  {}/{} done",
            label.bold(),
            tally.percent(),
            tally.completed,
            tally.total
        );
    }
    out
}

pub fn diagnostics(diag: &Diagnostics) -> String {
    let report = &diag.report;
    let chain = diag
        .tiers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");

    let mut out = String::new();
    let _ = writeln!(out, "{}", "Storage".bold());
    let _ = writeln!(out, "  tiers:        {chain}");
    let _ = writeln!(out, "  active tier:  {}", report.active_tier.to_string().yellow());
    let _ = writeln!(out, "  progress key: {}", report.progress_key);
    let _ = writeln!(out, "  backup key:   {}", report.backup_key);
    let _ = writeln!(out, "  entries:      {} ({} completed)", report.entries, report.completed);
    let _ = writeln!(out, "  backup:       {}", if report.has_backup { "present" } else { "none" });
    let _ = writeln!(out, "  loaded:       {}", report.loaded);
    out
}
