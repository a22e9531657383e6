use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use cardshift::deck::{Applied, Deck, ElementKind};
use cardshift::plan::{self, Plan};
use cardshift::utils::io;
use cardshift::{log_status, Error};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct RenumArgs {
    /// Input deck
    pub deck: PathBuf,

    /// Renumbering rule KIND=SPEC (e.g. cell=+100, surface=10--20:500, material=i)
    #[arg(long = "rule", value_name = "KIND=SPEC")]
    pub rules: Vec<String>,

    /// Map file with one rule per line
    #[arg(long, value_name = "FILE")]
    pub map: Option<PathBuf>,

    /// JSON plan file with rules and edits
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Attribute edit CELL:FIELD=VALUE (e.g. 10:mat=7, 10:imp:n=0)
    #[arg(long = "set", value_name = "CELL:FIELD=VALUE")]
    pub sets: Vec<String>,

    /// Write the new deck here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write a map file that undoes this renumbering
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Validate the plan and report, without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl RenumArgs {
    /// Text output goes to stdout unless a file or a dry-run report was asked for.
    pub fn is_raw(&self) -> bool {
        self.output.is_none() && !self.dry_run
    }
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum RenumOutput {
    #[serde(rename = "renum")]
    Renum(RunSummary),
}

#[derive(Serialize)]
pub struct RunSummary {
    pub deck: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    pub dry_run: bool,
    pub renumbered: usize,
    pub edited: usize,
    /// Identifiers whose value changed, per kind.
    pub moved: BTreeMap<ElementKind, usize>,
    /// Output lines that grew past 80 columns.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub long_lines: Vec<usize>,
}

/// Assemble the plan: map file, then plan file, then command-line rules and
/// edits. Later sources override earlier ones for the same kind.
pub(crate) fn build_plan(
    map: Option<&Path>,
    plan_file: Option<&Path>,
    rules: &[String],
    sets: &[String],
) -> cardshift::Result<Plan> {
    let mut plan = Plan::default();

    if let Some(path) = map {
        plan.merge(plan::load_map_file(path)?);
    }
    if let Some(path) = plan_file {
        plan.merge(plan::load_plan_file(path)?);
    }

    let mut cli = Plan::default();
    for rule in rules {
        let (kind, rule) = plan::parse_rule(rule)?;
        cli.renumber = cli.renumber.with_rule(kind, rule);
    }
    for set in sets {
        cli.edits.push(plan::parse_edit(set)?);
    }
    plan.merge(cli);

    Ok(plan)
}

/// Load, plan, and run the pipeline. Nothing is written here.
pub(crate) fn execute(deck_path: &Path, plan: &Plan) -> cardshift::Result<Applied> {
    let deck = Deck::load(deck_path)?;
    let edits = plan.resolve_edits(deck.view().all_cell_ids());
    deck.apply(&plan.renumber, &edits)
}

/// Persist results. The log goes last so a failed deck write leaves no stale
/// undo file behind.
pub(crate) fn write_outputs(
    applied: &Applied,
    output: Option<&Path>,
    log: Option<&Path>,
) -> cardshift::Result<()> {
    if let Some(path) = output {
        io::write_file_atomic(path, &applied.text, "write deck")?;
        log_status!("renum", "Wrote {}", path.display());
    }
    if let Some(path) = log {
        io::write_file_atomic(path, &applied.renumbering.to_map_file(true), "write log")?;
        log_status!("renum", "Wrote undo map {}", path.display());
    }
    Ok(())
}

pub(crate) fn summarize(
    deck: &Path,
    applied: &Applied,
    output: Option<&Path>,
    log: Option<&Path>,
    dry_run: bool,
) -> RunSummary {
    let moved = applied
        .renumbering
        .kinds()
        .map(|kind| (kind, applied.renumbering.moved(kind).len()))
        .filter(|(_, count)| *count > 0)
        .collect();

    RunSummary {
        deck: deck.display().to_string(),
        output: output.map(|p| p.display().to_string()),
        log: log.map(|p| p.display().to_string()),
        dry_run,
        renumbered: applied.rewrite.renumbered,
        edited: applied.rewrite.edited,
        moved,
        long_lines: applied.rewrite.long_lines.clone(),
    }
}

fn load_plan(args: &RenumArgs) -> cardshift::Result<Plan> {
    let plan = build_plan(
        args.map.as_deref(),
        args.plan.as_deref(),
        &args.rules,
        &args.sets,
    )?;
    if plan.is_empty() {
        return Err(Error::validation_missing_argument(vec![
            "--rule".to_string(),
            "--map".to_string(),
            "--plan".to_string(),
            "--set".to_string(),
        ]));
    }
    Ok(plan)
}

pub fn run(args: RenumArgs) -> CmdResult<RenumOutput> {
    let plan = load_plan(&args)?;
    let applied = execute(&args.deck, &plan)?;

    let log = if args.dry_run { None } else { args.log.as_deref() };
    if !args.dry_run {
        write_outputs(&applied, args.output.as_deref(), log)?;
    }

    Ok((
        RenumOutput::Renum(summarize(
            &args.deck,
            &applied,
            args.output.as_deref(),
            log,
            args.dry_run,
        )),
        0,
    ))
}

pub fn run_raw(args: RenumArgs) -> CmdResult<String> {
    let plan = load_plan(&args)?;
    let applied = execute(&args.deck, &plan)?;
    write_outputs(&applied, None, args.log.as_deref())?;
    Ok((applied.text, 0))
}
