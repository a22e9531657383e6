use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;

use cardshift::deck::{Applied, Deck, RenumberPlan};

use crate::commands::renum::{self, RunSummary};
use crate::commands::CmdResult;

#[derive(Args)]
pub struct UexpArgs {
    /// Input deck
    pub deck: PathBuf,

    /// Write the new deck here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl UexpArgs {
    pub fn is_raw(&self) -> bool {
        self.output.is_none()
    }
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum UexpOutput {
    #[serde(rename = "uexp")]
    Uexp(RunSummary),
}

/// Write `u=0` on every cell that has no universe, so a later universe rule
/// can move the real world.
fn explicit(deck_path: &Path) -> cardshift::Result<Applied> {
    let deck = Deck::load(deck_path)?;
    let edits = deck.explicit_universe_edits();
    deck.apply(&RenumberPlan::default(), &edits)
}

pub fn run(args: UexpArgs) -> CmdResult<UexpOutput> {
    let applied = explicit(&args.deck)?;
    renum::write_outputs(&applied, args.output.as_deref(), None)?;

    Ok((
        UexpOutput::Uexp(renum::summarize(
            &args.deck,
            &applied,
            args.output.as_deref(),
            None,
            false,
        )),
        0,
    ))
}

pub fn run_raw(args: UexpArgs) -> CmdResult<String> {
    Ok((explicit(&args.deck)?.text, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = "t\n1 0 -1 u=3\n2 0 1 imp:n=1\n\n1 so 1\n\n";

    #[test]
    fn writes_u0_on_real_world_cells() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("in.i");
        std::fs::write(&deck, DECK).unwrap();

        let (text, code) = run_raw(UexpArgs {
            deck,
            output: None,
        })
        .unwrap();
        assert_eq!(code, 0);
        assert_eq!(text, DECK.replacen("2 0 1 imp:n=1", "2 0 1 imp:n=1 u=0", 1));
    }

    #[test]
    fn file_output_reports_edit_count() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("in.i");
        let out = dir.path().join("out.i");
        std::fs::write(&deck, DECK).unwrap();

        let (UexpOutput::Uexp(summary), _) = run(UexpArgs {
            deck,
            output: Some(out.clone()),
        })
        .unwrap();
        assert_eq!(summary.edited, 1);
        assert!(std::fs::read_to_string(&out).unwrap().contains("u=0\n"));
    }
}
