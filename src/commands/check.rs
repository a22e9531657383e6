use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use cardshift::deck::{Deck, DeckSummary};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct CheckArgs {
    /// Input deck
    pub deck: PathBuf,

    /// Exit non-zero when the deck references undefined identifiers
    #[arg(long)]
    pub strict: bool,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum CheckOutput {
    #[serde(rename = "check")]
    Check {
        deck: String,
        #[serde(flatten)]
        summary: DeckSummary,
    },
}

pub fn run(args: CheckArgs) -> CmdResult<CheckOutput> {
    let deck = Deck::load(&args.deck)?;
    let summary = deck.summary();

    let exit_code = if args.strict && !summary.dangling.is_empty() {
        1
    } else {
        0
    };

    Ok((
        CheckOutput::Check {
            deck: args.deck.display().to_string(),
            summary,
        },
        exit_code,
    ))
}
