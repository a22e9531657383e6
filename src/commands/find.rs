use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use cardshift::deck::Deck;
use cardshift::find::{self, FindResult};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct FindArgs {
    /// Input deck
    pub deck: PathBuf,

    /// Condition, e.g. "mat == 5 and rho < 0 or u == 2"
    pub condition: String,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum FindOutput {
    #[serde(rename = "find")]
    Find {
        deck: String,
        #[serde(flatten)]
        result: FindResult,
    },
}

pub fn run(args: FindArgs) -> CmdResult<FindOutput> {
    let deck = Deck::load(&args.deck)?;
    let result = find::find_cells(deck.view(), &args.condition)?;

    let exit_code = if result.cells.is_empty() { 1 } else { 0 };

    Ok((
        FindOutput::Find {
            deck: args.deck.display().to_string(),
            result,
        },
        exit_code,
    ))
}
