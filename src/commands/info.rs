use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use cardshift::deck::{Deck, UsageReport};

use crate::commands::CmdResult;

#[derive(Args)]
pub struct InfoArgs {
    /// Input deck
    pub deck: PathBuf,

    /// Print the usage table as plain text
    #[arg(long)]
    pub text: bool,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum InfoOutput {
    #[serde(rename = "info")]
    Info {
        deck: String,
        #[serde(flatten)]
        usage: UsageReport,
    },
}

pub fn run(args: InfoArgs) -> CmdResult<InfoOutput> {
    let deck = Deck::load(&args.deck)?;
    Ok((
        InfoOutput::Info {
            deck: args.deck.display().to_string(),
            usage: deck.usage(),
        },
        0,
    ))
}

pub fn run_raw(args: InfoArgs) -> CmdResult<String> {
    let deck = Deck::load(&args.deck)?;
    Ok((deck.usage().render(), 0))
}
