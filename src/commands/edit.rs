use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::commands::renum::{self, RunSummary};
use crate::commands::CmdResult;

#[derive(Args)]
pub struct EditArgs {
    /// Input deck
    pub deck: PathBuf,

    /// Attribute edit CELL:FIELD=VALUE (e.g. 10:mat=7, 10:rho=-2.7, 10:u=3)
    #[arg(long = "set", value_name = "CELL:FIELD=VALUE", required = true)]
    pub sets: Vec<String>,

    /// Write the new deck here instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl EditArgs {
    pub fn is_raw(&self) -> bool {
        self.output.is_none()
    }
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum EditOutput {
    #[serde(rename = "edit")]
    Edit(RunSummary),
}

pub fn run(args: EditArgs) -> CmdResult<EditOutput> {
    let plan = renum::build_plan(None, None, &[], &args.sets)?;
    let applied = renum::execute(&args.deck, &plan)?;
    renum::write_outputs(&applied, args.output.as_deref(), None)?;

    Ok((
        EditOutput::Edit(renum::summarize(
            &args.deck,
            &applied,
            args.output.as_deref(),
            None,
            false,
        )),
        0,
    ))
}

pub fn run_raw(args: EditArgs) -> CmdResult<String> {
    let plan = renum::build_plan(None, None, &[], &args.sets)?;
    let applied = renum::execute(&args.deck, &plan)?;
    Ok((applied.text, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECK: &str = "t\n10 1 -7.8 -1 imp:n=1\n\n1 so 1\n\nm1 1001 1\nm7 1001 1\n";

    #[test]
    fn edit_writes_only_the_changed_field() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("in.i");
        std::fs::write(&deck, DECK).unwrap();

        let args = EditArgs {
            deck,
            sets: vec!["10:mat=7".to_string()],
            output: None,
        };
        let (text, code) = run_raw(args).unwrap();
        assert_eq!(code, 0);
        assert_eq!(text, DECK.replacen("10 1 -7.8", "10 7 -7.8", 1));
    }

    #[test]
    fn missing_cell_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("in.i");
        let out = dir.path().join("out.i");
        std::fs::write(&deck, DECK).unwrap();

        let args = EditArgs {
            deck,
            sets: vec!["99:mat=7".to_string()],
            output: Some(out.clone()),
        };
        let err = run(args).err().unwrap();
        assert_eq!(err.code.as_str(), "edit.target_not_found");
        assert!(!out.exists());
    }
}
