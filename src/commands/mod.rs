pub type CmdResult<T> = cardshift::Result<(T, i32)>;

pub mod check;
pub mod edit;
pub mod find;
pub mod info;
pub mod renum;
pub mod uexp;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
}

pub(crate) fn run_json(command: crate::Commands) -> (cardshift::Result<serde_json::Value>, i32) {
    crate::tty::status("cardshift is working...");

    match command {
        crate::Commands::Renum(args) => dispatch!(args, renum),
        crate::Commands::Edit(args) => dispatch!(args, edit),
        crate::Commands::Info(args) => dispatch!(args, info),
        crate::Commands::Find(args) => dispatch!(args, find),
        crate::Commands::Check(args) => dispatch!(args, check),
        crate::Commands::Uexp(args) => dispatch!(args, uexp),
    }
}

/// Commands whose primary output is text: a rewritten deck or a usage table.
pub(crate) fn run_raw(command: crate::Commands) -> CmdResult<String> {
    match command {
        crate::Commands::Renum(args) => renum::run_raw(args),
        crate::Commands::Edit(args) => edit::run_raw(args),
        crate::Commands::Info(args) => info::run_raw(args),
        crate::Commands::Uexp(args) => uexp::run_raw(args),
        _ => Err(cardshift::Error::validation_invalid_argument(
            "output_mode",
            "Command does not support raw output",
            None,
            None,
        )),
    }
}
