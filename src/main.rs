use clap::Parser;

mod args;
mod cmd;
mod config;
mod launch;
mod manifest;
mod remote;
mod scratch;
mod utils;

use cmd::RunArgs;
use cmd::format::StatusLine;
use launch::ChildFailed;

/// Diem - fetch a script from a GitHub repository and run it
///
/// Usage:
///   diem [TOOL FLAGS] <OWNER/NAME | NAME> [OPTIONS] [-- ARGS]
///
/// Tool flags (-v, -q, --workdir, --runner, ...) go before the repository.
/// Everything from the repository on is read by diem's own option parser:
///   --branch NAME             branch to fetch (default: repository default)
///   --entrypoint FILE         override the entrypoint
///   --files a.js,b.js         extra files to download
///   --install                 run the dependency installer
///   -- ARGS                   forwarded verbatim to the script
///
/// Configuration is also read from `.diem.json` and the `diem` field of
/// `package.json` on the fetched branch.
///
/// Examples:
///   diem acme/greeter -- --name world
///   diem -v acme/tools --branch next --install
#[derive(Parser, Debug)]
#[command(
    name = "diem",
    version,
    about = "Diem - fetch a script from a GitHub repository and run it",
    propagate_version = true
)]
pub struct Cli {
    /// Increase verbosity (-v decisions, -vv requests, -vvv fragment contents)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence status output (errors are still shown)
    #[arg(short, long)]
    quiet: bool,

    #[command(flatten)]
    run: RunArgs,
}

fn main() {
    let cli = Cli::parse();

    let level = utils::derive_level(cli.verbose, cli.quiet);
    utils::init_logging(level);

    let mut status = StatusLine::stdout(cli.quiet);
    if let Err(err) = cmd::execute_run(cli.run, &mut status) {
        log_debug!("failure: {err:?}");
        let code = err
            .downcast_ref::<ChildFailed>()
            .map_or(1, ChildFailed::exit_code);
        status.fail(&format!("{err:#}"));
        std::process::exit(code);
    }
}
