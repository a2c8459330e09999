/*!
Command modules.

  run.rs     the fetch-and-launch pipeline (RunArgs + execute_run)
  format.rs  status line / color / emoji helpers for human output

Conventions:
  - The entry point returns `anyhow::Result<()>`; `main` owns exit codes.
  - Argument structs derive `clap::Args`.
*/

pub mod format;
pub mod run;

pub use run::{RunArgs, execute_run};
