//! Entry point: loads `.env`, parses the CLI, configures logging, and
//! dispatches to a command handler.

use std::process::ExitCode;

use clap::Parser;

use gitcuttle::cli::{Cli, Command};
use gitcuttle::error::AppError;
use gitcuttle::git::Repository;
use gitcuttle::metadata::MetadataStore;
use gitcuttle::remote_status::RemoteStatusCache;
use gitcuttle::styling::{ERROR, eprintln};
use gitcuttle::{commands, config, verbose_log};

fn run(cli: &Cli) -> Result<i32, AppError> {
    let repo = Repository::current();
    let store = MetadataStore::at_default_path();

    match &cli.command {
        Command::New(args) => commands::handle_new(&repo, &store, args, args.print_path),
        Command::Worktree(args) => commands::handle_new(&repo, &store, args, args.print_path),
        Command::Update(args) => commands::handle_update(&repo, &store, args),
        Command::Absorb(args) => commands::handle_absorb(&repo, &store, args),
        Command::Delete(args) => commands::handle_delete(&repo, &store, args),
        Command::Prune(args) => commands::handle_prune(&repo, &store, args),
        Command::List => commands::handle_list(&repo, &store, &RemoteStatusCache::default()),
        Command::Status => commands::handle_status(&repo, &store),
        Command::Diag => commands::handle_diag(&repo, &store),
    }
}

fn main() -> ExitCode {
    config::load_dotenv();
    let cli = Cli::parse();

    let verbose = config::verbose_requested(cli.verbose);

    if verbose {
        if let Ok(git_dir) = Repository::current().canonical_git_dir() {
            verbose_log::init(&git_dir);
        }
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if verbose { "debug" } else { "warn" }))
        .format(|buf, record| {
            use std::io::Write as _;
            let line = format!("[{} {}] {}", record.level(), record.target(), record.args());
            verbose_log::write_line(&line);
            writeln!(buf, "{line}")
        })
        .init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{ERROR}{err}{ERROR:#}");
            ExitCode::from(1)
        }
    }
}
