use super::args::{CacheCmd, Cli, Command};

pub(crate) mod cache;
pub(crate) mod inspect;
pub(crate) mod run;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => run::run(args).await,
        Command::Inspect(args) => inspect::run(args),
        Command::Cache(args) => match args.cmd {
            CacheCmd::Stats { db } => cache::stats(&db),
            CacheCmd::Show { db, fingerprint } => cache::show(&db, &fingerprint),
        },
    }
}
