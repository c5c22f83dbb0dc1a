use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use stockledger_infra::EngineConfig;
use stockledger_replay::{Session, replay};

fn main() -> anyhow::Result<()> {
    stockledger_observability::init();

    let session = Session::new(EngineConfig::from_env());
    let stdout = io::stdout();

    let summary = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
            replay(&session, BufReader::new(file), stdout.lock())?
        }
        None => replay(&session, io::stdin().lock(), stdout.lock())?,
    };

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        "replay finished"
    );
    Ok(())
}
