use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;
use umpire_core::{problems, Agent};

/// `ump exec <dir> [<stdin-file>] [-L <lang>]`
pub async fn exec(dir: &Path, stdin_file: Option<&Path>, lang: &str) -> Result<()> {
    let payload = problems::load_files(dir, lang, stdin_file)
        .with_context(|| format!("failed to load sources from {}", dir.display()))?;

    let agent = Agent::connect(None).context("failed to initialize docker client")?;
    let verdict = agent.execute(&payload).await;
    println!("{}", serde_json::to_string(&verdict)?);
    Ok(())
}

/// `ump update [-w] <dir>...`
pub fn update(overwrite: bool, dirs: &[PathBuf]) -> Result<()> {
    let mut data = if overwrite {
        HashMap::new()
    } else {
        match problems::read_cache() {
            Ok(data) => data,
            Err(err) => {
                warn!(error = %err, "could not read existing cache, starting fresh");
                HashMap::new()
            }
        }
    };

    for dir in dirs {
        if let Err(err) = problems::read_all_problems(&mut data, dir) {
            warn!(dir = %dir.display(), error = %err, "skipping directory");
        }
    }

    problems::update_cache(&data).context("failed to write catalog cache")?;
    println!("updated cache, number of problems: {}", data.len());
    Ok(())
}

/// `ump validate <dir>...`
pub async fn validate(dirs: &[PathBuf]) -> Result<()> {
    let mut data = HashMap::new();
    for dir in dirs {
        if let Err(err) = problems::read_all_problems(&mut data, dir) {
            warn!(dir = %dir.display(), error = %err, "skipping directory");
        }
    }

    let agent = Agent::connect(None).context("failed to initialize docker client")?;
    let mut failed = false;
    for (problem_id, judge_data) in data {
        let verdict = agent.validate(judge_data).await;
        if verdict.status == umpire_core::Decision::Fail {
            failed = true;
        }
        println!(
            "{}: {}",
            problem_id,
            serde_json::to_string(&verdict)?
        );
    }
    if failed {
        anyhow::bail!("one or more problems failed validation");
    }
    Ok(())
}
