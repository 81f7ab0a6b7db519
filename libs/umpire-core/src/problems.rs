//! Problem sources: the on-disk directory layout, the cache file and the
//! remote catalog endpoint.
//!
//! Directory layout:
//!
//! ```text
//! <root>/<problem_id>/solution/<lang>/<source files...>
//! <root>/<problem_id>/testcases/input*    (paired with output* by name)
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{JudgeError, JudgeResult};
use crate::types::{InMemoryFile, InputOutput, JudgeData, Payload};

pub const CACHE_FILENAME: &str = ".umpire.cache.json";
pub const SOLUTION_DIR: &str = "solution";
pub const TESTCASE_DIR: &str = "testcases";

/// Lower value wins when a problem ships solutions in several languages.
fn language_priority(language: &str) -> Option<u8> {
    match language {
        "cpp" => Some(1),
        "python" => Some(2),
        "javascript" => Some(3),
        "typescript" => Some(4),
        _ => None,
    }
}

fn source_whitelisted(language: &str, file_name: &str) -> bool {
    let ext = match Path::new(file_name).extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return false,
    };
    match language {
        "cpp" => ext == "cpp" || ext == "h",
        "python" => ext == "py",
        "javascript" => ext == "js",
        "typescript" => ext == "ts",
        _ => false,
    }
}

/// Read the canonical solution under `<problem_dir>/solution/`.
///
/// Picks the highest-priority language directory present and loads its
/// whitelisted source files. Returns `None` when the directory is missing or
/// holds no usable solution, so a scan can skip incomplete problems.
pub fn read_solution(problem_dir: &Path) -> JudgeResult<Option<Payload>> {
    let solution_root = problem_dir.join(SOLUTION_DIR);
    if !solution_root.is_dir() {
        return Ok(None);
    }

    let mut candidates: Vec<(u8, String)> = Vec::new();
    for entry in fs::read_dir(&solution_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(priority) = language_priority(&name) {
            candidates.push((priority, name));
        }
    }
    if candidates.is_empty() {
        warn!(dir = %problem_dir.display(), "no solution language directory found");
        return Ok(None);
    }
    candidates.sort();
    let language = candidates.remove(0).1;
    debug!(dir = %problem_dir.display(), language, "using solution language");

    let source_dir = solution_root.join(&language);
    let mut files = Vec::new();
    for entry in fs::read_dir(&source_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !source_whitelisted(&language, &name) {
            continue;
        }
        let content = fs::read_to_string(entry.path())?;
        files.push(InMemoryFile { name, content });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    if files.is_empty() {
        warn!(dir = %source_dir.display(), "solution directory has no whitelisted sources");
        return Ok(None);
    }

    Ok(Some(Payload {
        language,
        files,
        problem: None,
        stdin: String::new(),
    }))
}

/// Read the `input*`/`output*` fixture pairs under `<problem_dir>/testcases/`.
/// Inputs with no matching output are skipped.
pub fn read_testcases(problem_dir: &Path) -> JudgeResult<Vec<InputOutput>> {
    let io_dir = problem_dir.join(TESTCASE_DIR);
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(&io_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut pairs = Vec::new();
    for name in &names {
        if !name.contains("input") {
            continue;
        }
        let output_name = name.replacen("input", "output", 1);
        if !names.iter().any(|n| n == &output_name) {
            continue;
        }
        let input = fs::read_to_string(io_dir.join(name))?;
        let output = fs::read_to_string(io_dir.join(&output_name))?;
        pairs.push(InputOutput { input, output });
    }
    Ok(pairs)
}

/// Read one problem directory into `data` under `problem_id`. Problems with
/// no solution are skipped; fixture errors degrade to an empty `io` list.
pub fn read_problem(
    data: &mut HashMap<String, JudgeData>,
    problem_id: &str,
    problem_dir: &Path,
) -> JudgeResult<()> {
    let solution = match read_solution(problem_dir)? {
        Some(solution) => solution,
        None => return Ok(()),
    };
    let io = match read_testcases(problem_dir) {
        Ok(io) => io,
        Err(err) => {
            warn!(problem = problem_id, error = %err, "error reading fixtures");
            Vec::new()
        }
    };
    data.insert(problem_id.to_string(), JudgeData { solution, io });
    Ok(())
}

/// Scan `root` for problems. A root that itself contains `solution/` is a
/// single problem keyed by its directory basename; otherwise every child
/// directory is one problem keyed by its name.
pub fn read_all_problems(data: &mut HashMap<String, JudgeData>, root: &Path) -> JudgeResult<()> {
    if root.join(SOLUTION_DIR).is_dir() {
        let id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "problem".to_string());
        return read_problem(data, &id, root);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        read_problem(data, &id, &entry.path())?;
    }
    Ok(())
}

/// Build an ad-hoc payload from a plain source directory, for the CLI
/// `exec` path. Stdin comes from `stdin_file` when given.
pub fn load_files(dir: &Path, language: &str, stdin_file: Option<&Path>) -> JudgeResult<Payload> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !source_whitelisted(language, &name) {
            continue;
        }
        let content = fs::read_to_string(entry.path())?;
        files.push(InMemoryFile { name, content });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    if files.is_empty() {
        return Err(JudgeError::Sandbox(format!(
            "no {} source files found in {}",
            language,
            dir.display()
        )));
    }
    let stdin = match stdin_file {
        Some(path) => fs::read_to_string(path)?,
        None => String::new(),
    };
    Ok(Payload {
        language: language.to_string(),
        files,
        problem: None,
        stdin,
    })
}

/// Location of the on-disk catalog cache: `$HOME/.umpire.cache.json`, or the
/// working directory when HOME is unset.
pub fn cache_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(CACHE_FILENAME),
        None => PathBuf::from(CACHE_FILENAME),
    }
}

/// Read the catalog cache. A missing file is an empty catalog, not an error.
pub fn read_cache() -> JudgeResult<HashMap<String, JudgeData>> {
    read_cache_from(&cache_path())
}

pub fn read_cache_from(path: &Path) -> JudgeResult<HashMap<String, JudgeData>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no catalog cache yet");
            return Ok(HashMap::new());
        }
        Err(err) => return Err(err.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Write the full catalog mapping to the cache file.
pub fn update_cache(data: &HashMap<String, JudgeData>) -> JudgeResult<()> {
    update_cache_at(&cache_path(), data)
}

pub fn update_cache_at(path: &Path, data: &HashMap<String, JudgeData>) -> JudgeResult<()> {
    let raw = serde_json::to_string(data)?;
    fs::write(path, raw)?;
    info!(path = %path.display(), problems = data.len(), "catalog cache updated");
    Ok(())
}

/// Fetch the full problem map from a remote catalog source.
pub async fn fetch_problems(base_url: &str) -> JudgeResult<HashMap<String, JudgeData>> {
    let url = format!("{}/problems", base_url.trim_end_matches('/'));
    info!(%url, "fetching problems");
    let data: HashMap<String, JudgeData> = reqwest::Client::new()
        .get(&url)
        .header("content-type", "application/json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    info!(problems = data.len(), "fetched remote problems");
    Ok(data)
}
