//! Locating and running FSL command-line tools.
//!
//! Every stage that delegates to FSL (registration, group statistics, brain
//! extraction, FEAT) builds its argument lists itself and hands them to
//! `run_tool`. Batches of such jobs run on a sized rayon pool via `pool`.

use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;

use crate::{Error, Result};

/// `$FSLDIR`, defaulting to `/usr/local/fsl`
pub fn fsldir() -> PathBuf {
    std::env::var_os("FSLDIR").map(PathBuf::from).unwrap_or_else(|| "/usr/local/fsl".into())
}

/// A template in `$FSLDIR/data/standard`
pub fn standard(name: &str) -> PathBuf {
    fsldir().join("data/standard").join(name)
}

/// Skull-stripped MNI152 2mm template, also used as the group analysis mask
pub fn mni152_brain() -> PathBuf { standard("MNI152_T1_2mm_brain.nii.gz") }

/// Where to find the FSL executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub flirt: PathBuf,
    pub fnirt: PathBuf,
    pub fslmerge: PathBuf,
    pub randomise: PathBuf,
    pub bet: PathBuf,
    pub feat: PathBuf,
}

impl Default for Tools {
    /// Bare names, resolved through `PATH`
    fn default() -> Self {
        Self {
            flirt    : "flirt"    .into(),
            fnirt    : "fnirt"    .into(),
            fslmerge : "fslmerge" .into(),
            randomise: "randomise".into(),
            bet      : "bet"      .into(),
            feat     : "feat"     .into(),
        }
    }
}

impl Tools {
    /// Executables inside `$FSLDIR/bin`, if set
    pub fn from_env() -> Self {
        match std::env::var_os("FSLDIR") {
            Some(dir) => Self::in_dir(&PathBuf::from(dir).join("bin")),
            None => Self::default(),
        }
    }

    pub fn in_dir(bin: &Path) -> Self {
        let Self { flirt, fnirt, fslmerge, randomise, bet, feat } = Self::default();
        Self {
            flirt    : bin.join(flirt),
            fnirt    : bin.join(fnirt),
            fslmerge : bin.join(fslmerge),
            randomise: bin.join(randomise),
            bet      : bin.join(bet),
            feat     : bin.join(feat),
        }
    }
}

/// `--name=value` as a single argument
pub(crate) fn flag(name: &str, value: &Path) -> OsString {
    let mut arg = OsString::from(name);
    arg.push(value);
    arg
}

/// Render a command line for display (`--dry-run`)
pub fn command_line(program: &Path, args: &[OsString]) -> String {
    std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `program` to completion. Returns its stdout and the elapsed time; a
/// non-zero exit status is an error carrying stderr.
pub fn run_tool(program: &Path, args: &[OsString]) -> Result<(String, Duration)> {
    log::debug!("running {}", command_line(program, args));
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| Error::Io { path: program.into(), source })?;
    let elapsed = start.elapsed();
    if !output.status.success() {
        return Err(Error::Command {
            program: program.display().to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok((String::from_utf8_lossy(&output.stdout).into_owned(), elapsed))
}

/// `run_tool`, logged as `<node>_NODE: <input> -> <output>`.
///
/// The tool's stdout and the timing go out as a single log record of two
/// node lines, so that anything the tool reports (such as an FNIRT Jacobian
/// warning) is directly followed by the node line naming its input, however
/// many jobs share the log.
pub fn run_node(node: &str, input: impl Display, output: &Path, program: &Path, args: &[OsString]) -> Result<Duration> {
    let node = format!("{node}_NODE: {input} -> {}", output.display());
    log::info!("{node} started");
    let (stdout, elapsed) = run_tool(program, args)
        .map_err(|e| { log::error!("{node} failed: {e}"); e })?;
    let secs = elapsed.as_secs_f64();
    log::info!("{node} stdout: {}\n{node} took {secs:.1} seconds, {:.1} minutes.", stdout.trim_end(), secs / 60.0);
    Ok(elapsed)
}

/// Apply `job` to every element of `jobs` on `threads` workers, advancing
/// `bar` once per job. Results are in job order.
pub fn pool<J, R, F>(jobs: &[J], threads: usize, bar: ProgressBar, job: F) -> Result<Vec<R>>
where
    J: Sync,
    R: Send,
    F: Fn(&J) -> R + Sync + Send,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Invalid(format!("could not start {threads} worker threads: {e}")))?;
    let results = pool.install(|| jobs
        .par_iter()
        .progress_with(bar.clone())
        .map(job)
        .collect());
    bar.finish();
    Ok(results)
}
