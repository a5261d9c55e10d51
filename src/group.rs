//! Group-level one-sample analysis of registered statistical images.
//!
//! For each `GroupKey` the subjects' images are concatenated along time with
//! `fslmerge -t`, and the merged 4D image goes through `randomise` as a
//! one-sample group mean with TFCE, masked by the MNI152 brain.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::ProgressBar;

use crate::discover::GroupKey;
use crate::error::IoContext;
use crate::fsl::{self, Tools};
use crate::Result;

/// A one-sample test needs at least this many subjects
pub const MIN_SUBJECTS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupJob {
    pub key: GroupKey,
    pub inputs: Vec<PathBuf>,
    pub merged: PathBuf,
    /// `randomise -o`: its outputs are `<base>_tstat1.nii.gz` and friends
    pub output_base: PathBuf,
    pub mask: PathBuf,
}

/// Jobs still to be run, groups with results already, and groups with too
/// few subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub jobs: Vec<GroupJob>,
    pub skipped: Vec<GroupKey>,
    pub too_small: Vec<GroupKey>,
}

/// The first `randomise` output, used to tell whether a group is done
pub fn tstat_path(output_base: &Path) -> PathBuf {
    let mut name = output_base.file_name().unwrap_or_default().to_os_string();
    name.push("_tstat1.nii.gz");
    output_base.with_file_name(name)
}

pub fn plan(groups: BTreeMap<GroupKey, Vec<PathBuf>>, out_dir: &Path, mask: &Path, force: bool) -> Plan {
    let mut plan = Plan::default();
    for (key, inputs) in groups {
        if inputs.len() < MIN_SUBJECTS {
            log::warn!("{key}: only {} subject(s), skipping", inputs.len());
            plan.too_small.push(key);
            continue;
        }
        let merged      = out_dir.join(format!("zfstat{key}_merged.nii.gz"));
        let output_base = out_dir.join(format!("zfstat{key}"));
        if tstat_path(&output_base).exists() && !force {
            log::info!("RANDOMISE_NODE: {key} -> {} already exists. Skipping.", output_base.display());
            plan.skipped.push(key);
            continue;
        }
        plan.jobs.push(GroupJob { key, inputs, merged, output_base, mask: mask.to_path_buf() });
    }
    plan
}

impl GroupJob {

    pub fn merge_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-t".into(), self.merged.clone().into()];
        args.extend(self.inputs.iter().map(OsString::from));
        args
    }

    pub fn randomise_args(&self) -> Vec<OsString> {
        vec![
            "-i".into(), self.merged.clone().into(),
            "-o".into(), self.output_base.clone().into(),
            "-1".into(),
            "-T".into(),
            "-m".into(), self.mask.clone().into(),
        ]
    }

    /// Both command lines, for `--dry-run`
    pub fn command_lines(&self, tools: &Tools) -> [String; 2] {
        [fsl::command_line(&tools.fslmerge, &self.merge_args()),
         fsl::command_line(&tools.randomise, &self.randomise_args())]
    }

    /// Merge, then randomise. Returns the total elapsed time.
    pub fn run(&self, tools: &Tools) -> Result<Duration> {
        let key = &self.key;
        if let Some(dir) = self.merged.parent() {
            std::fs::create_dir_all(dir).at(dir)?;
        }
        let merging = fsl::run_node("MERGE", key, &self.merged, &tools.fslmerge, &self.merge_args())?;
        let randomising = fsl::run_node("RANDOMISE", self.merged.display(), &self.output_base,
                                        &tools.randomise, &self.randomise_args())?;
        Ok(merging + randomising)
    }
}

/// Run all jobs on `threads` workers. Results are in job order.
pub fn run(jobs: &[GroupJob], tools: &Tools, threads: usize, bar: ProgressBar) -> Result<Vec<Result<Duration>>> {
    fsl::pool(jobs, threads, bar, |job| job.run(tools))
}
