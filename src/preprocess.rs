//! First-level preprocessing: brain extraction of the structural scan with
//! `bet`, then one `feat` run per rendered design.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use entities::{Entities, Registration};
use indicatif::ProgressBar;

use crate::fsl::{self, Tools};
use crate::{design, Result};

/// Fractional intensity threshold passed to `bet -f`
pub const BET_FRACTION: f64 = 0.5;
/// Vertical gradient in the threshold passed to `bet -g`
pub const BET_GRADIENT: f64 = 0.0;

/// Jobs still to be run, outputs which already exist, and inputs which do
/// not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<J> {
    pub jobs: Vec<J>,
    pub skipped: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

impl<J> Default for Plan<J> {
    fn default() -> Self { Self { jobs: vec![], skipped: vec![], missing: vec![] } }
}

// ----- BET ---------------------------------------------------------------------------------------------

/// Skull stripping of a subject's structural scan, which is only acquired
/// in run 1 of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl BetJob {

    /// `<bids_base>/sub-S/ses-X/anat/sub-S_ses-X_run-01_T1w.nii` and its
    /// `_T1w_brain.nii`
    pub fn new(bids_base: &Path, subject: &str, session: &str) -> Self {
        let anat = bids_base.join(format!("sub-{subject}")).join(format!("ses-{session}")).join("anat");
        let stem = format!("sub-{subject}_ses-{session}_run-01_T1w");
        Self {
            input: anat.join(format!("{stem}.nii")),
            output: anat.join(format!("{stem}_brain.nii")),
        }
    }

    pub fn args(&self) -> Vec<OsString> {
        vec![
            self.input.clone().into(),
            self.output.clone().into(),
            "-f".into(), BET_FRACTION.to_string().into(),
            "-g".into(), BET_GRADIENT.to_string().into(),
        ]
    }

    pub fn run(&self, tools: &Tools) -> Result<Duration> {
        fsl::run_node("BET", self.input.display(), &self.output, &tools.bet, &self.args())
    }
}

/// One job per distinct (subject, session) of `runs`. Existing outputs are
/// skipped unless forced.
pub fn plan_bet<'a>(bids_base: &Path, runs: impl IntoIterator<Item = &'a Entities>, force: bool) -> Plan<BetJob> {
    let mut plan = Plan::default();
    for entities in runs {
        let job = BetJob::new(bids_base, &entities.subject, &entities.session);
        if plan.jobs.contains(&job) || plan.skipped.contains(&job.output) || plan.missing.contains(&job.input) { continue }
        if !job.input.exists() {
            log::error!("BET_NODE: {} does not exist", job.input.display());
            plan.missing.push(job.input);
            continue;
        }
        if job.output.exists() && !force {
            log::info!("BET_NODE: {} -> {} already exists. Skipping.", job.input.display(), job.output.display());
            plan.skipped.push(job.output);
            continue;
        }
        plan.jobs.push(job);
    }
    plan
}

pub fn run_bet(jobs: &[BetJob], tools: &Tools, threads: usize, bar: ProgressBar) -> Result<Vec<Result<Duration>>> {
    fsl::pool(jobs, threads, bar, |job| job.run(tools))
}

// ----- FEAT --------------------------------------------------------------------------------------------

/// A first-level FEAT analysis of one run, configured entirely by its design
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatJob {
    pub entities: Entities,
    pub registration: Registration,
    pub design: PathBuf,
    /// `set fmri(outputdir)` in the design
    pub output_dir: PathBuf,
}

impl FeatJob {

    pub fn new(entities: Entities, registration: Registration, design: PathBuf, out_dir: &Path) -> Self {
        let output_dir = design::output_dir(&entities, registration, out_dir);
        Self { entities, registration, design, output_dir }
    }

    /// The directory FEAT actually creates
    pub fn feat_dir(&self) -> PathBuf {
        let mut name = self.output_dir.clone().into_os_string();
        name.push(".feat");
        name.into()
    }

    pub fn args(&self) -> Vec<OsString> { vec![self.design.clone().into()] }

    pub fn run(&self, tools: &Tools) -> Result<Duration> {
        fsl::run_node("FEAT", self.design.display(), &self.feat_dir(), &tools.feat, &self.args())
    }
}

/// Drop jobs whose FEAT directory already exists, unless forced. FEAT would
/// otherwise write to a fresh `+`-suffixed directory.
pub fn plan_feat(jobs: Vec<FeatJob>, force: bool) -> Plan<FeatJob> {
    let mut plan = Plan::default();
    for job in jobs {
        let feat_dir = job.feat_dir();
        if feat_dir.exists() && !force {
            log::info!("FEAT_NODE: {} -> {} already exists. Skipping.", job.design.display(), feat_dir.display());
            plan.skipped.push(feat_dir);
        } else {
            plan.jobs.push(job);
        }
    }
    plan
}

pub fn run_feat(jobs: &[FeatJob], tools: &Tools, threads: usize, bar: ProgressBar) -> Result<Vec<Result<Duration>>> {
    fsl::pool(jobs, threads, bar, |job| job.run(tools))
}
