//! Planning and running FSL registrations to standard space.
//!
//! The registration itself is done by FSL's `flirt` (linear, applying the
//! affine FEAT already estimated) or `fnirt` (nonlinear). This module only
//! decides which jobs need running, builds their command lines, and runs
//! them on a worker pool.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use entities::Registration;
use indicatif::ProgressBar;

use crate::discover::RegistrationInput;
use crate::fsl::{self, flag, Tools};
use crate::{Error, Result};

/// FNIRT configuration shipped with FSL
pub const FNIRT_CONFIG: &str = "T1_2_MNI152_2mm";

/// MNI152 2mm template under `$FSLDIR`: the skull-stripped one for FLIRT, the
/// whole-head one for FNIRT.
pub fn default_reference(registration: Registration) -> PathBuf {
    match registration {
        Registration::Linear    => fsl::mni152_brain(),
        Registration::Nonlinear => fsl::standard("MNI152_T1_2mm.nii.gz"),
    }
}

fn program(tools: &Tools, registration: Registration) -> &Path {
    match registration {
        Registration::Linear    => &tools.flirt,
        Registration::Nonlinear => &tools.fnirt,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationJob {
    pub input: PathBuf,
    pub affine: PathBuf,
    pub reference: PathBuf,
    pub registration: Registration,
    pub output: PathBuf,
}

/// Jobs still to be run, and outputs which already exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub jobs: Vec<RegistrationJob>,
    pub skipped: Vec<PathBuf>,
}

/// The registered image is written next to its input, tagged `_LN` or `_NL`.
pub fn output_path(input: &Path, registration: Registration) -> PathBuf {
    let name = input.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    input.with_file_name(registration.registered_name(&name))
}

pub fn plan(inputs: &[RegistrationInput], reference: &Path, registration: Registration, force: bool) -> Result<Plan> {
    if registration == Registration::Linear {
        let brain = reference.file_name().map_or(false, |n| n.to_string_lossy().contains("brain"));
        if !brain {
            return Err(Error::Invalid(format!(
                "FLIRT needs a skull-stripped (brain) reference, got `{}`", reference.display()
            )));
        }
    }
    let mut plan = Plan::default();
    for RegistrationInput { image, affine, .. } in inputs {
        let output = output_path(image, registration);
        if output.exists() && !force {
            log::info!("{}_NODE: {} -> {} already exists. Skipping.",
                       registration.tool(), image.display(), output.display());
            plan.skipped.push(output);
            continue;
        }
        plan.jobs.push(RegistrationJob {
            input: image.clone(),
            affine: affine.clone(),
            reference: reference.to_path_buf(),
            registration,
            output,
        });
    }
    Ok(plan)
}

impl RegistrationJob {

    /// `no_affine` only affects FNIRT: start from identity rather than
    /// FEAT's affine.
    pub fn args(&self, no_affine: bool) -> Vec<OsString> {
        let Self { input, affine, reference, output, .. } = self;
        match self.registration {
            Registration::Linear => vec![
                "-in".into(), input.into(),
                "-ref".into(), reference.into(),
                "-out".into(), output.into(),
                "-applyxfm".into(),
                "-init".into(), affine.into(),
                "-interp".into(), "trilinear".into(),
                "-paddingsize".into(), "0".into(),
            ],
            Registration::Nonlinear => {
                let mut args = vec![flag("--in=", input), flag("--ref=", reference)];
                if !no_affine { args.push(flag("--aff=", affine)) }
                args.push(flag("--iout=", output));
                args.push(format!("--config={FNIRT_CONFIG}").into());
                args
            }
        }
    }

    pub fn command(&self, tools: &Tools, no_affine: bool) -> Command {
        let mut command = Command::new(program(tools, self.registration));
        command.args(self.args(no_affine));
        command
    }

    /// Run to completion, returning the elapsed time.
    pub fn run(&self, tools: &Tools, no_affine: bool) -> Result<Duration> {
        fsl::run_node(self.registration.tool(), self.input.display(), &self.output,
                      program(tools, self.registration), &self.args(no_affine))
    }
}

/// Run all jobs on `threads` workers. Results are in job order.
pub fn run(jobs: &[RegistrationJob], tools: &Tools, no_affine: bool, threads: usize, bar: ProgressBar)
    -> Result<Vec<Result<Duration>>>
{
    fsl::pool(jobs, threads, bar, |job| job.run(tools, no_affine))
}
