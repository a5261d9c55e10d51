//! Per-run FEAT design files rendered from a base `design.fsf`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use entities::{Entities, Registration};
use regex::{NoExpand, Regex};

use crate::error::IoContext;
use crate::Result;

struct Patterns {
    subject: Regex,
    session: Regex,
    task: Regex,
    run: Regex,
    highres: Regex,
    nonlinear: Regex,
    outputdir: Regex,
    subjects_base: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("invalid design regex");
        Patterns {
            subject:   re(r"sub-[^_/]+"),
            session:   re(r"ses-[^_/]+"),
            task:      re(r"task-[^_/]+"),
            run:       re(r"run-\d+"),
            highres:   re(r#"(?m)^(set highres_files\([^)]*\) ")([^"]*)(")"#),
            nonlinear: re(r"set fmri\(regstandard_nonlinear_yn\) \d+"),
            outputdir: re(r#"set fmri\(outputdir\) "[^"]*""#),
            subjects_base: re(r#""[^"\n]*?sub-"#),
        }
    })
}

/// FEAT output directory of a run: `<out_dir>/<prefix>LN` or `<prefix>NL`.
/// FEAT itself appends `.feat`.
pub fn output_dir(entities: &Entities, registration: Registration, out_dir: &Path) -> PathBuf {
    out_dir.join(format!("{}{}", entities.prefix(), registration.tag()))
}

/// Substitute `entities` into every `sub-`, `ses-`, `task-` and `run-` in
/// `base`.
///
/// With `subjects_base`, every quoted path is first moved under it, keeping
/// everything from its `sub-` component on. The structural scan is acquired
/// once, so `highres_files` always points at `run-01`. The output directory
/// becomes `output_dir(..)`, and for nonlinear registration the FNIRT switch
/// is turned on.
pub fn render(base: &str, entities: &Entities, registration: Registration, out_dir: &Path, subjects_base: Option<&Path>) -> String {
    let p = patterns();
    let mut text = match subjects_base {
        Some(dir) => p.subjects_base.replace_all(base, NoExpand(&format!("\"{}/sub-", dir.display()))).into_owned(),
        None      => base.to_string(),
    };
    let Entities { subject, session, task, run } = entities;
    text = p.subject.replace_all(&text, NoExpand(&format!("sub-{subject}"))).into_owned();
    text = p.session.replace_all(&text, NoExpand(&format!("ses-{session}"))).into_owned();
    text = p.task   .replace_all(&text, NoExpand(&format!("task-{task}"))).into_owned();
    text = p.run    .replace_all(&text, NoExpand(&format!("run-{run:02}"))).into_owned();

    text = p.highres.replace_all(&text, |caps: &regex::Captures| {
        let path = p.run.replace_all(&caps[2], NoExpand("run-01"));
        format!("{}{}{}", &caps[1], path, &caps[3])
    }).into_owned();

    let line = format!("set fmri(outputdir) \"{}\"", output_dir(entities, registration, out_dir).display());
    text = p.outputdir.replace_all(&text, NoExpand(&line)).into_owned();
    if registration == Registration::Nonlinear {
        text = p.nonlinear.replace_all(&text, NoExpand("set fmri(regstandard_nonlinear_yn) 1")).into_owned();
    }
    text
}

/// `<prefix>_design.fsf`, or `<prefix>_design_NL.fsf` for nonlinear registration
pub fn design_file_name(entities: &Entities, registration: Registration) -> String {
    let suffix = match registration {
        Registration::Linear    => "",
        Registration::Nonlinear => "_NL",
    };
    format!("{}_design{suffix}.fsf", entities.prefix())
}

/// Render and write into `dir`, returning the path written.
pub fn write(base: &str, entities: &Entities, registration: Registration, out_dir: &Path,
             subjects_base: Option<&Path>, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(design_file_name(entities, registration));
    std::fs::write(&path, render(base, entities, registration, out_dir, subjects_base)).at(&path)?;
    Ok(path)
}
