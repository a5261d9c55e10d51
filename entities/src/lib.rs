//! BIDS-style naming entities (`sub-`, `ses-`, `task-`, `run-`) as they
//! appear in FEAT output directory and file names.

mod stat;
mod template;

pub use stat::{StatImage, StatKind};
pub use template::Template;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    #[error("no `{entity}-` entity in `{text}`")]
    Missing { entity: &'static str, text: String },

    #[error("`{0}` is not a valid run number")]
    BadRun(String),

    #[error("`{0}` is not a statistical image name")]
    BadStatName(String),

    #[error("unknown placeholder `{{{placeholder}}}` in template `{template}`")]
    UnknownPlaceholder { placeholder: String, template: String },

    #[error("unterminated placeholder in template `{0}`")]
    Unterminated(String),
}

pub type Result<T> = std::result::Result<T, EntityError>;

/// Subject, session, task and run identifying a single functional run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entities {
    pub subject: String,
    pub session: String,
    pub task: String,
    pub run: u32,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    // Patterns are literals in this file, so failure is a programming error
    cell.get_or_init(|| Regex::new(pattern).expect("invalid entity regex"))
}

fn capture<'t>(re: &Regex, entity: &'static str, text: &'t str) -> Result<&'t str> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| EntityError::Missing { entity, text: text.to_string() })
}

impl Entities {

    pub fn new(subject: impl Into<String>, session: impl Into<String>, task: impl Into<String>, run: u32) -> Self {
        Self { subject: subject.into(), session: session.into(), task: task.into(), run }
    }

    /// Extract all four entities from a path or directory name such as
    /// `sub-NDARINVZMMCVRWG_ses-2YearFollowUpYArm1_task-sst_run-01LN.feat`.
    pub fn parse(text: &str) -> Result<Self> {
        static SUB: OnceLock<Regex> = OnceLock::new();
        static SES: OnceLock<Regex> = OnceLock::new();
        static TASK: OnceLock<Regex> = OnceLock::new();
        static RUN: OnceLock<Regex> = OnceLock::new();

        let subject = capture(regex(&SUB , r"sub-([^_/]+)" ), "sub" , text)?;
        let session = capture(regex(&SES , r"ses-([^_/]+)" ), "ses" , text)?;
        let task    = capture(regex(&TASK, r"task-([^_/]+)"), "task", text)?;
        let run     = capture(regex(&RUN , r"run-(\d+)"    ), "run" , text)?;
        let run = run.parse().map_err(|_| EntityError::BadRun(run.to_string()))?;
        Ok(Self::new(subject, session, task, run))
    }

    /// `sub-{subject}_ses-{session}_task-{task}_run-{run:02}`
    pub fn prefix(&self) -> String {
        let Self { subject, session, task, run } = self;
        format!("sub-{subject}_ses-{session}_task-{task}_run-{run:02}")
    }

    pub fn feat_dir_name(&self, registration: Registration) -> String {
        format!("{}{}.feat", self.prefix(), registration.tag())
    }
}

impl std::fmt::Display for Entities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

// ----- Registration ------------------------------------------------------------------------------------

/// How a run was registered to standard space: FLIRT (linear) or FNIRT
/// (nonlinear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registration {
    Linear,
    Nonlinear,
}

impl Registration {

    pub fn tag(self) -> &'static str {
        match self {
            Self::Linear    => "LN",
            Self::Nonlinear => "NL",
        }
    }

    pub fn tool(self) -> &'static str {
        match self {
            Self::Linear    => "FLIRT",
            Self::Nonlinear => "FNIRT",
        }
    }

    /// `...run-01NL.feat` is nonlinear; anything else is linear.
    pub fn from_feat_dir(name: &str) -> Self {
        let stem = name.trim_end_matches('/').trim_end_matches(".feat");
        if stem.ends_with("NL") { Self::Nonlinear } else { Self::Linear }
    }

    /// `zfstat1.nii.gz` -> `zfstat1_LN.nii.gz`
    pub fn registered_name(self, file_name: &str) -> String {
        let tag = self.tag();
        for ext in [".nii.gz", ".nii"] {
            if let Some(stem) = file_name.strip_suffix(ext) {
                return format!("{stem}_{tag}{ext}");
            }
        }
        format!("{file_name}_{tag}")
    }
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Linear    => "linear",
            Self::Nonlinear => "nonlinear",
        })
    }
}

impl std::str::FromStr for Registration {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linear"    | "ln" | "flirt" => Ok(Self::Linear),
            "nonlinear" | "nl" | "fnirt" => Ok(Self::Nonlinear),
            _ => Err(format!("`{s}` is neither linear nor nonlinear")),
        }
    }
}
