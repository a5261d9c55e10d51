use serde::{Deserialize, Serialize};

use crate::{EntityError, Registration, Result};

/// The kinds of per-contrast image FEAT writes into its `stats` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    Zfstat,
    Zstat,
    Tstat,
    Fstat,
    Varcope,
    Cope,
    Pe,
}

impl StatKind {
    // Longer prefixes first: `varcope` must not be read as `cope`
    const ALL: [StatKind; 7] = [
        Self::Varcope, Self::Zfstat, Self::Zstat, Self::Tstat, Self::Fstat, Self::Cope, Self::Pe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Zfstat  => "zfstat",
            Self::Zstat   => "zstat",
            Self::Tstat   => "tstat",
            Self::Fstat   => "fstat",
            Self::Varcope => "varcope",
            Self::Cope    => "cope",
            Self::Pe      => "pe",
        }
    }
}

impl std::fmt::Display for StatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a file name like `zfstat3_NL.nii.gz` says about its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatImage {
    pub kind: StatKind,
    pub contrast: u32,
    /// Present when the image has already been registered to standard space
    pub registration: Option<Registration>,
}

impl StatImage {

    pub fn parse(file_name: &str) -> Result<Self> {
        let bad = || EntityError::BadStatName(file_name.to_string());
        let stem = file_name.strip_suffix(".nii.gz")
            .or_else(|| file_name.strip_suffix(".nii"))
            .ok_or_else(bad)?;

        let (stem, registration) = match stem.rsplit_once('_') {
            Some((s, "LN")) => (s, Some(Registration::Linear)),
            Some((s, "NL")) => (s, Some(Registration::Nonlinear)),
            _               => (stem, None),
        };

        let (kind, digits) = StatKind::ALL.iter()
            .find_map(|&k| stem.strip_prefix(k.name()).map(|rest| (k, rest)))
            .ok_or_else(bad)?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let contrast = digits.parse().map_err(|_| bad())?;
        Ok(Self { kind, contrast, registration })
    }

    pub fn file_name(&self) -> String {
        let base = format!("{}{}.nii.gz", self.kind, self.contrast);
        match self.registration {
            Some(reg) => reg.registered_name(&base),
            None      => base,
        }
    }
}
