use crate::{Entities, EntityError, Registration, Result};

/// A path template with `{placeholder}` fields.
///
/// Recognised placeholders: `{subject}`, `{session}`, `{task}`, `{run}`,
/// `{run:02}`, `{contrast}` and `{reg}` (the `LN`/`NL` registration tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template(String);

impl Template {

    /// Statistical image inside a FEAT directory
    pub const ZFSTAT: &'static str =
        "sub-{subject}_ses-{session}_task-{task}_run-{run:02}{reg}.feat/stats/zfstat{contrast}.nii.gz";

    /// Statistical image after registration to standard space
    pub const REGISTERED_ZFSTAT: &'static str =
        "sub-{subject}_ses-{session}_task-{task}_run-{run:02}{reg}.feat/stats/zfstat{contrast}_{reg}.nii.gz";

    /// FEAT's functional-to-standard affine
    pub const XFM: &'static str =
        "sub-{subject}_ses-{session}_task-{task}_run-{run:02}{reg}.feat/reg/example_func2standard.mat";

    /// Validates the placeholders eagerly, so that `render` can only fail on
    /// templates built without `new`.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = Self(template.into());
        template.render(&Entities::new("", "", "", 0), 0, Registration::Linear)?;
        Ok(template)
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn render(&self, entities: &Entities, contrast: u32, registration: Registration) -> Result<String> {
        let mut out = String::with_capacity(self.0.len() + 32);
        let mut rest = self.0.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}')
                .ok_or_else(|| EntityError::Unterminated(self.0.clone()))?;
            let placeholder = &after[..close];
            match placeholder {
                "subject"  => out.push_str(&entities.subject),
                "session"  => out.push_str(&entities.session),
                "task"     => out.push_str(&entities.task),
                "run"      => out.push_str(&entities.run.to_string()),
                "run:02"   => out.push_str(&format!("{:02}", entities.run)),
                "contrast" => out.push_str(&contrast.to_string()),
                "reg"      => out.push_str(registration.tag()),
                _ => return Err(EntityError::UnknownPlaceholder {
                    placeholder: placeholder.to_string(),
                    template: self.0.clone(),
                }),
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

impl std::str::FromStr for Template {
    type Err = EntityError;
    fn from_str(s: &str) -> Result<Self> { Self::new(s) }
}

impl Default for Template {
    fn default() -> Self { Self(Self::ZFSTAT.to_string()) }
}
