use std::path::PathBuf;

use crate::roi::Label;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("`{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("could not read NIfTI image `{path}`: {source}")]
    Nifti { path: PathBuf, source: nifti::NiftiError },

    #[error("could not write NIfTI image `{path}`: {source}")]
    NiftiWrite { path: PathBuf, source: nifti::NiftiError },

    #[error("`{path}` has {ndim} dimensions: only 3D and 4D images are supported")]
    Dimensionality { path: PathBuf, ndim: usize },

    #[error("the label mask must be a single 3D volume, but it has {0} frames")]
    MaskNot3D(usize),

    #[error("image shape {image:?} does not match mask shape {mask:?}")]
    ShapeMismatch { image: [usize; 3], mask: [usize; 3] },

    #[error("label {0} does not occur in the mask")]
    MissingLabel(Label),

    #[error("`{path}` lacks a `{column}` column")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("could not read config file `{path}`: {source}")]
    Config { path: PathBuf, source: toml::de::Error },

    #[error("`{program}` exited with {status}: {stderr}")]
    Command { program: String, status: std::process::ExitStatus, stderr: String },

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Entity(#[from] entities::EntityError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach the offending path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io { path: path.into(), source })
    }
}
