//! Configuration file parser for ROI extraction runs

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, de};

use entities::Registration;

use crate::discover::DEFAULT_PATTERN;
use crate::roi::{Label, Reduction};
use crate::utils::parse_labels;
use crate::{Error, Result};

/// Labels may be given as a TOML array (`[1, 2, 7]`) or as a compact
/// string (`"1-3,7"`).
fn deserialize_labels<'d, D>(deserializer: D) -> std::result::Result<Vec<Label>, D::Error>
where
    D: Deserializer<'d>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Labels {
        List(Vec<Label>),
        Text(String),
    }
    match Labels::deserialize(deserializer)? {
        Labels::List(labels) => Ok(labels),
        Labels::Text(text)   => parse_labels(&text).map_err(de::Error::custom),
    }
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Directory containing the FEAT output directories
    pub root: Option<PathBuf>,

    /// Integer label volume defining the regions
    pub mask: Option<PathBuf>,

    /// Glob, relative to `root`, selecting the images to extract from
    #[serde(default = "default_pattern")]
    pub pattern: String,

    /// Restrict extraction to these labels. Empty means all labels in the mask.
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_labels")]
    pub labels: Vec<Label>,

    #[serde(default)]
    pub reduction: Reduction,

    /// Only use images registered this way
    pub registration: Option<Registration>,

    #[serde(default = "default_output")]
    pub output: PathBuf,

    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Process at most this many images
    pub limit: Option<usize>,
}

fn default_pattern() -> String { DEFAULT_PATTERN.to_string() }
fn default_output() -> PathBuf { "roi_values.csv".into() }
fn default_threads() -> usize { 4 }

impl Default for Config {
    fn default() -> Self {
        Self {
            root: None,
            mask: None,
            pattern: default_pattern(),
            labels: vec![],
            reduction: Reduction::default(),
            registration: None,
            output: default_output(),
            threads: default_threads(),
            limit: None,
        }
    }
}

pub fn read_config_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .map_err(|source| Error::Io { path: path.into(), source })?;
    toml::from_str(&text)
        .map_err(|source| Error::Config { path: path.into(), source })
}


#[cfg(test)]
mod tests {
    use super::*;

    // ----- Test an example on-disk config file -----------------------------------------
    #[test]
    fn test_config_file() -> Result<()> {
        let config = read_config_file(Path::new("roi-config.toml"))?;
        assert_eq!(config.root, Some("/mnt/storage/feat-preprocess-datasink".into()));
        assert_eq!(config.mask, Some("grantmask_labeled.nii".into()));
        assert_eq!(config.pattern, "*.feat/stats/zfstat*_LN.nii.gz");
        assert_eq!(config.labels, vec![1, 2, 3, 7]);
        assert_eq!(config.reduction, Reduction::Raw);
        assert_eq!(config.registration, Some(Registration::Linear));
        assert_eq!(config.output, PathBuf::from("roi_values.csv"));
        assert_eq!(config.threads, 32);
        assert_eq!(config.limit, None);
        Ok(())
    }

    // ----- Some helpers to make the tests more concise ---------------------------------
    fn parse<'d, D: Deserialize<'d>>(input: &'d str) -> D {
        toml::from_str(input).unwrap()
    }
    fn parse_config(input: &str) -> std::result::Result<Config, toml::de::Error> {
        toml::from_str(input)
    }
    //  ---  Macro for concise assertions about values of parsed fields -------------------
    macro_rules! check {
        ($type:ident($text:expr).$field:ident = $expected:expr) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            assert_eq!(config.$field, $expected);
        };
        ($type:ident($text:expr) fields: $($field:ident = $expected:expr);+$(;)?) => {
            let config: $type = parse::<$type>($text);
            println!("DESERIALIZED: {config:?}");
            $(assert_eq!(config.$field, $expected);)*
        }
    }
    // ----- Defaults --------------------------------------------------------------------
    #[test]
    fn config_empty_is_default() {
        assert_eq!(parse::<Config>(""), Config::default());
        check!{Config("") fields:
               pattern   = DEFAULT_PATTERN;
               reduction = Reduction::Mean;
               threads   = 4;
               output    = PathBuf::from("roi_values.csv");
        }
    }
    // ----- Make sure that unknown fields are not accepted -----------------------------
    #[test]
    fn config_reject_unknown_field() {
        assert!(parse_config("unknown_field = 666").is_err());
    }
    // ----- Labels ----------------------------------------------------------------------
    #[test]
    fn config_labels_as_list() {
        check!(Config("labels = [3, 1, 2]").labels = vec![3, 1, 2]);
    }

    #[test]
    fn config_labels_as_string() {
        check!(Config(r#"labels = "1-4,9""#).labels = vec![1, 2, 3, 4, 9]);
    }

    #[test]
    fn config_labels_bad_string() {
        assert!(parse_config(r#"labels = "1-x""#).is_err());
    }
    // ----- Enumerations ----------------------------------------------------------------
    #[test]
    fn config_reduction_and_registration() {
        check!{Config(r#"
                 reduction = "raw"
                 registration = "nonlinear"
               "#) fields:
               reduction    = Reduction::Raw;
               registration = Some(Registration::Nonlinear);
        }
        assert!(parse_config(r#"reduction = "median""#).is_err());
    }
    // ----- Paths -----------------------------------------------------------------------
    #[test]
    fn config_paths() {
        check!{Config(r#"
                 root = "/data/feat"
                 mask = "mask.nii.gz"
                 output = "out/roi.csv"
                 limit = 10
               "#) fields:
               root   = Some(PathBuf::from("/data/feat"));
               mask   = Some(PathBuf::from("mask.nii.gz"));
               output = PathBuf::from("out/roi.csv");
               limit  = Some(10);
        }
    }
}
