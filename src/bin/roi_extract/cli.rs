/// Command line interface for `roi_extract` executable
#[derive(clap::Parser, Debug, Clone)]
#[clap(
    name = "roi_extract",
    about = "Extract per-region values from FEAT statistical images",
)]
pub (super) struct Cli {
    /// TOML file with default settings. Flags given here override it.
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Directory containing the `*.feat` directories
    #[clap(short, long)]
    pub root: Option<PathBuf>,

    /// Integer label volume defining the regions
    #[clap(short, long)]
    pub mask: Option<PathBuf>,

    /// Glob, relative to the root, selecting the images
    #[clap(short, long)]
    pub pattern: Option<String>,

    /// Only these labels, e.g. `1-3,7`
    #[clap(short, long, value_parser = label_list)]
    pub labels: Option<LabelList>,

    /// `mean` (per-region summary) or `raw` (every voxel)
    #[clap(long)]
    pub reduction: Option<Reduction>,

    /// Only use images registered this way: `linear` or `nonlinear`
    #[clap(long)]
    pub registration: Option<Registration>,

    /// CSV output file
    #[clap(short, long)]
    pub out: Option<PathBuf>,

    /// Number of images processed in parallel
    #[clap(short = 'j', long)]
    pub threads: Option<usize>,

    /// Process at most this many images
    #[clap(short = 'n', long)]
    pub limit: Option<usize>,

    /// Do not ask for confirmation
    #[clap(short = 'y', long)]
    pub yes: bool,
}

// Alias to disable clap's type magic
pub (super) type LabelList = Vec<Label>;

fn label_list(s: &str) -> std::result::Result<LabelList, String> {
    parse_labels(s).map_err(|e| e.to_string())
}

/// Everything needed for a run, after merging the config file and the command line
#[derive(Debug, Clone)]
pub (super) struct Settings {
    pub root: PathBuf,
    pub mask: PathBuf,
    pub pattern: String,
    pub labels: Vec<Label>,
    pub reduction: Reduction,
    pub registration: Option<Registration>,
    pub out: PathBuf,
    pub threads: usize,
    pub limit: Option<usize>,
    pub yes: bool,
}

impl Cli {
    pub (super) fn settings(self) -> Result<Settings> {
        let config = match &self.config {
            Some(path) => read_config_file(path)?,
            None       => Config::default(),
        };
        let missing = |what: &str| Error::Invalid(format!(
            "no {what} given: use --{what} or set `{what}` in the config file"
        ));
        Ok(Settings {
            root        : self.root        .or(config.root).ok_or_else(|| missing("root"))?,
            mask        : self.mask        .or(config.mask).ok_or_else(|| missing("mask"))?,
            pattern     : self.pattern     .unwrap_or(config.pattern),
            labels      : self.labels      .unwrap_or(config.labels),
            reduction   : self.reduction   .unwrap_or(config.reduction),
            registration: self.registration.or(config.registration),
            out         : self.out         .unwrap_or(config.output),
            threads     : self.threads     .unwrap_or(config.threads),
            limit       : self.limit       .or(config.limit),
            yes         : self.yes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn flags_override_config_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let config = dir.path().join("roi.toml");
        std::fs::write(&config, "root = \"/data\"\nmask = \"m.nii\"\nthreads = 3\nlabels = [1, 2]\n")?;
        let cli = Cli::try_parse_from([
            "roi_extract", "--config", config.to_str().unwrap(), "-j", "7", "--labels", "4-5",
        ])?;
        let settings = cli.settings()?;
        assert_eq!(settings.root, PathBuf::from("/data"));
        assert_eq!(settings.threads, 7);
        assert_eq!(settings.labels, vec![4, 5]);
        assert_eq!(settings.reduction, Reduction::Mean);
        Ok(())
    }

    #[test]
    fn root_and_mask_are_required() {
        let cli = Cli::try_parse_from(["roi_extract", "--root", "/data"]).unwrap();
        assert!(matches!(cli.settings(), Err(Error::Invalid(_))));
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::path::PathBuf;
use featpipe::{
    Error, Result,
    config::roi::{read_config_file, Config},
    entities::Registration,
    roi::{Label, Reduction},
    utils::parse_labels,
};
