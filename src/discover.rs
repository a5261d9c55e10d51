//! Finding inputs in a tree of FEAT output directories
//! (`<root>/sub-*_ses-*_task-*_run-NN{LN,NL}.feat/...`).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use entities::{Entities, Registration, StatImage, Template};
use itertools::iproduct;

use crate::error::IoContext;
use crate::{Error, Result};

pub const DEFAULT_PATTERN: &str = "*.feat/stats/zfstat*.nii.gz";
/// Statistical images already registered to standard space
pub const REGISTERED_PATTERN: &str = "*.feat/stats/zfstat*_[LN][NL].nii.gz";

pub const FILTERED_FUNC: &str = "filtered_func_data.nii.gz";
pub const FUNC_TO_STANDARD: &str = "reg/example_func2standard.mat";

/// A statistical image together with everything its path says about it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatImageFile {
    pub path: PathBuf,
    pub entities: Entities,
    pub registration: Registration,
    pub stat: StatImage,
}

/// The nearest enclosing `*.feat` directory
pub fn enclosing_feat_dir(path: &Path) -> Option<&Path> {
    path.ancestors()
        .skip(1)
        .find(|p| p.file_name().and_then(|n| n.to_str()).map_or(false, |n| n.ends_with(".feat")))
}

/// Name of the nearest enclosing `*.feat` directory
fn feat_dir_of(path: &Path) -> Option<&str> {
    enclosing_feat_dir(path)?.file_name()?.to_str()
}

impl StatImageFile {

    pub fn from_path(path: PathBuf) -> Result<Self> {
        let file_name = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Invalid(format!("`{}` has no usable file name", path.display())))?;
        let stat = StatImage::parse(file_name)?;
        let feat_dir = feat_dir_of(&path);
        let entities = Entities::parse(feat_dir.unwrap_or(file_name))?;
        // A registration suffix on the image itself wins over the FEAT directory's
        let registration = stat.registration
            .or_else(|| feat_dir.map(Registration::from_feat_dir))
            .unwrap_or(Registration::Linear);
        Ok(Self { path, entities, registration, stat })
    }
}

fn glob_under(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{}", glob::Pattern::escape(&root.to_string_lossy()), pattern);
    let mut paths = vec![];
    for entry in glob::glob(&full)? {
        match entry {
            Ok(path) => paths.push(path),
            Err(e) => {
                let path = e.path().to_path_buf();
                return Err(Error::Io { path, source: e.into() });
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Statistical images under `root` matching `pattern`, sorted by path.
/// Matches whose names do not follow the naming convention are skipped.
pub fn find_stat_images(root: &Path, pattern: &str) -> Result<Vec<StatImageFile>> {
    let found: Vec<_> = glob_under(root, pattern)?
        .into_iter()
        .filter_map(|path| match StatImageFile::from_path(path.clone()) {
            Ok(file) => Some(file),
            Err(e) => { log::warn!("skipping {}: {e}", path.display()); None }
        })
        .collect();
    log::info!("found {} statistical images under {}", found.len(), root.display());
    Ok(found)
}

// ----- Registration inputs -----------------------------------------------------------------------------

/// A preprocessed 4D functional image and the affine taking it to standard space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInput {
    pub feat_dir: PathBuf,
    pub image: PathBuf,
    pub affine: PathBuf,
}

/// FEAT directories directly under `root` whose registration kind matches,
/// and which contain both the filtered functional data and its affine.
pub fn find_registration_inputs(root: &Path, registration: Registration) -> Result<Vec<RegistrationInput>> {
    let mut inputs = vec![];
    for entry in std::fs::read_dir(root).at(root)? {
        let feat_dir = entry.at(root)?.path();
        let Some(name) = feat_dir.file_name().and_then(|n| n.to_str()) else { continue };
        if !feat_dir.is_dir() || Registration::from_feat_dir(name) != registration { continue }

        let image  = feat_dir.join(FILTERED_FUNC);
        let affine = feat_dir.join(FUNC_TO_STANDARD);
        if !image.exists() {
            log::debug!("{} does not exist", image.display());
            continue;
        }
        if !affine.exists() {
            log::debug!("{} does not exist", affine.display());
            continue;
        }
        inputs.push(RegistrationInput { feat_dir, image, affine });
    }
    inputs.sort_by(|a, b| a.feat_dir.cmp(&b.feat_dir));
    Ok(inputs)
}

/// Unregistered statistical images under `root` matching `pattern`, in FEAT
/// directories of the given kind, each paired with its FEAT directory's
/// functional-to-standard affine. Images whose FEAT directory lacks the
/// affine are skipped.
pub fn find_stat_registration_inputs(root: &Path, pattern: &str, registration: Registration) -> Result<Vec<RegistrationInput>> {
    let mut inputs = vec![];
    for file in find_stat_images(root, pattern)? {
        if file.registration != registration || file.stat.registration.is_some() { continue }
        let Some(feat_dir) = enclosing_feat_dir(&file.path) else { continue };
        let affine = feat_dir.join(FUNC_TO_STANDARD);
        if !affine.exists() {
            log::debug!("{} does not exist", affine.display());
            continue;
        }
        inputs.push(RegistrationInput { feat_dir: feat_dir.to_path_buf(), affine, image: file.path });
    }
    Ok(inputs)
}

// ----- Parameter space ---------------------------------------------------------------------------------

/// The distinct entity values seen across a set of FEAT directories, in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSpace {
    pub subjects: Vec<String>,
    pub sessions: Vec<String>,
    pub tasks: Vec<String>,
    pub runs: Vec<u32>,
    pub contrasts: Vec<u32>,
}

fn push_unique<T: Clone + Eq + std::hash::Hash>(seen: &mut HashSet<T>, list: &mut Vec<T>, item: &T) {
    if seen.insert(item.clone()) { list.push(item.clone()) }
}

/// A combination of parameters whose rendered path exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub entities: Entities,
    pub contrast: u32,
    pub registration: Registration,
    pub path: PathBuf,
}

impl ParameterSpace {

    pub fn from_feat_dirs<S: AsRef<str>>(names: impl IntoIterator<Item = S>, contrasts: Vec<u32>) -> Self {
        let mut space = Self { contrasts, ..Self::default() };
        let (mut subs, mut sess, mut tasks, mut runs) = (HashSet::new(), HashSet::new(), HashSet::new(), HashSet::new());
        for name in names {
            let name = name.as_ref();
            match Entities::parse(name) {
                Ok(e) => {
                    push_unique(&mut subs , &mut space.subjects, &e.subject);
                    push_unique(&mut sess , &mut space.sessions, &e.session);
                    push_unique(&mut tasks, &mut space.tasks   , &e.task);
                    push_unique(&mut runs , &mut space.runs    , &e.run);
                }
                Err(err) => log::warn!("ignoring {name}: {err}"),
            }
        }
        space
    }

    /// From the names of the entries directly under `root`
    pub fn from_root(root: &Path, contrasts: Vec<u32>) -> Result<Self> {
        let mut names = vec![];
        for entry in std::fs::read_dir(root).at(root)? {
            if let Some(name) = entry.at(root)?.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(Self::from_feat_dirs(names, contrasts))
    }

    pub fn len(&self) -> usize {
        self.subjects.len() * self.sessions.len() * self.tasks.len() * self.runs.len() * self.contrasts.len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Cartesian product of all parameters
    pub fn combinations(&self) -> impl Iterator<Item = (Entities, u32)> + '_ {
        iproduct!(&self.subjects, &self.sessions, &self.tasks, &self.runs, &self.contrasts)
            .map(|(sub, ses, task, &run, &contrast)| (Entities::new(sub, ses, task, run), contrast))
    }

    /// Render `template` for every combination and keep the paths that exist.
    pub fn expand(&self, root: &Path, template: &Template, registration: Registration) -> Result<Vec<Candidate>> {
        let mut found = vec![];
        for (entities, contrast) in self.combinations() {
            let path = root.join(template.render(&entities, contrast, registration)?);
            if path.exists() { found.push(Candidate { entities, contrast, registration, path }) }
        }
        log::info!("{} of {} possible {registration} files exist", found.len(), self.len());
        Ok(found)
    }
}

// ----- Grouping ----------------------------------------------------------------------------------------

/// The images which are analysed together at group level
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub contrast: u32,
    pub task: String,
    pub session: String,
    pub run: u32,
    pub registration: Registration,
}

impl GroupKey {
    pub fn new(entities: &Entities, contrast: u32, registration: Registration) -> Self {
        let Entities { session, task, run, .. } = entities;
        Self { contrast, task: task.clone(), session: session.clone(), run: *run, registration }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self { contrast, task, session, run, registration } = self;
        write!(f, "{contrast}_{task}_{session}_{run}_{}", registration.tag())
    }
}

/// Which subjects have an image for each (contrast, task, session, run,
/// registration)
pub fn group_subjects(files: &[StatImageFile]) -> BTreeMap<GroupKey, Vec<String>> {
    let mut groups: BTreeMap<GroupKey, Vec<String>> = BTreeMap::new();
    for file in files {
        let key = GroupKey::new(&file.entities, file.stat.contrast, file.registration);
        groups.entry(key).or_default().push(file.entities.subject.clone());
    }
    for subjects in groups.values_mut() {
        subjects.sort();
        subjects.dedup();
    }
    groups
}

/// The image paths in each group, ordered by subject
pub fn group_paths(candidates: &[Candidate]) -> BTreeMap<GroupKey, Vec<PathBuf>> {
    let mut groups: BTreeMap<GroupKey, Vec<(&str, &Path)>> = BTreeMap::new();
    for c in candidates {
        let key = GroupKey::new(&c.entities, c.contrast, c.registration);
        groups.entry(key).or_default().push((c.entities.subject.as_str(), c.path.as_path()));
    }
    groups.into_iter()
        .map(|(key, mut members)| {
            members.sort();
            (key, members.into_iter().map(|(_, path)| path.to_path_buf()).collect())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use entities::StatKind;
    use tempfile::{tempdir, TempDir};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn touch(root: &Path, relative: &str) -> std::io::Result<()> {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap())?;
        std::fs::write(path, b"")
    }

    fn feat_tree() -> std::io::Result<TempDir> {
        let dir = tempdir()?;
        let root = dir.path();
        for relative in [
            "sub-A_ses-base_task-sst_run-01LN.feat/stats/zfstat1.nii.gz",
            "sub-A_ses-base_task-sst_run-01LN.feat/stats/zfstat2.nii.gz",
            "sub-A_ses-base_task-sst_run-01LN.feat/stats/cope1.nii.gz",
            "sub-A_ses-base_task-sst_run-01LN.feat/filtered_func_data.nii.gz",
            "sub-A_ses-base_task-sst_run-01LN.feat/reg/example_func2standard.mat",
            "sub-B_ses-base_task-sst_run-02NL.feat/stats/zfstat1.nii.gz",
            "sub-B_ses-base_task-sst_run-02NL.feat/filtered_func_data.nii.gz",
            "sub-B_ses-base_task-sst_run-02NL.feat/reg/example_func2standard.mat",
            "sub-C_ses-base_task-sst_run-01LN.feat/stats/zfstat1_LN.nii.gz",
            "sub-C_ses-base_task-sst_run-01LN.feat/filtered_func_data.nii.gz",
            "not-a-feat-dir/stats/zfstat1.nii.gz",
        ] {
            touch(root, relative)?;
        }
        Ok(dir)
    }

    #[test]
    fn stat_images_default_pattern() -> TestResult {
        let dir = feat_tree()?;
        let found = find_stat_images(dir.path(), DEFAULT_PATTERN)?;
        let summary: Vec<_> = found.iter()
            .map(|f| (f.entities.subject.as_str(), f.entities.run, f.registration, f.stat.contrast, f.stat.registration))
            .collect();
        assert_eq!(summary, vec![
            ("A", 1, Registration::Linear   , 1, None),
            ("A", 1, Registration::Linear   , 2, None),
            ("B", 2, Registration::Nonlinear, 1, None),
            ("C", 1, Registration::Linear   , 1, Some(Registration::Linear)),
        ]);
        Ok(())
    }

    #[test]
    fn registered_pattern_only_tagged_images() -> TestResult {
        let dir = feat_tree()?;
        let found = find_stat_images(dir.path(), REGISTERED_PATTERN)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stat.registration, Some(Registration::Linear));
        assert_eq!(found[0].entities.subject, "C");
        Ok(())
    }

    #[test]
    fn stat_images_custom_pattern() -> TestResult {
        let dir = feat_tree()?;
        let found = find_stat_images(dir.path(), "*.feat/stats/cope*.nii.gz")?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stat.kind, StatKind::Cope);
        Ok(())
    }

    #[test]
    fn registration_inputs_by_kind() -> TestResult {
        let dir = feat_tree()?;
        let linear = find_registration_inputs(dir.path(), Registration::Linear)?;
        // sub-C lacks the affine
        assert_eq!(linear.len(), 1);
        assert!(linear[0].image.ends_with("sub-A_ses-base_task-sst_run-01LN.feat/filtered_func_data.nii.gz"));
        assert!(linear[0].affine.ends_with("reg/example_func2standard.mat"));
        let nonlinear = find_registration_inputs(dir.path(), Registration::Nonlinear)?;
        assert_eq!(nonlinear.len(), 1);
        assert!(nonlinear[0].feat_dir.ends_with("sub-B_ses-base_task-sst_run-02NL.feat"));
        Ok(())
    }

    #[test]
    fn stat_images_paired_with_affines() -> TestResult {
        let dir = feat_tree()?;
        let linear = find_stat_registration_inputs(dir.path(), DEFAULT_PATTERN, Registration::Linear)?;
        // sub-C's image is already registered, and its FEAT directory has no affine
        let images: Vec<_> = linear.iter().map(|i| i.image.strip_prefix(dir.path()).unwrap().to_path_buf()).collect();
        assert_eq!(images, vec![
            PathBuf::from("sub-A_ses-base_task-sst_run-01LN.feat/stats/zfstat1.nii.gz"),
            PathBuf::from("sub-A_ses-base_task-sst_run-01LN.feat/stats/zfstat2.nii.gz"),
        ]);
        assert_eq!(linear[0].affine, dir.path().join("sub-A_ses-base_task-sst_run-01LN.feat/reg/example_func2standard.mat"));
        assert_eq!(linear[0].feat_dir, dir.path().join("sub-A_ses-base_task-sst_run-01LN.feat"));

        let nonlinear = find_stat_registration_inputs(dir.path(), DEFAULT_PATTERN, Registration::Nonlinear)?;
        assert_eq!(nonlinear.len(), 1);
        assert!(nonlinear[0].image.ends_with("sub-B_ses-base_task-sst_run-02NL.feat/stats/zfstat1.nii.gz"));
        Ok(())
    }

    #[test]
    fn parameter_space_first_seen_order() {
        let space = ParameterSpace::from_feat_dirs([
            "sub-B_ses-y1_task-sst_run-02LN.feat",
            "sub-A_ses-y1_task-sst_run-01LN.feat",
            "sub-B_ses-y2_task-sst_run-01LN.feat",
            "garbage",
        ], vec![1, 2]);
        assert_eq!(space.subjects, vec!["B", "A"]);
        assert_eq!(space.sessions, vec!["y1", "y2"]);
        assert_eq!(space.tasks   , vec!["sst"]);
        assert_eq!(space.runs    , vec![2, 1]);
        assert_eq!(space.len(), 2 * 2 * 1 * 2 * 2);
        assert_eq!(space.combinations().count(), space.len());
    }

    #[test]
    fn expand_keeps_existing_paths() -> TestResult {
        let dir = feat_tree()?;
        let space = ParameterSpace::from_root(dir.path(), vec![1, 2, 3])?;
        let template = Template::default();
        let found = space.expand(dir.path(), &template, Registration::Linear)?;
        let found: Vec<_> = found.iter().map(|c| (c.entities.subject.as_str(), c.contrast)).collect();
        assert_eq!(found, vec![("A", 1), ("A", 2)]);
        Ok(())
    }

    fn key(contrast: u32, run: u32, registration: Registration) -> GroupKey {
        GroupKey { contrast, task: "sst".into(), session: "base".into(), run, registration }
    }

    #[test]
    fn group_by_contrast_task_session_run_registration() -> TestResult {
        let dir = feat_tree()?;
        let files = find_stat_images(dir.path(), DEFAULT_PATTERN)?;
        let groups = group_subjects(&files);
        use Registration::*;
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[&key(1, 1, Linear)], vec!["A", "C"]);
        assert_eq!(groups[&key(2, 1, Linear)], vec!["A"]);
        assert_eq!(groups[&key(1, 2, Nonlinear)], vec!["B"]);
        assert_eq!(key(1, 2, Nonlinear).to_string(), "1_sst_base_2_NL");
        Ok(())
    }

    #[test]
    fn linear_and_nonlinear_never_share_a_group() -> TestResult {
        let dir = tempdir()?;
        for relative in [
            "sub-B_ses-base_task-sst_run-01LN.feat/stats/zfstat1_LN.nii.gz",
            "sub-A_ses-base_task-sst_run-01LN.feat/stats/zfstat1_LN.nii.gz",
            "sub-A_ses-base_task-sst_run-01NL.feat/stats/zfstat1_NL.nii.gz",
        ] {
            touch(dir.path(), relative)?;
        }
        let space = ParameterSpace::from_root(dir.path(), vec![1])?;
        let template = Template::new(Template::REGISTERED_ZFSTAT)?;
        let mut candidates = space.expand(dir.path(), &template, Registration::Linear)?;
        candidates.extend(space.expand(dir.path(), &template, Registration::Nonlinear)?);

        let groups = group_paths(&candidates);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&key(1, 1, Registration::Linear)], vec![
            dir.path().join("sub-A_ses-base_task-sst_run-01LN.feat/stats/zfstat1_LN.nii.gz"),
            dir.path().join("sub-B_ses-base_task-sst_run-01LN.feat/stats/zfstat1_LN.nii.gz"),
        ]);
        assert_eq!(groups[&key(1, 1, Registration::Nonlinear)], vec![
            dir.path().join("sub-A_ses-base_task-sst_run-01NL.feat/stats/zfstat1_NL.nii.gz"),
        ]);
        Ok(())
    }
}
