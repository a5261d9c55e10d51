//! Parallel ROI extraction over many images, flattened into one table.

use std::path::{Path, PathBuf};

use entities::{Entities, Registration};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use serde::Serialize;

use crate::discover::StatImageFile;
use crate::roi::{Extracted, Label, LabelMap, Reduction, Values};
use crate::volume::Volume;
use crate::{Error, Result};

/// What is known about an image from its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    pub entities: Entities,
    /// Absent for images which are not per-contrast statistics
    pub contrast: Option<u32>,
    pub image_type: String,
    pub registration: Registration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub image: PathBuf,
    pub meta: ImageMeta,
}

impl From<StatImageFile> for Job {
    fn from(file: StatImageFile) -> Self {
        let StatImageFile { path, entities, registration, stat } = file;
        let meta = ImageMeta {
            entities,
            contrast: Some(stat.contrast),
            image_type: stat.kind.to_string(),
            registration,
        };
        Self { image: path, meta }
    }
}

// ----- Output rows -------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanRow {
    pub subject: String,
    pub session: String,
    pub task: String,
    pub run: u32,
    pub contrast: Option<u32>,
    pub image_type: String,
    pub registration: Registration,
    pub label: Label,
    pub frame: usize,
    pub n_voxels: usize,
    pub mean: f32,
    pub sd: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoxelRow {
    pub subject: String,
    pub session: String,
    pub task: String,
    pub run: u32,
    pub contrast: Option<u32>,
    pub image_type: String,
    pub registration: Registration,
    pub label: Label,
    pub frame: usize,
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub value: f32,
}

/// The flattened table: its columns depend on the reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    Mean(Vec<MeanRow>),
    Raw(Vec<VoxelRow>),
}

impl Rows {

    fn empty(reduction: Reduction) -> Self {
        match reduction {
            Reduction::Mean => Self::Mean(vec![]),
            Reduction::Raw  => Self::Raw (vec![]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Mean(rows) => rows.len(),
            Self::Raw (rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn append(&mut self, meta: &ImageMeta, extracted: Vec<Extracted>) {
        let ImageMeta { entities: Entities { subject, session, task, run }, contrast, image_type, registration } = meta;
        for Extracted { label, frame, values } in extracted {
            match (&mut *self, values) {
                (Self::Mean(rows), Values::Summary(s)) => rows.push(MeanRow {
                    subject: subject.clone(), session: session.clone(), task: task.clone(), run: *run,
                    contrast: *contrast, image_type: image_type.clone(), registration: *registration,
                    label, frame,
                    n_voxels: s.n_voxels, mean: s.mean, sd: s.sd,
                }),
                (Self::Raw(rows), Values::Voxels(voxels)) => rows.extend(voxels.into_iter().map(|([x, y, z], value)| VoxelRow {
                    subject: subject.clone(), session: session.clone(), task: task.clone(), run: *run,
                    contrast: *contrast, image_type: image_type.clone(), registration: *registration,
                    label, frame,
                    x, y, z, value,
                })),
                // `LabelMap::extract` produces values matching the requested reduction
                _ => unreachable!("reduction and extracted values disagree"),
            }
        }
    }

    /// Single CSV file with a header row
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        match self {
            Self::Mean(rows) => for row in rows { writer.serialize(row)? },
            Self::Raw (rows) => for row in rows { writer.serialize(row)? },
        }
        writer.flush().map_err(|source| Error::Io { path: path.into(), source })?;
        Ok(())
    }
}

// ----- Running jobs ------------------------------------------------------------------------------------

/// Rows for every job that succeeded, in job order, and the errors of the
/// jobs that did not.
#[derive(Debug)]
pub struct Extraction {
    pub rows: Rows,
    pub failures: Vec<(PathBuf, Error)>,
}

fn run_job(map: &LabelMap, job: &Job, reduction: Reduction) -> Result<Vec<Extracted>> {
    let image = Volume::load(&job.image)?;
    map.extract(&image, reduction)
}

/// Extract every label of `map` from every job's image on a pool of
/// `threads` workers. `bar` is advanced once per job.
pub fn extract(map: &LabelMap, jobs: &[Job], reduction: Reduction, threads: usize, bar: ProgressBar) -> Result<Extraction> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Invalid(format!("could not start {threads} worker threads: {e}")))?;

    let results: Vec<_> = pool.install(|| jobs
        .par_iter()
        .progress_with(bar.clone())
        .map(|job| run_job(map, job, reduction))
        .collect());
    bar.finish();

    let mut rows = Rows::empty(reduction);
    let mut failures = vec![];
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(extracted) => rows.append(&job.meta, extracted),
            Err(e) => {
                log::error!("{}: {e}", job.image.display());
                failures.push((job.image.clone(), e));
            }
        }
    }
    log::info!("extracted {} rows from {} of {} images", rows.len(), jobs.len() - failures.len(), jobs.len());
    Ok(Extraction { rows, failures })
}
