use std::path::Path;

use indicatif::ProgressBar;
use proptest::prelude::*;
use tempfile::tempdir;
#[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

use featpipe::{
    discover::{find_stat_images, DEFAULT_PATTERN},
    entities::Registration,
    extract::{extract, Job, Rows},
    roi::{LabelMap, Reduction, RegionSummary, Values},
    volume::Volume,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const SHAPE: [usize; 3] = [3, 2, 2];

// Label 1: the x=0 column, label 2: the x=2 column, x=1 is background
fn mask() -> featpipe::Result<Volume> {
    let data = (0..12).map(|i| match i % 3 { 0 => 1.0, 2 => 2.0, _ => 0.0 }).collect();
    Volume::new(SHAPE, 1, data)
}

fn write_image(root: &Path, feat_dir: &str, name: &str, offset: f32) -> TestResult {
    let stats = root.join(feat_dir).join("stats");
    std::fs::create_dir_all(&stats)?;
    let data = (0..12).map(|i| offset + i as f32).collect();
    Volume::new(SHAPE, 1, data)?.save(stats.join(name))?;
    Ok(())
}

#[test]
fn discover_extract_write() -> TestResult {
    let dir = tempdir()?;
    let root = dir.path();
    write_image(root, "sub-A_ses-base_task-sst_run-01LN.feat", "zfstat1.nii.gz",   0.0)?;
    write_image(root, "sub-A_ses-base_task-sst_run-01LN.feat", "zfstat2.nii.gz", 100.0)?;
    write_image(root, "sub-B_ses-base_task-sst_run-02NL.feat", "zfstat1.nii.gz", 200.0)?;
    mask()?.save(root.join("mask.nii.gz"))?;

    let map = LabelMap::from_mask(&Volume::load(root.join("mask.nii.gz"))?)?;
    assert_eq!(map.labels().collect::<Vec<_>>(), vec![1, 2]);

    let files = find_stat_images(root, DEFAULT_PATTERN)?;
    let linear: Vec<Job> = files.into_iter()
        .filter(|f| f.registration == Registration::Linear)
        .map(Job::from)
        .collect();
    assert_eq!(linear.len(), 2);

    let out = extract(&map, &linear, Reduction::Mean, 2, ProgressBar::hidden())?;
    assert!(out.failures.is_empty());

    // Label 1 holds flat indices 0, 3, 6, 9 and label 2 holds 2, 5, 8, 11
    let Rows::Mean(rows) = &out.rows else { panic!("expected mean rows") };
    let got: Vec<_> = rows.iter().map(|r| (r.contrast, r.label, r.n_voxels, r.mean)).collect();
    assert_eq!(got, vec![
        (Some(1), 1, 4,   4.5),
        (Some(1), 2, 4,   6.5),
        (Some(2), 1, 4, 104.5),
        (Some(2), 2, 4, 106.5),
    ]);

    let csv = root.join("roi.csv");
    out.rows.write_csv(&csv)?;
    let text = std::fs::read_to_string(&csv)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("subject,session,task,run,contrast,image_type,registration,label,frame,n_voxels,mean,sd"));
    assert!(lines.next().unwrap_or_default().starts_with("A,base,sst,1,1,zfstat,linear,1,0,4,4.5,"));
    assert_eq!(lines.count(), 3);
    Ok(())
}

#[test]
fn shape_mismatch_reported_per_image() -> TestResult {
    let dir = tempdir()?;
    let root = dir.path();
    write_image(root, "sub-A_ses-base_task-sst_run-01LN.feat", "zfstat1.nii.gz", 0.0)?;
    let wrong = root.join("sub-B_ses-base_task-sst_run-01LN.feat/stats");
    std::fs::create_dir_all(&wrong)?;
    Volume::new([2, 2, 2], 1, vec![0.0; 8])?.save(wrong.join("zfstat1.nii.gz"))?;

    let map = LabelMap::from_mask(&mask()?)?;
    let jobs: Vec<Job> = find_stat_images(root, DEFAULT_PATTERN)?.into_iter().map(Job::from).collect();
    let out = extract(&map, &jobs, Reduction::Raw, 1, ProgressBar::hidden())?;
    assert_eq!(out.failures.len(), 1);
    assert!(out.failures[0].0.to_string_lossy().contains("sub-B"));
    // 8 labelled voxels from the good image
    assert_eq!(out.rows.len(), 8);
    Ok(())
}

proptest! {
    // Every labelled voxel appears in exactly one region, and the region means
    // agree with a direct computation
    #[test]
    fn regions_partition_labelled_voxels(
        labels in proptest::collection::vec(0u32..4, 12),
        values in proptest::collection::vec(-10.0f32..10.0, 12),
    ) {
        let mask = Volume::new(SHAPE, 1, labels.iter().map(|&l| l as f32).collect()).unwrap();
        let image = Volume::new(SHAPE, 1, values.clone()).unwrap();
        let map = LabelMap::from_mask(&mask).unwrap();

        let n_labelled = labels.iter().filter(|&&l| l > 0).count();
        let n_in_regions: usize = map.labels().map(|l| map.voxels(l).unwrap().len()).sum();
        prop_assert_eq!(n_in_regions, n_labelled);

        for extracted in map.extract(&image, Reduction::Mean).unwrap() {
            let Values::Summary(RegionSummary { n_voxels, mean, .. }) = extracted.values else {
                panic!("expected a summary")
            };
            let mine: Vec<f32> = labels.iter().zip(&values)
                .filter(|(l, _)| **l == extracted.label)
                .map(|(_, &v)| v)
                .collect();
            prop_assert_eq!(n_voxels, mine.len());
            let expected = mine.iter().map(|&v| v as f64).sum::<f64>() / mine.len() as f64;
            prop_assert!((mean as f64 - expected).abs() < 1e-4);
        }
    }
}
