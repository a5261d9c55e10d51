//! Regions of interest defined by an integer label volume.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::volume::{index1_to_3, index3_to_1, Index3, Volume};
use crate::{Error, Result};

pub type Label = u32;

/// Voxel coordinates of every non-zero label in a mask.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    shape: Index3,
    regions: BTreeMap<Label, Vec<Index3>>,
}

impl LabelMap {

    /// Mask values are rounded to the nearest integer; zero, negative and
    /// non-finite values are background.
    pub fn from_mask(mask: &Volume) -> Result<Self> {
        if !mask.is_3d() { return Err(Error::MaskNot3D(mask.frames)) }
        let mut regions: BTreeMap<Label, Vec<Index3>> = BTreeMap::new();
        for (index, value) in mask.frame(0).iter().copied().enumerate() {
            let rounded = value.round();
            if !rounded.is_finite() || rounded < 1.0 { continue }
            if rounded > Label::MAX as f32 {
                return Err(Error::Invalid(format!("mask value {value} is too large to be a label")));
            }
            regions.entry(rounded as Label)
                .or_default()
                .push(index1_to_3(index, mask.shape));
        }
        log::debug!("mask has {} labels", regions.len());
        Ok(Self { shape: mask.shape, regions })
    }

    pub fn shape(&self) -> Index3 { self.shape }

    /// Ascending
    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ { self.regions.keys().copied() }

    pub fn voxels(&self, label: Label) -> Option<&[Index3]> {
        self.regions.get(&label).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize { self.regions.len() }

    pub fn is_empty(&self) -> bool { self.regions.is_empty() }

    /// Keep only `labels`, all of which must be present in the mask.
    pub fn restrict(mut self, labels: &[Label]) -> Result<Self> {
        if let Some(&missing) = labels.iter().find(|l| !self.regions.contains_key(l)) {
            return Err(Error::MissingLabel(missing));
        }
        self.regions.retain(|label, _| labels.contains(label));
        Ok(self)
    }

    fn check_shape(&self, image: &Volume) -> Result<()> {
        if image.shape != self.shape {
            return Err(Error::ShapeMismatch { image: image.shape, mask: self.shape });
        }
        Ok(())
    }

    /// Image values at the voxels of `label`, one `Vec` per frame.
    pub fn values(&self, image: &Volume, label: Label) -> Result<Vec<Vec<f32>>> {
        self.check_shape(image)?;
        let voxels = self.voxels(label).ok_or(Error::MissingLabel(label))?;
        Ok(image.iter_frames()
           .map(|frame| voxels.iter().map(|&i3| frame[index3_to_1(i3, self.shape)]).collect())
           .collect())
    }

    /// Every label in every frame of `image`, ordered by frame, then label.
    pub fn extract(&self, image: &Volume, reduction: Reduction) -> Result<Vec<Extracted>> {
        self.check_shape(image)?;
        let mut out = Vec::with_capacity(self.len() * image.frames);
        for (frame, data) in image.iter_frames().enumerate() {
            for (&label, voxels) in &self.regions {
                let values = match reduction {
                    Reduction::Mean => Values::Summary(RegionSummary::of(
                        voxels.iter().map(|&i3| data[index3_to_1(i3, self.shape)])
                    )),
                    Reduction::Raw => Values::Voxels(
                        voxels.iter().map(|&i3| (i3, data[index3_to_1(i3, self.shape)])).collect()
                    ),
                };
                out.push(Extracted { label, frame, values });
            }
        }
        Ok(out)
    }
}

// ----- Reductions --------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reduction {
    /// One summary per region
    #[default]
    Mean,
    /// Every voxel value with its coordinates
    Raw,
}

impl std::str::FromStr for Reduction {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "raw"  => Ok(Self::Raw),
            _      => Err(format!("unknown reduction `{s}`: expected `mean` or `raw`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub label: Label,
    pub frame: usize,
    pub values: Values,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Summary(RegionSummary),
    Voxels(Vec<(Index3, f32)>),
}

/// Mean and (population) standard deviation of the finite values in a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSummary {
    pub n_voxels: usize,
    pub mean: f32,
    pub sd: f32,
}

impl RegionSummary {
    /// NaN mean and sd when there are no finite values
    pub fn of(values: impl IntoIterator<Item = f32>) -> Self {
        let (n, sum, sum_sq) = values.into_iter()
            .filter(|v| v.is_finite())
            .map(f64::from)
            .fold((0_usize, 0.0, 0.0), |(n, s, ss), v| (n + 1, s + v, ss + v * v));
        if n == 0 {
            return Self { n_voxels: 0, mean: f32::NAN, sd: f32::NAN };
        }
        let mean = sum / n as f64;
        // Clamp rounding noise which could make the variance slightly negative
        let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
        Self { n_voxels: n, mean: mean as f32, sd: variance.sqrt() as f32 }
    }
}
