//! 3D and 4D NIfTI images held as flat, x-fastest `f32` buffers.

use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};

use crate::{Error, Result};

pub type Index3 = [usize; 3];

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// Spatial extent: voxels along x, y and z
    pub shape: Index3,
    /// Number of 3D frames (1 for 3D images)
    pub frames: usize,
    /// All frames back to back, x varying fastest within each frame
    pub data: Vec<f32>,
}

impl Volume {

    pub fn new(shape: Index3, frames: usize, data: Vec<f32>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * frames;
        if data.len() != expected {
            return Err(Error::Invalid(format!(
                "{} values cannot fill {frames} frame(s) of shape {shape:?}", data.len()
            )));
        }
        Ok(Self { shape, frames, data })
    }

    /// Read a `.nii` or `.nii.gz` file. Scaling (`scl_slope`, `scl_inter`) is
    /// applied by the reader.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let nifti_err = |source| Error::Nifti { path: path.into(), source };
        let array = ReaderOptions::new()
            .read_file(path).map_err(nifti_err)?
            .into_volume()
            .into_ndarray::<f32>().map_err(nifti_err)?;
        log::debug!("loaded {} with shape {:?}", path.display(), array.shape());
        Self::from_array(array).map_err(|e| match e {
            Error::Dimensionality { ndim, .. } => Error::Dimensionality { path: path.into(), ndim },
            other => other,
        })
    }

    /// Accepts arrays indexed `[x, y, z]` or `[x, y, z, t]`.
    pub fn from_array(array: ArrayD<f32>) -> Result<Self> {
        let (shape, frames) = match *array.shape() {
            [nx, ny, nz]         => ([nx, ny, nz], 1),
            [nx, ny, nz, nt]     => ([nx, ny, nz], nt),
            // Trailing singleton dimensions carry no information
            [nx, ny, nz, nt, 1]  => ([nx, ny, nz], nt),
            ref other => return Err(Error::Dimensionality { path: "<memory>".into(), ndim: other.len() }),
        };
        // Reversing the axes makes logical iteration order x-fastest
        let data = array.t().iter().copied().collect();
        Ok(Self { shape, frames, data })
    }

    /// Inverse of `from_array`, with a trailing time axis only for 4D images.
    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        let [nx, ny, nz] = self.shape;
        let dims = if self.frames == 1 { vec![nx, ny, nz] } else { vec![nx, ny, nz, self.frames] };
        ArrayD::from_shape_vec(IxDyn(&dims).f(), self.data.clone())
            .map_err(|e| Error::Invalid(format!("volume of shape {dims:?}: {e}")))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        nifti::writer::WriterOptions::new(path)
            .write_nifti(&self.to_array()?)
            .map_err(|source| Error::NiftiWrite { path: path.into(), source })
    }

    pub fn n_voxels(&self) -> usize { self.shape.iter().product() }

    pub fn is_3d(&self) -> bool { self.frames == 1 }

    pub fn frame(&self, t: usize) -> &[f32] {
        let n = self.n_voxels();
        &self.data[t * n..(t + 1) * n]
    }

    pub fn iter_frames(&self) -> impl Iterator<Item = &[f32]> {
        // `max(1)` keeps `chunks` happy for degenerate empty shapes
        self.data.chunks(self.n_voxels().max(1))
    }
}

impl core::ops::Index<Index3> for Volume {
    type Output = f32;
    /// Voxel of the first frame
    fn index(&self, i3: Index3) -> &Self::Output {
        &self.data[index3_to_1(i3, self.shape)]
    }
}

impl core::ops::Index<(Index3, usize)> for Volume {
    type Output = f32;
    fn index(&self, (i3, t): (Index3, usize)) -> &Self::Output {
        &self.frame(t)[index3_to_1(i3, self.shape)]
    }
}

// --------------------------------------------------------------------------------
//                  Conversion between 1d and 3d indices

use std::ops::{Add, Div, Mul, Rem};

pub fn index3_to_1<T>([ix, iy, iz]: [T; 3], [nx, ny, _nz]: [T; 3]) -> T
where
    T: Mul<Output = T> + Add<Output = T>
{
    ix + (iy + iz * ny) * nx
}

#[allow(clippy::many_single_char_names)]
pub fn index1_to_3<T>(i: T, [nx, ny, _nz]: [T; 3]) -> [T; 3]
where
    T: Mul<Output = T> +
    Div<Output = T> +
    Rem<Output = T> +
    Copy
{
    let z = i / (nx * ny);
    let r = i % (nx * ny);
    let y = r / nx;
    let x = r % nx;
    [x,y,z]
}



#[cfg(test)]
mod test_volume {
    use super::*;
    use ndarray::{Array3, Array4};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    // Value encodes the position, so that layout mistakes are visible
    fn encoded(x: usize, y: usize, z: usize, t: usize) -> f32 {
        (1000 * t + 100 * x + 10 * y + z) as f32
    }

    #[test]
    fn from_3d_array_is_x_fastest() -> Result<()> {
        let array = Array3::from_shape_fn((3, 2, 2), |(x, y, z)| encoded(x, y, z, 0)).into_dyn();
        let volume = Volume::from_array(array)?;
        assert_eq!(volume.shape, [3, 2, 2]);
        assert_eq!(volume.frames, 1);
        assert_eq!(&volume.data[..4], &[0.0, 100.0, 200.0, 10.0]);
        assert_eq!(volume[[2, 1, 1]], encoded(2, 1, 1, 0));
        Ok(())
    }

    #[test]
    fn from_4d_array_splits_frames() -> Result<()> {
        let array = Array4::from_shape_fn((2, 3, 4, 5), |(x, y, z, t)| encoded(x, y, z, t)).into_dyn();
        let volume = Volume::from_array(array.clone())?;
        assert_eq!(volume.frames, 5);
        assert_eq!(volume.iter_frames().count(), 5);
        assert_eq!(volume[([1, 2, 3], 4)], encoded(1, 2, 3, 4));
        assert_eq!(volume.to_array()?, array);
        Ok(())
    }

    #[test]
    fn reject_2d() {
        let array = ndarray::Array2::<f32>::zeros((4, 4)).into_dyn();
        assert!(matches!(Volume::from_array(array), Err(Error::Dimensionality { ndim: 2, .. })));
    }

    #[test]
    fn new_checks_length() {
        assert!(Volume::new([2, 2, 2], 2, vec![0.0; 16]).is_ok());
        assert!(Volume::new([2, 2, 2], 2, vec![0.0; 15]).is_err());
    }

    #[test]
    fn nifti_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        use tempfile::tempdir;
        let dir = tempdir()?;
        let path = dir.path().join("vol.nii.gz");
        let array = Array4::from_shape_fn((4, 3, 2, 2), |(x, y, z, t)| encoded(x, y, z, t)).into_dyn();
        let original = Volume::from_array(array)?;
        original.save(&path)?;
        let reloaded = Volume::load(&path)?;
        assert_eq!(reloaded, original);
        Ok(())
    }

    #[test]
    fn read_and_write_failures_say_which() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("no/such/dir/vol.nii.gz");
        let save = Volume::new([2, 2, 2], 1, vec![0.0; 8])?.save(&missing);
        assert!(matches!(&save, Err(Error::NiftiWrite { path, .. }) if path == &missing));
        assert!(save.unwrap_err().to_string().starts_with("could not write NIfTI image"));

        let load = Volume::load(&missing);
        assert!(matches!(&load, Err(Error::Nifti { .. })));
        assert!(load.unwrap_err().to_string().starts_with("could not read NIfTI image"));
        Ok(())
    }
}
