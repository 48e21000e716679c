//! Multi-band raster type for value images

use crate::error::{Error, Result};
use crate::raster::Region;
use ndarray::{s, Array3, ArrayView1, ArrayView2};

/// A multi-band f64 raster.
///
/// Stores a (rows, cols, bands) cube so that the component vector of one
/// pixel is a contiguous lane, which is what the per-label statistics and
/// classification passes iterate over.
#[derive(Debug, Clone)]
pub struct MultibandRaster {
    /// Cube indexed as (row, col, band)
    data: Array3<f64>,
    /// Per-band no-data value
    nodata: Option<f64>,
}

impl MultibandRaster {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize, bands: usize) -> Self {
        Self {
            data: Array3::zeros((rows, cols, bands)),
            nodata: None,
        }
    }

    /// Create a raster from an existing (rows, cols, bands) cube
    pub fn from_array(data: Array3<f64>) -> Self {
        Self { data, nodata: None }
    }

    /// Create a raster from row-major flat data, pixel components interleaved
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize, bands: usize) -> Result<Self> {
        if data.len() != rows * cols * bands {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let array = Array3::from_shape_vec((rows, cols, bands), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self {
            data: array,
            nodata: None,
        })
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.dim().0
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.dim().1
    }

    /// Number of bands (components per pixel)
    pub fn bands(&self) -> usize {
        self.data.dim().2
    }

    /// Pixel-grid dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows(), self.cols())
    }

    /// The full pixel domain as a region
    pub fn domain(&self) -> Region {
        Region::new(0, 0, self.rows(), self.cols())
    }

    // Data access

    /// Component vector of the pixel at (row, col)
    pub fn pixel(&self, row: usize, col: usize) -> ArrayView1<'_, f64> {
        self.data.slice(s![row, col, ..])
    }

    /// Write the component vector of the pixel at (row, col)
    pub fn set_pixel(&mut self, row: usize, col: usize, values: &[f64]) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        if values.len() != self.bands() {
            return Err(Error::InvalidParameter {
                name: "values",
                value: values.len().to_string(),
                reason: format!("expected {} bands", self.bands()),
            });
        }
        for (band, &v) in values.iter().enumerate() {
            self.data[(row, col, band)] = v;
        }
        Ok(())
    }

    /// Get one component
    pub fn get(&self, row: usize, col: usize, band: usize) -> Result<f64> {
        self.data
            .get((row, col, band))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set one component
    pub fn set(&mut self, row: usize, col: usize, band: usize, value: f64) -> Result<()> {
        match self.data.get_mut((row, col, band)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            }),
        }
    }

    /// View of a single band as a 2-D array
    pub fn band(&self, band: usize) -> ArrayView2<'_, f64> {
        self.data.slice(s![.., .., band])
    }

    /// Reference to the underlying cube
    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }

    /// Mutable reference to the underlying cube
    pub fn data_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    // No-data handling

    /// Per-band no-data value
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Set the per-band no-data value
    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Whether every band of the pixel equals the no-data value.
    ///
    /// This is image-level no-data; single-band masking is handled by the
    /// statistics accumulator.
    pub fn is_nodata_pixel(&self, row: usize, col: usize) -> bool {
        match self.nodata {
            Some(nd) => self.pixel(row, col).iter().all(|&v| v == nd),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiband_creation() {
        let raster = MultibandRaster::new(10, 20, 3);
        assert_eq!(raster.rows(), 10);
        assert_eq!(raster.cols(), 20);
        assert_eq!(raster.bands(), 3);
        assert_eq!(raster.shape(), (10, 20));
    }

    #[test]
    fn test_pixel_access() {
        let mut raster = MultibandRaster::new(4, 4, 3);
        raster.set_pixel(1, 2, &[1.0, 2.0, 3.0]).unwrap();
        let px = raster.pixel(1, 2);
        assert_eq!(px.to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(raster.get(1, 2, 1).unwrap(), 2.0);
    }

    #[test]
    fn test_set_pixel_band_mismatch() {
        let mut raster = MultibandRaster::new(4, 4, 3);
        assert!(raster.set_pixel(0, 0, &[1.0, 2.0]).is_err());
        assert!(raster.set_pixel(4, 0, &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_nodata_pixel() {
        let mut raster = MultibandRaster::new(2, 2, 2);
        raster.set_nodata(Some(-9999.0));
        raster.set_pixel(0, 0, &[-9999.0, -9999.0]).unwrap();
        raster.set_pixel(0, 1, &[-9999.0, 5.0]).unwrap();
        assert!(raster.is_nodata_pixel(0, 0));
        assert!(!raster.is_nodata_pixel(0, 1));
    }
}
