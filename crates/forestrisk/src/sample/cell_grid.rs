use geo::Extent;

use crate::{Error, Result};

/// Regular grid of square spatial cells laid over a raster extent, used to model spatial autocorrelation.
///
/// Cells are numbered row-major starting at zero in the top left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellGrid {
    xmin: f64,
    ymax: f64,
    csize_m: f64,
    ncol: u64,
    nrow: u64,
}

impl CellGrid {
    pub fn new(extent: &Extent, csize_km: f64) -> Result<Self> {
        if csize_km.is_nan() || csize_km <= 0.0 {
            return Err(Error::InvalidArgument(format!("Spatial cell size must be positive ({csize_km} km)")));
        }

        let csize_m = csize_km * 1000.0;
        Ok(CellGrid {
            xmin: extent.xmin,
            ymax: extent.ymax,
            csize_m,
            ncol: (extent.width() / csize_m).ceil() as u64,
            nrow: (extent.height() / csize_m).ceil() as u64,
        })
    }

    pub fn columns(&self) -> u64 {
        self.ncol
    }

    pub fn rows(&self) -> u64 {
        self.nrow
    }

    pub fn cell_count(&self) -> u64 {
        self.ncol * self.nrow
    }

    /// The cell id `I * ncol + J` of the cell containing the point
    pub fn cell(&self, x: f64, y: f64) -> u64 {
        let j = ((x - self.xmin) / self.csize_m).floor().max(0.0) as u64;
        let i = ((self.ymax - y) / self.csize_m).floor().max(0.0) as u64;
        i * self.ncol + j
    }
}

#[cfg(test)]
mod tests {
    use geo::GeoTransform;

    use super::*;

    #[test]
    fn cell_numbering() -> Result {
        // 10x10 raster of 100m pixels covers 1km x 1km
        let extent = GeoTransform::new([0.0, 100.0, 0.0, 1000.0, 0.0, -100.0]).extent(10, 10);
        let grid = CellGrid::new(&extent, 0.25)?;
        assert_eq!(grid.columns(), 4);
        assert_eq!(grid.rows(), 4);
        assert_eq!(grid.cell_count(), 16);

        assert_eq!(grid.cell(50.0, 950.0), 0);
        assert_eq!(grid.cell(950.0, 950.0), 3);
        assert_eq!(grid.cell(50.0, 50.0), 12);
        assert_eq!(grid.cell(950.0, 50.0), 15);
        assert_eq!(grid.cell(350.0, 650.0), 5);
        Ok(())
    }

    #[test]
    fn partial_cells_are_included() -> Result {
        let extent = GeoTransform::new([0.0, 30.0, 0.0, 900.0, 0.0, -30.0]).extent(30, 30);
        let grid = CellGrid::new(&extent, 0.5)?;
        assert_eq!(grid.columns(), 2);
        assert_eq!(grid.rows(), 2);

        for row in 0..30 {
            for col in 0..30 {
                let x = (col as f64 + 0.5) * 30.0;
                let y = 900.0 - (row as f64 + 0.5) * 30.0;
                assert!(grid.cell(x, y) < grid.cell_count());
            }
        }

        Ok(())
    }

    #[test]
    fn invalid_cell_size() {
        let extent = GeoTransform::new([0.0, 30.0, 0.0, 900.0, 0.0, -30.0]).extent(30, 30);
        assert!(CellGrid::new(&extent, 0.0).is_err());
        assert!(CellGrid::new(&extent, f64::NAN).is_err());
    }
}
