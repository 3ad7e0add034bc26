use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::{Error, Point, Result};

/// Affine transformation from pixel/line space to georeferenced space.
///
/// Only north-up rasters are supported by the block algorithms, the rotation terms are expected to be 0.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Creates a new `GeoTransform` from the provided coefficients.
    ///
    /// The coefficients are in the order: [top left x, pixel width, rotation (0 if north is up), top left y, rotation (0 if north is up), pixel height].
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    /// Translates a cell to a point in the raster.
    /// Cell (0, 0) is the top left corner of the raster.
    pub fn apply(&self, col: f64, row: f64) -> Point<f64> {
        let x = self.0[0] + self.0[1] * col + self.0[2] * row;
        let y = self.0[3] + self.0[4] * col + self.0[5] * row;
        Point::new(x, y)
    }

    /// The world coordinate of the center of the pixel at (col, row).
    ///
    /// Evaluated as `(col + 0.5) * gt[1] + gt[0]` so results are reproducible bit for bit,
    /// spatial cell ids derived from these coordinates depend on it.
    pub fn pixel_center(&self, col: usize, row: usize) -> Point<f64> {
        let x = (col as f64 + 0.5) * self.0[1] + self.0[0];
        let y = (row as f64 + 0.5) * self.0[5] + self.0[3];
        Point::new(x, y)
    }

    /// The (col, row) of the pixel containing the point, can be outside of the raster
    pub fn point_to_pixel(&self, point: Point<f64>) -> (i64, i64) {
        let col = ((point.x() - self.0[0]) / self.0[1]).floor() as i64;
        let row = ((point.y() - self.0[3]) / self.0[5]).floor() as i64;
        (col, row)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.0[0], self.0[3])
    }

    /// The horizontal cell size
    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    /// The verical cell size
    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    /// The area of a single pixel in squared map units
    pub fn pixel_area(&self) -> f64 {
        (self.0[1] * self.0[5]).abs()
    }

    /// The bounding box of a raster with the given size that uses this transformation
    pub fn extent(&self, cols: usize, rows: usize) -> Extent {
        Extent {
            xmin: self.0[0],
            xmax: self.0[0] + self.0[1] * cols as f64,
            ymin: self.0[3] + self.0[5] * rows as f64,
            ymax: self.0[3],
        }
    }

    /// The transformation of a window with its top left corner at (col, row)
    pub fn window(&self, col: usize, row: usize) -> GeoTransform {
        let mut coefficients = self.0;
        coefficients[0] = self.0[0] + self.0[1] * col as f64;
        coefficients[3] = self.0[3] + self.0[5] * row as f64;
        GeoTransform(coefficients)
    }

    pub fn is_north_up(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0 && self.0[1] > 0.0 && self.0[5] < 0.0
    }

    /// Returns an error for rotated or south-up transformations
    pub fn check_north_up(&self) -> Result {
        if !self.is_north_up() {
            return Err(Error::InvalidArgument(format!("Only north-up rasters are supported: {self:?}")));
        }

        Ok(())
    }

    /// Returns the coefficients of the transformation.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(geo_trans: GeoTransform) -> [f64; 6] {
        geo_trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(topleft: ({}, {}), pixel_width: {}, pixel_height: {})",
            self.0[0],
            self.0[3],
            self.cell_size_x(),
            self.cell_size_y()
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}

/// Axis aligned bounding box in map units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

impl AbsDiffEq for Extent {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax].abs_diff_eq(&[other.xmin, other.ymin, other.xmax, other.ymax], epsilon)
    }
}

impl RelativeEq for Extent {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax].relative_eq(&[other.xmin, other.ymin, other.xmax, other.ymax], epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const TRANS: [f64; 6] = [200000.0, 30.0, 0.0, 1000000.0, 0.0, -30.0];

    #[test]
    fn pixel_center() {
        let gt = GeoTransform::new(TRANS);
        assert_eq!(gt.pixel_center(0, 0), Point::new(200015.0, 999985.0));
        assert_eq!(gt.pixel_center(3, 2), Point::new(200105.0, 999925.0));
        assert_eq!(gt.point_to_pixel(gt.pixel_center(3, 2)), (3, 2));
    }

    #[test]
    fn point_outside_raster() {
        let gt = GeoTransform::new(TRANS);
        assert_eq!(gt.point_to_pixel(Point::new(199999.0, 1000001.0)), (-1, -1));
    }

    #[test]
    fn extent_and_area() {
        let gt = GeoTransform::new(TRANS);
        assert_eq!(gt.pixel_area(), 900.0);
        assert_relative_eq!(
            gt.extent(10, 20),
            Extent {
                xmin: 200000.0,
                ymin: 999400.0,
                xmax: 200300.0,
                ymax: 1000000.0,
            }
        );
    }

    #[test]
    fn window_transform() {
        let gt = GeoTransform::new(TRANS);
        let window = gt.window(2, 4);
        assert_eq!(window.top_left(), Point::new(200060.0, 999880.0));
        assert_eq!(window.pixel_center(0, 0), gt.pixel_center(2, 4));
    }

    #[test]
    fn north_up() {
        assert!(GeoTransform::new(TRANS).check_north_up().is_ok());
        assert!(GeoTransform::new([0.0, 1.0, 0.5, 0.0, 0.0, -1.0]).check_north_up().is_err());
    }
}
