use std::ffi::c_int;

use gdal::vector::Geometry;

use crate::{
    Extent, GeoTransform, RasterSize, Result,
    gdalinterop::{self, check_rc},
};

/// The pixel window of a raster grid that covers the extent, clipped to the raster.
///
/// Returns (col, row, cols, rows), `None` when the extent does not overlap the raster.
pub fn pixel_window(geo_transform: &GeoTransform, size: RasterSize, extent: &Extent) -> Option<(usize, usize, usize, usize)> {
    let top_left = geo_transform.top_left();
    let col_start = ((extent.xmin - top_left.x()) / geo_transform.cell_size_x()).floor().max(0.0);
    let col_end = ((extent.xmax - top_left.x()) / geo_transform.cell_size_x()).ceil().min(size.cols as f64);
    let row_start = ((extent.ymax - top_left.y()) / geo_transform.cell_size_y()).floor().max(0.0);
    let row_end = ((extent.ymin - top_left.y()) / geo_transform.cell_size_y()).ceil().min(size.rows as f64);

    if col_end <= col_start || row_end <= row_start {
        return None;
    }

    Some((
        col_start as usize,
        row_start as usize,
        (col_end - col_start) as usize,
        (row_end - row_start) as usize,
    ))
}

/// Burns the geometries in a byte mask on the provided grid: 1 inside the geometries, 0 outside.
///
/// With `all_touched` every pixel touched by a geometry is burned, otherwise only the pixels
/// with their center inside a geometry.
pub fn polygon_mask(
    geometries: &[Geometry],
    geo_transform: &GeoTransform,
    size: RasterSize,
    projection: &str,
    all_touched: bool,
) -> Result<Vec<u8>> {
    let mem_driver = gdal::DriverManager::get_driver_by_name("MEM")?;
    let mut ds = mem_driver.create_with_band_type::<u8, _>("polygon_mask", size.cols, size.rows, 1)?;
    ds.set_geo_transform(&geo_transform.coefficients())?;
    if !projection.is_empty() {
        ds.set_projection(projection)?;
    }

    if !geometries.is_empty() {
        let options = gdalinterop::create_string_list(&[format!("ALL_TOUCHED={}", if all_touched { "TRUE" } else { "FALSE" })])?;
        let bands: [c_int; 1] = [1];
        let burn_values = vec![1.0; geometries.len()];
        let geometry_handles: Vec<gdal_sys::OGRGeometryH> = geometries.iter().map(|geom| unsafe { geom.c_geometry() }).collect();

        unsafe {
            check_rc(gdal_sys::GDALRasterizeGeometries(
                ds.c_dataset(),
                bands.len() as c_int,
                bands.as_ptr() as _,
                geometry_handles.len() as c_int,
                geometry_handles.as_ptr() as _,
                None,
                std::ptr::null_mut(),
                burn_values.as_ptr() as _,
                options.as_ptr() as _,
                None,
                std::ptr::null_mut(),
            ))?;
        }
    }

    let buffer = ds.rasterband(1)?.read_as::<u8>((0, 0), (size.cols, size.rows), (size.cols, size.rows), None)?;
    let (_shape, data) = buffer.into_shape_and_vec();
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANS: [f64; 6] = [0.0, 100.0, 0.0, 400.0, 0.0, -100.0];

    #[test]
    fn window_of_extent() {
        let gt = GeoTransform::new(TRANS);
        let size = RasterSize::square(4);
        let extent = Extent {
            xmin: 10.0,
            ymin: 210.0,
            xmax: 190.0,
            ymax: 390.0,
        };

        assert_eq!(pixel_window(&gt, size, &extent), Some((0, 0, 2, 2)));
        assert_eq!(pixel_window(&gt, size, &gt.extent(4, 4)), Some((0, 0, 4, 4)));

        let partially_outside = Extent {
            xmin: 350.0,
            ymin: -500.0,
            xmax: 900.0,
            ymax: 50.0,
        };
        assert_eq!(pixel_window(&gt, size, &partially_outside), Some((3, 3, 1, 1)));

        let outside = Extent {
            xmin: 500.0,
            ymin: 0.0,
            xmax: 600.0,
            ymax: 100.0,
        };
        assert_eq!(pixel_window(&gt, size, &outside), None);
    }

    #[test]
    fn mask_of_polygon() -> Result {
        let gt = GeoTransform::new(TRANS);
        let polygon = Geometry::from_wkt("POLYGON ((10 390, 190 390, 190 210, 10 210, 10 390))")?;
        let mask = polygon_mask(&[polygon], &gt, RasterSize::square(4), "", true)?;

        #[rustfmt::skip]
        let expected = vec![
            1, 1, 0, 0,
            1, 1, 0, 0,
            0, 0, 0, 0,
            0, 0, 0, 0,
        ];

        assert_eq!(mask, expected);
        Ok(())
    }

    #[test]
    fn mask_without_geometries() -> Result {
        let mask = polygon_mask(&[], &GeoTransform::new(TRANS), RasterSize::square(2), "", true)?;
        assert_eq!(mask, vec![0; 4]);
        Ok(())
    }
}
