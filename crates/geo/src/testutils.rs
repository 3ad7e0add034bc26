//! Helpers to generate synthetic rasters and vectors in tests.

use std::path::Path;

use gdal::{
    DriverManager,
    raster::GdalType,
    vector::{Geometry, LayerAccess, LayerOptions},
};

use crate::{
    GeoTransform, RasterSize, Result,
    raster::{GeoTiffWriteOptions, RasterDataset, RasterMetadata},
};

/// 100m pixels, top left corner at (0, 1000)
pub const GEO_TRANSFORM: [f64; 6] = [0.0, 100.0, 0.0, 1000.0, 0.0, -100.0];

/// Writes a single band GeoTIFF using [`GEO_TRANSFORM`]
pub fn write_raster<T: GdalType + Copy>(path: &Path, size: RasterSize, data: &[T], nodata: Option<f64>) -> Result {
    write_raster_with_transform(path, size, GeoTransform::new(GEO_TRANSFORM), data, nodata)
}

pub fn write_raster_with_transform<T: GdalType + Copy>(
    path: &Path,
    size: RasterSize,
    geo_transform: GeoTransform,
    data: &[T],
    nodata: Option<f64>,
) -> Result {
    let meta = RasterMetadata {
        size,
        geo_transform,
        projection: String::new(),
        band_count: 1,
        nodata,
    };

    let mut ds = RasterDataset::create_like::<T>(path, &meta, nodata, &GeoTiffWriteOptions::default())?;
    ds.write_window(1, data.to_vec(), 0, 0, size.cols, size.rows)?;
    ds.flush()
}

/// Writes the WKT polygons as features of a single layer GeoPackage
pub fn write_polygons(path: &Path, wkts: &[&str]) -> Result {
    let driver = DriverManager::get_driver_by_name("GPKG")?;
    let mut ds = driver.create_vector_only(path)?;
    let mut layer = ds.create_layer(LayerOptions {
        name: "polygons",
        ty: gdal_sys::OGRwkbGeometryType::wkbPolygon,
        ..Default::default()
    })?;

    for wkt in wkts {
        layer.create_feature(Geometry::from_wkt(wkt)?)?;
    }

    Ok(())
}

/// The WKT of the rectangle spanned by the pixels, inset by a fraction of a pixel so only these pixels are touched
pub fn pixel_rectangle_wkt(geo_transform: &GeoTransform, col: usize, row: usize, cols: usize, rows: usize) -> String {
    let inset_x = geo_transform.cell_size_x() * 0.1;
    let inset_y = geo_transform.cell_size_y() * 0.1;
    let top_left = geo_transform.apply(col as f64, row as f64);
    let bottom_right = geo_transform.apply((col + cols) as f64, (row + rows) as f64);

    let (x0, y0) = (top_left.x() + inset_x, top_left.y() + inset_y);
    let (x1, y1) = (bottom_right.x() - inset_x, bottom_right.y() - inset_y);
    format!("POLYGON (({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))")
}
