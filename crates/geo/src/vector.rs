//! Reading of vector geometries and extents using GDAL.

pub mod io;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorFormat {
    ShapeFile,
    GeoJson,
    GeoPackage,
    Unknown,
}

impl VectorFormat {
    /// Given a file path, guess the vector type based on the file extension
    pub fn guess_from_path(file_path: &std::path::Path) -> VectorFormat {
        let ext = file_path.extension().map(|ext| ext.to_string_lossy().to_lowercase());

        match ext.as_deref() {
            Some("shp" | "dbf") => VectorFormat::ShapeFile,
            Some("json" | "geojson") => VectorFormat::GeoJson,
            Some("gpkg") => VectorFormat::GeoPackage,
            _ => VectorFormat::Unknown,
        }
    }

    pub fn gdal_driver_name(&self) -> &str {
        match self {
            VectorFormat::ShapeFile => "ESRI Shapefile",
            VectorFormat::GeoJson => "GeoJSON",
            VectorFormat::GeoPackage => "GPKG",
            VectorFormat::Unknown => "Unknown",
        }
    }
}
