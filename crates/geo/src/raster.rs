pub mod algo;
mod blockplan;
mod io;
mod vrt;

#[doc(inline)]
pub use blockplan::{Block, BlockPlan};
#[doc(inline)]
pub use io::{Nodata, RasterDataset, RasterMetadata};
#[doc(inline)]
pub use vrt::VirtualStack;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Compression {
    Deflate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Predictor {
    Horizontal,
}

/// Creation options of striped GeoTIFF outputs
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeoTiffWriteOptions {
    /// The compression type to use for writing the raster
    pub compression: Option<Compression>,
    /// The predictor selection to use for writing the raster (only relevant when compression is used)
    pub predictor: Option<Predictor>,
    /// Write a BigTIFF so the output is not limited to 4GB
    pub bigtiff: bool,
}

impl GeoTiffWriteOptions {
    pub fn to_creation_options(&self) -> Vec<String> {
        let mut opts = Vec::new();

        if let Some(compression) = self.compression {
            opts.push(format!(
                "COMPRESS={}",
                match compression {
                    Compression::Deflate => "DEFLATE",
                }
            ));

            opts.push(format!(
                "PREDICTOR={}",
                match self.predictor {
                    None => "1",
                    Some(Predictor::Horizontal) => "2",
                }
            ));
        }

        if self.bigtiff {
            opts.push("BIGTIFF=YES".to_string());
        }

        opts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geotiff_creation_options() {
        assert!(GeoTiffWriteOptions::default().to_creation_options().is_empty());

        let opts = GeoTiffWriteOptions {
            compression: Some(Compression::Deflate),
            predictor: Some(Predictor::Horizontal),
            bigtiff: true,
        };

        assert_eq!(
            opts.to_creation_options(),
            vec!["COMPRESS=DEFLATE", "PREDICTOR=2", "BIGTIFF=YES"]
        );

        let unpredicted = GeoTiffWriteOptions {
            compression: Some(Compression::Deflate),
            ..Default::default()
        };
        assert_eq!(unpredicted.to_creation_options(), vec!["COMPRESS=DEFLATE", "PREDICTOR=1"]);
    }
}
