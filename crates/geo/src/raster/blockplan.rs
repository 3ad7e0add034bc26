//! Partitioning of a raster in read windows for streaming passes.
//!
//! A pass over a raster reads one window at a time so the memory usage only depends on the block size,
//! not on the raster size.

use crate::{Error, RasterSize, Result, raster::RasterDataset};

/// A single read window of a [`BlockPlan`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Row-major index of the block in the plan
    pub index: usize,
    /// Column offset of the top left pixel
    pub x: usize,
    /// Row offset of the top left pixel
    pub y: usize,
    /// Number of columns
    pub nx: usize,
    /// Number of rows
    pub ny: usize,
}

impl Block {
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny
    }

    /// Global (col, row) of the pixel at the given offset in a row-major block buffer
    pub fn global_position(&self, offset: usize) -> (usize, usize) {
        (self.x + offset % self.nx, self.y + offset / self.nx)
    }
}

/// The block geometry used by every streaming pass.
///
/// `xs`/`nxs` are indexed by block column, `ys`/`nys` by block row.
/// The last column and row of blocks can be smaller than the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    pub nblock: usize,
    pub nblock_x: usize,
    pub nblock_y: usize,
    pub xs: Vec<usize>,
    pub ys: Vec<usize>,
    pub nxs: Vec<usize>,
    pub nys: Vec<usize>,
}

impl BlockPlan {
    /// Plan for a raster of the given size using blocks of `block_cols` x `block_rows`
    pub fn new(size: RasterSize, block_cols: usize, block_rows: usize) -> Result<Self> {
        if block_cols == 0 || block_rows == 0 {
            return Err(Error::InvalidArgument(format!(
                "Invalid block size ({block_cols}x{block_rows})"
            )));
        }

        if size.is_empty() {
            return Err(Error::InvalidArgument(format!("Can not partition an empty raster {size}")));
        }

        let (xs, nxs) = split_axis(size.cols, block_cols);
        let (ys, nys) = split_axis(size.rows, block_rows);

        Ok(BlockPlan {
            nblock: xs.len() * ys.len(),
            nblock_x: xs.len(),
            nblock_y: ys.len(),
            xs,
            ys,
            nxs,
            nys,
        })
    }

    /// Full width bands of `blk_rows` rows when `blk_rows > 0`, the native block size of band 1 otherwise
    pub fn for_dataset(ds: &RasterDataset, blk_rows: usize) -> Result<Self> {
        let size = ds.raster_size();
        if blk_rows > 0 {
            BlockPlan::new(size, size.cols.max(1), blk_rows)
        } else {
            let (block_cols, block_rows) = ds.block_size(1)?;
            BlockPlan::new(size, block_cols.max(1), block_rows.max(1))
        }
    }

    /// The block with row-major index `b`: `px = b mod nblock_x`, `py = b div nblock_x`
    pub fn block(&self, b: usize) -> Block {
        let px = b % self.nblock_x;
        let py = b / self.nblock_x;
        Block {
            index: b,
            x: self.xs[px],
            y: self.ys[py],
            nx: self.nxs[px],
            ny: self.nys[py],
        }
    }

    /// Iterates the blocks in row-major order
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.nblock).map(|b| self.block(b))
    }
}

fn split_axis(len: usize, block_len: usize) -> (Vec<usize>, Vec<usize>) {
    let offsets: Vec<usize> = (0..len).step_by(block_len).collect();
    let sizes = offsets.iter().map(|&offset| block_len.min(len - offset)).collect();
    (offsets, sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_cells(plan: &BlockPlan) -> usize {
        plan.blocks().map(|b| b.cell_count()).sum()
    }

    #[test]
    fn row_bands() -> Result {
        let plan = BlockPlan::new(RasterSize::with_rows_cols(10, 7), 7, 4)?;
        assert_eq!(plan.nblock, 3);
        assert_eq!(plan.nblock_x, 1);
        assert_eq!(plan.nblock_y, 3);
        assert_eq!(plan.ys, vec![0, 4, 8]);
        assert_eq!(plan.nys, vec![4, 4, 2]);
        assert_eq!(plan.xs, vec![0]);
        assert_eq!(plan.nxs, vec![7]);
        Ok(())
    }

    #[test]
    fn tiles_with_partial_last_row_and_column() -> Result {
        let plan = BlockPlan::new(RasterSize::with_rows_cols(600, 520), 256, 256)?;
        assert_eq!(plan.nblock_x, 3);
        assert_eq!(plan.nblock_y, 3);
        assert_eq!(plan.nxs, vec![256, 256, 8]);
        assert_eq!(plan.nys, vec![256, 256, 88]);

        let last = plan.block(plan.nblock - 1);
        assert_eq!(last, Block { index: 8, x: 512, y: 512, nx: 8, ny: 88 });
        assert_eq!(plan.block(4), Block { index: 4, x: 256, y: 256, nx: 256, ny: 256 });
        Ok(())
    }

    #[test]
    fn blocks_cover_raster_without_overlap() -> Result {
        for (rows, cols, bx, by) in [(1, 1, 256, 256), (10, 10, 3, 3), (97, 13, 13, 5), (256, 512, 256, 256), (5, 1000, 1000, 1)] {
            let size = RasterSize::with_rows_cols(rows, cols);
            let plan = BlockPlan::new(size, bx, by)?;
            assert_eq!(covered_cells(&plan), size.cell_count());

            let mut seen = vec![0u8; rows * cols];
            for block in plan.blocks() {
                for offset in 0..block.cell_count() {
                    let (col, row) = block.global_position(offset);
                    seen[row * cols + col] += 1;
                }
            }

            assert!(seen.iter().all(|&count| count == 1));
        }

        Ok(())
    }

    #[test]
    fn block_index_is_row_major() -> Result {
        let plan = BlockPlan::new(RasterSize::with_rows_cols(4, 6), 2, 2)?;
        let origins: Vec<(usize, usize)> = plan.blocks().map(|b| (b.x, b.y)).collect();
        assert_eq!(origins, vec![(0, 0), (2, 0), (4, 0), (0, 2), (2, 2), (4, 2)]);
        Ok(())
    }

    #[test]
    fn invalid_block_size() {
        assert!(BlockPlan::new(RasterSize::square(10), 0, 10).is_err());
        assert!(BlockPlan::new(RasterSize::with_rows_cols(0, 10), 10, 10).is_err());
    }
}
