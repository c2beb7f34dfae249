//! Partitioning of a volume into cubic blocks and clamped block sampling.

use ndarray::{Array3, ArrayView3, ArrayViewMut3, s};

/// Position of a block in block space.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockCoord {
    pub i: usize,
    pub j: usize,
    pub k: usize,
}

/// Partition of a volume with `extents` into cubic blocks of edge length
/// `block_size`, where boundary blocks may extend past the volume.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockGrid {
    extents: [usize; 3],
    block_size: usize,
    blocks: [usize; 3],
}

impl BlockGrid {
    #[must_use]
    pub const fn new(extents: [usize; 3], block_size: usize) -> Self {
        let [r1, r2, r3] = extents;

        Self {
            extents,
            block_size,
            blocks: [
                r1.div_ceil(block_size),
                r2.div_ceil(block_size),
                r3.div_ceil(block_size),
            ],
        }
    }

    #[must_use]
    pub const fn extents(&self) -> [usize; 3] {
        self.extents
    }

    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks along each axis.
    #[must_use]
    pub const fn blocks_per_axis(&self) -> [usize; 3] {
        self.blocks
    }

    #[must_use]
    pub const fn num_blocks(&self) -> usize {
        let [num_x, num_y, num_z] = self.blocks;
        num_x * num_y * num_z
    }

    /// Number of samples in one (unclamped) block.
    #[must_use]
    pub const fn block_elements(&self) -> usize {
        self.block_size * self.block_size * self.block_size
    }

    /// Iterates over all blocks in visitation order, i.e. x-major, then y,
    /// then z.
    pub fn blocks(&self) -> impl Iterator<Item = BlockCoord> + use<> {
        let [num_x, num_y, num_z] = self.blocks;

        (0..num_x).flat_map(move |i| {
            (0..num_y).flat_map(move |j| (0..num_z).map(move |k| BlockCoord { i, j, k }))
        })
    }

    /// Global coordinates of the first sample of a block.
    #[must_use]
    pub const fn origin(&self, block: BlockCoord) -> [usize; 3] {
        [
            block.i * self.block_size,
            block.j * self.block_size,
            block.k * self.block_size,
        ]
    }
}

/// Copies the block starting at `origin` from the `volume` into the `block`.
///
/// Along every axis, local positions that run past the volume repeat the last
/// in-volume sample.
pub fn fill_block(volume: ArrayView3<f32>, origin: [usize; 3], mut block: ArrayViewMut3<f32>) {
    let [r1, r2, r3] = clamp_limits(volume.dim());
    let [x, y, z] = origin;

    for ((ii, jj, kk), value) in block.indexed_iter_mut() {
        *value = volume
            .get([(x + ii).min(r1), (y + jj).min(r2), (z + kk).min(r3)])
            .copied()
            .unwrap_or(0.0);
    }
}

/// Copies the in-volume part of the `block` starting at `origin` into the
/// `volume`, dropping the clamped cells.
pub fn store_block(block: ArrayView3<f32>, origin: [usize; 3], mut volume: ArrayViewMut3<f32>) {
    let (r1, r2, r3) = volume.dim();
    let [x, y, z] = origin;
    let (bx, by, bz) = block.dim();

    let [ex, ey, ez] = [
        (x + bx).min(r1).saturating_sub(x),
        (y + by).min(r2).saturating_sub(y),
        (z + bz).min(r3).saturating_sub(z),
    ];

    if ex == 0 || ey == 0 || ez == 0 {
        return;
    }

    volume
        .slice_mut(s![x..x + ex, y..y + ey, z..z + ez])
        .assign(&block.slice(s![..ex, ..ey, ..ez]));
}

const fn clamp_limits((r1, r2, r3): (usize, usize, usize)) -> [usize; 3] {
    [
        r1.saturating_sub(1),
        r2.saturating_sub(1),
        r3.saturating_sub(1),
    ]
}

/// Working buffer of a block with a one cell halo on the low side of every
/// axis.
///
/// The halo cells are zero and are never written, so that every block is
/// predicted independently of its neighbours. Buffer coordinates of the block
/// samples are `1..=block_size`.
pub struct HaloBuffer {
    cells: Array3<f32>,
}

impl HaloBuffer {
    #[must_use]
    pub fn new(block_size: usize) -> Self {
        Self {
            cells: Array3::zeros((block_size + 1, block_size + 1, block_size + 1)),
        }
    }

    /// Loads the raw samples of the block starting at `origin`.
    pub fn load(&mut self, volume: ArrayView3<f32>, origin: [usize; 3]) {
        fill_block(volume, origin, self.cells.slice_mut(s![1.., 1.., 1..]));
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.cells.get([x, y, z]).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, value: f32) {
        if x == 0 || y == 0 || z == 0 {
            return;
        }

        if let Some(cell) = self.cells.get_mut([x, y, z]) {
            *cell = value;
        }
    }

    /// Predicts the cell at buffer position `(x, y, z)` by 3-D
    /// inclusion-exclusion over its seven lower neighbours.
    ///
    /// All coordinates must be at least one.
    #[must_use]
    pub fn lorenzo(&self, x: usize, y: usize, z: usize) -> f32 {
        self.get(x, y, z - 1) + self.get(x, y - 1, z) + self.get(x - 1, y, z)
            - self.get(x, y - 1, z - 1)
            - self.get(x - 1, y, z - 1)
            - self.get(x - 1, y - 1, z)
            + self.get(x - 1, y - 1, z - 1)
    }

    /// View of the block samples without the halo.
    #[must_use]
    pub fn interior(&self) -> ArrayView3<f32> {
        self.cells.slice(s![1.., 1.., 1..])
    }
}
