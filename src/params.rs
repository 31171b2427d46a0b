// validation sampling
pub const NUM_VAL_SEGMENTS: usize = 19; // clips drawn per video in a validation pass

// frame files
pub const FRAME_INDEX_WIDTH: usize = 5; // zero-padded width of frame indices in file names

// clip geometry
pub const DEFAULT_FRAME_SIZE: i64 = 224; // square resolution clips are resized to

// classifier head
pub const HEAD_POOL_DEPTH: i64 = 1; // adaptive pool output, temporal axis
pub const HEAD_POOL_SIZE: i64 = 3; // adaptive pool output, spatial axes
pub const FC_HIDDEN: i64 = 2048; // width of both hidden fc layers
pub const DROPOUT: f64 = 0.5; // dropout on the hidden fc layers

// optimization
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
pub const DEFAULT_MOMENTUM: f64 = 0.9;
pub const PLATEAU_FACTOR: f64 = 0.1; // lr multiplier on a validation-loss plateau
pub const PLATEAU_PATIENCE: usize = 1; // epochs without improvement before reducing
