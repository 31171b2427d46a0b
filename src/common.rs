pub use anyhow::{bail, ensure, Context as _, Error, Result};
pub use argh::FromArgs;
pub use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage};
pub use itertools::Itertools;
pub use log::{debug, error, info, warn};
pub use rand::prelude::*;
pub use serde::{
    de::Error as DeserializeError, ser::Error as SerializeError, Deserialize, Deserializer,
    Serialize, Serializer,
};
pub use std::{
    collections::HashMap,
    convert::TryFrom,
    fmt::{self, Display},
    fs::{self, File},
    io::{prelude::*, BufWriter},
    num::NonZeroUsize,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Instant,
};
pub use tch::{
    nn::{self, Optimizer, OptimizerConfig, Sgd, VarStore},
    Device, Kind, Tensor,
};
