#![allow(unused_imports)]

pub use crate::base::error::{Error, Result};
pub use crate::base::path::FilePath;
pub use std::sync::{Arc, LazyLock, Mutex};

pub use log::{debug, error, info, trace, warn};
