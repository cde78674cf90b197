//! Crate-wide prelude for common imports
//!
//! Re-exports the items nearly every module needs so command handlers can
//! start with a single `use crate::prelude::*;`.

pub(crate) use crate::error::{Error, Result};

// Re-export tracing macros for logging
#[allow(unused_imports)]
pub(crate) use tracing::{debug, info, trace, warn};

#[allow(unused_imports)]
pub(crate) use async_trait::async_trait;
