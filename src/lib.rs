pub mod aci;
pub mod archive;
pub mod check;
pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod graph;
pub mod logging;
pub mod manifest;
pub mod ownership;
pub mod runtime;
pub mod services;

pub use aci::{Aci, ArtifactSet, BuildOptions, BuilderCommand};
pub use error::{Error, ErrorKind, Result};
pub use services::Services;
