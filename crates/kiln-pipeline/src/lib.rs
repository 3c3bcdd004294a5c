//! # Kiln Pipeline
//!
//! Processing pipeline for the Kiln model converter.
//!
//! ## Features
//! - Processor trait and the validating pipeline driver
//! - Processors: default materials, unused-data removal, frame/node/material/
//!   mesh/vertex optimization, transformation, normal calculation, texture
//!   atlasing and LOD creation
//! - Quadric-error decimation engine and shelf rectangle packer
//! - JSON scene importer and the chunked binary model writer

use std::path::PathBuf;

use kiln_core::{TextureError, ValidationError};
use thiserror::Error;

pub mod decimate;
pub mod export;
pub mod import;
pub mod packing;
pub mod pipeline;
pub mod processor;
pub mod processors;

pub use decimate::{
    DecimationEngine, DecimationInput, DecimationOutput, DecimationTarget, QuadricDecimator,
};
pub use export::{ModelWriter, FORMAT_MAGIC, FORMAT_VERSION};
pub use import::{ImportError, ImportResult, Importer, JsonImporter};
pub use packing::{PackedRect, RectPacker, ShelfPacker};
pub use pipeline::{prepare_model, Pipeline};
pub use processor::{ProcessContext, Processor};

/// Pipeline errors
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model invalid after {processor}: {source}")]
    Validation {
        processor: String,
        #[source]
        source: ValidationError,
    },

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("Decimation failed: {0}")]
    Decimation(String),

    #[error("Texture packing failed: {0}")]
    Packing(String),

    #[error("Import of {path} failed: {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: ImportError,
    },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations
pub type ProcessResult<T> = Result<T, ProcessError>;
