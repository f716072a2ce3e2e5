use thiserror::Error;

use crate::gpu::ShaderStage;

/// Fatal problems raised while bringing a renderer up.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("rendering context unavailable: {0}")]
    ContextUnavailable(String),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Compile and link failures. Each one aborts program construction.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to compile {stage} shader: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("failed to link program: {log}")]
    Link { log: String },
    #[error("linked program does not declare attribute `{name}`")]
    MissingAttribute { name: String },
}

/// Resource or frame failures reported by a backend.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create buffer: {0}")]
    Buffer(String),
    #[error("failed to present frame: {0}")]
    Present(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("uniform `{0}` appears more than once in the control table")]
    DuplicateUniform(String),
}

/// Problems with a single control-update event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("`{raw}` is not a valid channel value")]
    InvalidValue { raw: String },
    #[error("unknown channel `{0}` (expected x, y or z)")]
    UnknownChannel(String),
    #[error("control id `{0}` is not of the form <uniform>-<channel>")]
    MalformedId(String),
}

/// Failure while applying an event and redrawing.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Problems reading a harness description.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid harness XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("expected root element <harness>, found <{0}>")]
    UnexpectedRoot(String),
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("invalid {what} `{value}`")]
    InvalidValue { what: &'static str, value: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
