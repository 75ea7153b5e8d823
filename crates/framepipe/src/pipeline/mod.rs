//! Pipeline graph: components, typed ports, topological lifecycle.
//!
//! A [`Pipeline`] holds components connected output-port to input-port.
//! Each connection carries commands through a bounded
//! [`CommandFifo`](framepipe_core::CommandFifo); the pipeline opens and
//! closes the FIFOs' flow gates around the component lifecycle so
//! shutdown never strands a blocked producer.

pub mod component;
pub mod error;
pub mod graph;
pub mod params;

pub use component::{Component, ComponentRole, MediaKind, PortDecl};
pub use error::PipelineError;
pub use graph::{Pipeline, PipelineEvent, PipelineState, DEFAULT_CONNECTION_CAPACITY};
pub use params::{ParamChangeHandler, ParamValue, ParameterSet};
