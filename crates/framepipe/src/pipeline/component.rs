//! Component model for the pipeline graph.

use std::sync::Arc;

use framepipe_core::CommandFifo;

use super::error::PipelineError;
use super::params::ParameterSet;

/// Media type carried by a port. Connections require matching kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Video frames
    Video,
    /// Audio buffers
    Audio,
    /// Generic data
    Data,
}

/// Declared input or output port.
#[derive(Debug, Clone)]
pub struct PortDecl {
    /// Port name (e.g., "video", "audio", "out")
    pub name: String,
    /// Media kind flowing through the port.
    pub kind: MediaKind,
}

impl PortDecl {
    pub fn new(name: &str, kind: MediaKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// What a component does in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRole {
    /// Produces data; outputs only.
    Source,
    /// Transforms data; inputs and outputs.
    Processor,
    /// Consumes data; inputs only.
    Sink,
}

/// A node in the pipeline graph.
///
/// Components declare their ports, receive a command FIFO endpoint per
/// connection, and are driven through the lifecycle by the pipeline:
/// `prepare` on everything first, then `start` sinks-before-sources so
/// downstream is ready when data begins to flow, then `pause`/`stop`
/// sources-first.
///
/// Lifecycle methods default to no-ops so passive components only
/// implement what they need.
pub trait Component: Send {
    fn role(&self) -> ComponentRole;

    /// Declared input ports; empty for sources.
    fn inputs(&self) -> Vec<PortDecl> {
        Vec::new()
    }

    /// Declared output ports; empty for sinks.
    fn outputs(&self) -> Vec<PortDecl> {
        Vec::new()
    }

    /// Called when a connection from this component's output port is
    /// made; the component writes its commands into `fifo`.
    fn bind_output(&mut self, _port: &str, _fifo: Arc<CommandFifo>) {}

    /// Called when a connection into this component's input port is
    /// made; the component reads its commands from `fifo`.
    fn bind_input(&mut self, _port: &str, _fifo: Arc<CommandFifo>) {}

    fn prepare(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    /// The component's control parameters and readouts.
    fn parameters(&self) -> &ParameterSet;

    /// Mutable access for external parameter sets.
    fn parameters_mut(&mut self) -> &mut ParameterSet;
}
