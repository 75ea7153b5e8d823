//! Errors surfaced by the pipeline shell.

/// Errors from graph construction, parameter access and lifecycle
/// fan-out.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A component with this id was already added.
    DuplicateComponent(String),
    /// No component with this id.
    UnknownComponent(String),
    /// The named port does not exist on the component.
    UnknownPort(String),
    /// Output and input ports carry different media kinds.
    KindMismatch(String),
    /// The input port already has a producer connected.
    PortBusy(String),
    /// The connection graph contains a cycle.
    CycleDetected,
    /// Lifecycle call not valid in the current state.
    InvalidState(String),
    /// Parameter path is not `component.key`.
    InvalidPath(String),
    /// No parameter with this key.
    UnknownParameter(String),
    /// The parameter is a readout and cannot be set externally.
    ReadOnlyParameter(String),
    /// Value has the wrong type or violates the constraint.
    InvalidParameter(String),
    /// A component failed a lifecycle call.
    Component {
        /// Component id.
        id: String,
        /// What the component reported.
        message: String,
    },
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::DuplicateComponent(id) => write!(f, "duplicate component id: {id}"),
            PipelineError::UnknownComponent(id) => write!(f, "unknown component: {id}"),
            PipelineError::UnknownPort(port) => write!(f, "unknown port: {port}"),
            PipelineError::KindMismatch(msg) => write!(f, "media kind mismatch: {msg}"),
            PipelineError::PortBusy(port) => write!(f, "input port already connected: {port}"),
            PipelineError::CycleDetected => write!(f, "connection graph contains a cycle"),
            PipelineError::InvalidState(msg) => write!(f, "invalid pipeline state: {msg}"),
            PipelineError::InvalidPath(path) => write!(f, "invalid parameter path: {path}"),
            PipelineError::UnknownParameter(key) => write!(f, "unknown parameter: {key}"),
            PipelineError::ReadOnlyParameter(key) => write!(f, "parameter is read-only: {key}"),
            PipelineError::InvalidParameter(msg) => write!(f, "invalid parameter value: {msg}"),
            PipelineError::Component { id, message } => {
                write!(f, "component {id} failed: {message}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}
