//! The pipeline graph: components, connections, lifecycle fan-out.
//!
//! Connections carry commands through a [`CommandFifo`] per edge. The
//! lifecycle is ordered by the connection topology: `prepare` touches
//! every component, `start` runs in reverse topological order (sinks
//! before sources, so downstream is listening before data flows), and
//! `pause`/`stop` run in forward topological order (sources first, so
//! upstream stops feeding before downstream winds down).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use framepipe_core::{CommandFifo, FifoMode};

use super::component::{Component, ComponentRole};
use super::error::PipelineError;
use super::params::ParamValue;

/// Default capacity of the command FIFO created per connection.
pub const DEFAULT_CONNECTION_CAPACITY: usize = 8;

/// Pipeline lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    /// Components may be added and connected.
    Idle,
    /// All components prepared.
    Prepared,
    /// Data is flowing.
    Running,
    /// Paused; data flow suspended.
    Paused,
    /// Stopped cleanly; may be prepared again.
    Stopped,
    /// A component failed; holds the first fatal error.
    Error(PipelineError),
}

/// Notifications emitted on the pipeline's event channel.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    StateChanged(PipelineState),
    ComponentError { id: String, error: PipelineError },
}

struct Node {
    id: String,
    component: Box<dyn Component>,
}

struct Connection {
    from: usize,
    from_port: String,
    to: usize,
    to_port: String,
    fifo: Arc<CommandFifo>,
}

/// A graph of media components connected by typed ports.
pub struct Pipeline {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    connections: Vec<Connection>,
    state: PipelineState,
    connection_capacity: usize,
    events_tx: Sender<PipelineEvent>,
    events_rx: Receiver<PipelineEvent>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_connection_capacity(DEFAULT_CONNECTION_CAPACITY)
    }

    /// Pipeline whose per-connection FIFOs hold `capacity` commands.
    pub fn with_connection_capacity(capacity: usize) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            connections: Vec::new(),
            state: PipelineState::Idle,
            connection_capacity: capacity,
            events_tx,
            events_rx,
        }
    }

    /// A receiver for state changes and component errors. May be cloned
    /// and consumed from any thread.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events_rx.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Adds a component under a unique id.
    ///
    /// The declared ports must agree with the role: sources have only
    /// outputs, sinks only inputs, processors both.
    pub fn add(
        &mut self,
        id: impl Into<String>,
        component: Box<dyn Component>,
    ) -> Result<(), PipelineError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(PipelineError::DuplicateComponent(id));
        }

        let inputs = component.inputs();
        let outputs = component.outputs();
        let consistent = match component.role() {
            ComponentRole::Source => inputs.is_empty() && !outputs.is_empty(),
            ComponentRole::Processor => !inputs.is_empty() && !outputs.is_empty(),
            ComponentRole::Sink => !inputs.is_empty() && outputs.is_empty(),
        };
        if !consistent {
            return Err(PipelineError::InvalidState(format!(
                "{id}: port declarations do not match role {:?}",
                component.role()
            )));
        }

        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(Node { id, component });
        Ok(())
    }

    /// Connects an output port to an input port.
    ///
    /// Both ports must exist and carry the same media kind, and the
    /// input must not already have a producer. The connection's command
    /// FIFO is created here and bound into both components; cycles are
    /// only detected at start time.
    pub fn connect(
        &mut self,
        from_id: &str,
        from_port: &str,
        to_id: &str,
        to_port: &str,
    ) -> Result<(), PipelineError> {
        let from = *self
            .index
            .get(from_id)
            .ok_or_else(|| PipelineError::UnknownComponent(from_id.to_string()))?;
        let to = *self
            .index
            .get(to_id)
            .ok_or_else(|| PipelineError::UnknownComponent(to_id.to_string()))?;

        let out_decl = self.nodes[from]
            .component
            .outputs()
            .into_iter()
            .find(|p| p.name == from_port)
            .ok_or_else(|| PipelineError::UnknownPort(format!("{from_id}.{from_port}")))?;
        let in_decl = self.nodes[to]
            .component
            .inputs()
            .into_iter()
            .find(|p| p.name == to_port)
            .ok_or_else(|| PipelineError::UnknownPort(format!("{to_id}.{to_port}")))?;

        if out_decl.kind != in_decl.kind {
            return Err(PipelineError::KindMismatch(format!(
                "{from_id}.{from_port} is {:?}, {to_id}.{to_port} is {:?}",
                out_decl.kind, in_decl.kind
            )));
        }
        if self
            .connections
            .iter()
            .any(|c| c.to == to && c.to_port == to_port)
        {
            return Err(PipelineError::PortBusy(format!("{to_id}.{to_port}")));
        }

        let fifo = Arc::new(CommandFifo::new(
            self.connection_capacity,
            FifoMode::Blocking,
        ));
        self.nodes[from]
            .component
            .bind_output(from_port, Arc::clone(&fifo));
        self.nodes[to]
            .component
            .bind_input(to_port, Arc::clone(&fifo));

        self.connections.push(Connection {
            from,
            from_port: from_port.to_string(),
            to,
            to_port: to_port.to_string(),
            fifo,
        });
        Ok(())
    }

    /// Prepares every component.
    pub fn prepare(&mut self) -> Result<(), PipelineError> {
        if !matches!(self.state, PipelineState::Idle | PipelineState::Stopped) {
            return Err(PipelineError::InvalidState(format!(
                "prepare from {:?}",
                self.state
            )));
        }
        for i in 0..self.nodes.len() {
            if let Err(err) = self.nodes[i].component.prepare() {
                return self.fail(i, err);
            }
        }
        self.transition(PipelineState::Prepared);
        Ok(())
    }

    /// Starts the pipeline: opens every connection FIFO, then starts
    /// components sinks-first. A cycle in the connection graph is
    /// rejected here.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if !matches!(self.state, PipelineState::Prepared | PipelineState::Paused) {
            return Err(PipelineError::InvalidState(format!(
                "start from {:?}",
                self.state
            )));
        }
        let order = self.topo_order()?;

        for conn in &self.connections {
            conn.fifo.set_flow_enabled(true);
        }

        tracing::info!(components = self.nodes.len(), "pipeline starting");
        for &i in order.iter().rev() {
            if let Err(err) = self.nodes[i].component.start() {
                return self.fail(i, err);
            }
        }
        self.transition(PipelineState::Running);
        Ok(())
    }

    /// Pauses components sources-first.
    pub fn pause(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::InvalidState(format!(
                "pause from {:?}",
                self.state
            )));
        }
        let order = self.topo_order()?;
        for &i in &order {
            if let Err(err) = self.nodes[i].component.pause() {
                return self.fail(i, err);
            }
        }
        self.transition(PipelineState::Paused);
        Ok(())
    }

    /// Stops the pipeline: closes every connection FIFO so blocked
    /// writers wake, then stops components sources-first. Every
    /// component gets its `stop` call regardless of earlier failures;
    /// the first error is reported and ends up in the final state.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        if matches!(self.state, PipelineState::Idle) {
            return Err(PipelineError::InvalidState("stop from Idle".to_string()));
        }

        for conn in &self.connections {
            conn.fifo.set_flow_enabled(false);
        }

        // Fall back to insertion order if the graph became cyclic; stop
        // must still reach every component.
        let order = self
            .topo_order()
            .unwrap_or_else(|_| (0..self.nodes.len()).collect());

        let mut first_error = None;
        for &i in &order {
            if let Err(err) = self.nodes[i].component.stop() {
                let id = self.nodes[i].id.clone();
                tracing::warn!(component = %id, error = %err, "component failed to stop");
                let _ = self.events_tx.send(PipelineEvent::ComponentError {
                    id: id.clone(),
                    error: err.clone(),
                });
                first_error.get_or_insert(PipelineError::Component {
                    id,
                    message: err.to_string(),
                });
            }
        }

        match first_error {
            Some(err) => {
                self.transition(PipelineState::Error(err.clone()));
                Err(err)
            }
            None => {
                tracing::info!("pipeline stopped");
                self.transition(PipelineState::Stopped);
                Ok(())
            }
        }
    }

    /// Sets a parameter addressed as `component.key`.
    pub fn set_parameter(&mut self, path: &str, value: ParamValue) -> Result<(), PipelineError> {
        let (component_id, key) = path
            .split_once('.')
            .ok_or_else(|| PipelineError::InvalidPath(path.to_string()))?;
        let i = *self
            .index
            .get(component_id)
            .ok_or_else(|| PipelineError::UnknownComponent(component_id.to_string()))?;
        self.nodes[i].component.parameters_mut().set(key, value)
    }

    /// Reads a parameter or readout addressed as `component.key`.
    pub fn get_parameter(&self, path: &str) -> Result<ParamValue, PipelineError> {
        let (component_id, key) = path
            .split_once('.')
            .ok_or_else(|| PipelineError::InvalidPath(path.to_string()))?;
        let i = *self
            .index
            .get(component_id)
            .ok_or_else(|| PipelineError::UnknownComponent(component_id.to_string()))?;
        self.nodes[i]
            .component
            .parameters()
            .get(key)
            .ok_or_else(|| PipelineError::UnknownParameter(path.to_string()))
    }

    /// Kahn's algorithm over the connection graph. Sources come first;
    /// `start` walks the result backwards.
    fn topo_order(&self) -> Result<Vec<usize>, PipelineError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); n];
        for conn in &self.connections {
            adjacent[conn.from].push(conn.to);
            in_degree[conn.to] += 1;
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &next in &adjacent[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() == n {
            Ok(order)
        } else {
            Err(PipelineError::CycleDetected)
        }
    }

    /// Handles a fatal component error: report it, stop everything in
    /// forward topological order, park in the error state.
    fn fail(&mut self, failed: usize, err: PipelineError) -> Result<(), PipelineError> {
        let id = self.nodes[failed].id.clone();
        tracing::error!(component = %id, error = %err, "component failed; stopping pipeline");
        let _ = self.events_tx.send(PipelineEvent::ComponentError {
            id: id.clone(),
            error: err.clone(),
        });

        for conn in &self.connections {
            conn.fifo.set_flow_enabled(false);
        }
        let order = self
            .topo_order()
            .unwrap_or_else(|_| (0..self.nodes.len()).collect());
        for &i in &order {
            if let Err(stop_err) = self.nodes[i].component.stop() {
                tracing::warn!(
                    component = %self.nodes[i].id,
                    error = %stop_err,
                    "component failed to stop during error handling"
                );
            }
        }

        let wrapped = PipelineError::Component {
            id,
            message: err.to_string(),
        };
        self.transition(PipelineState::Error(wrapped.clone()));
        Err(wrapped)
    }

    fn transition(&mut self, state: PipelineState) {
        tracing::debug!(?state, "pipeline state changed");
        self.state = state.clone();
        let _ = self.events_tx.send(PipelineEvent::StateChanged(state));
    }

    #[cfg(test)]
    fn connection_fifo(&self, from_id: &str, to_id: &str) -> Option<Arc<CommandFifo>> {
        let from = *self.index.get(from_id)?;
        let to = *self.index.get(to_id)?;
        self.connections
            .iter()
            .find(|c| c.from == from && c.to == to)
            .map(|c| Arc::clone(&c.fifo))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::component::{MediaKind, PortDecl};
    use crate::pipeline::params::ParameterSet;
    use parking_lot::Mutex;

    /// Test component that records its lifecycle calls into a shared log.
    struct Probe {
        id: &'static str,
        role: ComponentRole,
        inputs: Vec<PortDecl>,
        outputs: Vec<PortDecl>,
        log: Arc<Mutex<Vec<String>>>,
        params: ParameterSet,
        fail_on_start: bool,
    }

    impl Probe {
        fn new(
            id: &'static str,
            role: ComponentRole,
            kind: MediaKind,
            log: Arc<Mutex<Vec<String>>>,
        ) -> Self {
            let inputs = match role {
                ComponentRole::Source => vec![],
                _ => vec![PortDecl::new("in", kind)],
            };
            let outputs = match role {
                ComponentRole::Sink => vec![],
                _ => vec![PortDecl::new("out", kind)],
            };
            let mut params = ParameterSet::new();
            params.define_bool("enabled", true);
            Self {
                id,
                role,
                inputs,
                outputs,
                log,
                params,
                fail_on_start: false,
            }
        }

        fn record(&self, call: &str) {
            self.log.lock().push(format!("{}:{}", self.id, call));
        }
    }

    impl Component for Probe {
        fn role(&self) -> ComponentRole {
            self.role
        }
        fn inputs(&self) -> Vec<PortDecl> {
            self.inputs.clone()
        }
        fn outputs(&self) -> Vec<PortDecl> {
            self.outputs.clone()
        }
        fn prepare(&mut self) -> Result<(), PipelineError> {
            self.record("prepare");
            Ok(())
        }
        fn start(&mut self) -> Result<(), PipelineError> {
            self.record("start");
            if self.fail_on_start {
                return Err(PipelineError::Component {
                    id: self.id.to_string(),
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
        fn pause(&mut self) -> Result<(), PipelineError> {
            self.record("pause");
            Ok(())
        }
        fn stop(&mut self) -> Result<(), PipelineError> {
            self.record("stop");
            Ok(())
        }
        fn parameters(&self) -> &ParameterSet {
            &self.params
        }
        fn parameters_mut(&mut self) -> &mut ParameterSet {
            &mut self.params
        }
    }

    fn chain() -> (Pipeline, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add(
                "cam",
                Box::new(Probe::new(
                    "cam",
                    ComponentRole::Source,
                    MediaKind::Video,
                    Arc::clone(&log),
                )),
            )
            .unwrap();
        pipeline
            .add(
                "scale",
                Box::new(Probe::new(
                    "scale",
                    ComponentRole::Processor,
                    MediaKind::Video,
                    Arc::clone(&log),
                )),
            )
            .unwrap();
        pipeline
            .add(
                "display",
                Box::new(Probe::new(
                    "display",
                    ComponentRole::Sink,
                    MediaKind::Video,
                    Arc::clone(&log),
                )),
            )
            .unwrap();
        pipeline.connect("cam", "out", "scale", "in").unwrap();
        pipeline.connect("scale", "out", "display", "in").unwrap();
        (pipeline, log)
    }

    #[test]
    fn test_start_runs_sinks_first_stop_sources_first() {
        let (mut pipeline, log) = chain();
        pipeline.prepare().unwrap();
        log.lock().clear();

        pipeline.start().unwrap();
        assert_eq!(
            *log.lock(),
            vec!["display:start", "scale:start", "cam:start"]
        );
        assert_eq!(*pipeline.state(), PipelineState::Running);

        log.lock().clear();
        pipeline.stop().unwrap();
        assert_eq!(*log.lock(), vec!["cam:stop", "scale:stop", "display:stop"]);
        assert_eq!(*pipeline.state(), PipelineState::Stopped);
    }

    #[test]
    fn test_pause_runs_sources_first() {
        let (mut pipeline, log) = chain();
        pipeline.prepare().unwrap();
        pipeline.start().unwrap();
        log.lock().clear();

        pipeline.pause().unwrap();
        assert_eq!(
            *log.lock(),
            vec!["cam:pause", "scale:pause", "display:pause"]
        );
        assert_eq!(*pipeline.state(), PipelineState::Paused);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add(
                "a",
                Box::new(Probe::new(
                    "a",
                    ComponentRole::Source,
                    MediaKind::Video,
                    Arc::clone(&log),
                )),
            )
            .unwrap();
        let err = pipeline
            .add(
                "a",
                Box::new(Probe::new(
                    "a",
                    ComponentRole::Source,
                    MediaKind::Video,
                    log,
                )),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateComponent(_)));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add(
                "mic",
                Box::new(Probe::new(
                    "mic",
                    ComponentRole::Source,
                    MediaKind::Audio,
                    Arc::clone(&log),
                )),
            )
            .unwrap();
        pipeline
            .add(
                "display",
                Box::new(Probe::new(
                    "display",
                    ComponentRole::Sink,
                    MediaKind::Video,
                    log,
                )),
            )
            .unwrap();
        let err = pipeline
            .connect("mic", "out", "display", "in")
            .unwrap_err();
        assert!(matches!(err, PipelineError::KindMismatch(_)));
    }

    #[test]
    fn test_input_port_single_producer() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        for id in ["cam1", "cam2"] {
            pipeline
                .add(
                    id,
                    Box::new(Probe::new(
                        "cam",
                        ComponentRole::Source,
                        MediaKind::Video,
                        Arc::clone(&log),
                    )),
                )
                .unwrap();
        }
        pipeline
            .add(
                "display",
                Box::new(Probe::new(
                    "display",
                    ComponentRole::Sink,
                    MediaKind::Video,
                    log,
                )),
            )
            .unwrap();
        pipeline.connect("cam1", "out", "display", "in").unwrap();
        let err = pipeline
            .connect("cam2", "out", "display", "in")
            .unwrap_err();
        assert!(matches!(err, PipelineError::PortBusy(_)));
    }

    #[test]
    fn test_unknown_port_rejected() {
        let (mut pipeline, _log) = chain();
        let err = pipeline
            .connect("cam", "missing", "display", "in")
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownPort(_)));
    }

    #[test]
    fn test_cycle_rejected_at_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        for id in ["p1", "p2"] {
            pipeline
                .add(
                    id,
                    Box::new(Probe::new(
                        "p",
                        ComponentRole::Processor,
                        MediaKind::Data,
                        Arc::clone(&log),
                    )),
                )
                .unwrap();
        }
        pipeline.connect("p1", "out", "p2", "in").unwrap();
        pipeline.connect("p2", "out", "p1", "in").unwrap();

        pipeline.prepare().unwrap();
        assert_eq!(pipeline.start().unwrap_err(), PipelineError::CycleDetected);
    }

    #[test]
    fn test_start_failure_stops_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new();
        pipeline
            .add(
                "cam",
                Box::new(Probe::new(
                    "cam",
                    ComponentRole::Source,
                    MediaKind::Video,
                    Arc::clone(&log),
                )),
            )
            .unwrap();
        let mut bad = Probe::new("display", ComponentRole::Sink, MediaKind::Video, Arc::clone(&log));
        bad.fail_on_start = true;
        pipeline.add("display", Box::new(bad)).unwrap();
        pipeline.connect("cam", "out", "display", "in").unwrap();

        pipeline.prepare().unwrap();
        let events = pipeline.events();
        assert!(pipeline.start().is_err());
        assert!(matches!(pipeline.state(), PipelineState::Error(_)));

        // Every component was stopped despite the failure.
        let calls = log.lock();
        assert!(calls.contains(&"cam:stop".to_string()));
        assert!(calls.contains(&"display:stop".to_string()));
        drop(calls);

        let saw_component_error = events
            .try_iter()
            .any(|e| matches!(e, PipelineEvent::ComponentError { ref id, .. } if id == "display"));
        assert!(saw_component_error);
    }

    #[test]
    fn test_connection_fifo_flow_follows_lifecycle() {
        let (mut pipeline, _log) = chain();
        let fifo = pipeline.connection_fifo("cam", "scale").unwrap();

        pipeline.prepare().unwrap();
        assert!(!fifo.flow_enabled());
        pipeline.start().unwrap();
        assert!(fifo.flow_enabled());
        pipeline.stop().unwrap();
        assert!(!fifo.flow_enabled());
    }

    #[test]
    fn test_parameter_dotted_path() {
        let (mut pipeline, _log) = chain();
        pipeline
            .set_parameter("scale.enabled", ParamValue::Bool(false))
            .unwrap();
        assert_eq!(
            pipeline.get_parameter("scale.enabled").unwrap(),
            ParamValue::Bool(false)
        );

        assert!(matches!(
            pipeline.set_parameter("no-dot", ParamValue::Bool(true)),
            Err(PipelineError::InvalidPath(_))
        ));
        assert!(matches!(
            pipeline.set_parameter("ghost.enabled", ParamValue::Bool(true)),
            Err(PipelineError::UnknownComponent(_))
        ));
    }

    #[test]
    fn test_lifecycle_state_gating() {
        let (mut pipeline, _log) = chain();
        assert!(matches!(
            pipeline.start(),
            Err(PipelineError::InvalidState(_))
        ));
        pipeline.prepare().unwrap();
        assert!(matches!(
            pipeline.pause(),
            Err(PipelineError::InvalidState(_))
        ));
        pipeline.start().unwrap();
        assert!(matches!(
            pipeline.prepare(),
            Err(PipelineError::InvalidState(_))
        ));
    }
}
