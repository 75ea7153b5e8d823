//! Pooled pipeline commands.
//!
//! A command is a small pooled record shuttling one pipeline event —
//! a media payload, a flush, an end-of-stream marker, a seek — between
//! producer and consumer threads. Commands are explicitly reference
//! counted: [`CommandRef::clone`] takes a reference, dropping a
//! `CommandRef` releases one, and the final release clears the payload
//! and returns the record to its owning pool's free list.
//!
//! Writing a command into a FIFO moves the `CommandRef` in and reading
//! moves it out; neither transfer touches the count.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::pool::PoolShared;
use crate::refcount::{CommandPayload, RefCount};

/// First raw tag available for application-defined command types.
pub const USER_COMMAND_BASE: u32 = 0x1000;

/// What a command asks the consumer to do.
///
/// Raw tags are stable across releases; command types cross in-process
/// boundaries that may compile independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Empty record (only valid while pooled).
    None,
    /// Payload is a decoded frame.
    Frame,
    /// Payload is a compressed packet.
    Packet,
    /// Drop buffered data, keep running.
    Flush,
    /// No more data will follow.
    EndOfStream,
    /// Payload is a seek request.
    Seek,
    /// Payload is a configuration change.
    Config,
    /// Application-defined; raw tag is `USER_COMMAND_BASE + n`.
    User(u32),
}

impl CommandType {
    /// Stable raw tag.
    pub fn as_raw(self) -> u32 {
        match self {
            CommandType::None => 0,
            CommandType::Frame => 1,
            CommandType::Packet => 2,
            CommandType::Flush => 3,
            CommandType::EndOfStream => 4,
            CommandType::Seek => 5,
            CommandType::Config => 6,
            CommandType::User(n) => USER_COMMAND_BASE + n,
        }
    }

    /// Inverse of [`as_raw`](Self::as_raw); unknown tags below the user
    /// range decode as `None`.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => CommandType::None,
            1 => CommandType::Frame,
            2 => CommandType::Packet,
            3 => CommandType::Flush,
            4 => CommandType::EndOfStream,
            5 => CommandType::Seek,
            6 => CommandType::Config,
            n if n >= USER_COMMAND_BASE => CommandType::User(n - USER_COMMAND_BASE),
            _ => CommandType::None,
        }
    }

    /// True for the control markers that carry no media payload.
    pub fn is_sentinel(self) -> bool {
        matches!(self, CommandType::EndOfStream | CommandType::Flush)
    }

    /// True for the payload-bearing media types.
    pub fn is_media(self) -> bool {
        matches!(self, CommandType::Frame | CommandType::Packet)
    }
}

/// Payload of a [`CommandType::Seek`] command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekParams {
    /// Target position in seconds.
    pub position_secs: f64,
    /// Demuxer-defined seek flags.
    pub flags: u32,
}

impl CommandPayload for SeekParams {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Payload of a [`CommandType::Config`] command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// Parameter path, `component.key`.
    pub path: String,
    /// New value, stringly typed; the receiving component parses it.
    pub value: String,
}

impl CommandPayload for ConfigUpdate {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// User-visible command fields. Guarded by one mutex: an in-use command
/// belongs to one thread at a time, and publishing it through a FIFO is
/// the cross-thread handoff.
struct CommandState {
    cmd_type: CommandType,
    payload: Option<Arc<dyn CommandPayload>>,
    pts: i64,
    dts: i64,
    flags: u32,
    stream_index: u32,
    user_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl CommandState {
    fn cleared() -> Self {
        Self {
            cmd_type: CommandType::None,
            payload: None,
            pts: 0,
            dts: 0,
            flags: 0,
            stream_index: 0,
            user_data: None,
        }
    }

    fn reset(&mut self) {
        // Replacing the payload Option drops the old Arc: that is the
        // single release the command owes its payload.
        *self = Self::cleared();
    }
}

/// The pooled record behind a [`CommandRef`].
pub(crate) struct CommandRecord {
    refs: RefCount,
    pool: Weak<PoolShared>,
    state: Mutex<CommandState>,
}

impl CommandRecord {
    pub(crate) fn new(pool: Weak<PoolShared>) -> Arc<Self> {
        Arc::new(Self {
            refs: RefCount::new(0),
            pool,
            state: Mutex::new(CommandState::cleared()),
        })
    }

    /// Re-initializes a record coming off the free list. Only the pool
    /// calls this, with no outstanding references.
    pub(crate) fn arm(&self) {
        self.state.lock().reset();
        self.refs.rearm(1);
    }
}

/// Counted handle to an in-use command.
///
/// Cloning adds a reference; dropping releases one. The final release
/// clears the payload, resets the record and hands it back to the pool.
pub struct CommandRef {
    record: Arc<CommandRecord>,
}

impl CommandRef {
    pub(crate) fn from_record(record: Arc<CommandRecord>) -> Self {
        Self { record }
    }

    /// Re-purposes the command: releases any payload, clears the other
    /// fields and stamps the new type. The reference count is untouched.
    pub fn init(&self, cmd_type: CommandType) {
        let mut state = self.record.state.lock();
        state.reset();
        state.cmd_type = cmd_type;
    }

    /// The command's type tag.
    pub fn command_type(&self) -> CommandType {
        self.record.state.lock().cmd_type
    }

    /// Attaches a payload, releasing any previous one.
    ///
    /// The command holds the reference the caller passes in; callers
    /// that want to keep their own handle clone before calling.
    pub fn set_payload(&self, payload: Arc<dyn CommandPayload>) {
        self.record.state.lock().payload = Some(payload);
    }

    /// Releases the payload, if any.
    pub fn clear_payload(&self) {
        self.record.state.lock().payload = None;
    }

    /// A shared handle to the payload, if any.
    pub fn payload(&self) -> Option<Arc<dyn CommandPayload>> {
        self.record.state.lock().payload.clone()
    }

    /// Downcasts the payload to a concrete type the caller expects for
    /// this command's type tag.
    pub fn payload_as<P: CommandPayload + Clone>(&self) -> Option<P> {
        let payload = self.payload()?;
        payload.as_any().downcast_ref::<P>().cloned()
    }

    /// Presentation timestamp in stream ticks.
    pub fn pts(&self) -> i64 {
        self.record.state.lock().pts
    }

    pub fn set_pts(&self, pts: i64) {
        self.record.state.lock().pts = pts;
    }

    /// Decode timestamp in stream ticks.
    pub fn dts(&self) -> i64 {
        self.record.state.lock().dts
    }

    pub fn set_dts(&self, dts: i64) {
        self.record.state.lock().dts = dts;
    }

    /// Command-specific flags word.
    pub fn flags(&self) -> u32 {
        self.record.state.lock().flags
    }

    pub fn set_flags(&self, flags: u32) {
        self.record.state.lock().flags = flags;
    }

    /// Index of the stream this command belongs to.
    pub fn stream_index(&self) -> u32 {
        self.record.state.lock().stream_index
    }

    pub fn set_stream_index(&self, index: u32) {
        self.record.state.lock().stream_index = index;
    }

    /// Opaque caller context riding along with the command.
    pub fn user_data(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.record.state.lock().user_data.clone()
    }

    pub fn set_user_data(&self, data: Arc<dyn Any + Send + Sync>) {
        self.record.state.lock().user_data = Some(data);
    }

    /// True for end-of-stream and flush markers.
    pub fn is_sentinel(&self) -> bool {
        self.command_type().is_sentinel()
    }

    /// True for frame and packet commands.
    pub fn is_media(&self) -> bool {
        self.command_type().is_media()
    }

    /// Current reference count. Diagnostic.
    pub fn ref_count(&self) -> i32 {
        self.record.refs.get()
    }
}

impl Clone for CommandRef {
    fn clone(&self) -> Self {
        self.record.refs.increment();
        Self {
            record: Arc::clone(&self.record),
        }
    }
}

impl Drop for CommandRef {
    fn drop(&mut self) {
        if self.record.refs.decrement() != 0 {
            return;
        }
        // Final release: tear the payload down, then hand the record
        // back. A pool that is already gone just lets the record die.
        self.record.state.lock().reset();
        if let Some(pool) = self.record.pool.upgrade() {
            pool.return_record(Arc::clone(&self.record));
        }
    }
}

impl std::fmt::Debug for CommandRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRef")
            .field("type", &self.command_type())
            .field("refs", &self.ref_count())
            .finish()
    }
}
