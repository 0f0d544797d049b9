use std::collections::VecDeque;
use std::sync::Arc;

use thiserror::Error;

use crate::arg::{ArgTag, CommandArg};
use crate::state::{ContextId, ContextSnapshot};
use crate::status::StatusCell;
use crate::sync_object::SyncObject;
use crate::{CommandOpcode, GxmState};

/// Capacity of a command's inline argument buffer, in bytes.
pub const MAX_COMMAND_DATA_SIZE: usize = 0x40;

/// Maximum number of typed arguments one command may carry.
pub const MAX_COMMAND_ARGS: usize = 16;

/// Failure to append an argument to a command.
///
/// The guest command footprint is bounded by protocol, so callers treat
/// this as fatal ([`CommandList::add`] panics on it) rather than as a
/// runtime condition to recover from.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("argument of {needed} bytes does not fit ({remaining} bytes of {MAX_COMMAND_DATA_SIZE} free)")]
    Overflow { needed: usize, remaining: usize },
    #[error("command already carries {MAX_COMMAND_ARGS} arguments")]
    TooManyArguments,
}

/// One queued operation: an opcode, an inline typed-argument buffer, and an
/// optional caller-owned completion cell.
///
/// Arguments are appended with [`push`](Self::push) on the producer thread
/// and removed in the same order with [`pop`](Self::pop) on the renderer
/// thread. Each argument records an [`ArgTag`] beside its payload bytes;
/// `pop` re-checks the tag, so a handler that disagrees with the encoder
/// about argument shape aborts instead of misreading bytes.
///
/// Variable-size payloads (uniform buffers, vertex streams, index data) do
/// not go through the inline buffer; they ride out-of-line in the command's
/// blob table via [`push_blob`](Self::push_blob) / [`pop_blob`](Self::pop_blob).
#[derive(Debug)]
pub struct Command {
    opcode: u16,
    data: [u8; MAX_COMMAND_DATA_SIZE],
    tags: Vec<ArgTag>,
    push_index: usize,
    pop_index: usize,
    next_tag: usize,
    blobs: Vec<Box<[u8]>>,
    status: Option<Arc<StatusCell>>,
    sync: Option<Arc<SyncObject>>,
}

impl Command {
    pub fn new(opcode: CommandOpcode, status: Option<Arc<StatusCell>>) -> Self {
        Self::from_raw_opcode(opcode as u16, status)
    }

    /// Builds a command from a raw opcode value, which may be one this
    /// build does not know. The dispatcher logs and skips unknown opcodes.
    pub fn from_raw_opcode(opcode: u16, status: Option<Arc<StatusCell>>) -> Self {
        Self {
            opcode,
            data: [0; MAX_COMMAND_DATA_SIZE],
            tags: Vec::new(),
            push_index: 0,
            pop_index: 0,
            next_tag: 0,
            blobs: Vec::new(),
            status,
            sync: None,
        }
    }

    /// Builds a command and encodes its arguments in one step, panicking on
    /// encoding overflow (a protocol violation, not a runtime condition).
    pub fn build(
        opcode: CommandOpcode,
        status: Option<Arc<StatusCell>>,
        encode: impl FnOnce(&mut Command) -> Result<(), EncodeError>,
    ) -> Self {
        let mut cmd = Self::new(opcode, status);
        if let Err(err) = encode(&mut cmd) {
            panic!("encoding {opcode:?}: {err}");
        }
        cmd
    }

    pub fn opcode_raw(&self) -> u16 {
        self.opcode
    }

    pub fn opcode(&self) -> Option<CommandOpcode> {
        CommandOpcode::from_raw(self.opcode)
    }

    /// Cumulative payload bytes pushed so far.
    pub fn push_len(&self) -> usize {
        self.push_index
    }

    /// Appends one typed argument. On failure the command is unchanged.
    pub fn push<T: CommandArg>(&mut self, value: T) -> Result<(), EncodeError> {
        let remaining = MAX_COMMAND_DATA_SIZE - self.push_index;
        if T::SIZE > remaining {
            return Err(EncodeError::Overflow {
                needed: T::SIZE,
                remaining,
            });
        }
        if self.tags.len() == MAX_COMMAND_ARGS {
            return Err(EncodeError::TooManyArguments);
        }

        value.encode(&mut self.data[self.push_index..self.push_index + T::SIZE]);
        self.push_index += T::SIZE;
        self.tags.push(T::TAG);
        Ok(())
    }

    /// Removes the next argument, in the exact order it was pushed.
    ///
    /// Panics on underflow or tag mismatch; both indicate the handler and
    /// the encoder disagree about the command's argument shape, which is a
    /// programming error, not a recoverable condition.
    pub fn pop<T: CommandArg>(&mut self) -> T {
        let Some(&tag) = self.tags.get(self.next_tag) else {
            panic!(
                "popped past the {} encoded argument(s) of opcode {}",
                self.tags.len(),
                self.opcode
            );
        };
        if tag != T::TAG {
            panic!(
                "argument {} of opcode {} was encoded as {:?}, popped as {:?}",
                self.next_tag,
                self.opcode,
                tag,
                T::TAG
            );
        }
        debug_assert!(self.pop_index + T::SIZE <= self.push_index);

        let value = T::decode(&self.data[self.pop_index..self.pop_index + T::SIZE]);
        self.pop_index += T::SIZE;
        self.next_tag += 1;
        value
    }

    /// Appends a variable-size payload out-of-line; only its blob-table
    /// index goes through the inline buffer.
    pub fn push_blob(&mut self, bytes: impl Into<Box<[u8]>>) -> Result<(), EncodeError> {
        let index = self.blobs.len() as u32;
        // Reserve the inline slot first so a failed push leaves no orphan.
        self.push_raw_blob_index(index)?;
        self.blobs.push(bytes.into());
        Ok(())
    }

    /// Removes the next out-of-line payload.
    pub fn pop_blob(&mut self) -> Box<[u8]> {
        let Some(&tag) = self.tags.get(self.next_tag) else {
            panic!(
                "popped past the {} encoded argument(s) of opcode {}",
                self.tags.len(),
                self.opcode
            );
        };
        if tag != ArgTag::Blob {
            panic!(
                "argument {} of opcode {} was encoded as {:?}, popped as a blob",
                self.next_tag, self.opcode, tag
            );
        }

        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[self.pop_index..self.pop_index + 4]);
        self.pop_index += 4;
        self.next_tag += 1;

        let index = u32::from_le_bytes(raw) as usize;
        std::mem::take(&mut self.blobs[index])
    }

    fn push_raw_blob_index(&mut self, index: u32) -> Result<(), EncodeError> {
        let remaining = MAX_COMMAND_DATA_SIZE - self.push_index;
        if remaining < 4 {
            return Err(EncodeError::Overflow {
                needed: 4,
                remaining,
            });
        }
        if self.tags.len() == MAX_COMMAND_ARGS {
            return Err(EncodeError::TooManyArguments);
        }

        self.data[self.push_index..self.push_index + 4].copy_from_slice(&index.to_le_bytes());
        self.push_index += 4;
        self.tags.push(ArgTag::Blob);
        Ok(())
    }

    /// Writes `code` into the completion cell, if the producer attached
    /// one. Waking anyone blocked on the cell is the renderer's job.
    pub fn complete(&self, code: i32) {
        if let Some(status) = &self.status {
            status.set(code);
        }
    }

    pub fn has_status(&self) -> bool {
        self.status.is_some()
    }

    /// Attaches the guest sync object a `SignalSyncObject` command targets.
    pub fn set_sync_object(&mut self, sync: Arc<SyncObject>) {
        self.sync = Some(sync);
    }

    pub fn take_sync_object(&mut self) -> Option<Arc<SyncObject>> {
        self.sync.take()
    }
}

/// Ordered sequence of commands tied to one submitting context.
///
/// Accumulates on the producer side during a batch of facade calls, is
/// stamped with the context and its state snapshot at submission, and is
/// fully consumed by the dispatcher.
#[derive(Debug, Default)]
pub struct CommandList {
    pub commands: VecDeque<Command>,
    pub context: Option<ContextId>,
    pub snapshot: Option<Arc<ContextSnapshot>>,
}

impl CommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs one command, encoding its arguments with `encode`, and
    /// appends it. Panics on encoding overflow (protocol violation).
    pub fn add(
        &mut self,
        opcode: CommandOpcode,
        status: Option<Arc<StatusCell>>,
        encode: impl FnOnce(&mut Command) -> Result<(), EncodeError>,
    ) {
        self.commands.push_back(Command::build(opcode, status, encode));
    }

    /// Appends a `SetState` command for `state`; `encode` supplies the
    /// state's arguments after the sub-tag.
    pub fn add_set_state(
        &mut self,
        state: GxmState,
        encode: impl FnOnce(&mut Command) -> Result<(), EncodeError>,
    ) {
        self.add(CommandOpcode::SetState, None, |cmd| {
            cmd.push(state)?;
            encode(cmd)
        });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
