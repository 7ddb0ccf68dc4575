//! Command recording.
//!
//! [`CommandBuffer`] owns the recording storage for one frame slot. The
//! storage is reset (never destroyed) each time the slot is reused, exactly
//! like a command allocator in a multi-buffered frame loop.
//!
//! Recording tracks the resource state of every surface image it touches.
//! Closing the buffer validates that each image transitioned away from
//! presentation-ready state was transitioned back before the end of the
//! frame; an unpaired transition is a caller contract violation and is
//! surfaced immediately.
//!
//! # Example
//!
//! ```
//! use presenter_rhi::command::{CommandBuffer, DrawPacket, ResourceState};
//!
//! # fn example() -> presenter_rhi::RhiResult<()> {
//! let mut cmd = CommandBuffer::new();
//!
//! cmd.begin()?;
//! cmd.record_transition(0, ResourceState::Present, ResourceState::RenderTarget)?;
//! cmd.record_draw(DrawPacket::new(&[0xAB, 0xCD][..]))?;
//! cmd.record_transition(0, ResourceState::RenderTarget, ResourceState::Present)?;
//! cmd.close()?;
//! # Ok(())
//! # }
//! ```

use tracing::debug;

use crate::error::{RhiError, RhiResult};

/// Resource state of a surface image as seen by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Presentation-ready: the display engine may read the image.
    Present,
    /// Render target: the GPU may write the image.
    RenderTarget,
}

/// An opaque batch of draw commands recorded by the rendering layer.
///
/// The presenter core never interprets the payload; it only carries it from
/// the rendering layer to the GPU queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawPacket(Box<[u8]>);

impl DrawPacket {
    /// Wraps an encoded draw stream.
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// Length of the encoded stream in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the packet carries no commands.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The encoded stream.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A resource state transition for a surface image.
    Transition {
        /// Index of the surface image.
        image: u32,
        /// State the image is in when the transition executes.
        from: ResourceState,
        /// State the image is in afterwards.
        to: ResourceState,
    },
    /// An opaque draw batch supplied by the rendering layer.
    Draw(DrawPacket),
}

/// Recording state of a [`CommandBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Reset and empty; ready for `begin`.
    Ready,
    /// Between `begin` and `close`; accepting commands.
    Recording,
    /// Finalized; the command stream may be submitted.
    Closed,
}

/// Recording storage for one frame slot.
#[derive(Debug)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    state: RecordState,
    // (image, tracked state) pairs for every image touched this recording
    image_states: Vec<(u32, ResourceState)>,
}

impl CommandBuffer {
    /// Creates an empty buffer in the [`RecordState::Ready`] state.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            state: RecordState::Ready,
            image_states: Vec::new(),
        }
    }

    /// Current recording state.
    #[inline]
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// The recorded command stream. Meaningful once the buffer is closed.
    #[inline]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Begins a new recording.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BadRecordState`] unless the buffer was reset.
    pub fn begin(&mut self) -> RhiResult<()> {
        self.expect_state(RecordState::Ready)?;
        self.state = RecordState::Recording;
        Ok(())
    }

    /// Records a resource state transition for a surface image.
    ///
    /// The first transition of an image must start from
    /// [`ResourceState::Present`] (surface images are presentation-ready
    /// between frames); later transitions must start from the state the
    /// image was last left in.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BadRecordState`] if the buffer is not recording,
    /// or [`RhiError::InvalidStateTransition`] if `from` does not match the
    /// image's tracked state.
    pub fn record_transition(
        &mut self,
        image: u32,
        from: ResourceState,
        to: ResourceState,
    ) -> RhiResult<()> {
        self.expect_state(RecordState::Recording)?;

        let tracked = self
            .image_states
            .iter()
            .find(|(i, _)| *i == image)
            .map(|(_, s)| *s)
            .unwrap_or(ResourceState::Present);
        if tracked != from {
            return Err(RhiError::InvalidStateTransition {
                image,
                expected: tracked,
                actual: from,
            });
        }

        match self.image_states.iter_mut().find(|(i, _)| *i == image) {
            Some(entry) => entry.1 = to,
            None => self.image_states.push((image, to)),
        }
        self.commands.push(Command::Transition { image, from, to });
        Ok(())
    }

    /// Records an opaque draw batch.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BadRecordState`] if the buffer is not recording.
    pub fn record_draw(&mut self, packet: DrawPacket) -> RhiResult<()> {
        self.expect_state(RecordState::Recording)?;
        self.commands.push(Command::Draw(packet));
        Ok(())
    }

    /// Finalizes the recording.
    ///
    /// Every image transitioned away from [`ResourceState::Present`] must
    /// have been transitioned back by now; the buffer refuses to close
    /// around an image the display engine could no longer read.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::BadRecordState`] if the buffer is not recording,
    /// or [`RhiError::InvalidStateTransition`] naming the first image left
    /// in render-target state.
    pub fn close(&mut self) -> RhiResult<()> {
        self.expect_state(RecordState::Recording)?;

        for (image, state) in &self.image_states {
            if *state != ResourceState::Present {
                return Err(RhiError::InvalidStateTransition {
                    image: *image,
                    expected: ResourceState::Present,
                    actual: *state,
                });
            }
        }

        self.state = RecordState::Closed;
        debug!(commands = self.commands.len(), "command buffer closed");
        Ok(())
    }

    /// Clears the recording storage for a new frame.
    ///
    /// The backing allocation is kept. Callers are responsible for ensuring
    /// the previous submission has been waited on first; the frame slot
    /// table enforces this.
    pub fn reset(&mut self) {
        self.commands.clear();
        self.image_states.clear();
        self.state = RecordState::Ready;
    }

    fn expect_state(&self, expected: RecordState) -> RhiResult<()> {
        if self.state != expected {
            return Err(RhiError::BadRecordState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}
