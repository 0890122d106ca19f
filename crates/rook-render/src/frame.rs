// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing over a ring of in-flight slots.
//!
//! ```text
//! 1. wait for the slot's in-flight guard
//! 2. acquire an image (stale -> drop the frame, schedule a rebuild)
//!    a stale acquire may still have signalled the slot's acquire semaphore;
//!    every rebuild attempt renews those before anything else
//! 3. if another guard still targets that image, wait for it; then claim the image
//! 4. reset the slot guard and submit the image's prerecorded commands
//! 5. present (stale -> schedule a rebuild, the frame still counts)
//! 6. rebuild if scheduled, from any source (acquire, present, resize)
//! 7. advance the counter, only if step 4 ran
//! ```
//!
//! The backend owns the actual GPU objects; this module owns the protocol.

use anyhow::{ensure, Result};
use std::fmt::Debug;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image(u32),
    /// Out of date or suboptimal. Nothing was acquired that the frame may use.
    /// `signaled`: the slot's acquire semaphore got a signal no submit will wait on.
    Stale { signaled: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rebuild {
    Done,
    /// Nothing was touched, e.g. the window is minimized.
    Deferred,
}

pub trait FrameBackend {
    type Guard: Copy + PartialEq + Debug;

    fn image_count(&self) -> usize;
    fn slot_guard(&self, slot: usize) -> Self::Guard;
    /// Unbounded wait.
    fn wait_guard(&mut self, guard: Self::Guard) -> Result<()>;
    fn acquire(&mut self, slot: usize) -> Result<Acquire>;
    /// Resets the slot guard, then submits the commands recorded for `image`.
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;
    fn present(&mut self, slot: usize, image: u32) -> Result<PresentStatus>;
    /// Replaces the acquire semaphores of `slots`. Runs before every rebuild attempt,
    /// deferred ones included, so the slot can acquire again.
    fn renew_acquire_signals(&mut self, slots: &[usize]) -> Result<()>;
    /// Idles the device, tears down every swapchain-scoped resource and builds it again.
    fn rebuild(&mut self) -> Result<Rebuild>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameCounter {
    frame: u64,
    ring: usize,
}

impl FrameCounter {
    pub fn new(ring: usize) -> Self {
        FrameCounter {
            frame: 0,
            ring: ring.max(1),
        }
    }

    pub fn slot(&self) -> usize {
        (self.frame % self.ring as u64) as usize
    }

    /// Frames submitted so far.
    pub fn frames(&self) -> u64 {
        self.frame
    }

    pub fn ring_len(&self) -> usize {
        self.ring
    }

    fn advance(&mut self) {
        self.frame += 1;
    }
}

/// Last guard that targeted each swapchain image. One table per swapchain generation.
#[derive(Clone, Debug)]
pub struct ImageGuards<G> {
    entries: Vec<Option<G>>,
}

impl<G: Copy + PartialEq> ImageGuards<G> {
    pub fn new(image_count: usize) -> Self {
        ImageGuards {
            entries: vec![None; image_count],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, image: usize) -> Option<G> {
        self.entries.get(image).copied().flatten()
    }

    pub fn is_clear(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// The guard still associated with `image`, if it is not `guard` itself.
    pub fn held_by_other(&self, image: usize, guard: G) -> Option<G> {
        self.get(image).filter(|held| *held != guard)
    }

    pub fn assign(&mut self, image: usize, guard: G) {
        self.entries[image] = Some(guard);
    }

    pub fn reset(&mut self, image_count: usize) {
        self.entries.clear();
        self.entries.resize(image_count, None);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    pub submitted: bool,
    pub rebuilt: bool,
}

pub struct FrameSynchronizer<G> {
    counter: FrameCounter,
    guards: ImageGuards<G>,
    rebuild_requested: bool,
    unconsumed: Vec<usize>,
}

impl<G: Copy + PartialEq + Debug> FrameSynchronizer<G> {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        FrameSynchronizer {
            counter: FrameCounter::new(frames_in_flight),
            guards: ImageGuards::new(image_count),
            rebuild_requested: false,
            unconsumed: Vec::new(),
        }
    }

    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_requested
    }

    pub fn counter(&self) -> FrameCounter {
        self.counter
    }

    pub fn guards(&self) -> &ImageGuards<G> {
        &self.guards
    }

    /// Slots whose acquire semaphore still holds a signal nobody waits on.
    pub fn unconsumed_signals(&self) -> &[usize] {
        &self.unconsumed
    }

    pub fn draw_frame<B>(&mut self, backend: &mut B) -> Result<FrameOutcome>
    where
        B: FrameBackend<Guard = G>,
    {
        let slot = self.counter.slot();
        let guard = backend.slot_guard(slot);
        backend.wait_guard(guard)?;

        let mut outcome = FrameOutcome::default();
        match backend.acquire(slot)? {
            Acquire::Stale { signaled } => {
                if signaled && !self.unconsumed.contains(&slot) {
                    self.unconsumed.push(slot);
                }
                debug!(
                    "acquire: swapchain stale, dropping frame {}",
                    self.counter.frames()
                );
                self.rebuild_requested = true;
            }
            Acquire::Image(image) => {
                let index = image as usize;
                ensure!(
                    index < self.guards.len(),
                    "acquired image {} but the swapchain has {} images",
                    image,
                    self.guards.len()
                );

                if let Some(held) = self.guards.held_by_other(index, guard) {
                    debug!("image {} still in flight under {:?}, waiting", image, held);
                    backend.wait_guard(held)?;
                }
                self.guards.assign(index, guard);

                backend.submit(slot, image)?;
                outcome.submitted = true;

                if backend.present(slot, image)? == PresentStatus::Stale {
                    debug!("present: swapchain stale after frame {}", self.counter.frames());
                    self.rebuild_requested = true;
                }
            }
        }

        if self.rebuild_requested {
            outcome.rebuilt = self.rebuild(backend)?;
        }
        if outcome.submitted {
            self.counter.advance();
        }
        Ok(outcome)
    }

    /// Runs a pending or forced rebuild. Returns false when the backend deferred it.
    pub fn rebuild<B>(&mut self, backend: &mut B) -> Result<bool>
    where
        B: FrameBackend<Guard = G>,
    {
        if !self.unconsumed.is_empty() {
            backend.renew_acquire_signals(&self.unconsumed)?;
            self.unconsumed.clear();
        }
        match backend.rebuild()? {
            Rebuild::Done => {
                self.guards.reset(backend.image_count());
                self.rebuild_requested = false;
                info!("swapchain rebuilt ({} images)", self.guards.len());
                Ok(true)
            }
            Rebuild::Deferred => {
                self.rebuild_requested = true;
                debug!("rebuild deferred");
                Ok(false)
            }
        }
    }
}
