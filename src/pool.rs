//! Fixed pool of device buffers and their lifecycle.
//!
//! Every slot is always in exactly one [`SlotState`]:
//!
//! ```text
//!            claim_free              mark_queued
//!   Free ───────────────▶ PendingRefill ───────────▶ Queued
//!    ▲                        ▲                        │
//!    │                        └──── mark_reclaimed ────┘
//!    └──────────── discard (Queued or PendingRefill) ──┘
//! ```
//!
//! Queued slots belong to the device and are never handed out for filling.

use crate::device::{AudioDevice, BufferHandle, DeviceChannel};
use crate::error::{PetalStreamError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Queued,
    PendingRefill,
}

/// One fixed-capacity region of PCM bytes bound to a device buffer handle
#[derive(Debug)]
pub struct BufferSlot {
    handle: BufferHandle,
    data: Box<[u8]>,
    len: usize,
    state: SlotState,
}

impl BufferSlot {
    fn new(handle: BufferHandle, capacity: usize) -> Self {
        Self {
            handle,
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
            state: SlotState::Free,
        }
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes from the last fill
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// The filled portion of the slot
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Whole backing storage, for a decoder to write into from offset 0
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.data.len());
    }
}

/// Owns the buffer slots of one engine. Not internally synchronised.
#[derive(Debug)]
pub struct BufferPool {
    slots: Vec<BufferSlot>,
    released: bool,
}

impl BufferPool {
    /// Allocates `count` slots of `capacity` bytes, each bound to a fresh
    /// device handle. All slots start free.
    pub fn allocate<D: AudioDevice>(
        channel: &mut DeviceChannel<D>,
        count: usize,
        capacity: usize,
    ) -> Result<Self> {
        if count < 1 {
            return Err(PetalStreamError::InvalidConfiguration(
                "Buffer pool needs at least one slot".to_string(),
            ));
        }
        if capacity < 1 {
            return Err(PetalStreamError::InvalidConfiguration(
                "Buffer capacity must be greater than 0".to_string(),
            ));
        }

        let handles = channel.allocate_handles(count)?;
        if handles.len() != count {
            if let Err(e) = channel.release_handles(&handles) {
                log::warn!("Failed to release partial handle allocation: {}", e);
            }
            return Err(PetalStreamError::AudioDevice(format!(
                "Requested {} buffer handles, device returned {}",
                count,
                handles.len()
            )));
        }

        log::debug!("Allocated {} buffers of {} bytes", count, capacity);
        Ok(Self {
            slots: handles
                .into_iter()
                .map(|handle| BufferSlot::new(handle, capacity))
                .collect(),
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &BufferSlot {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut BufferSlot {
        &mut self.slots[index]
    }

    pub fn slots(&self) -> impl Iterator<Item = &BufferSlot> {
        self.slots.iter()
    }

    pub fn index_of(&self, handle: BufferHandle) -> Option<usize> {
        self.slots.iter().position(|slot| slot.handle == handle)
    }

    pub fn count(&self, state: SlotState) -> usize {
        self.slots.iter().filter(|slot| slot.state == state).count()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Takes a free slot for filling. `None` means every slot is in use,
    /// which is normal while the device drains the queue.
    pub fn claim_free(&mut self) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.state == SlotState::Free)?;
        let slot = &mut self.slots[index];
        slot.state = SlotState::PendingRefill;
        slot.len = 0;
        Some(index)
    }

    /// PendingRefill -> Queued, after the slot's bytes were submitted
    pub fn mark_queued(&mut self, index: usize) -> Result<()> {
        self.transition(index, SlotState::PendingRefill, SlotState::Queued)
    }

    /// Queued -> PendingRefill, once the device reports the slot played
    pub fn mark_reclaimed(&mut self, index: usize) -> Result<()> {
        self.transition(index, SlotState::Queued, SlotState::PendingRefill)?;
        self.slots[index].len = 0;
        Ok(())
    }

    /// Returns a slot to Free without refilling; its content is dropped
    pub fn discard(&mut self, index: usize) -> Result<()> {
        let slot = self.slot_checked(index)?;
        if slot.state == SlotState::Free {
            return Err(PetalStreamError::InvalidTransition(format!(
                "{} is already free",
                slot.handle
            )));
        }
        let slot = &mut self.slots[index];
        slot.state = SlotState::Free;
        slot.len = 0;
        Ok(())
    }

    /// Discards every Queued and PendingRefill slot, returning how many
    pub fn discard_all(&mut self) -> Result<usize> {
        let in_use: Vec<usize> = (0..self.slots.len())
            .filter(|&index| self.slots[index].state != SlotState::Free)
            .collect();
        for &index in &in_use {
            self.discard(index)?;
        }
        Ok(in_use.len())
    }

    /// Releases every device handle. Fails while any slot is still queued.
    pub fn release<D: AudioDevice>(&mut self, channel: &mut DeviceChannel<D>) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let queued = self.count(SlotState::Queued);
        if queued > 0 {
            return Err(PetalStreamError::InvalidTransition(format!(
                "Cannot release buffers while {} are queued",
                queued
            )));
        }

        let handles: Vec<_> = self.slots.iter().map(|slot| slot.handle).collect();
        channel.release_handles(&handles)?;
        self.released = true;
        log::debug!("Released {} buffers", handles.len());
        Ok(())
    }

    fn slot_checked(&self, index: usize) -> Result<&BufferSlot> {
        self.slots.get(index).ok_or_else(|| {
            PetalStreamError::InvalidTransition(format!("No slot at index {}", index))
        })
    }

    fn transition(&mut self, index: usize, from: SlotState, to: SlotState) -> Result<()> {
        let slot = self.slot_checked(index)?;
        if slot.state != from {
            return Err(PetalStreamError::InvalidTransition(format!(
                "{} is {:?}, expected {:?} before moving to {:?}",
                slot.handle, slot.state, from, to
            )));
        }
        self.slots[index].state = to;
        Ok(())
    }
}
