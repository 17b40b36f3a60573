//! Change event bus for mutation and rebuild notifications.
//!
//! Every fill/empty batch and every island pass publishes a [`VolumeEvent`]
//! to the owning volume's bus. Collaborators (spawn handling, gameplay
//! reactions, audio) subscribe and drain their receiver at their own pace.
//! Events are published after the volume lock is released, so a subscriber
//! may immediately query the volume it was notified about.

use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::space::Coord;
use crate::state::StateId;
use crate::volume::islands::Island;

/// Published on a volume's bus after a mutation or a rebuild pass.
///
/// Payloads use `Arc<[...]>` so cloning per subscriber is a refcount bump.
#[derive(Clone, Debug)]
pub enum VolumeEvent {
    /// Cells that changed from empty to the paired state.
    CellsFilled(Arc<[(Coord, StateId)]>),
    /// Cells that were emptied, paired with the state they held before.
    CellsEmptied(Arc<[(Coord, StateId)]>),
    /// The removal that just completed left no active run in the volume.
    CompletelyEmptied,
    /// Disconnected groups detached from the volume during a rebuild pass.
    Islands(Arc<[Island]>),
}

/// Per-volume subscription bus.
///
/// Subscribers receive every event published after they subscribe. A sender
/// whose receiver has been dropped is pruned on the next publish.
pub struct EventBus {
    senders: Mutex<Vec<Sender<VolumeEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<VolumeEvent> {
        let (tx, rx) = unbounded();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, event: VolumeEvent) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
