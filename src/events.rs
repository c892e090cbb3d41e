use crate::types::{Slot, SlotUpdate};
use chrono::NaiveDate;
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 256;

/// Best effort fan-out of slot count changes to connected observers.
#[derive(Debug, Clone)]
pub struct SlotEvents {
    sender: Sender<SlotUpdate>,
}

impl Default for SlotEvents {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl SlotEvents {
    /// Must only be called after the change is committed.
    pub fn publish(&self, slot: &Slot) {
        if self.sender.send(SlotUpdate::from(slot)).is_err() {
            debug!(slot_id = %slot.id, "No subscribers for slot update");
        }
    }

    pub fn subscribe(&self, date: NaiveDate) -> BoxStream<'static, SlotUpdate> {
        BroadcastStream::new(self.sender.subscribe())
            .filter_map(move |update| async move {
                match update {
                    Ok(update) if update.slot_date == date => Some(update),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(?err, "Slot update subscriber lagged behind");
                        None
                    }
                }
            })
            .boxed()
    }
}
