//! Per-slot request generations.
//!
//! A slot is one logical request kind ("first page for the current filter",
//! "next page"). Issuing a token bumps the slot's generation, which
//! invalidates every token issued before it. A response may only be applied
//! while its token is still current.

use tokio::sync::watch;

pub struct RequestSlot {
    name: &'static str,
    generation: watch::Sender<u64>,
}

impl RequestSlot {
    pub fn new(name: &'static str) -> Self {
        let (generation, _) = watch::channel(0);
        Self { name, generation }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invalidate all outstanding tokens and return a fresh current one.
    pub fn issue(&self) -> SlotToken {
        let mut issued = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            issued = *generation;
        });
        SlotToken {
            generation: issued,
            rx: self.generation.subscribe(),
        }
    }

    /// Invalidate all outstanding tokens without issuing a new one.
    pub fn cancel(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }

    pub fn current(&self) -> u64 {
        *self.generation.borrow()
    }
}

impl std::fmt::Debug for RequestSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSlot")
            .field("name", &self.name)
            .field("generation", &self.current())
            .finish()
    }
}

#[derive(Debug)]
pub struct SlotToken {
    generation: u64,
    rx: watch::Receiver<u64>,
}

impl SlotToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        *self.rx.borrow() == self.generation
    }

    /// Resolves once a newer token has been issued or the slot cancelled.
    pub async fn superseded(&mut self) {
        let generation = self.generation;
        let _ = self.rx.wait_for(|current| *current != generation).await;
    }
}
