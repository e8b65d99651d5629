use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// spaces out calls to the portal's create_link endpoint.
///
/// `budget` calls per `window`, handed out as evenly spaced slots. Every request shares the one
/// throttle, so ten clients opening the channel list at once queue up behind each other instead
/// of each sleeping on its own. The first call in a quiet period goes through immediately.
pub struct UpstreamThrottle {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl UpstreamThrottle {
    pub fn new(budget: u32, window: Duration) -> Self {
        Self {
            spacing: window / budget.max(1),
            next_slot: Mutex::new(None),
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// waits for this caller's slot
    pub async fn acquire(&self) {
        let wait = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next_slot {
                Some(slot) if slot > now => slot,
                _ => now,
            };
            *next_slot = Some(slot + self.spacing);
            slot - now
        };

        if !wait.is_zero() {
            debug!("Throttling portal call for {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }
}
