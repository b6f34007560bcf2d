//! Karma events
//!
//! Claim, accrual and reminder services publish on the bus only after their
//! transaction commits, so a rolled-back batch publishes nothing. The main
//! subscriber is the audit log spawned by the daemon; tests subscribe to see
//! what a run did.

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::chakra::{Chakra, Direction};

/// Room for one accrual run's worth of events before slow subscribers lag
const BUS_CAPACITY: usize = 1024;

/// Karma events emitted by services
#[derive(Debug, Clone)]
pub enum KarmaEvent {
    // Claim events
    ClaimRecorded {
        interaction_id: String,
        influencer_id: String,
        affected_id: String,
        chakra: Chakra,
        direction: Direction,
        initial_units: i32,
    },
    InteractionSuperseded {
        id: String,
        replaced_by: String,
        carried_units: i32,
    },
    KarmaBurned {
        interaction_id: String,
        influencer_id: String,
        direction: Direction,
        units: i32,
    },
    ClaimWithdrawn {
        affected_id: String,
        influencer_id: String,
        chakra: Chakra,
    },

    // Accrual events
    InteractionAccrued {
        id: String,
        influencer_id: String,
        direction: Direction,
        units: i32,
    },
    InteractionResolved {
        id: String,
        influencer_id: String,
    },

    // Notification events
    ReminderSent {
        life_id: String,
        interaction_id: String,
        units: i32,
    },
}

impl KarmaEvent {
    /// Short name used as the audit log target
    pub fn kind(&self) -> &'static str {
        match self {
            KarmaEvent::ClaimRecorded { .. } => "claim_recorded",
            KarmaEvent::InteractionSuperseded { .. } => "interaction_superseded",
            KarmaEvent::KarmaBurned { .. } => "karma_burned",
            KarmaEvent::ClaimWithdrawn { .. } => "claim_withdrawn",
            KarmaEvent::InteractionAccrued { .. } => "interaction_accrued",
            KarmaEvent::InteractionResolved { .. } => "interaction_resolved",
            KarmaEvent::ReminderSent { .. } => "reminder_sent",
        }
    }
}

/// Receives every committed karma event
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &KarmaEvent);
}

/// Fan-out of committed karma events
pub struct EventBus {
    sender: broadcast::Sender<KarmaEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: KarmaEvent) {
        trace!(kind = event.kind(), "Publishing karma event");
        // Err only means nobody is subscribed
        let _ = self.sender.send(event);
    }

    /// Publish a committed batch in the order it was applied
    pub fn emit_all(&self, events: impl IntoIterator<Item = KarmaEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KarmaEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes claim, burn, resolution and reminder events to the log
pub struct AuditLogListener;

impl EventListener for AuditLogListener {
    fn on_event(&self, event: &KarmaEvent) {
        match event {
            KarmaEvent::ClaimRecorded {
                interaction_id,
                influencer_id,
                affected_id,
                chakra,
                direction,
                ..
            } => {
                debug!(
                    id = %interaction_id,
                    influencer = %influencer_id,
                    affected = %affected_id,
                    chakra = %chakra,
                    direction = %direction,
                    "Claim recorded"
                );
            }
            KarmaEvent::KarmaBurned { interaction_id, influencer_id, units, .. } => {
                debug!(id = %interaction_id, influencer = %influencer_id, units, "Karma burned");
            }
            KarmaEvent::ClaimWithdrawn { affected_id, influencer_id, chakra } => {
                debug!(affected = %affected_id, influencer = %influencer_id, chakra = %chakra, "Claim withdrawn");
            }
            KarmaEvent::InteractionResolved { id, influencer_id } => {
                debug!(id = %id, influencer = %influencer_id, "Interaction resolved");
            }
            KarmaEvent::ReminderSent { life_id, interaction_id, .. } => {
                debug!(life = %life_id, id = %interaction_id, "Reminder sent");
            }
            // Per-hour accrual and supersede churn stay at trace
            _ => trace!(kind = event.kind(), event = ?event, "Karma event"),
        }
    }
}

/// Drive `listener` from its own bus subscription until the bus is dropped
pub fn spawn_listener<L>(event_bus: &EventBus, listener: L) -> JoinHandle<()>
where
    L: EventListener + 'static,
{
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "Karma audit fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Karma event bus dropped, listener exiting");
                    break;
                }
            }
        }
    })
}

/// Audit log for the daemon
pub fn spawn_audit_log(event_bus: Arc<EventBus>) -> JoinHandle<()> {
    spawn_listener(&event_bus, AuditLogListener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(KarmaEvent::InteractionAccrued {
            id: "i-1".into(),
            influencer_id: "l-1".into(),
            direction: Direction::Negative,
            units: 3,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            KarmaEvent::InteractionAccrued { id, units, .. } => {
                assert_eq!(id, "i-1");
                assert_eq!(units, 3);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        bus.emit(KarmaEvent::InteractionResolved {
            id: "i-1".into(),
            influencer_id: "l-1".into(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    struct Recorder(std::sync::Mutex<Vec<&'static str>>);

    impl EventListener for Arc<Recorder> {
        fn on_event(&self, event: &KarmaEvent) {
            self.0.lock().unwrap().push(event.kind());
        }
    }

    #[tokio::test]
    async fn test_listener_sees_batch_in_order() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder(std::sync::Mutex::new(Vec::new())));
        let handle = spawn_listener(&bus, recorder.clone());

        bus.emit_all(vec![
            KarmaEvent::InteractionAccrued {
                id: "i-1".into(),
                influencer_id: "l-1".into(),
                direction: Direction::Positive,
                units: 2,
            },
            KarmaEvent::InteractionResolved {
                id: "i-2".into(),
                influencer_id: "l-1".into(),
            },
        ]);
        drop(bus);
        timeout(Duration::from_millis(100), handle)
            .await
            .expect("timeout")
            .unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["interaction_accrued", "interaction_resolved"]
        );
    }
}
