use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use schat_core::GatewayConfig;
use schat_models::events::ClientEvent;
use std::num::NonZeroU32;
use std::sync::OnceLock;
use std::time::Duration;

/// Why an event was refused by the per-user limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limited {
    Events { retry_after_ms: u64 },
    Typing { retry_after_ms: u64 },
}

/// Per-user inbound limits shared by every connection.
pub struct EventRateLimits {
    /// All authenticated events.
    events: DefaultKeyedRateLimiter<i64>,
    /// `typing` on top of the overall cap.
    typing: DefaultKeyedRateLimiter<i64>,
}

static RATE_LIMITS: OnceLock<EventRateLimits> = OnceLock::new();

fn per_minute(limit: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN))
}

/// Process-wide limits, built from the first gateway config seen.
pub fn event_rate_limits(config: &GatewayConfig) -> &'static EventRateLimits {
    RATE_LIMITS.get_or_init(|| {
        tokio::spawn(async {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Some(limits) = RATE_LIMITS.get() {
                    limits.prune();
                }
            }
        });
        EventRateLimits::new(config)
    })
}

impl EventRateLimits {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            events: RateLimiter::keyed(per_minute(config.max_events_per_minute)),
            typing: RateLimiter::keyed(per_minute(config.max_typing_per_minute)),
        }
    }

    pub fn check(&self, user_id: i64, event: &ClientEvent) -> Result<(), Limited> {
        let now = DefaultClock::default().now();

        if let Err(not_until) = self.events.check_key(&user_id) {
            let wait = not_until.wait_time_from(now);
            return Err(Limited::Events {
                retry_after_ms: wait.as_millis().max(1) as u64,
            });
        }

        if matches!(event, ClientEvent::Typing { .. }) {
            if let Err(not_until) = self.typing.check_key(&user_id) {
                let wait = not_until.wait_time_from(now);
                return Err(Limited::Typing {
                    retry_after_ms: wait.as_millis().max(1) as u64,
                });
            }
        }
        Ok(())
    }

    fn prune(&self) {
        self.events.retain_recent();
        self.typing.retain_recent();
        self.events.shrink_to_fit();
        self.typing.shrink_to_fit();
        tracing::trace!("rate limiter cleanup: pruned stale entries");
    }
}
