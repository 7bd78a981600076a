//! Request Throttling - Per-Client Rate Limiters
//!
//! Every venue client owns one throttler. Before a request it sleeps until
//! the minimum spacing since the previous request has elapsed; after the
//! request it records the completion time.
//!
//! Three policies:
//! - [`StaticThrottle`]: fixed requests per second (or per minute).
//! - [`WeightedThrottle`]: base rate divided by the weight of the previous
//!   request. The base rate is derived once from venue-reported limits.
//! - [`AdaptiveThrottle`]: per-endpoint intensities raised on HTTP 429,
//!   with a one-off slow cooldown request after each 429.
//!
//! The decision logic is pure (it takes `Instant`s and returns durations)
//! so it can be tested against a simulated clock. Only the async wrappers
//! sleep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Minimum spacing for a requests-per-second rate.
pub fn interval(requests_per_second: f64) -> Duration {
  if requests_per_second <= 0.0 || !requests_per_second.is_finite() {
    return Duration::ZERO;
  }
  Duration::from_secs_f64(1.0 / requests_per_second)
}

// ────────────────────────────────────────────
// Spacing
// ────────────────────────────────────────────

/// Time of the last completed request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spacing {
  last: Option<Instant>,
}

impl Spacing {
  /// How long to wait at `now` so that at least `interval` separates this
  /// request from the previous one.
  pub fn wait(&self, interval: Duration, now: Instant) -> Duration {
    self
      .last
      .map_or(Duration::ZERO, |last| interval.saturating_sub(now.saturating_duration_since(last)))
  }

  /// Record a completed request.
  pub fn mark(&mut self, now: Instant) {
    self.last = Some(now);
  }
}

async fn pause(wait: Duration) {
  if !wait.is_zero() {
    debug!(wait_ms = wait.as_millis() as u64, "Throttling request");
    tokio::time::sleep(wait).await;
  }
}

// ────────────────────────────────────────────
// Static
// ────────────────────────────────────────────

/// Fixed-rate throttler.
#[derive(Debug)]
pub struct StaticThrottle {
  interval: Duration,
  spacing: Mutex<Spacing>,
}

impl StaticThrottle {
  pub fn per_second(requests: f64) -> Self {
    Self {
      interval: interval(requests),
      spacing: Mutex::new(Spacing::default()),
    }
  }

  pub fn per_minute(requests: f64) -> Self {
    let interval = if requests > 0.0 && requests.is_finite() {
      Duration::from_secs_f64(60.0 / requests)
    } else {
      Duration::ZERO
    };
    Self {
      interval,
      spacing: Mutex::new(Spacing::default()),
    }
  }

  /// Spacing enforced between requests.
  pub fn spacing(&self) -> Duration {
    self.interval
  }

  /// Sleep until the next request may go out.
  pub async fn before(&self) {
    let wait = self.spacing.lock().await.wait(self.interval, Instant::now());
    pause(wait).await;
  }

  /// Record that a request just completed.
  pub async fn after(&self) {
    self.spacing.lock().await.mark(Instant::now());
  }
}

// ────────────────────────────────────────────
// Weighted
// ────────────────────────────────────────────

/// Rate used until the venue reports its own limits.
pub const DEFAULT_WEIGHTED_RPS: f64 = 20.0;

/// Weight-aware rate decision.
#[derive(Debug, Clone)]
pub struct WeightPolicy {
  base_rps: Option<f64>,
  last_weight: u32,
}

impl Default for WeightPolicy {
  fn default() -> Self {
    Self {
      base_rps: None,
      last_weight: 1,
    }
  }
}

impl WeightPolicy {
  /// Whether the base rate still needs to be fetched from the venue.
  pub fn needs_base(&self) -> bool {
    self.base_rps.is_none()
  }

  /// Install the venue-derived base rate. Non-positive rates are ignored.
  pub fn set_base(&mut self, rps: f64) {
    if rps > 0.0 {
      self.base_rps = Some(rps);
    }
  }

  /// Spacing before a request of `weight`: the base rate divided by the
  /// weight of the previous request.
  pub fn interval(&mut self, weight: u32) -> Duration {
    let mut rps = self.base_rps.unwrap_or(DEFAULT_WEIGHTED_RPS);
    if self.last_weight > 1 {
      rps /= f64::from(self.last_weight);
    }
    self.last_weight = weight;
    interval(rps)
  }
}

/// Throttler for venues that assign weights to endpoints.
#[derive(Debug, Default)]
pub struct WeightedThrottle {
  state: Mutex<(WeightPolicy, Spacing)>,
}

impl WeightedThrottle {
  pub async fn needs_base(&self) -> bool {
    self.state.lock().await.0.needs_base()
  }

  pub async fn set_base(&self, rps: f64) {
    debug!(rps, "Weighted rate limit set");
    self.state.lock().await.0.set_base(rps);
  }

  pub async fn before(&self, weight: u32) {
    let wait = {
      let mut state = self.state.lock().await;
      let interval = state.0.interval(weight);
      state.1.wait(interval, Instant::now())
    };
    pause(wait).await;
  }

  pub async fn after(&self) {
    self.state.lock().await.1.mark(Instant::now());
  }
}

// ────────────────────────────────────────────
// Adaptive
// ────────────────────────────────────────────

/// Seconds per request for an endpoint that was never rate limited.
pub const INTENSITY_LOW: u32 = 1;
/// Seconds per request for an endpoint after its first 429.
pub const INTENSITY_TWO: u32 = 2;
/// Seconds per request during a cooldown.
pub const INTENSITY_SUPER: u32 = 60;

/// Endpoint identity: the path without its query string.
pub fn endpoint(path: &str) -> &str {
  path.split_once('?').map_or(path, |(head, _)| head)
}

/// Per-endpoint intensities with a one-shot cooldown.
#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
  intensities: HashMap<String, u32>,
  cooldown: bool,
  /// Spacing per intensity point.
  tick: Duration,
}

impl Default for AdaptivePolicy {
  fn default() -> Self {
    Self::with_tick(Duration::from_secs(1))
  }
}

impl AdaptivePolicy {
  pub fn with_tick(tick: Duration) -> Self {
    Self {
      intensities: HashMap::new(),
      cooldown: false,
      tick,
    }
  }

  /// Spacing before a request to `path`, and whether this request is the
  /// cooldown one.
  pub fn interval(&mut self, path: &str) -> (Duration, bool) {
    if self.cooldown {
      self.cooldown = false;
      return (self.tick * INTENSITY_SUPER, true);
    }
    let intensity = self
      .intensities
      .get(endpoint(path))
      .copied()
      .unwrap_or(INTENSITY_LOW);
    (self.tick * intensity, false)
  }

  /// React to a 429 on `path`. `cooled` tells whether the limited request
  /// was itself the cooldown one; its endpoint is then left as is.
  pub fn rate_limited(&mut self, path: &str, cooled: bool) {
    match self.intensities.get_mut(endpoint(path)) {
      Some(intensity) => {
        if !cooled {
          *intensity += 1;
        }
      }
      None => {
        self.intensities.insert(endpoint(path).to_string(), INTENSITY_TWO);
      }
    }
    self.cooldown = true;
  }

  /// Current intensity of an endpoint, if it was ever rate limited.
  pub fn intensity(&self, path: &str) -> Option<u32> {
    self.intensities.get(endpoint(path)).copied()
  }
}

/// Throttler that slows down individual endpoints after 429s.
#[derive(Debug, Default)]
pub struct AdaptiveThrottle {
  state: Mutex<(AdaptivePolicy, Spacing)>,
}

impl AdaptiveThrottle {
  /// Throttle whose intensities count in units of `tick` instead of seconds.
  pub fn with_tick(tick: Duration) -> Self {
    Self {
      state: Mutex::new((AdaptivePolicy::with_tick(tick), Spacing::default())),
    }
  }

  /// Current intensity of an endpoint, if it was ever rate limited.
  pub async fn intensity(&self, path: &str) -> Option<u32> {
    self.state.lock().await.0.intensity(path)
  }

  /// Sleep before a request to `path`; returns whether it is a cooldown.
  pub async fn before(&self, path: &str) -> bool {
    let (wait, cooled) = {
      let mut state = self.state.lock().await;
      let (interval, cooled) = state.0.interval(path);
      (state.1.wait(interval, Instant::now()), cooled)
    };
    pause(wait).await;
    cooled
  }

  pub async fn after(&self) {
    self.state.lock().await.1.mark(Instant::now());
  }

  pub async fn rate_limited(&self, path: &str, cooled: bool) {
    warn!(endpoint = endpoint(path), cooled, "Rate limited, cooling down");
    self.state.lock().await.0.rate_limited(path, cooled);
  }
}
