//! Companion side of the link.
//!
//! The companion listens for data changes; any change at `/weather` is a
//! request from the face, and its only effect is to kick an immediate weather
//! sync. The payload (the request id) is not inspected.
//!
//! `SimulatedWeatherSync` stands in for the real fetch pipeline so the whole
//! round trip can run in one process.

use std::sync::Arc;

use rand::Rng;
use rand::seq::SliceRandom;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::{DataEvent, WEATHER_PATH};
use crate::transport::DataChannel;
use crate::weather::WeatherUpdate;

pub trait WeatherSync: Send + Sync {
    fn sync_immediately(&self);
}

pub struct CompanionListener<S> {
    sync: S,
}

impl<S: WeatherSync> CompanionListener<S> {
    pub fn new(sync: S) -> Self {
        Self { sync }
    }

    /// Trigger one sync per changed `/weather` item. Returns the number of
    /// syncs triggered.
    pub fn on_data_changed(&self, events: &[DataEvent]) -> usize {
        let mut synced = 0;
        for event in events.iter().filter(|e| e.is_changed()) {
            if event.path == WEATHER_PATH {
                info!(target: "companion", "weather requested; syncing now");
                self.sync.sync_immediately();
                synced += 1;
            } else {
                debug!(target: "companion", path = %event.path, "ignoring");
            }
        }
        synced
    }
}

/// Run `listener` against every batch arriving on `channel`.
pub fn spawn_companion_listener<S>(
    runtime: &Handle,
    channel: &Arc<dyn DataChannel>,
    listener: CompanionListener<S>,
) -> JoinHandle<()>
where
    S: WeatherSync + 'static,
{
    let mut inbound = channel.subscribe();
    runtime.spawn(async move {
        loop {
            match inbound.recv().await {
                Ok(batch) => {
                    listener.on_data_changed(&batch);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "companion", skipped, "request batches dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// SimulatedWeatherSync
// ---------------------------------------------------------------------------

/// Condition codes the simulator picks from; 951 has no icon.
const SAMPLE_CONDITIONS: [i32; 8] = [211, 300, 501, 520, 601, 800, 802, 951];

/// A plausible reading: high in 50..=95, low 5..=20 below it.
pub fn random_update<R: Rng>(rng: &mut R) -> WeatherUpdate {
    let high = rng.gen_range(50..=95);
    let low = high - rng.gen_range(5..=20);
    let condition_code = SAMPLE_CONDITIONS.choose(rng).copied().unwrap_or(800);
    WeatherUpdate {
        high,
        low,
        condition_code,
    }
}

/// Publishes a random reading on `/weather` whenever asked to sync.
pub struct SimulatedWeatherSync {
    channel: Arc<dyn DataChannel>,
    runtime: Handle,
}

impl SimulatedWeatherSync {
    pub fn new(channel: Arc<dyn DataChannel>, runtime: Handle) -> Self {
        Self { channel, runtime }
    }
}

impl WeatherSync for SimulatedWeatherSync {
    fn sync_immediately(&self) {
        let update = random_update(&mut rand::thread_rng());
        let put = self.channel.put_data_item(WEATHER_PATH, update.to_data_map());
        self.runtime.spawn(async move {
            match put.await {
                Ok(()) => info!(
                    target: "companion",
                    high = update.high,
                    low = update.low,
                    condition = update.condition_code,
                    "weather pushed"
                ),
                Err(e) => warn!(target: "companion", "weather push failed: {e}"),
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataMap;
    use crate::transport::loopback::loopback_pair;
    use crate::weather::WeatherRequest;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default, Clone)]
    struct CountingSync(Arc<AtomicUsize>);

    impl WeatherSync for CountingSync {
        fn sync_immediately(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn only_changed_weather_items_trigger_sync() {
        let sync = CountingSync::default();
        let listener = CompanionListener::new(sync.clone());
        let request = WeatherRequest::fresh().to_data_map();
        let synced = listener.on_data_changed(&[
            DataEvent::changed(WEATHER_PATH, request.clone()),
            DataEvent::deleted(WEATHER_PATH),
            DataEvent::changed("/settings", DataMap::new()),
            DataEvent::changed(WEATHER_PATH, request),
        ]);
        assert_eq!(synced, 2);
        assert_eq!(sync.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn random_readings_are_plausible() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let u = random_update(&mut rng);
            assert!((50..=95).contains(&u.high));
            assert!((5..=20).contains(&(u.high - u.low)));
            assert!(SAMPLE_CONDITIONS.contains(&u.condition_code));
        }
    }

    #[tokio::test]
    async fn request_round_trips_to_a_weather_update() {
        let (face, companion) = loopback_pair();
        face.connect();
        let companion_channel: Arc<dyn DataChannel> = Arc::new(companion);
        let sync = SimulatedWeatherSync::new(Arc::clone(&companion_channel), Handle::current());
        let _listener = spawn_companion_listener(
            &Handle::current(),
            &companion_channel,
            CompanionListener::new(sync),
        );

        let mut face_rx = face.subscribe();
        face.put_data_item(WEATHER_PATH, WeatherRequest::fresh().to_data_map())
            .await
            .expect("request");

        let batch = face_rx.recv().await.expect("weather reply");
        assert_eq!(batch[0].path, WEATHER_PATH);
        assert!(WeatherUpdate::decode(&batch[0].data).is_ok());
    }
}
