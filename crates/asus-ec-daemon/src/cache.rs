//! Latest sensor snapshot and the loop that refreshes it.

use arc_swap::ArcSwap;
use asus_ec_hw::{EcReader, RegisterDevice, Snapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Holds the most recent complete snapshot.
///
/// Readers get a shared handle to a whole snapshot; a replacement swaps the
/// handle, so no reader ever sees fields from two different passes.
pub struct SensorCache {
    current: ArcSwap<Snapshot>,
}

impl SensorCache {
    /// Creates a cache holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::new()),
        }
    }

    /// Returns the most recently committed snapshot.
    pub fn get(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Commits a new snapshot.
    pub fn replace(&self, snapshot: Snapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

impl Default for SensorCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs one poll pass, committing the result only if the pass succeeded.
pub fn refresh_once<D: RegisterDevice>(
    reader: &mut EcReader<D>,
    cache: &SensorCache,
) -> asus_ec_hw::Result<()> {
    let snapshot = reader.update()?;
    debug!("Committed snapshot with {} readings", snapshot.len());
    cache.replace(snapshot);
    Ok(())
}

/// Rate limit for repeated read errors.
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Decides which errors of a failing streak get logged.
///
/// The first error of a streak is logged, then at most one per interval,
/// carrying the number of errors suppressed since the previous log.
#[derive(Debug)]
struct ErrorThrottle {
    interval: Duration,
    last_log: Option<Instant>,
    suppressed: u32,
}

impl ErrorThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_log: None,
            suppressed: 0,
        }
    }

    /// Returns the suppressed count if this error should be logged.
    fn record_error(&mut self, now: Instant) -> Option<u32> {
        let due = match self.last_log {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if !due {
            self.suppressed += 1;
            return None;
        }
        self.last_log = Some(now);
        Some(std::mem::take(&mut self.suppressed))
    }

    /// Ends a streak; returns true if one was in progress.
    fn record_success(&mut self) -> bool {
        self.suppressed = 0;
        self.last_log.take().is_some()
    }
}

/// Polls the device forever at `period`; device errors keep the old snapshot.
pub async fn refresh_loop<D: RegisterDevice>(
    mut reader: EcReader<D>,
    cache: Arc<SensorCache>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut throttle = ErrorThrottle::new(ERROR_LOG_INTERVAL);

    loop {
        ticker.tick().await;
        // One pass is a handful of 256-byte reads; cheap enough to run inline.
        match refresh_once(&mut reader, &cache) {
            Err(e) => match throttle.record_error(Instant::now()) {
                Some(0) => warn!("Sensor read error: {}", e),
                Some(suppressed) => warn!(
                    "Sensor read error ({} more since last report): {}",
                    suppressed, e
                ),
                None => debug!("Sensor read error: {}", e),
            },
            Ok(()) => {
                if throttle.record_success() {
                    info!("Sensor reads recovered");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asus_ec_hw::{MemoryDevice, RegisterWidth, SensorDescriptor};

    fn sensors() -> Vec<SensorDescriptor> {
        vec![
            SensorDescriptor::new("CPU_TEMP", 0x3b, RegisterWidth::Byte, "°C", 0),
            SensorDescriptor::new("WATER_IN", 0x00, RegisterWidth::Byte, "°C", 1),
        ]
    }

    #[test]
    fn test_empty_before_first_pass() {
        let cache = SensorCache::new();
        assert!(cache.get().is_empty());
    }

    #[test]
    fn test_failed_pass_keeps_previous_snapshot() {
        let cache = SensorCache::new();

        let device = MemoryDevice::new()
            .with_register(0, 0x3b, 45)
            .with_register(1, 0x00, 31);
        let mut reader = EcReader::new(device, sensors()).unwrap();
        refresh_once(&mut reader, &cache).unwrap();
        let committed = cache.get();
        assert_eq!(committed.get("CPU_TEMP"), Some("45 °C"));

        // Fails after page 0 was already decoded.
        let mut failing = EcReader::new(MemoryDevice::new().failing_on_page(1), sensors()).unwrap();
        assert!(refresh_once(&mut failing, &cache).is_err());
        assert_eq!(*cache.get(), *committed);
    }

    #[test]
    fn test_failed_page_reset_is_not_committed() {
        let cache = SensorCache::new();
        let mut reader = EcReader::new(
            MemoryDevice::new().with_register(0, 0x3b, 45),
            sensors(),
        )
        .unwrap();
        refresh_once(&mut reader, &cache).unwrap();
        let committed = cache.get();

        // Every register decodes, but restoring page 0 afterwards fails.
        let device = MemoryDevice::new()
            .with_register(1, 0x00, 40)
            .failing_selects_of(0);
        let sensors = vec![SensorDescriptor::new(
            "WATER_IN",
            0x00,
            RegisterWidth::Byte,
            "°C",
            1,
        )];
        let mut failing = EcReader::new(device, sensors).unwrap();
        assert!(refresh_once(&mut failing, &cache).is_err());
        assert_eq!(*cache.get(), *committed);
        assert_eq!(cache.get().get("WATER_IN"), Some("0 °C"));
    }

    #[test]
    fn test_failed_first_pass_leaves_cache_empty() {
        let cache = SensorCache::new();
        let mut reader = EcReader::new(MemoryDevice::new().failing(), sensors()).unwrap();
        assert!(refresh_once(&mut reader, &cache).is_err());
        assert!(cache.get().is_empty());
    }

    #[test]
    fn test_readers_never_see_mixed_snapshots() {
        let cache = Arc::new(SensorCache::new());
        let names = ["CPU_TEMP", "CHIPSET_TEMP", "T_SENSOR", "WATER_IN", "WATER_OUT"];

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..2000 {
                        let snapshot = cache.get();
                        let mut values = snapshot.iter().map(|(_, v)| v);
                        if let Some(first) = values.next() {
                            assert!(values.all(|v| v == first));
                        }
                    }
                })
            })
            .collect();

        for generation in 0..2000 {
            let mut snapshot = Snapshot::new();
            for name in names {
                snapshot.insert(name, format!("{} °C", generation));
            }
            cache.replace(snapshot);
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(cache.get().get("WATER_OUT"), Some("1999 °C"));
    }

    #[tokio::test]
    async fn test_refresh_loop_survives_device_errors() {
        let cache = Arc::new(SensorCache::new());
        let reader = EcReader::new(MemoryDevice::new().failing(), sensors()).unwrap();
        let handle = tokio::spawn(refresh_loop(reader, cache.clone(), Duration::from_millis(5)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert!(cache.get().is_empty());
        handle.abort();
    }

    #[test]
    fn test_error_streak_logged_once_per_interval() {
        let start = Instant::now();
        let mut throttle = ErrorThrottle::new(Duration::from_secs(60));

        assert_eq!(throttle.record_error(start), Some(0));
        for ms in 1..=10 {
            assert_eq!(throttle.record_error(start + Duration::from_millis(ms)), None);
        }
        assert_eq!(throttle.record_error(start + Duration::from_secs(59)), None);
        assert_eq!(throttle.record_error(start + Duration::from_secs(60)), Some(11));
        assert_eq!(throttle.record_error(start + Duration::from_secs(61)), None);
    }

    #[test]
    fn test_recovery_starts_a_new_streak() {
        let start = Instant::now();
        let mut throttle = ErrorThrottle::new(Duration::from_secs(60));

        assert!(!throttle.record_success());
        assert_eq!(throttle.record_error(start), Some(0));
        assert_eq!(throttle.record_error(start + Duration::from_secs(1)), None);
        assert!(throttle.record_success());
        assert!(!throttle.record_success());
        assert_eq!(throttle.record_error(start + Duration::from_secs(2)), Some(0));
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_refresh_loop_logs_failing_device_once() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let cache = Arc::new(SensorCache::new());
        let reader = EcReader::new(MemoryDevice::new().failing(), sensors()).unwrap();
        let handle = tokio::spawn(refresh_loop(reader, cache, Duration::from_millis(2)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.abort();

        let output = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let warnings = output
            .lines()
            .filter(|line| line.contains("WARN") && line.contains("Sensor read error"))
            .count();
        assert_eq!(warnings, 1, "{}", output);
    }

    #[tokio::test]
    async fn test_refresh_loop_populates_cache() {
        let cache = Arc::new(SensorCache::new());
        let device = MemoryDevice::new().with_register(0, 0x3b, 52);
        let reader = EcReader::new(device, sensors()).unwrap();
        let handle = tokio::spawn(refresh_loop(reader, cache.clone(), Duration::from_millis(5)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get().get("CPU_TEMP"), Some("52 °C"));
        assert_eq!(cache.get().get("WATER_IN"), Some("0 °C"));
        handle.abort();
    }
}
