//! Accelerometer backends
//!
//! Produces the raw sample feed consumed by the motion monitor. On Linux the
//! industrial-I/O subsystem exposes accelerometers under
//! `/sys/bus/iio/devices/iio:deviceN` as `in_accel_{x,y,z}_raw` plus a scale
//! factor. Machines without one run with motion detection absent.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::motion::{MotionFeed, MotionSample};

/// Default sysfs root scanned for accelerometers
pub const IIO_ROOT: &str = "/sys/bus/iio/devices";

/// Available sample sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorBackend {
    /// Linux IIO accelerometer device directory
    Iio(PathBuf),
    /// No accelerometer
    Absent,
}

impl SensorBackend {
    /// Find the first IIO accelerometer on this machine
    pub fn detect() -> Self {
        Self::detect_in(Path::new(IIO_ROOT))
    }

    pub fn detect_in(root: &Path) -> Self {
        let Ok(entries) = std::fs::read_dir(root) else {
            return Self::Absent;
        };

        let mut devices: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.join("in_accel_x_raw").exists())
            .collect();
        devices.sort();

        devices.into_iter().next().map(Self::Iio).unwrap_or(Self::Absent)
    }

    /// Resolve a config value: "auto", "none", or a device directory
    pub fn from_setting(setting: &str) -> Self {
        match setting.trim() {
            "" | "auto" => Self::detect(),
            "none" | "off" => Self::Absent,
            path => Self::Iio(PathBuf::from(path)),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Iio(dir) => format!("iio:{}", dir.display()),
            Self::Absent => "none".to_string(),
        }
    }

    /// Start polling. Returns `None` when there is nothing to read, in which
    /// case the engine reports motion detection as absent.
    pub fn spawn(self, poll: Duration) -> Option<MotionFeed> {
        let dir = match self {
            Self::Iio(dir) => dir,
            Self::Absent => return None,
        };

        let reader = match IioAccelerometer::open(&dir) {
            Ok(reader) => reader,
            Err(e) => {
                warn!("Accelerometer unavailable: {:#}", e);
                return None;
            }
        };
        info!(device = %dir.display(), scale = reader.scale, "Accelerometer attached");

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(poll_accelerometer(reader, poll, tx));
        Some(rx)
    }
}

/// One IIO accelerometer device
#[derive(Debug, Clone)]
pub struct IioAccelerometer {
    dir: PathBuf,
    scale: f64,
}

impl IioAccelerometer {
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.join("in_accel_x_raw").exists() {
            anyhow::bail!("{} has no accelerometer channels", dir.display());
        }

        let scale = ["in_accel_scale", "in_accel_x_scale"]
            .iter()
            .find_map(|name| read_number(&dir.join(name)).ok())
            .unwrap_or(1.0);

        Ok(Self {
            dir: dir.to_path_buf(),
            scale,
        })
    }

    pub fn read(&self) -> Result<MotionSample> {
        Ok(MotionSample::new(
            self.axis("x")?,
            self.axis("y")?,
            self.axis("z")?,
        ))
    }

    fn axis(&self, axis: &str) -> Result<f64> {
        let path = self.dir.join(format!("in_accel_{}_raw", axis));
        Ok(read_number(&path)? * self.scale)
    }
}

fn read_number(path: &Path) -> Result<f64> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    content
        .trim()
        .parse()
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Separates gravity from a raw accelerometer signal with a low-pass
/// estimate, leaving the linear acceleration caused by moving the device.
#[derive(Debug, Clone)]
pub struct GravityFilter {
    alpha: f64,
    gravity: Option<[f64; 3]>,
}

impl Default for GravityFilter {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl GravityFilter {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            gravity: None,
        }
    }

    pub fn apply(&mut self, raw: MotionSample) -> MotionSample {
        let current = [raw.x, raw.y, raw.z];
        let gravity = match self.gravity {
            None => current,
            Some(previous) => std::array::from_fn(|i| {
                self.alpha * previous[i] + (1.0 - self.alpha) * current[i]
            }),
        };
        self.gravity = Some(gravity);

        MotionSample::new(
            raw.x - gravity[0],
            raw.y - gravity[1],
            raw.z - gravity[2],
        )
    }
}

async fn poll_accelerometer(
    reader: IioAccelerometer,
    poll: Duration,
    tx: mpsc::Sender<MotionSample>,
) {
    let reader = Arc::new(reader);
    let mut ticker = tokio::time::interval(poll.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut filter = GravityFilter::default();

    loop {
        ticker.tick().await;
        let device = Arc::clone(&reader);
        let sample = match tokio::task::spawn_blocking(move || device.read()).await {
            Ok(Ok(sample)) => filter.apply(sample),
            Ok(Err(e)) => {
                warn!("Accelerometer read failed, motion detection stopped: {:#}", e);
                return;
            }
            Err(e) => {
                warn!("Accelerometer reader failed, motion detection stopped: {}", e);
                return;
            }
        };
        if tx.send(sample).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_device(root: &Path, name: &str, raw: [i32; 3], scale: Option<f64>) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (axis, value) in ["x", "y", "z"].iter().zip(raw) {
            fs::write(dir.join(format!("in_accel_{}_raw", axis)), format!("{}\n", value)).unwrap();
        }
        if let Some(scale) = scale {
            fs::write(dir.join("in_accel_scale"), format!("{}\n", scale)).unwrap();
        }
        dir
    }

    #[test]
    fn test_detect_finds_accelerometer() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("iio:device0")).unwrap();
        let accel = fake_device(root.path(), "iio:device1", [0, 0, 1000], Some(0.0098));

        assert_eq!(SensorBackend::detect_in(root.path()), SensorBackend::Iio(accel));
    }

    #[test]
    fn test_detect_missing_root_is_absent() {
        let root = TempDir::new().unwrap();
        assert_eq!(
            SensorBackend::detect_in(&root.path().join("missing")),
            SensorBackend::Absent
        );
    }

    #[test]
    fn test_from_setting() {
        assert_eq!(SensorBackend::from_setting("none"), SensorBackend::Absent);
        assert_eq!(SensorBackend::Absent.name(), "none");
        assert_eq!(
            SensorBackend::from_setting("/dev/null/iio"),
            SensorBackend::Iio(PathBuf::from("/dev/null/iio"))
        );
    }

    #[test]
    fn test_reader_applies_scale() {
        let root = TempDir::new().unwrap();
        let dir = fake_device(root.path(), "iio:device0", [100, -200, 1000], Some(0.01));

        let sample = IioAccelerometer::open(&dir).unwrap().read().unwrap();
        assert!((sample.x - 1.0).abs() < 1e-9);
        assert!((sample.y + 2.0).abs() < 1e-9);
        assert!((sample.z - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_reader_rejects_non_accelerometer() {
        let root = TempDir::new().unwrap();
        assert!(IioAccelerometer::open(root.path()).is_err());
    }

    #[test]
    fn test_gravity_filter_removes_constant_signal() {
        let mut filter = GravityFilter::default();
        let resting = MotionSample::new(0.0, 0.0, 9.81);
        for _ in 0..10 {
            assert!(filter.apply(resting).magnitude() < 1e-9);
        }

        let jolt = filter.apply(MotionSample::new(8.0, 0.0, 9.81));
        assert!(jolt.magnitude() > 5.0);
    }

    #[tokio::test]
    async fn test_spawn_streams_samples() {
        let root = TempDir::new().unwrap();
        let dir = fake_device(root.path(), "iio:device0", [0, 0, 981], Some(0.01));

        let mut feed = SensorBackend::Iio(dir)
            .spawn(Duration::from_millis(5))
            .expect("feed");
        let first = feed.recv().await.unwrap();
        assert!(first.magnitude() < 1e-9);
    }

    #[tokio::test]
    async fn test_feed_closes_when_device_disappears() {
        let root = TempDir::new().unwrap();
        let dir = fake_device(root.path(), "iio:device0", [0, 0, 981], Some(0.01));

        let mut feed = SensorBackend::Iio(dir.clone())
            .spawn(Duration::from_millis(5))
            .expect("feed");
        feed.recv().await.unwrap();

        fs::remove_dir_all(&dir).unwrap();
        while feed.recv().await.is_some() {}
    }

    #[test]
    fn test_absent_backend_has_no_feed() {
        assert!(SensorBackend::Absent.spawn(Duration::from_millis(5)).is_none());
    }
}
