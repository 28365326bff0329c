//! User parameters
//!
//! Parameters live in a [`ParamStore`], one value per key. A background task
//! re-reads them on a fixed period into an immutable [`UserParams`] snapshot
//! published over a watch channel, and applies writes queued by the control
//! tick, so the tick itself never touches the store.

use car_state::CarParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::ParamsError;

/// Keys read or written by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey {
    IsMetric,
    LongitudinalPersonality,
    ExperimentalMode,
    ExperimentalLongitudinalEnabled,
    JoystickDebugMode,
    ControlsReady,
}

impl ParamKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::IsMetric => "IsMetric",
            ParamKey::LongitudinalPersonality => "LongitudinalPersonality",
            ParamKey::ExperimentalMode => "ExperimentalMode",
            ParamKey::ExperimentalLongitudinalEnabled => "ExperimentalLongitudinalEnabled",
            ParamKey::JoystickDebugMode => "JoystickDebugMode",
            ParamKey::ControlsReady => "ControlsReady",
        }
    }
}

/// Key-value storage for user parameters
pub trait ParamStore: Send + Sync {
    /// Value of `key`, `None` if it was never written
    fn get(&self, key: &str) -> Result<Option<String>, ParamsError>;

    fn put(&self, key: &str, value: &str) -> Result<(), ParamsError>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), ParamsError>;
}

fn check_key(key: &str) -> Result<(), ParamsError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ParamsError::InvalidKey(key.to_string()))
    }
}

/// One file per key in a directory
#[derive(Debug, Clone)]
pub struct FileParamStore {
    dir: PathBuf,
}

impl FileParamStore {
    /// Open `dir`, creating it if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| ParamsError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> Result<PathBuf, ParamsError> {
        check_key(key)?;
        Ok(self.dir.join(key))
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> ParamsError + '_ {
    move |source| ParamsError::Io {
        key: key.to_string(),
        source,
    }
}

impl ParamStore for FileParamStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParamsError> {
        match std::fs::read_to_string(self.path(key)?) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), ParamsError> {
        let path = self.path(key)?;
        // readers never see a partial value
        let tmp = self.dir.join(format!(".tmp_{key}"));
        std::fs::write(&tmp, value).map_err(io_error(key))?;
        std::fs::rename(&tmp, &path).map_err(io_error(key))
    }

    fn remove(&self, key: &str) -> Result<(), ParamsError> {
        match std::fs::remove_file(self.path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key)(e)),
        }
    }
}

/// In-memory store for tests and offline runs
#[derive(Debug, Default)]
pub struct MemoryParamStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ParamStore for MemoryParamStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParamsError> {
        check_key(key)?;
        Ok(self.values().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), ParamsError> {
        check_key(key)?;
        self.values().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ParamsError> {
        check_key(key)?;
        self.values().remove(key);
        Ok(())
    }
}

/// Read a flag, treating store errors as unset
fn read_bool(store: &dyn ParamStore, key: ParamKey) -> bool {
    match store.get(key.as_str()) {
        Ok(value) => value.is_some_and(|v| v.trim() == "1"),
        Err(e) => {
            warn!(key = key.as_str(), error = %e, "Parameter read failed");
            false
        }
    }
}

/// Following distance preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Aggressive = 0,
    #[default]
    Standard = 1,
    Relaxed = 2,
}

impl Personality {
    /// Parse the stored index; anything unreadable is `Standard`
    pub fn from_param(value: Option<&str>) -> Self {
        match value.and_then(|v| v.trim().parse::<i64>().ok()) {
            Some(0) => Personality::Aggressive,
            Some(2) => Personality::Relaxed,
            _ => Personality::Standard,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Next personality when the distance button is released, wrapping
    /// from the closest back to the farthest
    pub fn cycled(self) -> Self {
        match self {
            Personality::Relaxed => Personality::Standard,
            Personality::Standard => Personality::Aggressive,
            Personality::Aggressive => Personality::Relaxed,
        }
    }
}

/// Snapshot of user parameters, replaced wholesale on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserParams {
    pub is_metric: bool,
    pub personality: Personality,
    pub experimental_mode: bool,
    pub joystick_mode: bool,
}

impl UserParams {
    /// Read every parameter once at startup
    pub fn load(store: &dyn ParamStore, car: &CarParams) -> Self {
        let mut params = Self::default().refreshed(store, car);
        params.joystick_mode = read_bool(store, ParamKey::JoystickDebugMode);
        params
    }

    /// Re-read the parameters that may change while driving.
    ///
    /// Experimental mode only applies with openpilot longitudinal control and
    /// the joystick toggle is only honoured on robotics platforms.
    pub fn refreshed(&self, store: &dyn ParamStore, car: &CarParams) -> Self {
        let personality = match store.get(ParamKey::LongitudinalPersonality.as_str()) {
            Ok(value) => Personality::from_param(value.as_deref()),
            Err(e) => {
                warn!(error = %e, "Personality read failed");
                Personality::default()
            }
        };

        Self {
            is_metric: read_bool(store, ParamKey::IsMetric),
            personality,
            experimental_mode: car.openpilot_longitudinal_control
                && read_bool(store, ParamKey::ExperimentalMode),
            joystick_mode: if car.not_car {
                read_bool(store, ParamKey::JoystickDebugMode)
            } else {
                self.joystick_mode
            },
        }
    }
}

/// Drop parameters the current car cannot honour
pub fn clean_startup_params(store: &dyn ParamStore, car: &CarParams) -> Result<(), ParamsError> {
    if !car.experimental_longitudinal_available {
        store.remove(ParamKey::ExperimentalLongitudinalEnabled.as_str())?;
    }
    if !car.openpilot_longitudinal_control {
        store.remove(ParamKey::ExperimentalMode.as_str())?;
    }
    Ok(())
}

/// A write queued by the control tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamWrite {
    pub key: String,
    pub value: String,
}

/// Non-blocking handle for queueing writes from the control tick
#[derive(Debug, Clone)]
pub struct ParamWriter {
    tx: mpsc::UnboundedSender<ParamWrite>,
}

impl ParamWriter {
    pub fn put(&self, key: &str, value: impl Into<String>) {
        self.send(ParamWrite {
            key: key.to_string(),
            value: value.into(),
        });
    }

    pub fn put_bool(&self, key: &str, value: bool) {
        self.put(key, if value { "1" } else { "0" });
    }

    fn send(&self, write: ParamWrite) {
        if self.tx.send(write).is_err() {
            debug!("Parameter refresh stopped, dropping write");
        }
    }
}

/// Handles to a running refresh task
pub struct ParamsHandle {
    pub params: watch::Receiver<UserParams>,
    pub writer: ParamWriter,
    pub task: JoinHandle<()>,
}

/// Periodic parameter reader and write flusher
pub struct ParamsRefresh {
    store: Arc<dyn ParamStore>,
    car: CarParams,
    period: Duration,
    writes: mpsc::UnboundedReceiver<ParamWrite>,
    tx: watch::Sender<UserParams>,
}

impl ParamsRefresh {
    /// Load the initial snapshot and start refreshing every `period` until
    /// `shutdown` flips or its sender is dropped
    pub fn spawn(
        store: Arc<dyn ParamStore>,
        car: CarParams,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> ParamsHandle {
        let initial = UserParams::load(store.as_ref(), &car);
        info!(?initial, "User parameters loaded");

        let (tx, params) = watch::channel(initial);
        let (writes_tx, writes) = mpsc::unbounded_channel();
        let refresh = Self {
            store,
            car,
            period,
            writes,
            tx,
        };

        ParamsHandle {
            params,
            writer: ParamWriter { tx: writes_tx },
            task: tokio::spawn(refresh.run(shutdown)),
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => self.refresh(),
            }
        }

        self.flush();
        debug!("Parameter refresh stopped");
    }

    fn refresh(&mut self) {
        self.flush();

        let current = *self.tx.borrow();
        let next = current.refreshed(self.store.as_ref(), &self.car);
        self.tx.send_if_modified(|params| {
            if *params == next {
                return false;
            }
            debug!(from = ?params, to = ?next, "User parameters changed");
            *params = next;
            true
        });
    }

    fn flush(&mut self) {
        while let Ok(write) = self.writes.try_recv() {
            if let Err(e) = self.store.put(&write.key, &write.value) {
                warn!(key = %write.key, error = %e, "Parameter write failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("supervisor-params-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = temp_dir("roundtrip");
        let store = FileParamStore::open(&dir).unwrap();

        assert_eq!(store.get("IsMetric").unwrap(), None);
        store.put("IsMetric", "1").unwrap();
        assert_eq!(store.get("IsMetric").unwrap().as_deref(), Some("1"));
        store.remove("IsMetric").unwrap();
        store.remove("IsMetric").unwrap();
        assert_eq!(store.get("IsMetric").unwrap(), None);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_keys_cannot_escape_directory() {
        let store = MemoryParamStore::new();
        for key in ["", "../IsMetric", "a/b", "a b"] {
            assert!(matches!(store.get(key), Err(ParamsError::InvalidKey(_))));
        }
    }

    #[test]
    fn test_personality_parsing() {
        assert_eq!(Personality::from_param(Some("0")), Personality::Aggressive);
        assert_eq!(Personality::from_param(Some("2\n")), Personality::Relaxed);
        assert_eq!(Personality::from_param(Some("abc")), Personality::Standard);
        assert_eq!(Personality::from_param(Some("7")), Personality::Standard);
        assert_eq!(Personality::from_param(None), Personality::Standard);
    }

    #[test]
    fn test_personality_cycles_downward() {
        let mut personality = Personality::Standard;
        let mut seen = Vec::new();
        for _ in 0..3 {
            personality = personality.cycled();
            seen.push(personality.index());
        }
        assert_eq!(seen, vec![0, 2, 1]);
    }

    #[test]
    fn test_experimental_mode_needs_openpilot_longitudinal() {
        let store = MemoryParamStore::new();
        store.put("ExperimentalMode", "1").unwrap();

        let stock = CarParams::default();
        assert!(!UserParams::load(&store, &stock).experimental_mode);

        let op_long = CarParams {
            openpilot_longitudinal_control: true,
            ..Default::default()
        };
        assert!(UserParams::load(&store, &op_long).experimental_mode);
    }

    #[test]
    fn test_joystick_refreshed_only_on_not_car() {
        let store = MemoryParamStore::new();
        store.put("JoystickDebugMode", "1").unwrap();

        let car = CarParams::default();
        let params = UserParams::load(&store, &car);
        assert!(params.joystick_mode);

        store.put("JoystickDebugMode", "0").unwrap();
        assert!(params.refreshed(&store, &car).joystick_mode);

        let robot = CarParams {
            not_car: true,
            ..Default::default()
        };
        assert!(!params.refreshed(&store, &robot).joystick_mode);
    }

    #[test]
    fn test_startup_cleanup() {
        let store = MemoryParamStore::new();
        store.put("ExperimentalMode", "1").unwrap();
        store.put("ExperimentalLongitudinalEnabled", "1").unwrap();

        let car = CarParams {
            experimental_longitudinal_available: false,
            ..Default::default()
        };
        clean_startup_params(&store, &car).unwrap();
        assert_eq!(store.get("ExperimentalMode").unwrap(), None);
        assert_eq!(store.get("ExperimentalLongitudinalEnabled").unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_publishes_changes() {
        let store = Arc::new(MemoryParamStore::new());
        let (shutdown_tx, shutdown) = watch::channel(false);
        let mut handle = ParamsRefresh::spawn(
            store.clone(),
            CarParams::default(),
            Duration::from_millis(100),
            shutdown,
        );
        assert!(!handle.params.borrow().is_metric);

        store.put("IsMetric", "1").unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle.params.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(handle.params.borrow().is_metric);

        shutdown_tx.send(true).unwrap();
        handle.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_writes_flushed_on_shutdown() {
        let store = Arc::new(MemoryParamStore::new());
        let (shutdown_tx, shutdown) = watch::channel(false);
        let handle = ParamsRefresh::spawn(
            store.clone(),
            CarParams::default(),
            Duration::from_secs(60),
            shutdown,
        );
        // let the first immediate tick pass
        tokio::time::sleep(Duration::from_millis(1)).await;

        handle.writer.put_bool(ParamKey::ControlsReady.as_str(), true);
        handle.writer.put("LongitudinalPersonality", "2");
        shutdown_tx.send(true).unwrap();
        handle.task.await.unwrap();

        assert_eq!(store.get("ControlsReady").unwrap().as_deref(), Some("1"));
        assert_eq!(
            store.get("LongitudinalPersonality").unwrap().as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_writer_after_stop_is_silent() {
        let store = Arc::new(MemoryParamStore::new());
        let (shutdown_tx, shutdown) = watch::channel(false);
        let handle = ParamsRefresh::spawn(
            store,
            CarParams::default(),
            Duration::from_millis(10),
            shutdown,
        );
        drop(shutdown_tx);
        handle.task.await.unwrap();
        handle.writer.put_bool("ControlsReady", true);
    }

    fn personality() -> impl Strategy<Value = Personality> {
        prop_oneof![
            Just(Personality::Aggressive),
            Just(Personality::Standard),
            Just(Personality::Relaxed),
        ]
    }

    proptest! {
        #[test]
        fn prop_personality_cycle_wraps(p in personality()) {
            prop_assert_ne!(p.cycled(), p);
            prop_assert_eq!(p.cycled().cycled().cycled(), p);
        }

        #[test]
        fn prop_stored_personality_reads_back(p in personality(), pad in "[ \t\n]{0,2}") {
            let stored = format!("{pad}{}{pad}", p.index());
            prop_assert_eq!(Personality::from_param(Some(&stored)), p);
        }

        #[test]
        fn prop_unknown_index_is_standard(index in any::<i64>()) {
            prop_assume!(!(0..=2).contains(&index));
            prop_assert_eq!(
                Personality::from_param(Some(&index.to_string())),
                Personality::Standard
            );
        }
    }
}
