//! Simulated model downloads
//!
//! A pull walks `pulling manifest`, one `pulling layers` series per layer,
//! `verifying sha256 digest`, `writing manifest` and `success`. Layer progress
//! follows a bandwidth curve: a cosine wave around the base speed plus uniform
//! noise, sampled once per tick. Once started, a pull always succeeds.

use chrono::Utc;
use honeypot_core::{HoneypotError, HoneypotResult, Layer, ModelName, ModelRecord, PullConfig};
use honeypot_network::ManifestFetcher;
use honeypot_store::ModelRegistry;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::stream::{Disconnected, FrameStream};

pub const STATUS_PULLING_MANIFEST: &str = "pulling manifest";
pub const STATUS_PULLING_LAYERS: &str = "pulling layers";
pub const STATUS_VERIFYING: &str = "verifying sha256 digest";
pub const STATUS_WRITING_MANIFEST: &str = "writing manifest";
pub const STATUS_SUCCESS: &str = "success";

/// One `/api/pull` progress frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullProgress {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<u64>,
}

impl PullProgress {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            digest: None,
            total: None,
            completed: None,
        }
    }

    fn layer(layer: &Layer, completed: u64) -> Self {
        Self {
            status: STATUS_PULLING_LAYERS.to_string(),
            digest: Some(layer.digest.clone()),
            total: Some(layer.size),
            completed: Some(completed),
        }
    }

    /// Whether this frame reports layer progress
    pub fn is_layer(&self) -> bool {
        self.digest.is_some()
    }
}

/// Time-varying, noisy download speed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandwidthCurve {
    /// Bytes per second
    pub base_speed: f64,
    /// Noise as a fraction of the base speed
    pub variance: f64,
    /// Wave period in seconds; non-positive disables the wave
    pub period: f64,
    /// Wave amplitude as a fraction of the base speed
    pub amplitude: f64,
}

impl BandwidthCurve {
    pub fn from_config(config: &PullConfig) -> Self {
        Self {
            base_speed: config.speed as f64,
            variance: config.variance,
            period: config.wave_period,
            amplitude: config.wave_amplitude,
        }
    }

    /// Instantaneous speed in bytes per second, never negative
    pub fn speed_at<R: Rng + ?Sized>(&self, elapsed: Duration, rng: &mut R) -> f64 {
        let wave = if self.period > 0.0 {
            self.amplitude * self.base_speed * (2.0 * PI * elapsed.as_secs_f64() / self.period).cos()
        } else {
            0.0
        };

        let spread = self.variance.abs();
        let noise = if spread > 0.0 {
            rng.gen_range(-spread..=spread) * self.base_speed
        } else {
            0.0
        };

        (self.base_speed + wave + noise).max(0.0)
    }

    /// Bytes fetched during one tick: at least one, at most `remaining`
    pub fn increment<R: Rng + ?Sized>(
        &self,
        elapsed: Duration,
        tick: Duration,
        remaining: u64,
        rng: &mut R,
    ) -> u64 {
        let bytes = (self.speed_at(elapsed, rng) * tick.as_secs_f64()).round();
        // Float to int casts saturate
        let bytes = (bytes as u64).max(1);
        bytes.min(remaining)
    }
}

/// Per-request download state; never shared or persisted
struct PullSession {
    layers: Vec<Layer>,
    completed: Vec<u64>,
    started: Instant,
}

impl PullSession {
    fn new(layers: Vec<Layer>) -> Self {
        let completed = vec![0; layers.len()];
        Self {
            layers,
            completed,
            started: Instant::now(),
        }
    }

    /// Advance layer `index` by one tick and return its new byte count
    fn advance<R: Rng + ?Sized>(
        &mut self,
        index: usize,
        curve: &BandwidthCurve,
        tick: Duration,
        rng: &mut R,
    ) -> u64 {
        let total = self.layers[index].size;
        let remaining = total.saturating_sub(self.completed[index]);
        let step = curve.increment(self.started.elapsed(), tick, remaining, rng);
        self.completed[index] += step;
        self.completed[index]
    }
}

/// Produces pull progress streams and installs the pulled models
pub struct PullSimulator {
    registry: Arc<ModelRegistry>,
    fetcher: Arc<dyn ManifestFetcher>,
    config: PullConfig,
}

impl PullSimulator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        fetcher: Arc<dyn ManifestFetcher>,
        config: PullConfig,
    ) -> Self {
        Self {
            registry,
            fetcher,
            config,
        }
    }

    /// Start a pull of `name`.
    ///
    /// Installed models replay a fast cached sequence. Unknown models need an
    /// upstream manifest; if it cannot be fetched no stream is started.
    pub async fn pull(&self, name: &ModelName, rng: StdRng) -> HoneypotResult<FrameStream<PullProgress>> {
        let key = name.full();

        if let Some(existing) = self.registry.get(&key).await {
            debug!(model = %key, "Model already installed, replaying cached pull");
            return Ok(self.replay(existing.layers));
        }

        let layers = self.fetcher.fetch(name).await.map_err(|e| match e {
            HoneypotError::Upstream(_) => e,
            other => HoneypotError::Upstream(other.to_string()),
        })?;

        info!(
            model = %key,
            layers = layers.len(),
            bytes = layers.iter().map(|l| l.size).sum::<u64>(),
            "Starting simulated pull"
        );
        Ok(self.simulate(name.clone(), layers, rng))
    }

    /// Stream simulated progress for `layers`, then install the model
    pub fn simulate(&self, name: ModelName, layers: Vec<Layer>, mut rng: StdRng) -> FrameStream<PullProgress> {
        let registry = self.registry.clone();
        let curve = BandwidthCurve::from_config(&self.config);
        let tick = self.config.tick_interval();
        let manifest_delay = self.config.manifest_delay();

        FrameStream::spawn(move |sink| async move {
            let result: Result<(), Disconnected> = async {
                sink.send(PullProgress::status(STATUS_PULLING_MANIFEST)).await?;
                sink.pause(manifest_delay).await?;

                let mut session = PullSession::new(layers);
                for index in 0..session.layers.len() {
                    loop {
                        let completed = session.advance(index, &curve, tick, &mut rng);
                        let layer = &session.layers[index];
                        sink.send(PullProgress::layer(layer, completed)).await?;
                        sink.pause(tick).await?;
                        if completed >= layer.size {
                            break;
                        }
                    }
                }

                sink.send(PullProgress::status(STATUS_VERIFYING)).await?;
                sink.send(PullProgress::status(STATUS_WRITING_MANIFEST)).await?;
                commit(&registry, &name, session.layers).await;
                sink.send(PullProgress::status(STATUS_SUCCESS)).await
            }
            .await;

            if result.is_err() {
                debug!(model = %name, "Pull abandoned by client");
            }
        })
    }

    /// Fast deterministic sequence for a model that is already installed
    fn replay(&self, layers: Vec<Layer>) -> FrameStream<PullProgress> {
        let spacing = self.config.cached_layer_delay();

        FrameStream::spawn(move |sink| async move {
            let _ = async {
                sink.send(PullProgress::status(STATUS_PULLING_MANIFEST)).await?;
                for layer in &layers {
                    sink.pause(spacing).await?;
                    sink.send(PullProgress::layer(layer, layer.size)).await?;
                }
                sink.send(PullProgress::status(STATUS_VERIFYING)).await?;
                sink.send(PullProgress::status(STATUS_WRITING_MANIFEST)).await?;
                sink.send(PullProgress::status(STATUS_SUCCESS)).await
            }
            .await;
        })
    }
}

/// Install the pulled model; the digest is the first layer's digest
async fn commit(registry: &ModelRegistry, name: &ModelName, layers: Vec<Layer>) -> ModelRecord {
    let record = ModelRecord::from_layers(name, layers, Utc::now());
    registry.put(&record.name, record.clone()).await;
    registry.persist().await;
    info!(model = %record.name, size = record.size, "Pull committed");
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeFetcher {
        manifests: HashMap<String, Vec<Layer>>,
        calls: AtomicUsize,
    }

    impl FakeFetcher {
        fn new(entries: Vec<(&str, Vec<Layer>)>) -> Arc<Self> {
            Arc::new(Self {
                manifests: entries
                    .into_iter()
                    .map(|(name, layers)| (name.to_string(), layers))
                    .collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ManifestFetcher for FakeFetcher {
        async fn fetch(&self, name: &ModelName) -> HoneypotResult<Vec<Layer>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.manifests
                .get(&name.full())
                .cloned()
                .ok_or_else(|| HoneypotError::Upstream("status 404 Not Found".to_string()))
        }
    }

    fn layer(n: u8, size: u64) -> Layer {
        Layer::new(
            format!("sha256:{}", format!("{:02x}", n).repeat(32)),
            size,
            "application/vnd.ollama.image.model",
        )
    }

    fn steady_config(speed: u64, tick_ms: u64) -> PullConfig {
        PullConfig {
            speed,
            variance: 0.0,
            wave_amplitude: 0.0,
            tick_interval_ms: tick_ms,
            ..PullConfig::default()
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(2024)
    }

    fn statuses(frames: &[PullProgress]) -> Vec<&str> {
        frames.iter().map(|f| f.status.as_str()).collect()
    }

    #[test]
    fn test_curve_wave_extremes() {
        let curve = BandwidthCurve {
            base_speed: 1000.0,
            variance: 0.0,
            period: 4.0,
            amplitude: 0.5,
        };
        let mut rng = rng();
        assert!((curve.speed_at(Duration::ZERO, &mut rng) - 1500.0).abs() < 1e-6);
        assert!((curve.speed_at(Duration::from_secs(2), &mut rng) - 500.0).abs() < 1e-6);
    }

    #[test]
    fn test_curve_floors_at_zero() {
        let curve = BandwidthCurve {
            base_speed: 1000.0,
            variance: 0.0,
            period: 4.0,
            amplitude: 3.0,
        };
        let mut rng = rng();
        assert_eq!(curve.speed_at(Duration::from_secs(2), &mut rng), 0.0);
        // Zero speed still moves one byte per tick
        assert_eq!(
            curve.increment(Duration::from_secs(2), Duration::from_millis(100), 50, &mut rng),
            1
        );
    }

    #[test]
    fn test_curve_noise_bounds() {
        let curve = BandwidthCurve {
            base_speed: 1000.0,
            variance: 0.2,
            period: 0.0,
            amplitude: 0.5,
        };
        let mut rng = rng();
        for _ in 0..500 {
            let speed = curve.speed_at(Duration::from_millis(1234), &mut rng);
            assert!((800.0..=1200.0).contains(&speed));
        }
    }

    #[test]
    fn test_increment_rounds_and_caps() {
        let curve = BandwidthCurve {
            base_speed: 1007.0,
            variance: 0.0,
            period: 5.0,
            amplitude: 0.0,
        };
        let mut rng = rng();
        let tick = Duration::from_millis(100);
        assert_eq!(curve.increment(Duration::ZERO, tick, 10_000, &mut rng), 101);
        assert_eq!(curve.increment(Duration::ZERO, tick, 40, &mut rng), 40);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tick_pull() {
        let registry = Arc::new(ModelRegistry::new());
        let fetcher = FakeFetcher::new(vec![("tiny:latest", vec![layer(1, 1000)])]);
        let simulator = PullSimulator::new(registry.clone(), fetcher, steady_config(1000, 1000));

        let frames = simulator
            .pull(&ModelName::parse("tiny"), rng())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            statuses(&frames),
            vec![
                "pulling manifest",
                "pulling layers",
                "verifying sha256 digest",
                "writing manifest",
                "success"
            ]
        );
        assert_eq!(frames[1].digest.as_deref(), Some(layer(1, 1000).digest.as_str()));
        assert_eq!(frames[1].completed, Some(1000));
        assert_eq!(frames[1].total, Some(1000));

        let record = registry.get("tiny:latest").await.unwrap();
        assert_eq!(record.size, 1000);
        assert_eq!(record.digest, layer(1, 1000).digest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic_and_exact() {
        let registry = Arc::new(ModelRegistry::new());
        let layers = vec![layer(1, 3_500_000), layer(2, 487), layer(3, 1_200_001)];
        let fetcher = FakeFetcher::new(vec![("llama3:8b", layers.clone())]);
        let simulator = PullSimulator::new(registry.clone(), fetcher, PullConfig::default());

        let frames = simulator
            .pull(&ModelName::parse("llama3:8b"), rng())
            .await
            .unwrap()
            .collect()
            .await;

        for expected in &layers {
            let series: Vec<u64> = frames
                .iter()
                .filter(|f| f.digest.as_deref() == Some(expected.digest.as_str()))
                .map(|f| f.completed.unwrap())
                .collect();
            assert!(!series.is_empty());
            assert!(series.windows(2).all(|w| w[0] <= w[1]));
            assert!(series.iter().all(|c| *c <= expected.size));
            assert_eq!(*series.last().unwrap(), expected.size);
        }

        assert_eq!(frames.last().unwrap().status, "success");
        let record = registry.get("llama3:8b").await.unwrap();
        assert_eq!(record.size, 3_500_000 + 487 + 1_200_001);
        assert_eq!(record.layers, layers);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_speed_moves_one_byte_per_tick() {
        let registry = Arc::new(ModelRegistry::new());
        let fetcher = FakeFetcher::new(vec![("slow:latest", vec![layer(9, 3)])]);
        let simulator = PullSimulator::new(registry, fetcher, steady_config(0, 100));

        let frames = simulator
            .pull(&ModelName::parse("slow"), rng())
            .await
            .unwrap()
            .collect()
            .await;
        let series: Vec<u64> = frames.iter().filter_map(|f| f.completed).collect();
        assert_eq!(series, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_installed_model_replays_without_fetch() {
        let registry = Arc::new(ModelRegistry::new());
        let layers = vec![layer(4, 10), layer(5, 20)];
        registry
            .put(
                "phi3:latest",
                ModelRecord::from_layers(&ModelName::parse("phi3"), layers.clone(), Utc::now()),
            )
            .await;
        let fetcher = FakeFetcher::new(vec![]);
        let simulator = PullSimulator::new(registry, fetcher.clone(), PullConfig::default());

        let started = Instant::now();
        let frames = simulator
            .pull(&ModelName::parse("phi3"), rng())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[1].completed, Some(10));
        assert_eq!(frames[2].completed, Some(20));
        assert_eq!(frames[4].status, "success");
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_unknown_model_fails_before_stream() {
        let registry = Arc::new(ModelRegistry::new());
        let simulator = PullSimulator::new(registry.clone(), FakeFetcher::new(vec![]), PullConfig::default());

        let err = simulator
            .pull(&ModelName::parse("nope"), rng())
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_pull_is_not_committed() {
        let registry = Arc::new(ModelRegistry::new());
        let fetcher = FakeFetcher::new(vec![("big:latest", vec![layer(7, 50_000_000)])]);
        let simulator = PullSimulator::new(registry.clone(), fetcher, PullConfig::default());

        let mut stream = simulator.pull(&ModelName::parse("big"), rng()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().status, "pulling manifest");
        assert!(stream.next().await.unwrap().is_layer());
        drop(stream);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!registry.contains("big").await);
    }
}
