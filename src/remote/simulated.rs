//! In-process stand-in for the question endpoint with a configurable failure rate.

use std::time::Duration;

use rand::Rng;

use crate::remote::client::RemoteError;

#[derive(Debug, Clone)]
pub struct SimulatedDependency {
    failure_rate: f64,
    latency: Duration,
}

impl SimulatedDependency {
    /// `failure_rate` is clamped to `[0, 1]`.
    pub fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
            latency,
        }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }

    fn roll(&self) -> Result<String, RemoteError> {
        if rand::thread_rng().gen_bool(self.failure_rate) {
            Err(RemoteError::Simulated("Connection refused".into()))
        } else {
            Ok("answer".into())
        }
    }

    pub fn ask_blocking(&self) -> Result<String, RemoteError> {
        std::thread::sleep(self.latency);
        self.roll()
    }

    pub async fn ask(&self) -> Result<String, RemoteError> {
        tokio::time::sleep(self.latency).await;
        self.roll()
    }
}
