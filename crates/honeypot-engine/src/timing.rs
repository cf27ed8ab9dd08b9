//! Fabricated timing fields for the final generate/chat frame

use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// Prompt evaluation time reported for chat replies
pub const PROMPT_EVAL_DURATION: Duration = Duration::from_millis(200);

/// Timing block of a finished completion, all durations in nanoseconds.
///
/// `total_duration` never undercuts its parts, so `eval_duration` is always
/// the exact remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionTiming {
    pub total_duration: u64,
    pub load_duration: u64,
    pub prompt_eval_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    pub eval_count: usize,
    pub eval_duration: u64,
}

impl CompletionTiming {
    /// Timing for `/api/generate`: `total = load + eval`
    pub fn generate<R: Rng + ?Sized>(
        elapsed: Duration,
        prompt_eval_count: usize,
        eval_count: usize,
        rng: &mut R,
    ) -> Self {
        let load_duration = fake_load_duration(rng);
        let total_duration = nanos(elapsed).max(load_duration);
        Self {
            total_duration,
            load_duration,
            prompt_eval_count,
            prompt_eval_duration: None,
            eval_count,
            eval_duration: total_duration - load_duration,
        }
    }

    /// Timing for `/api/chat`: `total = load + prompt_eval + eval`
    pub fn chat<R: Rng + ?Sized>(
        elapsed: Duration,
        prompt_eval_count: usize,
        eval_count: usize,
        rng: &mut R,
    ) -> Self {
        let load_duration = fake_load_duration(rng);
        let prompt_eval_duration = nanos(PROMPT_EVAL_DURATION);
        let total_duration = nanos(elapsed).max(load_duration + prompt_eval_duration);
        Self {
            total_duration,
            load_duration,
            prompt_eval_count,
            prompt_eval_duration: Some(prompt_eval_duration),
            eval_count,
            eval_duration: total_duration - load_duration - prompt_eval_duration,
        }
    }
}

/// Uniform in [1ms, 10ms)
fn fake_load_duration<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.gen_range(1_000_000..10_000_000)
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
