use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use prometheus::IntCounterVec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::ranking::{RankingInputs, MAX_WORK_RATE};

const WORK_WEIGHT: f64 = 0.40;
const FEEDBACK_WEIGHT: f64 = 0.30;
const CANCELLATION_WEIGHT: f64 = -0.30;

pub const MIN_SCORE: f64 = -1.0;
pub const MAX_SCORE: f64 = 1.0;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring procedure unavailable: {0}")]
    Unavailable(String),

    #[error("scoring procedure timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring procedure returned malformed output: {0}")]
    Protocol(String),
}

/// A way of turning a driver's rates into a composite score.
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, input: RankingInputs) -> BoxFuture<'_, Result<f64, ScoringError>>;

    /// Scores a whole pool at once. The output is index-aligned with `inputs`.
    fn score_batch(
        &self,
        inputs: Vec<RankingInputs>,
    ) -> BoxFuture<'_, Result<Vec<f64>, ScoringError>>;
}

/// Weighted linear blend of the driver's rates, averaged with the previous
/// score when there is one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearBlend;

impl LinearBlend {
    pub fn blend(input: &RankingInputs) -> f64 {
        let normalized_work = input.work_rate.min(MAX_WORK_RATE as f64) / MAX_WORK_RATE as f64;

        let raw = (normalized_work * WORK_WEIGHT)
            + (input.feedback_rate * FEEDBACK_WEIGHT)
            + (input.cancellation_rate * CANCELLATION_WEIGHT);

        let blended = if input.average_rate != 0.0 {
            (raw + input.average_rate) / 2.0
        } else {
            raw
        };

        blended.clamp(MIN_SCORE, MAX_SCORE)
    }

    /// Blends every driver, then spreads the pool linearly over
    /// `[MIN_SCORE, MAX_SCORE]` by rank. Equal scores keep input order.
    pub fn normalize(inputs: &[RankingInputs]) -> Vec<f64> {
        let blended: Vec<f64> = inputs.iter().map(Self::blend).collect();
        let total = blended.len();
        if total <= 1 {
            return blended;
        }

        let mut order: Vec<usize> = (0..total).collect();
        order.sort_by(|a, b| blended[*b].total_cmp(&blended[*a]));

        let step = (MAX_SCORE - MIN_SCORE) / (total - 1) as f64;
        let mut normalized = vec![0.0; total];
        for (rank, index) in order.into_iter().enumerate() {
            normalized[index] = MAX_SCORE - step * rank as f64;
        }
        normalized
    }
}

impl ScoringStrategy for LinearBlend {
    fn name(&self) -> &'static str {
        "linear-blend"
    }

    fn score(&self, input: RankingInputs) -> BoxFuture<'_, Result<f64, ScoringError>> {
        Box::pin(async move { Ok(Self::blend(&input)) })
    }

    fn score_batch(
        &self,
        inputs: Vec<RankingInputs>,
    ) -> BoxFuture<'_, Result<Vec<f64>, ScoringError>> {
        Box::pin(async move { Ok(Self::normalize(&inputs)) })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEntry {
    #[serde(flatten)]
    inputs: RankingInputs,
    is_biannual: bool,
}

#[derive(Deserialize)]
struct SingleResponse {
    score: f64,
}

#[derive(Deserialize)]
struct BatchResponse {
    scores: Vec<f64>,
}

/// Runs an external program per request: JSON on stdin, JSON on stdout.
#[derive(Debug, Clone)]
pub struct ExternalProcess {
    program: String,
    args: Vec<String>,
}

impl ExternalProcess {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a command line on whitespace into program and arguments.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    async fn exchange<Req, Resp>(&self, request: &Req) -> Result<Resp, ScoringError>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let body = serde_json::to_vec(request)
            .map_err(|err| ScoringError::Protocol(format!("encode request: {err}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ScoringError::Unavailable(format!("spawn {}: {err}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&body).await {
                Ok(()) => {}
                // The program may answer without reading its input.
                Err(err) if err.kind() == ErrorKind::BrokenPipe => {
                    debug!(program = %self.program, "scoring procedure closed stdin early");
                }
                Err(err) => return Err(ScoringError::Unavailable(format!("write stdin: {err}"))),
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ScoringError::Unavailable(format!("wait: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScoringError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|err| ScoringError::Protocol(format!("decode response: {err}")))
    }
}

impl ScoringStrategy for ExternalProcess {
    fn name(&self) -> &'static str {
        "external-process"
    }

    fn score(&self, input: RankingInputs) -> BoxFuture<'_, Result<f64, ScoringError>> {
        Box::pin(async move {
            let response: SingleResponse = self.exchange(&input).await?;
            Ok(response.score)
        })
    }

    fn score_batch(
        &self,
        inputs: Vec<RankingInputs>,
    ) -> BoxFuture<'_, Result<Vec<f64>, ScoringError>> {
        Box::pin(async move {
            let entries: Vec<BatchEntry> = inputs
                .into_iter()
                .map(|inputs| BatchEntry {
                    inputs,
                    is_biannual: true,
                })
                .collect();
            let response: BatchResponse = self.exchange(&entries).await?;
            Ok(response.scores)
        })
    }
}

/// Front door for ranking computations: tries the primary strategy within a
/// bounded wait and falls back to [`LinearBlend`] on any failure. Results are
/// always clamped to `[MIN_SCORE, MAX_SCORE]`.
#[derive(Clone)]
pub struct Scorer {
    primary: Option<Arc<dyn ScoringStrategy>>,
    timeout: Duration,
    fallbacks_total: IntCounterVec,
}

impl Scorer {
    pub fn new(
        primary: Option<Arc<dyn ScoringStrategy>>,
        timeout: Duration,
        fallbacks_total: IntCounterVec,
    ) -> Self {
        Self {
            primary,
            timeout,
            fallbacks_total,
        }
    }

    pub fn from_config(config: &Config, fallbacks_total: IntCounterVec) -> Self {
        let primary = config
            .scoring_command
            .as_deref()
            .and_then(ExternalProcess::from_command_line)
            .map(|process| Arc::new(process) as Arc<dyn ScoringStrategy>);

        Self::new(primary, config.scoring_timeout(), fallbacks_total)
    }

    pub async fn score(&self, input: RankingInputs) -> f64 {
        let score = match self.try_primary(input).await {
            Some(Ok(score)) => score,
            Some(Err(err)) => {
                warn!(error = %err, "primary scoring failed; using fallback formula");
                self.fallbacks_total.with_label_values(&["single"]).inc();
                LinearBlend::blend(&input)
            }
            None => LinearBlend::blend(&input),
        };

        score.clamp(MIN_SCORE, MAX_SCORE)
    }

    /// Batch scores keep their order: a primary answering on its own scale
    /// is rescaled onto `[MIN_SCORE, MAX_SCORE]` rather than clipped.
    pub async fn score_batch(&self, inputs: Vec<RankingInputs>) -> Vec<f64> {
        let scores = match self.try_primary_batch(&inputs).await {
            Some(Ok(scores)) => fit_to_bounds(scores),
            Some(Err(err)) => {
                warn!(error = %err, drivers = inputs.len(), "primary batch scoring failed; using fallback normalization");
                self.fallbacks_total.with_label_values(&["batch"]).inc();
                LinearBlend::normalize(&inputs)
            }
            None => LinearBlend::normalize(&inputs),
        };

        scores
            .into_iter()
            .map(|score| score.clamp(MIN_SCORE, MAX_SCORE))
            .collect()
    }

    async fn try_primary(&self, input: RankingInputs) -> Option<Result<f64, ScoringError>> {
        let primary = self.primary.as_ref()?;

        let result = match timeout(self.timeout, primary.score(input)).await {
            Ok(Ok(score)) if score.is_finite() => Ok(score),
            Ok(Ok(score)) => Err(ScoringError::Protocol(format!("non-finite score {score}"))),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ScoringError::Timeout(self.timeout)),
        };

        if result.is_ok() {
            debug!(strategy = primary.name(), "scored with primary strategy");
        }
        Some(result)
    }

    async fn try_primary_batch(
        &self,
        inputs: &[RankingInputs],
    ) -> Option<Result<Vec<f64>, ScoringError>> {
        let primary = self.primary.as_ref()?;

        let result = match timeout(self.timeout, primary.score_batch(inputs.to_vec())).await {
            Ok(Ok(scores)) if scores.len() != inputs.len() => Err(ScoringError::Protocol(format!(
                "expected {} scores, got {}",
                inputs.len(),
                scores.len()
            ))),
            Ok(Ok(scores)) if scores.iter().any(|score| !score.is_finite()) => Err(
                ScoringError::Protocol("batch contains a non-finite score".to_string()),
            ),
            Ok(Ok(scores)) => Ok(scores),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ScoringError::Timeout(self.timeout)),
        };

        Some(result)
    }
}

/// Min-max maps `scores` onto `[MIN_SCORE, MAX_SCORE]` when any falls
/// outside it. Order is preserved; a batch already in bounds is untouched.
fn fit_to_bounds(scores: Vec<f64>) -> Vec<f64> {
    let (low, high) = scores
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), score| {
            (low.min(*score), high.max(*score))
        });

    if scores.is_empty() || (low >= MIN_SCORE && high <= MAX_SCORE) || high == low {
        return scores;
    }

    let span = high - low;
    scores
        .into_iter()
        .map(|score| MIN_SCORE + (score - low) / span * (MAX_SCORE - MIN_SCORE))
        .collect()
}
