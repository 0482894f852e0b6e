//! Per-segment media generation: speech, then a polled talking-head video job.

pub mod backoff;

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use backoff::PollConfig;

use crate::script::Segment;
use crate::services::{JobState, Portrait, ServiceError, SpeechService, VideoService};

/// Where a segment is in its generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStage {
    Pending,
    SpeechDone,
    VideoSubmitted,
    VideoPolling,
    Complete,
    Failed,
}

impl fmt::Display for SegmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SegmentStage::Pending => "pending",
            SegmentStage::SpeechDone => "speech done",
            SegmentStage::VideoSubmitted => "video submitted",
            SegmentStage::VideoPolling => "video polling",
            SegmentStage::Complete => "complete",
            SegmentStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Coarse failure class, for choosing what to tell the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Auth,
    Network,
    Timeout,
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("speech synthesis failed: {0}")]
    Speech(#[source] ServiceError),

    #[error("video job submission failed during {step}: {source}")]
    VideoSubmit {
        step: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error("video job submission returned no job id")]
    NoJobId,

    #[error("status check for video job {job_id} failed: {source}")]
    VideoPoll {
        job_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("video job {job_id} completed without a result URL")]
    VideoFetch { job_id: String },

    #[error("downloading video for job {job_id} failed: {source}")]
    VideoDownload {
        job_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("video generation failed for job {job_id}: {reason}")]
    VideoGeneration { job_id: String, reason: String },

    #[error("video job {job_id} timed out after {attempts} status checks; it may still be processing")]
    VideoTimeout { job_id: String, attempts: u32 },
}

impl SynthesisError {
    pub fn category(&self) -> FailureCategory {
        let service = match self {
            SynthesisError::Speech(e) => Some(e),
            SynthesisError::VideoSubmit { source, .. }
            | SynthesisError::VideoPoll { source, .. }
            | SynthesisError::VideoDownload { source, .. } => Some(source),
            SynthesisError::VideoTimeout { .. } => return FailureCategory::Timeout,
            _ => None,
        };
        match service {
            Some(e) if e.is_auth() => FailureCategory::Auth,
            Some(e) if e.is_transport() => FailureCategory::Network,
            _ => FailureCategory::Service,
        }
    }

    /// Job id of the remote video job, when one was created.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            SynthesisError::VideoPoll { job_id, .. }
            | SynthesisError::VideoFetch { job_id }
            | SynthesisError::VideoDownload { job_id, .. }
            | SynthesisError::VideoGeneration { job_id, .. }
            | SynthesisError::VideoTimeout { job_id, .. } => Some(job_id),
            _ => None,
        }
    }
}

/// Audio and video generated for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedMedia {
    pub audio: Vec<u8>,
    pub video: Vec<u8>,
    pub job_id: String,
}

pub type StageCallback<'a> = Box<dyn Fn(&Segment, SegmentStage) + 'a>;
pub type Sleeper<'a> = Box<dyn Fn(Duration) + 'a>;

/// Internal state carried between stages.
enum Step {
    Pending,
    SpeechDone { audio: Vec<u8> },
    VideoSubmitted { audio: Vec<u8>, job_id: String },
    VideoPolling { audio: Vec<u8>, job_id: String, attempt: u32 },
    Complete(SynthesizedMedia),
}

impl Step {
    fn stage(&self) -> SegmentStage {
        match self {
            Step::Pending => SegmentStage::Pending,
            Step::SpeechDone { .. } => SegmentStage::SpeechDone,
            Step::VideoSubmitted { .. } => SegmentStage::VideoSubmitted,
            Step::VideoPolling { .. } => SegmentStage::VideoPolling,
            Step::Complete(_) => SegmentStage::Complete,
        }
    }
}

/// Drives speech and video synthesis for single segments.
///
/// Nothing is cached between calls: every call runs speech and video from scratch.
pub struct SegmentSynthesizer<'a> {
    speech: &'a dyn SpeechService,
    video: &'a dyn VideoService,
    poll: PollConfig,
    sleeper: Sleeper<'a>,
    on_stage: Option<StageCallback<'a>>,
}

impl<'a> SegmentSynthesizer<'a> {
    pub fn new(speech: &'a dyn SpeechService, video: &'a dyn VideoService, poll: PollConfig) -> Self {
        Self {
            speech,
            video,
            poll,
            sleeper: Box::new(std::thread::sleep),
            on_stage: None,
        }
    }

    /// Replace the blocking sleep between status checks.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn on_stage(mut self, callback: impl Fn(&Segment, SegmentStage) + 'a) -> Self {
        self.on_stage = Some(Box::new(callback));
        self
    }

    pub fn synthesize(
        &self,
        segment: &Segment,
        voice_id: &str,
        portrait: &Portrait,
    ) -> Result<SynthesizedMedia, SynthesisError> {
        let mut step = Step::Pending;
        self.notify(segment, SegmentStage::Pending);

        loop {
            let before = step.stage();
            step = match self.advance(step, segment, voice_id, portrait) {
                Ok(next) => next,
                Err(e) => {
                    warn!(index = segment.index, "segment failed: {}", e);
                    self.notify(segment, SegmentStage::Failed);
                    return Err(e);
                }
            };
            let after = step.stage();
            if after != before {
                self.notify(segment, after);
            }
            if let Step::Complete(media) = step {
                info!(
                    index = segment.index,
                    character = %segment.character,
                    audio_bytes = media.audio.len(),
                    video_bytes = media.video.len(),
                    "segment complete"
                );
                return Ok(media);
            }
        }
    }

    fn advance(
        &self,
        step: Step,
        segment: &Segment,
        voice_id: &str,
        portrait: &Portrait,
    ) -> Result<Step, SynthesisError> {
        match step {
            Step::Pending => {
                debug!(index = segment.index, voice_id, "requesting speech");
                let audio = self
                    .speech
                    .synthesize(&segment.text, voice_id, &segment.language)
                    .map_err(SynthesisError::Speech)?;
                Ok(Step::SpeechDone { audio })
            }

            Step::SpeechDone { audio } => {
                let image_url = self
                    .video
                    .upload_image(portrait)
                    .map_err(|source| SynthesisError::VideoSubmit {
                        step: "portrait upload",
                        source,
                    })?;
                let audio_url = self
                    .video
                    .upload_audio(&audio)
                    .map_err(|source| SynthesisError::VideoSubmit {
                        step: "audio upload",
                        source,
                    })?;
                let job_id = self
                    .video
                    .submit_job(&image_url, &audio_url)
                    .map_err(|source| SynthesisError::VideoSubmit {
                        step: "job submission",
                        source,
                    })?;
                if job_id.trim().is_empty() {
                    return Err(SynthesisError::NoJobId);
                }
                info!(index = segment.index, job_id = %job_id, "video job submitted");
                Ok(Step::VideoSubmitted { audio, job_id })
            }

            Step::VideoSubmitted { audio, job_id } => Ok(Step::VideoPolling {
                audio,
                job_id,
                attempt: 0,
            }),

            Step::VideoPolling {
                audio,
                job_id,
                attempt,
            } => {
                if attempt >= self.poll.max_attempts {
                    return Err(SynthesisError::VideoTimeout {
                        job_id,
                        attempts: attempt,
                    });
                }

                let status = self
                    .video
                    .get_status(&job_id)
                    .map_err(|source| SynthesisError::VideoPoll {
                        job_id: job_id.clone(),
                        source,
                    })?;
                debug!(
                    job_id = %job_id,
                    attempt = attempt + 1,
                    max = self.poll.max_attempts,
                    state = ?status.state,
                    "polled video job"
                );

                match status.state {
                    JobState::Completed => {
                        let url = status
                            .video_url
                            .ok_or_else(|| SynthesisError::VideoFetch {
                                job_id: job_id.clone(),
                            })?;
                        let video = self.video.fetch_result(&url).map_err(|source| {
                            SynthesisError::VideoDownload {
                                job_id: job_id.clone(),
                                source,
                            }
                        })?;
                        Ok(Step::Complete(SynthesizedMedia {
                            audio,
                            video,
                            job_id,
                        }))
                    }
                    JobState::Failed => Err(SynthesisError::VideoGeneration {
                        job_id,
                        reason: status.error.unwrap_or_else(|| "Unknown error".to_string()),
                    }),
                    JobState::Pending => {
                        let next = attempt + 1;
                        if next < self.poll.max_attempts {
                            (self.sleeper)(self.poll.interval(attempt));
                        }
                        Ok(Step::VideoPolling {
                            audio,
                            job_id,
                            attempt: next,
                        })
                    }
                }
            }

            Step::Complete(media) => Ok(Step::Complete(media)),
        }
    }

    fn notify(&self, segment: &Segment, stage: SegmentStage) {
        if let Some(cb) = &self.on_stage {
            cb(segment, stage);
        }
    }
}
