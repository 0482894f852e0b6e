use std::cell::RefCell;
use std::collections::HashMap;

use videocast::media::audio::{self, Samples};
use videocast::media::video::{Clip, Frame, VideoCodec};
use videocast::media::y4m::Y4mCodec;
use videocast::media::{Container, VideoSettings};
use videocast::output::files::OutputWriter;
use videocast::pipeline::{Cast, Coordinator, PipelineError};
use videocast::script::{self, Script};
use videocast::services::{JobStatus, Portrait, ServiceError, SpeechService, VideoService, Voice};
use videocast::synth::{PollConfig, SegmentSynthesizer, SynthesisError};

const SCRIPT: &str = "Alice: apple pie\nBob: banana split\nAlice: cherry tart";
const FPS: u32 = 10;
const FRAMES_PER_CLIP: usize = 5;

/// Speech fake: one 16-bit sample per byte of text.
struct TextSpeech {
    calls: RefCell<Vec<String>>,
}

impl TextSpeech {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl SpeechService for TextSpeech {
    fn name(&self) -> &str {
        "text-speech"
    }

    fn list_voices(&self) -> Result<Vec<Voice>, ServiceError> {
        Ok(vec![])
    }

    fn synthesize(&self, text: &str, _voice_id: &str, _language: &str) -> Result<Vec<u8>, ServiceError> {
        self.calls.borrow_mut().push(text.to_string());
        let pcm: Vec<u8> = text.bytes().flat_map(|b| (b as i16).to_le_bytes()).collect();
        Ok(audio::pcm16_to_wav(&pcm, 8000, 1).expect("wav"))
    }
}

struct Job {
    luma: u8,
    polls_left: u32,
    fail: bool,
}

/// Video fake: each job renders a Y4M clip whose luma is the first audio sample.
struct ClipVideo {
    audio: RefCell<HashMap<String, Vec<u8>>>,
    jobs: RefCell<Vec<Job>>,
    fail_for_image: Option<&'static str>,
    polls_before_done: u32,
}

impl ClipVideo {
    fn new() -> Self {
        Self {
            audio: RefCell::new(HashMap::new()),
            jobs: RefCell::new(Vec::new()),
            fail_for_image: None,
            polls_before_done: 2,
        }
    }
}

impl VideoService for ClipVideo {
    fn name(&self) -> &str {
        "clip-video"
    }

    fn upload_image(&self, portrait: &Portrait) -> Result<String, ServiceError> {
        Ok(format!("img://{}", portrait.file_name))
    }

    fn upload_audio(&self, audio: &[u8]) -> Result<String, ServiceError> {
        let mut store = self.audio.borrow_mut();
        let url = format!("aud://{}", store.len());
        store.insert(url.clone(), audio.to_vec());
        Ok(url)
    }

    fn submit_job(&self, image_url: &str, audio_url: &str) -> Result<String, ServiceError> {
        let store = self.audio.borrow();
        let wav = store
            .get(audio_url)
            .ok_or_else(|| ServiceError::InvalidResponse {
                service: "clip-video",
                detail: format!("unknown audio {audio_url}"),
            })?;
        let decoded = audio::decode(wav).expect("fake audio decodes");
        let luma = match decoded.samples {
            Samples::Int(s) => s[0] as u8,
            Samples::Float(_) => 0,
        };

        let mut jobs = self.jobs.borrow_mut();
        jobs.push(Job {
            luma,
            polls_left: self.polls_before_done,
            fail: self.fail_for_image.is_some_and(|name| image_url.contains(name)),
        });
        Ok(format!("job-{}", jobs.len() - 1))
    }

    fn get_status(&self, job_id: &str) -> Result<JobStatus, ServiceError> {
        let n: usize = job_id.trim_start_matches("job-").parse().expect("job id");
        let mut jobs = self.jobs.borrow_mut();
        let job = &mut jobs[n];
        if job.polls_left > 0 {
            job.polls_left -= 1;
            return Ok(JobStatus::pending());
        }
        if job.fail {
            return Ok(JobStatus::failed(Some("face not found".into())));
        }
        Ok(JobStatus::completed(format!("mem://{job_id}")))
    }

    fn fetch_result(&self, video_url: &str) -> Result<Vec<u8>, ServiceError> {
        let n: usize = video_url.trim_start_matches("mem://job-").parse().expect("url");
        let luma = self.jobs.borrow()[n].luma;
        let clip = Clip {
            width: 2,
            height: 2,
            fps_num: FPS,
            fps_den: 1,
            frames: vec![Frame::filled(2, 2, luma, 128, 128); FRAMES_PER_CLIP],
        };
        Ok(Y4mCodec.encode(&clip).expect("y4m"))
    }
}

fn fast_polling() -> PollConfig {
    PollConfig {
        base_interval_ms: 0,
        multiplier: 1.0,
        max_interval_ms: 0,
        max_attempts: 5,
    }
}

fn y4m_settings() -> VideoSettings {
    VideoSettings::y4m(FPS)
}

fn full_cast() -> Cast {
    let mut cast = Cast::new();
    cast.set_voice("Alice", "voice-alice");
    cast.set_voice("Bob", "voice-bob");
    cast.set_portrait("Alice", Portrait::new(vec![1], "alice.png"));
    cast.set_portrait("Bob", Portrait::new(vec![2], "bob.png"));
    cast
}

fn parsed() -> Script {
    script::parse(SCRIPT).unwrap()
}

fn luma_per_frame(video: &[u8]) -> Vec<u8> {
    Y4mCodec
        .decode(video)
        .unwrap()
        .frames
        .iter()
        .map(|f| f.y[0])
        .collect()
}

fn samples(wav: &[u8]) -> Vec<i32> {
    match audio::decode(wav).unwrap().samples {
        Samples::Int(s) => s,
        Samples::Float(_) => panic!("expected integer samples"),
    }
}

#[test]
fn run_assembles_in_script_order_despite_roster_order() {
    let speech = TextSpeech::new();
    let video = ClipVideo::new();
    let script = parsed();
    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());

    let combined = coordinator.run(&script, &full_cast()).unwrap();

    // Generated per character: Alice's two lines first, then Bob's.
    assert_eq!(
        *speech.calls.borrow(),
        vec!["apple pie", "cherry tart", "banana split"]
    );

    assert_eq!(combined.segment_count, 3);
    let expected: Vec<i32> = "apple piebanana splitcherry tart".bytes().map(i32::from).collect();
    assert_eq!(samples(&combined.audio), expected);

    let luma = luma_per_frame(&combined.video);
    assert_eq!(luma.len(), 3 * FRAMES_PER_CLIP);
    assert!(luma[..5].iter().all(|&l| l == b'a'));
    assert!(luma[5..10].iter().all(|&l| l == b'b'));
    assert!(luma[10..].iter().all(|&l| l == b'c'));
}

#[test]
fn character_without_portrait_leaves_exactly_its_segment_missing() {
    let speech = TextSpeech::new();
    let video = ClipVideo::new();
    let script = parsed();
    let mut cast = Cast::new();
    cast.set_voice("Alice", "voice-alice");
    cast.set_voice("Bob", "voice-bob");
    cast.set_portrait("Alice", Portrait::new(vec![1], "alice.png"));

    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());

    let err = coordinator.run(&script, &cast).unwrap_err();
    match err {
        PipelineError::Incomplete { missing } => {
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].index, 1);
            assert_eq!(missing[0].character, "Bob");
            assert_eq!(missing[0].text, "banana split");
        }
        other => panic!("expected Incomplete, got {other}"),
    }

    // Finished lines stay available on their own.
    assert_eq!(coordinator.results().len(), 2);
    assert!(coordinator.results().is_current(&script.segments[0]));
    assert!(coordinator.results().is_current(&script.segments[2]));
}

#[test]
fn portrait_without_voice_fails_before_synthesizing_that_character() {
    let speech = TextSpeech::new();
    let video = ClipVideo::new();
    let script = parsed();
    let mut cast = Cast::new();
    cast.set_voice("Alice", "voice-alice");
    cast.set_portrait("Alice", Portrait::new(vec![1], "alice.png"));
    cast.set_portrait("Bob", Portrait::new(vec![2], "bob.png"));

    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());

    let err = coordinator.run(&script, &cast).unwrap_err();
    assert!(matches!(err, PipelineError::MissingVoice { ref character } if character == "Bob"));
    assert!(!speech.calls.borrow().contains(&"banana split".to_string()));
}

#[test]
fn failed_video_job_aborts_run_and_keeps_earlier_results() {
    let speech = TextSpeech::new();
    let mut video = ClipVideo::new();
    video.fail_for_image = Some("bob");
    let script = parsed();

    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());

    let err = coordinator.run(&script, &full_cast()).unwrap_err();
    match &err {
        PipelineError::Synthesis {
            index,
            character,
            source: SynthesisError::VideoGeneration { job_id, reason },
        } => {
            assert_eq!(*index, 1);
            assert_eq!(character, "Bob");
            assert_eq!(job_id, "job-2");
            assert_eq!(reason, "face not found");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("segment #2"));
    assert_eq!(coordinator.results().len(), 2);

    // Per-segment files can still be exported.
    let dir = tempfile::tempdir().unwrap();
    let writer = OutputWriter::create(dir.path(), "T".into(), Container::Y4m).unwrap();
    let mut written = Vec::new();
    for seg in &script.segments {
        if let Some(media) = coordinator.results().get(seg) {
            written.extend(writer.write_segment(media).unwrap());
        }
    }
    assert_eq!(written.len(), 4);
    assert!(dir.path().join("segment_1_Alice_T_audio.wav").exists());
    assert!(dir.path().join("segment_3_Alice_T_video.y4m").exists());
    assert!(!dir.path().join("segment_2_Bob_T_audio.wav").exists());
}

#[test]
fn timeout_reports_job_id() {
    let speech = TextSpeech::new();
    let mut video = ClipVideo::new();
    video.polls_before_done = 100;
    let script = parsed();

    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());

    let err = coordinator.run(&script, &full_cast()).unwrap_err();
    match err {
        PipelineError::Synthesis {
            index: 0,
            source: SynthesisError::VideoTimeout { job_id, attempts },
            ..
        } => {
            assert_eq!(job_id, "job-0");
            assert_eq!(attempts, 5);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn edited_segment_is_not_reused_until_regenerated() {
    let speech = TextSpeech::new();
    let video = ClipVideo::new();
    let mut script = parsed();
    let cast = full_cast();

    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());
    coordinator.run(&script, &cast).unwrap();

    script.edit_text(1, "date loaf").unwrap();
    let err = coordinator.assemble(&script).unwrap_err();
    assert!(matches!(err, PipelineError::Incomplete { ref missing } if missing.len() == 1 && missing[0].index == 1));

    // Reverting the text does not revive the old result either.
    script.edit_text(1, "banana split").unwrap();
    assert!(coordinator.assemble(&script).is_err());

    let media = coordinator.generate_segment(&script, 1, &cast).unwrap();
    assert_eq!(media.text, "banana split");
    let combined = coordinator.assemble(&script).unwrap();
    let luma = luma_per_frame(&combined.video);
    assert_eq!(luma[5], b'b');
}

#[test]
fn single_segment_generation_needs_its_assignments() {
    let speech = TextSpeech::new();
    let video = ClipVideo::new();
    let script = parsed();
    let mut cast = Cast::new();
    cast.set_voice("Bob", "voice-bob");

    let synth = SegmentSynthesizer::new(&speech, &video, fast_polling()).with_sleeper(|_| {});
    let mut coordinator = Coordinator::new(synth, y4m_settings());

    assert!(matches!(
        coordinator.generate_segment(&script, 1, &cast),
        Err(PipelineError::MissingPortrait { .. })
    ));
    assert!(matches!(
        coordinator.generate_segment(&script, 7, &cast),
        Err(PipelineError::UnknownSegment(7))
    ));
    assert!(speech.calls.borrow().is_empty());
}
