mod common;

use bytes::{Bytes, BytesMut};
use pretty_assertions::assert_eq;
use std::path::Path;

use common::{
    audio_format, audio_samples, audio_samples_every, media_with_audio, video_format, video_samples, Call, FailAt,
    ScriptedBackend, ASC_48K_STEREO,
};
use vcompress::av::probe::{MetadataKey, MetadataSource};
use vcompress::av::{
    Demuxer, FileBackend, MediaType, Muxer, Releasable, Sample, SampleFlags, SampleInfo, SourceDescriptor,
};
use vcompress::compressor::{CompressRequest, CompressService, Quality, VideoCompressor};
use vcompress::format::memory::{MemoryMedia, MemoryMetadata, MuxEvent};
use vcompress::format::mp4::{Mp4Demuxer, Mp4Metadata, Mp4Muxer};
use vcompress::CompressError;

fn source() -> SourceDescriptor {
    SourceDescriptor::parse("/videos/source.mp4").unwrap()
}

fn compress(compressor: &VideoCompressor<ScriptedBackend>, quality: Quality) -> vcompress::Result<()> {
    compressor
        .compress(&source(), Path::new("/scratch/out.mp4"), &quality.settings())
        .map(|_| ())
}

#[test]
fn test_tracks_registered_before_start_and_video_before_audio() {
    let backend = ScriptedBackend::new(
        media_with_audio(3840, 2160),
        MemoryMetadata::new().with_dimensions(3840, 2160),
    );
    let compressor = VideoCompressor::new(backend);
    compress(&compressor, Quality::Medium).unwrap();

    let events = compressor.backend().recording().events();
    let start = events.iter().position(|e| *e == MuxEvent::Start).unwrap();
    let tracks_before_start = events[..start]
        .iter()
        .filter(|e| matches!(e, MuxEvent::AddTrack { .. }))
        .count();
    assert_eq!(tracks_before_start, 2);
    assert!(events[..start]
        .iter()
        .all(|e| !matches!(e, MuxEvent::Sample { .. })));

    let last_video = events
        .iter()
        .rposition(|e| matches!(e, MuxEvent::Sample { track: 0, .. }))
        .unwrap();
    let first_audio = events
        .iter()
        .position(|e| matches!(e, MuxEvent::Sample { track: 1, .. }))
        .unwrap();
    assert!(last_video < first_audio, "video is flushed before audio");
    assert_eq!(events.last(), Some(&MuxEvent::Stop));
}

#[test]
fn test_timestamps_non_decreasing() {
    let backend = ScriptedBackend::new(
        media_with_audio(1920, 1080),
        MemoryMetadata::new().with_dimensions(1920, 1080),
    );
    let compressor = VideoCompressor::new(backend);
    compress(&compressor, Quality::Low).unwrap();

    let recording = compressor.backend().recording();
    for track in 0..2 {
        let times: Vec<i64> = recording
            .samples(track)
            .iter()
            .map(|s| s.presentation_time_us)
            .collect();
        assert!(!times.is_empty());
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "track {}: {:?}", track, times);
    }
    assert_eq!(recording.samples(0).len(), 6);
}

#[test]
fn test_reordered_source_comes_out_in_presentation_order() {
    let decode_order = [0, 66_666, 33_333, 133_332, 99_999];
    let frames = decode_order
        .iter()
        .enumerate()
        .map(|(n, pts)| Sample::new(vec![0, 0, 0, 1, 0x41, n as u8], *pts).with_key_flag(n == 0))
        .collect();
    let media = MemoryMedia::new().with_track(video_format(1280, 720), frames);
    let backend = ScriptedBackend::new(media, MemoryMetadata::new().with_dimensions(1280, 720));
    let compressor = VideoCompressor::new(backend);
    compress(&compressor, Quality::Medium).unwrap();

    let written: Vec<i64> = compressor
        .backend()
        .recording()
        .samples(0)
        .iter()
        .map(|s| s.presentation_time_us)
        .collect();
    assert_eq!(written, vec![0, 33_333, 66_666, 99_999, 133_332]);
    assert!(compressor.backend().recording().samples(0)[0].is_key_frame());
}

#[test]
fn test_audio_copied_verbatim() {
    let audio = audio_samples(9);
    let backend = ScriptedBackend::new(
        media_with_audio(1280, 720),
        MemoryMetadata::new().with_dimensions(1280, 720),
    );
    let compressor = VideoCompressor::new(backend);
    compress(&compressor, Quality::High).unwrap();

    let recording = compressor.backend().recording();
    assert_eq!(recording.samples(1), audio);
    assert_eq!(recording.track_formats()[1], audio_format());
}

#[test]
fn test_4k_source_fits_720p() {
    let backend = ScriptedBackend::new(
        media_with_audio(3840, 2160),
        MemoryMetadata::new().with_dimensions(3840, 2160),
    );
    let compressor = VideoCompressor::new(backend);
    compress(&compressor, Quality::Medium).unwrap();

    let configured = compressor.backend().ledger().encoder_format().unwrap();
    assert_eq!((configured.width, configured.height), (Some(1280), Some(720)));
    assert_eq!(configured.bit_rate, Some(2_500_000));
    let video = &compressor.backend().recording().track_formats()[0];
    assert_eq!(video.media_type(), MediaType::Video);
    assert_eq!(compressor.backend().recording().orientation_hint(), None);
}

#[test]
fn test_rotated_portrait_source_keeps_size_and_hint() {
    let backend = ScriptedBackend::new(
        media_with_audio(600, 800),
        MemoryMetadata::new()
            .with_dimensions(600, 800)
            .with_rotation(90)
            .with_duration_ms(4_000),
    );
    let compressor = VideoCompressor::new(backend);
    let result = compressor
        .compress(&source(), Path::new("/scratch/out.mp4"), &Quality::Medium.settings())
        .unwrap();

    let recording = compressor.backend().recording();
    assert_eq!(recording.orientation_hint(), Some(90));
    let configured = compressor.backend().ledger().encoder_format().unwrap();
    assert_eq!((configured.width, configured.height), (Some(800), Some(600)));
    assert_eq!(result.duration_seconds, 4.0);
}

#[test]
fn test_source_without_audio_has_one_track() {
    let media = MemoryMedia::new().with_track(video_format(640, 480), video_samples(4, 40_000));
    let backend = ScriptedBackend::new(media, MemoryMetadata::new().with_dimensions(640, 480));
    let compressor = VideoCompressor::new(backend);
    compress(&compressor, Quality::Medium).unwrap();

    let recording = compressor.backend().recording();
    assert_eq!(recording.track_formats().len(), 1);
    assert_eq!(recording.samples(0).len(), 4);
    compressor.backend().ledger().assert_all_released_once();
}

#[test]
fn test_missing_video_track_fails_and_releases() {
    let media = MemoryMedia::new().with_track(audio_format(), audio_samples(3));
    let backend = ScriptedBackend::new(media, MemoryMetadata::new().with_dimensions(640, 480));
    let compressor = VideoCompressor::new(backend);

    match compress(&compressor, Quality::Low) {
        Err(CompressError::MissingTrack(kind)) => assert_eq!(kind, "video"),
        other => panic!("unexpected result: {:?}", other),
    }
    let ledger = compressor.backend().ledger();
    ledger.assert_all_released_once();
    assert_eq!(ledger.acquired(), vec!["metadata", "demuxer0", "demuxer1"]);
    assert!(compressor.backend().recording().events().is_empty());
}

#[test]
fn test_degenerate_probe_acquires_no_pipeline_resources() {
    let backend = ScriptedBackend::new(
        media_with_audio(640, 480),
        MemoryMetadata::new().with_dimensions(-640, 480),
    );
    let compressor = VideoCompressor::new(backend);
    assert!(matches!(
        compress(&compressor, Quality::Low),
        Err(CompressError::InvalidDimensions { .. })
    ));
    assert_eq!(compressor.backend().ledger().acquired(), vec!["metadata"]);
    compressor.backend().ledger().assert_all_released_once();
}

#[test]
fn test_every_resource_released_once_under_injected_failures() {
    let points = [
        FailAt::Probe,
        FailAt::EncoderStart,
        FailAt::DecoderStart,
        FailAt::LoopIteration(1),
        FailAt::LoopIteration(3),
        FailAt::LoopIteration(8),
        FailAt::MuxerStop,
        FailAt::Nowhere,
    ];

    for point in points {
        let backend = ScriptedBackend::new(
            media_with_audio(1920, 1080),
            MemoryMetadata::new().with_dimensions(1920, 1080),
        )
        .failing_at(point);
        let compressor = VideoCompressor::new(backend);
        let outcome = compress(&compressor, Quality::Medium);

        let succeeds = matches!(point, FailAt::MuxerStop | FailAt::Nowhere);
        assert_eq!(outcome.is_ok(), succeeds, "outcome at {:?}: {:?}", point, outcome);

        let ledger = compressor.backend().ledger();
        ledger.assert_all_released_once();

        match point {
            FailAt::Probe => assert!(ledger.acquired().is_empty()),
            FailAt::EncoderStart => {
                assert_eq!(ledger.count("encoder", Call::Stop), 0);
                assert_eq!(ledger.count("decoder", Call::Acquire), 0);
            }
            FailAt::DecoderStart => {
                assert_eq!(ledger.count("encoder", Call::Stop), 1);
                assert_eq!(ledger.count("decoder", Call::Stop), 0);
                assert_eq!(ledger.count("muxer", Call::Acquire), 0);
            }
            FailAt::LoopIteration(1) => {
                // failed before the muxer could start
                assert_eq!(ledger.count("muxer", Call::Stop), 0);
            }
            FailAt::LoopIteration(_) | FailAt::MuxerStop | FailAt::Nowhere => {
                assert_eq!(ledger.count("muxer", Call::Stop), 1);
                let last_codec_release = ledger
                    .position("decoder", Call::Release)
                    .max(ledger.position("encoder", Call::Release));
                assert!(ledger.position("muxer", Call::Stop) > last_codec_release);
            }
        }
    }
}

const SPS: &[u8] = &[0, 0, 0, 1, 0x67, 0x64, 0x00, 0x28, 0xAC, 0xD9];
const PPS: &[u8] = &[0, 0, 0, 1, 0x68, 0xEB, 0xE3, 0xCB];

/// Writes a 1920x1080 H.264 + AAC source file.
fn write_source_mp4(path: &Path) {
    let mut muxer = Mp4Muxer::create(path).unwrap();
    let video = muxer
        .add_track(
            &video_format(1920, 1080)
                .with_bit_rate(8_000_000)
                .with_csd(Bytes::from_static(SPS))
                .with_csd(Bytes::from_static(PPS)),
        )
        .unwrap();
    let audio = muxer.add_track(&audio_format()).unwrap();
    muxer.start().unwrap();

    let frames = video_samples(5, 33_333);
    let packets = audio_samples_every(8, 20_000);
    let mut frames = frames.iter().peekable();
    let mut packets = packets.iter().peekable();
    loop {
        let next_video = frames.peek().map(|s| s.presentation_time_us);
        let next_audio = packets.peek().map(|s| s.presentation_time_us);
        let (track, sample) = match (next_video, next_audio) {
            (Some(v), Some(a)) if v <= a => (video, frames.next().unwrap()),
            (Some(_), None) => (video, frames.next().unwrap()),
            (_, Some(_)) => (audio, packets.next().unwrap()),
            (None, None) => break,
        };
        muxer.write_sample(track, &sample.data, &sample.info()).unwrap();
    }
    muxer.stop().unwrap();
    muxer.release();
}

#[test]
fn test_mp4_file_compressed_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    write_source_mp4(&input);

    let compressor = VideoCompressor::new(FileBackend::loopback()).with_output_dir(dir.path().join("out"));
    let response = compressor
        .compress_request(
            &CompressRequest::new(input.to_string_lossy().into_owned()).with_quality("low"),
        )
        .unwrap();

    let output = Path::new(&response.output_path);
    assert!(output.starts_with(dir.path().join("out")));
    assert_eq!(response.size_bytes, std::fs::metadata(output).unwrap().len());
    assert!(response.size_bytes > 0);
    assert!(response.duration_seconds > 0.0);

    // loopback codecs copy the source stream at its own size
    let mut metadata = Mp4Metadata::open(output).unwrap();
    assert_eq!(metadata.extract(MetadataKey::VideoWidth).unwrap(), Some(1920));
    assert_eq!(metadata.extract(MetadataKey::VideoHeight).unwrap(), Some(1080));
    metadata.release();

    let mut demuxer = Mp4Demuxer::open(output).unwrap();
    assert_eq!(demuxer.track_count(), 2);
    let video = demuxer.track_format(0).unwrap();
    let parameter_sets: Vec<Vec<u8>> = video.csd.iter().map(|c| c.to_vec()).collect();
    let source_video = Mp4Demuxer::open(&input).unwrap().track_format(0).unwrap();
    let source_sets: Vec<Vec<u8>> = source_video.csd.iter().map(|c| c.to_vec()).collect();
    assert_eq!(parameter_sets, source_sets);
    assert!(!parameter_sets.is_empty());

    demuxer.select_track(0).unwrap();
    let mut buffer = BytesMut::new();
    let mut frames = Vec::new();
    while let Some(info) = demuxer.read_sample(&mut buffer).unwrap() {
        frames.push(info.presentation_time_us);
        demuxer.advance();
    }
    // source and output each floor to 90 kHz ticks, under one tick per pass
    let expected = [0, 33_333, 66_666, 99_999, 133_332];
    assert_eq!(frames.len(), expected.len());
    for (written, source) in frames.iter().zip(expected) {
        assert!((source - written).abs() <= 23, "{} vs {}", written, source);
    }
    let audio = demuxer.track_format(1).unwrap();
    assert_eq!(audio.csd(0).map(|c| c.to_vec()), Some(ASC_48K_STEREO.to_vec()));

    demuxer.select_track(1).unwrap();
    let mut copied = Vec::new();
    while let Some(info) = demuxer.read_sample(&mut buffer).unwrap() {
        copied.push((buffer.to_vec(), info.presentation_time_us));
        demuxer.advance();
    }
    let expected: Vec<(Vec<u8>, i64)> = audio_samples_every(8, 20_000)
        .into_iter()
        .map(|s| (s.data.to_vec(), s.presentation_time_us))
        .collect();
    assert_eq!(copied, expected);
    demuxer.release();
}

#[test]
fn test_mp4_output_rejects_unstarted_writes() {
    let dir = tempfile::tempdir().unwrap();
    let mut muxer = Mp4Muxer::create(dir.path().join("out.mp4")).unwrap();
    muxer.add_track(&audio_format()).unwrap();
    let info = SampleInfo::new(2, 0).with_flags(SampleFlags::KEY_FRAME);
    assert!(muxer.write_sample(0, &[1, 2], &info).is_err());
    muxer.release();
}

#[tokio::test]
async fn test_async_facade() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::new(
        media_with_audio(1280, 720),
        MemoryMetadata::new().with_dimensions(1280, 720).with_duration_ms(1_500),
    );
    let compressor = VideoCompressor::new(backend).with_output_dir(dir.path());

    let response = compressor
        .compress_video(CompressRequest::new("content://media/external/video/7").with_quality("high"))
        .await
        .unwrap();
    assert_eq!(response.duration_seconds, 1.5);
    assert!(response.output_path.contains("compressed_"));

    let missing = compressor
        .compress_video(CompressRequest::default())
        .await
        .unwrap_err();
    assert_eq!(missing.message, "Path is required");
}

#[tokio::test]
async fn test_async_failure_carries_cause() {
    let dir = tempfile::tempdir().unwrap();
    let compressor = VideoCompressor::new(FileBackend::loopback()).with_output_dir(dir.path());

    let failure = compressor
        .compress_video(CompressRequest::new(
            dir.path().join("missing.mp4").to_string_lossy().into_owned(),
        ))
        .await
        .unwrap_err();
    assert!(failure.message.starts_with("Compression failed: "));
    assert!(matches!(failure.source, CompressError::Io(_)));
}
