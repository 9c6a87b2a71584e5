//! Codec and playback scheduling properties

mod common;

use common::{FakeOutput, audio_message, speech_chunk};
use lumina_live::audio::{
    AudioFrame, Framer, PlaybackScheduler, decode_frame, encode_frame, pcm_mime_type,
};
use lumina_live::live::{ServerMessage, TransportEvent, TurnCounter};

const STEP: f32 = 1.0 / 32768.0;

/// Deterministic pseudo-random samples in [-1.2, 1.2]
fn noise(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            #[allow(clippy::cast_precision_loss)]
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            unit.mul_add(2.4, -1.2)
        })
        .collect()
}

#[test]
fn round_trip_within_one_step() {
    for seed in 0..8 {
        let samples = noise(4096, seed);
        let encoded = encode_frame(&samples, 16_000);
        assert_eq!(encoded.mime_type, pcm_mime_type(16_000));

        let decoded = tokio_test::assert_ok!(decode_frame(&encoded.data, 16_000)).to_f32();
        assert_eq!(decoded.len(), samples.len());
        for (original, back) in samples.iter().zip(&decoded) {
            let clamped = original.clamp(-1.0, 1.0);
            assert!(
                (clamped - back).abs() <= STEP,
                "{original} came back as {back}"
            );
        }
    }
}

#[test]
fn out_of_range_input_is_clamped() {
    let encoded = encode_frame(&[4.0, -4.0, f32::INFINITY], 16_000);
    let frame = tokio_test::assert_ok!(decode_frame(&encoded.data, 16_000));
    assert_eq!(frame.samples(), &[i16::MAX, i16::MIN, i16::MAX]);
}

#[test]
fn wire_bytes_are_little_endian() {
    let frame = AudioFrame::new(vec![1_i16, -2], 16_000);
    assert_eq!(frame.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF]);
}

#[test]
fn framer_output_encodes_to_full_frames() {
    let mut framer = Framer::new(4096);
    let mut frames = Vec::new();
    for burst in [1000, 3000, 500, 4096, 7] {
        framer.push(&noise(burst, burst as u64), |frame| frames.push(frame));
    }

    assert_eq!(frames.len(), 2);
    for frame in frames {
        let encoded = encode_frame(&frame, 16_000);
        let decoded = tokio_test::assert_ok!(decode_frame(&encoded.data, 16_000));
        assert_eq!(decoded.len(), 4096);
    }
}

#[test]
fn buffers_never_overlap_and_never_start_in_the_past() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());

    // clock advances by varying amounts between arrivals, sometimes past the queue
    let lengths = [2_400_usize, 4_800, 1_200, 24_000, 960, 12_000, 480, 3_600];
    let advances = [0_u64, 1_000, 50_000, 0, 700, 40_000, 0, 100];

    let mut previous_end = 0;
    for (len, advance) in lengths.iter().zip(advances) {
        let now = output.state().now + advance;
        output.set_now(now);

        let scheduled = tokio_test::assert_ok!(playback.enqueue_encoded(0, &speech_chunk(*len, 0.1)))
            .expect("scheduled");

        assert!(scheduled.start >= now, "buffer starts before the clock");
        assert!(scheduled.start >= previous_end, "buffer overlaps its predecessor");
        assert_eq!(scheduled.len(), *len as u64);
        assert_eq!(playback.cursor(), scheduled.end);
        previous_end = scheduled.end;
    }

    let state = output.state();
    let starts: Vec<u64> = state.scheduled.iter().map(|(_, start, _)| *start).collect();
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn back_to_back_when_the_clock_stands_still() {
    let output = FakeOutput::default();
    output.set_now(500);
    let mut playback = PlaybackScheduler::new(output.sink());

    let first = playback
        .enqueue_encoded(0, &speech_chunk(1_000, 0.1))
        .unwrap()
        .unwrap();
    let second = playback
        .enqueue_encoded(0, &speech_chunk(1_000, 0.1))
        .unwrap()
        .unwrap();

    assert_eq!(first.start, 500);
    assert_eq!(second.start, first.end);
}

#[test]
fn enqueue_after_flush_starts_at_or_after_clock() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());
    for _ in 0..4 {
        playback
            .enqueue_encoded(0, &speech_chunk(24_000, 0.1))
            .unwrap();
    }

    output.set_now(30_000);
    playback.flush();
    assert!(playback.pending().is_empty());
    assert_eq!(playback.cursor(), 30_000);
    assert_eq!(output.state().stopped.len(), 4);

    output.set_now(30_500);
    let next = playback
        .enqueue_encoded(0, &speech_chunk(2_400, 0.1))
        .unwrap()
        .unwrap();
    assert_eq!(next.start, 30_500);
}

#[test]
fn finished_buffers_are_reaped() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());
    playback
        .enqueue_encoded(0, &speech_chunk(1_000, 0.1))
        .unwrap();
    playback
        .enqueue_encoded(0, &speech_chunk(1_000, 0.1))
        .unwrap();

    output.set_now(1_000);
    assert_eq!(playback.reap(), 1);
    assert_eq!(playback.pending().len(), 1);

    // a flush now only stops the unfinished buffer
    playback.flush();
    assert_eq!(output.state().stopped.len(), 1);
}

#[test]
fn interrupt_drops_superseded_turns_only() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());
    playback
        .enqueue_encoded(2, &speech_chunk(1_000, 0.1))
        .unwrap();
    playback.interrupt(2);

    assert!(playback.enqueue_encoded(1, &speech_chunk(1_000, 0.1)).unwrap().is_none());
    assert!(playback.enqueue_encoded(2, &speech_chunk(1_000, 0.1)).unwrap().is_none());
    assert!(playback.enqueue_encoded(3, &speech_chunk(1_000, 0.1)).unwrap().is_some());
}

#[test]
fn close_releases_output_once() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());
    playback
        .enqueue_encoded(0, &speech_chunk(1_000, 0.1))
        .unwrap();
    playback.close();
    playback.close();
    drop(playback);

    let state = output.state();
    assert_eq!(state.closes, 1);
    assert_eq!(state.stopped.len(), 1);
}

#[test]
fn mismatched_rate_is_rejected_without_touching_the_queue() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());
    let frame = AudioFrame::from_f32(&[0.1; 160], 16_000);

    tokio_test::assert_err!(playback.enqueue(&frame));
    assert!(playback.pending().is_empty());
    assert_eq!(playback.cursor(), 0);
}

#[test]
fn inbound_chunks_on_a_faster_clock_are_rejected() {
    let output = FakeOutput::at_rate(48_000);
    let mut playback = PlaybackScheduler::new(output.sink());

    tokio_test::assert_err!(playback.enqueue_encoded(0, &speech_chunk(2_400, 0.1)));
    assert!(playback.pending().is_empty());
    assert_eq!(playback.cursor(), 0);
    assert!(output.state().scheduled.is_empty());
}

#[test]
fn clock_moving_during_schedule_keeps_the_cursor_in_step() {
    let output = FakeOutput::default();
    output.state().render_gap = 480;
    let mut playback = PlaybackScheduler::new(output.sink());

    let first = tokio_test::assert_ok!(playback.enqueue_encoded(0, &speech_chunk(240, 0.1)))
        .expect("scheduled");
    assert_eq!(first.start, 480);
    assert_eq!(first.end, 720);
    assert_eq!(playback.cursor(), 720);

    // the clock overtakes the queue again before the second buffer lands
    let second = tokio_test::assert_ok!(playback.enqueue_encoded(0, &speech_chunk(240, 0.1)))
        .expect("scheduled");
    assert_eq!(second.start, 960);
    assert_eq!(playback.cursor(), second.end);
    assert_eq!(second.len(), 240);
}

#[test]
fn server_messages_after_interruption_are_dropped_until_turn_complete() {
    let output = FakeOutput::default();
    let mut playback = PlaybackScheduler::new(output.sink());
    let mut turns = TurnCounter::default();

    let messages = [
        audio_message(&speech_chunk(1_000, 0.1)),
        r#"{"serverContent":{"interrupted":true}}"#.to_string(),
        audio_message(&speech_chunk(1_000, 0.1)),
        r#"{"serverContent":{"turnComplete":true}}"#.to_string(),
        audio_message(&speech_chunk(500, 0.1)),
    ];

    let mut played = Vec::new();
    for json in &messages {
        let msg = tokio_test::assert_ok!(ServerMessage::parse(json.as_bytes()));
        for event in turns.events_for(&msg) {
            match event {
                TransportEvent::AudioChunk { turn, data } => {
                    if let Some(scheduled) =
                        tokio_test::assert_ok!(playback.enqueue_encoded(turn, &data))
                    {
                        played.push((turn, scheduled.len()));
                    }
                }
                TransportEvent::Interrupted { turn } => playback.interrupt(turn),
                _ => {}
            }
        }
    }

    assert_eq!(played, vec![(0, 1_000), (1, 500)]);
    assert_eq!(output.state().stopped.len(), 1);
}
