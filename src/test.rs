use crate::{
    decode_varlen, encode_varlen, ChannelMessage, ErrorKind, Event, Format, Fps, Message,
    MetaMessage, MetricTicks, RunningStatusDecoder, RunningStatusEncoder, Smf, SysexPacket,
    SysexState, TempoChanges, TimeCode, Timing, Track, VARLEN_MAX,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

/// Build a file out of a header and raw chunk bodies.
macro_rules! smf_bytes {
    {format: $format:expr, tracks: $ntrks:expr, division: $div:expr, $($tag:literal => $body:expr),* $(,)?} => {{
        let mut raw = Vec::new();
        raw.extend_from_slice(b"MThd\0\0\0\x06");
        raw.extend_from_slice(&($format as u16).to_be_bytes());
        raw.extend_from_slice(&($ntrks as u16).to_be_bytes());
        raw.extend_from_slice(&($div as u16).to_be_bytes());
        $(
            let body: &[u8] = &$body[..];
            raw.extend_from_slice($tag);
            raw.extend_from_slice(&(body.len() as u32).to_be_bytes());
            raw.extend_from_slice(body);
        )*
        raw
    }};
}

/// Parse, expecting a failure of the given kind.
macro_rules! parse_err {
    ($raw:expr) => {
        match Smf::parse(&$raw[..]) {
            Ok(smf) => panic!("expected a parse failure, got {:?}", smf),
            Err(err) => err.kind(),
        }
    };
}

fn end_of_track() -> Vec<u8> {
    vec![0x00, 0xFF, 0x2F, 0x00]
}

const GOLDEN_TRACK: &[u8] = &[
    0x00, 0xFF, 0x58, 0x04, 0x04, 0x02, 0x18, 0x08, //time signature
    0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, //tempo
    0x00, 0xC0, 0x05, //
    0x00, 0xC1, 0x2E, //
    0x00, 0xC2, 0x46, //
    0x00, 0x92, 0x30, 0x60, //
    0x00, 0x3C, 0x60, //running status
    0x60, 0x91, 0x43, 0x40, //
    0x60, 0x90, 0x4C, 0x20, //
    0x81, 0x40, 0x82, 0x30, 0x40, //
    0x00, 0x3C, 0x40, //running status
    0x00, 0x81, 0x43, 0x40, //
    0x00, 0x80, 0x4C, 0x40, //
    0x00, 0xFF, 0x2F, 0x00, //end of track
];

fn golden_file() -> Vec<u8> {
    smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => GOLDEN_TRACK}
}

mod varlen {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_boundaries() {
        let cases: &[(u32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x81, 0x00]),
            (16383, &[0xFF, 0x7F]),
            (16384, &[0x81, 0x80, 0x00]),
            (2097151, &[0xFF, 0xFF, 0x7F]),
            (2097152, &[0x81, 0x80, 0x80, 0x00]),
            (VARLEN_MAX, &[0xFF, 0xFF, 0xFF, 0x7F]),
        ];
        for &(int, bytes) in cases {
            assert_eq!(encode_varlen(int).unwrap().as_bytes(), bytes, "encoding {}", int);
            assert_eq!(
                decode_varlen(bytes).unwrap(),
                (int, bytes.len()),
                "decoding {}",
                int
            );
        }
    }

    #[test]
    fn overflow() {
        assert_eq!(
            encode_varlen(VARLEN_MAX + 1).unwrap_err().kind(),
            ErrorKind::VlqOverflow
        );
        assert_eq!(
            decode_varlen(&[0x81, 0x80, 0x80, 0x80, 0x00])
                .unwrap_err()
                .kind(),
            ErrorKind::VlqOverflow
        );
    }

    #[test]
    fn unterminated() {
        assert!(matches!(
            decode_varlen(&[0x81, 0x80]).unwrap_err().kind(),
            ErrorKind::UnexpectedEof(_)
        ));
    }

    #[test]
    fn trailing_bytes_are_left_alone() {
        assert_eq!(decode_varlen(&[0x81, 0x00, 0x42]).unwrap(), (128, 2));
    }
}

mod running_status {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encoder_drops_repeated_status() {
        let mut out = Vec::new();
        let mut enc = RunningStatusEncoder::new();
        enc.write(Message::note_on(0, 60, 100).unwrap().raw(), &mut out)
            .unwrap();
        enc.write(Message::note_on(0, 64, 100).unwrap().raw(), &mut out)
            .unwrap();
        assert_eq!(out, [0x90, 0x3C, 0x64, 0x40, 0x64]);
    }

    #[test]
    fn encoder_resets_on_meta() {
        let mut out = Vec::new();
        let mut enc = RunningStatusEncoder::new();
        enc.write(&[0x90, 0x3C, 0x64], &mut out).unwrap();
        enc.write(Message::end_of_track().raw(), &mut out).unwrap();
        enc.write(&[0x90, 0x3C, 0x00], &mut out).unwrap();
        assert_eq!(out, [0x90, 0x3C, 0x64, 0xFF, 0x2F, 0x00, 0x90, 0x3C, 0x00]);
    }

    #[test]
    fn decoder_states() {
        let mut dec = RunningStatusDecoder::new();
        assert_eq!(dec.resolve(0x40), (0, false));
        assert_eq!(dec.resolve(0x92), (0x92, true));
        assert_eq!(dec.resolve(0x40), (0x92, false));
        //Realtime bytes leave the cache alone
        assert_eq!(dec.resolve(0xF8), (0, true));
        assert_eq!(dec.resolve(0x40), (0x92, false));
        //System common clears it
        assert_eq!(dec.resolve(0xF0), (0, true));
        assert_eq!(dec.resolve(0x40), (0, false));
        dec.resolve(0xB1);
        dec.reset();
        assert_eq!(dec.status(), 0);
    }

    #[test]
    fn compressed_track_decodes() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 480,
            b"MTrk" => [0x00, 0x90, 0x3C, 0x64, 0x00, 0x40, 0x64, 0x00, 0xFF, 0x2F, 0x00],
        };
        let smf = Smf::parse(&raw).unwrap();
        let events = smf.tracks()[0].events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, Message::note_on(0, 60, 100).unwrap());
        assert_eq!(events[1].message, Message::note_on(0, 64, 100).unwrap());
        assert_eq!(smf.to_bytes().unwrap(), raw);
    }

    #[test]
    fn orphan_data_byte() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 480,
            b"MTrk" => [0x00, 0x3C, 0x64, 0x00, 0xFF, 0x2F, 0x00],
        };
        assert_eq!(
            parse_err!(raw),
            ErrorKind::Invalid("data byte with no running status")
        );
    }

    #[test]
    fn meta_cancels_running_status() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 480,
            b"MTrk" => [
                0x00, 0x90, 0x3C, 0x64, 0x00, 0xFF, 0x01, 0x01, b'a', 0x00, 0x3C, 0x00, 0x00,
                0xFF, 0x2F, 0x00,
            ],
        };
        assert!(matches!(parse_err!(raw), ErrorKind::Invalid(_)));
    }
}

mod golden {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse() {
        let smf = Smf::parse(&golden_file()).unwrap();
        assert_eq!(smf.format(), Format::SingleTrack);
        assert_eq!(smf.timing(), Timing::Metrical(MetricTicks::new(96)));
        assert_eq!(smf.tracks().len(), 1);
        let track = &smf.tracks()[0];
        assert_eq!(track.len(), 14);
        assert!(track.is_closed());
        assert_eq!(
            track.events()[0].message.as_meta(),
            Some(MetaMessage::TimeSignature(4, 2, 24, 8))
        );
        assert_eq!(track.events()[1].message.tempo_bpm(), Some(120.0));
        assert_eq!(
            track.events()[6].message.as_channel(),
            Some((2, ChannelMessage::NoteOn { key: 60, vel: 96 }))
        );
        assert_eq!(track.events()[9].delta, 192);
        let ticks: Vec<u64> = track.absolute_ticks().map(|(tick, _)| tick).collect();
        assert_eq!(
            ticks,
            [0, 0, 0, 0, 0, 0, 0, 96, 192, 384, 384, 384, 384, 384]
        );
        assert_eq!(smf.tempo_changes().len(), 1);
    }

    #[test]
    fn rewrite_is_byte_identical() {
        let raw = golden_file();
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(smf.to_bytes().unwrap(), raw);
        let mut written = Vec::new();
        smf.write(&mut written).unwrap();
        assert_eq!(written, raw);
    }

    #[cfg(feature = "std")]
    #[test]
    fn read_from_stream() {
        let raw = golden_file();
        let streamed = Smf::read_from(&raw[..]).unwrap();
        assert_eq!(streamed, Smf::parse(&raw).unwrap());
    }

    #[test]
    fn truncated_everywhere() {
        let raw = golden_file();
        for len in 0..raw.len() {
            assert!(
                Smf::parse(&raw[..len]).is_err(),
                "parsing {} bytes out of {} succeeded",
                len,
                raw.len()
            );
        }
    }
}

mod tempo {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map() -> TempoChanges {
        let mut map = TempoChanges::new();
        map.insert(960, 140.0).unwrap();
        map.insert(0, 120.0).unwrap();
        map
    }

    #[test]
    fn bpm_lookup() {
        let map = map();
        assert_eq!(map.bpm_at(500), 120.0);
        assert_eq!(map.bpm_at(960), 140.0);
        assert_eq!(map.bpm_at(2000), 140.0);
        assert_eq!(TempoChanges::new().bpm_at(12345), 120.0);
    }

    #[test]
    fn durations() {
        let res = MetricTicks::new(960);
        let mut map = TempoChanges::new();
        map.insert(960, 60.0).unwrap();
        assert_eq!(map.duration_at(res, 0), Duration::from_secs(0));
        assert_eq!(map.duration_at(res, 960), Duration::from_millis(500));
        assert_eq!(map.duration_at(res, 1920), Duration::from_millis(1500));
        assert_eq!(map.duration_at(res, -5), Duration::from_secs(0));
        assert_eq!(map.ticks_at(res, Duration::from_millis(1500)), 1920);
        assert_eq!(map.ticks_at(res, Duration::from_millis(250)), 480);
    }

    #[test]
    fn ticks_at_saturates() {
        let res = MetricTicks::new(960);
        assert_eq!(TempoChanges::new().ticks_at(res, Duration::MAX), i64::MAX);
        assert_eq!(map().ticks_at(res, Duration::MAX), i64::MAX);
    }

    #[test]
    fn rejects_bad_bpm() {
        let mut map = TempoChanges::new();
        assert!(matches!(
            map.insert(0, 0.0).unwrap_err().kind(),
            ErrorKind::OutOfRange(_)
        ));
        assert!(map.insert(0, f64::NAN).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn metric_ticks() {
        let res = MetricTicks::new(0);
        assert_eq!(res.resolution(), 960);
        assert_eq!(res.quarter(), 960);
        assert_eq!(res.eighth(), 480);
        assert_eq!(res.sixteenth(), 240);
        assert_eq!(res.ticks_for(3, 8).unwrap(), 1440);
        assert_eq!(
            MetricTicks::new(480).duration(120.0, 480).unwrap(),
            Duration::from_millis(500)
        );
        assert_eq!(
            MetricTicks::new(480)
                .ticks(120.0, Duration::from_millis(250))
                .unwrap(),
            240
        );
        assert!(res.ticks_for(1, 0).is_err());
    }

    #[test]
    fn tempo_message() {
        let msg = Message::tempo(60.0).unwrap();
        assert_eq!(msg.raw(), [0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40]);
        assert_eq!(msg.tempo_bpm(), Some(60.0));
        //Too slow for 24 bits, clamped
        let slow = Message::tempo(1.0).unwrap();
        assert_eq!(slow.as_meta(), Some(MetaMessage::Tempo(0xFF_FFFF)));
        assert!(Message::tempo(-1.0).is_err());
    }

    #[test]
    fn timecode() {
        let tc = TimeCode::new(Fps::Fps25, 40).unwrap();
        assert_eq!(tc.duration(1000), Duration::from_secs(1));
        assert_eq!(tc.ticks(Duration::from_millis(500)), 500);
        assert!(TimeCode::new(Fps::Fps30, 0).is_err());
    }
}

mod sysex {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn continuation_flag() {
        let mut state = SysexState::new();
        assert_eq!(state.feed(0xF0, &[0x43, 0x12, 0x00]), SysexPacket::Start);
        assert!(state.in_sequence());
        assert_eq!(
            state.feed(0xF7, &[0x43, 0x12, 0x00, 0x43, 0x12, 0x00]),
            SysexPacket::Continuation
        );
        assert!(state.in_sequence());
        assert_eq!(
            state.feed(0xF7, &[0x43, 0x12, 0x00, 0xF7]),
            SysexPacket::End
        );
        assert!(!state.in_sequence());
        assert_eq!(state.feed(0xF7, &[0xF3, 0x01]), SysexPacket::Escape);
        assert_eq!(state.feed(0xF0, &[0x7E, 0xF7]), SysexPacket::Complete);
        assert!(!state.in_sequence());
    }

    #[test]
    fn casio_sequence() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [
                0x00, 0xF0, 0x03, 0x43, 0x12, 0x00, //
                0x81, 0x48, 0xF7, 0x06, 0x43, 0x12, 0x00, 0x43, 0x12, 0x00, //
                0x64, 0xF7, 0x04, 0x43, 0x12, 0x00, 0xF7, //
                0x00, 0xF7, 0x02, 0xF3, 0x01, //
                0x00, 0xFF, 0x2F, 0x00,
            ],
        };
        let smf = Smf::parse(&raw).unwrap();
        let messages = smf.tracks()[0].sysex_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].data,
            [0x43, 0x12, 0x00, 0x43, 0x12, 0x00, 0x43, 0x12, 0x00, 0x43, 0x12, 0x00]
        );
        assert_eq!(messages[0].packets, 3);
        assert!(messages[0].terminated);
        assert_eq!(smf.to_bytes().unwrap(), raw);
    }

    #[test]
    fn abandoned_sequence() {
        let mut track = Track::new();
        track.push(0, Message::sysex(&[0x01, 0x02]).unwrap()).unwrap();
        track.push(0, Message::sysex(&[0x03, 0xF7]).unwrap()).unwrap();
        let messages = track.sysex_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, [0x01, 0x02]);
        assert!(!messages[0].terminated);
        assert_eq!(messages[1].data, [0x03]);
        assert!(messages[1].terminated);
    }

    #[cfg(not(feature = "strict"))]
    #[test]
    fn open_sequence_at_end_of_track() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [0x00, 0xF0, 0x01, 0x43, 0x00, 0xFF, 0x2F, 0x00],
        };
        let smf = Smf::parse(&raw).unwrap();
        assert!(!smf.tracks()[0].sysex_messages()[0].terminated);
    }

    #[cfg(feature = "strict")]
    #[test]
    fn open_sequence_at_end_of_track() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [0x00, 0xF0, 0x01, 0x43, 0x00, 0xFF, 0x2F, 0x00],
        };
        assert!(matches!(parse_err!(raw), ErrorKind::Malformed(_)));
    }
}

mod reader {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_tracks() {
        let raw = smf_bytes! {format: 1, tracks: 2, division: 96, b"MTrk" => end_of_track()};
        assert_eq!(
            parse_err!(raw),
            ErrorKind::MissingTracks {
                declared: 2,
                found: 1
            }
        );
    }

    #[test]
    fn track_without_end() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [0x00, 0x90, 0x3C, 0x64],
        };
        assert_eq!(
            parse_err!(raw),
            ErrorKind::MissingTracks {
                declared: 1,
                found: 0
            }
        );
    }

    #[test]
    fn bad_meta_length() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [0x00, 0xFF, 0x58, 0x03, 0x04, 0x02, 0x18, 0x00, 0xFF, 0x2F, 0x00],
        };
        assert_eq!(
            parse_err!(raw),
            ErrorKind::UnexpectedMessageLength { meta: 0x58, len: 3 }
        );
    }

    #[test]
    fn realtime_byte_in_track() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [0x00, 0xF8, 0x00, 0xFF, 0x2F, 0x00],
        };
        assert!(matches!(parse_err!(raw), ErrorKind::Invalid(_)));
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let raw = smf_bytes! {
            format: 1, tracks: 2, division: 96,
            b"XFIH" => [1, 2, 3, 4, 5],
            b"MTrk" => end_of_track(),
            b"junk" => [0u8; 0],
            b"MTrk" => end_of_track(),
        };
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(smf.tracks().len(), 2);
    }

    #[test]
    fn extra_tracks_are_ignored() {
        let raw = smf_bytes! {
            format: 1, tracks: 1, division: 96,
            b"MTrk" => end_of_track(),
            b"MTrk" => end_of_track(),
        };
        assert_eq!(Smf::parse(&raw).unwrap().tracks().len(), 1);
    }

    #[test]
    fn header_errors() {
        assert_eq!(parse_err!(b""), ErrorKind::ExpectedHeaderChunk);
        assert_eq!(
            parse_err!(b"MTrk\0\0\0\x04\x00\xFF\x2F\x00"),
            ErrorKind::ExpectedHeaderChunk
        );
        assert!(matches!(
            parse_err!(b"MThd\0\0\0\x05\0\0\0\x01\0"),
            ErrorKind::Invalid(_)
        ));
        let raw = smf_bytes! {format: 3, tracks: 1, division: 96, b"MTrk" => end_of_track()};
        assert_eq!(parse_err!(raw), ErrorKind::UnsupportedFormat(3));
    }

    #[test]
    fn smpte_division() {
        let raw = smf_bytes! {format: 0, tracks: 1, division: 0xE728u16, b"MTrk" => [
            0x00, 0x90, 0x3C, 0x64, 0x87, 0x68, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00,
        ]};
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(
            smf.timing(),
            Timing::Timecode(TimeCode::new(Fps::Fps25, 40).unwrap())
        );
        let times: Vec<Duration> = smf.timed_events().map(|ev| ev.time).collect();
        assert_eq!(times[1], Duration::from_secs(1));
        assert_eq!(smf.to_bytes().unwrap(), raw);
    }

    #[test]
    fn smpte_division_errors() {
        let raw = smf_bytes! {format: 0, tracks: 1, division: 0xE528u16, b"MTrk" => end_of_track()};
        assert!(matches!(parse_err!(raw), ErrorKind::Invalid(_)));
        let raw = smf_bytes! {format: 0, tracks: 1, division: 0xE700u16, b"MTrk" => end_of_track()};
        assert!(matches!(parse_err!(raw), ErrorKind::Invalid(_)));
    }

    #[test]
    fn zero_division() {
        let raw = smf_bytes! {format: 0, tracks: 1, division: 0, b"MTrk" => [
            0x00, 0x90, 0x3C, 0x64, 0x87, 0x40, 0x80, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00,
        ]};
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(smf.duration_at(960), Duration::from_millis(500));
        //The raw zero survives a rewrite
        assert_eq!(smf.to_bytes().unwrap(), raw);
    }

    #[test]
    fn riff_wrapped() {
        let smf = golden_file();
        let mut body = Vec::new();
        body.extend_from_slice(b"RMID");
        body.extend_from_slice(b"LIST");
        body.extend_from_slice(&3u32.to_le_bytes());
        body.extend_from_slice(&[1, 2, 3, 0]);
        body.extend_from_slice(b"data");
        body.extend_from_slice(&(smf.len() as u32).to_le_bytes());
        body.extend_from_slice(&smf);
        body.extend_from_slice(b"trailing");
        let mut raw = Vec::new();
        raw.extend_from_slice(b"RIFF");
        raw.extend_from_slice(&(body.len() as u32).to_le_bytes());
        raw.extend_from_slice(&body);
        assert_eq!(Smf::parse(&raw).unwrap(), Smf::parse(&smf).unwrap());
    }

    #[test]
    fn riff_without_rmid() {
        let mut raw = Vec::new();
        raw.extend_from_slice(b"RIFF");
        raw.extend_from_slice(&4u32.to_le_bytes());
        raw.extend_from_slice(b"WAVE");
        assert_eq!(parse_err!(raw), ErrorKind::Invalid("not an rmid riff file"));
    }

    #[test]
    fn non_minimal_lengths_are_canonicalized() {
        let raw = smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => [
            0x00, 0xFF, 0x01, 0x80, 0x02, b'h', b'i', 0x00, 0xFF, 0x2F, 0x00,
        ]};
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(
            smf.tracks()[0].events()[0].message,
            Message::text("hi").unwrap()
        );
        let canonical = smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => [
            0x00, 0xFF, 0x01, 0x02, b'h', b'i', 0x00, 0xFF, 0x2F, 0x00,
        ]};
        assert_eq!(smf.to_bytes().unwrap(), canonical);
    }

    #[cfg(not(feature = "strict"))]
    #[test]
    fn lenient_deviations() {
        let raw = smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => [
            0x00, 0x90, 0x3C, 0xE4, 0x00, 0xFF, 0x2F, 0x00, 0xAA, 0xBB,
        ]};
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(
            smf.tracks()[0].events()[0].message,
            Message::note_on(0, 0x3C, 0x64).unwrap()
        );
    }

    #[cfg(not(feature = "strict"))]
    #[test]
    fn single_track_header_with_two_tracks() {
        let raw = smf_bytes! {
            format: 0, tracks: 2, division: 96,
            b"MTrk" => end_of_track(),
            b"MTrk" => end_of_track(),
        };
        let smf = Smf::parse(&raw).unwrap();
        assert_eq!(smf.format(), Format::Parallel);
        let expected = smf_bytes! {
            format: 1, tracks: 2, division: 96,
            b"MTrk" => end_of_track(),
            b"MTrk" => end_of_track(),
        };
        assert_eq!(smf.to_bytes().unwrap(), expected);
    }

    #[cfg(feature = "strict")]
    #[test]
    fn strict_deviations() {
        let raw = smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => [
            0x00, 0x90, 0x3C, 0xE4, 0x00, 0xFF, 0x2F, 0x00,
        ]};
        assert!(matches!(parse_err!(raw), ErrorKind::Malformed(_)));
        let raw = smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => [
            0x00, 0xFF, 0x2F, 0x00, 0xAA,
        ]};
        assert!(matches!(parse_err!(raw), ErrorKind::Malformed(_)));
        let raw = smf_bytes! {
            format: 0, tracks: 2, division: 96,
            b"MTrk" => end_of_track(),
            b"MTrk" => end_of_track(),
        };
        assert!(matches!(parse_err!(raw), ErrorKind::Malformed(_)));
    }

    #[test]
    fn error_trace() {
        let raw = smf_bytes! {
            format: 0, tracks: 1, division: 96,
            b"MTrk" => [0x00, 0xFF, 0x51, 0x02, 0x00, 0x00],
        };
        let err = Smf::parse(&raw).unwrap_err();
        assert_eq!(err.to_string(), err.kind().to_string());
        if cfg!(debug_assertions) {
            assert!(err.trace().contains(&"failed to read track chunk"));
        }
    }
}

mod model {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn closed_track_rejects_events() {
        let mut track = Track::new();
        track.push(0, Message::note_on(0, 60, 100).unwrap()).unwrap();
        track.close(10).unwrap();
        assert!(track.is_closed());
        assert_eq!(
            track
                .push(0, Message::note_off(0, 60, 0).unwrap())
                .unwrap_err()
                .kind(),
            ErrorKind::TrackClosed
        );
        assert_eq!(track.close(0).unwrap_err().kind(), ErrorKind::TrackClosed);
        assert_eq!(track.len(), 2);
    }

    #[test]
    fn delta_overflow() {
        let mut track = Track::new();
        assert_eq!(
            track
                .push(VARLEN_MAX + 1, Message::note_on(0, 60, 100).unwrap())
                .unwrap_err()
                .kind(),
            ErrorKind::VlqOverflow
        );
        assert!(track.is_empty());
    }

    #[test]
    fn implicit_end_of_track() {
        let mut smf = Smf::with_timing(Timing::Metrical(MetricTicks::new(96)));
        let mut track = Track::new();
        track.push(0, Message::note_on(1, 60, 100).unwrap()).unwrap();
        track.push(96, Message::note_off(1, 60, 0).unwrap()).unwrap();
        smf.add_track(track).unwrap();
        let raw = smf.to_bytes().unwrap();
        let expected = smf_bytes! {format: 0, tracks: 1, division: 96, b"MTrk" => [
            0x00, 0x91, 0x3C, 0x64, 0x60, 0x81, 0x3C, 0x00, 0x00, 0xFF, 0x2F, 0x00,
        ]};
        assert_eq!(raw, expected);
        let reread = Smf::parse(&raw).unwrap();
        assert!(reread.tracks()[0].is_closed());
        assert_eq!(reread.tracks()[0].len(), 3);
    }

    #[test]
    fn format_promotion() {
        let mut smf = Smf::new();
        assert_eq!(smf.format(), Format::SingleTrack);
        smf.add_track(Track::new()).unwrap();
        assert_eq!(smf.format(), Format::SingleTrack);
        smf.add_track(Track::new()).unwrap();
        assert_eq!(smf.format(), Format::Parallel);
        smf.set_format(Format::SingleTrack);
        assert_eq!(smf.format(), Format::Parallel);
        smf.set_format(Format::Sequential);
        assert_eq!(smf.format(), Format::Sequential);
    }

    #[test]
    fn add_track_collects_tempo() {
        let mut smf = Smf::new();
        let mut track = Track::new();
        track.push(480, Message::tempo(60.0).unwrap()).unwrap();
        track.push(480, Message::tempo(240.0).unwrap()).unwrap();
        smf.add_track(track).unwrap();
        let changes: Vec<(i64, f64)> = smf
            .tempo_changes()
            .iter()
            .map(|c| (c.abs_ticks, c.bpm))
            .collect();
        assert_eq!(changes, [(480, 60.0), (960, 240.0)]);
    }

    #[test]
    fn track_insert_keeps_ticks() {
        let mut track = Track::new();
        track.push(0, Message::note_on(0, 60, 100).unwrap()).unwrap();
        track.push(96, Message::note_off(0, 60, 0).unwrap()).unwrap();
        track.close(96).unwrap();
        track.insert(48, Message::control_change(0, 7, 1).unwrap()).unwrap();
        track.insert(96, Message::control_change(0, 7, 2).unwrap()).unwrap();
        track.insert(300, Message::control_change(0, 7, 3).unwrap()).unwrap();
        let ticks: Vec<(u64, &[u8])> = track
            .absolute_ticks()
            .map(|(tick, ev)| (tick, ev.message.raw()))
            .collect();
        assert_eq!(
            ticks,
            [
                (0, &[0x90, 60, 100][..]),
                (48, &[0xB0, 7, 1][..]),
                (96, &[0x80, 60, 0][..]),
                (96, &[0xB0, 7, 2][..]),
                (300, &[0xB0, 7, 3][..]),
                (300, &[0xFF, 0x2F, 0x00][..]),
            ]
        );
        assert!(track.is_closed());
        assert!(matches!(
            track.insert(0, Message::end_of_track()).unwrap_err().kind(),
            ErrorKind::Invalid(_)
        ));
        assert_eq!(
            Track::new()
                .insert(VARLEN_MAX as u64 + 1, Message::text("late").unwrap())
                .unwrap_err()
                .kind(),
            ErrorKind::VlqOverflow
        );
    }

    #[test]
    fn insert_tempo_is_written() {
        let mut smf = Smf::new();
        let mut track = Track::new();
        track.push(960, Message::note_on(0, 60, 100).unwrap()).unwrap();
        track.close(0).unwrap();
        smf.add_track(track).unwrap();
        assert_eq!(smf.duration_at(960), Duration::from_millis(500));
        smf.insert_tempo(0, 60.0).unwrap();
        assert_eq!(smf.duration_at(960), Duration::from_secs(1));
        assert_eq!(
            &smf.tracks()[0].events()[..2],
            [
                Event {
                    delta: 0,
                    message: Message::tempo(60.0).unwrap(),
                },
                Event {
                    delta: 960,
                    message: Message::note_on(0, 60, 100).unwrap(),
                },
            ]
        );
        let reread = Smf::parse(&smf.to_bytes().unwrap()).unwrap();
        assert_eq!(reread.duration_at(960), Duration::from_secs(1));
        assert_eq!(reread, smf);
    }

    #[test]
    fn insert_tempo_into_empty_file() {
        let mut smf = Smf::new();
        assert!(smf.insert_tempo(0, f64::NAN).is_err());
        assert!(smf.tracks().is_empty());
        smf.insert_tempo(480, 240.0).unwrap();
        assert_eq!(smf.tracks().len(), 1);
        assert_eq!(smf.tracks()[0].events()[0].delta, 480);
        assert_eq!(smf.tempo_changes().bpm_at(480), 240.0);
        assert_eq!(smf.tempo_changes().len(), 1);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_encoding_matches_serial() {
        let mut smf = Smf::new();
        for channel in 0..4u8 {
            let mut track = Track::new();
            for i in 0..2500u32 {
                let key = (i % 128) as u8;
                track.push(i % 7, Message::note_on(channel, key, 100).unwrap()).unwrap();
                track.push(1, Message::note_off(channel, key, 0).unwrap()).unwrap();
            }
            smf.add_track(track).unwrap();
        }
        let raw = smf.to_bytes().unwrap();
        let mut serial = Vec::new();
        crate::write::encode_tracks_serial(smf.tracks(), &mut serial).unwrap();
        assert!(raw[14..] == serial[..], "track chunks differ from the serial encoding");
        let reread = Smf::parse(&raw).unwrap();
        assert_eq!(reread.tracks().len(), 4);
        assert_eq!(reread.tracks()[3].len(), 5001);
    }

    #[test]
    fn message_ranges() {
        assert!(matches!(
            Message::note_on(16, 60, 100).unwrap_err().kind(),
            ErrorKind::OutOfRange(_)
        ));
        assert!(Message::note_on(0, 128, 100).is_err());
        assert!(Message::meta(0x51, &[0x07, 0xA1]).is_err());
        assert_eq!(
            Message::from_raw(&[0xF0, 0x03, 0x01]).unwrap_err().kind(),
            ErrorKind::Invalid("message length prefix does not match its payload")
        );
    }

    #[test]
    fn message_from_raw() {
        assert_eq!(
            Message::from_raw(&[0xFF, 0x03, 0x80, 0x00]).unwrap(),
            Message::track_name("").unwrap()
        );
        assert!(Message::from_raw(&[0x90, 0x3C]).is_err());
        let msg = Message::from_raw(&[0xB3, 0x07, 0x64]).unwrap();
        assert_eq!(
            msg.as_channel(),
            Some((
                3,
                ChannelMessage::Controller {
                    controller: 7,
                    value: 100
                }
            ))
        );
        assert_eq!(
            Message::from_raw(&[0xFF, 0x2F, 0x00]).unwrap(),
            Message::end_of_track()
        );
    }
}

mod typed {
    use super::*;
    use pretty_assertions::assert_eq;
    use crate::{MessageKind, PitchBend, SmpteTime};

    #[test]
    fn smpte_offset() {
        let time = SmpteTime::new(1, 2, 3, 4, 50, Fps::Fps30).unwrap();
        let msg = Message::from_meta(&MetaMessage::SmpteOffset(time)).unwrap();
        assert_eq!(msg.raw(), [0xFF, 0x54, 0x05, 0x61, 0x02, 0x03, 0x04, 0x32]);
        assert_eq!(msg.as_meta(), Some(MetaMessage::SmpteOffset(time)));
        assert_eq!(
            time.as_duration(),
            Duration::from_secs(3723) + Duration::from_secs_f64(4.5 / 30.0)
        );
        assert!(SmpteTime::new(24, 0, 0, 0, 0, Fps::Fps24).is_err());
        assert!(SmpteTime::new(0, 0, 0, 25, 0, Fps::Fps25).is_err());
    }

    #[test]
    fn key_signature() {
        let msg = Message::key_signature(-3, true).unwrap();
        assert_eq!(msg.raw(), [0xFF, 0x59, 0x02, 0xFD, 0x01]);
        assert_eq!(msg.as_meta(), Some(MetaMessage::KeySignature(-3, true)));
    }

    #[test]
    fn undefined_meta_is_kept() {
        let msg = Message::meta(0x60, &[1, 2, 3]).unwrap();
        assert_eq!(msg.as_meta(), Some(MetaMessage::Undefined(0x60, &[1, 2, 3])));
    }

    #[test]
    fn meta_field_ranges() {
        assert!(Message::from_meta(&MetaMessage::MidiChannel(16)).is_err());
        assert!(Message::from_meta(&MetaMessage::Tempo(0x100_0000)).is_err());
    }

    #[test]
    fn pitch_bend() {
        assert_eq!(PitchBend::default().raw(), 0x2000);
        let bend = PitchBend::new(-8192).unwrap();
        let msg = Message::pitch_bend(5, bend).unwrap();
        assert_eq!(msg.raw(), [0xE5, 0x00, 0x00]);
        let bend = PitchBend::new(8191).unwrap();
        let msg = Message::pitch_bend(5, bend).unwrap();
        assert_eq!(msg.raw(), [0xE5, 0x7F, 0x7F]);
        assert_eq!(
            msg.as_channel(),
            Some((5, ChannelMessage::PitchBend { bend }))
        );
        assert!(PitchBend::new(8192).is_err());
        assert!(PitchBend::from_raw(0x4000).is_err());
        assert_eq!(PitchBend::from_raw(0x3FFF).unwrap().value(), 8191);
    }

    #[test]
    fn note_helpers() {
        assert!(Message::note_on(0, 60, 1).unwrap().is_note_start());
        assert!(Message::note_on(0, 60, 0).unwrap().is_note_end());
        assert!(Message::note_off(0, 60, 64).unwrap().is_note_end());
        assert!(!Message::program_change(0, 1).unwrap().is_note_end());
        match Message::control_change(2, 64, 127).unwrap().kind() {
            MessageKind::Channel { channel, message } => {
                assert_eq!(channel, 2);
                assert_eq!(
                    message,
                    ChannelMessage::Controller {
                        controller: 64,
                        value: 127
                    }
                );
            }
            other => panic!("unexpected message kind {:?}", other),
        }
    }
}

mod playback {
    use super::*;
    use pretty_assertions::assert_eq;

    fn note(track: &mut Track, delta: u32, key: u8) {
        track.push(delta, Message::note_on(0, key, 100).unwrap()).unwrap();
    }

    #[test]
    fn merged_order() {
        let mut smf = Smf::new();
        let mut conductor = Track::new();
        conductor.push(0, Message::tempo(60.0).unwrap()).unwrap();
        note(&mut conductor, 960, 1);
        let mut lead = Track::new();
        note(&mut lead, 480, 2);
        note(&mut lead, 480, 3);
        smf.add_track(conductor).unwrap();
        smf.add_track(lead).unwrap();
        let events: Vec<(usize, u64, Duration)> = smf
            .timed_events()
            .map(|ev| (ev.track, ev.abs_ticks, ev.time))
            .collect();
        assert_eq!(
            events,
            [
                (0, 0, Duration::from_secs(0)),
                (1, 480, Duration::from_millis(500)),
                (0, 960, Duration::from_secs(1)),
                (1, 960, Duration::from_secs(1)),
            ]
        );
    }

    #[test]
    fn sequential_tracks_restart() {
        let mut smf = Smf::new();
        smf.set_format(Format::Sequential);
        let mut first = Track::new();
        first.push(0, Message::tempo(60.0).unwrap()).unwrap();
        note(&mut first, 960, 1);
        let mut second = Track::new();
        note(&mut second, 960, 2);
        smf.add_track(first).unwrap();
        smf.add_track(second).unwrap();
        let events: Vec<(usize, u64, Duration)> = smf
            .timed_events()
            .map(|ev| (ev.track, ev.abs_ticks, ev.time))
            .collect();
        assert_eq!(
            events,
            [
                (0, 0, Duration::from_secs(0)),
                (0, 960, Duration::from_secs(1)),
                (1, 960, Duration::from_millis(500)),
            ]
        );
    }

    #[test]
    fn duration_at_follows_tempo_map() {
        let smf = Smf::parse(&golden_file()).unwrap();
        assert_eq!(smf.duration_at(96), Duration::from_millis(500));
        assert_eq!(smf.duration_at(384), Duration::from_secs(2));
    }
}

#[cfg(feature = "std")]
mod files {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn write_then_read() {
        let smf = Smf::parse(&golden_file()).unwrap();
        let path = std::env::temp_dir().join(format!("smfcodec-test-{}.mid", std::process::id()));
        smf.write_file(&path).unwrap();
        let reread = Smf::read_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(reread, smf);
    }

    #[test]
    fn write_std() {
        let smf = Smf::parse(&golden_file()).unwrap();
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        assert_eq!(out, golden_file());
    }

    #[test]
    fn failed_write_leaves_target_alone() {
        let pid = std::process::id();
        let dir = std::env::temp_dir().join(format!("smfcodec-target-{}", pid));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("keep.mid"), b"original").unwrap();
        let smf = Smf::parse(&golden_file()).unwrap();
        let err = smf.write_file(&dir).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert_eq!(std::fs::read(dir.join("keep.mid")).unwrap(), b"original");
        let tmp = std::env::temp_dir().join(format!(".smfcodec-target-{}.{}.tmp", pid, pid));
        assert!(!tmp.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file() {
        let err = Smf::read_file("/nonexistent/smfcodec/file.mid").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io(std::io::ErrorKind::NotFound));
    }

    #[test]
    fn event_struct() {
        let ev = Event {
            delta: 5,
            message: Message::end_of_track(),
        };
        assert!(ev.message.is_end_of_track());
    }
}
