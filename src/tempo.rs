//! Conversions between MIDI ticks and wall-clock time.
//!
//! Durations are computed in floating point microseconds and rounded once, to the nearest
//! microsecond (or tick), halves away from zero.

use crate::{
    message::Message,
    prelude::*,
    primitive::round_u64,
    smf::{Event, Format, Smf, Timing, Track},
};
use alloc::collections::BinaryHeap;
use core::cmp::Reverse;

/// The tempo assumed before the first tempo change, in beats per minute.
pub const DEFAULT_BPM: f64 = 120.0;

/// The ticks per quarter note assumed when a file declares a resolution of zero.
pub const DEFAULT_RESOLUTION: u16 = 960;

/// Microseconds taken by `ticks` at `bpm` with `res` ticks per quarter note.
#[inline]
fn span_micros(res: u16, bpm: f64, ticks: f64) -> f64 {
    60_000_000.0 * ticks / (bpm * res as f64)
}

fn check_bpm(bpm: f64) -> Result<()> {
    ensure!(
        bpm.is_finite() && bpm > 0.0,
        err_range!("bpm must be finite and positive")
    );
    Ok(())
}

/// Metrical timing: the amount of ticks in a quarter note.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct MetricTicks(u16);
impl MetricTicks {
    /// Wrap a raw resolution as found in the header. A value of `0` stands for
    /// [`DEFAULT_RESOLUTION`](constant.DEFAULT_RESOLUTION.html).
    #[inline]
    pub const fn new(raw: u16) -> MetricTicks {
        MetricTicks(raw)
    }

    /// The raw value, as written in the header.
    #[inline]
    pub fn raw(self) -> u16 {
        self.0
    }

    /// The effective ticks per quarter note.
    #[inline]
    pub fn resolution(self) -> u16 {
        if self.0 == 0 {
            DEFAULT_RESOLUTION
        } else {
            self.0
        }
    }

    /// The ticks in `num / den` of a whole note, rounded to the nearest tick.
    ///
    /// For example `ticks_for(1, 4)` is a quarter note and `ticks_for(3, 8)` a dotted quarter.
    pub fn ticks_for(self, num: u32, den: u32) -> Result<u32> {
        ensure!(den != 0, err_range!("note fraction with zero denominator"));
        let whole = 4 * self.resolution() as u64 * num as u64;
        let ticks = (2 * whole + den as u64) / (2 * den as u64);
        u32::try_from(ticks).map_err(|_| err_range!("note fraction exceeds 32 bits").into())
    }

    #[inline]
    pub fn quarter(self) -> u32 {
        self.resolution() as u32
    }

    #[inline]
    pub fn eighth(self) -> u32 {
        (self.resolution() as u32 + 1) / 2
    }

    #[inline]
    pub fn sixteenth(self) -> u32 {
        (self.resolution() as u32 + 2) / 4
    }

    /// The wall-clock duration of `ticks` at a constant tempo.
    pub fn duration(self, bpm: f64, ticks: u32) -> Result<Duration> {
        check_bpm(bpm)?;
        let micros = span_micros(self.resolution(), bpm, ticks as f64);
        Ok(Duration::from_micros(round_u64(micros)))
    }

    /// The amount of ticks in `duration` at a constant tempo. Inverse of
    /// [`duration`](#method.duration), up to rounding.
    pub fn ticks(self, bpm: f64, duration: Duration) -> Result<u32> {
        check_bpm(bpm)?;
        let micros = duration.as_secs_f64() * 1e6;
        let ticks = micros * bpm * self.resolution() as f64 / 60_000_000.0;
        u32::try_from(round_u64(ticks))
            .map_err(|_| err_range!("tick count exceeds 32 bits").into())
    }
}
impl Default for MetricTicks {
    fn default() -> MetricTicks {
        MetricTicks(DEFAULT_RESOLUTION)
    }
}

/// One of the four frame rates available for SMPTE times, as defined by the MIDI standard.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Fps {
    /// 24 frames per second.
    Fps24,
    /// 25 frames per second.
    Fps25,
    /// Actually `29.97 = 30 / 1.001` frames per second (drop-frame).
    Fps29,
    /// 30 frames per second.
    Fps30,
}
impl Fps {
    /// Convert the 2-bit code used by SMPTE offset meta messages.
    pub(crate) fn from_code(code: u8) -> Fps {
        match code & 0b11 {
            0 => Fps::Fps24,
            1 => Fps::Fps25,
            2 => Fps::Fps29,
            _ => Fps::Fps30,
        }
    }

    pub(crate) fn as_code(self) -> u8 {
        match self {
            Fps::Fps24 => 0,
            Fps::Fps25 => 1,
            Fps::Fps29 => 2,
            Fps::Fps30 => 3,
        }
    }

    /// Converts the nominal frame rate into an `Fps` value (ie. `24` -> `Fps24`).
    #[inline]
    pub fn from_int(raw: u8) -> Option<Fps> {
        Some(match raw {
            24 => Fps::Fps24,
            25 => Fps::Fps25,
            29 => Fps::Fps29,
            30 => Fps::Fps30,
            _ => return None,
        })
    }

    /// The nominal frame rate, as stored in files.
    #[inline]
    pub fn as_int(self) -> u8 {
        match self {
            Fps::Fps24 => 24,
            Fps::Fps25 => 25,
            Fps::Fps29 => 29,
            Fps::Fps30 => 30,
        }
    }

    /// The actual frame rate.
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Fps::Fps24 => 24.0,
            Fps::Fps25 => 25.0,
            Fps::Fps29 => 30.0 / 1.001,
            Fps::Fps30 => 30.0,
        }
    }
}

/// Timecode timing: every second is split into frames, and every frame into subframes (ticks).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct TimeCode {
    fps: Fps,
    subframes: u8,
}
impl TimeCode {
    /// `subframes` is the amount of ticks per frame, and cannot be zero.
    pub fn new(fps: Fps, subframes: u8) -> Result<TimeCode> {
        ensure!(subframes != 0, err_range!("zero subframes per frame"));
        Ok(TimeCode { fps, subframes })
    }

    #[inline]
    pub fn fps(self) -> Fps {
        self.fps
    }

    #[inline]
    pub fn subframes(self) -> u8 {
        self.subframes
    }

    fn ticks_per_second(self) -> f64 {
        self.fps.as_f64() * self.subframes as f64
    }

    /// The wall-clock duration of `ticks`. Tempo changes do not apply to timecode timing.
    pub fn duration(self, ticks: u64) -> Duration {
        Duration::from_micros(round_u64(ticks as f64 * 1e6 / self.ticks_per_second()))
    }

    /// The amount of ticks in `duration`, rounded to the nearest tick.
    pub fn ticks(self, duration: Duration) -> u64 {
        round_u64(duration.as_secs_f64() * self.ticks_per_second())
    }
}

/// A change of tempo at an absolute tick position.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct TempoChange {
    /// Ticks since the start of the track the change was found in.
    pub abs_ticks: i64,
    /// The new tempo, in beats per minute.
    pub bpm: f64,
}

/// A tempo map: tempo changes sorted by absolute tick.
///
/// Lookups use the last change at or before the queried tick, and
/// [`DEFAULT_BPM`](constant.DEFAULT_BPM.html) before the first change.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct TempoChanges {
    changes: Vec<TempoChange>,
}
impl TempoChanges {
    #[inline]
    pub fn new() -> TempoChanges {
        TempoChanges::default()
    }

    #[inline]
    pub fn as_slice(&self) -> &[TempoChange] {
        &self.changes
    }

    #[inline]
    pub fn iter(&self) -> core::slice::Iter<TempoChange> {
        self.changes.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    /// The tempo in effect at `abs_ticks`.
    pub fn bpm_at(&self, abs_ticks: i64) -> f64 {
        let idx = self.changes.partition_point(|c| c.abs_ticks <= abs_ticks);
        match idx {
            0 => DEFAULT_BPM,
            idx => self.changes[idx - 1].bpm,
        }
    }

    /// Insert a tempo change, after any existing change at the same tick.
    ///
    /// `bpm` must be finite and positive.
    pub fn insert(&mut self, abs_ticks: i64, bpm: f64) -> Result<()> {
        check_bpm(bpm)?;
        let idx = self.changes.partition_point(|c| c.abs_ticks <= abs_ticks);
        self.changes.insert(idx, TempoChange { abs_ticks, bpm });
        Ok(())
    }

    /// Append without keeping the order. `sort` must be called afterwards.
    pub(crate) fn push_unsorted(&mut self, change: TempoChange) {
        self.changes.push(change);
    }

    /// Stable sort, keeping changes at the same tick in the order they were found.
    pub(crate) fn sort(&mut self) {
        self.changes.sort_by_key(|c| c.abs_ticks);
    }

    /// The wall-clock time from tick 0 to `abs_ticks`, going through every tempo change on the
    /// way. Negative ticks give a zero duration.
    pub fn duration_at(&self, res: MetricTicks, abs_ticks: i64) -> Duration {
        if abs_ticks <= 0 {
            return Duration::from_secs(0);
        }
        let mut clock = Clock::new(Timing::Metrical(res), Some(&self.changes));
        clock.advance(abs_ticks as u64)
    }

    /// The absolute tick reached after `duration` of wall-clock time from tick 0. Inverse of
    /// [`duration_at`](#method.duration_at), up to rounding.
    pub fn ticks_at(&self, res: MetricTicks, duration: Duration) -> i64 {
        let res = res.resolution();
        let target = duration.as_secs_f64() * 1e6;
        let mut bpm = DEFAULT_BPM;
        let mut tick = 0;
        let mut micros = 0.0;
        for change in self.changes.iter() {
            let at = change.abs_ticks.max(0);
            if at > tick {
                let span = span_micros(res, bpm, (at - tick) as f64);
                if micros + span >= target {
                    break;
                }
                micros += span;
                tick = at;
            }
            bpm = change.bpm;
        }
        let left = (target - micros) * bpm * res as f64 / 60_000_000.0;
        //Huge durations saturate instead of wrapping around
        let left = i64::try_from(round_u64(left)).unwrap_or(i64::MAX);
        tick.saturating_add(left)
    }
}
impl<'a> IntoIterator for &'a TempoChanges {
    type Item = &'a TempoChange;
    type IntoIter = core::slice::Iter<'a, TempoChange>;
    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Accumulates wall-clock time over monotonically increasing ticks.
///
/// With a tempo map, tempo changes are taken from it. Without one, the clock follows the tempo
/// messages it is shown through `observe`.
struct Clock<'a> {
    timing: Timing,
    map: Option<&'a [TempoChange]>,
    next_change: usize,
    bpm: f64,
    tick: u64,
    micros: f64,
}
impl<'a> Clock<'a> {
    fn new(timing: Timing, map: Option<&'a [TempoChange]>) -> Clock<'a> {
        Clock {
            timing,
            map,
            next_change: 0,
            bpm: DEFAULT_BPM,
            tick: 0,
            micros: 0.0,
        }
    }

    fn restart(&mut self) {
        self.next_change = 0;
        self.bpm = DEFAULT_BPM;
        self.tick = 0;
        self.micros = 0.0;
    }

    fn advance(&mut self, to: u64) -> Duration {
        let res = match self.timing {
            Timing::Metrical(res) => res.resolution(),
            Timing::Timecode(tc) => return tc.duration(to),
        };
        if let Some(map) = self.map {
            while let Some(change) = map.get(self.next_change) {
                if change.abs_ticks > to as i64 {
                    break;
                }
                let at = change.abs_ticks.max(0) as u64;
                if at > self.tick {
                    self.micros += span_micros(res, self.bpm, (at - self.tick) as f64);
                    self.tick = at;
                }
                self.bpm = change.bpm;
                self.next_change += 1;
            }
        }
        if to > self.tick {
            self.micros += span_micros(res, self.bpm, (to - self.tick) as f64);
            self.tick = to;
        }
        Duration::from_micros(round_u64(self.micros))
    }

    fn observe(&mut self, msg: &Message) {
        if self.map.is_none() {
            if let Some(bpm) = msg.tempo_bpm() {
                self.bpm = bpm;
            }
        }
    }
}

/// An event along with its position in the whole file.
#[derive(Copy, Clone, Debug)]
pub struct TimedEvent<'a> {
    /// The index of the track the event belongs to.
    pub track: usize,
    /// Ticks since the start of the track (since the start of the file, unless it is a
    /// `Format::Sequential` file).
    pub abs_ticks: u64,
    /// Wall-clock offset matching `abs_ticks`.
    pub time: Duration,
    /// The event itself.
    pub event: &'a Event,
}

/// Iterates over the events of a whole file in playback order.
///
/// Created by [`Smf::timed_events`](struct.Smf.html#method.timed_events).
pub struct TimedEvents<'a> {
    order: Order<'a>,
    clock: Clock<'a>,
}

enum Order<'a> {
    /// Tracks play together: merge them by absolute tick, ties resolved by track index.
    Merged {
        tracks: &'a [Track],
        cursors: Vec<usize>,
        heap: BinaryHeap<Reverse<(u64, usize)>>,
    },
    /// Tracks play one after the other, each starting from tick 0.
    Sequential {
        tracks: &'a [Track],
        track: usize,
        event: usize,
        tick: u64,
    },
}

impl<'a> TimedEvents<'a> {
    pub(crate) fn new(smf: &'a Smf) -> TimedEvents<'a> {
        let tracks = smf.tracks();
        match smf.format() {
            Format::SingleTrack | Format::Parallel => {
                let mut heap = BinaryHeap::with_capacity(tracks.len());
                for (idx, track) in tracks.iter().enumerate() {
                    if let Some(first) = track.events().first() {
                        heap.push(Reverse((first.delta as u64, idx)));
                    }
                }
                TimedEvents {
                    order: Order::Merged {
                        tracks,
                        cursors: vec![0; tracks.len()],
                        heap,
                    },
                    clock: Clock::new(smf.timing(), Some(smf.tempo_changes().as_slice())),
                }
            }
            Format::Sequential => TimedEvents {
                order: Order::Sequential {
                    tracks,
                    track: 0,
                    event: 0,
                    tick: 0,
                },
                clock: Clock::new(smf.timing(), None),
            },
        }
    }
}
impl<'a> Iterator for TimedEvents<'a> {
    type Item = TimedEvent<'a>;
    fn next(&mut self) -> Option<TimedEvent<'a>> {
        let (track, abs_ticks, event) = match &mut self.order {
            Order::Merged {
                tracks,
                cursors,
                heap,
            } => {
                let tracks: &'a [Track] = *tracks;
                let Reverse((tick, track)) = heap.pop()?;
                let events = tracks[track].events();
                let event = &events[cursors[track]];
                cursors[track] += 1;
                if let Some(next) = events.get(cursors[track]) {
                    heap.push(Reverse((tick + next.delta as u64, track)));
                }
                (track, tick, event)
            }
            Order::Sequential {
                tracks,
                track,
                event,
                tick,
            } => loop {
                let all: &'a [Track] = *tracks;
                let events = all.get(*track)?.events();
                match events.get(*event) {
                    Some(ev) => {
                        *event += 1;
                        *tick += ev.delta as u64;
                        break (*track, *tick, ev);
                    }
                    None => {
                        *track += 1;
                        *event = 0;
                        *tick = 0;
                        self.clock.restart();
                    }
                }
            },
        };
        let time = self.clock.advance(abs_ticks);
        self.clock.observe(&event.message);
        Some(TimedEvent {
            track,
            abs_ticks,
            time,
            event,
        })
    }
}
