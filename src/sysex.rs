//! System exclusive packets and their continuation rules.
//!
//! A sysex message may be split into several packets: the first one is introduced by `0xF0` and
//! does not end with `0xF7`, and the following ones are introduced by `0xF7` until one of them
//! ends with `0xF7`. An `0xF7` packet outside of such a sequence is an escape, arbitrary bytes
//! meant to be sent as-is.

use crate::{
    message::{Message, MessageKind},
    prelude::*,
};

/// The role of a sysex or escape packet within its track.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum SysexPacket {
    /// An `0xF0` packet ending with `0xF7`, a whole message on its own.
    Complete,
    /// An `0xF0` packet that does not end with `0xF7`, the first of a split message.
    Start,
    /// An `0xF7` packet inside a split message that does not end it.
    Continuation,
    /// The `0xF7` packet ending a split message.
    End,
    /// An `0xF7` packet outside of a split message.
    Escape,
}

/// The per-track continuation flag.
///
/// Reset at the start of every track.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct SysexState {
    in_sequence: bool,
}
impl SysexState {
    #[inline]
    pub fn new() -> SysexState {
        SysexState::default()
    }

    /// Whether a split sysex message is waiting for more packets.
    #[inline]
    pub fn in_sequence(&self) -> bool {
        self.in_sequence
    }

    /// Classify a packet and update the flag.
    ///
    /// `status` is the packet prefix: `0xF0` opens a packet, anything else is treated as `0xF7`.
    /// An `0xF0` packet arriving while a sequence is open abandons it and starts over.
    pub fn feed(&mut self, status: u8, payload: &[u8]) -> SysexPacket {
        let terminated = payload.last() == Some(&0xF7);
        if status == 0xF0 {
            self.in_sequence = !terminated;
            if terminated {
                SysexPacket::Complete
            } else {
                SysexPacket::Start
            }
        } else if self.in_sequence {
            if terminated {
                self.in_sequence = false;
                SysexPacket::End
            } else {
                SysexPacket::Continuation
            }
        } else {
            SysexPacket::Escape
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.in_sequence = false;
    }
}

/// A logical sysex message, reassembled from one or more packets.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct SysexMessage {
    /// The concatenated packet payloads, without the final `0xF7` terminator.
    pub data: Vec<u8>,
    /// How many packets made up this message.
    pub packets: usize,
    /// Whether the message ended with an `0xF7` terminator.
    pub terminated: bool,
}

/// Replay the continuation rules over the messages of a track and collect the logical sysex
/// messages. Escapes and non-sysex messages are ignored.
pub(crate) fn reassemble<'a>(
    messages: impl IntoIterator<Item = &'a Message>,
) -> Vec<SysexMessage> {
    let mut state = SysexState::new();
    let mut done = Vec::new();
    let mut open: Option<SysexMessage> = None;
    for msg in messages {
        let (status, payload) = match msg.kind() {
            MessageKind::SysEx(payload) => (0xF0, payload),
            MessageKind::Escape(payload) => (0xF7, payload),
            _ => continue,
        };
        match state.feed(status, payload) {
            SysexPacket::Complete | SysexPacket::Start => {
                if let Some(abandoned) = open.take() {
                    done.push(abandoned);
                }
                let mut started = SysexMessage {
                    data: Vec::with_capacity(payload.len()),
                    packets: 0,
                    terminated: false,
                };
                append(&mut started, payload);
                if state.in_sequence() {
                    open = Some(started);
                } else {
                    done.push(started);
                }
            }
            SysexPacket::Continuation | SysexPacket::End => {
                if let Some(msg) = open.as_mut() {
                    append(msg, payload);
                }
                if !state.in_sequence() {
                    if let Some(msg) = open.take() {
                        done.push(msg);
                    }
                }
            }
            SysexPacket::Escape => {}
        }
    }
    if let Some(unterminated) = open {
        done.push(unterminated);
    }
    done
}

fn append(msg: &mut SysexMessage, payload: &[u8]) {
    msg.packets += 1;
    match payload.split_last() {
        Some((&0xF7, body)) => {
            msg.data.extend_from_slice(body);
            msg.terminated = true;
        }
        _ => msg.data.extend_from_slice(payload),
    }
}
