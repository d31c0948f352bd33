//! Speech priority queue and byte streamer

// SPDX-FileCopyrightText: © 2025 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use crate::driver_constants::SPEECH_QUEUE_CAPACITY;
use crate::engine::SoundEngine;
use crate::hardware::SoundHardware;

/// 8-entry circular queue of pending music/speech parameters with a single
/// current-priority slot.
pub(crate) struct SpeechQueue {
    entries: [u8; SPEECH_QUEUE_CAPACITY],
    read: u8,
    write: u8,
    current_priority: u8,
}

impl SpeechQueue {
    pub fn new() -> Self {
        Self {
            entries: [0; SPEECH_QUEUE_CAPACITY],
            read: 0,
            write: 0,
            current_priority: 0,
        }
    }

    pub fn len(&self) -> usize {
        usize::from(self.write.wrapping_sub(self.read)) % SPEECH_QUEUE_CAPACITY
    }

    pub fn current_priority(&self) -> u8 {
        self.current_priority
    }

    pub fn set_current_priority(&mut self, priority: u8) {
        self.current_priority = priority;
    }

    /// Lower priority than the current playback is dropped, equal appends,
    /// higher flushes the queued entries (playback itself continues).
    pub fn enqueue(&mut self, param: u8, priority: u8) {
        use std::cmp::Ordering;

        match priority.cmp(&self.current_priority) {
            Ordering::Less => return,
            Ordering::Equal => (),
            Ordering::Greater => {
                self.read = self.write;
                self.current_priority = priority;
            }
        }

        if self.len() == SPEECH_QUEUE_CAPACITY - 1 {
            // Full: the new entry is lost.
            return;
        }

        self.entries[usize::from(self.write)] = param;
        self.write = self.write.wrapping_add(1) % SPEECH_QUEUE_CAPACITY as u8;
    }

    pub fn dequeue(&mut self) -> Option<u8> {
        if self.read == self.write {
            return None;
        }
        let param = self.entries[usize::from(self.read)];
        self.read = self.read.wrapping_add(1) % SPEECH_QUEUE_CAPACITY as u8;
        Some(param)
    }

    pub fn clear(&mut self) {
        self.read = self.write;
        self.current_priority = 0;
    }
}

/// Shared music/speech playback state: one sequence pointer, length counter
/// and active flag, streamed byte-per-ready to the speech sink.
pub(crate) struct Playback {
    pub ptr: u16,
    pub remaining: u16,
    pub active: bool,
}

impl Playback {
    pub fn new() -> Self {
        Self {
            ptr: 0,
            remaining: 0,
            active: false,
        }
    }
}

impl SoundEngine {
    /// Begins playback of a music/speech command parameter.
    pub(crate) fn start_playback<H: SoundHardware>(&mut self, param: u8, hw: &mut H) {
        let index = self.rom.music_index(param);
        let flags = self.rom.music_flags(param);

        let ptr = self.rom.music_seq_ptr(index);
        let len = self.rom.music_seq_len(index);

        if len == 0 || !self.rom.contains(ptr) {
            return;
        }

        // Special mode: retune the LPC oscillator before the stream starts.
        if flags & 0x80 != 0 {
            hw.speech_pitch(self.rom.music_tempo(param));
        }

        self.playback.ptr = ptr;
        self.playback.remaining = len;
        self.playback.active = true;
        self.speech_queue.set_current_priority(flags & 0x0f);
    }

    /// One streamer service: runs four times per tick (~960 Hz).
    pub(crate) fn speech_update<H: SoundHardware>(&mut self, hw: &mut H) {
        if !self.playback.active {
            match self.speech_queue.dequeue() {
                Some(param) => self.start_playback(param, hw),
                None => self.speech_queue.set_current_priority(0),
            }
            if !self.playback.active {
                return;
            }
        }

        if !hw.speech_ready() {
            return;
        }

        let byte = self.rom.read_byte(self.playback.ptr);
        hw.speech_write(byte);

        self.playback.ptr = self.playback.ptr.wrapping_add(1);
        self.playback.remaining -= 1;

        if self.playback.remaining == 0 {
            self.playback.active = false;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_queue_occupancy() {
        let mut q = SpeechQueue::new();
        q.set_current_priority(5);

        q.enqueue(1, 5);
        q.enqueue(2, 5);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_lower_priority_is_dropped() {
        let mut q = SpeechQueue::new();
        q.set_current_priority(8);

        q.enqueue(1, 3);
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_higher_priority_flushes_queue() {
        let mut q = SpeechQueue::new();
        q.set_current_priority(4);

        q.enqueue(1, 4);
        q.enqueue(2, 4);
        q.enqueue(9, 7);

        assert_eq!(q.current_priority(), 7);
        assert_eq!(q.dequeue(), Some(9));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_full_queue_drops_newest_at_equal_priority() {
        let mut q = SpeechQueue::new();
        q.set_current_priority(1);

        for i in 0..10 {
            q.enqueue(i, 1);
        }
        assert_eq!(q.len(), SPEECH_QUEUE_CAPACITY - 1);
        assert_eq!(q.dequeue(), Some(0));
    }
}
