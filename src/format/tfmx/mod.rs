pub mod load;
mod fingerprint;
#[cfg(test)]
pub mod fixture;

pub use self::load::*;
pub use self::fingerprint::Quirks;

use module::{Sample, Word};
use util::BinaryRead;

pub const NUM_SONGS    : usize = 32;
pub const HEADER_SIZE  : usize = 0x200;
pub const MAX_MUSIC_LEN: usize = 0xfffc;
pub const MAX_MACROS   : usize = 128;
pub const MAX_PATTERNS : usize = 128;

pub const TRACK_CMD    : u16 = 0xeffe;


/// One 16-byte track step: either eight (pattern, transpose) pairs or a
/// command record starting with `TRACK_CMD`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackStep(pub [u16; 8]);

impl TrackStep {
    pub fn is_command(&self) -> bool {
        self.0[0] == TRACK_CMD
    }

    pub fn command(&self) -> u16 {
        self.0[1]
    }

    pub fn arg(&self, i: usize) -> u16 {
        self.0[2 + i]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubSong {
    pub start: u16,
    pub end  : u16,
    pub tempo: u16,
}


/// The fixed-up module store. Track steps and the pattern and macro pointer
/// tables are decoded into owned tables at load time; the music data itself
/// (pattern and macro streams) is kept as read, plus the end sentinel.
#[derive(Debug)]
pub struct TfmxData {
    pub comment      : Vec<String>,
    pub song_start   : [u16; NUM_SONGS],
    pub song_end     : [u16; NUM_SONGS],
    pub tempo        : [u16; NUM_SONGS],
    pub track_start  : usize,
    pub pattern_start: usize,
    pub macro_start  : usize,
    pub track_steps  : Vec<TrackStep>,
    pub patterns     : Vec<u32>,
    pub macros       : Vec<u32>,
    pub music_len    : usize,
    pub quirks       : Quirks,
    pub samples      : Sample,
    music            : Vec<u8>,
}

impl TfmxData {
    pub fn num_track_steps(&self) -> usize {
        self.track_steps.len()
    }

    pub fn num_patterns(&self) -> usize {
        self.patterns.len()
    }

    pub fn num_macros(&self) -> usize {
        self.macros.len()
    }

    pub fn music(&self) -> &[u8] {
        &self.music
    }

    /// Track step at `pos`. Positions past the decoded table are read from
    /// the music data, as songs may run into it.
    pub fn track_step(&self, pos: u16) -> Option<TrackStep> {
        if let Some(step) = self.track_steps.get(pos as usize) {
            return Some(*step)
        }

        let ofs = self.track_start + pos as usize * 16;
        let mut step = TrackStep::default();
        for j in 0..8 {
            step.0[j] = (&self.music[..]).read16b(ofs + j * 2).ok()?;
        }
        Some(step)
    }

    pub fn pattern(&self, num: u8) -> Option<u32> {
        self.patterns.get(num as usize).cloned()
    }

    pub fn macro_ptr(&self, num: u8) -> Option<u32> {
        self.macros.get(num as usize).cloned()
    }

    /// Instruction `step` of the stream at `ofs` in the music data.
    pub fn word(&self, ofs: u32, step: u16) -> Option<Word> {
        let pos = ofs as usize + step as usize * 4;
        (&self.music[..]).read32b(pos).ok().map(Word)
    }

    pub fn sub_song(&self, num: usize) -> Option<SubSong> {
        if num >= NUM_SONGS {
            return None
        }
        Some(SubSong {
            start: self.song_start[num],
            end  : self.song_end[num],
            tempo: self.tempo[num],
        })
    }

    /// Number of sub-songs defined in the song tables.
    pub fn sub_songs(&self) -> usize {
        let mut song_num: isize = -1;
        let mut zeros = 2;

        let mut i = 0;
        while i < NUM_SONGS && zeros > 0 {
            song_num += 1;
            let start = self.song_start[i];
            let end = self.song_end[i];

            if start == 0 {
                zeros -= 1;
            }

            if start == 0x1ff || end == 0x1ff {
                break
            }

            // Single sub-song modules with garbage after the first entry
            if start as usize >= self.num_track_steps() {
                break
            }

            let next = if i + 1 < NUM_SONGS { self.song_start[i + 1] } else { 0 };
            if start == end && start == 0 && next == 0 {
                break
            }

            i += 1;
        }

        if song_num <= 0 { 1 } else { song_num as usize }
    }
}
