//! Synthetic TFMX modules for unit tests.

use byteorder::{ByteOrder, BigEndian};
use format;
use format::tfmx::{HEADER_SIZE, NUM_SONGS};
use module::Module;

// Table layout inside the music data
const PATTERN_TABLE: usize = 0x000;
const MACRO_TABLE  : usize = 0x200;
const TRACK_TABLE  : usize = 0x400;


pub struct ModuleBuilder {
    magic      : Vec<u8>,
    song_start : [u16; NUM_SONGS],
    song_end   : [u16; NUM_SONGS],
    tempo      : [u16; NUM_SONGS],
    track_steps: Vec<[u16; 8]>,
    patterns   : Vec<Vec<u32>>,
    macros     : Vec<Vec<u32>>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder {
            magic      : b"TFMX-SONG ".to_vec(),
            song_start : [0; NUM_SONGS],
            song_end   : [0; NUM_SONGS],
            tempo      : [0; NUM_SONGS],
            track_steps: Vec::new(),
            patterns   : Vec::new(),
            macros     : Vec::new(),
        }
    }

    pub fn magic(&mut self, m: &[u8]) -> &mut Self {
        self.magic = m.to_vec();
        self
    }

    pub fn song(&mut self, num: usize, start: u16, end: u16, tempo: u16) -> &mut Self {
        self.song_start[num] = start;
        self.song_end[num] = end;
        self.tempo[num] = tempo;
        self
    }

    pub fn track_step(&mut self, step: &[u16]) -> &mut Self {
        let mut s = [0; 8];
        s[..step.len()].copy_from_slice(step);
        self.track_steps.push(s);
        self
    }

    pub fn pattern(&mut self, words: &[u32]) -> &mut Self {
        self.patterns.push(words.to_vec());
        self
    }

    pub fn macro_(&mut self, words: &[u32]) -> &mut Self {
        self.macros.push(words.to_vec());
        self
    }

    pub fn macro_table_offset(&self) -> usize {
        MACRO_TABLE
    }

    fn music(&self) -> Vec<u8> {
        let mut music = vec![0; TRACK_TABLE];

        for step in &self.track_steps {
            for v in step.iter() {
                push16(&mut music, *v);
            }
        }

        for (i, pat) in self.patterns.iter().enumerate() {
            let ofs = music.len();
            BigEndian::write_u32(&mut music[PATTERN_TABLE + i * 4..], (ofs + HEADER_SIZE) as u32);
            for w in pat {
                push32(&mut music, *w);
            }
        }

        for (i, mac) in self.macros.iter().enumerate() {
            let ofs = music.len();
            BigEndian::write_u32(&mut music[MACRO_TABLE + i * 4..], (ofs + HEADER_SIZE) as u32);
            for w in mac {
                push32(&mut music, *w);
            }
        }

        music
    }

    fn header(&self) -> Vec<u8> {
        let mut h = vec![0; HEADER_SIZE];
        let n = self.magic.len().min(16);
        h[..n].copy_from_slice(&self.magic[..n]);

        let title = b"synthetic test module";
        h[0x10..0x10 + title.len()].copy_from_slice(title);

        for i in 0..NUM_SONGS {
            BigEndian::write_u16(&mut h[0x100 + i * 2..], self.song_start[i]);
            BigEndian::write_u16(&mut h[0x140 + i * 2..], self.song_end[i]);
            BigEndian::write_u16(&mut h[0x180 + i * 2..], self.tempo[i]);
        }

        BigEndian::write_u32(&mut h[0x1d0..], (TRACK_TABLE + HEADER_SIZE) as u32);
        BigEndian::write_u32(&mut h[0x1d4..], (PATTERN_TABLE + HEADER_SIZE) as u32);
        BigEndian::write_u32(&mut h[0x1d8..], (MACRO_TABLE + HEADER_SIZE) as u32);
        h
    }

    /// Music file of a two-file module.
    pub fn build(&self) -> Vec<u8> {
        let mut b = self.header();
        b.extend(self.music());
        b
    }

    /// Single-file module with a TFHD header of the given type.
    pub fn build_single(&self, smpl: &[u8], typ: u8) -> Vec<u8> {
        let mdat = self.build();
        let mut b = vec![0; 0x20];
        b[..4].copy_from_slice(b"TFHD");
        BigEndian::write_u32(&mut b[4..], 0x20);
        b[8] = typ;
        BigEndian::write_u32(&mut b[10..], mdat.len() as u32);
        BigEndian::write_u32(&mut b[14..], smpl.len() as u32);
        b.extend(mdat);
        b.extend(smpl);
        b
    }

    pub fn load(&self, smpl: &[u8]) -> Module {
        format::load(&self.build(), Some(smpl)).unwrap()
    }
}

fn push16(v: &mut Vec<u8>, x: u16) {
    let mut b = [0; 2];
    BigEndian::write_u16(&mut b, x);
    v.extend(&b);
}

fn push32(v: &mut Vec<u8>, x: u32) {
    let mut b = [0; 4];
    BigEndian::write_u32(&mut b, x);
    v.extend(&b);
}
