use std::cmp;
use module::Sample;
use ::*;

const LIM16_HI: i32 = 32767;
const LIM16_LO: i32 = -32768;

// Phase accumulator fraction bits
const PHASE_SHIFT: u32 = 14;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Pan {
    Left,
    Right,
}

lazy_static! {
    static ref PAN4: Box<[Pan; 4]> = Box::new([
        Pan::Left, Pan::Right, Pan::Right, Pan::Left
    ]);

    static ref PAN7: Box<[Pan; 7]> = Box::new([
        Pan::Left, Pan::Right, Pan::Right, Pan::Left, Pan::Right, Pan::Right, Pan::Left
    ]);
}


/// What a voice does when its phase runs past the end of the loop region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoopMode {
    /// Keep playing from the loop start.
    Normal,
    /// Keep playing, counting wraps down; on the wrap after the count reaches
    /// zero the paired channel is told to resume its macro.
    ArmOnCount(u16),
}

impl Default for LoopMode {
    fn default() -> Self {
        LoopMode::Normal
    }
}


/// The playback registers of one Paula-like voice.
#[derive(Clone, Debug, Default)]
pub struct HardwareVoice {
    pub mode         : u8,
    pub sample_start : i32,
    pub sample_length: u16,
    pub sbeg         : i32,
    pub slen         : u16,
    pub pos          : u32,
    pub delta        : u32,
    pub vol          : u8,
    pub loop_mode    : LoopMode,
}

impl HardwareVoice {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    // Returns true if a wait-on-DMA count expired at this wrap.
    fn wrap(&mut self) -> bool {
        match self.loop_mode {
            LoopMode::Normal        => false,
            LoopMode::ArmOnCount(0) => {
                self.loop_mode = LoopMode::Normal;
                true
            }
            LoopMode::ArmOnCount(n) => {
                self.loop_mode = LoopMode::ArmOnCount(n - 1);
                false
            }
        }
    }

    /// Render `out.len()` frames of this voice into `out`. Returns true if a
    /// wait-on-DMA count expired during this call.
    pub fn mix(&mut self, sample: &Sample, out: &mut [i32]) -> bool {
        let smp_len = sample.len() as i64;
        let mut fired = false;

        if self.sample_start < 0 || self.sbeg < 0 {
            return false
        }

        if self.sample_start as i64 >= smp_len || self.sbeg as i64 >= smp_len {
            return false
        }

        let mut p = self.sbeg;
        let mut ps = self.pos;
        let mut d = self.delta;
        let mut l = (self.slen as u32) << PHASE_SHIFT;
        let v = cmp::min(self.vol as i32, 0x40);

        if self.mode & 1 == 0 || l < 0x10000 {
            return false
        }

        if self.mode & 3 == 1 {
            self.sbeg = self.sample_start;
            self.slen = self.sample_length;
            p = self.sbeg;
            l = (self.slen as u32) << PHASE_SHIFT;
            ps = 0;
            self.mode |= 2;
        }

        for x in out.iter_mut() {
            ps = ps.wrapping_add(d);
            let ofs = p as i64 + (ps >> PHASE_SHIFT) as i64;
            *x = if ofs >= smp_len {
                0
            } else {
                sample.get(ofs as usize) as i32 * v * 4
            };

            if ps < l {
                continue
            }

            ps -= l;
            p = self.sample_start;
            self.slen = self.sample_length;
            l = (self.slen as u32) << PHASE_SHIFT;

            if l < 0x10000 {
                self.slen = 0;
                ps = 0;
                d = 0;
                p = 0;
                break
            }

            fired |= self.wrap();
        }

        self.sbeg = p;
        self.pos = ps;
        self.delta = d;

        if self.mode & 4 != 0 {
            self.mode = 0;
        }

        fired
    }
}


/// Renders the hardware voices of one replay tick into per-channel 16-bit
/// buffers, and downmixes them to interleaved stereo.
pub struct Mixer {
    pub rate : u32,
    framesize: usize,
    buf32    : Vec<Vec<i32>>,
    channels : Vec<Vec<i16>>,
    buffer   : Vec<i16>,
    num_chn  : usize,
}

impl Mixer {
    pub fn new(rate: u32) -> Self {
        Mixer {
            rate,
            framesize: 0,
            buf32    : vec![Vec::new(); MAX_CHANNELS],
            channels : vec![Vec::new(); MAX_CHANNELS],
            buffer   : Vec::new(),
            num_chn  : 4,
        }
    }

    /// Mix `n` frames. In multi mode voices 4-7 feed output channels 3-6 and
    /// voice 3 is not heard; otherwise voice 3 feeds channel 3. Returns the
    /// voices whose wait-on-DMA count expired.
    pub fn mix(&mut self, hdb: &mut [HardwareVoice; NUM_VOICES], sample: &Sample, multi_mode: bool, n: usize) -> [bool; NUM_VOICES] {
        let mut fired = [false; NUM_VOICES];

        self.framesize = n;
        self.num_chn = if multi_mode { MAX_CHANNELS } else { 4 };
        for b in &mut self.buf32 {
            b.clear();
            b.resize(n, 0);
        }

        if multi_mode {
            for v in 4..8 {
                fired[v] = hdb[v].mix(sample, &mut self.buf32[v - 1]);
            }
        } else {
            fired[3] = hdb[3].mix(sample, &mut self.buf32[3]);
        }

        for v in 0..3 {
            fired[v] = hdb[v].mix(sample, &mut self.buf32[v]);
        }

        self.conv16();
        self.downmix();

        fired
    }

    fn conv16(&mut self) {
        for (src, dst) in self.buf32.iter_mut().zip(self.channels.iter_mut()) {
            dst.clear();
            dst.extend(src.iter().map(|x| *x as i16));
            for x in src.iter_mut() {
                *x = 0;
            }
        }
    }

    fn downmix(&mut self) {
        let pan: &[Pan] = if self.num_chn == MAX_CHANNELS { &PAN7[..] } else { &PAN4[..] };

        self.buffer.clear();
        for i in 0..self.framesize {
            let mut l = 0_i32;
            let mut r = 0_i32;
            for (chn, side) in pan.iter().enumerate() {
                let smp = self.channels[chn][i] as i32;
                match *side {
                    Pan::Left  => l += smp,
                    Pan::Right => r += smp,
                }
            }
            self.buffer.push(clamp16(l >> 1));
            self.buffer.push(clamp16(r >> 1));
        }
    }

    pub fn num_channels(&self) -> usize {
        self.num_chn
    }

    /// Frames rendered in the last tick.
    pub fn framesize(&self) -> usize {
        self.framesize
    }

    /// Interleaved stereo output of the last tick.
    pub fn buffer(&self) -> &[i16] {
        &self.buffer
    }

    /// Output of one channel for the last tick.
    pub fn channel(&self, chn: usize) -> &[i16] {
        match self.channels.get(chn) {
            Some(b) => &b[..],
            None    => &[],
        }
    }
}

fn clamp16(smp: i32) -> i16 {
    if smp > LIM16_HI {
        LIM16_HI as i16
    } else if smp < LIM16_LO {
        LIM16_LO as i16
    } else {
        smp as i16
    }
}
