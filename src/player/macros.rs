// Channel macro interpreter and per-tick effects

use format::tfmx::TfmxData;
use mixer::LoopMode;
use module::Word;
use player::state::{ChannelControl, Machine};
use ::*;

// Instructions executed in one call before a macro is considered stuck
const MAX_MACRO_STEPS: usize = 0x8000;

lazy_static! {
    pub static ref NOTE_VALS: Box<[u16; 64]> = Box::new([
        0x6ae, 0x64e, 0x5f4, 0x59e, 0x54d, 0x501, 0x4b9, 0x475,
        0x435, 0x3f9, 0x3c0, 0x38c, 0x358, 0x32a, 0x2fc, 0x2d0,
        0x2a8, 0x282, 0x25e, 0x23b, 0x21b, 0x1fd, 0x1e0, 0x1c6,
        0x1ac, 0x194, 0x17d, 0x168, 0x154, 0x140, 0x12f, 0x11e,
        0x10e, 0x0fe, 0x0f0, 0x0e3, 0x0d6, 0x0ca, 0x0bf, 0x0b4,
        0x0aa, 0x0a0, 0x097, 0x08f, 0x087, 0x07f, 0x078, 0x071,
        0x0d6, 0x0ca, 0x0bf, 0x0b4, 0x0aa, 0x0a0, 0x097, 0x08f,
        0x087, 0x07f, 0x078, 0x071, 0x0d6, 0x0ca, 0x0bf, 0x0b4
    ]);
}

fn note_period(note: u8, fine_tune: u8, detune: i8) -> u16 {
    let per = NOTE_VALS[(note & 0x3f) as usize] as i32;
    ((per * (0x100 + fine_tune as i32 + detune as i32)) >> 8) as u16
}

// A zero length is 0x20000 bytes, which doesn't fit the 16-bit register
fn sample_length(save_len: u16) -> u16 {
    (save_len as u32 * 2) as u16
}

/// Phase increment for `period` at output `rate`, 14 fractional bits.
pub fn period_to_delta(period: u16, rate: u32) -> u32 {
    if period == 0 {
        return 0
    }

    let div = (period as u32).wrapping_mul(rate) >> 5;
    if div == 0 {
        return 0
    }

    (PAULA_CLOCK << 9) / div
}

// Old style macros keep running after a wait or a note; returns true if the
// macro must yield.
fn yields(c: &mut ChannelControl) -> bool {
    if c.new_style_macro == 0 {
        c.new_style_macro = 0xff;
        false
    } else {
        true
    }
}


impl Machine {

    /// Dispatch a note or channel event word.
    pub fn note_port(&mut self, data: &TfmxData, w: Word) {
        let chn = (w.b2() & self.channel_mask()) as usize;
        let c = &mut self.cdb[chn];

        if w.b0() == 0xfc {
            // lock
            c.sfx_flag = w.b1();
            c.sfx_lock_time = w.b3() as i16;
            return
        }

        if c.sfx_flag != 0 {
            return
        }

        if w.b0() < 0xc0 {
            let ptr = match data.macro_ptr(w.b1()) {
                Some(p) => p,
                None    => {
                    c.macro_run = 0;
                    return
                }
            };

            c.fine_tune = if data.quirks.danger_freak { 0 } else { w.b3() };
            c.velocity = (w.b2() >> 4) & 0xf;
            c.prev_note = c.curr_note;
            c.curr_note = w.b0();
            c.really_wait = 1;
            c.new_style_macro = 0xff;
            c.macro_num = w.b1() as u16;
            c.macro_ptr = ptr;
            c.macro_step = 0;
            c.macro_wait = 0;
            c.efx_run = 0;
            c.key_up = true;
            c.loop_cnt = -1;
            c.macro_run = -1;
        } else if w.b0() < 0xf0 {
            // portamento to note
            c.porta_reset = w.b1();
            c.porta_time = 1;
            if c.porta_rate == 0 {
                c.porta_per = c.dest_period;
            }
            c.porta_rate = w.b3() as i16;
            c.curr_note = w.b0() & 0x3f;
            c.dest_period = NOTE_VALS[c.curr_note as usize];
        } else {
            match w.b0() {
                0xf7 => {  // envelope
                    c.env_rate = w.b1();
                    c.env_reset = (w.b2() >> 4) + 1;
                    c.env_time = c.env_reset;
                    c.env_end_vol = w.b3() as i8;
                }
                0xf6 => {  // vibrato
                    c.vib_reset = w.b1() & 0xfe;
                    c.vib_time = c.vib_reset >> 1;
                    c.vib_width = w.b3() as i8;
                    c.vib_flag = true;
                    c.vib_offset = 0;
                }
                0xf5 => {  // key up
                    c.key_up = false;
                }
                _ => (),
            }
        }
    }

    pub fn run_macro(&mut self, data: &TfmxData, chn: usize) {
        self.cdb[chn].macro_wait = 0;

        for _ in 0..MAX_MACRO_STEPS {
            let c = &mut self.cdb[chn];
            let hw = &mut self.hdb[chn];

            let mut x = match data.word(c.macro_ptr, c.macro_step) {
                Some(w) => w,
                None    => {
                    debug!("channel {}: macro runs past the music data", chn);
                    c.macro_run = 0;
                    return
                }
            };
            c.macro_step = c.macro_step.wrapping_add(1);

            let op = x.b0();
            x.set_b0(0);

            match op {
                0x00 | 0x13 => {  // DMA off (and reset)
                    if op == 0x00 {
                        c.env_reset = 0;
                        c.vib_reset = 0;
                        c.add_begin_time = 0;
                        c.porta_rate = 0;

                        if data.quirks.gemx {
                            c.cur_vol = if x.b2() != 0 {
                                x.b3() as i8
                            } else {
                                x.b3().wrapping_add(c.velocity.wrapping_mul(3)) as i8
                            };
                        }
                    }

                    hw.set_loop_mode(LoopMode::Normal);

                    if x.b1() != 0 {
                        hw.mode |= 4;
                        c.new_style_macro = 0;
                        return
                    }

                    hw.mode = 0;
                    if c.new_style_macro != 0 {
                        hw.slen = 0;
                    }
                }
                0x01 => {  // DMA on
                    c.efx_run = x.b1() as i8;
                    hw.mode = 1;

                    if c.new_style_macro == 0 || data.quirks.danger_freak {
                        hw.sample_start = c.save_addr as i32;
                        hw.sample_length = sample_length(c.save_len);
                        hw.sbeg = hw.sample_start;
                        hw.slen = hw.sample_length;
                        hw.pos = 0;
                        hw.mode |= 2;
                    }
                }
                0x02 => {  // set begin
                    c.add_begin_time = 0;
                    c.cur_addr = x.0;
                    c.save_addr = x.0;
                }
                0x11 => {  // add begin
                    c.add_begin_time = x.b1();
                    c.add_begin_reset = x.b1();
                    c.add_begin = x.w1() as i16 as i32;
                    c.cur_addr = c.cur_addr.wrapping_add(c.add_begin as u32);
                    c.save_addr = c.cur_addr;
                }
                0x03 => {  // set length
                    c.save_len = x.w1();
                    c.curr_length = x.w1();
                }
                0x12 => {  // add length
                    c.curr_length = c.curr_length.wrapping_add(x.w1());
                    c.save_len = c.curr_length;
                }
                0x04 => {  // wait
                    if x.b1() & 0x01 != 0 {
                        let rw = c.really_wait;
                        c.really_wait = rw.wrapping_add(1);
                        if rw != 0 {
                            return
                        }
                    }

                    c.macro_wait = x.w1();
                    if yields(c) {
                        return
                    }
                }
                0x1a => {  // wait on DMA
                    hw.set_loop_mode(LoopMode::ArmOnCount(x.w1()));
                    c.macro_run = 0;
                    if yields(c) {
                        return
                    }
                }
                0x1c => {  // note split
                    if c.curr_note > x.b1() {
                        c.macro_step = x.w1();
                    }
                }
                0x1d => {  // volume split
                    if c.cur_vol as i32 > x.b1() as i32 {
                        c.macro_step = x.w1();
                    }
                }
                0x10 | 0x05 => {  // loop (until key up)
                    if op == 0x10 && !c.key_up {
                        continue
                    }

                    let count = c.loop_cnt;
                    c.loop_cnt = count.wrapping_sub(1);
                    if count == 0 {
                        continue
                    }
                    if c.loop_cnt < 0 {
                        c.loop_cnt = x.b1() as i16 - 1;
                    }
                    c.macro_step = x.w1();
                }
                0x07 => {  // stop
                    c.macro_run = 0;
                    return
                }
                0x0d => {  // add volume
                    if x.b2() != 0xfe {
                        let vol = (c.velocity as i32 * 3 + x.b3() as i32) as i8;
                        c.cur_vol = if vol > 0x40 { 0x40 } else { vol };
                    }
                }
                0x0e => {  // set volume
                    if x.b2() != 0xfe {
                        c.cur_vol = x.b3() as i8;
                    }
                }
                0x21 => {  // start macro
                    x.set_b0(c.curr_note);
                    let b2 = x.b2() | (c.velocity << 4);
                    x.set_b2(b2);
                    self.note_port(data, x);
                }
                0x1f | 0x08 | 0x09 => {  // set previous note / add note / set note
                    let base = match op {
                        0x1f => c.prev_note,
                        0x08 => c.curr_note,
                        _    => 0,
                    };
                    let per = note_period(base.wrapping_add(x.b1()), c.fine_tune, x.b3() as i8);

                    c.dest_period = per;
                    if c.porta_rate == 0 {
                        c.cur_period = per;
                    }
                    if yields(c) {
                        return
                    }
                }
                0x17 => {  // set period
                    c.dest_period = x.w1();
                    if c.porta_rate == 0 {
                        c.cur_period = x.w1();
                    }
                }
                0x0b => {  // portamento
                    c.porta_reset = x.b1();
                    c.porta_time = 1;
                    if c.porta_rate == 0 {
                        c.porta_per = c.dest_period;
                    }
                    c.porta_rate = x.w1() as i16;
                }
                0x0c => {  // vibrato
                    c.vib_reset = x.b1();
                    c.vib_time = x.b1() >> 1;
                    c.vib_width = x.b3() as i8;
                    c.vib_flag = true;
                    if c.porta_rate == 0 {
                        c.cur_period = c.dest_period;
                        c.vib_offset = 0;
                    }
                }
                0x0f => {  // envelope
                    c.env_reset = x.b2();
                    c.env_time = x.b2();
                    c.env_end_vol = x.b3() as i8;
                    c.env_rate = x.b1();
                }
                0x0a => {  // reset effects
                    c.env_reset = 0;
                    c.vib_reset = 0;
                    c.add_begin_time = 0;
                    c.porta_rate = 0;
                }
                0x14 => {  // wait key up
                    if !c.key_up {
                        continue
                    }
                    if c.loop_cnt == 0 {
                        c.loop_cnt = -1;
                        continue
                    }

                    if c.loop_cnt == -1 {
                        c.loop_cnt = x.b3() as i16 - 1;
                    } else {
                        c.loop_cnt -= 1;
                    }
                    c.macro_step = c.macro_step.wrapping_sub(1);
                    return
                }
                0x15 | 0x06 => {  // go sub / continue
                    if op == 0x15 {
                        c.return_ptr = c.macro_ptr as u16;
                        c.return_step = c.macro_step;
                    }

                    match data.macro_ptr(x.b1()) {
                        Some(ptr) => {
                            c.macro_ptr = ptr & 0xffff;
                            c.macro_num = ptr as u16;
                            c.macro_step = x.w1();
                            c.loop_cnt = -1;
                        }
                        None => {
                            debug!("channel {}: jump to invalid macro {}", chn, x.b1());
                            c.macro_run = 0;
                            return
                        }
                    }
                }
                0x16 => {  // return from sub
                    c.macro_ptr = c.return_ptr as u32;
                    c.macro_step = c.return_step;
                }
                0x18 => {  // sample loop
                    c.save_addr = c.save_addr.wrapping_add((x.w1() & 0xfffe) as u32);
                    c.save_len = c.save_len.wrapping_sub(x.w1() >> 1);
                    c.curr_length = c.save_len;
                    c.cur_addr = c.save_addr;
                }
                0x19 => {  // one shot
                    c.add_begin_time = 0;
                    c.save_addr = 0;
                    c.cur_addr = 0;
                    c.save_len = 1;
                    c.curr_length = 1;
                }
                0x20 => {  // cue
                    self.cue[(x.b1() & 0x03) as usize] = x.w1();
                }
                0x31 => (),
                _ => {
                    debug!("channel {}: unsupported macro command 0x{:02x}", chn, op);
                }
            }
        }

        warn!("channel {}: macro doesn't yield, stopping it", chn);
        self.cdb[chn].macro_run = 0;
    }

    pub fn do_effects(&mut self, chn: usize) {
        let mdb = &mut self.mdb;
        let c = &mut self.cdb[chn];

        if c.efx_run < 0 {
            return
        }

        if c.efx_run == 0 {
            c.efx_run = 1;
            return
        }

        // sample start sweep
        if c.add_begin_time != 0 {
            c.cur_addr = c.cur_addr.wrapping_add(c.add_begin as u32);
            c.save_addr = c.cur_addr;
            c.add_begin_time -= 1;

            if c.add_begin_time == 0 {
                c.add_begin = c.add_begin.wrapping_neg();
                c.add_begin_time = c.add_begin_reset;
            }
        }

        if (c.cur_addr as i32) < 0 {
            c.add_begin = 0;
            c.add_begin_time = 0;
            c.add_begin_reset = 0;
            c.cur_addr = 0;
        }

        // vibrato
        if c.vib_reset != 0 {
            c.vib_offset = c.vib_offset.wrapping_add(c.vib_width as i16);
            let per = (c.dest_period as i32 * (0x800 + c.vib_offset as i32)) >> 11;

            if c.porta_rate == 0 {
                c.cur_period = per as u16;
            }

            c.vib_time = c.vib_time.wrapping_sub(1);
            if c.vib_time == 0 {
                c.vib_time = c.vib_reset;
                c.vib_width = c.vib_width.wrapping_neg();
            }
        }

        // portamento
        if c.porta_rate != 0 {
            c.porta_time = c.porta_time.wrapping_sub(1);

            if c.porta_time == 0 {
                c.porta_time = c.porta_reset;

                let per = c.porta_per as i32;
                let dest = c.dest_period as i32;
                let rate = c.porta_rate as i32;

                let a = if per > dest {
                    let a = per.wrapping_mul(256 - rate).wrapping_sub(128) >> 8;
                    if a <= dest {
                        c.porta_rate = 0;
                    }
                    a
                } else if per < dest {
                    let a = per.wrapping_mul(256 + rate) >> 8;
                    if a >= dest {
                        c.porta_rate = 0;
                    }
                    a
                } else {
                    c.porta_rate = 0;
                    dest
                };

                let a = if c.porta_rate == 0 { dest } else { a };
                c.porta_per = a as u16;
                c.cur_period = a as u16;
            }
        }

        // volume envelope
        if c.env_reset != 0 {
            let time = c.env_time;
            c.env_time = time.wrapping_sub(1);

            if time == 0 {
                c.env_time = c.env_reset;

                let end = c.env_end_vol as i32;
                if c.cur_vol as i32 > end {
                    if (c.cur_vol as i32) < c.env_rate as i32 {
                        c.env_reset = 0;
                    } else {
                        c.cur_vol = c.cur_vol.wrapping_sub(c.env_rate as i8);
                    }
                    if end > c.cur_vol as i32 {
                        c.env_reset = 0;
                    }
                } else if (c.cur_vol as i32) < end {
                    c.cur_vol = c.cur_vol.wrapping_add(c.env_rate as i8);
                    if end < c.cur_vol as i32 {
                        c.env_reset = 0;
                    }
                }

                if c.env_reset == 0 {
                    c.env_time = 0;
                    c.cur_vol = c.env_end_vol;
                }
            }
        }

        // master volume fade
        if mdb.fade_slope != 0 {
            mdb.fade_time = mdb.fade_time.wrapping_sub(1);

            if mdb.fade_time == 0 {
                mdb.fade_time = mdb.fade_reset;
                mdb.master_vol = mdb.master_vol.wrapping_add(mdb.fade_slope);
                if mdb.fade_dest == mdb.master_vol {
                    mdb.fade_slope = 0;
                }
            }
        }
    }

    /// Run one tick of channel `chn` and load the resulting period, sample
    /// region and volume into its hardware voice.
    pub fn do_macro(&mut self, data: &TfmxData, chn: usize, rate: u32) {
        {
            let c = &mut self.cdb[chn];
            if c.sfx_lock_time >= 0 {
                c.sfx_lock_time -= 1;
            } else {
                c.sfx_flag = 0;
                c.sfx_priority = 0;
            }
        }

        let code = self.cdb[chn].sfx_code;
        if code != 0 {
            self.cdb[chn].sfx_flag = 0;
            self.cdb[chn].sfx_code = 0;
            self.note_port(data, Word(code));
        }

        let run = {
            let c = &mut self.cdb[chn];
            if c.macro_run != 0 {
                let wait = c.macro_wait;
                c.macro_wait = wait.wrapping_sub(1);
                wait == 0
            } else {
                false
            }
        };

        if run {
            self.run_macro(data, chn);
        }

        self.do_effects(chn);

        let master = self.mdb.master_vol as i32;
        let c = &self.cdb[chn];
        let hw = &mut self.hdb[chn];

        hw.delta = period_to_delta(c.cur_period, rate);
        hw.sample_start = c.save_addr as i32;
        hw.sample_length = sample_length(c.save_len);

        if hw.mode & 3 == 1 {
            hw.sbeg = hw.sample_start;
            hw.slen = hw.sample_length;
        }

        hw.vol = ((c.cur_vol as i32 * master) >> 6) as u8;
    }

    pub fn do_all_macros(&mut self, data: &TfmxData, rate: u32) {
        self.do_macro(data, 0, rate);
        self.do_macro(data, 1, rate);
        self.do_macro(data, 2, rate);

        if self.multi_mode {
            for chn in 4..8 {
                self.do_macro(data, chn, rate);
            }
        }

        self.do_macro(data, 3, rate);
    }

    pub fn channel_off(&mut self, chn: usize) {
        let chn = chn & 0xf;
        if chn >= NUM_VOICES {
            return
        }

        let c = &mut self.cdb[chn];
        let hw = &mut self.hdb[chn];

        if c.sfx_flag == 0 {
            hw.mode = 0;
            c.add_begin_time = 0;
            c.add_begin_reset = 0;
            c.macro_run = 0;
            c.new_style_macro = 0xff;
            c.save_addr = 0;
            c.cur_vol = 0;
            hw.vol = 0;
            c.save_len = 1;
            c.curr_length = 1;
            hw.set_loop_mode(LoopMode::Normal);
        }
    }

    pub fn all_off(&mut self) {
        self.mdb.player_enable = false;

        for (c, hw) in self.cdb.iter_mut().zip(self.hdb.iter_mut()) {
            hw.mode = 0;
            c.macro_wait = 0;
            c.macro_run = 0;
            c.cur_vol = 0;
            c.sfx_flag = 0;
            c.sfx_code = 0;
            c.save_addr = 0;
            hw.vol = 0;
            c.loop_cnt = -1;
            c.sfx_lock_time = -1;
            c.new_style_macro = 0xff;

            hw.sbeg = 0;
            hw.sample_start = 0;
            hw.sample_length = 2;
            hw.slen = 2;
            c.save_len = 2;
            hw.set_loop_mode(LoopMode::Normal);
        }
    }
}
