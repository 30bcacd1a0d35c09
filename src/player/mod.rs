mod macros;
mod scan;
mod state;
mod tracks;

pub use player::scan::{ScanData, ScanPos};

use std::cmp;
use format::Format;
use mixer::Mixer;
use module::{Module, Word};
use player::state::State;
use player::tracks::bpm;
use ::*;


/// Replay parameter changes reported to the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InfoEvent {
    Speed(u16),
    Tempo(u32),
    Position(u16),
    EndReached,
}

/// A copy of the complete replay state.
#[derive(Clone)]
pub struct Snapshot {
    state: State,
}


pub struct Player<'a> {
    module    : &'a Module,
    state     : State,
    mixer     : Mixer,
    scan_data : Option<Vec<ScanData>>,
    loop_count: usize,
    end       : bool,

    // for buffer fill
    consumed  : usize,
    in_size   : usize,
}

impl<'a> Player<'a> {
    pub fn new(module: &'a Module, rate: u32) -> Result<Self, Error> {
        if rate < MIN_RATE || rate > MAX_RATE {
            return Err(Error::Format(format!("invalid sampling rate {}", rate)))
        }

        let mut player = Player {
            module,
            state     : State::new(module.format == Format::Tfmx7V),
            mixer     : Mixer::new(rate),
            scan_data : None,
            loop_count: 0,
            end       : false,
            consumed  : 0,
            in_size   : 0,
        };

        player.init_sound(0)?;
        Ok(player)
    }

    /// Reset the replay and start sub-song `song`.
    pub fn init_sound(&mut self, song: usize) -> Result<&mut Self, Error> {
        if song >= self.module.sub_songs() {
            return Err(Error::Format(format!("invalid sub-song {}", song)))
        }

        self.state = State::new(self.module.format == Format::Tfmx7V);
        self.state.init();
        self.state.start_song(&self.module.data, song);
        debug!("start song {}: positions {}-{}", song, self.state.pdb.first_pos, self.state.pdb.last_pos);

        self.loop_count = 0;
        self.end = false;
        self.consumed = 0;
        self.in_size = 0;
        Ok(self)
    }

    /// Run one replay tick: channel macros, then the sequencer, then mix the
    /// tick's worth of output frames.
    pub fn render_tick(&mut self) -> &mut Self {
        let module = self.module;
        let rate = self.mixer.rate;
        let st = &mut self.state;

        st.machine.mdb.end_flag = false;
        let end_count = st.machine.end_count;

        if st.machine.mdb.player_enable {
            st.machine.do_all_macros(&module.data, rate);
            if st.song >= 0 {
                st.do_tracks(&module.data);
            }
        }

        let frames = st.tick_frames(rate);
        let fired = self.mixer.mix(&mut st.machine.hdb, &module.data.samples, st.machine.multi_mode, frames);

        // resume macros waiting on DMA
        for (c, f) in st.machine.cdb.iter_mut().zip(fired.iter()) {
            if *f {
                c.macro_run = -1;
            }
        }

        if st.machine.end_count != end_count {
            self.loop_count += 1;
        }

        self
    }

    pub fn fill_buffer(&mut self, out_buffer: &mut [i16], loops: usize) {
        let mut filled = 0;
        let size = out_buffer.len();

        // Fill buffer
        while filled < size {
            // Check if buffer full
            if self.consumed == self.in_size {
                self.render_tick();

                // Check end of module
                if loops > 0 && self.loop_count >= loops {
                    self.end = true;
                    for x in &mut out_buffer[filled..] {
                        *x = 0;
                    }
                    self.consumed = 0;
                    self.in_size = 0;
                    return
                }

                self.consumed = 0;
                self.in_size = self.mixer.buffer().len();
            }

            // Copy tick data to user buffer
            let copy_size = cmp::min(size - filled, self.in_size - self.consumed);
            out_buffer[filled..filled+copy_size].copy_from_slice(&self.mixer.buffer()[self.consumed..self.consumed+copy_size]);
            self.consumed += copy_size;
            filled += copy_size;
        }
    }

    pub fn end(&self) -> bool {
        self.end
    }

    /// Interleaved stereo output of the last tick.
    pub fn buffer(&self) -> &[i16] {
        self.mixer.buffer()
    }

    /// Output of one channel for the last tick.
    pub fn channel_buffer(&self, chn: usize) -> &[i16] {
        self.mixer.channel(chn)
    }

    pub fn create_snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state.clone(),
        }
    }

    pub fn restore_snapshot(&mut self, snapshot: &Snapshot) -> &mut Self {
        self.state = snapshot.state.clone();
        self.consumed = 0;
        self.in_size = 0;
        self
    }

    /// Output channels: 7 once the module runs in multi mode, 4 otherwise.
    pub fn channels(&self) -> usize {
        if self.state.machine.multi_mode { MAX_CHANNELS } else { 4 }
    }

    pub fn sub_songs(&self) -> usize {
        self.module.sub_songs()
    }

    pub fn song(&self) -> usize {
        cmp::max(self.state.song, 0) as usize
    }

    pub fn position(&self) -> usize {
        self.state.pdb.curr_pos.wrapping_sub(self.state.pdb.first_pos) as usize
    }

    pub fn song_length(&self) -> usize {
        let len = self.state.pdb.last_pos as i32 - self.state.pdb.first_pos as i32 + 1;
        cmp::max(len, 0) as usize
    }

    /// Jump to position `pos` of the current sub-song, taking speed and
    /// tempo from the scanned position table.
    pub fn set_position(&mut self, pos: usize, info: &ScanPos) -> &mut Self {
        {
            let st = &mut self.state;

            if info.cia != 0 {
                st.machine.mdb.cia_save = info.cia;
                st.e_clocks = info.cia as u32;
            }
            st.machine.mdb.speed_cnt = info.speed;
            st.pdb.prescale = info.speed;

            st.pdb.curr_pos = st.pdb.first_pos.wrapping_add(pos as u16);
            if st.pdb.curr_pos == st.pdb.first_pos {
                st.first_time = true;
            }

            st.get_track_step(&self.module.data);

            let cia = st.machine.mdb.cia_save;
            st.machine.notify(InfoEvent::Speed(info.speed));
            st.machine.notify(InfoEvent::Tempo(bpm(cia)));
        }

        self.consumed = 0;
        self.in_size = 0;
        self
    }

    /// Queue a sound effect on channel `chn`. The event word is dispatched
    /// like a pattern note at the start of the channel's next tick. A pending
    /// effect is only replaced by one of equal or higher priority.
    pub fn play_sfx(&mut self, chn: usize, word: u32, priority: u32) -> bool {
        if chn > self.state.machine.channel_mask() as usize {
            return false
        }

        let c = &mut self.state.machine.cdb[chn];
        if c.sfx_code != 0 && priority < c.sfx_priority {
            return false
        }

        let mut w = Word(word);
        let b2 = (w.b2() & 0xf0) | chn as u8;
        w.set_b2(b2);

        c.sfx_code = w.0;
        c.sfx_priority = priority;
        true
    }

    /// Cue values written by the module for the host.
    pub fn cue(&self) -> [u16; 4] {
        self.state.machine.cue
    }

    pub fn drain_events(&mut self) -> Vec<InfoEvent> {
        self.state.machine.drain_events()
    }

    /// Durations and position tables of all sub-songs.
    pub fn scan(&mut self) -> &[ScanData] {
        if self.scan_data.is_none() {
            self.scan_data = Some(scan::scan(&self.module.data));
        }

        match self.scan_data {
            Some(ref s) => &s[..],
            None        => &[],
        }
    }

    pub fn info(&mut self, info: &mut FrameInfo) -> &mut Self {
        let st = &self.state;
        info.pos = self.position();
        info.song = self.song();
        info.frame = st.jiffies as usize;
        info.speed = st.pdb.prescale as usize;
        info.tempo = bpm(st.machine.mdb.cia_save) as usize;
        info.channels = self.channels();
        self
    }
}


#[derive(Default, Debug)]
pub struct FrameInfo {
    pub pos     : usize,
    pub song    : usize,
    pub frame   : usize,
    pub speed   : usize,
    pub tempo   : usize,
    pub channels: usize,
}

impl FrameInfo {
    pub fn new() -> Self {
        Default::default()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use format::tfmx::TRACK_CMD;
    use format::tfmx::fixture::ModuleBuilder;

    const OFF: u16 = 0xff00;

    // One note on channel 0 whose macro waits for the sample to loop
    // before lowering the volume
    fn dma_module(smpl: &[u8]) -> Module {
        let mut mb = ModuleBuilder::new();
        mb.track_step(&[0x0000, OFF, OFF, OFF, OFF, OFF, OFF, OFF]);
        mb.pattern(&[0x10000000, 0xf3ff0000]);
        mb.macro_(&[
            0x02000000,     // begin 0
            0x03000004,     // length 4 words
            0x17000100,     // period 0x100
            0x01000000,     // DMA on
            0x0e000040,     // volume 0x40
            0x1a000000,     // wait on DMA
            0x0e000020,     // volume 0x20
            0x07000000,     // stop
        ]);
        mb.song(0, 0, 0, 0);
        mb.load(smpl)
    }

    fn render(p: &mut Player, ticks: usize) -> Vec<i16> {
        let mut out = Vec::new();
        for _ in 0..ticks {
            p.render_tick();
            out.extend_from_slice(p.buffer());
        }
        out
    }

    #[test]
    fn test_invalid_parameters() {
        let m = dma_module(&[0x10; 16]);
        assert!(Player::new(&m, 1000).is_err());
        assert!(Player::new(&m, 200000).is_err());

        let mut p = Player::new(&m, 44100).unwrap();
        assert!(p.init_sound(1).is_err());
        assert!(p.init_sound(0).is_ok());
    }

    #[test]
    fn test_wait_on_dma_resumes_macro() {
        let m = dma_module(&[0x10; 16]);
        let mut p = Player::new(&m, 44100).unwrap();

        p.render_tick();
        assert_eq!(p.state.machine.cdb[0].macro_run, -1);
        assert_eq!(p.state.machine.hdb[0].mode, 0);

        p.render_tick();
        assert_eq!(p.state.machine.cdb[0].cur_vol, 0x40);
        assert_eq!(p.state.machine.cdb[0].macro_run, -1);
        assert!(p.buffer().iter().any(|x| *x != 0));

        p.render_tick();
        assert_eq!(p.state.machine.cdb[0].cur_vol, 0x20);
        assert_eq!(p.state.machine.cdb[0].macro_run, 0);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let m = dma_module(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x7f]);
        let mut p1 = Player::new(&m, 44100).unwrap();
        let mut p2 = Player::new(&m, 44100).unwrap();

        let a = render(&mut p1, 20);
        let b = render(&mut p2, 20);
        assert_eq!(a, b);
        assert!(a.len() > 20 * 881 * 2);
    }

    #[test]
    fn test_voice_volume_is_bounded() {
        let m = dma_module(&[0x7f; 16]);
        let mut p = Player::new(&m, 22050).unwrap();

        for _ in 0..10 {
            p.render_tick();
            assert!(p.state.machine.hdb.iter().all(|hw| hw.vol <= 0x40));
            assert!(p.state.machine.cdb.iter().all(|c| c.cur_vol <= 0x40));
        }
    }

    #[test]
    fn test_snapshot_restore() {
        let m = dma_module(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x7f]);
        let mut p = Player::new(&m, 44100).unwrap();

        render(&mut p, 2);
        let snap = p.create_snapshot();
        let a = render(&mut p, 5);
        assert_eq!(p.state.machine.cdb[0].cur_vol, 0x20);

        p.restore_snapshot(&snap);
        assert_eq!(p.state.machine.cdb[0].cur_vol, 0x40);
        let b = render(&mut p, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_degenerate_sample_is_silent() {
        let mut mb = ModuleBuilder::new();
        mb.track_step(&[0x0000, OFF, OFF, OFF, OFF, OFF, OFF, OFF]);
        mb.pattern(&[0x10000000, 0xf3ff0000]);
        mb.macro_(&[0x02000000, 0x03000000, 0x17000100, 0x01000000, 0x0e000040, 0x07000000]);
        let m = mb.load(&[0x7f; 16]);
        let mut p = Player::new(&m, 44100).unwrap();
        assert!(render(&mut p, 10).iter().all(|x| *x == 0));

        // empty sample bank
        let m = dma_module(&[]);
        let mut p = Player::new(&m, 44100).unwrap();
        assert!(render(&mut p, 10).iter().all(|x| *x == 0));
    }

    #[test]
    fn test_fill_buffer_stops_at_loop_count() {
        let mut mb = ModuleBuilder::new();
        mb.track_step(&[0x0000, OFF, OFF, OFF, OFF, OFF, OFF, OFF]);
        mb.pattern(&[0xf3000000, 0xf0000000]);
        let m = mb.load(&[]);
        let mut p = Player::new(&m, 44100).unwrap();

        let mut out = vec![1_i16; 44100];
        p.fill_buffer(&mut out, 1);
        assert!(p.end());
        assert!(out.iter().all(|x| *x == 0));
    }

    #[test]
    fn test_fill_buffer_splits_ticks() {
        let m = dma_module(&[0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x7f]);
        let mut p1 = Player::new(&m, 44100).unwrap();
        let mut p2 = Player::new(&m, 44100).unwrap();

        let a = render(&mut p1, 4);
        let mut b = vec![0_i16; a.len()];
        for chunk in b.chunks_mut(100) {
            p2.fill_buffer(chunk, 0);
        }
        assert_eq!(a, b);
        assert!(!p2.end());
    }

    #[test]
    fn test_sound_effect() {
        let m = dma_module(&[0x10; 16]);
        let mut p = Player::new(&m, 44100).unwrap();

        assert!(p.play_sfx(1, 0x20000000, 5));
        assert!(!p.play_sfx(1, 0x20000000, 2));
        assert!(!p.play_sfx(5, 0x20000000, 9));     // not in multi mode

        p.render_tick();
        let c = &p.state.machine.cdb[1];
        assert_eq!(c.sfx_code, 0);
        assert_eq!(c.curr_note, 0x20);
        assert_eq!(c.cur_vol, 0x40);
    }

    #[test]
    fn test_position_and_info() {
        let mut mb = ModuleBuilder::new();
        mb.track_step(&[TRACK_CMD, 2, 3, 0, 0, 0, 0, 0]);
        mb.track_step(&[0x0000, OFF, OFF, OFF, OFF, OFF, OFF, OFF]);
        mb.track_step(&[0x0000, OFF, OFF, OFF, OFF, OFF, OFF, OFF]);
        mb.pattern(&[0xf3000000, 0xf0000000]);
        mb.song(0, 0, 2, 5);
        let m = mb.load(&[]);
        let mut p = Player::new(&m, 44100).unwrap();

        assert_eq!(p.position(), 1);
        assert_eq!(p.song_length(), 3);

        let mut fi = FrameInfo::new();
        p.info(&mut fi);
        assert_eq!(fi.speed, 3);
        assert_eq!(fi.tempo, 125);
        assert_eq!(fi.channels, 4);

        let pos = p.scan()[0].pos[2];
        assert_eq!(pos.speed, 3);
        p.drain_events();
        p.set_position(2, &pos);
        assert_eq!(p.position(), 2);
        assert_eq!(p.drain_events(), vec![InfoEvent::Speed(3), InfoEvent::Tempo(125)]);
    }

    #[test]
    fn test_cue() {
        let mut mb = ModuleBuilder::new();
        mb.track_step(&[0x0000, OFF, OFF, OFF, OFF, OFF, OFF, OFF]);
        mb.pattern(&[0xfd020123, 0xf3ff0000]);
        let m = mb.load(&[]);
        let mut p = Player::new(&m, 44100).unwrap();

        p.render_tick();
        assert_eq!(p.cue(), [0, 0, 0x0123, 0]);
    }
}
