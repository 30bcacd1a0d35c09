extern crate getopts;
extern crate memmap;
extern crate riff_wave;
extern crate tfmx;

use std::env;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use getopts::{Matches, Options};
use memmap::Mmap;
use riff_wave::WaveWriter;
use tfmx::{format, FrameInfo, Player, Tfmx};
use tfmx::module::Module;
use tfmx::module::event::PatternEvent;

fn main() {

    let args: Vec<String> = env::args().collect();
    let mut opts = Options::new();

    opts.optopt("r", "rate", "output sampling rate (default 44100)", "HZ");
    opts.optopt("s", "song", "sub-song to play (default 0)", "NUM");
    opts.optopt("t", "time", "maximum replay time", "SECONDS");
    opts.optopt("o", "output", "output WAV file (default out.wav)", "FILE");
    opts.optopt("S", "samples", "sample file of a two-file module", "FILE");
    opts.optflag("i", "info", "show module information and exit");
    opts.optopt("p", "pattern", "show pattern and exit", "NUM");
    opts.optflag("h", "help", "display usage information and exit");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };

    if matches.opt_present("h") || matches.free.len() < 1 {
        let brief = format!("Usage: {} [options] filename", args[0]);
        print!("{}", opts.usage(&brief));
        return;
    }

    match run(&matches) {
        Ok(_)  => {},
        Err(e) => println!("Error: {}", e),
    }
}

fn map_file(name: &str) -> Result<Mmap, Box<dyn Error>> {
    let file = File::open(name)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

fn load(matches: &Matches) -> Result<Tfmx, Box<dyn Error>> {
    let name = &matches.free[0];
    let mmap = map_file(name)?;

    let tfmx = match matches.opt_str("S") {
        Some(smpl) => {
            let smpl = map_file(&smpl)?;
            Tfmx::new(&mmap[..], Some(&smpl[..]))?
        }
        None => {
            if format::is_single_file(&mmap[..]) {
                Tfmx::new(&mmap[..], None)?
            } else {
                Tfmx::from_path(name)?
            }
        }
    };

    Ok(tfmx)
}

fn run(matches: &Matches) -> Result<(), Box<dyn Error>> {
    let rate = match matches.opt_str("r") {
        Some(s) => s.parse()?,
        None    => tfmx::DEFAULT_RATE,
    };

    let song = match matches.opt_str("s") {
        Some(s) => s.parse()?,
        None    => 0,
    };

    let time = match matches.opt_str("t") {
        Some(s) => Some(s.parse::<usize>()?),
        None    => None,
    };

    let tfmx = load(matches)?;
    let mut player = tfmx.player(rate)?;

    if matches.opt_present("i") {
        show_info(&tfmx, &mut player);
        return Ok(())
    }

    if let Some(s) = matches.opt_str("p") {
        show_pattern(tfmx.module(), s.parse()?);
        return Ok(())
    }

    player.init_sound(song)?;

    let module = tfmx.module();
    println!("Title: {}", module.title());
    println!("Format: {}", module.description);
    println!("Song: {} of {}", song, player.sub_songs());

    let output = matches.opt_str("o").unwrap_or_else(|| "out.wav".to_owned());
    let file = File::create(&output)?;
    let writer = BufWriter::new(file);
    let mut wave_writer = WaveWriter::new(2, rate, 16, writer)?;

    let max_frames = time.map(|t| t * rate as usize);
    let mut buffer = vec![0_i16; 4096];
    let mut frames = 0;
    let mut frame_info = FrameInfo::new();
    let mut last_pos = None;

    while !player.end() {
        player.fill_buffer(&mut buffer, 1);
        for x in &buffer {
            wave_writer.write_sample_i16(*x)?;
        }
        frames += buffer.len() / 2;

        player.info(&mut frame_info);
        if last_pos != Some(frame_info.pos) {
            print!("\rpos:{:3}/{:3} speed:{:2} bpm:{:3} ", frame_info.pos, player.song_length(),
                frame_info.speed, frame_info.tempo);
            io::stdout().flush()?;
            last_pos = Some(frame_info.pos);
        }

        if let Some(max) = max_frames {
            if frames >= max {
                break
            }
        }
    }
    println!();

    wave_writer.sync_header()?;
    println!("Wrote {} ({:.1} s)", output, frames as f64 / rate as f64);

    Ok(())
}

fn show_info(tfmx: &Tfmx, player: &mut Player) {
    let module = tfmx.module();
    let data = &module.data;

    println!("Format: {}", module.description);
    println!("Creator: {}", module.creator);
    for line in module.comment() {
        if !line.is_empty() {
            println!("  {}", line);
        }
    }

    println!("Channels: {}", module.channels());
    println!("Track steps: {}", data.num_track_steps());
    println!("Patterns: {}", data.num_patterns());
    println!("Macros: {}", data.num_macros());
    println!("Samples: {} bytes", data.samples.len());

    for (i, s) in player.scan().iter().enumerate() {
        let sub = match data.sub_song(i) {
            Some(sub) => sub,
            None      => continue,
        };
        let secs = s.duration / 1000;
        println!("Song {:2}: positions {:3}-{:3}  {:2}:{:02}.{:03}", i, sub.start, sub.end,
            secs / 60, secs % 60, s.duration % 1000);
    }
}

fn show_pattern(module: &Module, num: u8) {
    let addr = match module.data.pattern(num) {
        Some(addr) => addr,
        None       => {
            println!("No pattern {}", num);
            return
        }
    };

    println!("Pattern {}:", num);
    for step in 0..0x400 {
        let w = match module.data.word(addr, step) {
            Some(w) => w,
            None    => break,
        };
        println!("{:4}: {}", step, PatternEvent(w));
        if w.b0() == 0xf0 {
            break
        }
    }
}
