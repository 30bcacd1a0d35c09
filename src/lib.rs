extern crate byteorder;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate md5;

#[macro_use]
mod util;

pub mod format;
pub mod mixer;
pub mod module;
pub mod player;
pub use player::{FrameInfo, InfoEvent, Player, ScanData, ScanPos, Snapshot};
pub use module::Module;

use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MAX_RATE     : u32 = 96000;
pub const MIN_RATE     : u32 = 4000;
pub const DEFAULT_RATE : u32 = 44100;
pub const NUM_TRACKS   : usize = 8;   // track pointers in the sequencer
pub const NUM_VOICES   : usize = 8;   // channel control blocks / hardware voices
pub const MAX_CHANNELS : usize = 7;   // output channels in multi mode

// Amiga NTSC color clock / CIA timing
pub const PAULA_CLOCK  : u32 = 3579545;
pub const CIA_DEFAULT  : u16 = 14318;   // 125 BPM
pub const CIA_BPM      : u32 = 0x1b51f8;


pub struct Tfmx {
    pub module: Module,
}

impl Tfmx {
    /// Load a module from memory. Two-file modules need the companion sample
    /// data in `smpl`; single-file (TFHD) modules carry their own.
    pub fn new(b: &[u8], smpl: Option<&[u8]>) -> Result<Self, Error> {
        let module = format::load(b, smpl)?;
        Ok(Tfmx {
            module,
        })
    }

    /// Load a module from disk, looking for the sample file next to the
    /// music file when the module isn't in single-file format.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let b = fs::read(path)?;

        if format::is_single_file(&b) {
            return Tfmx::new(&b, None)
        }

        for ext in &["smpl", "sam"] {
            for candidate in companion_names(path, ext) {
                if let Ok(smpl) = fs::read(&candidate) {
                    debug!("sample file: {}", candidate.display());
                    return Tfmx::new(&b, Some(&smpl))
                }
            }
        }

        // let the loader decide between format and sample errors
        Tfmx::new(&b, None)
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn player(&self, rate: u32) -> Result<Player, Error> {
        Player::new(&self.module, rate)
    }
}

// Candidate companion file names: mdat.foo -> smpl.foo, foo.mdat -> foo.smpl
fn companion_names(path: &Path, ext: &str) -> Vec<PathBuf> {
    let mut names = Vec::new();

    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None    => return names,
    };

    let lower = name.to_lowercase();
    if let Some(dot) = lower.find('.') {
        // prefix style
        names.push(path.with_file_name(format!("{}{}", ext, &name[dot..])));
    }
    if let Some(dot) = lower.rfind('.') {
        // extension style
        names.push(path.with_file_name(format!("{}.{}", &name[..dot], ext)));
    }

    names
}


#[derive(Debug)]
pub enum Error {
    Format(String),
    Load(String),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Error::Format(ref descr) => write!(f, "{}", descr),
            &Error::Load(ref descr)   => write!(f, "{}", descr),
            &Error::Io(ref err)       => write!(f, "{}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _                  => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
