use module::Module;
use util::BinaryRead;
use ::*;

pub mod tfmx;

// Supported formats

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum Format {
    Tfmx15,
    TfmxPro,
    Tfmx7V,
}

impl Format {
    pub fn channels(&self) -> usize {
        match *self {
            Format::Tfmx7V => 7,
            _              => 4,
        }
    }
}

/// The TFHD header that prefixes single-file modules.
#[derive(Debug, Clone, Copy)]
pub struct SingleFile {
    pub header_size: u32,
    pub typ        : u8,
    pub version    : u8,
    pub mdat_size  : u32,
    pub smpl_size  : u32,
}

pub struct FormatInfo {
    pub format: Format,
    pub single: Option<SingleFile>,
}

pub fn is_single_file(b: &[u8]) -> bool {
    b.read32b(0).ok() == Some(magic4!('T','F','H','D'))
}

fn single_file(b: &[u8]) -> Result<Option<SingleFile>, Error> {
    if !is_single_file(b) {
        return Ok(None)
    }

    Ok(Some(SingleFile {
        header_size: b.read32b(4)?,
        typ        : b.read8(8)?,
        version    : b.read8(9)?,
        mdat_size  : b.read32b(10)?,
        smpl_size  : b.read32b(14)?,
    }))
}

pub fn probe(b: &[u8]) -> Result<FormatInfo, Error> {
    if b.len() < 512 {
        return Err(Error::Format(format!("file too short ({})", b.len())));
    }

    let single = single_file(b)?;
    let mut start = 0;

    if let Some(h) = single {
        // Forced or unchecked types need a look at the music header
        if h.typ & 0x80 != 0 || h.typ & 0x7f == 0 {
            start = h.header_size as usize;
        } else {
            let format = match h.typ & 0x7f {
                1 => Format::Tfmx15,
                2 => Format::TfmxPro,
                3 => Format::Tfmx7V,
                t => return Err(Error::Format(format!("unknown TFHD module type {}", t))),
            };
            return Ok(FormatInfo{ format, single })
        }
    }

    let format = tfmx::probe_music(b, start)?;
    Ok(FormatInfo{ format, single })
}

pub fn load(b: &[u8], smpl: Option<&[u8]>) -> Result<Module, Error> {
    let info = probe(b)?;
    debug!("Probe ok, load format {:?}", info.format);
    tfmx::load(b, smpl, info)
}
