use byteorder::{ByteOrder, BigEndian};
use Error;

#[macro_export]
macro_rules! magic4 {
    ( $a:expr, $b:expr, $c:expr, $d:expr ) => {
        (($a as u32) << 24) | (($b as u32) << 16) | (($c as u32) << 8) | ($d as u32)
    }
}

pub trait BinaryRead {
    fn read_string(&self, ofs: usize, size: usize) -> Result<String, Error>;
    fn read32b(&self, ofs: usize) -> Result<u32, Error>;
    fn read16b(&self, ofs: usize) -> Result<u16, Error>;
    fn read8(&self, ofs: usize) -> Result<u8, Error>;
    fn slice(&self, start: usize, size: usize) -> Result<&[u8], Error>;
}

impl<'a> BinaryRead for &'a [u8] {
    fn read_string(&self, ofs: usize, size: usize) -> Result<String, Error> {
        check_buffer_size(&self, ofs + size)?;
        Ok(String::from_utf8_lossy(&self[ofs..ofs+size]).to_string().replace("\x00", " "))
    }

    fn read32b(&self, ofs: usize) -> Result<u32, Error> {
        check_buffer_size(&self, ofs + 4)?;
        Ok(BigEndian::read_u32(&self[ofs..ofs+4]))
    }

    fn read16b(&self, ofs: usize) -> Result<u16, Error> {
        check_buffer_size(&self, ofs + 2)?;
        Ok(BigEndian::read_u16(&self[ofs..ofs+2]))
    }

    fn read8(&self, ofs: usize) -> Result<u8, Error> {
        check_buffer_size(&self, ofs + 1)?;
        Ok(self[ofs])
    }

    fn slice(&self, start: usize, size: usize) -> Result<&[u8], Error> {
        check_buffer_size(&self, start + size)?;
        Ok(&self[start..start + size])
    }
}

fn check_buffer_size(b: &[u8], size: usize) -> Result<(), Error> {
    if size > b.len() {
        return Err(Error::Load("short read".to_owned()))
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_big_endian() {
        let b: &[u8] = &[0x54, 0x46, 0x4d, 0x58, 0x00, 0x10];
        assert_eq!(b.read32b(0).unwrap(), magic4!('T','F','M','X'));
        assert_eq!(b.read16b(4).unwrap(), 0x0010);
        assert_eq!(b.read8(5).unwrap(), 0x10);
        assert_eq!(b.read_string(0, 4).unwrap(), "TFMX");
    }

    #[test]
    fn test_short_read() {
        let b: &[u8] = &[0x00, 0x01, 0x02];
        assert!(b.read32b(0).is_err());
        assert!(b.read16b(2).is_err());
        assert!(b.slice(1, 3).is_err());
        assert_eq!(b.slice(1, 2).unwrap(), &[0x01, 0x02]);
    }
}
