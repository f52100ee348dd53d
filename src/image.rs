use std::io::{self, ErrorKind, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use log::debug;

use crate::mem::Memory;

/// Loads a program image: the first big-endian word is the origin, every
/// following word lands at consecutive addresses starting there. Returns
/// the origin and the number of words placed.
///
/// A stream that ends mid-word is a fault; a clean end-of-stream at a
/// word boundary terminates the load. Cell contents receive no
/// transformation beyond byte-order conversion.
pub fn load_image<R: Read>(mut reader: R, mem: &mut Memory) -> io::Result<(u16, usize)> {
    let origin = reader.read_u16::<BigEndian>()?;

    let mut addr = origin;
    let mut count = 0usize;
    while let Some(word) = read_word(&mut reader)? {
        mem.write(addr, word);
        addr = addr.wrapping_add(1);
        count += 1;
    }

    debug!("loaded {} words at origin {:#06x}", count, origin);
    Ok((origin, count))
}

// Reads one big-endian word, distinguishing clean EOF before the first
// byte from truncation between the two bytes of a word.
fn read_word<R: Read>(reader: &mut R) -> io::Result<Option<u16>> {
    let mut buf = [0u8; 2];
    loop {
        match reader.read(&mut buf[..1]) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    reader.read_exact(&mut buf[1..])?;
    Ok(Some(BigEndian::read_u16(&buf)))
}
