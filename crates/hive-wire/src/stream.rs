//! Little-endian byte-stream reader and writer
//!
//! The reader carries a sticky status flag: the first underflow latches it,
//! and every subsequent read becomes a no-op that returns a zero value. This
//! lets cluster handlers decode a whole record without checking each field
//! and test `ok()` once at the end, which is how the on-air protocol expects
//! truncated frames to be handled.

/// Seconds between the Unix epoch and 2000-01-01T00:00:00Z, the epoch the
/// mesh protocol uses for UTC time attributes.
pub const UTC_EPOCH_OFFSET: u32 = 946_684_800;

/// Sequential little-endian reader over a frame payload.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    ok: bool,
}

impl<'a> WireReader<'a> {
    /// Create a reader over the given payload.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, ok: true }
    }

    /// True while no read has underflowed.
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Bytes left in the stream.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// True when the stream is fully consumed (and still healthy).
    pub fn at_end(&self) -> bool {
        self.ok && self.remaining() == 0
    }

    /// Current read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if !self.ok {
            return None;
        }
        if self.remaining() < n {
            self.ok = false;
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    /// Skip `n` bytes; latches the error flag on underflow.
    pub fn skip(&mut self, n: usize) {
        let _ = self.take(n);
    }

    pub fn read_u8(&mut self) -> u8 {
        self.take(1).map(|b| b[0]).unwrap_or(0)
    }

    pub fn read_u16(&mut self) -> u16 {
        self.take(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .unwrap_or(0)
    }

    /// 24-bit unsigned, widened to u32.
    pub fn read_u24(&mut self) -> u32 {
        self.take(3)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
            .unwrap_or(0)
    }

    pub fn read_u32(&mut self) -> u32 {
        self.take(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    }

    /// 40-bit unsigned, widened to u64.
    pub fn read_u40(&mut self) -> u64 {
        self.read_uint(5)
    }

    /// 48-bit unsigned, widened to u64.
    pub fn read_u48(&mut self) -> u64 {
        self.read_uint(6)
    }

    pub fn read_u64(&mut self) -> u64 {
        self.read_uint(8)
    }

    /// Read an unsigned little-endian integer of 1..=8 bytes.
    pub fn read_uint(&mut self, width: usize) -> u64 {
        debug_assert!(width >= 1 && width <= 8);
        match self.take(width) {
            Some(bytes) => {
                let mut out = [0u8; 8];
                out[..width].copy_from_slice(bytes);
                u64::from_le_bytes(out)
            }
            None => 0,
        }
    }

    /// Read a signed little-endian integer of 1..=8 bytes (sign-extended).
    pub fn read_int(&mut self, width: usize) -> i64 {
        let raw = self.read_uint(width);
        if !self.ok {
            return 0;
        }
        let shift = 64 - width as u32 * 8;
        ((raw << shift) as i64) >> shift
    }

    pub fn read_i8(&mut self) -> i8 {
        self.read_int(1) as i8
    }

    pub fn read_i16(&mut self) -> i16 {
        self.read_int(2) as i16
    }

    pub fn read_i32(&mut self) -> i32 {
        self.read_int(4) as i32
    }

    pub fn read_i64(&mut self) -> i64 {
        self.read_int(8)
    }

    pub fn read_f32(&mut self) -> f32 {
        f32::from_bits(self.read_u32())
    }

    pub fn read_bool(&mut self) -> bool {
        self.read_u8() != 0
    }

    /// Length-prefixed character string (one-byte length, not null-terminated).
    /// A length of 0xFF marks an invalid/absent string and yields empty.
    pub fn read_string(&mut self) -> String {
        let len = self.read_u8();
        if len == 0xFF {
            return String::new();
        }
        match self.take(len as usize) {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => String::new(),
        }
    }

    /// Length-prefixed octet string (one-byte length).
    pub fn read_octets(&mut self) -> Vec<u8> {
        let len = self.read_u8();
        if len == 0xFF {
            return Vec::new();
        }
        self.take(len as usize).map(|b| b.to_vec()).unwrap_or_default()
    }

    /// UTC time: u32 seconds since 2000-01-01, returned as Unix seconds.
    pub fn read_utc_time(&mut self) -> u64 {
        let secs = self.read_u32();
        if !self.ok {
            return 0;
        }
        u64::from(secs) + u64::from(UTC_EPOCH_OFFSET)
    }
}

/// Growable little-endian writer for outbound payloads.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self { buf: Vec::with_capacity(cap) }
    }

    /// Consume the writer, yielding the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u24(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes()[..3]);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u40(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes()[..5]);
    }

    pub fn write_u48(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes()[..6]);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an unsigned little-endian integer of 1..=8 bytes.
    pub fn write_uint(&mut self, v: u64, width: usize) {
        debug_assert!(width >= 1 && width <= 8);
        self.buf.extend_from_slice(&v.to_le_bytes()[..width]);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.write_u8(v as u8);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_u16(v as u16);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write_u64(v as u64);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Length-prefixed character string; truncated at 254 bytes.
    pub fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len().min(254);
        self.write_u8(len as u8);
        self.buf.extend_from_slice(&bytes[..len]);
    }

    /// Length-prefixed octet string; truncated at 254 bytes.
    pub fn write_octets(&mut self, data: &[u8]) {
        let len = data.len().min(254);
        self.write_u8(len as u8);
        self.buf.extend_from_slice(&data[..len]);
    }

    /// UTC time attribute from Unix seconds.
    pub fn write_utc_time(&mut self, unix_secs: u64) {
        let secs = unix_secs.saturating_sub(u64::from(UTC_EPOCH_OFFSET));
        self.write_u32(secs as u32);
    }

    /// Raw bytes, no length prefix.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_integers() {
        let mut w = WireWriter::new();
        w.write_u8(0xAB);
        w.write_u16(0x1234);
        w.write_u24(0x00ABCDEF);
        w.write_u32(0xDEADBEEF);
        w.write_u48(0x0000_7766_5544_3322);
        w.write_u64(0x1122_3344_5566_7788);
        w.write_i16(-273);
        w.write_i32(-1_000_000);

        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_u8(), 0xAB);
        assert_eq!(r.read_u16(), 0x1234);
        assert_eq!(r.read_u24(), 0x00ABCDEF);
        assert_eq!(r.read_u32(), 0xDEADBEEF);
        assert_eq!(r.read_u48(), 0x0000_7766_5544_3322);
        assert_eq!(r.read_u64(), 0x1122_3344_5566_7788);
        assert_eq!(r.read_i16(), -273);
        assert_eq!(r.read_i32(), -1_000_000);
        assert!(r.at_end());
    }

    #[test]
    fn test_sign_extension() {
        let mut w = WireWriter::new();
        w.write_i8(-1);
        w.write_uint(0xFF_FFFE, 3); // 24-bit -2
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_i8(), -1);
        assert_eq!(r.read_int(3), -2);
        assert!(r.ok());
    }

    #[test]
    fn test_underflow_latches() {
        let bytes = [0x01, 0x02];
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_u32(), 0);
        assert!(!r.ok());
        // Further reads are no-ops returning zero, even though data remains.
        assert_eq!(r.read_u8(), 0);
        assert_eq!(r.read_u16(), 0);
        assert_eq!(r.read_string(), "");
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn test_strings() {
        let mut w = WireWriter::new();
        w.write_string("SP 120");
        w.write_octets(&[0xDE, 0xAD]);
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_string(), "SP 120");
        assert_eq!(r.read_octets(), vec![0xDE, 0xAD]);
        assert!(r.at_end());
    }

    #[test]
    fn test_string_invalid_marker() {
        // 0xFF length marks an invalid string; nothing more is consumed.
        let bytes = [0xFF, 0x41];
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_string(), "");
        assert!(r.ok());
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_truncated_string_underflows() {
        let bytes = [0x05, b'a', b'b'];
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_string(), "");
        assert!(!r.ok());
    }

    #[test]
    fn test_utc_time_epoch() {
        let mut w = WireWriter::new();
        w.write_utc_time(u64::from(UTC_EPOCH_OFFSET) + 60);
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_utc_time(), u64::from(UTC_EPOCH_OFFSET) + 60);
    }

    #[test]
    fn test_f32_roundtrip() {
        let mut w = WireWriter::new();
        w.write_f32(21.5);
        let bytes = w.into_bytes();
        let mut r = WireReader::new(&bytes);
        assert!((r.read_f32() - 21.5).abs() < f32::EPSILON);
    }
}
