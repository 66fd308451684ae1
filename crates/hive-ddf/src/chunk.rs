//! Tagged-chunk container format
//!
//! Bundles are nested chunks: a four-byte ASCII tag followed by a u32
//! little-endian payload length and the payload bytes. The outer chunk is
//! `RIFF`; inside it a `DDFB` chunk carries one `DESC` chunk (the JSON
//! descriptor) and zero or more `EXTF` chunks (embedded external files).

use crate::error::{DdfError, Result};

pub const TAG_RIFF: [u8; 4] = *b"RIFF";
pub const TAG_DDFB: [u8; 4] = *b"DDFB";
pub const TAG_DESC: [u8; 4] = *b"DESC";
pub const TAG_EXTF: [u8; 4] = *b"EXTF";

/// One chunk: tag plus borrowed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub tag: [u8; 4],
    pub payload: &'a [u8],
}

/// Iterate the chunks of a buffer; each item is `(tag, payload)` and a
/// declared length past the end of the buffer is an error.
pub struct ChunkIter<'a> {
    data: &'a [u8],
}

impl<'a> ChunkIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < 8 {
            let err = DdfError::TooShort(self.data.len());
            self.data = &[];
            return Some(Err(err));
        }
        let tag: [u8; 4] = self.data[0..4].try_into().expect("length checked");
        let len = u32::from_le_bytes(self.data[4..8].try_into().expect("length checked")) as usize;
        let rest = &self.data[8..];
        if len > rest.len() {
            let err = DdfError::TruncatedChunk { tag, declared: len, remaining: rest.len() };
            self.data = &[];
            return Some(Err(err));
        }
        self.data = &rest[len..];
        Some(Ok(Chunk { tag, payload: &rest[..len] }))
    }
}

/// An external file embedded in a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalFile {
    /// Four-character file-type tag, e.g. `SCJS`
    pub file_type: [u8; 4],
    /// Relative path inside the bundle
    pub path: String,
    /// Optional modification-time string, empty when absent
    pub mtime: String,
    /// Raw file bytes
    pub data: Vec<u8>,
}

impl ExternalFile {
    /// Decode one `EXTF` payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let need = |pos: usize, n: usize| -> Result<()> {
            if pos + n > payload.len() {
                return Err(DdfError::TruncatedChunk {
                    tag: TAG_EXTF,
                    declared: pos + n,
                    remaining: payload.len(),
                });
            }
            Ok(())
        };

        need(pos, 4)?;
        let file_type: [u8; 4] = payload[pos..pos + 4].try_into().expect("length checked");
        pos += 4;

        need(pos, 2)?;
        let path_len =
            u16::from_le_bytes(payload[pos..pos + 2].try_into().expect("length checked")) as usize;
        pos += 2;
        need(pos, path_len)?;
        let path = String::from_utf8_lossy(&payload[pos..pos + path_len]).into_owned();
        pos += path_len;

        need(pos, 2)?;
        let mtime_len =
            u16::from_le_bytes(payload[pos..pos + 2].try_into().expect("length checked")) as usize;
        pos += 2;
        need(pos, mtime_len)?;
        let mtime = String::from_utf8_lossy(&payload[pos..pos + mtime_len]).into_owned();
        pos += mtime_len;

        need(pos, 4)?;
        let file_size =
            u32::from_le_bytes(payload[pos..pos + 4].try_into().expect("length checked")) as usize;
        pos += 4;
        need(pos, file_size)?;
        let data = payload[pos..pos + file_size].to_vec();

        Ok(Self { file_type, path, mtime, data })
    }

    /// Encode into an `EXTF` payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.path.len() + self.mtime.len() + self.data.len());
        out.extend_from_slice(&self.file_type);
        out.extend_from_slice(&(self.path.len() as u16).to_le_bytes());
        out.extend_from_slice(self.path.as_bytes());
        out.extend_from_slice(&(self.mtime.len() as u16).to_le_bytes());
        out.extend_from_slice(self.mtime.as_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// A parsed bundle: descriptor bytes, external files, and the raw `DDFB`
/// chunk (header included) the bundle hash is computed over.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Raw JSON bytes of the `DESC` chunk
    pub descriptor_json: Vec<u8>,
    /// Embedded external files in file order
    pub files: Vec<ExternalFile>,
    /// The complete `DDFB` chunk including its 8-byte header
    pub ddfb_raw: Vec<u8>,
}

impl Bundle {
    /// Parse a complete bundle file.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(DdfError::TooShort(data.len()));
        }
        let outer = ChunkIter::new(data)
            .next()
            .ok_or(DdfError::TooShort(data.len()))??;
        if outer.tag != TAG_RIFF {
            return Err(DdfError::NotRiff(outer.tag));
        }

        let mut ddfb: Option<Chunk<'_>> = None;
        for chunk in ChunkIter::new(outer.payload) {
            let chunk = chunk?;
            if chunk.tag == TAG_DDFB {
                ddfb = Some(chunk);
                break;
            }
        }
        let ddfb = ddfb.ok_or(DdfError::MissingDdfb)?;

        let mut descriptor_json = None;
        let mut files = Vec::new();
        for chunk in ChunkIter::new(ddfb.payload) {
            let chunk = chunk?;
            match chunk.tag {
                TAG_DESC => {
                    if descriptor_json.is_none() {
                        descriptor_json = Some(chunk.payload.to_vec());
                    }
                }
                TAG_EXTF => files.push(ExternalFile::decode(chunk.payload)?),
                _ => {}
            }
        }
        let descriptor_json = descriptor_json.ok_or(DdfError::MissingDescriptor)?;

        let mut ddfb_raw = Vec::with_capacity(8 + ddfb.payload.len());
        ddfb_raw.extend_from_slice(&TAG_DDFB);
        ddfb_raw.extend_from_slice(&(ddfb.payload.len() as u32).to_le_bytes());
        ddfb_raw.extend_from_slice(ddfb.payload);

        Ok(Self { descriptor_json, files, ddfb_raw })
    }

    /// Encode a bundle file from descriptor bytes and external files.
    pub fn encode(descriptor_json: &[u8], files: &[ExternalFile]) -> Vec<u8> {
        let mut ddfb = Vec::new();
        ddfb.extend_from_slice(&TAG_DESC);
        ddfb.extend_from_slice(&(descriptor_json.len() as u32).to_le_bytes());
        ddfb.extend_from_slice(descriptor_json);
        for file in files {
            let payload = file.encode();
            ddfb.extend_from_slice(&TAG_EXTF);
            ddfb.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            ddfb.extend_from_slice(&payload);
        }

        let mut out = Vec::with_capacity(ddfb.len() + 16);
        out.extend_from_slice(&TAG_RIFF);
        out.extend_from_slice(&((ddfb.len() + 8) as u32).to_le_bytes());
        out.extend_from_slice(&TAG_DDFB);
        out.extend_from_slice(&(ddfb.len() as u32).to_le_bytes());
        out.extend_from_slice(&ddfb);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bundle() -> Vec<u8> {
        let file = ExternalFile {
            file_type: *b"SCJS",
            path: "scripts/bri.js".into(),
            mtime: "2024-01-01T00:00:00Z".into(),
            data: b"Item.val = Attr.val".to_vec(),
        };
        Bundle::encode(br#"{"manufacturername":"Acme","modelid":"bulb-1","schema":"devcap1.schema.json"}"#, &[file])
    }

    #[test]
    fn test_parse_roundtrip() {
        let raw = sample_bundle();
        let bundle = Bundle::parse(&raw).unwrap();
        assert_eq!(bundle.files.len(), 1);
        assert_eq!(bundle.files[0].path, "scripts/bri.js");
        assert_eq!(bundle.files[0].file_type, *b"SCJS");
        assert!(bundle.descriptor_json.starts_with(b"{"));
        assert_eq!(&bundle.ddfb_raw[0..4], b"DDFB");
    }

    #[test]
    fn test_outer_must_be_riff() {
        let mut raw = sample_bundle();
        raw[0..4].copy_from_slice(b"JUNK");
        assert!(matches!(Bundle::parse(&raw), Err(DdfError::NotRiff(_))));
    }

    #[test]
    fn test_truncated_chunk_rejected() {
        let mut raw = sample_bundle();
        // Inflate the declared DDFB length past the end of the file.
        raw[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Bundle::parse(&raw),
            Err(DdfError::TruncatedChunk { .. })
        ));
    }

    #[test]
    fn test_missing_desc_rejected() {
        let raw = Bundle::encode(b"{}", &[]);
        // Swap the DESC tag for an unknown one.
        let mut raw = raw;
        let pos = raw.windows(4).position(|w| w == b"DESC").unwrap();
        raw[pos..pos + 4].copy_from_slice(b"XXXX");
        assert!(matches!(Bundle::parse(&raw), Err(DdfError::MissingDescriptor)));
    }

    #[test]
    fn test_extf_roundtrip_empty_mtime() {
        let file = ExternalFile {
            file_type: *b"BTNM",
            path: "buttons.json".into(),
            mtime: String::new(),
            data: vec![1, 2, 3],
        };
        let decoded = ExternalFile::decode(&file.encode()).unwrap();
        assert_eq!(decoded, file);
    }
}
