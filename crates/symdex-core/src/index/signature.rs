//! Content signature stored with every cached index.

use gimli::write::Writer;
use gimli::Reader;

use super::codec::{corrupt, CacheReader, CacheWriter};
use crate::error::{IndexError, IndexResult};

const TAG_UUID: u8 = 1;
const TAG_MOD_TIME: u8 = 2;
const TAG_CONTENT_HASH: u8 = 3;
const TAG_END: u8 = 255;

/// Fingerprint of the object file an index was built from
///
/// Any field may be missing; a signature with no fields is invalid and
/// cannot be persisted. Two signatures match only when every field matches,
/// including presence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CacheSignature
{
    /// Build id / Mach-O UUID
    pub uuid: Option<Vec<u8>>,
    /// Modification time of the object file, in seconds since the epoch
    pub mod_time: Option<u32>,
    /// Hash of the object file contents
    pub content_hash: Option<u32>,
}

impl CacheSignature
{
    pub fn is_valid(&self) -> bool
    {
        self.uuid.as_ref().is_some_and(|uuid| !uuid.is_empty()) || self.mod_time.is_some() || self.content_hash.is_some()
    }

    /// Tagged fields followed by an end tag.
    pub(crate) fn encode(&self, writer: &mut CacheWriter) -> IndexResult<()>
    {
        if !self.is_valid() {
            return Err(IndexError::SignatureUnavailable);
        }
        if let Some(uuid) = self.uuid.as_ref().filter(|uuid| !uuid.is_empty()) {
            let len = u8::try_from(uuid.len()).map_err(|_| IndexError::SignatureUnavailable)?;
            writer.write_u8(TAG_UUID)?;
            writer.write_u8(len)?;
            writer.write(uuid)?;
        }
        if let Some(mod_time) = self.mod_time {
            writer.write_u8(TAG_MOD_TIME)?;
            writer.write_u32(mod_time)?;
        }
        if let Some(content_hash) = self.content_hash {
            writer.write_u8(TAG_CONTENT_HASH)?;
            writer.write_u32(content_hash)?;
        }
        writer.write_u8(TAG_END)?;
        Ok(())
    }

    pub(crate) fn decode(reader: &mut CacheReader<'_>) -> IndexResult<Self>
    {
        let mut signature = CacheSignature::default();
        loop {
            match reader.read_u8().map_err(corrupt("signature tag"))? {
                TAG_UUID => {
                    let len = reader.read_u8().map_err(corrupt("signature UUID length"))?;
                    let bytes = reader.split(usize::from(len)).map_err(corrupt("signature UUID"))?;
                    signature.uuid = Some(bytes.slice().to_vec());
                }
                TAG_MOD_TIME => {
                    signature.mod_time = Some(reader.read_u32().map_err(corrupt("signature modification time"))?);
                }
                TAG_CONTENT_HASH => {
                    signature.content_hash = Some(reader.read_u32().map_err(corrupt("signature content hash"))?);
                }
                TAG_END => break,
                tag => return Err(IndexError::CorruptCache(format!("unknown signature tag {tag}"))),
            }
        }
        if signature.is_valid() {
            Ok(signature)
        } else {
            Err(IndexError::CorruptCache("empty signature".to_string()))
        }
    }
}

#[cfg(test)]
mod tests
{
    use gimli::{EndianSlice, LittleEndian};

    use super::*;

    #[test]
    fn test_invalid_signature_is_not_encoded()
    {
        let mut writer = CacheWriter::new(LittleEndian);
        let err = CacheSignature::default().encode(&mut writer).unwrap_err();
        assert!(matches!(err, IndexError::SignatureUnavailable));
        assert!(writer.slice().is_empty());
    }

    #[test]
    fn test_signature_round_trip()
    {
        let signature = CacheSignature {
            uuid: Some(vec![0xde, 0xad, 0xbe, 0xef]),
            mod_time: None,
            content_hash: Some(0x1234_5678),
        };
        let mut writer = CacheWriter::new(LittleEndian);
        signature.encode(&mut writer).unwrap();
        let bytes = writer.into_vec();
        let mut reader = EndianSlice::new(&bytes, LittleEndian);
        assert_eq!(CacheSignature::decode(&mut reader).unwrap(), signature);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unknown_tag_is_corrupt()
    {
        let bytes = [7u8, 0, 0];
        let mut reader = EndianSlice::new(&bytes, LittleEndian);
        assert!(matches!(
            CacheSignature::decode(&mut reader),
            Err(IndexError::CorruptCache(_))
        ));
    }
}
