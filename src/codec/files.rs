//! File records as returned by `ListFilesResponse`.

use crate::Error;

/// A file entry on the device's storage, as reported by `ListFiles`.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
}

impl FileInfo {
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.name.len() as u8);
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(&self.size.to_be_bytes());
    }

    /// Decodes one record, returning the record and the number of bytes consumed.
    pub(crate) fn decode(body: &[u8]) -> Result<(Self, usize), Error> {
        let name_len = *body
            .first()
            .ok_or_else(|| Error::DecodeError("file record missing name length".into()))?
            as usize;
        let name_bytes = body
            .get(1..1 + name_len)
            .ok_or_else(|| Error::DecodeError("file record name truncated".into()))?;
        let name = std::str::from_utf8(name_bytes)
            .map(|s| s.to_string())
            .map_err(Error::from)?;
        let size_start = 1 + name_len;
        let size = u64::from_be_bytes(
            body.get(size_start..size_start + 8)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| Error::DecodeError("file record size truncated".into()))?,
        );
        Ok((FileInfo { name, size }, size_start + 8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_file_record() {
        let info = FileInfo {
            name: "recording.bin".to_string(),
            size: 123_456,
        };
        let mut buf = Vec::new();
        info.encode(&mut buf);
        let (decoded, consumed) = FileInfo::decode(&buf).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn decodes_consecutive_records_from_a_list() {
        let a = FileInfo {
            name: "a.bin".into(),
            size: 1,
        };
        let b = FileInfo {
            name: "bb.bin".into(),
            size: 2,
        };
        let mut buf = Vec::new();
        a.encode(&mut buf);
        b.encode(&mut buf);

        let (decoded_a, n) = FileInfo::decode(&buf).unwrap();
        let (decoded_b, _) = FileInfo::decode(&buf[n..]).unwrap();
        assert_eq!(decoded_a, a);
        assert_eq!(decoded_b, b);
    }
}
