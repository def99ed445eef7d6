//! GLB container framing.
//!
//! A GLB file is a 12-byte header followed by a JSON chunk (padded with
//! spaces) and a BIN chunk (padded with zeros), each preceded by an
//! 8-byte chunk header.

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// Frame a JSON document and binary blob into a single GLB byte vector.
pub fn frame_glb(json: &[u8], bin: &[u8]) -> Vec<u8> {
    let json_len = pad4(json.len());
    let bin_len = pad4(bin.len());
    let total = 12 + 8 + json_len + 8 + bin_len;

    let mut out = Vec::with_capacity(total);

    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());

    out.extend_from_slice(&(json_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(json);
    out.resize(out.len() + json_len - json.len(), b' ');

    out.extend_from_slice(&(bin_len as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(bin);
    out.resize(out.len() + bin_len - bin.len(), 0);

    out
}

/// GLB container version, if `data` is a GLB file at all.
pub fn glb_version(data: &[u8]) -> Option<u32> {
    if data.len() >= 12 && data[0..4] == GLB_MAGIC.to_le_bytes() {
        Some(u32::from_le_bytes([data[4], data[5], data[6], data[7]]))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_length_equation() {
        let json = br#"{"asset":{"version":"2.0"}}"#; // 27 bytes
        let bin = [1u8, 2, 3];

        let glb = frame_glb(json, &bin);

        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes([glb[4], glb[5], glb[6], glb[7]]), 2);

        let total = u32::from_le_bytes([glb[8], glb[9], glb[10], glb[11]]) as usize;
        assert_eq!(total, glb.len());
        assert_eq!(total, 12 + 8 + pad4(json.len()) + 8 + pad4(bin.len()));
    }

    #[test]
    fn json_chunk_is_space_padded() {
        let json = b"{}"; // pads by 2
        let glb = frame_glb(json, &[]);

        let json_len = u32::from_le_bytes([glb[12], glb[13], glb[14], glb[15]]) as usize;
        assert_eq!(json_len, 4);
        assert_eq!(u32::from_le_bytes([glb[16], glb[17], glb[18], glb[19]]), CHUNK_JSON);
        assert_eq!(&glb[20..24], b"{}  ");
    }

    #[test]
    fn bin_chunk_is_zero_padded() {
        let glb = frame_glb(b"{}  ", &[0xAB]);

        let bin_start = 12 + 8 + 4;
        let bin_len =
            u32::from_le_bytes([glb[bin_start], glb[bin_start + 1], glb[bin_start + 2], glb[bin_start + 3]])
                as usize;
        assert_eq!(bin_len, 4);
        let tag_at = bin_start + 4;
        assert_eq!(
            u32::from_le_bytes([glb[tag_at], glb[tag_at + 1], glb[tag_at + 2], glb[tag_at + 3]]),
            CHUNK_BIN
        );
        assert_eq!(&glb[tag_at + 4..], &[0xAB, 0, 0, 0]);
    }

    #[test]
    fn version_sniffing() {
        let glb = frame_glb(b"{}", &[]);
        assert_eq!(glb_version(&glb), Some(2));
        assert_eq!(glb_version(b"{\"asset\":{}}"), None);

        let mut legacy = glb.clone();
        legacy[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert_eq!(glb_version(&legacy), Some(1));
    }
}
