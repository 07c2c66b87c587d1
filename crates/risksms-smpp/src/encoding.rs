//! Text-to-PDU-bytes encoding and concatenated-SMS segmentation.
//!
//! The source system encodes with the ISO-8859-1 mapping as a practical
//! stand-in for the 7-bit GSM default alphabet; that is byte-for-byte
//! correct for plain ASCII and wrong for several GSM-specific glyphs. This
//! crate preserves that observed behavior rather than correcting it —
//! `TextEncoder` is the seam a real GSM-7 packer would slot into later.

const SINGLE_SEGMENT_LIMIT: usize = 160;
const MULTI_SEGMENT_PART_LIMIT: usize = 153;
const UDH_LEN: usize = 6;

const ESM_CLASS_SINGLE: u8 = 0x00;
const ESM_CLASS_CONCATENATED: u8 = 0x40;
const DATA_CODING_DEFAULT: u8 = 0x00;

/// Encodes application text into the byte form carried in a submit_sm
/// short_message field.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u8>;
}

/// Encodes each `char` as its ISO-8859-1 byte value, truncating any
/// codepoint above `0xFF` to its low byte. Matches the observed behavior
/// of the original system exactly; see the module doc comment.
#[derive(Debug, Default, Clone, Copy)]
pub struct Iso88591Encoder;

impl TextEncoder for Iso88591Encoder {
    fn encode(&self, text: &str) -> Vec<u8> {
        text.chars().map(|c| c as u32 as u8).collect()
    }
}

/// One outbound PDU's worth of encoded payload.
#[derive(Debug, Clone)]
pub struct Segment {
    pub part_num: u8,
    pub total_parts: u8,
    pub esm_class: u8,
    pub data_coding: u8,
    /// UDH-prefixed (if `total_parts > 1`) payload bytes ready for
    /// `short_message`.
    pub body: Vec<u8>,
}

/// Splits encoded text into one or more segments per the wire rules in
/// the SMPP submission contract: <= 160 bytes is a single segment with
/// `esm_class = 0x00`; longer text is split into 153-byte parts, each
/// prefixed with a 6-byte UDH `{0x05, 0x00, 0x03, ref_num, total, part}`
/// and `esm_class = 0x40`. `ref_num` is shared by every part of one
/// message.
pub fn segment(encoded: &[u8], ref_num: u8) -> Vec<Segment> {
    if encoded.len() <= SINGLE_SEGMENT_LIMIT {
        return vec![Segment {
            part_num: 1,
            total_parts: 1,
            esm_class: ESM_CLASS_SINGLE,
            data_coding: DATA_CODING_DEFAULT,
            body: encoded.to_vec(),
        }];
    }

    let chunks: Vec<&[u8]> = encoded.chunks(MULTI_SEGMENT_PART_LIMIT).collect();
    let total_parts = chunks.len() as u8;

    chunks
        .into_iter()
        .enumerate()
        .map(|(idx, chunk)| {
            let part_num = (idx + 1) as u8;
            let mut body = Vec::with_capacity(UDH_LEN + chunk.len());
            body.extend_from_slice(&[0x05, 0x00, 0x03, ref_num, total_parts, part_num]);
            body.extend_from_slice(chunk);
            Segment {
                part_num,
                total_parts,
                esm_class: ESM_CLASS_CONCATENATED,
                data_coding: DATA_CODING_DEFAULT,
                body,
            }
        })
        .collect()
}

/// Picks a one-byte reference number common to all segments of one
/// message, from the low byte of the current time — matches the
/// original's "low byte of current millis" choice closely enough that two
/// concurrently-segmented messages rarely collide, without requiring a
/// shared sequence counter.
pub fn next_ref_num() -> u8 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    (millis & 0xFF) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso88591_is_byte_identity_for_ascii() {
        let encoder = Iso88591Encoder;
        assert_eq!(encoder.encode("Hola"), vec![b'H', b'o', b'l', b'a']);
    }

    #[test]
    fn exactly_160_is_one_segment_unmarked() {
        let text = "a".repeat(160);
        let encoded = Iso88591Encoder.encode(&text);
        let segments = segment(&encoded, 0x01);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].esm_class, ESM_CLASS_SINGLE);
        assert_eq!(segments[0].body.len(), 160);
    }

    #[test]
    fn exactly_161_splits_into_153_and_8() {
        let text = "a".repeat(161);
        let encoded = Iso88591Encoder.encode(&text);
        let segments = segment(&encoded, 0x02);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].body.len(), UDH_LEN + 153);
        assert_eq!(segments[1].body.len(), UDH_LEN + 8);
        assert!(segments.iter().all(|s| s.esm_class == ESM_CLASS_CONCATENATED));
    }

    #[test]
    fn exactly_306_splits_evenly_into_two_153s() {
        let text = "a".repeat(306);
        let encoded = Iso88591Encoder.encode(&text);
        let segments = segment(&encoded, 0x03);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].body.len(), UDH_LEN + 153);
        assert_eq!(segments[1].body.len(), UDH_LEN + 153);
    }

    #[test]
    fn exactly_307_spills_into_a_third_segment() {
        let text = "a".repeat(307);
        let encoded = Iso88591Encoder.encode(&text);
        let segments = segment(&encoded, 0x04);
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn udh_carries_shared_ref_num_and_increasing_part_numbers() {
        let text = "b".repeat(400);
        let encoded = Iso88591Encoder.encode(&text);
        let segments = segment(&encoded, 0x7A);
        for (i, seg) in segments.iter().enumerate() {
            assert_eq!(seg.body[3], 0x7A);
            assert_eq!(seg.body[5], (i + 1) as u8);
            assert_eq!(seg.total_parts, segments.len() as u8);
        }
    }

    #[test]
    fn reassembled_payloads_equal_original_encoded_bytes() {
        let text = "c".repeat(500);
        let encoded = Iso88591Encoder.encode(&text);
        let segments = segment(&encoded, 0x10);
        let reassembled: Vec<u8> = segments
            .iter()
            .flat_map(|s| s.body[UDH_LEN..].to_vec())
            .collect();
        assert_eq!(reassembled, encoded);
    }
}
