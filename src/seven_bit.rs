//! 7-bit packing of 8-bit payloads.
//!
//! SysEx bodies may only carry bytes with bit 7 clear. Payloads are split into groups
//! of up to seven bytes, each preceded by a header byte collecting the stripped high
//! bits: bit `i` of the header is bit 7 of the group's byte `i`.
//!
//! ```text
//! data:   d0 d1 d2 d3 d4 d5 d6 | d7 d8 d9
//! packed: h0 d0' d1' .. d6'    | h1 d7' d8' d9'
//! ```

/// Number of payload bytes carried per group.
pub const GROUP_LEN: usize = 7;

/// Returns the packed size of `len` payload bytes.
pub const fn packed_len(len: usize) -> usize {
    len + len.div_ceil(GROUP_LEN)
}

/// Returns the payload size recovered from `len` packed bytes.
pub const fn unpacked_len(len: usize) -> usize {
    len - len.div_ceil(GROUP_LEN + 1)
}

/// Packs an 8-bit payload into 7-bit words.
pub fn pack(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(packed_len(data.len()));

    for group in data.chunks(GROUP_LEN) {
        let header = group
            .iter()
            .enumerate()
            .fold(0u8, |header, (i, byte)| header | ((byte >> 7) << i));

        packed.push(header);
        packed.extend(group.iter().map(|byte| byte & 0x7F));
    }

    packed
}

/// Restores an 8-bit payload from its packed form.
///
/// The final group may be short. A trailing lone header byte carries no data and
/// is ignored.
pub fn unpack(packed: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(unpacked_len(packed.len()));

    for group in packed.chunks(GROUP_LEN + 1) {
        let (header, bytes) = (group[0], &group[1..]);
        data.extend(
            bytes
                .iter()
                .enumerate()
                .map(|(i, byte)| (byte & 0x7F) | (((header >> i) & 1) << 7)),
        );
    }

    data
}

#[cfg(test)]
mod tests {
    use super::{pack, packed_len, unpack, unpacked_len};

    #[test]
    fn packs_ascii_without_high_bits() {
        let packed = pack(b"ABCDEFGHIJ");

        assert_eq!(packed.len(), packed_len(10));
        assert_eq!(
            packed,
            vec![
                0x00, b'A', b'B', b'C', b'D', b'E', b'F', b'G', //
                0x00, b'H', b'I', b'J',
            ]
        );
        assert_eq!(unpack(&packed), b"ABCDEFGHIJ");
    }

    #[test]
    fn collects_high_bits_into_header() {
        let data = [0x80, 0x01, 0xFF, 0x7F, 0x00, 0x00, 0x81];
        let packed = pack(&data);

        assert_eq!(packed, vec![0b0100_0101, 0x00, 0x01, 0x7F, 0x7F, 0x00, 0x00, 0x01]);
        assert!(packed.iter().all(|byte| byte & 0x80 == 0));
        assert_eq!(unpack(&packed), data);
    }

    #[test]
    fn full_groups_take_eight_bytes() {
        for groups in 0..5 {
            let data = vec![0xAA; groups * 7];
            assert_eq!(pack(&data).len(), 8 * groups);
        }
    }

    #[test]
    fn round_trips_every_length() {
        for len in 0..=30 {
            let data: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_mul(37) ^ 0x95).collect();
            let packed = pack(&data);

            assert_eq!(packed.len(), packed_len(len));
            assert_eq!(unpacked_len(packed.len()), len);
            assert_eq!(unpack(&packed), data);
        }
    }

    #[test]
    fn prophet_program_sizes() {
        assert_eq!(packed_len(384), 439);
        assert_eq!(unpacked_len(439), 384);
    }
}
