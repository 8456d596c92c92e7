//! RFC 1071 Internet checksum.
//!
//! The data is summed as big-endian 16-bit words (an odd trailing byte is
//! treated as the high half of a final word padded with zero), carries are
//! folded back into the low 16 bits until none remain, and the one's
//! complement of the result is returned.

/// Computes the Internet checksum over `data`.
///
/// An empty slice yields `0xFFFF`. Inserting the returned value into a
/// zeroed checksum field and recomputing over the same bytes yields `0`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut words = data.chunks_exact(2);
    let mut sum: u64 = words
        .by_ref()
        .map(|word| u64::from(u16::from_be_bytes([word[0], word[1]])))
        .sum();

    if let [last] = words.remainder() {
        sum += u64::from(u16::from_be_bytes([*last, 0]));
    }

    !fold(sum)
}

/// Folds carries above bit 15 back into the low half until the sum fits.
fn fold(mut sum: u64) -> u16 {
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1071_example() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), 0x220d);
    }

    #[test]
    fn ipv4_header_example() {
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(internet_checksum(&header), 0xb861);
    }

    #[test]
    fn empty_input() {
        assert_eq!(internet_checksum(&[]), 0xFFFF);
    }

    #[test]
    fn inserted_checksum_validates_to_zero() {
        let mut header = [
            0x45, 0x00, 0x01, 0x48, 0xf9, 0xcf, 0x00, 0x00, 0xff, 0x11, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
        ];
        let sum = internet_checksum(&header);
        header[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(internet_checksum(&header), 0x0000);
    }

    #[test]
    fn odd_length_matches_zero_padded() {
        let odd = [0x12, 0x34, 0x56, 0x78, 0x9a];
        let padded = [0x12, 0x34, 0x56, 0x78, 0x9a, 0x00];
        assert_eq!(internet_checksum(&odd), internet_checksum(&padded));
        assert_eq!(internet_checksum(&[0xab]), !0xab00);
    }

    #[test]
    fn folds_until_no_carry_remains() {
        // 0xffff + 0xffff + 0x0001 = 0x1ffff; one fold leaves 0x10000.
        let data = [0xff, 0xff, 0xff, 0xff, 0x00, 0x01];
        assert_eq!(internet_checksum(&data), 0xfffe);
    }

    #[test]
    fn long_input_does_not_overflow() {
        let data = vec![0xffu8; 1 << 20];
        assert_eq!(internet_checksum(&data), 0x0000);
    }
}
