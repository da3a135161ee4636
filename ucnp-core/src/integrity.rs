//! Integrity: additive 16-bit checksum over a byte span. Corruption
//! detection only, not security.

/// Sum every byte into an unsigned accumulator, truncated to 16 bits.
pub fn checksum16(data: &[u8]) -> u16 {
    let sum = data
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)));
    (sum & 0xFFFF) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_span_is_zero() {
        assert_eq!(checksum16(&[]), 0);
    }

    #[test]
    fn deterministic() {
        let data = b"the same logical message";
        assert_eq!(checksum16(data), checksum16(data));
    }

    #[test]
    fn single_byte_flip_changes_sum() {
        let data = b"hello world".to_vec();
        let base = checksum16(&data);
        for i in 0..data.len() {
            let mut tampered = data.clone();
            tampered[i] ^= 0x01;
            assert_ne!(checksum16(&tampered), base, "flip at byte {i}");
        }
    }

    #[test]
    fn truncates_to_16_bits() {
        // 258 bytes of 0xFF: sum = 0x100FE, truncated to 0x00FE.
        let data = vec![0xFFu8; 258];
        assert_eq!(checksum16(&data), 0x00FE);
    }
}
