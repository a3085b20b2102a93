//! TF/IDF vector-space similarity.
//!
//! The scoring primitives every query node shares: term frequency, inverse
//! document frequency, length and query normalisation, the coordination
//! factor, sloppy-phrase frequency, and the one-byte norm codec (3-bit
//! mantissa, 5-bit exponent) with its precomputed 256-entry decode table.

use std::sync::OnceLock;

/// Term-frequency factor: `sqrt(freq)`.
pub fn tf(freq: f32) -> f32 {
    freq.sqrt()
}

/// Inverse document frequency: `ln(numDocs / (docFreq + 1)) + 1`.
pub fn idf(doc_freq: u32, num_docs: u32) -> f32 {
    if num_docs == 0 {
        return 0.0;
    }
    (num_docs as f32 / (doc_freq as f32 + 1.0)).ln() + 1.0
}

/// Length normalisation of a field with `num_tokens` terms.
pub fn length_norm(num_tokens: u32) -> f32 {
    if num_tokens == 0 {
        return 0.0;
    }
    1.0 / (num_tokens as f32).sqrt()
}

/// Query normalisation from the sum of squared clause weights.
pub fn query_norm(sum_of_squared_weights: f32) -> f32 {
    if sum_of_squared_weights <= 0.0 {
        return 1.0;
    }
    1.0 / sum_of_squared_weights.sqrt()
}

/// Coordination factor: the fraction of optional clauses that matched.
pub fn coord(overlap: usize, max_overlap: usize) -> f32 {
    if max_overlap == 0 {
        return 1.0;
    }
    overlap as f32 / max_overlap as f32
}

/// Contribution of a sloppy phrase alignment at the given edit distance.
pub fn sloppy_freq(distance: u32) -> f32 {
    1.0 / (distance as f32 + 1.0)
}

/// Encode a norm as one byte: 3-bit mantissa, 5-bit exponent, zero-point 15.
///
/// Values collapse onto a coarse grid; anything at or above ~7.5e9 saturates
/// to 0xFF and non-positive values to 0.
pub fn encode_norm(f: f32) -> u8 {
    let bits = f.to_bits() as i32;
    let small = bits >> (24 - 3);
    if small < (63 - 15) << 3 {
        if bits <= 0 { 0 } else { 1 }
    } else if small >= ((63 - 15) << 3) + 0x100 {
        0xFF
    } else {
        (small - ((63 - 15) << 3)) as u8
    }
}

fn byte_to_float(b: u8) -> f32 {
    if b == 0 {
        return 0.0;
    }
    let mut bits = (b as u32) << (24 - 3);
    bits += (63 - 15) << 24;
    f32::from_bits(bits)
}

/// Decode a norm byte through the precomputed table.
pub fn decode_norm(b: u8) -> f32 {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = byte_to_float(i as u8);
        }
        table
    });
    table[b as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tf_and_idf() {
        assert!((tf(4.0) - 2.0).abs() < 1e-6);
        assert!((tf(1.0) - 1.0).abs() < 1e-6);

        // idf(df=0, n=10) = ln(10) + 1
        assert!((idf(0, 10) - (10f32.ln() + 1.0)).abs() < 1e-6);
        // idf(df=9, n=10) = ln(1) + 1 = 1
        assert!((idf(9, 10) - 1.0).abs() < 1e-6);
        assert!((idf(3, 0)).abs() < 1e-6);
    }

    #[test]
    fn test_norms() {
        assert!((length_norm(4) - 0.5).abs() < 1e-6);
        assert!((length_norm(1) - 1.0).abs() < 1e-6);
        assert!(length_norm(0).abs() < 1e-6);

        assert!((query_norm(4.0) - 0.5).abs() < 1e-6);
        assert!((query_norm(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_coord() {
        assert!((coord(2, 4) - 0.5).abs() < 1e-6);
        assert!((coord(4, 4) - 1.0).abs() < 1e-6);
        assert!((coord(0, 0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sloppy_freq() {
        assert!((sloppy_freq(0) - 1.0).abs() < 1e-6);
        assert!((sloppy_freq(1) - 0.5).abs() < 1e-6);
        assert!((sloppy_freq(3) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_norm_byte_codec() {
        assert_eq!(encode_norm(1.0), 124);
        assert!((decode_norm(124) - 1.0).abs() < 1e-6);

        assert_eq!(encode_norm(0.0), 0);
        assert_eq!(encode_norm(-1.0), 0);
        assert!(decode_norm(0).abs() < 1e-6);

        assert_eq!(encode_norm(f32::MAX), 0xFF);
    }

    #[test]
    fn test_norm_codec_is_monotone_and_coarse() {
        let mut last = -1.0f32;
        for b in 0..=255u8 {
            let value = decode_norm(b);
            assert!(value >= last, "decode table must be non-decreasing");
            last = value;
        }

        // Round-tripping the decoded grid is exact.
        for b in 0..=255u8 {
            assert_eq!(encode_norm(decode_norm(b)), b);
        }

        // Nearby values collapse onto the same grid point.
        assert_eq!(encode_norm(0.5), encode_norm(0.5 + 1e-4));
    }
}
