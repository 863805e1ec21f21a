//! MPEG-1/2 video bitstream parsing
//!
//! - Start code scanning
//! - Header bit reader
//! - Header classification (sequence, GOP, picture, extensions)

pub mod bitreader;
pub mod header;

pub use bitreader::BitReader;
pub use header::{classify, CodingType, Header, PictureStructure};

/// Bytes after a start code that are enough for every header we parse.
pub const HEADER_LOOKAHEAD: usize = 12;

/// Find the next `00 00 01` prefix at or after `from`.
///
/// Returns the index of the first zero byte.
pub fn find_start_code(data: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    while i + 2 < data.len() {
        match data[i + 2] {
            // Last byte of a prefix; check the two before it.
            1 => {
                if data[i] == 0 && data[i + 1] == 0 {
                    return Some(i);
                }
                i += 3;
            }
            // Could be the first or second zero of a prefix.
            0 => i += 1,
            _ => i += 3,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_start_code() {
        let data = [0xFF, 0x00, 0x00, 0x01, 0xB3, 0x00, 0x00, 0x00, 0x01, 0x00];
        assert_eq!(find_start_code(&data, 0), Some(1));
        assert_eq!(find_start_code(&data, 2), Some(6));
        assert_eq!(find_start_code(&data, 7), None);
    }

    #[test]
    fn test_find_start_code_at_end() {
        let data = [0x12, 0x00, 0x00, 0x01];
        assert_eq!(find_start_code(&data, 0), Some(1));
        assert_eq!(find_start_code(&[0x00, 0x00], 0), None);
    }

    #[test]
    fn test_find_start_code_matches_naive_scan() {
        let data: Vec<u8> = (0..2000u32)
            .map(|i| match i % 37 {
                0 | 1 => 0,
                2 => 1,
                5 | 6 => 0,
                _ => (i * 7 % 5) as u8,
            })
            .collect();

        let naive: Vec<usize> = data
            .windows(3)
            .enumerate()
            .filter(|(_, w)| *w == [0, 0, 1])
            .map(|(i, _)| i)
            .collect();

        let mut fast = Vec::new();
        let mut pos = 0;
        while let Some(i) = find_start_code(&data, pos) {
            fast.push(i);
            pos = i + 1;
        }
        assert_eq!(fast, naive);
    }
}
