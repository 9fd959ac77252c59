use vaultlock_core::{
    KeyCode,
    constants::{KEYPAD_COLUMNS, KEYPAD_ROWS},
};

/// Physical key layout, indexed by `[row][column]`.
pub const KEY_LAYOUT: [[KeyCode; 4]; 4] = [
    [KeyCode::Digit(1), KeyCode::Digit(2), KeyCode::Digit(3), KeyCode::A],
    [KeyCode::Digit(4), KeyCode::Digit(5), KeyCode::Digit(6), KeyCode::B],
    [KeyCode::Digit(7), KeyCode::Digit(8), KeyCode::Digit(9), KeyCode::C],
    [KeyCode::E, KeyCode::Digit(0), KeyCode::F, KeyCode::D],
];

/// Snapshot bit of a row line (row 0 is the top row).
pub fn row_bit(row: u8) -> u8 {
    0x08 >> (row % KEYPAD_ROWS)
}

/// Snapshot bit of a column line (column 0 is the left column).
pub fn column_bit(column: u8) -> u8 {
    0x80 >> (column % KEYPAD_COLUMNS)
}

/// Map a row/column snapshot to a key.
///
/// Exactly one row bit and one column bit must be set; ghosting, bounce
/// residue and empty snapshots decode to [`KeyCode::Invalid`].
pub fn decode(mask: u8) -> KeyCode {
    match mask {
        0x88 => KeyCode::Digit(1),
        0x48 => KeyCode::Digit(2),
        0x28 => KeyCode::Digit(3),
        0x18 => KeyCode::A,
        0x84 => KeyCode::Digit(4),
        0x44 => KeyCode::Digit(5),
        0x24 => KeyCode::Digit(6),
        0x14 => KeyCode::B,
        0x82 => KeyCode::Digit(7),
        0x42 => KeyCode::Digit(8),
        0x22 => KeyCode::Digit(9),
        0x12 => KeyCode::C,
        0x81 => KeyCode::E,
        0x41 => KeyCode::Digit(0),
        0x21 => KeyCode::F,
        0x11 => KeyCode::D,
        _ => KeyCode::Invalid,
    }
}

/// Snapshot produced by pressing `key`, `None` for `Invalid`.
pub fn mask_of(key: KeyCode) -> Option<u8> {
    (0..KEYPAD_ROWS)
        .flat_map(|row| (0..KEYPAD_COLUMNS).map(move |column| (row, column)))
        .find(|&(row, column)| KEY_LAYOUT[usize::from(row)][usize::from(column)] == key)
        .map(|(row, column)| row_bit(row) | column_bit(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x88, KeyCode::Digit(1))]
    #[case(0x18, KeyCode::A)]
    #[case(0x44, KeyCode::Digit(5))]
    #[case(0x14, KeyCode::B)]
    #[case(0x12, KeyCode::C)]
    #[case(0x81, KeyCode::E)]
    #[case(0x41, KeyCode::Digit(0))]
    #[case(0x21, KeyCode::F)]
    #[case(0x11, KeyCode::D)]
    fn test_decode_table(#[case] mask: u8, #[case] key: KeyCode) {
        assert_eq!(decode(mask), key);
    }

    #[test]
    fn test_decode_is_unique_and_invalid_elsewhere() {
        let mut seen = Vec::new();
        for mask in 0..=u8::MAX {
            let key = decode(mask);
            if key.is_valid() {
                assert!(!seen.contains(&key), "{key} decoded twice");
                assert_eq!((mask & 0xF0).count_ones(), 1);
                assert_eq!((mask & 0x0F).count_ones(), 1);
                seen.push(key);
            }
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_layout_agrees_with_decode() {
        for (row, keys) in KEY_LAYOUT.iter().enumerate() {
            for (column, key) in keys.iter().enumerate() {
                let mask = row_bit(row as u8) | column_bit(column as u8);
                assert_eq!(decode(mask), *key);
                assert_eq!(mask_of(*key), Some(mask));
            }
        }
        assert_eq!(mask_of(KeyCode::Invalid), None);
    }

    #[rstest]
    #[case(0x00)]
    #[case(0x80)]
    #[case(0x08)]
    #[case(0xC8)]
    #[case(0x8C)]
    #[case(0xFF)]
    fn test_decode_rejects_ghosting(#[case] mask: u8) {
        assert_eq!(decode(mask), KeyCode::Invalid);
    }
}
